use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use reqwest::Client;
use santa_core::{Assignment, ContactDirectory, ParticipantId};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{MailgunConfig, NetlifyEmailsConfig};

pub const ASSIGNMENT_SUBJECT: &str = "Your New Secret Santa Assignment!";
pub const TEST_SUBJECT: &str = "Hello from Secret Santa";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Assignment(Assignment),
    Test,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub trait Mailer: Send + Sync {
    fn provider(&self) -> &'static str;

    fn send(&self, to: String, notice: Notice) -> BoxFuture<'_, Result<(), DeliveryError>>;
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub failed: Vec<ParticipantId>,
    pub missing_contacts: Vec<ParticipantId>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed.len()
    }
}

pub async fn deliver_all(
    mailer: &dyn Mailer,
    assignments: &[Assignment],
    contacts: &ContactDirectory,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    let mut sends = Vec::new();

    for assignment in assignments {
        let Some(to) = contacts.contact_for(&assignment.giver) else {
            warn!(giver = %assignment.giver, "could not find email for giver");
            report.missing_contacts.push(assignment.giver.clone());
            continue;
        };
        sends.push(async move {
            let result = mailer
                .send(to.to_string(), Notice::Assignment(assignment.clone()))
                .await;
            (assignment, result)
        });
    }

    report.attempted = sends.len();
    for (assignment, result) in join_all(sends).await {
        match result {
            Ok(()) => debug!(provider = mailer.provider(), giver = %assignment.giver, "notice sent"),
            Err(err) => {
                warn!(provider = mailer.provider(), giver = %assignment.giver, error = %err, "delivery failed");
                report.failed.push(assignment.giver.clone());
            }
        }
    }

    report
}

async fn check_status(response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MailgunMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Clone)]
pub struct MailgunMailer {
    client: Client,
    config: MailgunConfig,
}

impl MailgunMailer {
    pub fn new(client: Client, config: MailgunConfig) -> Self {
        Self { client, config }
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v3/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.domain
        )
    }

    pub fn compose(&self, to: String, notice: &Notice) -> MailgunMessage {
        let from = format!("Secret Santa Admin <mail@{}>", self.config.domain);
        match notice {
            Notice::Assignment(Assignment { giver, receiver }) => MailgunMessage {
                from,
                to,
                subject: ASSIGNMENT_SUBJECT.to_string(),
                html: assignment_html(giver, receiver),
            },
            Notice::Test => MailgunMessage {
                from,
                to,
                subject: TEST_SUBJECT.to_string(),
                html: "<p>Secret Santa email delivery is working.</p>".to_string(),
            },
        }
    }
}

fn assignment_html(giver: &str, receiver: &str) -> String {
    format!(
        r#"<div style="font-family: sans-serif; font-size: 16px; color: #333;">
    <h2>Hi {giver},</h2>
    <p>The Secret Santa assignments have been corrected! Thank you for your patience.</p>
    <p>Your new, official, final assignment is:</p>
    <h1 style="font-size: 28px; color: #d9534f;">{receiver}</h1>
    <p>Happy gifting!</p>
    <br>
    <p><em>(This is an automated message. Please do not reply.)</em></p>
</div>"#
    )
}

impl Mailer for MailgunMailer {
    fn provider(&self) -> &'static str {
        "mailgun"
    }

    fn send(&self, to: String, notice: Notice) -> BoxFuture<'_, Result<(), DeliveryError>> {
        async move {
            let message = self.compose(to, &notice);
            let response = self
                .client
                .post(self.endpoint())
                .basic_auth("api", Some(&self.config.api_key))
                .form(&message)
                .send()
                .await?;
            check_status(response).await
        }
        .boxed()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplatedEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub parameters: serde_json::Value,
}

#[derive(Clone)]
pub struct NetlifyEmailsMailer {
    client: Client,
    config: NetlifyEmailsConfig,
}

impl NetlifyEmailsMailer {
    pub fn new(client: Client, config: NetlifyEmailsConfig) -> Self {
        Self { client, config }
    }

    pub fn endpoint(&self, notice: &Notice) -> String {
        let template = match notice {
            Notice::Assignment(_) => "assignment",
            Notice::Test => "test-email",
        };
        format!(
            "{}/.netlify/functions/emails/{template}",
            self.config.site_url.trim_end_matches('/')
        )
    }

    pub fn compose(&self, to: String, notice: &Notice) -> TemplatedEmail {
        let from = format!("santa@{}", self.config.mailgun_domain);
        match notice {
            Notice::Assignment(Assignment { giver, receiver }) => TemplatedEmail {
                from,
                to,
                subject: ASSIGNMENT_SUBJECT.to_string(),
                parameters: serde_json::json!({ "giver": giver, "receiver": receiver }),
            },
            Notice::Test => TemplatedEmail {
                from,
                to,
                subject: TEST_SUBJECT.to_string(),
                parameters: serde_json::json!({}),
            },
        }
    }
}

impl Mailer for NetlifyEmailsMailer {
    fn provider(&self) -> &'static str {
        "netlify-emails"
    }

    fn send(&self, to: String, notice: Notice) -> BoxFuture<'_, Result<(), DeliveryError>> {
        async move {
            let payload = self.compose(to, &notice);
            let response = self
                .client
                .post(self.endpoint(&notice))
                .header("netlify-emails-secret", &self.config.secret)
                .json(&payload)
                .send()
                .await?;
            check_status(response).await
        }
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    // recipients listed in `reject` get a 502
    #[derive(Clone, Default)]
    pub struct RecordingMailer {
        pub sent: Arc<Mutex<Vec<(String, Notice)>>>,
        pub reject: Vec<String>,
    }

    impl RecordingMailer {
        pub fn rejecting(recipients: &[&str]) -> Self {
            Self {
                reject: recipients.iter().map(|r| r.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<(String, Notice)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Mailer for RecordingMailer {
        fn provider(&self) -> &'static str {
            "recording"
        }

        fn send(&self, to: String, notice: Notice) -> BoxFuture<'_, Result<(), DeliveryError>> {
            async move {
                if self.reject.contains(&to) {
                    return Err(DeliveryError::Rejected {
                        status: 502,
                        body: "bad gateway".into(),
                    });
                }
                self.sent.lock().unwrap().push((to, notice));
                Ok(())
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingMailer;
    use super::*;
    use santa_core::SubmissionRecord;

    fn contacts(entries: &[(&str, &str)]) -> ContactDirectory {
        let submissions: Vec<SubmissionRecord> = entries
            .iter()
            .map(|(giver, contact)| SubmissionRecord {
                giver: giver.to_string(),
                contact: contact.to_string(),
                declarations: vec![],
            })
            .collect();
        ContactDirectory::from_submissions(&submissions)
    }

    #[tokio::test]
    async fn every_giver_with_a_contact_gets_one_notice() {
        let mailer = RecordingMailer::default();
        let assignments = vec![
            Assignment::new("Alice", "Bob"),
            Assignment::new("Bob", "Carol"),
            Assignment::new("Carol", "Alice"),
        ];
        let directory = contacts(&[("Alice", "alice@example.com"), ("Bob", "bob@example.com")]);

        let report = deliver_all(&mailer, &assignments, &directory).await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.missing_contacts, vec!["Carol".to_string()]);
        let mut sent = mailer.sent();
        sent.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            sent,
            vec![
                (
                    "alice@example.com".to_string(),
                    Notice::Assignment(Assignment::new("Alice", "Bob"))
                ),
                (
                    "bob@example.com".to_string(),
                    Notice::Assignment(Assignment::new("Bob", "Carol"))
                ),
            ]
        );
    }

    #[tokio::test]
    async fn provider_failure_does_not_stop_the_batch() {
        let mailer = RecordingMailer::rejecting(&["bob@example.com"]);
        let assignments = vec![Assignment::new("Alice", "Bob"), Assignment::new("Bob", "Alice")];
        let directory = contacts(&[("Alice", "alice@example.com"), ("Bob", "bob@example.com")]);

        let report = deliver_all(&mailer, &assignments, &directory).await;

        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, vec!["Bob".to_string()]);
        assert_eq!(report.delivered(), 1);
        assert_eq!(mailer.sent().len(), 1);
    }

    #[test]
    fn mailgun_message_names_the_receiver() {
        let mailer = MailgunMailer::new(
            Client::new(),
            MailgunConfig {
                api_key: "key".into(),
                domain: "mg.example.com".into(),
                api_base: "https://api.mailgun.net/".into(),
            },
        );
        let message = mailer.compose(
            "alice@example.com".into(),
            &Notice::Assignment(Assignment::new("Alice", "Bob")),
        );

        assert_eq!(mailer.endpoint(), "https://api.mailgun.net/v3/mg.example.com/messages");
        assert_eq!(message.from, "Secret Santa Admin <mail@mg.example.com>");
        assert_eq!(message.subject, ASSIGNMENT_SUBJECT);
        assert!(message.html.contains("<h2>Hi Alice,</h2>"));
        assert!(message.html.contains(">Bob</h1>"));
    }

    #[test]
    fn netlify_email_targets_the_template_function() {
        let mailer = NetlifyEmailsMailer::new(
            Client::new(),
            NetlifyEmailsConfig {
                site_url: "https://santa.example.com".into(),
                secret: "s3cret".into(),
                mailgun_domain: "mg.example.com".into(),
            },
        );
        let notice = Notice::Assignment(Assignment::new("Alice", "Bob"));
        let payload = mailer.compose("alice@example.com".into(), &notice);

        assert_eq!(
            mailer.endpoint(&notice),
            "https://santa.example.com/.netlify/functions/emails/assignment"
        );
        assert_eq!(
            mailer.endpoint(&Notice::Test),
            "https://santa.example.com/.netlify/functions/emails/test-email"
        );
        assert_eq!(payload.from, "santa@mg.example.com");
        assert_eq!(
            payload.parameters,
            serde_json::json!({ "giver": "Alice", "receiver": "Bob" })
        );
    }
}
