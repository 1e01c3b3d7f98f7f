use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "santa.toml";
pub const ENV_PREFIX: &str = "SANTA_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    #[serde(default = "default_mailgun_api_base")]
    pub api_base: String,
}

fn default_mailgun_api_base() -> String {
    "https://api.mailgun.net".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetlifyEmailsConfig {
    pub site_url: String,
    pub secret: String,
    pub mailgun_domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: String,
    pub roster_path: PathBuf,
    pub submissions_csv_path: PathBuf,
    pub submissions_json_path: PathBuf,
    #[serde(default)]
    pub mailgun: Option<MailgunConfig>,
    #[serde(default)]
    pub netlify_emails: Option<NetlifyEmailsConfig>,
    #[serde(default)]
    pub test_recipient: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            roster_path: PathBuf::from("participants.json"),
            submissions_csv_path: PathBuf::from("temp-submissions.csv"),
            submissions_json_path: PathBuf::from("temp-submissions.json"),
            mailgun: None,
            netlify_emails: None,
            test_recipient: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Figment(#[from] figment::Error),
}

impl Config {
    // `__` nests env keys, e.g. SANTA_MAILGUN__API_KEY
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self::figment().extract()?)
    }
}
