use std::collections::HashMap;
use std::path::{Path, PathBuf};

use santa_core::{Declaration, Roster, SubmissionRecord};
use serde::{Deserialize, Deserializer};

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FormRow {
    #[serde(rename = "submitter-name", default, deserialize_with = "cell_text")]
    pub submitter_name: String,
    #[serde(rename = "submitter-email", default, deserialize_with = "cell_text")]
    pub submitter_email: String,
    #[serde(rename = "receiver-1-name", default, deserialize_with = "cell_text")]
    pub receiver_1_name: String,
    #[serde(rename = "gift-purchased-1", default, deserialize_with = "flag_text")]
    pub gift_purchased_1: String,
    #[serde(rename = "receiver-2-name", default, deserialize_with = "cell_text")]
    pub receiver_2_name: String,
    #[serde(rename = "gift-purchased-2", default, deserialize_with = "flag_text")]
    pub gift_purchased_2: String,
}

impl FormRow {
    fn from_cells(cells: &HashMap<&str, &str>) -> Self {
        let cell = |name: &str| cells.get(name).map(|v| v.to_string()).unwrap_or_default();
        Self {
            submitter_name: cell("submitter-name"),
            submitter_email: cell("submitter-email"),
            receiver_1_name: cell("receiver-1-name"),
            gift_purchased_1: cell("gift-purchased-1"),
            receiver_2_name: cell("receiver-2-name"),
            gift_purchased_2: cell("gift-purchased-2"),
        }
    }
}

impl From<FormRow> for SubmissionRecord {
    fn from(row: FormRow) -> Self {
        let declarations = [
            (row.receiver_1_name, row.gift_purchased_1),
            (row.receiver_2_name, row.gift_purchased_2),
        ]
        .into_iter()
        .filter(|(receiver, _)| !receiver.trim().is_empty())
        .map(|(receiver, flag)| Declaration {
            receiver: receiver.trim().to_string(),
            purchased: is_purchased(&flag),
        })
        .collect();

        SubmissionRecord {
            giver: row.submitter_name.trim().to_string(),
            contact: row.submitter_email.trim().to_string(),
            declarations,
        }
    }
}

fn is_purchased(flag: &str) -> bool {
    flag.trim().eq_ignore_ascii_case("true")
}

// Exports leave unanswered form fields as null.
fn cell_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// JSON exports carry the flag either as "true" or as a bare boolean.
fn flag_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(value)) => value.to_string(),
        Some(Flag::Text(value)) => value,
        None => String::new(),
    })
}

// Quotes are stripped from every cell; columns missing from a row read as empty.
pub fn parse_csv_submissions(text: &str) -> Vec<SubmissionRecord> {
    let mut lines = text
        .trim()
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty());

    let Some(header_line) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = header_line.split(',').map(unquote).collect();

    lines
        .map(|line| {
            let values: Vec<String> = line.split(',').map(unquote).collect();
            let cells: HashMap<&str, &str> = headers
                .iter()
                .zip(values.iter())
                .map(|(h, v)| (h.as_str(), v.as_str()))
                .collect();
            SubmissionRecord::from(FormRow::from_cells(&cells))
        })
        .collect()
}

fn unquote(cell: &str) -> String {
    cell.replace('"', "").trim().to_string()
}

pub fn parse_json_submissions(text: &str) -> Result<Vec<SubmissionRecord>, serde_json::Error> {
    let rows: Vec<FormRow> = serde_json::from_str(text)?;
    Ok(rows.into_iter().map(SubmissionRecord::from).collect())
}

async fn read(path: &Path) -> Result<String, IntakeError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| IntakeError::Io {
            path: path.to_path_buf(),
            source,
        })
}

pub async fn load_roster(path: &Path) -> Result<Roster, IntakeError> {
    let text = read(path).await?;
    serde_json::from_str(&text).map_err(|source| IntakeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn load_csv_submissions(path: &Path) -> Result<Vec<SubmissionRecord>, IntakeError> {
    let text = read(path).await?;
    Ok(parse_csv_submissions(&text))
}

pub async fn load_json_submissions(path: &Path) -> Result<Vec<SubmissionRecord>, IntakeError> {
    let text = read(path).await?;
    parse_json_submissions(&text).map_err(|source| IntakeError::Json {
        path: path.to_path_buf(),
        source,
    })
}
