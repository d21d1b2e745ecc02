use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Wall-clock format of the `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionIdentity {
    pub name: String,
    pub roll_no: String,
    pub semester: String,
}

impl SubmissionIdentity {
    pub fn new(
        name: impl Into<String>,
        roll_no: impl Into<String>,
        semester: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            roll_no: roll_no.into(),
            semester: semester.into(),
        }
    }

    /// Trims surrounding whitespace from every field, as form input arrives padded.
    pub fn trimmed(self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            roll_no: self.roll_no.trim().to_string(),
            semester: self.semester.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub id: i64,
    #[serde(flatten)]
    pub identity: SubmissionIdentity,
    pub mark: f64,
    /// `None` for legacy rows whose `date` is missing or unreadable.
    #[serde(with = "date_text")]
    pub timestamp: Option<NaiveDateTime>,
}

impl ResultRecord {
    /// The `date` column text, empty when the timestamp is unknown.
    pub fn display_date(&self) -> String {
        self.timestamp
            .map(|timestamp| timestamp.format(DATE_FORMAT).to_string())
            .unwrap_or_default()
    }
}

/// Flat row used for CSV export, one column per ledger field.
#[derive(Debug, Serialize)]
pub struct ResultRow<'a> {
    pub id: i64,
    pub name: &'a str,
    pub roll_no: &'a str,
    pub semester: &'a str,
    pub marks: f64,
    pub date: String,
}

impl<'a> From<&'a ResultRecord> for ResultRow<'a> {
    fn from(record: &'a ResultRecord) -> Self {
        Self {
            id: record.id,
            name: &record.identity.name,
            roll_no: &record.identity.roll_no,
            semester: &record.identity.semester,
            marks: record.mark,
            date: record.display_date(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartBar {
    pub name: String,
    pub mark: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    /// The ledger is empty; nothing was written.
    Empty,
    Rendered { path: PathBuf, bars: Vec<ChartBar> },
}

mod date_text {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    use super::DATE_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(timestamp) => serializer.collect_str(&timestamp.format(DATE_FORMAT)),
            None => serializer.serialize_str(""),
        }
    }
}
