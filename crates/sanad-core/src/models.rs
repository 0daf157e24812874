//! Data models for Sanad
//!
//! Defines the core data structures: chat messages (`Item`), problems,
//! comments and reports. Rows arrive from the backend as JSON objects and
//! are decoded with serde.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Backend table names
pub mod tables {
    pub const MESSAGES: &str = "messages";
    pub const PROBLEMS: &str = "problems";
    pub const COMMENTS: &str = "comments";
    pub const PROBLEM_REPORTS: &str = "problem_reports";
    pub const COMMENT_REPORTS: &str = "comment_reports";
}

/// Where an item in a live list came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Authored by this client and confirmed by the backend
    Local,
    /// Fetched or pushed from the backend
    #[default]
    Remote,
}

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    /// Server-assigned identifier
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    /// Message body
    pub text: String,
    /// When the backend created the row
    pub created_at: DateTime<Utc>,
    /// Backend rows carry no origin, so they decode as remote
    #[serde(default)]
    pub origin: Origin,
}

impl Item {
    /// Whether this client authored the item
    pub fn is_local(&self) -> bool {
        self.origin == Origin::Local
    }
}

/// A problem posted to the board
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Problem {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Comments, oldest first
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Problem {
    /// Case-sensitive substring match on title or description
    pub fn matches(&self, term: &str) -> bool {
        self.title.contains(term) || self.description.contains(term)
    }

    /// Number of comments marked helpful
    pub fn helpful_count(&self) -> usize {
        self.comments
            .iter()
            .filter(|c| c.is_helpful == Some(true))
            .count()
    }
}

/// A reply to a problem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(deserialize_with = "id_string")]
    pub problem_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// `None` until someone votes
    #[serde(default)]
    pub is_helpful: Option<bool>,
}

/// What a report points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ReportTarget {
    Problem(String),
    Comment(String),
}

impl ReportTarget {
    /// Table the report row lives in
    pub fn table(&self) -> &'static str {
        match self {
            ReportTarget::Problem(_) => tables::PROBLEM_REPORTS,
            ReportTarget::Comment(_) => tables::COMMENT_REPORTS,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ReportTarget::Problem(id) | ReportTarget::Comment(id) => id,
        }
    }
}

/// A report filed against a problem or comment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: String,
    pub target: ReportTarget,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Raw report row; the two report tables differ only in their foreign key
#[derive(Deserialize)]
struct ReportRow {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    problem_id: Option<String>,
    #[serde(default, deserialize_with = "opt_id_string")]
    comment_id: Option<String>,
    reason: String,
    created_at: DateTime<Utc>,
}

impl<'de> Deserialize<'de> for Report {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let row = ReportRow::deserialize(deserializer)?;
        let target = match (row.problem_id, row.comment_id) {
            (Some(id), _) => ReportTarget::Problem(id),
            (None, Some(id)) => ReportTarget::Comment(id),
            (None, None) => {
                return Err(serde::de::Error::missing_field("problem_id or comment_id"))
            }
        };
        Ok(Report {
            id: row.id,
            target,
            reason: row.reason,
            created_at: row.created_at,
        })
    }
}

/// Fixed set of reasons offered when reporting content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportReason {
    Inappropriate,
    Misleading,
    Copyright,
    Abusive,
    Other,
}

impl ReportReason {
    pub const ALL: [ReportReason; 5] = [
        ReportReason::Inappropriate,
        ReportReason::Misleading,
        ReportReason::Copyright,
        ReportReason::Abusive,
        ReportReason::Other,
    ];

    /// Label stored in the report row
    pub fn label(self) -> &'static str {
        match self {
            ReportReason::Inappropriate => "Inappropriate content",
            ReportReason::Misleading => "Misleading information",
            ReportReason::Copyright => "Copyright violation",
            ReportReason::Abusive => "Abusive behavior",
            ReportReason::Other => "Other",
        }
    }

    /// Short key accepted on the command line
    pub fn key(self) -> &'static str {
        match self {
            ReportReason::Inappropriate => "inappropriate",
            ReportReason::Misleading => "misleading",
            ReportReason::Copyright => "copyright",
            ReportReason::Abusive => "abusive",
            ReportReason::Other => "other",
        }
    }
}

impl fmt::Display for ReportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReportReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ReportReason::ALL
            .into_iter()
            .find(|r| r.key() == wanted || r.label().to_lowercase() == wanted)
            .ok_or_else(|| {
                let keys: Vec<_> = ReportReason::ALL.iter().map(|r| r.key()).collect();
                format!("Unknown report reason '{}'. Use one of: {}", s, keys.join(", "))
            })
    }
}

/// Backend ids may be uuids or serial integers; both are held as strings
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "id_string")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_from_row_defaults_to_remote() {
        let item: Item = serde_json::from_value(json!({
            "id": "a",
            "text": "hi",
            "created_at": "2024-05-01T10:00:00+00:00"
        }))
        .unwrap();

        assert_eq!(item.origin, Origin::Remote);
        assert!(!item.is_local());
    }

    #[test]
    fn test_numeric_ids_become_strings() {
        let comment: Comment = serde_json::from_value(json!({
            "id": 17,
            "problem_id": 4,
            "text": "try walking",
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(comment.id, "17");
        assert_eq!(comment.problem_id, "4");
        assert_eq!(comment.is_helpful, None);
    }

    #[test]
    fn test_problem_matches() {
        let problem: Problem = serde_json::from_value(json!({
            "id": "p1",
            "title": "Cannot sleep",
            "description": "Every night I wake at 3am",
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();

        assert!(problem.matches("sleep"));
        assert!(problem.matches("3am"));
        assert!(problem.matches(""));
        assert!(!problem.matches("Sleep"));
        assert!(problem.comments.is_empty());
    }

    #[test]
    fn test_report_target_from_row() {
        let problem_report: Report = serde_json::from_value(json!({
            "id": "r1",
            "problem_id": "p1",
            "reason": "Other",
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(problem_report.target, ReportTarget::Problem("p1".into()));
        assert_eq!(problem_report.target.table(), tables::PROBLEM_REPORTS);

        let comment_report: Report = serde_json::from_value(json!({
            "id": 9,
            "comment_id": 3,
            "reason": "Abusive behavior",
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(comment_report.target, ReportTarget::Comment("3".into()));

        let orphan = serde_json::from_value::<Report>(json!({
            "id": "r2",
            "reason": "Other",
            "created_at": "2024-05-01T10:00:00Z"
        }));
        assert!(orphan.is_err());
    }

    #[test]
    fn test_report_reason_parse() {
        assert_eq!("abusive".parse::<ReportReason>(), Ok(ReportReason::Abusive));
        assert_eq!(
            "Misleading information".parse::<ReportReason>(),
            Ok(ReportReason::Misleading)
        );
        let err = "spam".parse::<ReportReason>().unwrap_err();
        assert!(err.contains("inappropriate"));
    }
}
