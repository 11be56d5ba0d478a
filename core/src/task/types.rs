//! Task value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What kind of content a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    World,
    Character,
    Quest,
    Item,
    Location,
    Faction,
}

impl SubjectType {
    pub const ALL: [SubjectType; 6] = [
        SubjectType::World,
        SubjectType::Character,
        SubjectType::Quest,
        SubjectType::Item,
        SubjectType::Location,
        SubjectType::Faction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Character => "character",
            Self::Quest => "quest",
            Self::Item => "item",
            Self::Location => "location",
            Self::Faction => "faction",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("unknown subject type '{s}'"))
    }
}

/// The immutable description of what was asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub subject_title: String,
    pub subject_type: SubjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, serde_json::Value>,
}

impl TaskRequest {
    pub fn new(subject_title: impl Into<String>, subject_type: SubjectType) -> Self {
        Self {
            subject_title: subject_title.into(),
            subject_type,
            additional_context: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.additional_context = Some(context.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Task status. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Analyzing,
    Generating,
    Validating,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "analyzing" => Ok(Self::Analyzing),
            "generating" => Ok(Self::Generating),
            "validating" => Ok(Self::Validating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

/// Read-only view of a task, as returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub current_step: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancellation_requested: bool,
}

impl TaskSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Selection for [`crate::store::TaskStore::list`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub status: Option<Vec<TaskStatus>>,
    #[serde(default)]
    pub subject_type: Option<SubjectType>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn with_status(status: TaskStatus) -> Self {
        Self {
            status: Some(vec![status]),
            ..Default::default()
        }
    }

    pub fn non_terminal() -> Self {
        Self {
            status: Some(vec![
                TaskStatus::Pending,
                TaskStatus::Analyzing,
                TaskStatus::Generating,
                TaskStatus::Validating,
            ]),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &super::GenerationTask) -> bool {
        if let Some(statuses) = &self.status {
            if !statuses.contains(&task.status) {
                return false;
            }
        }
        if let Some(kind) = self.subject_type {
            if task.request.subject_type != kind {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_type_parses_case_insensitively() {
        assert_eq!("World".parse::<SubjectType>(), Ok(SubjectType::World));
        assert_eq!(" quest ".parse::<SubjectType>(), Ok(SubjectType::Quest));
        assert!("spaceship".parse::<SubjectType>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Generating).unwrap();
        assert_eq!(json, "\"generating\"");
        assert_eq!("canceled".parse::<TaskStatus>(), Ok(TaskStatus::Cancelled));
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Validating.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let req: TaskRequest =
            serde_json::from_str(r#"{"subject_title":"Alpha","subject_type":"world"}"#).unwrap();
        assert_eq!(req.subject_title, "Alpha");
        assert!(req.additional_context.is_none());
        assert!(req.options.is_empty());
    }
}
