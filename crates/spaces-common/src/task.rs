use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position given to the first card of a column. Columns are renumbered
/// contiguously from here after every local move.
pub const POSITION_BASE: i32 = 0;

/// Workflow stage of a task. Declaration order is board order: the seven
/// workflow stages first, then the exception stages.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Discovery,
    Design,
    Build,
    Qa,
    Deploy,
    Live,
    Optimization,
    Blocked,
    NeedsClientApproval,
    Bug,
    Hotfix,
}

impl TaskStatus {
    /// The columns the board renders, in order.
    pub const WORKFLOW: [TaskStatus; 7] = [
        Self::Discovery,
        Self::Design,
        Self::Build,
        Self::Qa,
        Self::Deploy,
        Self::Live,
        Self::Optimization,
    ];

    /// Exception stages. Tasks here are flagged on the board.
    pub const BLOCKING: [TaskStatus; 4] = [
        Self::Blocked,
        Self::NeedsClientApproval,
        Self::Bug,
        Self::Hotfix,
    ];

    pub fn all() -> impl Iterator<Item = TaskStatus> {
        Self::WORKFLOW.into_iter().chain(Self::BLOCKING)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Design => "design",
            Self::Build => "build",
            Self::Qa => "qa",
            Self::Deploy => "deploy",
            Self::Live => "live",
            Self::Optimization => "optimization",
            Self::Blocked => "blocked",
            Self::NeedsClientApproval => "needs_client_approval",
            Self::Bug => "bug",
            Self::Hotfix => "hotfix",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Discovery => "Discovery",
            Self::Design => "Design",
            Self::Build => "Build",
            Self::Qa => "QA",
            Self::Deploy => "Deploy",
            Self::Live => "Live",
            Self::Optimization => "Optimization",
            Self::Blocked => "Blocked",
            Self::NeedsClientApproval => "Needs client approval",
            Self::Bug => "Bug",
            Self::Hotfix => "Hotfix",
        }
    }

    pub fn is_blocking(&self) -> bool {
        Self::BLOCKING.contains(self)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovery" => Ok(Self::Discovery),
            "design" => Ok(Self::Design),
            "build" => Ok(Self::Build),
            "qa" => Ok(Self::Qa),
            "deploy" => Ok(Self::Deploy),
            "live" => Ok(Self::Live),
            "optimization" => Ok(Self::Optimization),
            "blocked" => Ok(Self::Blocked),
            "needs_client_approval" => Ok(Self::NeedsClientApproval),
            "bug" => Ok(Self::Bug),
            "hotfix" => Ok(Self::Hotfix),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Sort rank, most pressing first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Urgent => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    pub position: i32,
    #[serde(default)]
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape for `POST /tasks`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub project_id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub position: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

/// Partial update for `PATCH /tasks`. `None` fields are left alone; on the
/// nullable columns `Some(None)` sends `null` and clears the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Option<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One `(status, position)` write produced by a board move.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PositionUpdate {
    pub id: Uuid,
    pub status: TaskStatus,
    pub position: i32,
}

impl From<PositionUpdate> for TaskPatch {
    fn from(update: PositionUpdate) -> Self {
        TaskPatch {
            status: Some(update.status),
            position: Some(update.position),
            ..TaskPatch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in TaskStatus::all() {
            assert_eq!(status.as_str().parse::<TaskStatus>(), Ok(status));
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_status_order_is_board_order() {
        assert!(TaskStatus::Discovery < TaskStatus::Build);
        assert!(TaskStatus::Optimization < TaskStatus::Blocked);
        assert_eq!(TaskStatus::all().count(), 11);
    }

    #[test]
    fn test_patch_sends_only_touched_columns() {
        let patch = TaskPatch {
            priority: Some(Priority::High),
            due_date: Some(None),
            ..TaskPatch::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            serde_json::json!({"priority": "high", "due_date": null})
        );
    }

    #[test]
    fn test_blocking_flags() {
        assert!(TaskStatus::Hotfix.is_blocking());
        assert!(TaskStatus::NeedsClientApproval.is_blocking());
        assert!(!TaskStatus::Qa.is_blocking());
    }

    #[test]
    fn test_task_deserializes_from_row_with_nulls() {
        let json = serde_json::json!({
            "id": "6f1c1c8e-5b0e-4d7a-9a55-1f2d1b0e0a01",
            "project_id": "6f1c1c8e-5b0e-4d7a-9a55-1f2d1b0e0a02",
            "organization_id": "6f1c1c8e-5b0e-4d7a-9a55-1f2d1b0e0a03",
            "title": "Webhook Setup",
            "description": null,
            "status": "needs_client_approval",
            "priority": "urgent",
            "position": 3,
            "assignee_id": null,
            "due_date": "2026-10-20",
            "created_at": "2026-10-01T10:00:00Z",
            "updated_at": "2026-10-02T10:00:00+00:00"
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.status, TaskStatus::NeedsClientApproval);
        assert_eq!(task.priority, Priority::Urgent);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 10, 20));
    }

    #[test]
    fn test_patch_skips_unset_fields() {
        let patch = TaskPatch::from(PositionUpdate {
            id: Uuid::nil(),
            status: TaskStatus::Qa,
            position: 0,
        });
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({"status": "qa", "position": 0}));
        assert!(TaskPatch::default().is_empty());
    }
}
