//! Task creation and detail edits.

use chrono::NaiveDate;
use uuid::Uuid;

use spaces_common::{NewTask, Priority, Task, TaskPatch, TaskStatus};

use crate::board::BoardState;
use crate::errors::{FormError, GatewayError};
use crate::gateway::DataGateway;
use crate::realtime::ChangeEvent;
use crate::validation::{FieldError, ValidationErrors, non_blank};

pub const MAX_TITLE_LEN: usize = 200;

/// Input of the new-task form, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: Option<Uuid>,
    /// `YYYY-MM-DD`.
    pub due_date: Option<String>,
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

fn check_title(title: &str, errors: &mut ValidationErrors) -> String {
    let title = title.trim();
    if title.is_empty() {
        errors.push(FieldError::new("title", "Title is required"));
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(FieldError::new(
            "title",
            format!("Title must be at most {} characters", MAX_TITLE_LEN),
        ));
    }
    title.to_string()
}

fn parse_due_date(raw: Option<&str>, errors: &mut ValidationErrors) -> Option<NaiveDate> {
    let raw = non_blank(raw)?;
    match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push(FieldError::new("due_date", "Due date must be YYYY-MM-DD"));
            None
        }
    }
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<ValidTask, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let title = check_title(&self.title, &mut errors);
        let due_date = parse_due_date(self.due_date.as_deref(), &mut errors);
        errors.into_result(ValidTask {
            title,
            description: non_blank(self.description.as_deref()),
            due_date,
        })
    }
}

/// Validate `draft`, insert it at the bottom of its column and place the
/// stored row on the board. Nothing is sent when validation fails.
pub async fn create_task(
    gateway: &dyn DataGateway,
    board: &mut BoardState,
    organization_id: Uuid,
    draft: &TaskDraft,
) -> Result<Task, FormError> {
    let valid = draft.validate().map_err(FormError::Validation)?;
    let new_task = NewTask {
        project_id: board.project_id(),
        organization_id,
        title: valid.title,
        description: valid.description,
        status: draft.status,
        priority: draft.priority,
        position: board.next_position(draft.status),
        assignee_id: draft.assignee_id,
        due_date: valid.due_date,
    };
    let row = gateway.create_task(&new_task).await?;
    tracing::info!(task_id = %row.id, status = %row.status, position = row.position, "task created");
    board.reconcile(ChangeEvent::Inserted(row.clone()));
    Ok(row)
}

/// Changes from the task detail drawer. `None` leaves a field as it is;
/// `Some(None)` clears an optional field, as does a blank description or
/// due date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_date: Option<Option<String>>,
}

impl TaskEdit {
    pub fn validate(&self) -> Result<TaskPatch, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let title = self
            .title
            .as_deref()
            .map(|t| check_title(t, &mut errors));
        let due_date = self
            .due_date
            .as_ref()
            .map(|d| parse_due_date(d.as_deref(), &mut errors));
        let patch = TaskPatch {
            title,
            description: self.description.as_ref().map(|d| non_blank(d.as_deref())),
            status: self.status,
            priority: self.priority,
            position: None,
            assignee_id: self.assignee_id,
            due_date,
        };
        if errors.is_empty() && patch.is_empty() {
            errors.push(FieldError::new("task", "Nothing to update"));
        }
        errors.into_result(patch)
    }
}

/// Validate and apply `edit`. A status change puts the task at the bottom
/// of its new column.
pub async fn update_task(
    gateway: &dyn DataGateway,
    id: Uuid,
    edit: &TaskEdit,
) -> Result<Task, FormError> {
    let mut patch = edit.validate().map_err(FormError::Validation)?;
    if let Some(status) = patch.status {
        let current = gateway
            .get_task(id)
            .await?
            .ok_or_else(|| GatewayError::NotFound {
                what: format!("Task {}", id),
            })?;
        if current.status != status {
            let mut column = BoardState::new(current.project_id);
            column.replace_all(gateway.list_tasks(current.project_id).await?);
            patch.position = Some(column.next_position(status));
        }
    }
    let row = gateway.update_task(id, &patch).await?;
    tracing::info!(task_id = %row.id, "task updated");
    Ok(row)
}
