//! Shared domain types for the Spaces client.
//!
//! These mirror the rows of the hosted `projects`, `tasks`, `notifications`
//! and `profiles` tables plus the payloads of the public approval endpoints.
//! They carry no behavior beyond parsing and ordering helpers.

pub mod approval;
pub mod notification;
pub mod project;
pub mod task;

pub use approval::{
    ApprovalDetails, ApprovalProject, ApprovalTask, Decision, DecisionOutcome, DecisionState,
};
pub use notification::{Notification, NotificationKind, Profile};
pub use project::{NewProject, Project, ProjectPatch};
pub use task::{NewTask, POSITION_BASE, PositionUpdate, Priority, Task, TaskPatch, TaskStatus};
