//! Pointer-driven drag state machine: `Idle → Dragging → (drop) → Idle`.
//!
//! The controller only decides *what* a drop means. Applying and persisting
//! the move is [`super::ProjectBoard::drop_dragged`]'s job.

use uuid::Uuid;

use spaces_common::TaskStatus;

use crate::errors::BoardError;

use super::state::BoardState;

/// Where the dragged card came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragOrigin {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub index: usize,
}

/// Candidate drop slot under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub status: TaskStatus,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging {
        origin: DragOrigin,
        target: Option<DropTarget>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedMove {
    pub task_id: Uuid,
    pub from: DragOrigin,
    pub to: DropTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Move(PlannedMove),
    /// Dropped back into its own slot.
    NoOp,
    /// Released outside any column.
    Cancelled,
}

/// Insertion index for a pointer at `pointer_y` over cards whose vertical
/// centers are `sibling_centers` (the dragged card excluded).
///
/// Counts the centers strictly above the pointer, so a pointer exactly on a
/// center inserts before that card.
pub fn insertion_index(pointer_y: f32, sibling_centers: &[f32]) -> usize {
    sibling_centers.iter().filter(|c| **c < pointer_y).count()
}

#[derive(Debug)]
pub struct DragController {
    state: DragState,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn start(&mut self, board: &BoardState, task_id: Uuid) -> Result<DragOrigin, BoardError> {
        if self.is_dragging() {
            return Err(BoardError::DragInProgress);
        }
        let task = board
            .task(task_id)
            .ok_or(BoardError::TaskNotFound { id: task_id })?;
        let index = board
            .column(task.status)
            .iter()
            .position(|t| t.id == task_id)
            .ok_or(BoardError::TaskNotFound { id: task_id })?;
        let origin = DragOrigin {
            task_id,
            status: task.status,
            index,
        };
        tracing::trace!(%task_id, status = %origin.status, index, "drag started");
        self.state = DragState::Dragging {
            origin,
            target: None,
        };
        Ok(origin)
    }

    /// Pointer moved over `status`. Returns the candidate insertion index.
    pub fn hover(
        &mut self,
        status: TaskStatus,
        pointer_y: f32,
        sibling_centers: &[f32],
    ) -> Result<usize, BoardError> {
        let DragState::Dragging { target, .. } = &mut self.state else {
            return Err(BoardError::NotDragging);
        };
        let index = insertion_index(pointer_y, sibling_centers);
        *target = Some(DropTarget { status, index });
        Ok(index)
    }

    /// Pointer left every column.
    pub fn hover_outside(&mut self) {
        if let DragState::Dragging { target, .. } = &mut self.state {
            *target = None;
        }
    }

    /// Release the card. Always returns to `Idle`.
    pub fn drop(&mut self) -> Result<DropOutcome, BoardError> {
        let DragState::Dragging { origin, target } =
            std::mem::replace(&mut self.state, DragState::Idle)
        else {
            return Err(BoardError::NotDragging);
        };
        let outcome = match target {
            None => DropOutcome::Cancelled,
            Some(to) if to.status == origin.status && to.index == origin.index => DropOutcome::NoOp,
            Some(to) => DropOutcome::Move(PlannedMove {
                task_id: origin.task_id,
                from: origin,
                to,
            }),
        };
        tracing::trace!(task_id = %origin.task_id, ?outcome, "drag dropped");
        Ok(outcome)
    }

    /// Abandon the drag without an outcome.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spaces_common::{Priority, Task};

    fn board_with(statuses: &[TaskStatus]) -> (BoardState, Vec<Uuid>) {
        let project = Uuid::new_v4();
        let mut board = BoardState::new(project);
        let mut ids = Vec::new();
        let tasks = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let id = Uuid::new_v4();
                ids.push(id);
                Task {
                    id,
                    project_id: project,
                    organization_id: Uuid::nil(),
                    title: format!("Task {i}"),
                    description: None,
                    status: *status,
                    priority: Priority::Medium,
                    position: i as i32,
                    assignee_id: None,
                    due_date: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                }
            })
            .collect();
        board.replace_all(tasks);
        (board, ids)
    }

    #[test]
    fn test_insertion_index_ties_insert_before() {
        let centers = [10.0, 30.0, 50.0];
        assert_eq!(insertion_index(0.0, &centers), 0);
        assert_eq!(insertion_index(10.0, &centers), 0);
        assert_eq!(insertion_index(10.5, &centers), 1);
        assert_eq!(insertion_index(50.0, &centers), 2);
        assert_eq!(insertion_index(99.0, &centers), 3);
        assert_eq!(insertion_index(5.0, &[]), 0);
    }

    #[test]
    fn test_drag_to_other_column_plans_move() {
        let (board, ids) = board_with(&[TaskStatus::Build, TaskStatus::Build]);
        let mut drag = DragController::new();
        let origin = drag.start(&board, ids[1]).unwrap();
        assert_eq!(origin.index, 1);

        drag.hover(TaskStatus::Qa, 5.0, &[]).unwrap();
        let outcome = drag.drop().unwrap();
        assert_eq!(
            outcome,
            DropOutcome::Move(PlannedMove {
                task_id: ids[1],
                from: origin,
                to: DropTarget {
                    status: TaskStatus::Qa,
                    index: 0
                },
            })
        );
        assert_eq!(*drag.state(), DragState::Idle);
    }

    #[test]
    fn test_drop_on_own_slot_is_noop() {
        let (board, ids) = board_with(&[TaskStatus::Build, TaskStatus::Build]);
        let mut drag = DragController::new();
        drag.start(&board, ids[0]).unwrap();
        // Only the sibling's center is reported; pointer above it.
        drag.hover(TaskStatus::Build, 2.0, &[40.0]).unwrap();
        assert_eq!(drag.drop().unwrap(), DropOutcome::NoOp);
    }

    #[test]
    fn test_leaving_columns_cancels() {
        let (board, ids) = board_with(&[TaskStatus::Design]);
        let mut drag = DragController::new();
        drag.start(&board, ids[0]).unwrap();
        drag.hover(TaskStatus::Qa, 0.0, &[]).unwrap();
        drag.hover_outside();
        assert_eq!(drag.drop().unwrap(), DropOutcome::Cancelled);
        assert!(!drag.is_dragging());
    }

    #[test]
    fn test_invalid_transitions() {
        let (board, ids) = board_with(&[TaskStatus::Design, TaskStatus::Design]);
        let mut drag = DragController::new();
        assert!(matches!(drag.drop(), Err(BoardError::NotDragging)));
        assert!(matches!(
            drag.hover(TaskStatus::Qa, 0.0, &[]),
            Err(BoardError::NotDragging)
        ));
        assert!(matches!(
            drag.start(&board, Uuid::new_v4()),
            Err(BoardError::TaskNotFound { .. })
        ));
        drag.start(&board, ids[0]).unwrap();
        assert!(matches!(
            drag.start(&board, ids[1]),
            Err(BoardError::DragInProgress)
        ));
        drag.cancel();
        assert!(!drag.is_dragging());
    }
}
