//! Kanban board of one project.
//!
//! ## Overview
//!
//! [`ProjectBoard`] is the mounted board view. It owns the three parts that
//! make up the board and runs the optimistic move protocol across them:
//!
//! | Part                 | Role                                              |
//! |----------------------|---------------------------------------------------|
//! | [`BoardState`]       | tasks grouped by status, ordered by position      |
//! | [`DragController`]   | pointer drag state machine                        |
//! | [`RealtimeListener`] | change feed of the project (optional)             |
//!
//! A move is applied locally first, then persisted. If persisting fails the
//! rows already written are put back, the board is restored to what it was
//! before the drag began and the caller gets [`BoardError::MoveRolledBack`].

pub mod drag;
pub mod filter;
pub mod listener;
pub mod state;

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use spaces_common::{Task, TaskStatus};

use crate::errors::{BoardError, FormError, PartialWrite};
use crate::gateway::DataGateway;
use crate::realtime::{ChangeEvent, RealtimeConnector};
use crate::tasks::{self, TaskDraft};

pub use drag::{DragController, DragOrigin, DragState, DropOutcome, DropTarget, PlannedMove};
pub use filter::TaskFilter;
pub use listener::{ListenerEvent, RealtimeListener};
pub use state::{BoardSnapshot, BoardState, IgnoreReason, MoveTicket, ReconcileOutcome};

/// What a realtime message did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardUpdate {
    Live,
    Reconciled {
        task_id: Uuid,
        outcome: ReconcileOutcome,
    },
    /// Reloaded from the server after a re-join.
    Reloaded,
}

pub struct ProjectBoard {
    gateway: Arc<dyn DataGateway>,
    state: BoardState,
    drag: DragController,
    listener: Option<RealtimeListener>,
}

impl ProjectBoard {
    /// Load a board without a change feed.
    pub async fn open(gateway: Arc<dyn DataGateway>, project_id: Uuid) -> Result<Self, BoardError> {
        let mut state = BoardState::new(project_id);
        state.load(gateway.as_ref()).await?;
        Ok(Self {
            gateway,
            state,
            drag: DragController::new(),
            listener: None,
        })
    }

    /// Subscribe to the project's changes, then load it. Changes made while
    /// loading are delivered afterwards and reconciled.
    pub async fn mount(
        gateway: Arc<dyn DataGateway>,
        connector: &dyn RealtimeConnector,
        project_id: Uuid,
    ) -> Result<Self, BoardError> {
        let listener = RealtimeListener::start(connector, project_id).await?;
        let mut state = BoardState::new(project_id);
        state.load(gateway.as_ref()).await?;
        tracing::info!(%project_id, tasks = state.len(), "board mounted");
        Ok(Self {
            gateway,
            state,
            drag: DragController::new(),
            listener: Some(listener),
        })
    }

    pub fn project_id(&self) -> Uuid {
        self.state.project_id()
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn drag(&self) -> &DragController {
        &self.drag
    }

    pub async fn reload(&mut self) -> Result<(), BoardError> {
        self.state.load(self.gateway.as_ref()).await
    }

    // ── Drag and drop ──────────────────────────────────────────────────

    pub fn start_drag(&mut self, task_id: Uuid) -> Result<DragOrigin, BoardError> {
        if self.state.has_pending_move() {
            return Err(BoardError::MoveInFlight);
        }
        self.drag.start(&self.state, task_id)
    }

    pub fn drag_over(
        &mut self,
        status: TaskStatus,
        pointer_y: f32,
        sibling_centers: &[f32],
    ) -> Result<usize, BoardError> {
        self.drag.hover(status, pointer_y, sibling_centers)
    }

    pub fn drag_outside(&mut self) {
        self.drag.hover_outside();
    }

    /// Release the dragged card and persist the resulting move.
    pub async fn drop_dragged(&mut self) -> Result<DropOutcome, BoardError> {
        let outcome = self.drag.drop()?;
        if let DropOutcome::Move(planned) = outcome {
            if !self.commit(planned.task_id, planned.to.status, planned.to.index).await? {
                return Ok(DropOutcome::NoOp);
            }
        }
        Ok(outcome)
    }

    /// Keyboard and command-line path: the same drag cycle without a pointer.
    pub async fn move_task(
        &mut self,
        task_id: Uuid,
        status: TaskStatus,
        index: usize,
    ) -> Result<DropOutcome, BoardError> {
        self.start_drag(task_id)?;
        // Hovering with every sibling center below the pointer targets the
        // slot `index` directly.
        let centers: Vec<f32> = (0..index).map(|i| i as f32).collect();
        self.drag.hover(status, index as f32, &centers)?;
        self.drop_dragged().await
    }

    /// Apply locally, persist, then confirm or roll back. `Ok(false)` when
    /// the move changed nothing.
    async fn commit(
        &mut self,
        task_id: Uuid,
        status: TaskStatus,
        index: usize,
    ) -> Result<bool, BoardError> {
        let Some(ticket) = self.state.begin_move(task_id, status, index)? else {
            return Ok(false);
        };
        tracing::debug!(%task_id, %status, index, writes = ticket.updates.len(), "persisting move");
        match self.gateway.update_positions(&ticket.updates).await {
            Ok(stored) => {
                self.state.confirm_move(stored);
                tracing::info!(%task_id, %status, index, "task moved");
                Ok(true)
            }
            Err(PartialWrite { stored, source }) => {
                let settled = self.undo_writes(task_id, stored).await;
                self.state.rollback_move();
                for row in settled {
                    self.state.reconcile(ChangeEvent::Updated(row));
                }
                tracing::warn!(%task_id, error = %source, "move failed, board restored");
                Err(BoardError::MoveRolledBack { task_id, source })
            }
        }
    }

    /// Put rows written by a failed move back to their pre-move slots.
    /// Returns the rows as the server now holds them.
    async fn undo_writes(&self, task_id: Uuid, written: Vec<Task>) -> Vec<Task> {
        let ids: Vec<Uuid> = written.iter().map(|t| t.id).collect();
        let reverts = self.state.reverting_updates(&ids);
        if reverts.is_empty() {
            return written;
        }
        match self.gateway.update_positions(&reverts).await {
            Ok(rows) => rows,
            Err(again) => {
                tracing::error!(%task_id, error = %again.source, "could not undo partial move");
                let undone: HashSet<Uuid> = again.stored.iter().map(|t| t.id).collect();
                written
                    .into_iter()
                    .filter(|t| !undone.contains(&t.id))
                    .chain(again.stored)
                    .collect()
            }
        }
    }

    // ── Forms ──────────────────────────────────────────────────────────

    /// Create a task at the bottom of its column.
    pub async fn create_task(
        &mut self,
        organization_id: Uuid,
        draft: &TaskDraft,
    ) -> Result<Task, FormError> {
        tasks::create_task(self.gateway.as_ref(), &mut self.state, organization_id, draft).await
    }

    // ── Realtime ───────────────────────────────────────────────────────

    pub fn is_live(&self) -> bool {
        self.listener.as_ref().is_some_and(RealtimeListener::is_live)
    }

    /// Wait for the next realtime message and apply it. `Ok(None)` once the
    /// feed has closed or when the board has no feed.
    pub async fn next_update(&mut self) -> Result<Option<BoardUpdate>, BoardError> {
        let Some(listener) = self.listener.as_mut() else {
            return Ok(None);
        };
        match listener.next().await {
            ListenerEvent::Live => Ok(Some(BoardUpdate::Live)),
            ListenerEvent::Change(event) => {
                let task_id = event.task_id();
                let kind = event.kind();
                let outcome = self.state.reconcile(event);
                tracing::debug!(%task_id, kind, ?outcome, "realtime change");
                Ok(Some(BoardUpdate::Reconciled { task_id, outcome }))
            }
            ListenerEvent::Resync => {
                self.reload().await?;
                Ok(Some(BoardUpdate::Reloaded))
            }
            ListenerEvent::Closed => Ok(None),
        }
    }

    /// Release the realtime channel. Must be called when the board closes.
    pub async fn unmount(mut self) {
        self.drag.cancel();
        if let Some(listener) = self.listener.take() {
            listener.stop().await;
        }
        tracing::debug!(project_id = %self.project_id(), "board unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use spaces_common::{POSITION_BASE, TaskPatch};

    struct Fixture {
        gw: Arc<MemoryGateway>,
        project_id: Uuid,
        webhook: Uuid,
    }

    fn fixture() -> Fixture {
        let gw = Arc::new(MemoryGateway::new());
        let project = gw.seed_project("Client site");
        for (i, title) in ["API", "Auth", "Billing"].iter().enumerate() {
            gw.seed_task(project.id, title, TaskStatus::Build, i as i32);
        }
        let webhook = gw.seed_task(project.id, "Webhook Setup", TaskStatus::Build, 3);
        gw.seed_task(project.id, "Login QA", TaskStatus::Qa, 0);
        gw.seed_task(project.id, "Search QA", TaskStatus::Qa, 1);
        Fixture {
            gw,
            project_id: project.id,
            webhook: webhook.id,
        }
    }

    fn assert_contiguous(gw: &MemoryGateway, board: &BoardState, status: TaskStatus) {
        let mut stored: Vec<i32> = board
            .column(status)
            .iter()
            .map(|t| gw.stored_task(t.id).unwrap().position)
            .collect();
        stored.sort();
        let expected: Vec<i32> = (0..stored.len() as i32).map(|i| POSITION_BASE + i).collect();
        assert_eq!(stored, expected, "stored positions of {status}");
    }

    fn assert_mirrors_server(gw: &MemoryGateway, board: &BoardState) {
        for status in TaskStatus::all() {
            for task in board.column(status) {
                assert_eq!(gw.stored_task(task.id).as_ref(), Some(task), "{}", task.title);
            }
        }
    }

    fn layout(board: &BoardState) -> Vec<Vec<Uuid>> {
        TaskStatus::all()
            .map(|status| board.column(status).iter().map(|t| t.id).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_drag_persists_moved_task_and_siblings() {
        let f = fixture();
        let mut board = ProjectBoard::open(f.gw.clone(), f.project_id).await.unwrap();

        board.start_drag(f.webhook).unwrap();
        board.drag_over(TaskStatus::Qa, 0.0, &[20.0, 60.0]).unwrap();
        let outcome = board.drop_dragged().await.unwrap();
        assert!(matches!(outcome, DropOutcome::Move(_)));

        let stored = f.gw.stored_task(f.webhook).unwrap();
        assert_eq!(stored.status, TaskStatus::Qa);
        assert_eq!(stored.position, 0);
        assert_eq!(board.state().task(f.webhook), Some(&stored));
        assert_contiguous(&f.gw, board.state(), TaskStatus::Qa);
        assert_contiguous(&f.gw, board.state(), TaskStatus::Build);
        // moved task + two displaced qa tasks
        assert_eq!(f.gw.write_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_exactly() {
        let f = fixture();
        let mut board = ProjectBoard::open(f.gw.clone(), f.project_id).await.unwrap();
        let before = board.state().snapshot();

        f.gw.fail_next_writes(1);
        let err = board.move_task(f.webhook, TaskStatus::Qa, 0).await.unwrap_err();
        assert!(matches!(err, BoardError::MoveRolledBack { task_id, .. } if task_id == f.webhook));
        assert_eq!(board.state().snapshot(), before);
        assert!(!board.drag().is_dragging());
        assert!(!board.state().has_pending_move());
    }

    #[tokio::test]
    async fn test_noop_and_cancelled_drops_make_no_request() {
        let f = fixture();
        let mut board = ProjectBoard::open(f.gw.clone(), f.project_id).await.unwrap();
        let requests = f.gw.request_count();

        board.start_drag(f.webhook).unwrap();
        board.drag_over(TaskStatus::Build, 100.0, &[10.0, 30.0, 50.0]).unwrap();
        assert_eq!(board.drop_dragged().await.unwrap(), DropOutcome::NoOp);

        board.start_drag(f.webhook).unwrap();
        board.drag_outside();
        assert_eq!(board.drop_dragged().await.unwrap(), DropOutcome::Cancelled);

        assert_eq!(f.gw.request_count(), requests);
    }

    #[tokio::test]
    async fn test_consecutive_moves_keep_stored_positions_contiguous() {
        let f = fixture();
        let mut board = ProjectBoard::open(f.gw.clone(), f.project_id).await.unwrap();
        let build: Vec<Uuid> = board.state().column(TaskStatus::Build).iter().map(|t| t.id).collect();

        board.move_task(build[0], TaskStatus::Qa, 2).await.unwrap();
        board.move_task(build[2], TaskStatus::Deploy, 0).await.unwrap();
        board.move_task(f.webhook, TaskStatus::Build, 0).await.unwrap();
        board.move_task(build[0], TaskStatus::Deploy, 1).await.unwrap();

        for status in [TaskStatus::Build, TaskStatus::Qa, TaskStatus::Deploy] {
            assert_contiguous(&f.gw, board.state(), status);
        }
    }

    #[tokio::test]
    async fn test_remote_changes_are_reconciled() {
        let f = fixture();
        let mut board = ProjectBoard::mount(f.gw.clone(), f.gw.as_ref(), f.project_id)
            .await
            .unwrap();
        assert_eq!(board.next_update().await.unwrap(), Some(BoardUpdate::Live));
        assert!(board.is_live());

        f.gw.delete_task_externally(f.webhook);
        let update = board.next_update().await.unwrap();
        assert_eq!(
            update,
            Some(BoardUpdate::Reconciled {
                task_id: f.webhook,
                outcome: ReconcileOutcome::Applied
            })
        );
        assert!(board.state().task(f.webhook).is_none());
        board.unmount().await;
    }

    #[tokio::test]
    async fn test_own_write_echo_is_ignored() {
        let f = fixture();
        let mut board = ProjectBoard::mount(f.gw.clone(), f.gw.as_ref(), f.project_id)
            .await
            .unwrap();
        board.next_update().await.unwrap();

        board.move_task(f.webhook, TaskStatus::Deploy, 0).await.unwrap();
        let after_move = board.state().snapshot();
        let echo = board.next_update().await.unwrap();
        assert_eq!(
            echo,
            Some(BoardUpdate::Reconciled {
                task_id: f.webhook,
                outcome: ReconcileOutcome::Ignored(IgnoreReason::Stale)
            })
        );
        assert_eq!(board.state().snapshot(), after_move);
        board.unmount().await;
    }

    #[tokio::test]
    async fn test_partial_failure_puts_written_rows_back() {
        let f = fixture();
        let mut board = ProjectBoard::open(f.gw.clone(), f.project_id).await.unwrap();
        let before = layout(board.state());
        let writes = f.gw.write_count();

        // The moved task is written, the first displaced sibling is not.
        f.gw.fail_writes_after(1, 1);
        let err = board.move_task(f.webhook, TaskStatus::Qa, 0).await.unwrap_err();
        assert!(matches!(err, BoardError::MoveRolledBack { task_id, .. } if task_id == f.webhook));

        let stored = f.gw.stored_task(f.webhook).unwrap();
        assert_eq!((stored.status, stored.position), (TaskStatus::Build, 3));
        assert_eq!(layout(board.state()), before);
        assert_mirrors_server(&f.gw, board.state());
        assert_contiguous(&f.gw, board.state(), TaskStatus::Qa);
        assert_contiguous(&f.gw, board.state(), TaskStatus::Build);
        // move, failed sibling, undo
        assert_eq!(f.gw.write_count() - writes, 3);
        assert!(!board.state().has_pending_move());
    }

    #[tokio::test]
    async fn test_failed_undo_shows_what_the_server_kept() {
        let f = fixture();
        let mut board = ProjectBoard::open(f.gw.clone(), f.project_id).await.unwrap();

        f.gw.fail_writes_after(1, 2);
        assert!(board.move_task(f.webhook, TaskStatus::Qa, 0).await.is_err());

        assert_eq!(f.gw.stored_task(f.webhook).unwrap().status, TaskStatus::Qa);
        assert_eq!(board.state().task(f.webhook).unwrap().status, TaskStatus::Qa);
        assert_mirrors_server(&f.gw, board.state());
    }

    #[tokio::test]
    async fn test_echo_of_undone_write_is_ignored() {
        let f = fixture();
        let mut board = ProjectBoard::mount(f.gw.clone(), f.gw.as_ref(), f.project_id)
            .await
            .unwrap();
        board.next_update().await.unwrap();

        f.gw.fail_writes_after(1, 1);
        assert!(board.move_task(f.webhook, TaskStatus::Qa, 0).await.is_err());
        let settled = board.state().snapshot();

        let update = board.next_update().await.unwrap();
        assert_eq!(
            update,
            Some(BoardUpdate::Reconciled {
                task_id: f.webhook,
                outcome: ReconcileOutcome::Ignored(IgnoreReason::Stale)
            })
        );
        assert_eq!(board.state().snapshot(), settled);
        assert_mirrors_server(&f.gw, board.state());
        board.unmount().await;
    }

    #[tokio::test]
    async fn test_unmount_with_unread_backlog_finishes() {
        let f = fixture();
        let mut board = ProjectBoard::mount(f.gw.clone(), f.gw.as_ref(), f.project_id)
            .await
            .unwrap();
        board.next_update().await.unwrap();

        // More changes than the subscription buffers, none of them read.
        for i in 0..300 {
            f.gw.update_task(f.webhook, &TaskPatch { position: Some(3 + i), ..Default::default() })
                .await
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        tokio::time::timeout(std::time::Duration::from_secs(5), board.unmount())
            .await
            .expect("unmount hung on a full feed");
    }

    #[tokio::test]
    async fn test_rejoin_reloads_from_server() {
        let f = fixture();
        let mut board = ProjectBoard::mount(f.gw.clone(), f.gw.as_ref(), f.project_id)
            .await
            .unwrap();
        board.next_update().await.unwrap();

        // A row that never produced an event, then a re-join.
        let missed = f.gw.seed_task(f.project_id, "Missed while offline", TaskStatus::Live, 0);
        f.gw.simulate_rejoin();
        assert_eq!(board.next_update().await.unwrap(), Some(BoardUpdate::Reloaded));
        assert!(board.state().task(missed.id).is_some());
        board.unmount().await;
    }

    #[tokio::test]
    async fn test_load_failure_is_retryable_and_keeps_state() {
        let f = fixture();
        let mut board = ProjectBoard::open(f.gw.clone(), f.project_id).await.unwrap();
        let before = board.state().snapshot();
        f.gw.fail_next_reads(1);
        match board.reload().await {
            Err(BoardError::Load(source)) => assert!(source.is_retryable()),
            other => panic!("expected load error, got {other:?}"),
        }
        assert_eq!(board.state().snapshot(), before);
    }
}
