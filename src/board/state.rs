//! Tasks of one project, grouped by status and ordered by position.
//!
//! Local moves are applied optimistically and tracked as a pending move:
//! [`BoardState::begin_move`] snapshots the board and holds the touched
//! tasks, [`BoardState::confirm_move`] applies the persisted rows and
//! [`BoardState::rollback_move`] restores the snapshot. Realtime events for
//! held tasks are deferred until then and replayed afterwards, so a partially
//! persisted move still converges on what the server stored.
//!
//! Remote changes follow one rule: a row is applied only when its
//! `updated_at` is strictly newer than the copy held here. Duplicate and
//! out-of-order events are therefore harmless.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use uuid::Uuid;

use spaces_common::{POSITION_BASE, PositionUpdate, Task, TaskStatus};

use crate::errors::BoardError;
use crate::gateway::DataGateway;
use crate::realtime::ChangeEvent;

use super::filter::TaskFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Same or older `updated_at` than the held copy.
    Stale,
    /// Row belongs to another project.
    ForeignProject,
    /// Delete of a task that is not on the board.
    UnknownTask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    Ignored(IgnoreReason),
    /// Held by an in-flight move; replayed once it settles.
    Deferred,
}

/// Copy of every status group, for rollback and comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    groups: BTreeMap<TaskStatus, Vec<Task>>,
}

/// A move applied locally but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTicket {
    pub task_id: Uuid,
    /// Writes to persist, moved task first.
    pub updates: Vec<PositionUpdate>,
}

#[derive(Debug)]
struct PendingMove {
    task_id: Uuid,
    snapshot: BoardSnapshot,
    held: HashSet<Uuid>,
}

#[derive(Debug)]
pub struct BoardState {
    project_id: Uuid,
    groups: BTreeMap<TaskStatus, Vec<Task>>,
    pending: Option<PendingMove>,
    deferred: Vec<ChangeEvent>,
}

fn card_order(a: &Task, b: &Task) -> Ordering {
    a.position
        .cmp(&b.position)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

impl BoardState {
    pub fn new(project_id: Uuid) -> Self {
        Self {
            project_id,
            groups: TaskStatus::all().into_iter().map(|s| (s, Vec::new())).collect(),
            pending: None,
            deferred: Vec::new(),
        }
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    /// Fetch every task of the project. On failure the board is unchanged.
    pub async fn load(&mut self, gateway: &dyn DataGateway) -> Result<(), BoardError> {
        let tasks = gateway
            .list_tasks(self.project_id)
            .await
            .map_err(BoardError::Load)?;
        tracing::debug!(project_id = %self.project_id, count = tasks.len(), "board loaded");
        self.replace_all(tasks);
        Ok(())
    }

    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        for group in self.groups.values_mut() {
            group.clear();
        }
        for task in tasks {
            if task.project_id != self.project_id {
                continue;
            }
            self.group_mut(task.status).push(task);
        }
        for group in self.groups.values_mut() {
            group.sort_by(card_order);
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// The seven workflow columns, in board order.
    pub fn columns(&self) -> impl Iterator<Item = (TaskStatus, &[Task])> + '_ {
        TaskStatus::WORKFLOW
            .into_iter()
            .map(|status| (status, self.column(status)))
    }

    /// Tasks whose status is an exception stage, grouped by that stage.
    /// Empty groups are skipped.
    pub fn flagged(&self) -> impl Iterator<Item = (TaskStatus, &[Task])> + '_ {
        TaskStatus::BLOCKING
            .into_iter()
            .map(|status| (status, self.column(status)))
            .filter(|(_, tasks)| !tasks.is_empty())
    }

    pub fn column(&self, status: TaskStatus) -> &[Task] {
        self.groups.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.groups.values().flatten().find(|t| t.id == id)
    }

    /// Position for a task appended to `status`.
    pub fn next_position(&self, status: TaskStatus) -> i32 {
        self.column(status)
            .iter()
            .map(|t| t.position)
            .max()
            .map_or(POSITION_BASE, |max| max + 1)
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks of `status` that pass `filter`, in board order.
    pub fn filtered<'a>(&'a self, status: TaskStatus, filter: &'a TaskFilter) -> Vec<&'a Task> {
        self.column(status)
            .iter()
            .filter(|t| filter.matches(t))
            .collect()
    }

    pub fn has_pending_move(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_held(&self, id: Uuid) -> bool {
        self.pending.as_ref().is_some_and(|p| p.held.contains(&id))
    }

    // ── Snapshots ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            groups: self.groups.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: BoardSnapshot) {
        self.groups = snapshot.groups;
    }

    // ── Local moves ────────────────────────────────────────────────────

    fn group_mut(&mut self, status: TaskStatus) -> &mut Vec<Task> {
        self.groups.entry(status).or_default()
    }

    fn locate(&self, id: Uuid) -> Option<(TaskStatus, usize)> {
        self.groups.iter().find_map(|(status, tasks)| {
            tasks.iter().position(|t| t.id == id).map(|idx| (*status, idx))
        })
    }

    /// Move a task to `new_index` of `new_status` (clamped to the column) and
    /// renumber both affected columns from [`POSITION_BASE`].
    ///
    /// Returns the `(status, position)` writes needed to persist the result,
    /// moved task first; empty when the task stays in its slot.
    pub fn apply_local_move(
        &mut self,
        task_id: Uuid,
        new_status: TaskStatus,
        new_index: usize,
    ) -> Result<Vec<PositionUpdate>, BoardError> {
        let (from_status, from_index) = self
            .locate(task_id)
            .ok_or(BoardError::TaskNotFound { id: task_id })?;

        let mut before: Vec<(Uuid, TaskStatus, i32)> = Vec::new();
        for status in [from_status, new_status] {
            before.extend(self.column(status).iter().map(|t| (t.id, t.status, t.position)));
        }

        let mut task = self.group_mut(from_status).remove(from_index);
        let destination = self.group_mut(new_status);
        let index = new_index.min(destination.len());
        if from_status == new_status && index == from_index {
            destination.insert(index, task);
            return Ok(Vec::new());
        }
        task.status = new_status;
        destination.insert(index, task);

        for status in [from_status, new_status] {
            for (i, task) in self.group_mut(status).iter_mut().enumerate() {
                task.position = POSITION_BASE + i as i32;
            }
        }

        let mut updates: Vec<PositionUpdate> = Vec::new();
        for (id, status, position) in before {
            if updates.iter().any(|u| u.id == id) {
                continue;
            }
            let Some(task) = self.task(id) else { continue };
            if task.status != status || task.position != position {
                updates.push(PositionUpdate {
                    id,
                    status: task.status,
                    position: task.position,
                });
            }
        }
        if let Some(idx) = updates.iter().position(|u| u.id == task_id) {
            let moved = updates.remove(idx);
            updates.insert(0, moved);
        }
        Ok(updates)
    }

    // ── Two-phase commit ───────────────────────────────────────────────

    /// Apply a move locally and hold the touched tasks until it settles.
    ///
    /// `Ok(None)` when the move changes nothing; no move is left pending.
    pub fn begin_move(
        &mut self,
        task_id: Uuid,
        new_status: TaskStatus,
        new_index: usize,
    ) -> Result<Option<MoveTicket>, BoardError> {
        if self.pending.is_some() {
            return Err(BoardError::MoveInFlight);
        }
        let snapshot = self.snapshot();
        let updates = self.apply_local_move(task_id, new_status, new_index)?;
        if updates.is_empty() {
            return Ok(None);
        }
        self.pending = Some(PendingMove {
            task_id,
            snapshot,
            held: updates.iter().map(|u| u.id).collect(),
        });
        Ok(Some(MoveTicket { task_id, updates }))
    }

    /// Apply the rows the server stored, release the hold and replay
    /// deferred events.
    pub fn confirm_move(&mut self, stored: Vec<Task>) -> Vec<ReconcileOutcome> {
        let Some(pending) = self.pending.take() else {
            return Vec::new();
        };
        for row in stored {
            self.upsert(row, true);
        }
        tracing::debug!(task_id = %pending.task_id, "move confirmed");
        self.replay_deferred()
    }

    /// Writes that put `ids` back where they were when the pending move
    /// began. Ids the snapshot does not know are skipped.
    pub fn reverting_updates(&self, ids: &[Uuid]) -> Vec<PositionUpdate> {
        let Some(pending) = &self.pending else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| {
                pending.snapshot.groups.iter().find_map(|(status, tasks)| {
                    tasks.iter().find(|t| t.id == *id).map(|t| PositionUpdate {
                        id: t.id,
                        status: *status,
                        position: t.position,
                    })
                })
            })
            .collect()
    }

    /// Restore the pre-move snapshot, release the hold and replay deferred
    /// events.
    pub fn rollback_move(&mut self) -> Vec<ReconcileOutcome> {
        let Some(pending) = self.pending.take() else {
            return Vec::new();
        };
        self.restore(pending.snapshot);
        tracing::debug!(task_id = %pending.task_id, "move rolled back");
        self.replay_deferred()
    }

    fn replay_deferred(&mut self) -> Vec<ReconcileOutcome> {
        std::mem::take(&mut self.deferred)
            .into_iter()
            .map(|event| self.reconcile(event))
            .collect()
    }

    // ── Reconciliation ─────────────────────────────────────────────────

    pub fn reconcile(&mut self, event: ChangeEvent) -> ReconcileOutcome {
        if self.is_held(event.task_id()) {
            self.deferred.push(event);
            return ReconcileOutcome::Deferred;
        }
        match event {
            ChangeEvent::Inserted(task) | ChangeEvent::Updated(task) => {
                if task.project_id != self.project_id {
                    return if self.remove(task.id).is_some() {
                        ReconcileOutcome::Applied
                    } else {
                        ReconcileOutcome::Ignored(IgnoreReason::ForeignProject)
                    };
                }
                if self.upsert(task, false) {
                    ReconcileOutcome::Applied
                } else {
                    ReconcileOutcome::Ignored(IgnoreReason::Stale)
                }
            }
            ChangeEvent::Deleted { id } => match self.remove(id) {
                Some(_) => ReconcileOutcome::Applied,
                None => ReconcileOutcome::Ignored(IgnoreReason::UnknownTask),
            },
        }
    }

    /// Insert or replace `row`. Without `allow_equal` the held copy must be
    /// strictly older.
    fn upsert(&mut self, row: Task, allow_equal: bool) -> bool {
        if let Some(current) = self.task(row.id) {
            let newer = match row.updated_at.cmp(&current.updated_at) {
                Ordering::Greater => true,
                Ordering::Equal => allow_equal,
                Ordering::Less => false,
            };
            if !newer {
                return false;
            }
            self.remove(row.id);
        }
        let group = self.group_mut(row.status);
        let at = group
            .iter()
            .position(|t| card_order(&row, t) == Ordering::Less)
            .unwrap_or(group.len());
        group.insert(at, row);
        true
    }

    fn remove(&mut self, id: Uuid) -> Option<Task> {
        let (status, idx) = self.locate(id)?;
        Some(self.group_mut(status).remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use spaces_common::Priority;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn task(project_id: Uuid, title: &str, status: TaskStatus, position: i32) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id,
            organization_id: Uuid::nil(),
            title: title.into(),
            description: None,
            status,
            priority: Priority::Medium,
            position,
            assignee_id: None,
            due_date: None,
            created_at: at(0),
            updated_at: at(0),
        }
    }

    fn titles(board: &BoardState, status: TaskStatus) -> Vec<&str> {
        board.column(status).iter().map(|t| t.title.as_str()).collect()
    }

    fn positions(board: &BoardState, status: TaskStatus) -> Vec<i32> {
        board.column(status).iter().map(|t| t.position).collect()
    }

    /// build: [API, Auth, Billing, Webhook Setup], qa: [Login QA, Search QA]
    fn webhook_board() -> (BoardState, Uuid) {
        let project = Uuid::new_v4();
        let mut board = BoardState::new(project);
        let webhook = task(project, "Webhook Setup", TaskStatus::Build, 3);
        let id = webhook.id;
        board.replace_all(vec![
            task(project, "Search QA", TaskStatus::Qa, 1),
            task(project, "API", TaskStatus::Build, 0),
            webhook,
            task(project, "Auth", TaskStatus::Build, 1),
            task(project, "Login QA", TaskStatus::Qa, 0),
            task(project, "Billing", TaskStatus::Build, 2),
        ]);
        (board, id)
    }

    #[test]
    fn test_replace_all_orders_by_position() {
        let (board, _) = webhook_board();
        assert_eq!(titles(&board, TaskStatus::Build), ["API", "Auth", "Billing", "Webhook Setup"]);
        assert_eq!(titles(&board, TaskStatus::Qa), ["Login QA", "Search QA"]);
        assert_eq!(board.len(), 6);
        assert_eq!(board.columns().count(), 7);
        assert_eq!(board.flagged().count(), 0);
    }

    #[test]
    fn test_webhook_setup_moves_to_top_of_qa() {
        let (mut board, id) = webhook_board();
        let qa_before: Vec<(Uuid, i32)> = board
            .column(TaskStatus::Qa)
            .iter()
            .map(|t| (t.id, t.position))
            .collect();

        let updates = board.apply_local_move(id, TaskStatus::Qa, 0).unwrap();

        let moved = board.task(id).unwrap();
        assert_eq!(moved.status, TaskStatus::Qa);
        assert!(qa_before.iter().all(|(_, p)| moved.position < *p));
        for (qa_id, old) in &qa_before {
            assert_eq!(board.task(*qa_id).unwrap().position, old + 1);
        }
        assert!(board.column(TaskStatus::Build).iter().all(|t| t.status == TaskStatus::Build));
        assert_eq!(updates[0], PositionUpdate { id, status: TaskStatus::Qa, position: 0 });
        // The build column needed no renumbering: Webhook Setup was last.
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn test_move_within_column_renumbers_contiguously() {
        let (mut board, id) = webhook_board();
        let updates = board.apply_local_move(id, TaskStatus::Build, 1).unwrap();
        assert_eq!(titles(&board, TaskStatus::Build), ["API", "Webhook Setup", "Auth", "Billing"]);
        assert_eq!(positions(&board, TaskStatus::Build), [0, 1, 2, 3]);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].id, id);
    }

    #[test]
    fn test_same_slot_is_empty_update() {
        let (mut board, id) = webhook_board();
        let before = board.snapshot();
        assert!(board.apply_local_move(id, TaskStatus::Build, 3).unwrap().is_empty());
        // Index past the end clamps to the same slot.
        assert!(board.apply_local_move(id, TaskStatus::Build, 99).unwrap().is_empty());
        assert_eq!(board.snapshot(), before);
    }

    #[test]
    fn test_unknown_task_is_an_error() {
        let (mut board, _) = webhook_board();
        let err = board.apply_local_move(Uuid::new_v4(), TaskStatus::Qa, 0).unwrap_err();
        assert!(matches!(err, BoardError::TaskNotFound { .. }));
    }

    #[test]
    fn test_sequence_of_moves_keeps_columns_contiguous() {
        let (mut board, _) = webhook_board();
        let ids: Vec<Uuid> = board.column(TaskStatus::Build).iter().map(|t| t.id).collect();
        board.apply_local_move(ids[0], TaskStatus::Deploy, 0).unwrap();
        board.apply_local_move(ids[2], TaskStatus::Qa, 1).unwrap();
        board.apply_local_move(ids[1], TaskStatus::Qa, 0).unwrap();
        board.apply_local_move(ids[0], TaskStatus::Build, 5).unwrap();
        for (status, tasks) in board.columns() {
            let expected: Vec<i32> = (0..tasks.len() as i32).map(|i| POSITION_BASE + i).collect();
            assert_eq!(positions(&board, status), expected, "column {status}");
        }
    }

    #[test]
    fn test_rollback_restores_exact_state() {
        let (mut board, id) = webhook_board();
        let before = board.snapshot();
        let ticket = board.begin_move(id, TaskStatus::Qa, 1).unwrap().unwrap();
        assert!(board.is_held(id));
        assert_ne!(board.snapshot(), before);
        assert_eq!(ticket.updates[0].id, id);

        board.rollback_move();
        assert_eq!(board.snapshot(), before);
        assert!(!board.has_pending_move());
    }

    #[test]
    fn test_begin_move_rejects_second_move() {
        let (mut board, id) = webhook_board();
        board.begin_move(id, TaskStatus::Qa, 0).unwrap();
        let other = board.column(TaskStatus::Build)[0].id;
        assert!(matches!(
            board.begin_move(other, TaskStatus::Qa, 0),
            Err(BoardError::MoveInFlight)
        ));
    }

    #[test]
    fn test_noop_move_leaves_nothing_pending() {
        let (mut board, id) = webhook_board();
        assert!(board.begin_move(id, TaskStatus::Build, 3).unwrap().is_none());
        assert!(!board.has_pending_move());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (mut board, id) = webhook_board();
        let mut row = board.task(id).unwrap().clone();
        row.title = "Webhook Setup v2".into();
        row.updated_at = at(5);
        let event = ChangeEvent::Updated(row);

        assert_eq!(board.reconcile(event.clone()), ReconcileOutcome::Applied);
        let once = board.snapshot();
        assert_eq!(
            board.reconcile(event),
            ReconcileOutcome::Ignored(IgnoreReason::Stale)
        );
        assert_eq!(board.snapshot(), once);
    }

    #[test]
    fn test_reconcile_newest_wins_out_of_order() {
        let (mut board, id) = webhook_board();
        let mut older = board.task(id).unwrap().clone();
        older.status = TaskStatus::Qa;
        older.updated_at = at(1);
        let mut newer = older.clone();
        newer.status = TaskStatus::Deploy;
        newer.updated_at = at(2);

        board.reconcile(ChangeEvent::Updated(newer));
        board.reconcile(ChangeEvent::Updated(older));
        assert_eq!(board.task(id).unwrap().status, TaskStatus::Deploy);
        assert!(board.column(TaskStatus::Qa).iter().all(|t| t.id != id));
    }

    #[test]
    fn test_reconcile_insert_delete_and_foreign_rows() {
        let (mut board, id) = webhook_board();
        let project = board.project_id();

        let mut new = task(project, "Docs", TaskStatus::Discovery, 0);
        new.updated_at = at(1);
        assert_eq!(board.reconcile(ChangeEvent::Inserted(new.clone())), ReconcileOutcome::Applied);
        assert_eq!(titles(&board, TaskStatus::Discovery), ["Docs"]);

        // Row moved to another project leaves this board.
        let mut moved_away = board.task(id).unwrap().clone();
        moved_away.project_id = Uuid::new_v4();
        moved_away.updated_at = at(3);
        assert_eq!(board.reconcile(ChangeEvent::Updated(moved_away)), ReconcileOutcome::Applied);
        assert!(board.task(id).is_none());

        let foreign = task(Uuid::new_v4(), "Elsewhere", TaskStatus::Build, 0);
        assert_eq!(
            board.reconcile(ChangeEvent::Inserted(foreign)),
            ReconcileOutcome::Ignored(IgnoreReason::ForeignProject)
        );

        assert_eq!(board.reconcile(ChangeEvent::Deleted { id: new.id }), ReconcileOutcome::Applied);
        assert_eq!(
            board.reconcile(ChangeEvent::Deleted { id: new.id }),
            ReconcileOutcome::Ignored(IgnoreReason::UnknownTask)
        );
    }

    #[test]
    fn test_events_for_held_tasks_replay_after_rollback() {
        let (mut board, id) = webhook_board();
        board.begin_move(id, TaskStatus::Qa, 0).unwrap();

        let mut remote = board.snapshot().groups[&TaskStatus::Qa]
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .unwrap();
        remote.title = "Renamed elsewhere".into();
        remote.status = TaskStatus::Build;
        remote.position = 3;
        remote.updated_at = at(10);
        assert_eq!(board.reconcile(ChangeEvent::Updated(remote)), ReconcileOutcome::Deferred);

        let outcomes = board.rollback_move();
        assert_eq!(outcomes, [ReconcileOutcome::Applied]);
        assert_eq!(board.task(id).unwrap().title, "Renamed elsewhere");
    }

    #[test]
    fn test_confirm_applies_stored_rows() {
        let (mut board, id) = webhook_board();
        let ticket = board.begin_move(id, TaskStatus::Qa, 0).unwrap().unwrap();
        let stored: Vec<Task> = ticket
            .updates
            .iter()
            .map(|u| {
                let mut row = board.task(u.id).unwrap().clone();
                row.updated_at = at(20);
                row
            })
            .collect();
        board.confirm_move(stored);
        assert!(!board.has_pending_move());
        assert_eq!(board.task(id).unwrap().updated_at, at(20));
        assert_eq!(positions(&board, TaskStatus::Qa), [0, 1, 2]);
    }

    #[test]
    fn test_flagged_groups_and_next_position() {
        let project = Uuid::new_v4();
        let mut board = BoardState::new(project);
        assert_eq!(board.next_position(TaskStatus::Build), POSITION_BASE);
        board.replace_all(vec![
            task(project, "Broken deploy", TaskStatus::Hotfix, 0),
            task(project, "Waiting on client", TaskStatus::NeedsClientApproval, 4),
        ]);
        let flagged: Vec<TaskStatus> = board.flagged().map(|(s, _)| s).collect();
        assert_eq!(flagged, [TaskStatus::NeedsClientApproval, TaskStatus::Hotfix]);
        assert_eq!(board.next_position(TaskStatus::NeedsClientApproval), 5);
    }
}
