//! Dashboard figures and the "my tasks" grouping, computed client-side.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

use spaces_common::{Task, TaskStatus};

/// Days ahead counted as "due soon".
pub const DUE_SOON_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub by_status: BTreeMap<TaskStatus, usize>,
    /// Tasks in an exception stage.
    pub flagged: usize,
    pub overdue: usize,
    pub due_soon: usize,
}

fn is_done(task: &Task) -> bool {
    task.status == TaskStatus::Live
}

pub fn summarize(tasks: &[Task], today: NaiveDate) -> Summary {
    let soon = today + Duration::days(DUE_SOON_DAYS);
    let mut summary = Summary {
        total: tasks.len(),
        ..Summary::default()
    };
    for task in tasks {
        *summary.by_status.entry(task.status).or_default() += 1;
        if task.status.is_blocking() {
            summary.flagged += 1;
        }
        if is_done(task) {
            continue;
        }
        match task.due_date {
            Some(due) if due < today => summary.overdue += 1,
            Some(due) if due <= soon => summary.due_soon += 1,
            _ => {}
        }
    }
    summary
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MyTasks {
    pub overdue: Vec<Task>,
    pub today: Vec<Task>,
    pub upcoming: Vec<Task>,
    pub no_due_date: Vec<Task>,
}

impl MyTasks {
    pub fn len(&self) -> usize {
        self.overdue.len() + self.today.len() + self.upcoming.len() + self.no_due_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Group assigned tasks by due date relative to `today`. Each group is
/// sorted by due date, then priority (urgent first), then title.
pub fn group_my_tasks(tasks: Vec<Task>, today: NaiveDate) -> MyTasks {
    let mut groups = MyTasks::default();
    for task in tasks {
        match task.due_date {
            None => groups.no_due_date.push(task),
            Some(due) if due < today => groups.overdue.push(task),
            Some(due) if due == today => groups.today.push(task),
            Some(_) => groups.upcoming.push(task),
        }
    }
    for group in [
        &mut groups.overdue,
        &mut groups.today,
        &mut groups.upcoming,
        &mut groups.no_due_date,
    ] {
        group.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then_with(|| a.priority.rank().cmp(&b.priority.rank()))
                .then_with(|| a.title.cmp(&b.title))
        });
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spaces_common::Priority;
    use uuid::Uuid;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn task(title: &str, status: TaskStatus, priority: Priority, due: Option<NaiveDate>) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            organization_id: Uuid::nil(),
            title: title.into(),
            description: None,
            status,
            priority,
            position: 0,
            assignee_id: None,
            due_date: due,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summary_counts() {
        let today = day(16);
        let tasks = vec![
            task("late", TaskStatus::Build, Priority::High, Some(day(10))),
            task("shipped late", TaskStatus::Live, Priority::Low, Some(day(1))),
            task("soon", TaskStatus::Qa, Priority::Low, Some(day(20))),
            task("later", TaskStatus::Design, Priority::Low, Some(day(30))),
            task("bug", TaskStatus::Bug, Priority::Urgent, None),
        ];
        let summary = summarize(&tasks, today);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.due_soon, 1);
        assert_eq!(summary.flagged, 1);
        assert_eq!(summary.by_status.get(&TaskStatus::Live), Some(&1));
    }

    #[test]
    fn test_group_my_tasks_buckets_and_order() {
        let today = day(16);
        let groups = group_my_tasks(
            vec![
                task("b", TaskStatus::Build, Priority::Low, Some(day(16))),
                task("a", TaskStatus::Build, Priority::Urgent, Some(day(16))),
                task("old", TaskStatus::Qa, Priority::Low, Some(day(2))),
                task("next", TaskStatus::Qa, Priority::Low, Some(day(17))),
                task("someday", TaskStatus::Discovery, Priority::Medium, None),
            ],
            today,
        );
        let titles = |g: &[Task]| g.iter().map(|t| t.title.clone()).collect::<Vec<_>>();
        assert_eq!(titles(&groups.today), ["a", "b"]);
        assert_eq!(titles(&groups.overdue), ["old"]);
        assert_eq!(titles(&groups.upcoming), ["next"]);
        assert_eq!(titles(&groups.no_due_date), ["someday"]);
        assert_eq!(groups.len(), 5);
    }
}
