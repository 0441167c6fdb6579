use uuid::Uuid;

use spaces_common::{Priority, Task};

/// Client-side view filter. Never changes board state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Case-insensitive match on title or description.
    pub text: Option<String>,
    pub priority: Option<Priority>,
    pub assignee: Option<Uuid>,
}

impl TaskFilter {
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(|t| t.trim().is_empty())
            && self.priority.is_none()
            && self.assignee.is_none()
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(priority) = self.priority {
            if task.priority != priority {
                return false;
            }
        }
        if let Some(assignee) = self.assignee {
            if task.assignee_id != Some(assignee) {
                return false;
            }
        }
        match self.text.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use spaces_common::TaskStatus;

    fn task(title: &str, description: Option<&str>, priority: Priority) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            organization_id: Uuid::nil(),
            title: title.into(),
            description: description.map(Into::into),
            status: TaskStatus::Build,
            priority,
            position: 0,
            assignee_id: None,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = TaskFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&task("Anything", None, Priority::Low)));
    }

    #[test]
    fn test_text_matches_title_or_description() {
        let filter = TaskFilter {
            text: Some("  WEBHOOK ".into()),
            ..Default::default()
        };
        assert!(filter.matches(&task("Webhook setup", None, Priority::Low)));
        assert!(filter.matches(&task("Payments", Some("retry the webhook"), Priority::Low)));
        assert!(!filter.matches(&task("Payments", None, Priority::Low)));
    }

    #[test]
    fn test_priority_and_assignee_combine() {
        let me = Uuid::new_v4();
        let filter = TaskFilter {
            priority: Some(Priority::Urgent),
            assignee: Some(me),
            ..Default::default()
        };
        let mut hit = task("Fix", None, Priority::Urgent);
        hit.assignee_id = Some(me);
        assert!(filter.matches(&hit));
        hit.priority = Priority::High;
        assert!(!filter.matches(&hit));
    }
}
