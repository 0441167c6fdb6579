//! Plain-text views of boards, lists and the approval page.
//!
//! Every function returns a `String` so commands decide where it goes.

use std::fmt::Write;

use chrono::NaiveDate;
use console::style;
use uuid::Uuid;

use spaces_common::{ApprovalDetails, DecisionState, Notification, Priority, Project, Task};

use crate::board::{BoardState, TaskFilter};
use crate::dashboard::{MyTasks, Summary};

use super::icons::{BELL, CLOCK, FLAG, UNREAD};

/// First eight hex digits of an id, enough to tell tasks apart on screen.
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

fn priority_badge(priority: Priority) -> String {
    let text = priority.as_str();
    match priority {
        Priority::Urgent => style(text).red().bold().to_string(),
        Priority::High => style(text).yellow().to_string(),
        Priority::Medium => text.to_string(),
        Priority::Low => style(text).dim().to_string(),
    }
}

pub fn task_line(task: &Task) -> String {
    let mut line = format!(
        "{} {}  {}",
        style(short_id(task.id)).dim(),
        task.title,
        priority_badge(task.priority)
    );
    if let Some(due) = task.due_date {
        let _ = write!(line, "  {}{}", CLOCK, due);
    }
    line
}

pub fn render_board(board: &BoardState, filter: &TaskFilter) -> String {
    let mut out = String::new();
    for (status, _) in board.columns() {
        let tasks = board.filtered(status, filter);
        let _ = writeln!(
            out,
            "{} {}",
            style(format!("── {} ──", status.label())).bold(),
            style(format!("({})", tasks.len())).dim()
        );
        if tasks.is_empty() {
            let _ = writeln!(out, "  {}", style("no tasks").dim());
        }
        for (index, task) in tasks.iter().enumerate() {
            let _ = writeln!(out, "  {:>2}. {}", index, task_line(task));
        }
    }

    let flagged: Vec<_> = board
        .flagged()
        .map(|(status, _)| (status, board.filtered(status, filter)))
        .filter(|(_, tasks)| !tasks.is_empty())
        .collect();
    if !flagged.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}{}", FLAG, style("Flagged").red().bold());
        for (status, tasks) in flagged {
            let _ = writeln!(out, "  {}", style(status.label()).red());
            for (index, task) in tasks.iter().enumerate() {
                let _ = writeln!(out, "    {:>2}. {}", index, task_line(task));
            }
        }
    }
    out
}

pub fn render_projects(projects: &[Project]) -> String {
    let mut out = String::new();
    for project in projects {
        let _ = write!(
            out,
            "{}  {}",
            style(project.id).dim(),
            style(&project.name).bold()
        );
        if let Some(client) = &project.client_name {
            let _ = write!(out, "  {}", style(format!("for {}", client)).dim());
        }
        if project.is_archived {
            let _ = write!(out, "  {}", style("archived").yellow());
        }
        out.push('\n');
    }
    out
}

pub fn render_inbox(items: &[Notification]) -> String {
    if items.is_empty() {
        return format!("{}\n", style("Inbox is empty").dim());
    }
    let mut out = String::new();
    for n in items {
        let marker = if n.is_read {
            "  ".to_string()
        } else {
            style(UNREAD.to_string()).cyan().to_string()
        };
        let _ = write!(
            out,
            "{}{} {}  {}",
            marker,
            style(short_id(n.id)).dim(),
            n.title,
            style(n.created_at.format("%Y-%m-%d %H:%M")).dim()
        );
        if let Some(message) = &n.message {
            let _ = write!(out, "\n     {}", message);
        }
        out.push('\n');
    }
    out
}

pub fn render_summary(summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style("Dashboard").bold());
    let _ = writeln!(out, "  Tasks      {}", summary.total);
    let _ = writeln!(out, "  Overdue    {}", style(summary.overdue).red());
    let _ = writeln!(out, "  Due soon   {}", style(summary.due_soon).yellow());
    let _ = writeln!(out, "  Flagged    {}", summary.flagged);
    for (status, count) in &summary.by_status {
        let _ = writeln!(out, "    {:<24} {}", status.label(), count);
    }
    out
}

pub fn render_my_tasks(groups: &MyTasks) -> String {
    if groups.is_empty() {
        return format!("{}\n", style("Nothing assigned to you").dim());
    }
    let mut out = String::new();
    let sections = [
        ("Overdue", &groups.overdue),
        ("Today", &groups.today),
        ("Upcoming", &groups.upcoming),
        ("No due date", &groups.no_due_date),
    ];
    for (title, tasks) in sections {
        if tasks.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} {}", style(title).bold(), style(format!("({})", tasks.len())).dim());
        for task in tasks {
            let _ = writeln!(out, "  {}  {}", task_line(task), style(task.status.label()).dim());
        }
    }
    out
}

pub fn render_approval(details: &ApprovalDetails) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}{}", BELL, style("Approval request").bold());
    let _ = writeln!(out, "  Project  {}", details.project.name);
    if let Some(client) = &details.project.client_name {
        let _ = writeln!(out, "  Client   {}", client);
    }
    let _ = writeln!(out, "  Task     {}", style(&details.task.title).bold());
    if let Some(description) = &details.task.description {
        let _ = writeln!(out, "  {}", description);
    }
    if let Some(due) = details.task.due_date {
        let _ = writeln!(out, "  Due      {}", due);
    }
    let state = match details.state {
        DecisionState::Pending => style("pending").yellow(),
        DecisionState::Approved => style("approved").green(),
        DecisionState::Rejected => style("rejected").red(),
    };
    let _ = writeln!(out, "  Status   {}", state);
    if let Some(comment) = &details.comment {
        let _ = writeln!(out, "  Comment  {}", comment);
    }
    out
}

/// Human label for a due date relative to `today`.
pub fn due_label(due: NaiveDate, today: NaiveDate) -> String {
    match (due - today).num_days() {
        0 => "today".into(),
        1 => "tomorrow".into(),
        -1 => "yesterday".into(),
        d if d < 0 => format!("{} days ago", -d),
        d => format!("in {} days", d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use console::strip_ansi_codes;
    use spaces_common::TaskStatus;

    fn task(project_id: Uuid, title: &str, status: TaskStatus, position: i32) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id,
            organization_id: Uuid::nil(),
            title: title.into(),
            description: None,
            status,
            priority: Priority::High,
            position,
            assignee_id: None,
            due_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_board_renders_columns_in_order_with_flagged_strip() {
        let project = Uuid::new_v4();
        let mut board = BoardState::new(project);
        board.replace_all(vec![
            task(project, "Wireframes", TaskStatus::Design, 0),
            task(project, "Prod outage", TaskStatus::Hotfix, 0),
        ]);
        let text = strip_ansi_codes(&render_board(&board, &TaskFilter::default())).to_string();

        let discovery = text.find("Discovery").unwrap();
        let design = text.find("Design").unwrap();
        let optimization = text.find("Optimization").unwrap();
        let flagged = text.find("Flagged").unwrap();
        assert!(discovery < design && design < optimization && optimization < flagged);
        assert!(text.contains("Wireframes"));
        assert!(text[flagged..].contains("Prod outage"));
    }

    #[test]
    fn test_filter_hides_tasks_and_flagged_strip() {
        let project = Uuid::new_v4();
        let mut board = BoardState::new(project);
        board.replace_all(vec![
            task(project, "Wireframes", TaskStatus::Design, 0),
            task(project, "Prod outage", TaskStatus::Hotfix, 0),
        ]);
        let filter = TaskFilter {
            text: Some("wire".into()),
            ..Default::default()
        };
        let text = strip_ansi_codes(&render_board(&board, &filter)).to_string();
        assert!(text.contains("Wireframes"));
        assert!(!text.contains("Prod outage"));
        assert!(!text.contains("Flagged"));
    }

    #[test]
    fn test_short_id_and_due_label() {
        assert_eq!(short_id(Uuid::nil()), "00000000");
        let today = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(due_label(today, today), "today");
        assert_eq!(due_label(today.succ_opt().unwrap(), today), "tomorrow");
        assert_eq!(
            due_label(NaiveDate::from_ymd_opt(2026, 10, 10).unwrap(), today),
            "6 days ago"
        );
    }

    #[test]
    fn test_empty_inbox() {
        assert!(strip_ansi_codes(&render_inbox(&[])).contains("Inbox is empty"));
    }
}
