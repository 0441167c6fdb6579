//! Navigation paths of the client.
//!
//! `spaces open <path>` accepts the same paths the web client links to, so
//! links from e-mails and notifications work from the terminal.

use std::fmt;

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    /// Public; needs no session.
    Approval { token: String },
    Dashboard,
    Inbox,
    MyTasks,
    Projects,
    Project { project_id: Uuid },
}

impl Route {
    /// Map a path to a route. Anything unmatched lands on the dashboard.
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["login"] => Self::Login,
            ["approval", token] => Self::Approval {
                token: (*token).to_string(),
            },
            ["app", "dashboard"] => Self::Dashboard,
            ["app", "inbox"] => Self::Inbox,
            ["app", "my-tasks"] => Self::MyTasks,
            ["app", "projects"] => Self::Projects,
            ["app", "projects", id] => match id.parse() {
                Ok(project_id) => Self::Project { project_id },
                Err(_) => Self::Dashboard,
            },
            _ => Self::Dashboard,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Self::Login | Self::Approval { .. })
    }

    /// Parse `path` and send protected routes to the login page when there
    /// is no session.
    pub fn resolve(path: &str, signed_in: bool) -> Self {
        let route = Self::parse(path);
        if route.is_public() || signed_in {
            route
        } else {
            Self::Login
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => f.write_str("/login"),
            Self::Approval { token } => write!(f, "/approval/{}", token),
            Self::Dashboard => f.write_str("/app/dashboard"),
            Self::Inbox => f.write_str("/app/inbox"),
            Self::MyTasks => f.write_str("/app/my-tasks"),
            Self::Projects => f.write_str("/app/projects"),
            Self::Project { project_id } => write!(f, "/app/projects/{}", project_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_paths() {
        assert_eq!(Route::parse("/login"), Route::Login);
        assert_eq!(Route::parse("/app/inbox"), Route::Inbox);
        assert_eq!(Route::parse("/app/my-tasks/"), Route::MyTasks);
        assert_eq!(
            Route::parse("/approval/abc123?utm=mail"),
            Route::Approval {
                token: "abc123".into()
            }
        );
        let id = Uuid::new_v4();
        assert_eq!(
            Route::parse(&format!("/app/projects/{id}")),
            Route::Project { project_id: id }
        );
    }

    #[test]
    fn test_unmatched_paths_redirect_to_dashboard() {
        for path in ["/", "", "/app", "/nope", "/app/projects/not-a-uuid", "/approval"] {
            assert_eq!(Route::parse(path), Route::Dashboard, "path {path:?}");
        }
    }

    #[test]
    fn test_protected_routes_need_session() {
        assert_eq!(Route::resolve("/app/inbox", false), Route::Login);
        assert_eq!(Route::resolve("/app/inbox", true), Route::Inbox);
        assert_eq!(Route::resolve("/unknown", false), Route::Login);
        assert!(matches!(
            Route::resolve("/approval/t", false),
            Route::Approval { .. }
        ));
    }

    #[test]
    fn test_display_round_trips() {
        let routes = [
            Route::Login,
            Route::Dashboard,
            Route::Project {
                project_id: Uuid::nil(),
            },
        ];
        for route in routes {
            assert_eq!(Route::parse(&route.to_string()), route);
        }
    }
}
