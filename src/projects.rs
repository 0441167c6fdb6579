//! Project list, creation and archiving.
//!
//! Projects are never deleted from here; archiving hides them from the
//! default list.

use uuid::Uuid;

use spaces_common::{NewProject, Project, ProjectPatch};

use crate::errors::{FormError, GatewayError};
use crate::gateway::DataGateway;
use crate::validation::{FieldError, ValidationErrors, non_blank};

pub const DEFAULT_COLOR: &str = "#6366f1";
pub const MAX_NAME_LEN: usize = 120;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectDraft {
    pub name: String,
    pub description: Option<String>,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    /// `#rrggbb`; the default color when absent.
    pub color: Option<String>,
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl ProjectDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self, organization_id: Uuid) -> Result<NewProject, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let name = self.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new("name", "Project name is required"));
        } else if name.chars().count() > MAX_NAME_LEN {
            errors.push(FieldError::new(
                "name",
                format!("Project name must be at most {} characters", MAX_NAME_LEN),
            ));
        }

        let color = non_blank(self.color.as_deref())
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| DEFAULT_COLOR.to_string());
        if !is_hex_color(&color) {
            errors.push(FieldError::new("color", "Color must look like #rrggbb"));
        }

        let client_email = non_blank(self.client_email.as_deref());
        if client_email.as_deref().is_some_and(|e| !e.contains('@')) {
            errors.push(FieldError::new("client_email", "Enter a valid email address"));
        }

        errors.into_result(NewProject {
            organization_id,
            name: name.to_string(),
            description: non_blank(self.description.as_deref()),
            client_name: non_blank(self.client_name.as_deref()),
            client_email,
            color,
        })
    }
}

pub async fn list_projects(
    gateway: &dyn DataGateway,
    include_archived: bool,
) -> Result<Vec<Project>, GatewayError> {
    gateway.list_projects(include_archived).await
}

pub async fn create_project(
    gateway: &dyn DataGateway,
    organization_id: Uuid,
    draft: &ProjectDraft,
) -> Result<Project, FormError> {
    let new_project = draft
        .validate(organization_id)
        .map_err(FormError::Validation)?;
    let project = gateway.create_project(&new_project).await?;
    tracing::info!(project_id = %project.id, name = %project.name, "project created");
    Ok(project)
}

async fn set_archived(
    gateway: &dyn DataGateway,
    id: Uuid,
    archived: bool,
) -> Result<Project, GatewayError> {
    let patch = ProjectPatch {
        is_archived: Some(archived),
        ..ProjectPatch::default()
    };
    let project = gateway.update_project(id, &patch).await?;
    tracing::info!(project_id = %id, archived, "project archive flag changed");
    Ok(project)
}

pub async fn archive(gateway: &dyn DataGateway, id: Uuid) -> Result<Project, GatewayError> {
    set_archived(gateway, id, true).await
}

pub async fn unarchive(gateway: &dyn DataGateway, id: Uuid) -> Result<Project, GatewayError> {
    set_archived(gateway, id, false).await
}
