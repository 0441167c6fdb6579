//! Public client-approval flow.
//!
//! Addressed only by an opaque token; no session is involved. Every failure
//! surfaces as one of the coarse [`ApprovalError`] kinds.

use std::sync::Arc;

use spaces_common::{ApprovalDetails, Decision, DecisionOutcome};

use crate::errors::ApprovalError;
use crate::gateway::ApprovalEndpoint;
use crate::validation::{FieldError, ValidationErrors, non_blank};

pub const MAX_COMMENT_LEN: usize = 2000;

pub struct ApprovalFlow {
    endpoint: Arc<dyn ApprovalEndpoint>,
}

fn clean_token(token: &str) -> Result<&str, ApprovalError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApprovalError::InvalidOrExpired);
    }
    Ok(token)
}

/// Trimmed comment, `None` when blank.
pub fn clean_comment(comment: Option<&str>) -> Result<Option<String>, ValidationErrors> {
    let comment = non_blank(comment);
    let mut errors = ValidationErrors::default();
    if comment
        .as_deref()
        .is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN)
    {
        errors.push(FieldError::new(
            "comment",
            format!("Comment must be at most {} characters", MAX_COMMENT_LEN),
        ));
    }
    errors.into_result(comment)
}

impl ApprovalFlow {
    pub fn new(endpoint: Arc<dyn ApprovalEndpoint>) -> Self {
        Self { endpoint }
    }

    pub async fn fetch_details(&self, token: &str) -> Result<ApprovalDetails, ApprovalError> {
        let token = clean_token(token)?;
        let details = self.endpoint.fetch_approval(token).await?;
        tracing::debug!(task_id = %details.task.id, state = ?details.state, "approval loaded");
        Ok(details)
    }

    pub async fn submit_decision(
        &self,
        token: &str,
        decision: Decision,
        comment: Option<&str>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        let token = clean_token(token)?;
        let comment = clean_comment(comment).map_err(ApprovalError::Validation)?;
        let outcome = self
            .endpoint
            .submit_approval(token, decision, comment.as_deref())
            .await?;
        tracing::info!(decision = decision.as_str(), state = ?outcome.state, "approval decided");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use spaces_common::{ApprovalProject, ApprovalTask, DecisionState, TaskStatus};
    use uuid::Uuid;

    fn details(state: DecisionState) -> ApprovalDetails {
        ApprovalDetails {
            task: ApprovalTask {
                id: Uuid::new_v4(),
                title: "Homepage hero".into(),
                description: Some("Final copy and imagery".into()),
                status: TaskStatus::NeedsClientApproval,
                due_date: None,
            },
            project: ApprovalProject {
                name: "Acme site".into(),
                client_name: Some("Acme".into()),
            },
            state,
            comment: None,
            decided_at: None,
        }
    }

    fn flow_with(token: &str, state: DecisionState) -> (Arc<MemoryGateway>, ApprovalFlow) {
        let gw = Arc::new(MemoryGateway::new());
        gw.seed_approval(token, details(state), None);
        let flow = ApprovalFlow::new(gw.clone());
        (gw, flow)
    }

    #[tokio::test]
    async fn test_blank_token_makes_no_request() {
        let (gw, flow) = flow_with("t1", DecisionState::Pending);
        assert_eq!(flow.fetch_details("  ").await, Err(ApprovalError::InvalidOrExpired));
        assert_eq!(
            flow.submit_decision("", Decision::Approve, None).await,
            Err(ApprovalError::InvalidOrExpired)
        );
        assert_eq!(gw.request_count(), 0);
    }

    #[tokio::test]
    async fn test_approve_with_trimmed_comment() {
        let (gw, flow) = flow_with("t1", DecisionState::Pending);
        let details = flow.fetch_details("t1").await.unwrap();
        assert_eq!(details.project.name, "Acme site");

        let outcome = flow
            .submit_decision("t1", Decision::Approve, Some("  Looks great  "))
            .await
            .unwrap();
        assert_eq!(outcome.state, DecisionState::Approved);
        assert_eq!(outcome.comment.as_deref(), Some("Looks great"));
        assert_eq!(gw.approval_state("t1").unwrap().state, DecisionState::Approved);
    }

    #[tokio::test]
    async fn test_second_decision_is_already_decided() {
        let (gw, flow) = flow_with("t1", DecisionState::Approved);
        let before = gw.approval_state("t1").unwrap();
        assert_eq!(
            flow.submit_decision("t1", Decision::Reject, Some("changed my mind"))
                .await,
            Err(ApprovalError::AlreadyDecided)
        );
        assert_eq!(gw.approval_state("t1").unwrap(), before);
    }

    #[tokio::test]
    async fn test_long_comment_fails_validation_before_request() {
        let (gw, flow) = flow_with("t1", DecisionState::Pending);
        let comment = "a".repeat(MAX_COMMENT_LEN + 1);
        let result = flow
            .submit_decision("t1", Decision::Reject, Some(&comment))
            .await;
        assert!(matches!(result, Err(ApprovalError::Validation(_))));
        assert_eq!(gw.request_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_and_unknown_tokens_look_the_same() {
        let gw = Arc::new(MemoryGateway::new());
        gw.seed_approval(
            "old",
            details(DecisionState::Pending),
            Some(chrono::Utc::now() - chrono::Duration::days(1)),
        );
        let flow = ApprovalFlow::new(gw.clone());
        assert_eq!(flow.fetch_details("old").await, Err(ApprovalError::InvalidOrExpired));
        assert_eq!(flow.fetch_details("nope").await, Err(ApprovalError::InvalidOrExpired));
    }

    #[tokio::test]
    async fn test_network_failure_is_retryable() {
        let (gw, flow) = flow_with("t1", DecisionState::Pending);
        gw.fail_next_reads(1);
        let err = flow.fetch_details("t1").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(flow.fetch_details("t1").await.is_ok());
    }
}
