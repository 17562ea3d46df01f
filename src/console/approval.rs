use curator_api_types::{
    ApprovalDecision, ApprovalRequest, BatchApprovalRequest, BatchApprovalResult, ContentType,
    CountedList, PendingItem,
};
use serde_json::Value;

use crate::cache::{MutationTarget, ResourceType, query_keys};
use crate::error::SyncError;
use crate::mutation::MutationPlan;
use crate::mutation::transform::remove_where;

use super::Console;

impl Console {
    /// Pending items of one content type, or of every type when `None`.
    pub async fn approval_pending(
        &self,
        content_type: Option<ContentType>,
    ) -> Result<CountedList<PendingItem>, SyncError> {
        self.query(
            &query_keys::approval_pending(content_type),
            self.options(),
            || self.api.approval_pending(content_type),
        )
        .await
    }

    pub async fn approval_stats(&self) -> Result<Value, SyncError> {
        self.query(&query_keys::approval_stats(), self.options(), || {
            self.api.approval_stats()
        })
        .await
    }

    pub async fn approve(
        &self,
        content_type: ContentType,
        content_id: i64,
        notes: Option<String>,
    ) -> Result<Value, SyncError> {
        self.decide(content_type, content_id, ApprovalDecision::Approved, notes)
            .await
    }

    pub async fn reject(
        &self,
        content_type: ContentType,
        content_id: i64,
        notes: Option<String>,
    ) -> Result<Value, SyncError> {
        self.decide(content_type, content_id, ApprovalDecision::Rejected, notes)
            .await
    }

    /// Record a decision, dropping the item from the `all` view and from its
    /// own content type's view before the server confirms.
    async fn decide(
        &self,
        content_type: ContentType,
        content_id: i64,
        status: ApprovalDecision,
        notes: Option<String>,
    ) -> Result<Value, SyncError> {
        let request = ApprovalRequest {
            content_type,
            content_id,
            status,
            approved_by: self.reviewer(),
            approval_notes: notes,
        };
        let kind = content_type.as_str();
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Approval))
            .affecting(query_keys::approval_pending(None))
            .affecting(query_keys::approval_pending(Some(content_type)))
            .speculate(move |_, value| {
                remove_where(value, |item| {
                    item.get("content_type").and_then(Value::as_str) == Some(kind)
                        && item.get("content_id").and_then(Value::as_i64) == Some(content_id)
                })
            });
        self.mutations.mutate(plan, self.api.decide(&request)).await
    }

    /// Submit several decisions at once; lists refresh afterwards.
    pub async fn batch_approve(
        &self,
        items: Vec<ApprovalRequest>,
    ) -> Result<BatchApprovalResult, SyncError> {
        let batch = BatchApprovalRequest { items };
        let plan = MutationPlan::new(MutationTarget::write(ResourceType::Approval));
        self.mutations
            .mutate(plan, self.api.batch_approve(&batch))
            .await
    }

    /// Name recorded as `approved_by`: the signed-in user, else `admin`.
    pub fn reviewer(&self) -> String {
        self.session
            .session()
            .map(|session| session.user.email)
            .unwrap_or_else(|| "admin".to_owned())
    }
}
