//! Audit trail
//!
//! Privileged actions are appended to `audit_logs`. Recording is
//! best-effort: a failed write is logged and never reaches the caller.

use crate::db::repositories::AuditRepository;
use crate::models::{AuditFilter, AuditLog, ListParams, PagedResult};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

/// Audit service
pub struct AuditService {
    repo: Arc<dyn AuditRepository>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        Self { repo }
    }

    /// Append an entry. Failures are logged and swallowed.
    pub async fn record(&self, user_id: Option<i64>, action: &str, details: Option<Value>) {
        let details = details.map(|d| d.to_string());
        if let Err(e) = self.repo.create(user_id, action, details.as_deref()).await {
            tracing::warn!("Failed to record audit '{}': {:#}", action, e);
        }
    }

    /// Paged search, newest first
    pub async fn search(
        &self,
        filter: &AuditFilter,
        params: &ListParams,
    ) -> Result<PagedResult<AuditLog>> {
        let (logs, total) = self.repo.search(filter, params).await?;
        Ok(PagedResult::new(logs, total, params))
    }

    /// Every matching entry, for exports
    pub async fn list_all(&self, filter: &AuditFilter) -> Result<Vec<AuditLog>> {
        self.repo.list_all(filter).await
    }
}
