use crate::core::hub::{Event, EventHub};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Errors surfaced by the approval flow. Every exit path of
/// `request_approval` is one of these; callers never see a panic.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("approval request not found: {0}")]
    NotFound(String),

    #[error("approval request expired: {0}")]
    Expired(String),

    #[error("approval request already resolved: {0}")]
    AlreadyResolved(String),

    #[error("approval timed out")]
    Timeout,

    #[error("approval cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

/// A pending (or resolved) request for a human decision.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub action: String,
    pub platform: String,
    pub details: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ApprovalStatus,
}

/// The human decision, correlated 1:1 with a request.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResponse {
    pub request_id: String,
    pub approved: bool,
    pub approver_id: String,
    pub timestamp: DateTime<Utc>,
}

struct PendingEntry {
    request: ApprovalRequest,
    /// Fulfilled by `process_approval`; wakes the task blocked in
    /// `request_approval` without any polling.
    waiter: Option<oneshot::Sender<ApprovalResponse>>,
}

/// Timeouts and eviction policy for the approval manager.
#[derive(Debug, Clone)]
pub struct ApprovalSettings {
    /// How long a request stays decidable.
    pub timeout: Duration,
    /// How long resolved/expired requests are retained before eviction.
    pub retention: Duration,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            retention: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Bridges an asynchronous human decision back into a synchronous call
/// path:
/// 1. A handler calls `request_approval` and suspends.
/// 2. The request is broadcast to operators via the event hub.
/// 3. An operator decides through `process_approval`, normally from a
///    different execution context (the approval REST endpoint).
/// 4. The waiting handler resumes with the decision, a timeout error, or a
///    cancellation error.
#[derive(Clone)]
pub struct ApprovalManager {
    hub: EventHub,
    settings: ApprovalSettings,
    pending: Arc<RwLock<HashMap<String, PendingEntry>>>,
}

impl ApprovalManager {
    pub fn new(hub: EventHub, settings: ApprovalSettings) -> Self {
        Self {
            hub,
            settings,
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a pending request, publish it, and block the calling task
    /// until it is decided, times out, or the token is cancelled.
    pub async fn request_approval(
        &self,
        cancel: &CancellationToken,
        action: &str,
        platform: &str,
        details: HashMap<String, String>,
    ) -> Result<ApprovalResponse, ApprovalError> {
        let now = Utc::now();
        let request = ApprovalRequest {
            id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            platform: platform.to_string(),
            details,
            created_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.settings.timeout)
                    .unwrap_or_else(|_| chrono::Duration::zero()),
            status: ApprovalStatus::Pending,
        };
        let request_id = request.id.clone();

        let (waiter_tx, waiter_rx) = oneshot::channel();
        {
            let mut pending = self.pending.write().await;
            pending.insert(
                request_id.clone(),
                PendingEntry {
                    request: request.clone(),
                    waiter: Some(waiter_tx),
                },
            );
        }

        tracing::debug!(request_id = %request_id, action = %action, "approval requested");

        self.hub
            .broadcast(Event::new(
                "approval_request",
                serde_json::to_value(&request).unwrap_or_default(),
            ))
            .await;

        tokio::select! {
            decision = waiter_rx => match decision {
                Ok(response) => Ok(response),
                // The entry was evicted from under us.
                Err(_) => Err(ApprovalError::NotFound(request_id)),
            },
            _ = tokio::time::sleep(self.settings.timeout) => {
                self.mark_expired(&request_id).await;
                tracing::warn!(request_id = %request_id, "approval timed out");
                Err(ApprovalError::Timeout)
            }
            _ = cancel.cancelled() => {
                tracing::debug!(request_id = %request_id, "approval cancelled by caller");
                Err(ApprovalError::Cancelled)
            }
        }
    }

    /// Record a human decision for a pending request and wake its waiter.
    /// The deadline is re-checked here so a decision racing with expiry
    /// loses; a second decision on a resolved request is rejected.
    pub async fn process_approval(
        &self,
        request_id: &str,
        approved: bool,
        approver_id: &str,
    ) -> Result<(), ApprovalError> {
        let response = {
            let mut pending = self.pending.write().await;
            let entry = pending
                .get_mut(request_id)
                .ok_or_else(|| ApprovalError::NotFound(request_id.to_string()))?;

            if entry.request.status.is_terminal() {
                return Err(ApprovalError::AlreadyResolved(request_id.to_string()));
            }

            if Utc::now() > entry.request.expires_at {
                entry.request.status = ApprovalStatus::Expired;
                return Err(ApprovalError::Expired(request_id.to_string()));
            }

            entry.request.status = if approved {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Rejected
            };

            let response = ApprovalResponse {
                request_id: request_id.to_string(),
                approved,
                approver_id: approver_id.to_string(),
                timestamp: Utc::now(),
            };

            if let Some(waiter) = entry.waiter.take() {
                // The requester may have timed out or been cancelled already.
                let _ = waiter.send(response.clone());
            }

            response
        };

        tracing::info!(
            request_id = %request_id,
            approved,
            approver_id = %approver_id,
            "approval decided"
        );

        self.hub
            .broadcast(Event::new(
                "approval_result",
                serde_json::to_value(&response).unwrap_or_default(),
            ))
            .await;

        Ok(())
    }

    /// Read-only snapshot of requests still pending and decidable.
    pub async fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        let pending = self.pending.read().await;
        pending
            .values()
            .filter(|e| e.request.status == ApprovalStatus::Pending && now < e.request.expires_at)
            .map(|e| e.request.clone())
            .collect()
    }

    async fn mark_expired(&self, request_id: &str) {
        let mut pending = self.pending.write().await;
        if let Some(entry) = pending.get_mut(request_id) {
            if entry.request.status == ApprovalStatus::Pending {
                entry.request.status = ApprovalStatus::Expired;
            }
        }
    }

    /// Periodic TTL sweep so the request map stays bounded. Entries are
    /// removed once their deadline plus the retention window has passed.
    pub async fn run_sweeper(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.sweep().await,
            }
        }
    }

    async fn sweep(&self) {
        let retention = chrono::Duration::from_std(self.settings.retention)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let now = Utc::now();
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, entry| {
            if entry.request.status == ApprovalStatus::Pending && now > entry.request.expires_at {
                entry.request.status = ApprovalStatus::Expired;
            }
            now <= entry.request.expires_at + retention
        });
        let evicted = before - pending.len();
        if evicted > 0 {
            tracing::debug!(evicted, "swept approval requests");
        }
    }

    #[cfg(test)]
    async fn stored_status(&self, request_id: &str) -> Option<ApprovalStatus> {
        self.pending
            .read()
            .await
            .get(request_id)
            .map(|e| e.request.status)
    }

    #[cfg(test)]
    async fn stored_count(&self) -> usize {
        self.pending.read().await.len()
    }
}
