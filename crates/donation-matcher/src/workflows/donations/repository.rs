use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{Contribution, ErrorReport, PaymentMethod, Request, RequestId};
use super::notification::OutboundMessage;

/// Conditional update applied to one request.
///
/// The store must reject the patch with [`StoreError::VersionConflict`] when the request's
/// current version differs from `expected_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPatch {
    pub expected_version: u64,
    pub append_contribution: Contribution,
}

/// Ledger of aid requests plus the error sink that sits next to it.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Open requests accepting any of `methods`, in a stable order.
    async fn list_eligible(&self, methods: &[PaymentMethod]) -> Result<Vec<Request>, StoreError>;
    async fn get(&self, id: &RequestId) -> Result<Request, StoreError>;
    async fn update(&self, id: &RequestId, patch: RequestPatch) -> Result<Request, StoreError>;
    async fn append_error(&self, report: ErrorReport) -> Result<(), StoreError>;
}

/// Error enumeration for ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("request {0} not found")]
    NotFound(RequestId),
    #[error("request {id} changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        id: RequestId,
        expected: u64,
        actual: u64,
    },
    #[error("request store unavailable: {0}")]
    Unavailable(String),
}

/// Receipt returned by the transport for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub message_id: String,
}

/// Outbound text delivery.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<MessageReceipt, TransportError>;
}

/// Message dispatch error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("message rejected: {0}")]
    Rejected(String),
    #[error("notification transport unavailable: {0}")]
    Unavailable(String),
}
