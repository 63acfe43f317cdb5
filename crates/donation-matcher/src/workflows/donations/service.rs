use std::sync::Arc;

use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};

use super::coordinator::{AllocationCoordinator, AllocationError, AllocationReport};
use super::domain::{AllocationStage, DonationId};
use super::intake::{parse_record, IntakeError, ParsedRecord, WebhookRecord};
use super::repository::{NotificationTransport, RequestStore};

/// Webhook body: normally a batch, occasionally a bare record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Batch(Vec<WebhookRecord>),
    Single(WebhookRecord),
}

impl WebhookPayload {
    pub fn into_records(self) -> Vec<WebhookRecord> {
        match self {
            Self::Batch(records) => records,
            Self::Single(record) => vec![record],
        }
    }
}

/// Reason a webhook record produced no allocation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DonationError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// What happened to one webhook record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Completed(AllocationReport),
    Ignored {
        record_id: String,
        table_id: String,
    },
    Rejected {
        record_id: String,
        error: DonationError,
    },
}

/// Entry point for webhook batches: intake, then allocation per record.
pub struct DonationService<S, T> {
    coordinator: Arc<AllocationCoordinator<S, T>>,
    donations_table_id: String,
}

impl<S, T> DonationService<S, T>
where
    S: RequestStore + 'static,
    T: NotificationTransport + 'static,
{
    pub fn new(
        coordinator: Arc<AllocationCoordinator<S, T>>,
        donations_table_id: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            donations_table_id: donations_table_id.into(),
        }
    }

    /// Process every record independently; a failing record never affects its siblings.
    pub async fn handle_batch(&self, records: Vec<WebhookRecord>) -> Vec<RecordOutcome> {
        join_all(records.iter().map(|record| self.handle_record(record))).await
    }

    pub async fn handle_record(&self, record: &WebhookRecord) -> RecordOutcome {
        let event = match parse_record(record, &self.donations_table_id) {
            Ok(ParsedRecord::Donation(event)) => event,
            Ok(ParsedRecord::Ignored { table_id }) => {
                debug!(
                    record_id = %record.record_id,
                    %table_id,
                    "ignoring change on foreign table"
                );
                return RecordOutcome::Ignored {
                    record_id: record.record_id.clone(),
                    table_id,
                };
            }
            Err(err) => {
                warn!(record_id = %record.record_id, error = %err, "rejecting donation record");
                let donor_name = record.donor_name().unwrap_or_default();
                let donation_id = Some(record.record_id.trim())
                    .filter(|id| !id.is_empty())
                    .map(|id| DonationId(id.to_string()));
                self.coordinator
                    .report_failure(
                        &donor_name,
                        donation_id.as_ref(),
                        None,
                        AllocationStage::Received,
                        err.to_string(),
                    )
                    .await;
                return RecordOutcome::Rejected {
                    record_id: record.record_id.clone(),
                    error: err.into(),
                };
            }
        };

        match self.coordinator.allocate(&event).await {
            Ok(report) => RecordOutcome::Completed(report),
            Err(err) => RecordOutcome::Rejected {
                record_id: record.record_id.clone(),
                error: err.into(),
            },
        }
    }
}
