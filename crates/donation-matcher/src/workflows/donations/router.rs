use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde_json::{json, Value};

use super::coordinator::AllocationError;
use super::intake::IntakeError;
use super::repository::{NotificationTransport, RequestStore};
use super::service::{DonationError, DonationService, RecordOutcome, WebhookPayload};

/// Router builder exposing the donation webhook.
pub fn donation_router<S, T>(service: Arc<DonationService<S, T>>) -> Router
where
    S: RequestStore + 'static,
    T: NotificationTransport + 'static,
{
    Router::new()
        .route("/api/v1/donations/webhook", post(webhook_handler::<S, T>))
        .with_state(service)
}

pub(crate) async fn webhook_handler<S, T>(
    State(service): State<Arc<DonationService<S, T>>>,
    axum::Json(payload): axum::Json<WebhookPayload>,
) -> Response
where
    S: RequestStore + 'static,
    T: NotificationTransport + 'static,
{
    let outcomes = service.handle_batch(payload.into_records()).await;
    let status = batch_status(&outcomes);
    let results: Vec<Value> = outcomes.iter().map(outcome_payload).collect();

    (status, axum::Json(json!({ "results": results }))).into_response()
}

/// Any delivered allocation makes the batch a success; otherwise the first failure decides.
pub(crate) fn batch_status(outcomes: &[RecordOutcome]) -> StatusCode {
    let statuses: Vec<StatusCode> = outcomes.iter().map(outcome_status).collect();
    if statuses.contains(&StatusCode::OK) {
        return StatusCode::OK;
    }
    statuses
        .into_iter()
        .find(|status| *status != StatusCode::ACCEPTED)
        .unwrap_or(StatusCode::ACCEPTED)
}

pub(crate) fn outcome_status(outcome: &RecordOutcome) -> StatusCode {
    match outcome {
        RecordOutcome::Completed(report) if report.any_delivered() => StatusCode::OK,
        RecordOutcome::Completed(_) => StatusCode::BAD_GATEWAY,
        RecordOutcome::Ignored { .. } => StatusCode::ACCEPTED,
        RecordOutcome::Rejected { error, .. } => match error {
            DonationError::Intake(_) => StatusCode::BAD_REQUEST,
            DonationError::Allocation(AllocationError::NoEligibleRequests { .. }) => {
                StatusCode::NOT_FOUND
            }
            DonationError::Allocation(AllocationError::Store(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        },
    }
}

fn outcome_payload(outcome: &RecordOutcome) -> Value {
    match outcome {
        RecordOutcome::Completed(report) => {
            let allocations: Vec<_> = report
                .allocations
                .iter()
                .map(|allocation| allocation.view())
                .collect();
            let status = if report.any_delivered() {
                "completed"
            } else {
                "delivery_failed"
            };
            json!({
                "record_id": report.donation_id,
                "status": status,
                "strategy": report.strategy,
                "leftover": report.leftover,
                "allocations": allocations,
            })
        }
        RecordOutcome::Ignored {
            record_id,
            table_id,
        } => json!({
            "record_id": record_id,
            "status": "ignored",
            "table_id": table_id,
        }),
        RecordOutcome::Rejected { record_id, error } => {
            let (status, kind) = match error {
                DonationError::Intake(IntakeError::MissingField(_)) => {
                    ("rejected", "missing_field")
                }
                DonationError::Intake(IntakeError::InvalidField { .. }) => {
                    ("rejected", "invalid_field")
                }
                DonationError::Allocation(AllocationError::NoEligibleRequests { .. }) => {
                    ("no_match", "no_eligible_requests")
                }
                DonationError::Allocation(AllocationError::Store(_)) => {
                    ("unavailable", "store_unavailable")
                }
            };
            json!({
                "record_id": record_id,
                "status": status,
                "error_kind": kind,
                "error": error.to_string(),
            })
        }
    }
}
