use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{error, info, warn};

use super::calculator;
use super::contact::{resolve_destination, resolve_payment_method, ContactError};
use super::domain::{
    AllocationStage, Contribution, DonationEvent, DonationId, ErrorReport, FundingStatus,
    PaymentMethod, Request, RequestId,
};
use super::eligibility::filter_eligible;
use super::notification::compose;
use super::repository::{
    NotificationTransport, RequestPatch, RequestStore, StoreError, TransportError,
};
use super::selection::{plan_allocation, AllocationPlan, PlannedAllocation, SelectionStrategy};

/// Knobs the coordinator needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationSettings {
    pub strategy: SelectionStrategy,
    pub sender_number: String,
    pub record_attempts: u8,
    pub rng_seed: Option<u64>,
}

impl Default for AllocationSettings {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::WeightedLottery,
            sender_number: String::new(),
            record_attempts: 3,
            rng_seed: None,
        }
    }
}

/// Fatal, event-level allocation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("no open request accepts {methods} (donation {donation_id})")]
    NoEligibleRequests {
        donation_id: DonationId,
        methods: String,
    },
    #[error("unable to load eligible requests: {0}")]
    Store(#[from] StoreError),
}

/// Failure of one allocation; siblings in the same donation are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationFailure {
    #[error(transparent)]
    Contact(#[from] ContactError),
    #[error("text delivery failed: {0}")]
    Delivery(#[from] TransportError),
    #[error("donor was notified but the ledger was not updated: {0}")]
    Recording(StoreError),
    #[error("request was funded concurrently: planned {planned}, recorded {recorded}")]
    Overcommitted { planned: u64, recorded: u64 },
}

impl AllocationFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Contact(ContactError::NoCommonMethod { .. }) => "no_common_method",
            Self::Contact(ContactError::UnsupportedMethod { .. }) => "unsupported_method",
            Self::Contact(ContactError::MissingContact { .. }) => "missing_contact",
            Self::Delivery(_) => "delivery_failure",
            Self::Recording(_) => "recording_failure",
            Self::Overcommitted { .. } => "overcommitted",
        }
    }
}

/// Result of settling one planned allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationOutcome {
    pub request_id: RequestId,
    pub request_name: String,
    pub amount: u64,
    pub method: Option<PaymentMethod>,
    pub destination: Option<String>,
    pub message_id: Option<String>,
    pub funded: bool,
    pub failure: Option<AllocationFailure>,
}

impl AllocationOutcome {
    fn pending(allocation: &PlannedAllocation) -> Self {
        Self {
            request_id: allocation.request.id.clone(),
            request_name: allocation.request.name.clone(),
            amount: allocation.amount,
            method: None,
            destination: None,
            message_id: None,
            funded: false,
            failure: None,
        }
    }

    /// The donor was texted, even if recording failed afterwards.
    pub fn delivered(&self) -> bool {
        self.message_id.is_some()
    }

    pub fn view(&self) -> AllocationOutcomeView {
        AllocationOutcomeView {
            request_id: self.request_id.clone(),
            name: self.request_name.clone(),
            amount: self.amount,
            method: self.method.clone(),
            destination: self.destination.clone(),
            message_id: self.message_id.clone(),
            funded: self.funded,
            error_kind: self.failure.as_ref().map(AllocationFailure::kind),
            error: self.failure.as_ref().map(ToString::to_string),
        }
    }
}

/// Serializable projection of an [`AllocationOutcome`].
#[derive(Debug, Clone, Serialize)]
pub struct AllocationOutcomeView {
    pub request_id: RequestId,
    pub name: String,
    pub amount: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub funded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything that happened to one donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationReport {
    pub donation_id: DonationId,
    pub donor_name: String,
    pub strategy: SelectionStrategy,
    pub allocations: Vec<AllocationOutcome>,
    /// Part of the donation no eligible request could absorb.
    pub leftover: u64,
}

impl AllocationReport {
    pub fn delivered(&self) -> impl Iterator<Item = &AllocationOutcome> {
        self.allocations.iter().filter(|outcome| outcome.delivered())
    }

    pub fn any_delivered(&self) -> bool {
        self.delivered().next().is_some()
    }
}

/// Ledger state after a contribution was written (or found already written).
struct Recorded {
    request: Request,
    amount: u64,
}

/// Runs one donation through filter, selection, allocation, notification, and recording.
///
/// Holds no per-donation state, so one instance serves concurrent events.
pub struct AllocationCoordinator<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    settings: AllocationSettings,
    rng: Mutex<StdRng>,
}

impl<S, T> AllocationCoordinator<S, T>
where
    S: RequestStore + 'static,
    T: NotificationTransport + 'static,
{
    pub fn new(store: Arc<S>, transport: Arc<T>, settings: AllocationSettings) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            store,
            transport,
            settings,
            rng: Mutex::new(rng),
        }
    }

    pub fn settings(&self) -> &AllocationSettings {
        &self.settings
    }

    /// Allocate `event` and report per-request outcomes.
    ///
    /// Only event-level problems return `Err`; per-allocation failures are carried in the
    /// report and forwarded to the error sink.
    pub async fn allocate(
        &self,
        event: &DonationEvent,
    ) -> Result<AllocationReport, AllocationError> {
        info!(
            donation_id = %event.donation_id,
            amount = event.amount,
            stage = AllocationStage::Received.label(),
            "donation received"
        );

        let listed = match self.store.list_eligible(&event.payment_methods).await {
            Ok(requests) => requests,
            Err(err) => {
                self.report_failure(
                    &event.donor_name,
                    Some(&event.donation_id),
                    None,
                    AllocationStage::Filtered,
                    err.to_string(),
                )
                .await;
                return Err(AllocationError::Store(err));
            }
        };

        let eligible = filter_eligible(listed, &event.payment_methods);
        if eligible.is_empty() {
            let err = AllocationError::NoEligibleRequests {
                donation_id: event.donation_id.clone(),
                methods: join_methods(&event.payment_methods),
            };
            self.report_failure(
                &event.donor_name,
                Some(&event.donation_id),
                None,
                AllocationStage::Filtered,
                err.to_string(),
            )
            .await;
            return Err(err);
        }

        let plan = self.plan(event.amount, eligible);
        info!(
            donation_id = %event.donation_id,
            strategy = %plan.strategy,
            selected = plan.allocations.len(),
            allocated = plan.allocated(),
            leftover = plan.leftover,
            stage = AllocationStage::Allocating.label(),
            "allocation planned"
        );
        if plan.leftover > 0 {
            warn!(
                donation_id = %event.donation_id,
                leftover = plan.leftover,
                "donation exceeds remaining need of eligible requests"
            );
        }

        let AllocationPlan {
            strategy,
            allocations,
            leftover,
        } = plan;

        let outcomes = join_all(
            allocations
                .into_iter()
                .map(|allocation| self.settle(event, allocation)),
        )
        .await;

        info!(
            donation_id = %event.donation_id,
            delivered = outcomes.iter().filter(|outcome| outcome.delivered()).count(),
            attempted = outcomes.len(),
            stage = AllocationStage::Completed.label(),
            "donation allocation complete"
        );

        Ok(AllocationReport {
            donation_id: event.donation_id.clone(),
            donor_name: event.donor_name.clone(),
            strategy,
            allocations: outcomes,
            leftover,
        })
    }

    fn plan(&self, amount: u64, eligible: Vec<Request>) -> AllocationPlan {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        plan_allocation(self.settings.strategy, amount, eligible, &mut *rng)
    }

    async fn settle(
        &self,
        event: &DonationEvent,
        allocation: PlannedAllocation,
    ) -> AllocationOutcome {
        let mut outcome = AllocationOutcome::pending(&allocation);
        let request = &allocation.request;

        let resolved = resolve_payment_method(request, &event.payment_methods).and_then(|method| {
            let destination = resolve_destination(&method, request)?;
            Ok((method, destination))
        });
        let (method, destination) = match resolved {
            Ok(resolved) => resolved,
            Err(err) => {
                return self
                    .fail(event, outcome, AllocationStage::Notifying, err.into())
                    .await;
            }
        };

        let message = compose(
            event,
            allocation.amount,
            &destination,
            &self.settings.sender_number,
        );
        outcome.method = Some(method);
        outcome.destination = Some(destination);

        let receipt = match self.transport.send(message).await {
            Ok(receipt) => receipt,
            Err(err) => {
                return self
                    .fail(event, outcome, AllocationStage::Notifying, err.into())
                    .await;
            }
        };
        info!(
            donation_id = %event.donation_id,
            request_id = %request.id,
            amount = allocation.amount,
            message_id = %receipt.message_id,
            stage = AllocationStage::Notifying.label(),
            "donor notified"
        );
        outcome.message_id = Some(receipt.message_id);

        match self.record(&allocation, &event.donation_id).await {
            Ok(recorded) => {
                outcome.request_name = recorded.request.name.clone();
                outcome.funded = recorded.request.status() == FundingStatus::Funded;
                if recorded.amount < allocation.amount {
                    outcome.amount = recorded.amount;
                    return self
                        .fail(
                            event,
                            outcome,
                            AllocationStage::Recording,
                            AllocationFailure::Overcommitted {
                                planned: allocation.amount,
                                recorded: recorded.amount,
                            },
                        )
                        .await;
                }
                outcome
            }
            Err(err) => {
                error!(
                    donation_id = %event.donation_id,
                    request_id = %request.id,
                    error = %err,
                    "donor notified but ledger update failed"
                );
                self.fail(
                    event,
                    outcome,
                    AllocationStage::Recording,
                    AllocationFailure::Recording(err),
                )
                .await
            }
        }
    }

    async fn fail(
        &self,
        event: &DonationEvent,
        mut outcome: AllocationOutcome,
        stage: AllocationStage,
        failure: AllocationFailure,
    ) -> AllocationOutcome {
        warn!(
            donation_id = %event.donation_id,
            request_id = %outcome.request_id,
            kind = failure.kind(),
            stage = stage.label(),
            "allocation failed"
        );
        self.report_failure(
            &event.donor_name,
            Some(&event.donation_id),
            Some(&outcome.request_id),
            stage,
            failure.to_string(),
        )
        .await;
        outcome.failure = Some(failure);
        outcome
    }

    /// Append the contribution with a version-checked write.
    ///
    /// The first write expects the version the allocation was planned on. After a conflict the
    /// request is re-read and the amount is capped again at its remaining need, so a request
    /// funded by a concurrent donation never records more than it still needs. A donation
    /// already present on the request is treated as recorded.
    async fn record(
        &self,
        allocation: &PlannedAllocation,
        donation_id: &DonationId,
    ) -> Result<Recorded, StoreError> {
        let attempts = self.settings.record_attempts.max(1);
        let request_id = &allocation.request.id;
        let mut current = allocation.request.clone();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let already_recorded = current
                .contribution_from(donation_id)
                .map(|contribution| contribution.amount);
            if let Some(amount) = already_recorded {
                return Ok(Recorded {
                    amount,
                    request: current,
                });
            }

            let amount = calculator::allocate(allocation.amount, &current).consumed;
            if amount == 0 {
                return Ok(Recorded {
                    amount,
                    request: current,
                });
            }

            let patch = RequestPatch {
                expected_version: current.version,
                append_contribution: Contribution {
                    donation_id: donation_id.clone(),
                    amount,
                    recorded_at: Utc::now(),
                },
            };

            match self.store.update(request_id, patch).await {
                Ok(updated) => {
                    return Ok(Recorded {
                        amount,
                        request: updated,
                    })
                }
                Err(StoreError::VersionConflict { .. }) if attempt < attempts => {
                    warn!(
                        request_id = %request_id,
                        attempt,
                        "request changed since planning, re-reading"
                    );
                    current = self.store.get(request_id).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Forward a failure to the error sink. Sink failures are logged, never propagated.
    pub async fn report_failure(
        &self,
        donor_name: &str,
        donation_id: Option<&DonationId>,
        request_id: Option<&RequestId>,
        stage: AllocationStage,
        message: String,
    ) {
        let report = ErrorReport {
            donor_name: if donor_name.trim().is_empty() {
                "unknown donor".to_string()
            } else {
                donor_name.to_string()
            },
            donation_id: donation_id.cloned(),
            request_id: request_id.cloned(),
            stage,
            message,
            occurred_at: Utc::now(),
        };

        if let Err(err) = self.store.append_error(report).await {
            error!(error = %err, "error sink unavailable");
        }
    }
}

fn join_methods(methods: &[PaymentMethod]) -> String {
    methods
        .iter()
        .map(PaymentMethod::label)
        .collect::<Vec<_>>()
        .join(", ")
}
