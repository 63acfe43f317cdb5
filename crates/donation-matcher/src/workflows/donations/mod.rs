//! Donation allocation: match a donation to open aid requests, text the donor where to pay,
//! and record the contribution against each matched request.

pub mod calculator;
pub mod contact;
pub mod coordinator;
pub mod domain;
pub mod eligibility;
pub mod intake;
pub mod notification;
pub mod repository;
pub mod router;
pub mod selection;
pub mod service;

#[cfg(test)]
pub(crate) mod tests;

pub use calculator::{allocate, AllocationStep};
pub use contact::{resolve_destination, resolve_payment_method, ContactError};
pub use coordinator::{
    AllocationCoordinator, AllocationError, AllocationFailure, AllocationOutcome,
    AllocationOutcomeView, AllocationReport, AllocationSettings,
};
pub use domain::{
    AllocationStage, Contribution, DonationEvent, DonationId, ErrorReport, FundingStatus,
    PaymentContacts, PaymentMethod, Request, RequestId,
};
pub use eligibility::filter_eligible;
pub use intake::{normalize_phone, parse_record, IntakeError, ParsedRecord, WebhookRecord};
pub use notification::{compose, format_currency, NotificationParams, OutboundMessage};
pub use repository::{
    MessageReceipt, NotificationTransport, RequestPatch, RequestStore, StoreError, TransportError,
};
pub use router::donation_router;
pub use selection::{
    plan_allocation, select_weighted, sequential_exhaustion, weighted_candidates,
    weighted_lottery, AllocationPlan, PlannedAllocation, SelectionStrategy, UnknownStrategy,
    WeightedCandidate,
};
pub use service::{DonationError, DonationService, RecordOutcome, WebhookPayload};
