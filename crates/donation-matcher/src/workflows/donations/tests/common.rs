use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::workflows::donations::coordinator::{AllocationCoordinator, AllocationSettings};
use crate::workflows::donations::domain::{
    Contribution, DonationEvent, DonationId, ErrorReport, PaymentContacts, PaymentMethod, Request,
    RequestId,
};
use crate::workflows::donations::eligibility::filter_eligible;
use crate::workflows::donations::notification::OutboundMessage;
use crate::workflows::donations::repository::{
    MessageReceipt, NotificationTransport, RequestPatch, RequestStore, StoreError, TransportError,
};
use crate::workflows::donations::selection::SelectionStrategy;
use crate::workflows::donations::service::DonationService;

pub(crate) const TABLE_ID: &str = "tblRequests";

pub(crate) fn contacts_for(id: &str) -> PaymentContacts {
    PaymentContacts {
        cash_app: Some(format!("https://cash.app/${id}")),
        venmo: Some(format!("https://venmo.com/u/{id}")),
        zelle: Some(format!("{id}@example.org")),
        paypal: Some(format!("{id}@paypal.example.org")),
    }
}

pub(crate) fn request(id: &str, methods: &[PaymentMethod], need: u64) -> Request {
    request_with_contacts(id, methods, need, contacts_for(id))
}

pub(crate) fn request_with_contacts(
    id: &str,
    methods: &[PaymentMethod],
    need: u64,
    contacts: PaymentContacts,
) -> Request {
    Request {
        id: RequestId(id.to_string()),
        name: format!("Requester {id}"),
        payment_methods: methods.to_vec(),
        amount_to_raise: need,
        contacts,
        contributions: Vec::new(),
        version: 0,
    }
}

pub(crate) fn funded_request(id: &str, methods: &[PaymentMethod], goal: u64) -> Request {
    let mut funded = request(id, methods, goal);
    funded.contributions.push(Contribution {
        donation_id: DonationId(format!("{id}-seed")),
        amount: goal,
        recorded_at: Utc::now(),
    });
    funded
}

pub(crate) fn donation(id: &str, amount: u64, methods: &[PaymentMethod]) -> DonationEvent {
    DonationEvent {
        donation_id: DonationId(id.to_string()),
        donor_name: "Grace Donor".to_string(),
        amount,
        payment_methods: methods.to_vec(),
        phone_number: "+15155550123".to_string(),
    }
}

pub(crate) fn settings(strategy: SelectionStrategy, seed: u64) -> AllocationSettings {
    AllocationSettings {
        strategy,
        sender_number: "+15155550000".to_string(),
        record_attempts: 3,
        rng_seed: Some(seed),
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    requests: Mutex<Vec<Request>>,
    errors: Mutex<Vec<ErrorReport>>,
    pub(crate) unavailable: AtomicBool,
    pub(crate) fail_updates: AtomicBool,
    /// Number of upcoming updates rejected as concurrent writes.
    pub(crate) pending_conflicts: AtomicUsize,
}

impl MemoryStore {
    pub(crate) fn with_requests(requests: Vec<Request>) -> Self {
        Self {
            requests: Mutex::new(requests),
            ..Self::default()
        }
    }

    pub(crate) fn request(&self, id: &str) -> Request {
        self.requests
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .find(|request| request.id.0 == id)
            .cloned()
            .expect("request present")
    }

    pub(crate) fn errors(&self) -> Vec<ErrorReport> {
        self.errors.lock().expect("store mutex poisoned").clone()
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn list_eligible(&self, methods: &[PaymentMethod]) -> Result<Vec<Request>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("table offline".to_string()));
        }
        let requests = self.requests.lock().expect("store mutex poisoned").clone();
        Ok(filter_eligible(requests, methods))
    }

    async fn get(&self, id: &RequestId) -> Result<Request, StoreError> {
        self.requests
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .find(|request| &request.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &RequestId, patch: RequestPatch) -> Result<Request, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write quota exceeded".to_string()));
        }

        let mut guard = self.requests.lock().expect("store mutex poisoned");
        let request = guard
            .iter_mut()
            .find(|request| &request.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            // Simulate another writer landing first.
            request.version += 1;
        }

        if request.version != patch.expected_version {
            return Err(StoreError::VersionConflict {
                id: id.clone(),
                expected: patch.expected_version,
                actual: request.version,
            });
        }

        request.contributions.push(patch.append_contribution);
        request.version += 1;
        Ok(request.clone())
    }

    async fn append_error(&self, report: ErrorReport) -> Result<(), StoreError> {
        self.errors.lock().expect("store mutex poisoned").push(report);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryTransport {
    sent: Mutex<Vec<OutboundMessage>>,
    /// Messages whose destination contains one of these fragments are rejected.
    reject_destinations: Mutex<Vec<String>>,
}

impl MemoryTransport {
    pub(crate) fn rejecting(fragment: &str) -> Self {
        let transport = Self::default();
        transport
            .reject_destinations
            .lock()
            .expect("transport mutex poisoned")
            .push(fragment.to_string());
        transport
    }

    pub(crate) fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().expect("transport mutex poisoned").clone()
    }
}

#[async_trait]
impl NotificationTransport for MemoryTransport {
    async fn send(&self, message: OutboundMessage) -> Result<MessageReceipt, TransportError> {
        let rejected = self
            .reject_destinations
            .lock()
            .expect("transport mutex poisoned")
            .iter()
            .any(|fragment| message.params.platform_url.contains(fragment.as_str()));
        if rejected {
            return Err(TransportError::Rejected("carrier refused message".to_string()));
        }

        let mut sent = self.sent.lock().expect("transport mutex poisoned");
        sent.push(message);
        Ok(MessageReceipt {
            message_id: format!("msg-{:04}", sent.len()),
        })
    }
}

pub(crate) type TestCoordinator = AllocationCoordinator<MemoryStore, MemoryTransport>;

pub(crate) fn coordinator(
    store: Arc<MemoryStore>,
    transport: Arc<MemoryTransport>,
    strategy: SelectionStrategy,
) -> TestCoordinator {
    AllocationCoordinator::new(store, transport, settings(strategy, 7))
}

pub(crate) fn service(
    store: Arc<MemoryStore>,
    transport: Arc<MemoryTransport>,
    strategy: SelectionStrategy,
) -> DonationService<MemoryStore, MemoryTransport> {
    DonationService::new(Arc::new(coordinator(store, transport, strategy)), TABLE_ID)
}

pub(crate) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body readable");
    serde_json::from_slice(&body).expect("body is json")
}
