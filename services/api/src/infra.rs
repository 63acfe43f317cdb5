use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use donation_matcher::error::AppError;
use donation_matcher::workflows::donations::{
    filter_eligible, ErrorReport, MessageReceipt, NotificationTransport, OutboundMessage,
    PaymentContacts, PaymentMethod, Request, RequestId, RequestPatch, RequestStore, StoreError,
    TransportError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local ledger. Insertion order is the order requests are offered to the lottery.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRequestStore {
    requests: Arc<Mutex<Vec<Request>>>,
    errors: Arc<Mutex<Vec<ErrorReport>>>,
}

impl InMemoryRequestStore {
    pub(crate) fn from_requests(requests: Vec<Request>) -> Self {
        Self {
            requests: Arc::new(Mutex::new(requests)),
            errors: Arc::default(),
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn errors(&self) -> Vec<ErrorReport> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn list_eligible(&self, methods: &[PaymentMethod]) -> Result<Vec<Request>, StoreError> {
        Ok(filter_eligible(self.snapshot(), methods))
    }

    async fn get(&self, id: &RequestId) -> Result<Request, StoreError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|request| &request.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn update(&self, id: &RequestId, patch: RequestPatch) -> Result<Request, StoreError> {
        let mut guard = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let request = guard
            .iter_mut()
            .find(|request| &request.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

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
        warn!(
            donor = %report.donor_name,
            stage = report.stage.label(),
            message = %report.message,
            "donation error recorded"
        );
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
        Ok(())
    }
}

/// Transport that keeps messages in memory and logs them instead of texting anyone.
#[derive(Default)]
pub(crate) struct InMemoryTransport {
    sequence: AtomicU64,
    outbox: Mutex<Vec<OutboundMessage>>,
}

impl InMemoryTransport {
    pub(crate) fn outbox(&self) -> Vec<OutboundMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NotificationTransport for InMemoryTransport {
    async fn send(&self, message: OutboundMessage) -> Result<MessageReceipt, TransportError> {
        if message.to.trim().is_empty() {
            return Err(TransportError::Rejected("missing recipient".to_string()));
        }

        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message_id = format!("SM{id:06}");
        info!(
            %message_id,
            to = %message.to,
            amount = %message.params.amount,
            "text queued"
        );
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(MessageReceipt { message_id })
    }
}

pub(crate) fn load_ledger(path: &Path) -> Result<Vec<Request>, AppError> {
    let raw = std::fs::read_to_string(path)?;
    let requests: Vec<Request> = serde_json::from_str(&raw)?;
    Ok(requests)
}

/// Small ledger used when no ledger file is supplied to the `allocate` command.
pub(crate) fn sample_ledger() -> Vec<Request> {
    let entry = |id: &str, name: &str, methods: Vec<PaymentMethod>, need: u64, contacts| Request {
        id: RequestId(id.to_string()),
        name: name.to_string(),
        payment_methods: methods,
        amount_to_raise: need,
        contacts,
        contributions: Vec::new(),
        version: 0,
    };

    vec![
        entry(
            "recRent",
            "Rent shortfall",
            vec![PaymentMethod::Zelle, PaymentMethod::Venmo],
            200,
            PaymentContacts {
                zelle: Some("rent.help@example.org".to_string()),
                venmo: Some("https://venmo.com/u/rent-help".to_string()),
                ..PaymentContacts::default()
            },
        ),
        entry(
            "recGroceries",
            "Groceries",
            vec![PaymentMethod::CashApp, PaymentMethod::Zelle],
            50,
            PaymentContacts {
                cash_app: Some("https://cash.app/$groceries".to_string()),
                zelle: Some("+15155550142".to_string()),
                ..PaymentContacts::default()
            },
        ),
        entry(
            "recUtilities",
            "Utility bill",
            vec![PaymentMethod::Paypal],
            120,
            PaymentContacts {
                paypal: Some("utilities@example.org".to_string()),
                ..PaymentContacts::default()
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use donation_matcher::workflows::donations::{Contribution, DonationId};

    fn contribution(id: &str, amount: u64) -> Contribution {
        Contribution {
            donation_id: DonationId(id.to_string()),
            amount,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let store = InMemoryRequestStore::from_requests(sample_ledger());
        let id = RequestId("recRent".to_string());

        let updated = store
            .update(
                &id,
                RequestPatch {
                    expected_version: 0,
                    append_contribution: contribution("recA", 20),
                },
            )
            .await
            .expect("first write lands");
        assert_eq!(updated.version, 1);
        assert_eq!(updated.remaining_need(), 180);

        let stale = store
            .update(
                &id,
                RequestPatch {
                    expected_version: 0,
                    append_contribution: contribution("recB", 20),
                },
            )
            .await;
        assert!(matches!(
            stale,
            Err(StoreError::VersionConflict { actual: 1, .. })
        ));
    }

    #[tokio::test]
    async fn list_eligible_skips_requests_without_shared_method() {
        let store = InMemoryRequestStore::from_requests(sample_ledger());
        let eligible = store
            .list_eligible(&[PaymentMethod::Paypal])
            .await
            .expect("listing works");
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id.0, "recUtilities");
    }

    #[test]
    fn load_ledger_accepts_minimal_entries() {
        let path = std::env::temp_dir().join(format!("ledger-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{ "id": "recA", "name": "Rent", "payment_methods": ["Zelle"], "amount_to_raise": 75,
                  "contacts": { "zelle": "a@example.org" } }]"#,
        )
        .expect("ledger written");

        let requests = load_ledger(&path).expect("ledger parses");
        std::fs::remove_file(&path).ok();

        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].remaining_need(), 75);
        assert_eq!(requests[0].version, 0);
    }
}
