use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for aid requests held in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for a single donation (the inbound record id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DonationId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DonationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment platforms a donor or requester can use.
///
/// Unknown platform names survive as `Other` so a request that lists one can still be matched
/// on overlap; the contact resolver rejects it later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentMethod {
    CashApp,
    Venmo,
    Paypal,
    Zelle,
    Other(String),
}

impl PaymentMethod {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "cashapp" | "cash app" => Self::CashApp,
            "venmo" => Self::Venmo,
            "paypal" => Self::Paypal,
            "zelle" => Self::Zelle,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::CashApp => "CashApp",
            Self::Venmo => "Venmo",
            Self::Paypal => "Paypal",
            Self::Zelle => "Zelle",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for PaymentMethod {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<PaymentMethod> for String {
    fn from(value: PaymentMethod) -> Self {
        value.label().to_string()
    }
}

/// Per-platform contact fields stored on a request. Empty strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentContacts {
    /// Full CashApp URL or `$cashtag`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_app: Option<String>,
    /// Full Venmo URL or handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venmo: Option<String>,
    /// Email address or phone number registered with Zelle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zelle: Option<String>,
    /// Email address or phone number registered with PayPal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paypal: Option<String>,
}

impl PaymentContacts {
    pub fn for_method(&self, method: &PaymentMethod) -> Option<&str> {
        let value = match method {
            PaymentMethod::CashApp => self.cash_app.as_deref(),
            PaymentMethod::Venmo => self.venmo.as_deref(),
            PaymentMethod::Zelle => self.zelle.as_deref(),
            PaymentMethod::Paypal => self.paypal.as_deref(),
            PaymentMethod::Other(_) => None,
        };
        value.filter(|value| !value.trim().is_empty())
    }
}

/// One matched donation recorded against a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub donation_id: DonationId,
    pub amount: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Funding state derived from the contribution history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStatus {
    Open,
    Funded,
}

impl FundingStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Funded => "Funded",
        }
    }
}

/// An aid request as held in the ledger.
///
/// `amount_to_raise` is the original goal. Remaining need and funding status are always
/// derived from `contributions`, never stored, so two writers cannot double count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub name: String,
    /// Accepted payment methods in the requester's order of preference.
    pub payment_methods: Vec<PaymentMethod>,
    pub amount_to_raise: u64,
    #[serde(default)]
    pub contacts: PaymentContacts,
    #[serde(default)]
    pub contributions: Vec<Contribution>,
    /// Optimistic concurrency token; bumped by the store on every successful update.
    #[serde(default)]
    pub version: u64,
}

impl Request {
    pub fn amount_raised(&self) -> u64 {
        self.contributions
            .iter()
            .fold(0u64, |total, contribution| {
                total.saturating_add(contribution.amount)
            })
    }

    pub fn remaining_need(&self) -> u64 {
        self.amount_to_raise.saturating_sub(self.amount_raised())
    }

    pub fn status(&self) -> FundingStatus {
        if self.remaining_need() == 0 {
            FundingStatus::Funded
        } else {
            FundingStatus::Open
        }
    }

    pub fn accepts_any(&self, methods: &[PaymentMethod]) -> bool {
        self.payment_methods
            .iter()
            .any(|method| methods.contains(method))
    }

    pub fn contribution_from(&self, donation_id: &DonationId) -> Option<&Contribution> {
        self.contributions
            .iter()
            .find(|contribution| &contribution.donation_id == donation_id)
    }

    /// Donation identifiers in the order they were recorded.
    pub fn donors(&self) -> Vec<&DonationId> {
        self.contributions
            .iter()
            .map(|contribution| &contribution.donation_id)
            .collect()
    }
}

/// A single inbound donation, built once per webhook record and consumed by one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationEvent {
    pub donation_id: DonationId,
    pub donor_name: String,
    /// Whole currency units.
    pub amount: u64,
    pub payment_methods: Vec<PaymentMethod>,
    pub phone_number: String,
}

/// Stage of the per-donation allocation pipeline, used for logging and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStage {
    Received,
    Filtered,
    Selecting,
    Allocating,
    Notifying,
    Recording,
    Completed,
}

impl AllocationStage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Filtered => "filtered",
            Self::Selecting => "selecting",
            Self::Allocating => "allocating",
            Self::Notifying => "notifying",
            Self::Recording => "recording",
            Self::Completed => "completed",
        }
    }
}

/// Failure details handed to the external error sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub donor_name: String,
    pub donation_id: Option<DonationId>,
    pub request_id: Option<RequestId>,
    pub stage: AllocationStage,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}
