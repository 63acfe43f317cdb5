//! Maps inbound table-change webhooks onto [`DonationEvent`]s.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{DonationEvent, DonationId, PaymentMethod};

const NAME_FIELD: &str = "Name";
const PAYMENT_METHODS_FIELD: &str = "Payment methods";
const PHONE_FIELD: &str = "Phone";
const CONTRIBUTION_FIELD: &str = "Contribution";

const TEL_LINK_PREFIX: &str = "<tel:";
const MAX_PHONE_LEN: usize = 13;

/// One changed record as delivered by the webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRecord {
    pub record_id: String,
    pub table_id: String,
    #[serde(default)]
    pub updates: Vec<FieldUpdate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    pub field: String,
    #[serde(default)]
    pub new_value: Value,
}

impl WebhookRecord {
    fn latest(&self, field: &str) -> Option<&Value> {
        self.updates
            .iter()
            .rev()
            .find(|update| update.field == field)
            .map(|update| &update.new_value)
    }

    /// Donor name if present, for tracing failures back to a person.
    pub fn donor_name(&self) -> Option<String> {
        self.latest(NAME_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// Parsed form of a webhook record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRecord {
    Donation(DonationEvent),
    /// Change on a table other than the donations table; not an error.
    Ignored { table_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Turn a webhook record into a donation, or `Ignored` when it belongs to another table.
pub fn parse_record(
    record: &WebhookRecord,
    donations_table_id: &str,
) -> Result<ParsedRecord, IntakeError> {
    if record.table_id != donations_table_id {
        return Ok(ParsedRecord::Ignored {
            table_id: record.table_id.clone(),
        });
    }

    let amount = match record.latest(CONTRIBUTION_FIELD) {
        Some(value) => parse_amount(value)?,
        None => None,
    }
    .ok_or(IntakeError::MissingField("amount"))?;

    let donor_name = record
        .donor_name()
        .ok_or(IntakeError::MissingField("name"))?;

    let payment_methods = record
        .latest(PAYMENT_METHODS_FIELD)
        .map(parse_payment_methods)
        .filter(|methods| !methods.is_empty())
        .ok_or(IntakeError::MissingField("paymentMethods"))?;

    let phone_number = record
        .latest(PHONE_FIELD)
        .and_then(Value::as_str)
        .map(normalize_phone)
        .filter(|phone| !phone.is_empty())
        .ok_or(IntakeError::MissingField("phoneNumber"))?;

    let donation_id = Some(record.record_id.trim())
        .filter(|id| !id.is_empty())
        .map(|id| DonationId(id.to_string()))
        .ok_or(IntakeError::MissingField("donationId"))?;

    Ok(ParsedRecord::Donation(DonationEvent {
        donation_id,
        donor_name,
        amount,
        payment_methods,
        phone_number,
    }))
}

/// Whole-unit amount; `None` for blank or zero values. Never goes through floating point.
fn parse_amount(value: &Value) -> Result<Option<u64>, IntakeError> {
    let whole = match value {
        Value::Null => return Ok(None),
        Value::Number(number) => match number.as_u64() {
            Some(whole) => whole,
            None => parse_whole_units(&number.to_string())?,
        },
        Value::String(raw) => {
            let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
            if cleaned.is_empty() {
                return Ok(None);
            }
            parse_whole_units(&cleaned)?
        }
        _ => return Err(invalid_amount("expected a number")),
    };

    Ok((whole > 0).then_some(whole))
}

/// Decimal text to whole units. A fractional part is accepted only when it is all zeros.
fn parse_whole_units(text: &str) -> Result<u64, IntakeError> {
    if text.starts_with('-') {
        return Err(invalid_amount("must be a positive amount"));
    }

    let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
    let all_digits = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) {
        return Err(invalid_amount("not a number"));
    }
    if fraction.bytes().any(|byte| byte != b'0') {
        return Err(invalid_amount("only whole currency units are supported"));
    }

    whole
        .parse::<u64>()
        .map_err(|_| invalid_amount("amount too large"))
}

fn invalid_amount(reason: &str) -> IntakeError {
    IntakeError::InvalidField {
        field: "amount",
        reason: reason.to_string(),
    }
}

fn parse_payment_methods(value: &Value) -> Vec<PaymentMethod> {
    let names: Vec<&str> = match value {
        Value::String(raw) => raw.split(',').collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    let mut methods = Vec::new();
    for name in names.into_iter().map(str::trim).filter(|name| !name.is_empty()) {
        let method = PaymentMethod::parse(name);
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    methods
}

/// Strip a chat-style `<tel:...>` link down to the number it wraps.
///
/// The number ends at the closing `>` (or a `|` display-text separator) and is capped at
/// 13 characters. Plain values are only trimmed.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.strip_prefix(TEL_LINK_PREFIX) {
        Some(link) => link
            .split(['>', '|'])
            .next()
            .unwrap_or_default()
            .chars()
            .take(MAX_PHONE_LEN)
            .collect(),
        None => trimmed.to_string(),
    }
}
