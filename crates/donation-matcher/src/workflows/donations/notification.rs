use serde::{Deserialize, Serialize};

use super::domain::DonationEvent;

/// Template parameters for the "here is who to pay" text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationParams {
    pub name: String,
    pub amount: String,
    #[serde(rename = "platformUrl")]
    pub platform_url: String,
}

/// A composed text ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    pub from: String,
    pub params: NotificationParams,
}

pub fn format_currency(amount: u64) -> String {
    format!("${amount}")
}

/// Build the message telling the donor to send `amount` to `destination`.
pub fn compose(
    event: &DonationEvent,
    amount: u64,
    destination: &str,
    sender_number: &str,
) -> OutboundMessage {
    OutboundMessage {
        to: event.phone_number.clone(),
        from: sender_number.to_string(),
        params: NotificationParams {
            name: event.donor_name.clone(),
            amount: format_currency(amount),
            platform_url: destination.to_string(),
        },
    }
}
