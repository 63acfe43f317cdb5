use super::domain::{PaymentMethod, Request, RequestId};

pub const ZELLE_URL: &str = "https://www.zellepay.com/";
pub const PAYPAL_URL: &str = "https://www.paypal.com/myaccount/transfer/homepage/pay";

/// Data problems on a single request that prevent telling the donor where to pay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContactError {
    #[error("request {request_id} shares no payment method with the donor")]
    NoCommonMethod { request_id: RequestId },
    #[error("payment method '{method}' on request {request_id} is not supported")]
    UnsupportedMethod {
        request_id: RequestId,
        method: PaymentMethod,
    },
    #[error("request {request_id} has no {method} contact on file")]
    MissingContact {
        request_id: RequestId,
        method: PaymentMethod,
    },
}

/// The requester's most preferred method that the donor can also use.
pub fn resolve_payment_method(
    request: &Request,
    donor_methods: &[PaymentMethod],
) -> Result<PaymentMethod, ContactError> {
    request
        .payment_methods
        .iter()
        .find(|method| donor_methods.contains(method))
        .cloned()
        .ok_or_else(|| ContactError::NoCommonMethod {
            request_id: request.id.clone(),
        })
}

/// Destination string the donor is told to pay.
///
/// CashApp and Venmo values are passed through untouched (stored as full URL or handle);
/// Zelle and PayPal contacts are annotated with the platform's payment page.
pub fn resolve_destination(
    method: &PaymentMethod,
    request: &Request,
) -> Result<String, ContactError> {
    if let PaymentMethod::Other(_) = method {
        return Err(ContactError::UnsupportedMethod {
            request_id: request.id.clone(),
            method: method.clone(),
        });
    }

    let contact = request
        .contacts
        .for_method(method)
        .ok_or_else(|| ContactError::MissingContact {
            request_id: request.id.clone(),
            method: method.clone(),
        })?;

    let destination = match method {
        PaymentMethod::Zelle => format!("{contact} on {ZELLE_URL}"),
        PaymentMethod::Paypal => format!("{contact} on {PAYPAL_URL}"),
        _ => contact.to_string(),
    };
    Ok(destination)
}
