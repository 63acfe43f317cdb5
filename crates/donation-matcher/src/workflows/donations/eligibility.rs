use super::domain::{FundingStatus, PaymentMethod, Request};

/// Narrow the ledger to open requests sharing at least one payment method with the donor.
///
/// Input order is preserved; the weighted lottery relies on it for a deterministic cumulative
/// walk. An empty result is a normal "no match" outcome.
pub fn filter_eligible<I>(requests: I, donor_methods: &[PaymentMethod]) -> Vec<Request>
where
    I: IntoIterator<Item = Request>,
{
    requests
        .into_iter()
        .filter(|request| is_eligible(request, donor_methods))
        .collect()
}

pub fn is_eligible(request: &Request, donor_methods: &[PaymentMethod]) -> bool {
    request.status() == FundingStatus::Open && request.accepts_any(donor_methods)
}
