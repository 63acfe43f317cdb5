use serde::{Deserialize, Serialize};

use super::domain::Request;

/// Portion of a donation consumed by one request and what is carried forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationStep {
    pub consumed: u64,
    pub remaining_funds: u64,
}

/// Consume `min(remaining_funds, remaining_need)` of the donation for `request`.
pub fn allocate(remaining_funds: u64, request: &Request) -> AllocationStep {
    let consumed = remaining_funds.min(request.remaining_need());
    AllocationStep {
        consumed,
        remaining_funds: remaining_funds - consumed,
    }
}
