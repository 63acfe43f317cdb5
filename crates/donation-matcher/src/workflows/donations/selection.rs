//! Selection strategies deciding which eligible request(s) receive a donation.
//!
//! Both strategies share one entry point, [`plan_allocation`], and are chosen per
//! configuration through [`SelectionStrategy`].

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::calculator::allocate;
use super::domain::Request;

/// How a donation is spread over the eligible requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Pick exactly one request with probability proportional to its remaining need.
    WeightedLottery,
    /// Drain uniformly drawn requests, without replacement, until the donation is used up.
    SequentialExhaustion,
}

impl SelectionStrategy {
    pub fn label(self) -> &'static str {
        match self {
            Self::WeightedLottery => "weighted_lottery",
            Self::SequentialExhaustion => "sequential_exhaustion",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown selection strategy '{0}' (expected weighted_lottery or sequential_exhaustion)")]
pub struct UnknownStrategy(pub String);

impl FromStr for SelectionStrategy {
    type Err = UnknownStrategy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weighted_lottery" | "weighted" | "lottery" => Ok(Self::WeightedLottery),
            "sequential_exhaustion" | "sequential" => Ok(Self::SequentialExhaustion),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// An eligible request with its lottery weight and running cumulative weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedCandidate<'a> {
    pub request: &'a Request,
    pub weight: f64,
    pub cumulative_weight: f64,
}

/// Weight each request by `remaining_need / total_remaining`, accumulating in input order.
///
/// Returns an empty list when nothing is left to fund. The last candidate's cumulative weight
/// is pinned to `1.0` so a draw just below one always lands somewhere.
pub fn weighted_candidates(requests: &[Request]) -> Vec<WeightedCandidate<'_>> {
    let total_remaining: u64 = requests
        .iter()
        .map(Request::remaining_need)
        .fold(0u64, u64::saturating_add);
    if total_remaining == 0 {
        return Vec::new();
    }

    let mut cumulative_weight = 0.0;
    let mut candidates: Vec<WeightedCandidate<'_>> = requests
        .iter()
        .filter(|request| request.remaining_need() > 0)
        .map(|request| {
            let weight = request.remaining_need() as f64 / total_remaining as f64;
            cumulative_weight += weight;
            WeightedCandidate {
                request,
                weight,
                cumulative_weight,
            }
        })
        .collect();

    if let Some(last) = candidates.last_mut() {
        last.cumulative_weight = 1.0;
    }
    candidates
}

/// First candidate whose cumulative weight reaches `draw` (expected in `[0, 1)`).
pub fn select_weighted<'c, 'a>(
    candidates: &'c [WeightedCandidate<'a>],
    draw: f64,
) -> Option<&'c WeightedCandidate<'a>> {
    candidates
        .iter()
        .find(|candidate| draw <= candidate.cumulative_weight)
        .or_else(|| candidates.last())
}

/// A request chosen to receive part of a donation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAllocation {
    pub request: Request,
    pub amount: u64,
}

/// Output of a selection pass: allocations in draw order plus whatever could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub strategy: SelectionStrategy,
    pub allocations: Vec<PlannedAllocation>,
    pub leftover: u64,
}

impl AllocationPlan {
    pub fn allocated(&self) -> u64 {
        self.allocations.iter().map(|allocation| allocation.amount).sum()
    }
}

/// Run `strategy` over the eligible requests for a donation of `amount`.
pub fn plan_allocation<R>(
    strategy: SelectionStrategy,
    amount: u64,
    eligible: Vec<Request>,
    rng: &mut R,
) -> AllocationPlan
where
    R: Rng + ?Sized,
{
    match strategy {
        SelectionStrategy::WeightedLottery => weighted_lottery(amount, &eligible, rng.gen()),
        SelectionStrategy::SequentialExhaustion => sequential_exhaustion(amount, eligible, rng),
    }
}

/// Single-request lottery with an explicit draw, so callers and tests can pin the outcome.
pub fn weighted_lottery(amount: u64, eligible: &[Request], draw: f64) -> AllocationPlan {
    let candidates = weighted_candidates(eligible);
    let mut allocations = Vec::with_capacity(1);
    let mut leftover = amount;

    if amount > 0 {
        if let Some(winner) = select_weighted(&candidates, draw) {
            let step = allocate(amount, winner.request);
            leftover = step.remaining_funds;
            allocations.push(PlannedAllocation {
                request: winner.request.clone(),
                amount: step.consumed,
            });
        }
    }

    AllocationPlan {
        strategy: SelectionStrategy::WeightedLottery,
        allocations,
        leftover,
    }
}

/// Draw requests uniformly without replacement until funds or requests run out.
pub fn sequential_exhaustion<R>(
    amount: u64,
    eligible: Vec<Request>,
    rng: &mut R,
) -> AllocationPlan
where
    R: Rng + ?Sized,
{
    let mut pool: Vec<Request> = eligible
        .into_iter()
        .filter(|request| request.remaining_need() > 0)
        .collect();
    let mut allocations = Vec::new();
    let mut remaining_funds = amount;

    while remaining_funds > 0 && !pool.is_empty() {
        let picked = pool.remove(rng.gen_range(0..pool.len()));
        let step = allocate(remaining_funds, &picked);
        remaining_funds = step.remaining_funds;
        allocations.push(PlannedAllocation {
            request: picked,
            amount: step.consumed,
        });
    }

    AllocationPlan {
        strategy: SelectionStrategy::SequentialExhaustion,
        allocations,
        leftover: remaining_funds,
    }
}
