use super::common::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

use crate::workflows::donations::domain::PaymentMethod;
use crate::workflows::donations::selection::{
    plan_allocation, select_weighted, sequential_exhaustion, weighted_candidates,
    weighted_lottery, SelectionStrategy,
};

fn zelle_requests(needs: &[u64]) -> Vec<crate::workflows::donations::domain::Request> {
    needs
        .iter()
        .enumerate()
        .map(|(idx, need)| request(&format!("r{idx}"), &[PaymentMethod::Zelle], *need))
        .collect()
}

#[test]
fn weights_are_proportional_to_remaining_need() {
    let requests = zelle_requests(&[100, 300]);
    let candidates = weighted_candidates(&requests);

    let weights: Vec<f64> = candidates.iter().map(|candidate| candidate.weight).collect();
    assert_eq!(weights, vec![0.25, 0.75]);
    assert_eq!(candidates[0].cumulative_weight, 0.25);
    assert_eq!(candidates[1].cumulative_weight, 1.0);
}

#[test]
fn weights_sum_to_one_and_one_candidate_always_wins() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let size = rng.gen_range(1..12);
        let needs: Vec<u64> = (0..size).map(|_| rng.gen_range(1..10_000)).collect();
        let requests = zelle_requests(&needs);
        let candidates = weighted_candidates(&requests);

        let total: f64 = candidates.iter().map(|candidate| candidate.weight).sum();
        assert!((total - 1.0).abs() < 1e-9, "weights summed to {total}");

        for draw in [0.0, rng.gen::<f64>(), 1.0 - f64::EPSILON] {
            assert!(select_weighted(&candidates, draw).is_some());
            let plan = weighted_lottery(25, &requests, draw);
            assert_eq!(plan.allocations.len(), 1);
        }
    }
}

#[test]
fn last_candidate_catches_rounding_remainder() {
    let requests = zelle_requests(&[1, 1, 1]);
    let candidates = weighted_candidates(&requests);
    let winner = select_weighted(&candidates, 0.999_999_999_999).expect("winner");
    assert_eq!(winner.request.id.0, "r2");
}

#[test]
fn lottery_frequencies_match_weights() {
    let requests = zelle_requests(&[100, 300]);
    let mut rng = StdRng::seed_from_u64(2024);
    let draws = 100_000u32;
    let mut small_hits = 0u32;

    for _ in 0..draws {
        let plan = plan_allocation(
            SelectionStrategy::WeightedLottery,
            10,
            requests.clone(),
            &mut rng,
        );
        if plan.allocations[0].request.id.0 == "r0" {
            small_hits += 1;
        }
    }

    let expected = [f64::from(draws) * 0.25, f64::from(draws) * 0.75];
    let observed = [f64::from(small_hits), f64::from(draws - small_hits)];
    let chi_squared: f64 = observed
        .iter()
        .zip(expected.iter())
        .map(|(obs, exp)| (obs - exp).powi(2) / exp)
        .sum();

    // One degree of freedom, p = 0.001.
    assert!(chi_squared < 10.828, "chi-squared {chi_squared} too large");
}

#[test]
fn lottery_with_fixed_draw_selects_small_request() {
    let requests = vec![
        request("small", &[PaymentMethod::Zelle], 50),
        request("large", &[PaymentMethod::Zelle], 200),
    ];
    let candidates = weighted_candidates(&requests);
    assert!((candidates[0].weight - 0.2).abs() < 1e-12);
    assert!((candidates[1].weight - 0.8).abs() < 1e-12);

    let plan = weighted_lottery(150, &requests, 0.15);
    assert_eq!(plan.allocations.len(), 1);
    assert_eq!(plan.allocations[0].request.id.0, "small");
    assert_eq!(plan.allocations[0].amount, 50);
    assert_eq!(plan.leftover, 100);
}

#[test]
fn funded_requests_are_never_candidates() {
    let requests = vec![
        funded_request("done", &[PaymentMethod::Zelle], 80),
        request("open", &[PaymentMethod::Zelle], 40),
    ];
    let candidates = weighted_candidates(&requests);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].request.id.0, "open");

    assert!(weighted_candidates(&[funded_request("x", &[PaymentMethod::Zelle], 5)]).is_empty());
}

#[test]
fn sequential_exhaustion_consumes_exact_total() {
    let needs = [100, 80, 50, 20];
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let plan = sequential_exhaustion(250, zelle_requests(&needs), &mut rng);

        assert_eq!(plan.allocated(), 250);
        assert_eq!(plan.leftover, 0);

        let mut seen = HashSet::new();
        for allocation in &plan.allocations {
            assert!(seen.insert(allocation.request.id.clone()), "picked twice");
            assert!(allocation.amount <= allocation.request.remaining_need());
        }
    }
}

#[test]
fn sequential_exhaustion_stops_when_funds_run_out() {
    for seed in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed);
        let plan = sequential_exhaustion(120, zelle_requests(&[100, 80, 50, 20]), &mut rng);

        assert_eq!(plan.allocated(), 120);
        assert_eq!(plan.leftover, 0);
        let last = plan.allocations.last().expect("at least one allocation");
        for allocation in &plan.allocations[..plan.allocations.len() - 1] {
            assert_eq!(allocation.amount, allocation.request.remaining_need());
        }
        assert!(last.amount <= last.request.remaining_need());
    }
}

#[test]
fn sequential_exhaustion_reports_leftover_when_pool_runs_dry() {
    let mut rng = StdRng::seed_from_u64(3);
    let plan = sequential_exhaustion(300, zelle_requests(&[100, 80, 50, 20]), &mut rng);

    assert_eq!(plan.allocations.len(), 4);
    assert_eq!(plan.allocated(), 250);
    assert_eq!(plan.leftover, 50);
}

#[test]
fn strategy_names_parse() {
    assert_eq!(
        "weighted_lottery".parse::<SelectionStrategy>(),
        Ok(SelectionStrategy::WeightedLottery)
    );
    assert_eq!(
        "Sequential-Exhaustion".parse::<SelectionStrategy>(),
        Ok(SelectionStrategy::SequentialExhaustion)
    );
    assert!("round_robin".parse::<SelectionStrategy>().is_err());
}
