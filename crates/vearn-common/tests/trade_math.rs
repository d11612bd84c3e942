//! Integration tests for the trade math engine.
//!
//! Covers the documented swap scenario and the invariants the stores rely on:
//! - Fee floors and bounds
//! - Trigger countdown edge cases
//! - Deterministic, feasible solution choice
//! - Withdrawal cap on extended solutions

use alloy::primitives::U256;
use rust_decimal_macros::dec;

use vearn_common::units::ten_pow;
use vearn_common::{
    choose_solution, compute_trade_amounts, extend_solution, format_units, parse_units,
    seconds_until_trigger, Balance, Solution, TradeParams, MAX_WITHDRAW_AMOUNT, TOKEN_DECIMALS,
};

fn wei(tokens: u64) -> U256 {
    U256::from(tokens) * ten_pow(TOKEN_DECIMALS)
}

fn vtho(amount: &str) -> U256 {
    parse_units(amount, TOKEN_DECIMALS).unwrap()
}

fn solution(withdraw: U256) -> Solution {
    Solution {
        protocol_fee: U256::ZERO,
        dex_fee: U256::ZERO,
        amount_in_with_fees: U256::ZERO,
        delta_vet: U256::ZERO,
        steps_count: 2,
        withdraw_amount: withdraw,
        total_profit_vet: U256::ZERO,
    }
}

// ============================================================================
// compute_trade_amounts
// ============================================================================

#[test]
fn test_documented_scenario() {
    let amounts = compute_trade_amounts(TradeParams {
        reserve_balance: wei(10),
        trigger_balance: wei(50),
        balance: Balance::new(wei(1000), wei(50)),
        tx_fee: wei(1),
        exchange_rate: dec!(20),
    });

    assert_eq!(amounts.withdraw_amount, wei(40));
    assert_eq!(amounts.protocol_fee, vtho("0.117"));
    // (39 - 0.117) * 3 / 1000
    assert_eq!(amounts.dex_fee, vtho("0.116649"));
    assert_eq!(amounts.total_fees, vtho("1.233649"));
    assert_eq!(amounts.amount_out, (wei(40) - amounts.total_fees) / U256::from(20u64));
    assert_eq!(format_units(amounts.amount_out, TOKEN_DECIMALS), "1.93831755");
}

#[test]
fn test_protocol_fee_is_floored_and_bounded() {
    for (withdraw, fee) in [
        ("40", "1"),
        ("1.000000000000000333", "1"),
        ("5000", "0.5"),
        ("0.000000000000001", "0"),
    ] {
        let withdraw = vtho(withdraw);
        let tx_fee = vtho(fee);
        let amounts = compute_trade_amounts(TradeParams {
            reserve_balance: U256::ZERO,
            trigger_balance: withdraw,
            balance: Balance::default(),
            tx_fee,
            exchange_rate: dec!(1),
        });

        let net = withdraw - tx_fee;
        assert_eq!(amounts.protocol_fee, net * U256::from(3u64) / U256::from(1000u64));
        assert!(amounts.protocol_fee < net);
    }
}

// ============================================================================
// seconds_until_trigger
// ============================================================================

#[test]
fn test_trigger_reached_is_zero_regardless_of_vet() {
    for vet in [U256::ZERO, wei(1), wei(1_000_000)] {
        assert_eq!(seconds_until_trigger(Balance::new(vet, wei(60)), wei(50)), Some(0));
        assert_eq!(seconds_until_trigger(Balance::new(vet, wei(50)), wei(50)), Some(0));
    }
}

#[test]
fn test_no_vet_means_no_countdown() {
    assert_eq!(seconds_until_trigger(Balance::new(U256::ZERO, wei(10)), wei(50)), None);
}

#[test]
fn test_countdown_shrinks_with_more_vet() {
    let small = seconds_until_trigger(Balance::new(wei(100), wei(10)), wei(50)).unwrap();
    let large = seconds_until_trigger(Balance::new(wei(10_000), wei(10)), wei(50)).unwrap();
    assert!(large < small);
    assert_eq!(small, 80_000_000);
}

// ============================================================================
// choose_solution / extend_solution
// ============================================================================

#[test]
fn test_choose_solution_is_deterministic_and_feasible() {
    let solutions = vec![
        solution(wei(300)),
        solution(wei(25)),
        solution(wei(120)),
        solution(wei(60)),
    ];
    let reserve = wei(15);

    for balance in [wei(10), wei(40), wei(100), wei(135), wei(1_000)] {
        let first = choose_solution(balance, reserve, &solutions).unwrap();
        let second = choose_solution(balance, reserve, &solutions).unwrap();
        assert_eq!(first, second);

        let any_feasible = solutions
            .iter()
            .any(|s| s.withdraw_amount + reserve <= balance);
        if any_feasible {
            assert!(first.withdraw_amount + reserve <= balance);
            // Nothing larger is feasible.
            assert!(solutions
                .iter()
                .filter(|s| s.withdraw_amount > first.withdraw_amount)
                .all(|s| s.withdraw_amount + reserve > balance));
        } else {
            assert_eq!(first.withdraw_amount, wei(25));
        }
    }
}

#[test]
fn test_extend_solution_never_exceeds_cap() {
    let base = solution(wei(100));
    for balance in [wei(6_000), wei(1_000_000), U256::MAX / U256::from(2u64)] {
        let extended = extend_solution(&base, balance, wei(10), wei(1), wei(50_000), wei(2_500));
        assert!(extended.withdraw_amount <= MAX_WITHDRAW_AMOUNT);
        assert_eq!(extended.withdraw_amount, MAX_WITHDRAW_AMOUNT);
    }
}

#[test]
fn test_extended_solution_outputs_more_vet() {
    let reserve_in = wei(100_000);
    let reserve_out = wei(5_000);
    let base = extend_solution(&solution(wei(10)), wei(61), wei(10), wei(1), reserve_in, reserve_out);
    let bigger = extend_solution(&solution(wei(10)), wei(510), wei(10), wei(1), reserve_in, reserve_out);

    assert_eq!(base.withdraw_amount, wei(51));
    assert_eq!(bigger.withdraw_amount, wei(500));
    assert!(bigger.delta_vet > base.delta_vet);
    // Constant-product output never drains the pool.
    assert!(bigger.delta_vet < reserve_out);
}
