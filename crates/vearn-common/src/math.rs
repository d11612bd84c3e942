//! Trade math for VTHO -> VET auto-swaps.
//!
//! Pure functions on base units. Division floors, matching the integer
//! arithmetic the Trader contract performs on-chain.
//!
//! ## Fees
//!
//! - Protocol fee: 3‰ of the withdrawn amount net of the transaction fee
//! - DEX fee: 3‰ of what remains after the protocol fee

use alloy::primitives::{uint, U256};
use rust_decimal::Decimal;

use crate::types::{Balance, PoolReserves, Solution, TradeAmounts};
use crate::units::{to_decimal, TOKEN_DECIMALS};

/// Protocol fee numerator (per mille).
pub const PROTOCOL_FEE_MULTIPLIER: u64 = 3;

/// DEX fee numerator (per mille).
pub const DEX_FEE_MULTIPLIER: u64 = 3;

/// Fee denominator.
pub const FEE_DENOMINATOR: u64 = 1000;

/// Largest single withdrawal the Trader contract accepts: 5000 VTHO.
pub const MAX_WITHDRAW_AMOUNT: U256 = uint!(5000000000000000000000_U256);

/// VTHO generated per VET per second is 5e-9, expressed as a ratio.
const VTHO_GENERATION_NUMERATOR: u64 = 5;
const VTHO_GENERATION_DENOMINATOR: u64 = 1_000_000_000;

/// Inputs to [`compute_trade_amounts`].
#[derive(Debug, Clone, Copy)]
pub struct TradeParams {
    pub reserve_balance: U256,
    pub trigger_balance: U256,
    pub balance: Balance,
    pub tx_fee: U256,
    /// VTHO per VET.
    pub exchange_rate: Decimal,
}

fn protocol_fee(amount: U256) -> U256 {
    amount * U256::from(PROTOCOL_FEE_MULTIPLIER) / U256::from(FEE_DENOMINATOR)
}

fn dex_fee(amount: U256) -> U256 {
    amount * U256::from(DEX_FEE_MULTIPLIER) / U256::from(FEE_DENOMINATOR)
}

/// Divide base units by a decimal rate, flooring.
fn div_by_rate(amount: U256, rate: Decimal) -> U256 {
    if rate <= Decimal::ZERO {
        return U256::ZERO;
    }
    // rate = mantissa / 10^scale
    let mantissa = U256::from(rate.mantissa().unsigned_abs());
    let scale = U256::from(10u64).pow(U256::from(rate.scale()));
    amount * scale / mantissa
}

/// Compute the amounts of the next swap for an account.
///
/// The withdrawal is everything above the reserve once the trigger is
/// crossed, or `trigger - reserve` while the balance is still below it.
pub fn compute_trade_amounts(params: TradeParams) -> TradeAmounts {
    let TradeParams {
        reserve_balance,
        trigger_balance,
        balance,
        tx_fee,
        exchange_rate,
    } = params;

    let withdraw_amount = if balance.vtho > trigger_balance {
        balance.vtho.saturating_sub(reserve_balance)
    } else {
        trigger_balance.saturating_sub(reserve_balance)
    };

    let net = withdraw_amount.saturating_sub(tx_fee);
    let protocol_fee = protocol_fee(net);
    let dex_fee = dex_fee(net.saturating_sub(protocol_fee));
    let total_fees = tx_fee + protocol_fee + dex_fee;

    let amount_out = if withdraw_amount.is_zero() {
        U256::ZERO
    } else {
        div_by_rate(withdraw_amount.saturating_sub(total_fees), exchange_rate)
    };

    TradeAmounts {
        withdraw_amount,
        amount_out,
        tx_fee,
        protocol_fee,
        dex_fee,
        total_fees,
    }
}

/// Seconds until the VTHO balance organically reaches `trigger_balance`.
///
/// Returns `Some(0)` when the trigger is already reached and `None` when the
/// account holds no VET (no VTHO generation).
pub fn seconds_until_trigger(balance: Balance, trigger_balance: U256) -> Option<u64> {
    if trigger_balance <= balance.vtho {
        return Some(0);
    }
    if balance.vet.is_zero() {
        return None;
    }

    let missing = trigger_balance - balance.vtho;
    let per_second = balance.vet * U256::from(VTHO_GENERATION_NUMERATOR);
    let seconds = missing * U256::from(VTHO_GENERATION_DENOMINATOR) / per_second;
    Some(u64::try_from(seconds).unwrap_or(u64::MAX))
}

/// Pick the largest solution the balance can fund, or the smallest one.
///
/// Returns `None` only for an empty slice.
pub fn choose_solution(
    vtho_balance: U256,
    reserve_balance: U256,
    solutions: &[Solution],
) -> Option<Solution> {
    let mut sorted: Vec<&Solution> = solutions.iter().collect();
    sorted.sort_by(|a, b| a.withdraw_amount.cmp(&b.withdraw_amount));

    let mut chosen = *sorted.first()?;
    for solution in sorted {
        if vtho_balance >= solution.withdraw_amount.saturating_add(reserve_balance) {
            chosen = solution;
        }
    }
    Some(chosen.clone())
}

/// Grow a solution to use the whole spendable balance, up to
/// [`MAX_WITHDRAW_AMOUNT`].
///
/// Fees and the constant-product output are recomputed for the larger
/// withdrawal. Solutions the balance cannot exceed are returned as-is.
pub fn extend_solution(
    solution: &Solution,
    vtho_balance: U256,
    reserve_balance: U256,
    tx_fee: U256,
    reserve_in: U256,
    reserve_out: U256,
) -> Solution {
    if vtho_balance <= solution.withdraw_amount.saturating_add(reserve_balance) {
        return solution.clone();
    }

    let withdraw_amount = vtho_balance
        .saturating_sub(reserve_balance)
        .min(MAX_WITHDRAW_AMOUNT);
    let net = withdraw_amount.saturating_sub(tx_fee);
    let protocol_fee = protocol_fee(net);
    let dex_fee = dex_fee(net.saturating_sub(protocol_fee));
    let amount_in_with_fees = net.saturating_sub(protocol_fee).saturating_sub(dex_fee);

    let denominator = reserve_in + amount_in_with_fees;
    let delta_vet = if denominator.is_zero() {
        U256::ZERO
    } else {
        amount_in_with_fees * reserve_out / denominator
    };

    Solution {
        protocol_fee,
        dex_fee,
        amount_in_with_fees,
        delta_vet,
        withdraw_amount,
        ..solution.clone()
    }
}

/// Spot exchange rate (VTHO per VET) implied by pool reserves.
pub fn exchange_rate(pool: PoolReserves) -> Option<Decimal> {
    let reserve_in = to_decimal(pool.reserve_in, TOKEN_DECIMALS)?;
    let reserve_out = to_decimal(pool.reserve_out, TOKEN_DECIMALS)?;
    reserve_in.checked_div(reserve_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::ten_pow;
    use rust_decimal_macros::dec;

    fn wei(tokens: u64) -> U256 {
        U256::from(tokens) * ten_pow(TOKEN_DECIMALS)
    }

    fn solution(withdraw_tokens: u64) -> Solution {
        Solution {
            protocol_fee: U256::ZERO,
            dex_fee: U256::ZERO,
            amount_in_with_fees: U256::ZERO,
            delta_vet: U256::ZERO,
            steps_count: 1,
            withdraw_amount: wei(withdraw_tokens),
            total_profit_vet: U256::ZERO,
        }
    }

    #[test]
    fn test_max_withdraw_amount() {
        assert_eq!(MAX_WITHDRAW_AMOUNT, wei(5000));
    }

    #[test]
    fn test_withdraw_below_trigger() {
        let amounts = compute_trade_amounts(TradeParams {
            reserve_balance: wei(10),
            trigger_balance: wei(50),
            balance: Balance::new(wei(1000), wei(20)),
            tx_fee: wei(1),
            exchange_rate: dec!(20),
        });
        assert_eq!(amounts.withdraw_amount, wei(40));
    }

    #[test]
    fn test_withdraw_above_trigger() {
        let amounts = compute_trade_amounts(TradeParams {
            reserve_balance: wei(10),
            trigger_balance: wei(50),
            balance: Balance::new(wei(1000), wei(80)),
            tx_fee: wei(1),
            exchange_rate: dec!(20),
        });
        assert_eq!(amounts.withdraw_amount, wei(70));
    }

    #[test]
    fn test_zero_withdraw_has_no_output() {
        let amounts = compute_trade_amounts(TradeParams {
            reserve_balance: wei(50),
            trigger_balance: wei(50),
            balance: Balance::new(wei(1000), wei(10)),
            tx_fee: wei(1),
            exchange_rate: dec!(20),
        });
        assert_eq!(amounts.withdraw_amount, U256::ZERO);
        assert_eq!(amounts.amount_out, U256::ZERO);
    }

    #[test]
    fn test_fractional_exchange_rate() {
        let amounts = compute_trade_amounts(TradeParams {
            reserve_balance: U256::ZERO,
            trigger_balance: wei(10),
            balance: Balance::new(wei(1), U256::ZERO),
            tx_fee: U256::ZERO,
            exchange_rate: dec!(0.5),
        });
        // 10 - 0.03 - 0.02991 = 9.94009 VTHO, / 0.5 = 19.88018 VET
        assert_eq!(amounts.amount_out, U256::from(19_880_180_000_000_000_000u128));
    }

    #[test]
    fn test_non_positive_rate_yields_zero_output() {
        let amounts = compute_trade_amounts(TradeParams {
            reserve_balance: U256::ZERO,
            trigger_balance: wei(10),
            balance: Balance::default(),
            tx_fee: U256::ZERO,
            exchange_rate: Decimal::ZERO,
        });
        assert_eq!(amounts.amount_out, U256::ZERO);
    }

    #[test]
    fn test_seconds_until_trigger() {
        // 1000 VET generates 5e-6 VTHO/s; 1 VTHO takes 200_000 s.
        let balance = Balance::new(wei(1000), wei(49));
        assert_eq!(seconds_until_trigger(balance, wei(50)), Some(200_000));
        assert_eq!(seconds_until_trigger(balance, wei(49)), Some(0));
        assert_eq!(
            seconds_until_trigger(Balance::new(U256::ZERO, wei(1)), wei(2)),
            None
        );
    }

    #[test]
    fn test_choose_solution_picks_largest_feasible() {
        let solutions = vec![solution(100), solution(20), solution(50)];
        let chosen = choose_solution(wei(70), wei(10), &solutions).unwrap();
        assert_eq!(chosen.withdraw_amount, wei(50));
    }

    #[test]
    fn test_choose_solution_defaults_to_smallest() {
        let solutions = vec![solution(100), solution(20)];
        let chosen = choose_solution(wei(5), wei(10), &solutions).unwrap();
        assert_eq!(chosen.withdraw_amount, wei(20));
    }

    #[test]
    fn test_choose_solution_empty() {
        assert!(choose_solution(wei(5), wei(1), &[]).is_none());
    }

    #[test]
    fn test_extend_solution_unchanged_when_not_larger() {
        let base = solution(40);
        let extended = extend_solution(&base, wei(50), wei(10), wei(1), wei(1000), wei(50));
        assert_eq!(extended, base);
    }

    #[test]
    fn test_extend_solution_grows_withdrawal() {
        let base = solution(40);
        let extended = extend_solution(&base, wei(110), wei(10), wei(1), wei(1000), wei(50));

        assert_eq!(extended.withdraw_amount, wei(100));
        // (100 - 1) * 3 / 1000
        assert_eq!(extended.protocol_fee, U256::from(297_000_000_000_000_000u64));
        let expected_in = wei(99) - extended.protocol_fee - extended.dex_fee;
        assert_eq!(extended.amount_in_with_fees, expected_in);
        assert_eq!(
            extended.delta_vet,
            expected_in * wei(50) / (wei(1000) + expected_in)
        );
        assert_eq!(extended.steps_count, base.steps_count);
    }

    #[test]
    fn test_exchange_rate() {
        let pool = PoolReserves {
            reserve_in: wei(2000),
            reserve_out: wei(100),
        };
        assert_eq!(exchange_rate(pool), Some(dec!(20)));
        assert_eq!(
            exchange_rate(PoolReserves {
                reserve_in: wei(1),
                reserve_out: U256::ZERO
            }),
            None
        );
    }
}
