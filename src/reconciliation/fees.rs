use crate::ledger::round_money;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Percentage fee on an order amount, 2-dp round-half-up.
pub fn percentage_fee(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / dec!(100))
}

/// Fee to give back when part of an order is refunded: the original fee
/// scaled by the refunded fraction, 2-dp round-half-up.
pub fn proportional_fee_reversal(
    original_fee: Decimal,
    refund_amount: Decimal,
    original_amount: Decimal,
) -> Decimal {
    if original_amount <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    round_money(original_fee * refund_amount / original_amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_platform_and_provider_fees() {
        assert_eq!(percentage_fee(dec!(100.00), dec!(5.0)), dec!(5.00));
        assert_eq!(percentage_fee(dec!(100.00), dec!(2.9)), dec!(2.90));
    }

    #[test]
    fn fee_rounds_half_up() {
        // 4.31 * 2.9% = 0.124990 -> 0.12; 4.32 * 2.9% = 0.125280 -> 0.13
        assert_eq!(percentage_fee(dec!(4.31), dec!(2.9)), dec!(0.12));
        assert_eq!(percentage_fee(dec!(4.32), dec!(2.9)), dec!(0.13));
        // exact midpoint goes away from zero
        assert_eq!(percentage_fee(dec!(2.50), dec!(5.0)), dec!(0.13));
    }

    #[test]
    fn half_refund_reverses_half_the_fee() {
        // $100 order, $5 platform fee, $50 refund -> $2.50 back
        assert_eq!(
            proportional_fee_reversal(dec!(5.00), dec!(50.00), dec!(100.00)),
            dec!(2.50)
        );
    }

    #[test]
    fn full_refund_reverses_the_full_fee() {
        assert_eq!(
            proportional_fee_reversal(dec!(5.00), dec!(100.00), dec!(100.00)),
            dec!(5.00)
        );
    }

    #[test]
    fn reversal_rounds_half_up() {
        // 5.00 * 33.33 / 100.00 = 1.6665 -> 1.67
        assert_eq!(
            proportional_fee_reversal(dec!(5.00), dec!(33.33), dec!(100.00)),
            dec!(1.67)
        );
    }

    #[test]
    fn zero_original_amount_reverses_nothing() {
        assert_eq!(
            proportional_fee_reversal(dec!(5.00), dec!(10.00), dec!(0)),
            Decimal::ZERO
        );
    }
}
