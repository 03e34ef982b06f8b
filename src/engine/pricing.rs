use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::EngineError;

/// Allowed absolute deviation between declared and computed totals.
/// Covers client-side decimal formatting drift, nothing more.
pub const PRICE_TOLERANCE: Decimal = dec!(0.01);

/// Deterministic stay price: whole nights × nightly rate.
/// A stay shorter than one whole night cannot be priced.
pub fn total_price(nights: i64, nightly_rate: Decimal) -> Result<Decimal, EngineError> {
    if nights <= 0 {
        return Err(EngineError::ConflictingState(
            "stay must cover at least one whole night",
        ));
    }
    Ok(Decimal::from(nights) * nightly_rate)
}

/// Compare a client-declared total against the server-computed one.
pub fn matches_declared(computed: Decimal, declared: Decimal) -> bool {
    (computed - declared).abs() <= PRICE_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_is_nights_times_rate() {
        assert_eq!(total_price(1, dec!(1000)).unwrap(), dec!(1000));
        assert_eq!(total_price(4, dec!(1499.50)).unwrap(), dec!(5998.00));
        assert_eq!(total_price(30, dec!(0)).unwrap(), dec!(0));
    }

    #[test]
    fn zero_or_negative_nights_rejected() {
        assert!(matches!(
            total_price(0, dec!(1000)),
            Err(EngineError::ConflictingState(_))
        ));
        assert!(matches!(
            total_price(-3, dec!(1000)),
            Err(EngineError::ConflictingState(_))
        ));
    }

    #[test]
    fn no_float_drift_on_decimal_rates() {
        // 0.1 + 0.2 style rates stay exact under Decimal.
        assert_eq!(total_price(3, dec!(0.10)).unwrap(), dec!(0.30));
    }

    #[test]
    fn declared_within_tolerance_accepted() {
        assert!(matches_declared(dec!(2000), dec!(2000)));
        assert!(matches_declared(dec!(2000), dec!(2000.01)));
        assert!(matches_declared(dec!(2000), dec!(1999.99)));
    }

    #[test]
    fn declared_beyond_tolerance_rejected() {
        assert!(!matches_declared(dec!(2000), dec!(2000.02)));
        assert!(!matches_declared(dec!(2000), dec!(1800)));
    }
}
