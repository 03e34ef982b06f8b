use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Validate raw check-in/check-out instants and build the stay span.
/// Wire input never touches `Span::new` directly — an inverted range is a
/// client error, not an internal invariant violation.
pub(crate) fn validate_span(check_in: Ms, check_out: Ms) -> Result<Span, EngineError> {
    use crate::limits::*;
    if check_in >= check_out {
        return Err(EngineError::InvalidRange("check-in must be before check-out"));
    }
    if check_in < MIN_VALID_TIMESTAMP_MS || check_out > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if check_out - check_in > MAX_STAY_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(Span::new(check_in, check_out))
}

/// Overlap test for the booking calendar: a conflict exists iff some
/// non-cancelled reservation R satisfies
/// `R.check_in < check_out AND R.check_out > check_in`.
/// Back-to-back stays sharing a day boundary are NOT conflicts (half-open).
pub(crate) fn check_no_conflict(unit: &UnitState, span: &Span) -> Result<(), EngineError> {
    for reservation in unit.overlapping(span) {
        if reservation.blocks_calendar() {
            return Err(EngineError::Conflict(reservation.id));
        }
    }
    Ok(())
}
