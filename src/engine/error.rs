use rust_decimal::Decimal;
use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    /// Check-in not strictly before check-out, or check-in in the past.
    InvalidRange(&'static str),
    /// Guest has not passed identity verification.
    Unauthorized(Ulid),
    /// Unit exists but is not open for booking.
    UnitUnavailable(Ulid),
    /// Declared total deviates from the server-computed price beyond tolerance.
    PriceMismatch { declared: Decimal, computed: Decimal },
    /// Overlap with an existing non-cancelled reservation (id of the winner).
    Conflict(Ulid),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Illegal lifecycle transition.
    ConflictingState(&'static str),
    /// Access code requested for an unpaid reservation.
    PaymentRequired(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange(msg) => write!(f, "invalid range: {msg}"),
            EngineError::Unauthorized(id) => write!(f, "unauthorized: guest {id} is not verified"),
            EngineError::UnitUnavailable(id) => write!(f, "unit unavailable: {id}"),
            EngineError::PriceMismatch { declared, computed } => {
                write!(f, "price mismatch: declared {declared}, computed {computed}")
            }
            EngineError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::ConflictingState(msg) => write!(f, "conflicting state: {msg}"),
            EngineError::PaymentRequired(id) => {
                write!(f, "payment required: reservation {id} is not paid")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
