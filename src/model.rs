use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type used internally.
pub type Ms = i64;

/// One whole night, the pricing and duration unit.
pub const MS_PER_NIGHT: Ms = 86_400_000;

/// Half-open stay interval `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Whole-night count. Fractional nights truncate down, never up.
    pub fn nights(&self) -> i64 {
        self.duration_ms() / MS_PER_NIGHT
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Format a millisecond timestamp as RFC 3339 with an explicit offset.
pub fn rfc3339(ms: Ms) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    /// The attempt that flipped the reservation to paid.
    Completed,
    /// An attempt recorded after the reservation was already paid.
    Duplicate,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Completed => "completed",
            PaymentStatus::Duplicate => "duplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub reservation_id: Ulid,
    pub amount: Decimal,
    pub method: String,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub recorded_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub guest_id: Ulid,
    pub span: Span,
    /// Server-computed total: nights × nightly rate at creation time.
    pub total_price: Decimal,
    pub status: ReservationStatus,
    pub paid: bool,
    /// Non-null only while paid and confirmed.
    pub access_code: Option<String>,
    pub payments: Vec<Payment>,
    pub created_at: Ms,
}

impl Reservation {
    /// Whether this reservation still occupies the calendar.
    pub fn blocks_calendar(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }
}

#[derive(Debug, Clone)]
pub struct UnitState {
    pub id: Ulid,
    pub name: String,
    pub nightly_rate: Decimal,
    pub is_available: bool,
    pub owner_id: Ulid,
    /// Smart-lock identifier the physical lock controller scopes codes to.
    pub smart_lock_id: Option<String>,
    /// All reservations (including cancelled), sorted by `span.start`.
    pub reservations: Vec<Reservation>,
}

impl UnitState {
    pub fn new(
        id: Ulid,
        name: String,
        nightly_rate: Decimal,
        owner_id: Ulid,
        smart_lock_id: Option<String>,
    ) -> Self {
        Self {
            id,
            name,
            nightly_rate,
            is_available: true,
            owner_id,
            smart_lock_id,
            reservations: Vec::new(),
        }
    }

    /// Insert a reservation maintaining sort order by `span.start`.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UnitCreated {
        id: Ulid,
        name: String,
        nightly_rate: Decimal,
        owner_id: Ulid,
        smart_lock_id: Option<String>,
    },
    UnitUpdated {
        id: Ulid,
        name: String,
        nightly_rate: Decimal,
        is_available: bool,
        smart_lock_id: Option<String>,
    },
    UnitDeleted {
        id: Ulid,
    },
    ReservationCreated {
        id: Ulid,
        unit_id: Ulid,
        guest_id: Ulid,
        span: Span,
        total_price: Decimal,
        created_at: Ms,
    },
    ReservationCancelled {
        id: Ulid,
        unit_id: Ulid,
    },
    ReservationDeleted {
        id: Ulid,
        unit_id: Ulid,
    },
    PaymentRecorded {
        id: Ulid,
        reservation_id: Ulid,
        unit_id: Ulid,
        amount: Decimal,
        method: String,
        transaction_id: String,
        status: PaymentStatus,
        recorded_at: Ms,
    },
    AccessCodeIssued {
        reservation_id: Ulid,
        unit_id: Ulid,
        code: String,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitInfo {
    pub id: Ulid,
    pub name: String,
    pub nightly_rate: Decimal,
    pub is_available: bool,
    pub owner_id: Ulid,
    pub smart_lock_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub guest_id: Ulid,
    pub check_in: Ms,
    pub check_out: Ms,
    pub total_price: Decimal,
    pub status: ReservationStatus,
    pub paid: bool,
    pub access_code: Option<String>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInfo {
    pub id: Ulid,
    pub reservation_id: Ulid,
    pub amount: Decimal,
    pub method: String,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub recorded_at: Ms,
}

/// Advisory availability answer — the create path re-checks under the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub unit_id: Ulid,
    pub available: bool,
    pub nights: i64,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCode {
    pub reservation_id: Ulid,
    pub code: String,
    pub valid_until: Ms,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn reservation(start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            unit_id: Ulid::new(),
            guest_id: Ulid::new(),
            span: Span::new(start, end),
            total_price: dec!(0),
            status: ReservationStatus::Pending,
            paid: false,
            access_code: None,
            payments: Vec::new(),
            created_at: 0,
        }
    }

    fn unit() -> UnitState {
        UnitState::new(Ulid::new(), "Loft 2B".into(), dec!(1000), Ulid::new(), None)
    }

    #[test]
    fn span_basics() {
        let s = Span::new(0, MS_PER_NIGHT * 2);
        assert_eq!(s.duration_ms(), MS_PER_NIGHT * 2);
        assert_eq!(s.nights(), 2);
    }

    #[test]
    fn span_nights_truncate_down() {
        // Two nights minus one millisecond is one night; never round up.
        let s = Span::new(0, MS_PER_NIGHT * 2 - 1);
        assert_eq!(s.nights(), 1);
        let sub_day = Span::new(0, MS_PER_NIGHT - 1);
        assert_eq!(sub_day.nights(), 0);
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn reservation_ordering() {
        let mut rs = unit();
        rs.insert_reservation(reservation(300, 400));
        rs.insert_reservation(reservation(100, 200));
        rs.insert_reservation(reservation(200, 300));
        assert_eq!(rs.reservations[0].span.start, 100);
        assert_eq!(rs.reservations[1].span.start, 200);
        assert_eq!(rs.reservations[2].span.start, 300);
    }

    #[test]
    fn reservation_remove() {
        let mut rs = unit();
        let r = reservation(100, 200);
        let id = r.id;
        rs.insert_reservation(r);
        assert_eq!(rs.reservations.len(), 1);
        rs.remove_reservation(id);
        assert!(rs.reservations.is_empty());
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut rs = unit();
        rs.insert_reservation(reservation(100, 200));
        assert!(rs.remove_reservation(Ulid::new()).is_none());
        assert_eq!(rs.reservations.len(), 1);
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut rs = unit();
        rs.insert_reservation(reservation(100, 200));
        rs.insert_reservation(reservation(450, 600));
        rs.insert_reservation(reservation(1000, 1100));

        let query = Span::new(500, 800);
        let hits: Vec<_> = rs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // A stay ending exactly at query.start is NOT overlapping (half-open)
        let mut rs = unit();
        rs.insert_reservation(reservation(100, 200));
        let query = Span::new(200, 300);
        assert!(rs.overlapping(&query).next().is_none());
    }

    #[test]
    fn overlapping_empty_unit() {
        let rs = unit();
        let query = Span::new(0, 1000);
        assert!(rs.overlapping(&query).next().is_none());
    }

    #[test]
    fn rfc3339_has_explicit_offset() {
        let s = rfc3339(0);
        assert!(s.starts_with("1970-01-01T00:00:00"));
        assert!(s.contains("+00:00"));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated {
            id: Ulid::new(),
            unit_id: Ulid::new(),
            guest_id: Ulid::new(),
            span: Span::new(1000, 1000 + MS_PER_NIGHT),
            total_price: dec!(1499.50),
            created_at: 42,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn payment_event_roundtrip_keeps_decimal() {
        let event = Event::PaymentRecorded {
            id: Ulid::new(),
            reservation_id: Ulid::new(),
            unit_id: Ulid::new(),
            amount: dec!(2000.00),
            method: "card".into(),
            transaction_id: "txn_123".into(),
            status: PaymentStatus::Completed,
            recorded_at: 7,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
