use dashmap::DashMap;
use ulid::Ulid;

use crate::model::*;

use super::SharedUnitState;

/// The calendar store — the single persistence abstraction behind the
/// booking engine. Units map to shared per-unit state; a reverse index
/// resolves reservation ids to their unit. Every state change flows
/// through `apply_event`, which is also the WAL replay path.
pub struct CalendarStore {
    units: DashMap<Ulid, SharedUnitState>,
    reservation_to_unit: DashMap<Ulid, Ulid>,
}

impl Default for CalendarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarStore {
    pub fn new() -> Self {
        Self {
            units: DashMap::new(),
            reservation_to_unit: DashMap::new(),
        }
    }

    // ── Unit CRUD ────────────────────────────────────────────

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn contains_unit(&self, id: &Ulid) -> bool {
        self.units.contains_key(id)
    }

    pub fn unit(&self, id: &Ulid) -> Option<SharedUnitState> {
        self.units.get(id).map(|e| e.value().clone())
    }

    pub fn insert_unit(&self, id: Ulid, state: SharedUnitState) {
        self.units.insert(id, state);
    }

    pub fn remove_unit(&self, id: &Ulid) -> Option<(Ulid, SharedUnitState)> {
        self.units.remove(id)
    }

    pub fn unit_ids(&self) -> Vec<Ulid> {
        self.units.iter().map(|e| *e.key()).collect()
    }

    // ── Reservation index ────────────────────────────────────

    pub fn unit_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_unit
            .get(reservation_id)
            .map(|e| *e.value())
    }

    pub fn map_reservation(&self, reservation_id: Ulid, unit_id: Ulid) {
        self.reservation_to_unit.insert(reservation_id, unit_id);
    }

    pub fn unmap_reservation(&self, reservation_id: &Ulid) {
        self.reservation_to_unit.remove(reservation_id);
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event to a unit's state (no locking — caller holds the lock).
    /// Covers reservation insert, status transitions, payment recording and
    /// access-code issuance; unit create/delete happen at the map level.
    pub fn apply_event(&self, unit: &mut UnitState, event: &Event) {
        match event {
            Event::ReservationCreated {
                id,
                unit_id,
                guest_id,
                span,
                total_price,
                created_at,
            } => {
                unit.insert_reservation(Reservation {
                    id: *id,
                    unit_id: *unit_id,
                    guest_id: *guest_id,
                    span: *span,
                    total_price: *total_price,
                    status: ReservationStatus::Pending,
                    paid: false,
                    access_code: None,
                    payments: Vec::new(),
                    created_at: *created_at,
                });
                self.map_reservation(*id, *unit_id);
            }
            Event::ReservationCancelled { id, .. } => {
                if let Some(r) = unit.reservation_mut(id) {
                    r.status = ReservationStatus::Cancelled;
                    r.access_code = None;
                }
            }
            Event::ReservationDeleted { id, .. } => {
                unit.remove_reservation(*id);
                self.unmap_reservation(id);
            }
            Event::PaymentRecorded {
                id,
                reservation_id,
                amount,
                method,
                transaction_id,
                status,
                recorded_at,
                ..
            } => {
                if let Some(r) = unit.reservation_mut(reservation_id) {
                    r.payments.push(Payment {
                        id: *id,
                        reservation_id: *reservation_id,
                        amount: *amount,
                        method: method.clone(),
                        transaction_id: transaction_id.clone(),
                        status: *status,
                        recorded_at: *recorded_at,
                    });
                    if *status == PaymentStatus::Completed {
                        r.paid = true;
                        r.status = ReservationStatus::Confirmed;
                    }
                }
            }
            Event::AccessCodeIssued {
                reservation_id,
                code,
                ..
            } => {
                if let Some(r) = unit.reservation_mut(reservation_id) {
                    r.access_code = Some(code.clone());
                }
            }
            Event::UnitUpdated {
                name,
                nightly_rate,
                is_available,
                smart_lock_id,
                ..
            } => {
                unit.name = name.clone();
                unit.nightly_rate = *nightly_rate;
                unit.is_available = *is_available;
                unit.smart_lock_id = smart_lock_id.clone();
            }
            // Handled at the DashMap level, not here
            Event::UnitCreated { .. } | Event::UnitDeleted { .. } => {}
        }
    }
}
