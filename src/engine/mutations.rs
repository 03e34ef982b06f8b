use std::sync::Arc;

use rand::Rng;
use rust_decimal::Decimal;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_span};
use super::{pricing, Engine, EngineError, WalCommand};

/// Fresh uniformly-random numeric access code. Each call draws anew —
/// callers must not assume stability across calls.
fn generate_access_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:0width$}", width = ACCESS_CODE_LEN)
}

impl Engine {
    pub async fn create_unit(
        &self,
        id: Ulid,
        name: String,
        nightly_rate: Decimal,
        owner_id: Ulid,
        smart_lock_id: Option<String>,
    ) -> Result<(), EngineError> {
        if self.store.unit_count() >= MAX_UNITS {
            return Err(EngineError::LimitExceeded("too many units"));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("unit name too long"));
        }
        if nightly_rate.is_sign_negative() {
            return Err(EngineError::InvalidRange("nightly rate must not be negative"));
        }
        if self.store.contains_unit(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::UnitCreated {
            id,
            name: name.clone(),
            nightly_rate,
            owner_id,
            smart_lock_id: smart_lock_id.clone(),
        };
        self.wal_append(&event).await?;
        let unit = UnitState::new(id, name, nightly_rate, owner_id, smart_lock_id);
        self.store.insert_unit(id, Arc::new(RwLock::new(unit)));
        Ok(())
    }

    /// Typed unit update — only the named fields can change, and the rate a
    /// running booking request already read stays fixed because the request
    /// holds the unit's write lock for its whole critical section.
    pub async fn update_unit(
        &self,
        id: Ulid,
        name: Option<String>,
        nightly_rate: Option<Decimal>,
        is_available: Option<bool>,
        smart_lock_id: Option<Option<String>>,
    ) -> Result<(), EngineError> {
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("unit name too long"));
        }
        if let Some(rate) = nightly_rate
            && rate.is_sign_negative()
        {
            return Err(EngineError::InvalidRange("nightly rate must not be negative"));
        }
        let unit = self.get_unit(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = unit.write().await;

        let event = Event::UnitUpdated {
            id,
            name: name.unwrap_or_else(|| guard.name.clone()),
            nightly_rate: nightly_rate.unwrap_or(guard.nightly_rate),
            is_available: is_available.unwrap_or(guard.is_available),
            smart_lock_id: smart_lock_id.unwrap_or_else(|| guard.smart_lock_id.clone()),
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn delete_unit(&self, id: Ulid) -> Result<(), EngineError> {
        let unit = self.get_unit(&id).ok_or(EngineError::NotFound(id))?;
        let guard = unit.read().await;
        if guard.reservations.iter().any(Reservation::blocks_calendar) {
            return Err(EngineError::ConflictingState(
                "unit still has non-cancelled reservations",
            ));
        }
        let reservation_ids: Vec<Ulid> = guard.reservations.iter().map(|r| r.id).collect();
        drop(guard);

        let event = Event::UnitDeleted { id };
        self.wal_append(&event).await?;
        for rid in reservation_ids {
            self.store.unmap_reservation(&rid);
        }
        self.store.remove_unit(&id);
        Ok(())
    }

    /// Create a pending reservation. Validation order: identity →
    /// existence → unit availability → range → calendar overlap → price.
    /// The unit's write lock is held from before the overlap re-check
    /// until after the commit, so of N concurrent conflicting requests
    /// exactly one wins; the rest observe the winner and get Conflict.
    pub async fn create_reservation(
        &self,
        id: Ulid,
        unit_id: Ulid,
        guest_id: Ulid,
        check_in: Ms,
        check_out: Ms,
        declared_total: Decimal,
    ) -> Result<(), EngineError> {
        let span = validate_span(check_in, check_out)?;
        if !self.identity.is_verified(guest_id) {
            return Err(EngineError::Unauthorized(guest_id));
        }
        let unit = self.get_unit(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        let mut guard = unit.write().await;

        if guard.reservations.len() >= MAX_RESERVATIONS_PER_UNIT {
            return Err(EngineError::LimitExceeded("too many reservations on unit"));
        }
        if self.unit_for_reservation(&id).is_some() {
            return Err(EngineError::AlreadyExists(id));
        }
        if !guard.is_available {
            return Err(EngineError::UnitUnavailable(unit_id));
        }
        let now = now_ms();
        if span.start <= now {
            return Err(EngineError::InvalidRange("check-in must be in the future"));
        }

        // Availability before price, and both re-checked server-side even
        // when the client quoted them from an earlier advisory call.
        check_no_conflict(&guard, &span)?;
        let total = pricing::total_price(span.nights(), guard.nightly_rate)?;
        if !pricing::matches_declared(total, declared_total) {
            return Err(EngineError::PriceMismatch {
                declared: declared_total,
                computed: total,
            });
        }

        let event = Event::ReservationCreated {
            id,
            unit_id,
            guest_id,
            span,
            total_price: total,
            created_at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        self.mirror(&guard, &id);
        Ok(())
    }

    /// Cancel a reservation. Confirmed+paid is terminal with respect to
    /// cancellation; cancelling an already-cancelled reservation is an
    /// idempotent no-op.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (unit_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.reservation(&id).ok_or(EngineError::NotFound(id))?;

        match reservation.status {
            ReservationStatus::Cancelled => return Ok(unit_id),
            ReservationStatus::Confirmed if reservation.paid => {
                return Err(EngineError::ConflictingState(
                    "paid reservation cannot be cancelled",
                ));
            }
            _ => {}
        }

        let event = Event::ReservationCancelled { id, unit_id };
        self.persist_and_apply(&mut guard, &event).await?;
        self.mirror(&guard, &id);
        Ok(unit_id)
    }

    /// Record a payment attempt. The first completed payment flips the
    /// reservation to paid+confirmed — the only path that unlocks access
    /// codes. Later attempts are kept as duplicates and change nothing.
    pub async fn record_payment(
        &self,
        payment_id: Ulid,
        reservation_id: Ulid,
        amount: Decimal,
        method: String,
        transaction_id: String,
    ) -> Result<(), EngineError> {
        if method.len() > MAX_METHOD_LEN {
            return Err(EngineError::LimitExceeded("payment method too long"));
        }
        if transaction_id.len() > MAX_TRANSACTION_ID_LEN {
            return Err(EngineError::LimitExceeded("transaction id too long"));
        }
        let (unit_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let reservation = guard
            .reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;

        if reservation.status == ReservationStatus::Cancelled {
            return Err(EngineError::ConflictingState(
                "cancelled reservation cannot be paid",
            ));
        }
        if reservation.payments.iter().any(|p| p.id == payment_id) {
            return Err(EngineError::AlreadyExists(payment_id));
        }
        let status = if reservation.paid {
            PaymentStatus::Duplicate
        } else {
            PaymentStatus::Completed
        };

        let event = Event::PaymentRecorded {
            id: payment_id,
            reservation_id,
            unit_id,
            amount,
            method,
            transaction_id,
            status,
            recorded_at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        if status == PaymentStatus::Completed {
            self.mirror(&guard, &reservation_id);
        }
        Ok(())
    }

    /// Issue (or re-issue) the physical access code for a paid reservation.
    /// Overwrites any prior code; valid until checkout. Uniqueness is only
    /// meaningful together with the unit's smart lock, which scopes it.
    pub async fn issue_access_code(&self, reservation_id: Ulid) -> Result<AccessCode, EngineError> {
        let (unit_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let reservation = guard
            .reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;

        if !reservation.paid {
            return Err(EngineError::PaymentRequired(reservation_id));
        }
        let valid_until = reservation.span.end;
        let code = generate_access_code();

        let event = Event::AccessCodeIssued {
            reservation_id,
            unit_id,
            code: code.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(AccessCode {
            reservation_id,
            code,
            valid_until,
        })
    }

    /// Administrative removal — the only path that destroys a reservation
    /// record. Normal flow only ever cancels.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let (unit_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let event = Event::ReservationDeleted { id, unit_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(unit_id)
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for unit_id in self.store.unit_ids() {
            let Some(unit) = self.store.unit(&unit_id) else {
                continue;
            };
            let guard = unit.read().await;

            events.push(Event::UnitCreated {
                id: guard.id,
                name: guard.name.clone(),
                nightly_rate: guard.nightly_rate,
                owner_id: guard.owner_id,
                smart_lock_id: guard.smart_lock_id.clone(),
            });
            if !guard.is_available {
                events.push(Event::UnitUpdated {
                    id: guard.id,
                    name: guard.name.clone(),
                    nightly_rate: guard.nightly_rate,
                    is_available: false,
                    smart_lock_id: guard.smart_lock_id.clone(),
                });
            }

            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    id: r.id,
                    unit_id: guard.id,
                    guest_id: r.guest_id,
                    span: r.span,
                    total_price: r.total_price,
                    created_at: r.created_at,
                });
                for p in &r.payments {
                    events.push(Event::PaymentRecorded {
                        id: p.id,
                        reservation_id: r.id,
                        unit_id: guard.id,
                        amount: p.amount,
                        method: p.method.clone(),
                        transaction_id: p.transaction_id.clone(),
                        status: p.status,
                        recorded_at: p.recorded_at,
                    });
                }
                if let Some(ref code) = r.access_code {
                    events.push(Event::AccessCodeIssued {
                        reservation_id: r.id,
                        unit_id: guard.id,
                        code: code.clone(),
                    });
                }
                if r.status == ReservationStatus::Cancelled {
                    events.push(Event::ReservationCancelled {
                        id: r.id,
                        unit_id: guard.id,
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[cfg(test)]
mod access_code_tests {
    use super::*;

    #[test]
    fn access_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_access_code();
            assert_eq!(code.len(), ACCESS_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn access_codes_vary() {
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generate_access_code()).collect();
        // Uniform over 10^6 — 50 draws colliding into one value would be absurd
        assert!(codes.len() > 1);
    }
}
