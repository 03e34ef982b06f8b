use ulid::Ulid;

use crate::model::*;

use super::conflict::{check_no_conflict, validate_span};
use super::{pricing, Engine, EngineError};

fn reservation_info(r: &Reservation) -> ReservationInfo {
    ReservationInfo {
        id: r.id,
        unit_id: r.unit_id,
        guest_id: r.guest_id,
        check_in: r.span.start,
        check_out: r.span.end,
        total_price: r.total_price,
        status: r.status,
        paid: r.paid,
        access_code: r.access_code.clone(),
        created_at: r.created_at,
    }
}

impl Engine {
    /// Advisory availability check: no side effects, safe to repeat.
    /// The create path re-runs the same overlap test under the unit's
    /// write lock, so a quote can always go stale.
    pub async fn quote(&self, unit_id: Ulid, check_in: Ms, check_out: Ms) -> Result<Quote, EngineError> {
        let span = validate_span(check_in, check_out)?;
        let unit = self.get_unit(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        let guard = unit.read().await;

        let available = check_no_conflict(&guard, &span).is_ok();
        let nights = span.nights();
        // Sub-night spans quote as zero nights at zero price; the create
        // path is where they become a hard error.
        let total_price = if nights > 0 {
            pricing::total_price(nights, guard.nightly_rate)?
        } else {
            rust_decimal::Decimal::ZERO
        };

        Ok(Quote {
            unit_id,
            available,
            nights,
            total_price,
        })
    }

    pub async fn list_units(&self, only_available: bool) -> Vec<UnitInfo> {
        let mut units = Vec::new();
        for id in self.store.unit_ids() {
            let Some(unit) = self.store.unit(&id) else {
                continue;
            };
            let guard = unit.read().await;
            if only_available && !guard.is_available {
                continue;
            }
            units.push(UnitInfo {
                id: guard.id,
                name: guard.name.clone(),
                nightly_rate: guard.nightly_rate,
                is_available: guard.is_available,
                owner_id: guard.owner_id,
                smart_lock_id: guard.smart_lock_id.clone(),
            });
        }
        units.sort_by_key(|u| u.id);
        units
    }

    pub async fn get_reservations(&self, unit_id: Ulid) -> Result<Vec<ReservationInfo>, EngineError> {
        let unit = match self.get_unit(&unit_id) {
            Some(unit) => unit,
            None => return Ok(vec![]),
        };
        let guard = unit.read().await;
        Ok(guard.reservations.iter().map(reservation_info).collect())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<ReservationInfo, EngineError> {
        let unit_id = self
            .unit_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let unit = self.get_unit(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        let guard = unit.read().await;
        guard
            .reservation(&id)
            .map(reservation_info)
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn get_payments(&self, reservation_id: Ulid) -> Result<Vec<PaymentInfo>, EngineError> {
        let unit_id = self
            .unit_for_reservation(&reservation_id)
            .ok_or(EngineError::NotFound(reservation_id))?;
        let unit = self.get_unit(&unit_id).ok_or(EngineError::NotFound(unit_id))?;
        let guard = unit.read().await;
        let Some(r) = guard.reservation(&reservation_id) else {
            return Err(EngineError::NotFound(reservation_id));
        };
        Ok(r.payments
            .iter()
            .map(|p| PaymentInfo {
                id: p.id,
                reservation_id: p.reservation_id,
                amount: p.amount,
                method: p.method.clone(),
                transaction_id: p.transaction_id.clone(),
                status: p.status,
                recorded_at: p.recorded_at,
            })
            .collect())
    }
}
