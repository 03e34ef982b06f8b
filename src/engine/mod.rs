mod conflict;
mod error;
mod mutations;
mod pricing;
mod queries;
mod store;

pub use error::EngineError;
pub use pricing::{matches_declared, total_price, PRICE_TOLERANCE};
pub use store::CalendarStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::identity::IdentityProvider;
use crate::ledger::{Ledger, LedgerEntry};
use crate::model::*;
use crate::wal::Wal;

pub type SharedUnitState = Arc<RwLock<UnitState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: calendar store + WAL + collaborators. All mutation
/// paths acquire the target unit's write lock and hold it across the
/// overlap re-check, the WAL append and the in-memory apply — concurrent
/// conflicting requests resolve to exactly one winner.
pub struct Engine {
    pub(super) store: CalendarStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) ledger: Arc<Ledger>,
    pub(super) identity: Arc<dyn IdentityProvider>,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        ledger: Arc<Ledger>,
        identity: Arc<dyn IdentityProvider>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: CalendarStore::new(),
            wal_tx,
            ledger,
            identity,
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this runs inside an async context.
        for event in &events {
            match event {
                Event::UnitCreated {
                    id,
                    name,
                    nightly_rate,
                    owner_id,
                    smart_lock_id,
                } => {
                    let unit = UnitState::new(
                        *id,
                        name.clone(),
                        *nightly_rate,
                        *owner_id,
                        smart_lock_id.clone(),
                    );
                    engine.store.insert_unit(*id, Arc::new(RwLock::new(unit)));
                }
                Event::UnitDeleted { id } => {
                    if let Some(entry) = engine.store.unit(id) {
                        let unit = entry.try_read().expect("replay: uncontended read");
                        for r in &unit.reservations {
                            engine.store.unmap_reservation(&r.id);
                        }
                    }
                    engine.store.remove_unit(id);
                }
                other => {
                    if let Some(unit_id) = event_unit_id(other)
                        && let Some(unit) = engine.store.unit(&unit_id)
                    {
                        let mut guard = unit.try_write().expect("replay: uncontended write");
                        engine.store.apply_event(&mut guard, other);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_unit(&self, id: &Ulid) -> Option<SharedUnitState> {
        self.store.unit(id)
    }

    pub fn unit_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.store.unit_for_reservation(reservation_id)
    }

    /// WAL-append + apply in one call. The WAL append happens first: on
    /// failure no in-memory state changes, keeping mutations atomic.
    pub(super) async fn persist_and_apply(
        &self,
        unit: &mut UnitState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(unit, event);
        Ok(())
    }

    /// Lookup reservation → unit, get unit, acquire write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<UnitState>), EngineError> {
        let unit_id = self
            .unit_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let unit = self
            .get_unit(&unit_id)
            .ok_or(EngineError::NotFound(unit_id))?;
        let guard = unit.write_owned().await;
        Ok((unit_id, guard))
    }

    /// Queue a reservation snapshot for the external ledger mirror.
    /// Fire-and-forget: failures are logged by the pipeline, never here.
    pub(super) fn mirror(&self, unit: &UnitState, reservation_id: &Ulid) {
        let Some(r) = unit.reservation(reservation_id) else {
            return;
        };
        self.ledger.record(LedgerEntry {
            reservation_id: r.id.to_string(),
            unit_id: unit.id.to_string(),
            unit_name: unit.name.clone(),
            guest_id: r.guest_id.to_string(),
            check_in: rfc3339(r.span.start),
            check_out: rfc3339(r.span.end),
            total_price: r.total_price.to_string(),
            status: r.status.as_str().to_string(),
            recorded_at: rfc3339(conflict::now_ms()),
        });
    }
}

/// Extract the unit id from an event (for non-unit-create/delete events).
fn event_unit_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ReservationCreated { unit_id, .. }
        | Event::ReservationCancelled { unit_id, .. }
        | Event::ReservationDeleted { unit_id, .. }
        | Event::PaymentRecorded { unit_id, .. }
        | Event::AccessCodeIssued { unit_id, .. } => Some(*unit_id),
        Event::UnitUpdated { id, .. } => Some(*id),
        Event::UnitCreated { .. } | Event::UnitDeleted { .. } => None,
    }
}
