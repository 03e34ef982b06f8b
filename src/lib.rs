//! stayd — a durable apartment-booking engine speaking the Postgres wire
//! protocol. Reservations, payments and access codes live in an in-memory
//! per-unit calendar rebuilt from an append-only WAL; booking events are
//! mirrored to an external ledger off the commit path.

pub mod auth;
pub mod engine;
pub mod identity;
pub mod ledger;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
