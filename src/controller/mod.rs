//! Controller module.
//!
//! Contains the reconciliation loop and everything it composes:
//!
//! - `checker` / `healer`: the observation and mutation contracts plus
//!   their production implementations over the Kubernetes API and the
//!   Redis protocol
//! - `heal`: the ordered check-and-heal pass
//! - `rolling_update`: slaves-first, master-last pod replacement
//! - `reconciler`: per-resource driver wiring ensure → heal → update
//! - `context` / `error`: shared state and the error taxonomy

pub mod checker;
pub mod context;
pub mod error;
pub mod heal;
pub mod healer;
pub mod reconciler;
pub mod rolling_update;

#[cfg(test)]
pub(crate) mod mock;
