//! Domain services for Orbit.
//!
//! Models in `db` own single-table persistence. The modules here own rules
//! that span tables, emit webhook events and run background loops.

pub mod config;
pub mod pipelines;
pub mod recurrence;
pub mod recurring_tasks;
pub mod tasks;
pub mod webhooks;
pub mod wiki;
pub mod wiki_cleanup;
