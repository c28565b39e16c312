//! Database models for Orbit.
//!
//! One module per table family. Every query is scoped by primary key; tenant
//! checks happen in the callers.

pub mod comment;
pub mod milestone;
pub mod pipeline;
pub mod project;
pub mod task;
pub mod user;
pub mod webhook;
pub mod webhook_delivery;
pub mod wiki;
pub mod wiki_revision;
pub mod workspace;
