//! Ticket and template operations that span several repositories.
//!
//! Handlers, the triage service and the webhook all go through these
//! functions, so every write path shares one set of checks, one transaction
//! boundary and one place that publishes events.

pub mod templates;
pub mod tickets;
