//! Adaptive status polling and payment verification for asynchronously
//! processed bookings.
//!
//! - [`application::coordinator::PollingCoordinator`] polls a backend record
//!   until it reaches a terminal status, spacing requests by category and by
//!   the last status seen.
//! - [`application::verification::VerificationController`] confirms a payment
//!   reference with a fixed retry budget and reports success, failure, or
//!   timeout exactly once.
//!
//! Backends plug in through the ports in [`domain::ports`].

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
