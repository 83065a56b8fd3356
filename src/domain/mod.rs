//! Domain layer: resource categories, status vocabulary, the interval table,
//! and the session/verification records the application layer drives.
//!
//! Nothing in here performs I/O or touches the runtime.

pub mod category;
pub mod policy;
pub mod ports;
pub mod session;
pub mod status;
pub mod verification;
