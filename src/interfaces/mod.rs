//! Edges of the crate: file formats used by the `statuswatch` binary.

pub mod csv;
