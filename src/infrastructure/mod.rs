//! Adapters for the domain ports: scripted in-memory backends and a
//! channel-backed observer.

pub mod channel;
pub mod in_memory;
