//! Core data model types: message metadata and timestamps.

pub mod filetime;
pub mod message;
