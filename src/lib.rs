//! `dbxtract`: extract and recover messages from Outlook Express DBX
//! containers.
//!
//! The library decodes a container's index and storage blocks, can scan
//! damaged or deleted data for message chains, and writes messages out as
//! individual `.eml` files.

pub mod config;
pub mod container;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;
pub mod progress;
pub mod recovery;
pub mod stats;
