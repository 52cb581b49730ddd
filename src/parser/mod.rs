//! Decoding of raw message text.

pub mod header;
