//! Writing messages out: filenames, the output directory and the two
//! extraction drivers.

pub mod disk;
pub mod extract;
pub mod naming;
pub mod recover;
