//! Campbell Scientific datalogger tooling: PakBus link-layer framing and
//! TOB1/TOB2/TOB3 data file reading.

pub use codec;
pub use tob;
pub use util;

pub use util::build;

pub mod input;
pub mod trace;
