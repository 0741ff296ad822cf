pub mod channel;
pub mod line;
pub mod matrix;
pub mod source;

#[cfg(test)]
pub(crate) mod fixtures;

pub use channel::Channel;
pub use line::{ParseError, Sample, SweepLine};
pub use matrix::{FrequencyPowerMatrix, MatrixBuilder};
pub use source::{HackrfConfig, HackrfSweep, ReplaySource, SourceError, SweepSource};
