//! Sweep parsing, density-based burst detection and matrix relay for
//! 2.4 GHz channel scanning.
//!
//! A scan pulls text sweeps from a [`sweep::SweepSource`], folds them into a
//! frequency/power matrix, trims it to the channel's band and noise floor,
//! clusters what is left and counts positive sweeps per time window. Raw
//! matrices and window notices can be pushed to a remote receiver over the
//! framed TCP protocol in [`protocol`].

pub mod math;
pub mod prelude;
pub mod processing;
pub mod protocol;
pub mod sweep;
pub mod telemetry;

pub use prelude::{ScanError, ScanResult, SignalAnalyzer};
pub use processing::{ClusterAnalyzer, ScanConfig, ScanOutcome, Scanner};
pub use sweep::{Channel, FrequencyPowerMatrix};
