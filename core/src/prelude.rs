use crate::processing::aggregator::WindowSnapshot;
use crate::processing::analyzer::ClusterReport;
use crate::protocol::ProtocolError;
use crate::sweep::matrix::FrequencyPowerMatrix;
use crate::sweep::source::SourceError;

/// Errors that end a scan attempt.
///
/// Parse failures and dropped relay messages never show up here; they are
/// recovered inside the loop and only counted.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("invalid channel {0} (expected 1-14)")]
    InvalidChannel(u8),
    #[error("sweep source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    #[error("relay failed: {0}")]
    Distribution(#[from] ProtocolError),
    #[error("scan cancelled with {} positive sweeps in the open window", .0.positive_count)]
    Cancelled(WindowSnapshot),
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Capability shared by every detection backend.
///
/// `analyze` is the live decision for a single filtered sweep; `report`
/// is the presentation variant that also hands back what was found.
pub trait SignalAnalyzer {
    fn name(&self) -> &'static str;
    fn report(&self, matrix: &FrequencyPowerMatrix) -> ClusterReport;

    fn analyze(&self, matrix: &FrequencyPowerMatrix) -> bool {
        self.report(matrix).detected()
    }
}

impl<A: SignalAnalyzer + ?Sized> SignalAnalyzer for Box<A> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn report(&self, matrix: &FrequencyPowerMatrix) -> ClusterReport {
        (**self).report(matrix)
    }

    fn analyze(&self, matrix: &FrequencyPowerMatrix) -> bool {
        (**self).analyze(matrix)
    }
}
