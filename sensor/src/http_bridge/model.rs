use serde::{Deserialize, Serialize};
use sweepcore::protocol::ReceiverState;

/// Receiver counters served on `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusModel {
    pub frames_received: u64,
    pub notices_received: u64,
    pub rejected: u64,
    pub last_notice: Option<String>,
    pub latest_rows: usize,
}

impl From<&ReceiverState> for StatusModel {
    fn from(state: &ReceiverState) -> Self {
        Self {
            frames_received: state.frames_received,
            notices_received: state.notices_received,
            rejected: state.rejected,
            last_notice: state.last_notice.clone(),
            latest_rows: state.latest.as_ref().map_or(0, |m| m.len()),
        }
    }
}
