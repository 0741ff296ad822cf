use crate::prelude::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(low_mhz, high_mhz)` for channels 1 through 14.
const CHANNEL_TABLE: [(u32, u32); 14] = [
    (2401, 2423),
    (2406, 2428),
    (2411, 2433),
    (2416, 2438),
    (2421, 2443),
    (2426, 2448),
    (2431, 2453),
    (2436, 2458),
    (2441, 2463),
    (2446, 2468),
    (2451, 2473),
    (2456, 2478),
    (2461, 2483),
    (2473, 2495),
];

/// One of the fixed sub-bands a scan can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub index: u8,
    pub low_mhz: u32,
    pub high_mhz: u32,
}

impl Channel {
    pub fn from_index(index: u8) -> Result<Self, ScanError> {
        let slot = usize::from(index)
            .checked_sub(1)
            .and_then(|slot| CHANNEL_TABLE.get(slot))
            .ok_or(ScanError::InvalidChannel(index))?;
        Ok(Self {
            index,
            low_mhz: slot.0,
            high_mhz: slot.1,
        })
    }

    pub fn all() -> impl Iterator<Item = Channel> {
        CHANNEL_TABLE
            .iter()
            .zip(1u8..)
            .map(|(&(low_mhz, high_mhz), index)| Channel {
                index,
                low_mhz,
                high_mhz,
            })
    }

    pub fn low_hz(&self) -> f64 {
        f64::from(self.low_mhz) * 1e6
    }

    pub fn high_hz(&self) -> f64 {
        f64::from(self.high_mhz) * 1e6
    }

    /// Range argument in the `low:high` MHz form the sweep tool expects.
    pub fn range_arg(&self) -> String {
        format!("{}:{}", self.low_mhz, self.high_mhz)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel {} ({}-{} MHz)",
            self.index, self.low_mhz, self.high_mhz
        )
    }
}
