use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const METADATA_FIELDS: usize = 6;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const BIN_COUNT_TOLERANCE: f64 = 1e-6;

/// Reasons a raw sweep line is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected at least {METADATA_FIELDS} metadata fields, got {got}")]
    FieldCount { got: usize },
    #[error("timestamp {0:?} does not parse")]
    InvalidTimestamp(String),
    #[error("field {field} is not a finite number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("bin width must be positive, got {0}")]
    InvalidBinWidth(f64),
    #[error("hz_high {high} is below hz_low {low}")]
    InvertedRange { low: f64, high: f64 },
    #[error("frequency span is not a whole number of bins ({0})")]
    FractionalBinCount(f64),
    #[error("expected {expected} power values, got {got}")]
    PowerCount { expected: usize, got: usize },
}

/// One power reading at the center of a bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub frequency_hz: f64,
    pub power_db: f64,
    pub timestamp: NaiveDateTime,
}

/// A single line of sweep-tool output.
///
/// `sample_count` is the FFT sample count reported by the tool. The number of
/// power values is governed by the frequency span, not by that field.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepLine {
    pub timestamp: NaiveDateTime,
    pub hz_low: f64,
    pub hz_high: f64,
    pub bin_width: f64,
    pub sample_count: u64,
    pub powers: Vec<f64>,
}

impl SweepLine {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < METADATA_FIELDS {
            return Err(ParseError::FieldCount { got: fields.len() });
        }

        let stamp = format!("{} {}", fields[0], fields[1]);
        if !has_fraction(fields[1]) {
            return Err(ParseError::InvalidTimestamp(stamp));
        }
        let timestamp = NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT)
            .map_err(|_| ParseError::InvalidTimestamp(stamp.clone()))?;

        let hz_low = parse_number("hz_low", fields[2])?;
        let hz_high = parse_number("hz_high", fields[3])?;
        let bin_width = parse_number("bin_width", fields[4])?;
        let sample_count = fields[5]
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidNumber {
                field: "sample_count",
                value: fields[5].to_string(),
            })?;

        if bin_width <= 0.0 {
            return Err(ParseError::InvalidBinWidth(bin_width));
        }
        if hz_high < hz_low {
            return Err(ParseError::InvertedRange {
                low: hz_low,
                high: hz_high,
            });
        }

        let ratio = (hz_high - hz_low) / bin_width;
        let bins = ratio.round();
        if (ratio - bins).abs() > BIN_COUNT_TOLERANCE {
            return Err(ParseError::FractionalBinCount(ratio));
        }
        let bins = bins as usize;

        let values = &fields[METADATA_FIELDS..];
        if values.len() != bins {
            return Err(ParseError::PowerCount {
                expected: bins,
                got: values.len(),
            });
        }
        let powers = values
            .iter()
            .map(|value| parse_number("power", value))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            timestamp,
            hz_low,
            hz_high,
            bin_width,
            sample_count,
            powers,
        })
    }

    pub fn bin_count(&self) -> usize {
        self.powers.len()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        self.hz_low + (bin as f64 + 0.5) * self.bin_width
    }

    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.powers
            .iter()
            .enumerate()
            .map(move |(bin, &power_db)| Sample {
                frequency_hz: self.bin_center(bin),
                power_db,
                timestamp: self.timestamp,
            })
    }
}

impl FromStr for SweepLine {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// `%.f` alone also accepts whole seconds; the sweep tool always prints a fraction.
fn has_fraction(time: &str) -> bool {
    time.rsplit_once('.').map_or(false, |(_, fraction)| {
        !fraction.is_empty() && fraction.bytes().all(|b| b.is_ascii_digit())
    })
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ParseError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}
