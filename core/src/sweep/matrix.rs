use crate::sweep::line::{Sample, SweepLine};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Frequency/power rows from one sweep pass, unique by frequency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyPowerMatrix {
    rows: Vec<[f64; 2]>,
}

impl FrequencyPowerMatrix {
    /// Wraps rows as-is; callers are responsible for frequency uniqueness.
    pub fn from_rows(rows: Vec<[f64; 2]>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[[f64; 2]] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row[0]).collect()
    }

    pub fn powers(&self) -> Vec<f64> {
        self.rows.iter().map(|row| row[1]).collect()
    }

    /// N×2 view with frequency in column 0 and power in column 1.
    pub fn to_array(&self) -> Array2<f64> {
        let mut array = Array2::zeros((self.rows.len(), 2));
        for (mut out, row) in array.rows_mut().into_iter().zip(&self.rows) {
            out[0] = row[0];
            out[1] = row[1];
        }
        array
    }

    pub fn retain<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(f64, f64) -> bool,
    {
        Self {
            rows: self
                .rows
                .iter()
                .copied()
                .filter(|row| keep(row[0], row[1]))
                .collect(),
        }
    }
}

/// Folds one sweep pass into a [`FrequencyPowerMatrix`].
///
/// A repeated frequency overwrites the earlier power but keeps the position
/// where the frequency was first seen. Corrupt lines are skipped and counted.
#[derive(Debug, Default)]
pub struct MatrixBuilder {
    rows: Vec<[f64; 2]>,
    index: HashMap<u64, usize>,
    lines: usize,
    skipped: usize,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and folds a line. Returns `false` when the line was skipped.
    pub fn ingest_line(&mut self, raw: &str) -> bool {
        if raw.trim().is_empty() {
            return true;
        }
        self.lines += 1;
        match SweepLine::parse(raw) {
            Ok(line) => {
                for sample in line.samples() {
                    self.insert(sample);
                }
                true
            }
            Err(err) => {
                self.skipped += 1;
                debug!("skipping sweep line {}: {}", self.lines, err);
                false
            }
        }
    }

    /// Feeds every line of a complete pass of sweep-tool output.
    pub fn ingest_pass(&mut self, output: &str) -> &mut Self {
        for raw in output.lines() {
            self.ingest_line(raw);
        }
        self
    }

    pub fn insert(&mut self, sample: Sample) {
        // -0.0 and 0.0 must land on the same key
        let key = (sample.frequency_hz + 0.0).to_bits();
        let row = [sample.frequency_hz, sample.power_db];
        match self.index.get(&key) {
            Some(&position) => self.rows[position] = row,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    pub fn finish(self) -> FrequencyPowerMatrix {
        FrequencyPowerMatrix { rows: self.rows }
    }
}
