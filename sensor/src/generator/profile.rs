use chrono::Local;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sweepcore::sweep::{Channel, SourceError, SweepSource};

/// Configuration for generating synthetic sweep passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub bin_width_hz: u64,
    pub bins_per_line: usize,
    pub floor_db: f64,
    pub floor_jitter_db: f64,
    /// Chance that a pass carries a wide burst.
    pub burst_probability: f64,
    pub burst_width_hz: u64,
    pub burst_power_db: f64,
    pub burst_jitter_db: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            bin_width_hz: 100_000,
            bins_per_line: 20,
            floor_db: -88.0,
            floor_jitter_db: 1.0,
            burst_probability: 0.5,
            burst_width_hz: 4_000_000,
            burst_power_db: -61.0,
            burst_jitter_db: 0.5,
        }
    }
}

impl SyntheticConfig {
    fn bin_width(&self) -> u64 {
        self.bin_width_hz.max(1)
    }

    fn bins_per_line(&self) -> u64 {
        self.bins_per_line.max(1) as u64
    }

    /// `burst_probability` as a valid chance; NaN or infinite reads as never.
    fn burst_chance(&self) -> f64 {
        if self.burst_probability.is_finite() {
            self.burst_probability.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

fn jitter(rng: &mut StdRng, amplitude: f64) -> f64 {
    let amplitude = amplitude.abs();
    rng.gen_range(-amplitude..=amplitude)
}

/// Renders one pass over `channel` in the sweep-tool line format.
fn build_pass(config: &SyntheticConfig, channel: &Channel, rng: &mut StdRng) -> String {
    let bin_width = config.bin_width();
    let low = channel.low_hz() as u64;
    let high = channel.high_hz() as u64;
    let total_bins = (high - low) / bin_width;

    let burst = if rng.gen_bool(config.burst_chance()) {
        let width = (config.burst_width_hz / bin_width).min(total_bins);
        let first = rng.gen_range(0..=total_bins - width);
        Some(first..first + width)
    } else {
        None
    };

    let now = Local::now().naive_local();
    let date = now.format("%Y-%m-%d");
    let time = now.format("%H:%M:%S%.6f");

    let mut out = String::new();
    let mut bin = 0;
    while bin < total_bins {
        let bins = config.bins_per_line().min(total_bins - bin);
        let line_low = low + bin * bin_width;
        let powers: Vec<String> = (bin..bin + bins)
            .map(|global| {
                let power = match &burst {
                    Some(range) if range.contains(&global) => {
                        config.burst_power_db + jitter(rng, config.burst_jitter_db)
                    }
                    _ => config.floor_db + jitter(rng, config.floor_jitter_db),
                };
                format!("{:.2}", power)
            })
            .collect();
        out.push_str(&format!(
            "{}, {}, {}, {}, {:.2}, {}, {}\n",
            date,
            time,
            line_low,
            line_low + bins * bin_width,
            bin_width as f64,
            bins * 4,
            powers.join(", ")
        ));
        bin += bins;
    }
    out
}

/// Seeded stand-in for the radio, useful without hardware attached.
pub struct SyntheticSource {
    config: SyntheticConfig,
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }
}

impl SweepSource for SyntheticSource {
    fn sweep(&mut self, channel: &Channel) -> Result<String, SourceError> {
        Ok(build_pass(&self.config, channel, &mut self.rng))
    }
}
