use crate::math::stats::StatsHelper;
use crate::sweep::channel::Channel;
use crate::sweep::matrix::FrequencyPowerMatrix;
use crate::telemetry::log::LogManager;

/// Keeps the rows strictly inside a channel that rise above its noise floor.
pub struct BandFilter {
    channel: Channel,
    logger: LogManager,
}

impl BandFilter {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            logger: LogManager::new("band-filter"),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// The noise floor is the mean power of the band-restricted rows,
    /// taken once before any power filtering.
    pub fn apply(&self, matrix: &FrequencyPowerMatrix) -> FrequencyPowerMatrix {
        let low = self.channel.low_hz();
        let high = self.channel.high_hz();
        let in_band = matrix.retain(|freq, _| low < freq && freq < high);

        let Some(noise_floor) = StatsHelper::mean(&in_band.powers()) else {
            self.logger
                .debug(&format!("no bins inside {}", self.channel));
            return in_band;
        };

        let kept = in_band.retain(|_, power| power > noise_floor);
        self.logger.debug(&format!(
            "{}: kept {} of {} in-band bins above {:.2} dB",
            self.channel,
            kept.len(),
            in_band.len(),
            noise_floor
        ));
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::fixtures::channel_eleven_pass;
    use crate::sweep::matrix::MatrixBuilder;

    fn channel_eleven() -> BandFilter {
        BandFilter::new(Channel::from_index(11).unwrap())
    }

    #[test]
    fn boundary_frequencies_are_excluded() {
        let matrix = FrequencyPowerMatrix::from_rows(vec![
            [2_451_000_000.0, -10.0],
            [2_460_000_000.0, -50.0],
            [2_473_000_000.0, -10.0],
            [2_465_000_000.0, -90.0],
        ]);
        let filtered = channel_eleven().apply(&matrix);
        assert_eq!(filtered.rows(), &[[2_460_000_000.0, -50.0]]);
    }

    #[test]
    fn noise_floor_uses_band_rows_before_power_cut() {
        // averaging every row would give -30 and drop the only strong bin
        let matrix = FrequencyPowerMatrix::from_rows(vec![
            [2_400_000_000.0, 0.0],
            [2_500_000_000.0, 0.0],
            [2_455_000_000.0, -60.0],
            [2_456_000_000.0, -60.0],
            [2_457_000_000.0, -30.0],
        ]);
        let filtered = channel_eleven().apply(&matrix);
        assert_eq!(filtered.rows(), &[[2_457_000_000.0, -30.0]]);
    }

    #[test]
    fn filtered_rows_satisfy_band_and_floor() {
        let mut builder = MatrixBuilder::new();
        builder.ingest_pass(&channel_eleven_pass(true));
        let matrix = builder.finish();
        let filter = channel_eleven();
        let channel = *filter.channel();

        let band: Vec<f64> = matrix
            .rows()
            .iter()
            .filter(|row| channel.low_hz() < row[0] && row[0] < channel.high_hz())
            .map(|row| row[1])
            .collect();
        let floor = StatsHelper::mean(&band).unwrap();

        let filtered = filter.apply(&matrix);
        assert_eq!(filtered.len(), 41 + 21);
        for row in filtered.rows() {
            assert!(row[0] > channel.low_hz() && row[0] < channel.high_hz());
            assert!(row[1] > floor);
        }
    }

    #[test]
    fn empty_band_yields_empty_matrix() {
        let matrix = FrequencyPowerMatrix::from_rows(vec![[100.0, -10.0]]);
        assert!(channel_eleven().apply(&matrix).is_empty());
    }
}
