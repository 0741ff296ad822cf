use crate::math::stats::StatsHelper;
use crate::prelude::SignalAnalyzer;
use crate::processing::hdbscan::{density_labels, DensityParams, NOISE};
use crate::processing::mixture::{mixture_labels, MixtureParams};
use crate::sweep::matrix::FrequencyPowerMatrix;
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the power cut for "high-power" clusters is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThresholdStrategy {
    /// Absolute cut used by live scanning.
    Fixed { db: f64 },
    /// Percentile of this sweep's centroid powers, used for inspection.
    Percentile { percentile: f64 },
}

impl ThresholdStrategy {
    pub fn resolve(&self, centroid_powers: &[f64]) -> Option<f64> {
        match *self {
            ThresholdStrategy::Fixed { db } => Some(db),
            ThresholdStrategy::Percentile { percentile } => {
                StatsHelper::percentile(centroid_powers, percentile)
            }
        }
    }
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        ThresholdStrategy::Fixed { db: -63.0 }
    }
}

/// Spectral shape of the target emitter: wide and loud.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureCriteria {
    pub min_span_hz: f64,
    pub min_mid_power_db: f64,
}

impl Default for SignatureCriteria {
    fn default() -> Self {
        Self {
            min_span_hz: 3e6,
            min_mid_power_db: -63.0,
        }
    }
}

impl SignatureCriteria {
    /// Both comparisons are strict.
    pub fn matches(&self, cluster: &Cluster) -> bool {
        cluster.span_hz() > self.min_span_hz && cluster.mid_power_db() > self.min_mid_power_db
    }
}

/// Which clustering method groups the filtered bins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerBackend {
    #[default]
    Density,
    GaussianMixture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub backend: AnalyzerBackend,
    pub min_cluster_size: usize,
    /// Neighbourhood used for core distances; defaults to `min_cluster_size`.
    pub min_samples: Option<usize>,
    pub allow_single_cluster: bool,
    pub threshold: ThresholdStrategy,
    pub signature: SignatureCriteria,
    /// Only read by the `gaussian_mixture` backend.
    pub mixture: MixtureParams,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            backend: AnalyzerBackend::default(),
            min_cluster_size: 18,
            min_samples: None,
            allow_single_cluster: true,
            threshold: ThresholdStrategy::default(),
            signature: SignatureCriteria::default(),
            mixture: MixtureParams::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn density_params(&self) -> DensityParams {
        DensityParams {
            min_cluster_size: self.min_cluster_size,
            min_samples: self.min_samples.unwrap_or(self.min_cluster_size),
            allow_single_cluster: self.allow_single_cluster,
        }
    }

    /// The analyzer named by `backend`.
    pub fn build(&self) -> Box<dyn SignalAnalyzer + Send> {
        match self.backend {
            AnalyzerBackend::Density => Box::new(ClusterAnalyzer::new(self.clone())),
            AnalyzerBackend::GaussianMixture => Box::new(MixtureAnalyzer::new(self.clone())),
        }
    }
}

/// Points sharing a non-noise label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub label: i32,
    pub members: Vec<[f64; 2]>,
    pub centroid: [f64; 2],
}

impl Cluster {
    pub fn new(label: i32, members: Vec<[f64; 2]>) -> Self {
        let count = members.len().max(1) as f64;
        let (freq_sum, power_sum) = members
            .iter()
            .fold((0.0, 0.0), |(f, p), row| (f + row[0], p + row[1]));
        Self {
            label,
            centroid: [freq_sum / count, power_sum / count],
            members,
        }
    }

    pub fn span_hz(&self) -> f64 {
        let (low, high) = extent(self.members.iter().map(|row| row[0]));
        high - low
    }

    /// Midpoint between the weakest and strongest member.
    pub fn mid_power_db(&self) -> f64 {
        let (low, high) = extent(self.members.iter().map(|row| row[1]));
        (high + low) / 2.0
    }
}

fn extent(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), v| {
        (low.min(v), high.max(v))
    })
}

/// Everything one analysis pass found, for display and for the verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub clusters: Vec<Cluster>,
    pub noise_points: usize,
    pub threshold_db: Option<f64>,
    /// Labels whose centroid power cleared the threshold.
    pub high_power: Vec<i32>,
    /// High-power labels that also match the target signature.
    pub positives: Vec<i32>,
}

impl ClusterReport {
    pub fn detected(&self) -> bool {
        !self.positives.is_empty()
    }

    pub fn positive_count(&self) -> usize {
        self.positives.len()
    }

    pub fn cluster(&self, label: i32) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.label == label)
    }

    /// Applies the power cut and then the signature to clustered bins.
    pub fn classify(clusters: Vec<Cluster>, noise_points: usize, config: &AnalyzerConfig) -> Self {
        if clusters.is_empty() {
            return Self {
                noise_points,
                ..Default::default()
            };
        }

        let centroid_powers: Vec<f64> = clusters.iter().map(|c| c.centroid[1]).collect();
        let threshold_db = config.threshold.resolve(&centroid_powers);
        let high_power: Vec<i32> = clusters
            .iter()
            .filter(|c| threshold_db.map_or(false, |t| c.centroid[1] > t))
            .map(|c| c.label)
            .collect();
        let positives: Vec<i32> = clusters
            .iter()
            .filter(|c| high_power.contains(&c.label) && config.signature.matches(c))
            .map(|c| c.label)
            .collect();

        Self {
            clusters,
            noise_points,
            threshold_db,
            high_power,
            positives,
        }
    }
}

/// Groups rows by label; [`NOISE`] rows are only counted.
fn group_labels(labels: &[i32], matrix: &FrequencyPowerMatrix) -> (Vec<Cluster>, usize) {
    let mut groups: BTreeMap<i32, Vec<[f64; 2]>> = BTreeMap::new();
    let mut noise = 0;
    for (&label, row) in labels.iter().zip(matrix.rows()) {
        if label == NOISE {
            noise += 1;
        } else {
            groups.entry(label).or_default().push(*row);
        }
    }
    let clusters = groups
        .into_iter()
        .map(|(label, members)| Cluster::new(label, members))
        .collect();
    (clusters, noise)
}

fn log_report(logger: &LogManager, report: &ClusterReport) {
    logger.debug(&format!(
        "{} clusters, {} noise, {} high-power, {} positive",
        report.clusters.len(),
        report.noise_points,
        report.high_power.len(),
        report.positive_count()
    ));
}

/// Density-clustering detector.
pub struct ClusterAnalyzer {
    config: AnalyzerConfig,
    logger: LogManager,
}

impl ClusterAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            logger: LogManager::new("analyzer"),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

impl Default for ClusterAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

impl SignalAnalyzer for ClusterAnalyzer {
    fn name(&self) -> &'static str {
        "density"
    }

    fn report(&self, matrix: &FrequencyPowerMatrix) -> ClusterReport {
        if matrix.is_empty() {
            self.logger.debug("empty matrix, nothing to cluster");
            return ClusterReport::default();
        }

        let labels = density_labels(matrix.to_array().view(), &self.config.density_params());
        let (clusters, noise_points) = group_labels(&labels, matrix);
        let report = ClusterReport::classify(clusters, noise_points, &self.config);
        log_report(&self.logger, &report);
        report
    }
}

/// Gaussian-mixture detector; every bin belongs to some component.
pub struct MixtureAnalyzer {
    config: AnalyzerConfig,
    logger: LogManager,
}

impl MixtureAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            logger: LogManager::new("mixture-analyzer"),
        }
    }
}

impl SignalAnalyzer for MixtureAnalyzer {
    fn name(&self) -> &'static str {
        "gaussian_mixture"
    }

    fn report(&self, matrix: &FrequencyPowerMatrix) -> ClusterReport {
        if matrix.is_empty() {
            self.logger.debug("empty matrix, nothing to fit");
            return ClusterReport::default();
        }

        let labels = mixture_labels(matrix.to_array().view(), &self.config.mixture);
        let (clusters, noise_points) = group_labels(&labels, matrix);
        let report = ClusterReport::classify(clusters, noise_points, &self.config);
        log_report(&self.logger, &report);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::band_filter::BandFilter;
    use crate::sweep::channel::Channel;
    use crate::sweep::fixtures::channel_eleven_pass;
    use crate::sweep::matrix::MatrixBuilder;

    const BASE_HZ: f64 = 2_455_000_000.0;

    fn pair(span_hz: f64, low_db: f64, high_db: f64) -> Cluster {
        Cluster::new(0, vec![[BASE_HZ, low_db], [BASE_HZ + span_hz, high_db]])
    }

    fn filtered_pass(burst: bool) -> FrequencyPowerMatrix {
        let mut builder = MatrixBuilder::new();
        builder.ingest_pass(&channel_eleven_pass(burst));
        BandFilter::new(Channel::from_index(11).unwrap()).apply(&builder.finish())
    }

    #[test]
    fn signature_span_comparison_is_strict() {
        let criteria = SignatureCriteria::default();
        assert!(!criteria.matches(&pair(3_000_000.0, -62.9, -62.9)));
        assert!(criteria.matches(&pair(3_000_001.0, -62.9, -62.9)));
    }

    #[test]
    fn signature_power_comparison_is_strict() {
        let criteria = SignatureCriteria::default();
        assert!(!criteria.matches(&pair(4_000_000.0, -64.0, -62.0)));
        assert!(criteria.matches(&pair(4_000_000.0, -63.9, -62.0)));
    }

    #[test]
    fn single_member_cluster_never_matches() {
        let lone = Cluster::new(3, vec![[BASE_HZ, -20.0]]);
        assert_eq!(lone.span_hz(), 0.0);
        assert!(!SignatureCriteria::default().matches(&lone));
    }

    #[test]
    fn centroid_is_member_mean() {
        let cluster = Cluster::new(1, vec![[10.0, -60.0], [20.0, -70.0], [30.0, -80.0]]);
        assert_eq!(cluster.centroid, [20.0, -70.0]);
        assert_eq!(cluster.span_hz(), 20.0);
        assert_eq!(cluster.mid_power_db(), -70.0);
    }

    #[test]
    fn threshold_strategies_resolve() {
        let powers = [-70.0, -61.0];
        assert_eq!(
            ThresholdStrategy::Fixed { db: -60.0 }.resolve(&powers),
            Some(-60.0)
        );
        assert_eq!(
            ThresholdStrategy::Percentile { percentile: 75.0 }.resolve(&powers),
            Some(-63.25)
        );
        assert_eq!(
            ThresholdStrategy::Percentile { percentile: 75.0 }.resolve(&[]),
            None
        );
    }

    #[test]
    fn empty_matrix_is_no_detection() {
        let analyzer = ClusterAnalyzer::default();
        let report = analyzer.report(&FrequencyPowerMatrix::default());
        assert!(!report.detected());
        assert!(report.clusters.is_empty());
    }

    #[test]
    fn wide_burst_is_detected_and_narrow_carrier_is_not() {
        let analyzer = ClusterAnalyzer::default();
        let report = analyzer.report(&filtered_pass(true));
        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.noise_points, 0);
        assert_eq!(report.positive_count(), 1);

        let burst = report.cluster(report.positives[0]).unwrap();
        assert_eq!(burst.members.len(), 41);
        assert_eq!(burst.span_hz(), 4_000_000.0);
        assert_eq!(burst.mid_power_db(), -61.0);
        assert!(analyzer.analyze(&filtered_pass(true)));
    }

    #[test]
    fn floor_and_carrier_alone_are_not_detected() {
        let analyzer = ClusterAnalyzer::default();
        assert!(!analyzer.analyze(&filtered_pass(false)));
    }

    #[test]
    fn percentile_mode_selects_only_the_loudest_quarter() {
        let analyzer = ClusterAnalyzer::new(AnalyzerConfig {
            threshold: ThresholdStrategy::Percentile { percentile: 75.0 },
            ..Default::default()
        });
        let report = analyzer.report(&filtered_pass(true));
        assert_eq!(report.high_power.len(), 1);
        assert!(report.detected());
        assert!(!analyzer.analyze(&filtered_pass(false)));
    }

    #[test]
    fn mixture_backend_finds_the_burst() {
        let analyzer = MixtureAnalyzer::new(AnalyzerConfig::default());
        let report = analyzer.report(&filtered_pass(true));
        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.noise_points, 0);
        assert_eq!(report.positive_count(), 1);
        let burst = report.cluster(report.positives[0]).unwrap();
        assert_eq!(burst.members.len(), 41);

        assert!(!analyzer.analyze(&filtered_pass(false)));
        assert!(!analyzer.analyze(&FrequencyPowerMatrix::default()));
    }

    #[test]
    fn backend_is_chosen_from_config() {
        assert_eq!(AnalyzerConfig::default().build().name(), "density");

        let config: AnalyzerConfig =
            serde_json::from_str(r#"{"backend":"gaussian_mixture","mixture":{"components":3}}"#)
                .unwrap();
        assert_eq!(config.backend, AnalyzerBackend::GaussianMixture);
        assert_eq!(config.mixture.components, 3);
        assert_eq!(config.mixture.max_iter, 100);
        assert_eq!(config.min_cluster_size, 18);

        let analyzer = config.build();
        assert_eq!(analyzer.name(), "gaussian_mixture");
        assert!(analyzer.analyze(&filtered_pass(true)));

        assert!(serde_json::from_str::<AnalyzerConfig>(r#"{"backend":"isolation_forest"}"#).is_err());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AnalyzerConfig {
            threshold: ThresholdStrategy::Percentile { percentile: 75.0 },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"mode\":\"percentile\""));
        let back: AnalyzerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
