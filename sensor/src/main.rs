use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use http_bridge::bridge::HttpBridge;
use std::path::PathBuf;
use sweepcore::prelude::SignalAnalyzer;
use sweepcore::processing::{cancellation, Scanner, ThresholdStrategy};
use sweepcore::protocol::{DistributionServer, Distributor, Payload, ServerConfig, SharedMatrix};
use sweepcore::sweep::ReplaySource;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{SensorConfig, SourceKind};
use workflow::runner::Runner;

mod generator;
mod http_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "2.4 GHz sweep sensor node and receiver")]
struct Cli {
    /// Load the sensor config from YAML instead of flags
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a channel repeatedly and print each verdict
    Scan(ScanArgs),
    /// Accept relayed matrices and notices and serve them over HTTP
    Receive {
        #[arg(long, default_value = "0.0.0.0:12345")]
        bind: String,
        #[arg(long, default_value = "127.0.0.1:9000")]
        http: String,
    },
    /// Send one text notice to a receiver
    Notify {
        #[arg(long)]
        receiver: String,
        message: String,
    },
    /// Print the cluster report for the first pass of a recording
    Inspect {
        replay: PathBuf,
        #[arg(long, default_value_t = 11)]
        channel: u8,
        /// Use a percentile of the centroid powers as the high-power cut
        #[arg(long)]
        percentile: Option<f64>,
    },
}

#[derive(Args)]
struct ScanArgs {
    #[arg(long, default_value_t = 11)]
    channel: u8,
    /// Detection window in seconds
    #[arg(long, default_value_t = 5.0)]
    window: f64,
    /// Seconds per scan attempt; defaults to one window
    #[arg(long)]
    budget: Option<f64>,
    #[arg(long, default_value_t = 5)]
    threshold: u32,
    /// Number of scan attempts, 0 for no limit
    #[arg(long, default_value_t = 0)]
    repeat: u32,
    /// hackrf, synthetic or replay:<file>
    #[arg(long, default_value = "hackrf")]
    source: SourceKind,
    /// host:port of a receiver to relay matrices and notices to
    #[arg(long)]
    receiver: Option<String>,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<SensorConfig> {
    match path {
        Some(path) => SensorConfig::load(path),
        None => Ok(SensorConfig::default()),
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = TokioBuilder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;

    match cli.command {
        Command::Scan(args) => {
            let config = match cli.config {
                Some(path) => SensorConfig::load(path)?,
                None => SensorConfig::from_args(
                    args.channel,
                    args.window,
                    args.budget,
                    args.threshold,
                    args.repeat,
                    args.source,
                    args.receiver,
                ),
            };

            let (handle, signal) = cancellation();
            runtime.spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    log::info!("interrupt received, finishing current sweep");
                    handle.cancel();
                }
            });

            let runner = Runner::new(config);
            let summary = runner.run(signal)?;
            println!(
                "{} attempts, {} detections, {} source failures{}",
                summary.attempts,
                summary.detections,
                summary.source_failures,
                if summary.cancelled { " (interrupted)" } else { "" }
            );
            log::debug!(
                "metrics: {}",
                serde_json::to_string(&runner.metrics()).context("encoding metrics")?
            );
        }
        Command::Receive { bind, http } => {
            let config = match cli.config {
                Some(path) => SensorConfig::load(path)?,
                None => SensorConfig {
                    server: ServerConfig {
                        bind,
                        ..Default::default()
                    },
                    http_bind: http,
                    ..Default::default()
                },
            };

            let shared = SharedMatrix::new();
            let server = DistributionServer::from_config(&config.server, shared.clone())
                .with_context(|| format!("binding receiver on {}", config.server.bind))?
                .spawn()
                .context("starting receiver accept loop")?;
            let bridge = HttpBridge::spawn(&config.http_bind, shared.clone())?;
            println!(
                "receiving on {}, HTTP on {} (Ctrl+C to stop)",
                server.local_addr(),
                bridge.bind_address()
            );

            runtime.block_on(async {
                signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
                Ok::<(), anyhow::Error>(())
            })?;

            let state = shared.snapshot();
            println!(
                "received {} frames and {} notices, rejected {}",
                state.frames_received, state.notices_received, state.rejected
            );
            server.shutdown();
        }
        Command::Notify { receiver, message } => {
            let config = load_config(cli.config)?;
            Distributor::one_shot(receiver.clone(), config.connect_timeout())
                .distribute(&Payload::Notice(message))
                .with_context(|| format!("sending notice to {}", receiver))?;
        }
        Command::Inspect {
            replay,
            channel,
            percentile,
        } => {
            let mut config = load_config(cli.config)?;
            config.channel = channel;
            if let Some(percentile) = percentile {
                config.analyzer.threshold = ThresholdStrategy::Percentile { percentile };
            }

            let source = ReplaySource::load(&replay)
                .with_context(|| format!("loading recording {}", replay.display()))?;
            let channel = config.channel()?;
            let mut scanner = Scanner::new(source, config.analyzer.build());
            let sweep = scanner
                .sweep_once(&channel)
                .with_context(|| format!("analyzing first pass of {}", replay.display()))?;

            println!(
                "{}: {} raw bins, {} after band/noise filter, {} skipped lines",
                channel,
                sweep.raw.len(),
                sweep.filtered.len(),
                sweep.skipped_lines
            );
            for cluster in &sweep.report.clusters {
                let tag = if sweep.report.positives.contains(&cluster.label) {
                    "target"
                } else if sweep.report.high_power.contains(&cluster.label) {
                    "high-power"
                } else {
                    "-"
                };
                println!(
                    "  cluster {:>2}: {:>3} points, centroid {:.3} MHz / {:.2} dB, span {:.2} MHz, mid {:.2} dB [{}]",
                    cluster.label,
                    cluster.members.len(),
                    cluster.centroid[0] / 1e6,
                    cluster.centroid[1],
                    cluster.span_hz() / 1e6,
                    cluster.mid_power_db(),
                    tag
                );
            }
            println!(
                "  {} noise points, threshold {:?} -> {}",
                sweep.report.noise_points,
                sweep.report.threshold_db,
                if sweep.report.detected() { "DETECTED" } else { "clear" }
            );
            log::debug!("analyzed with {}", scanner.analyzer().name());
        }
    }

    Ok(())
}
