//! Headless dash monitor: connects to the bridge and logs the derived views.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use racedash::audio::{CuePlayer, TracingSink};
use racedash::metrics::{BarMode, FuelEngine, PositionBarEngine, ProgressEngine, SpottingEngine};
use racedash::tracker::GraphsEngine;
use racedash::{DashClient, DashConfig, DashContext, Racedash};

#[derive(Parser)]
#[command(name = "racedash")]
#[command(about = "Monitor the RaceRoom shared memory bridge")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bridge address as host:port, overrides the configuration
    #[arg(long)]
    ws: Option<String>,

    /// Telemetry field to graph as a dotted path, may be repeated
    #[arg(long = "graph")]
    graphs: Vec<String>,

    /// Seconds between summaries
    #[arg(short, long, default_value_t = 1)]
    interval: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("racedash=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DashConfig::load(path)?,
        None => DashConfig::default().with_env_overrides(),
    };
    if let Some(ws) = args.ws {
        config.address = ws;
    }

    let storage = Racedash::storage(&config)?;
    let context = DashContext::new(Arc::clone(&storage), config.expected_version);
    let client = DashClient::spawn(&config, context);

    let (_, relative) = client.register_engine(PositionBarEngine::new(BarMode::Relative));
    let (_, progress) = client.register_engine(ProgressEngine::new());
    let cues = CuePlayer::new(Arc::new(TracingSink));
    let (_, spotting) = client.register_engine(SpottingEngine::with_player(config.spotting, cues));
    let (_, fuel) = client.register_engine(FuelEngine::new());

    let (graphs_engine, graph_control) = GraphsEngine::with_storage(config.graph_capacity, storage);
    if !args.graphs.is_empty() && !graph_control.select(args.graphs) {
        warn!("Graph selection was not applied");
    }
    let (_, graphs) = client.register_engine(graphs_engine);

    let mut summary = tokio::time::interval(Duration::from_secs(args.interval.max(1)));
    loop {
        summary.tick().await;

        let Some(snapshot) = client.current() else {
            info!("Waiting for {} ({})", config.url(), client.ready_state());
            continue;
        };

        info!(
            "{} / {}: P{} lap {} ({} cars)",
            snapshot.track_name,
            snapshot.layout_name,
            snapshot.position,
            snapshot.completed_laps + 1,
            snapshot.driver_data.len()
        );

        for driver in relative.borrow().drivers.iter() {
            info!(
                "  {:>3} {:<24} {:>10}{}",
                driver.rank,
                driver.display_name,
                driver.gap_text.as_deref().unwrap_or(""),
                if driver.is_user { "  <" } else { "" }
            );
        }

        let delta = progress.borrow();
        if delta.visible {
            info!(
                "Delta {} ({:?}), estimate {}",
                delta.delta_text.as_deref().unwrap_or("-"),
                delta.trend,
                delta.estimated_lap_time_text.as_deref().unwrap_or("-")
            );
        }

        let radar = spotting.borrow();
        if radar.left.is_some() || radar.right.is_some() {
            info!(
                "Car alongside: left {}, right {}",
                radar.left.as_ref().map_or("-", |w| w.display_name.as_str()),
                radar.right.as_ref().map_or("-", |w| w.display_name.as_str())
            );
        }

        let tank = fuel.borrow();
        if let (true, Some(laps)) = (tank.visible, tank.laps_remaining) {
            info!("Fuel for {:.1} laps{}", laps, if tank.low { " (low)" } else { "" });
        }

        for series in graphs.borrow().series.iter() {
            info!(
                "  {}: {:?} (min {:.3}, max {:.3}, avg {:.3})",
                series.short_name, series.latest, series.min, series.max, series.avg
            );
        }
    }
}
