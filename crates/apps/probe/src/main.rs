//! Drives the map engine against a live backend with a headless runtime and
//! prints what the map would show.

use std::env;
use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use engine::{EngineConfig, MapEngine, pump};
use layers::{CameraState, HeadlessRuntime, MapRuntime, Metric, SourceDescriptor};
use serde_json::json;
use streaming::{HttpDataSource, NaturalFamily};
use tracing::info;
use tracing_subscriber::EnvFilter;

const MAX_ROUNDS: usize = 4;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless probe for the globe map engine")]
struct Args {
    /// JSON engine config; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides ATLAS_API_BASE and the config file)
    #[arg(long)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the choropleth for one metric and print its legend
    Legend {
        /// Metric slug, e.g. gdp or life-expectancy
        #[arg(long)]
        metric: Metric,
    },

    /// Load the boundary snapshot nearest to a year
    History {
        #[arg(long, allow_hyphen_values = true)]
        year: i32,
    },

    /// Load one natural-feature family at a zoom level
    Natural {
        #[arg(long, value_enum)]
        family: Family,

        #[arg(long, default_value_t = 1.5)]
        zoom: f64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Family {
    Rivers,
    MountainRanges,
    Peaks,
}

impl From<Family> for NaturalFamily {
    fn from(family: Family) -> Self {
        match family {
            Family::Rivers => NaturalFamily::Rivers,
            Family::MountainRanges => NaturalFamily::MountainRanges,
            Family::Peaks => NaturalFamily::Peaks,
        }
    }
}

fn load_config(args: &Args) -> Result<EngineConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    if let Ok(api_base) = env::var("ATLAS_API_BASE") {
        config.api_base = api_base;
    }
    if let Some(api_base) = &args.api_base {
        config.api_base = api_base.clone();
    }
    config.validate()?;
    Ok(config)
}

fn feature_count(rt: &HeadlessRuntime, source: &str) -> Option<usize> {
    match rt.source(source)? {
        SourceDescriptor::Geojson { data } => data.feature_count(),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let source = HttpDataSource::new(config.api_base.clone());
    info!(api_base = source.base_url(), "probing backend");

    let mut rt = HeadlessRuntime::new();
    if let Command::Natural { zoom, .. } = args.command {
        rt.set_camera(CameraState {
            zoom,
            ..rt.camera()
        });
    }
    let mut engine = MapEngine::new(rt, config)?;
    engine.init();

    let report = match args.command {
        Command::Legend { metric } => {
            engine.set_active_metric(Some(metric));
            pump(&mut engine, &source, MAX_ROUNDS).await;
            json!({
                "metric": metric,
                "label": metric.label(),
                "legend": engine.legend(),
            })
        }
        Command::History { year } => {
            engine.set_year(year);
            engine.set_historical_mode(true);
            pump(&mut engine, &source, MAX_ROUNDS).await;
            let timeline = engine.historical().timeline();
            json!({
                "requested": year,
                "displayed": timeline.displayed_year(),
                "features": feature_count(engine.runtime(), engine::historical::HISTORICAL_SOURCE),
            })
        }
        Command::Natural { family, .. } => {
            let family = NaturalFamily::from(family);
            engine.set_natural_enabled(family, true);
            pump(&mut engine, &source, MAX_ROUNDS).await;
            json!({
                "family": family,
                "zoom": engine.natural().zoom(),
                "tier": engine.natural().applied_tier(family),
                "features": feature_count(engine.runtime(), &layers::natural::source_id(family)),
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    engine.dispose();
    Ok(())
}
