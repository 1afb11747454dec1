//! Subset runner binary
//!
//! Cuts one upstream subset out of a directory of JSON partitions and writes
//! it to an output directory with a manifest.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `SUBSET_DATA_DIR`: root of `<vpu>/<layer>.json` partitions (required)
//! - `SUBSET_ORIGIN`: origin reference, e.g. `id:wb-1`, `comid:101`, `hl:Gages-01`, `xy:-90.1,35.2` (required)
//! - `SUBSET_OUTPUT`: output directory (default: `./subset`)
//! - `SUBSET_INDEX`: network table JSON used as the national index (required)
//! - `SUBSET_NETWORK_LAYER`, `SUBSET_CONCURRENCY`, `SUBSET_JUNCTION_PATTERN`,
//!   `SUBSET_DEFAULT_CRS`, `SUBSET_LAYERS`: see `SubsetConfig`
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! SUBSET_DATA_DIR=./vpus SUBSET_INDEX=./network.json SUBSET_ORIGIN=comid:101 cargo run --bin hydro_subset
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use hydro_subset::store::json_dir::read_table;
use hydro_subset::{
    JsonDirSource, JsonDirWriter, NetworkIndex, NoFeatureLookup, OriginReference,
    SubsetConfig, SubsetPipeline,
};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hydro_subset=info".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
            )
            .init();
    }
}

fn required_var(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(format!("{} must be set", name).into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    info!(version = version, "Starting hydro_subset");

    let data_dir = PathBuf::from(required_var("SUBSET_DATA_DIR")?);
    let origin: OriginReference = required_var("SUBSET_ORIGIN")?.parse()?;
    let output = PathBuf::from(std::env::var("SUBSET_OUTPUT").unwrap_or_else(|_| "./subset".to_string()));
    let config = SubsetConfig::from_env();

    info!(
        data_dir = %data_dir.display(),
        origin = %origin,
        concurrency = config.effective_concurrency(),
        layers = ?config.layers,
        "Configuration loaded"
    );

    let source = Arc::new(JsonDirSource::new(&data_dir));
    let mut pipeline = SubsetPipeline::new(source, Arc::new(NoFeatureLookup), config)?;

    let index_path = required_var("SUBSET_INDEX")?;
    let load_start = Instant::now();
    let table = read_table(Path::new(&index_path)).await?;
    let index = NetworkIndex::from_table(&table)?;
    info!(
        edges = index.len(),
        latency_ms = load_start.elapsed().as_millis() as u64,
        "Network index loaded"
    );
    pipeline = pipeline.with_index(Arc::new(index));

    let start = Instant::now();
    let mut writer = JsonDirWriter::new(&output);
    let path = pipeline
        .subset_into(&origin, Vec::<String>::new(), &mut writer)
        .await?;

    info!(
        path = %path.display(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Subset complete"
    );

    Ok(())
}
