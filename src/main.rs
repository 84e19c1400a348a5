//! CLI entry point for ringfilter
//!
//! # Usage
//!
//! Keep records 100..1100 of a file, dropping scalers:
//! ```bash
//! ringfilter filter --source run-12.evt --sink out.evt --skip 100 --count 1000 \
//!     --exclude PERIODIC_SCALERS
//! ```
//!
//! Pass exactly one run merged from three producers:
//! ```bash
//! ringfilter filter --one-shot 3 < merged.evt > run.evt
//! ```
//!
//! Flatten records into event-builder fragments:
//! ```bash
//! ringfilter unglom --format v12 --default-source-id 5 < built.evt > frags.bin
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use ringfilter::config::{RingFilterConfig, DEFAULT_CONFIG_PATH};
use ringfilter::filter::{AbnormalEndFilter, KindCountFilter};
use ringfilter::logging;
use ringfilter::mediator::Mediator;
use ringfilter::one_shot::OneShotFilter;
use ringfilter::predicate::{ExcludeKindsPredicate, ProcessCountPredicate, SamplePredicate};
use ringfilter::record::FormatVersion;
use ringfilter::transport::{open_sink, open_source};
use ringfilter::unglom::{Unglom, UnglomConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "ringfilter")]
#[command(about = "Filter, sample and decompose DAQ ring-item streams", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StreamArgs {
    /// Source URI (`-` for stdin, `file:///path` or a path)
    #[arg(long)]
    source: Option<String>,

    /// Sink URI (`-` for stdout, `file:///path` or a path)
    #[arg(long)]
    sink: Option<String>,

    /// Wire generation (v10, v11, v12)
    #[arg(long)]
    format: Option<FormatVersion>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run records through the filter pipeline
    Filter {
        #[command(flatten)]
        stream: StreamArgs,

        /// Records to skip before processing
        #[arg(long)]
        skip: Option<u64>,

        /// Records to process after skipping (0 = unlimited)
        #[arg(long)]
        count: Option<u64>,

        /// Stop after one run ended by this many sources
        #[arg(long, value_name = "SOURCES")]
        one_shot: Option<usize>,

        /// Record kinds to drop (names or numeric tags)
        #[arg(long, value_delimiter = ',', value_name = "KIND")]
        exclude: Vec<String>,
    },

    /// Decompose records into flat event-builder fragments
    Unglom {
        #[command(flatten)]
        stream: StreamArgs,

        /// Split event-built physics events into their fragments
        #[arg(long)]
        split_built_events: bool,

        /// Source id for records without a body header
        #[arg(long)]
        default_source_id: Option<u32>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = RingFilterConfig::load_from(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    apply_overrides(&mut config, &cli.command);
    config.validate().map_err(|e| anyhow!(e))?;

    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Filter { .. } => run_filter(&config),
        Commands::Unglom { .. } => run_unglom(&config),
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// Command-line flags win over file and environment values.
fn apply_overrides(config: &mut RingFilterConfig, command: &Commands) {
    let stream = match command {
        Commands::Filter { stream, .. } | Commands::Unglom { stream, .. } => stream,
        Commands::Config => return,
    };
    if let Some(source) = &stream.source {
        config.pipeline.source = source.clone();
    }
    if let Some(sink) = &stream.sink {
        config.pipeline.sink = sink.clone();
    }
    if let Some(format) = stream.format {
        config.pipeline.format = format;
    }

    match command {
        Commands::Filter {
            skip,
            count,
            one_shot,
            exclude,
            ..
        } => {
            if let Some(skip) = skip {
                config.pipeline.skip = *skip;
            }
            if let Some(count) = count {
                config.pipeline.count = *count;
            }
            if one_shot.is_some() {
                config.pipeline.one_shot_sources = *one_shot;
            }
            if !exclude.is_empty() {
                config.pipeline.exclude = exclude.clone();
            }
        }
        Commands::Unglom {
            split_built_events,
            default_source_id,
            ..
        } => {
            if *split_built_events {
                config.unglom.split_built_events = true;
            }
            if let Some(id) = default_source_id {
                config.unglom.default_source_id = *id;
            }
        }
        Commands::Config => {}
    }
}

fn run_filter(config: &RingFilterConfig) -> Result<()> {
    let pipeline = &config.pipeline;
    let source = open_source(&pipeline.source, pipeline.format)
        .with_context(|| format!("Failed to open source {}", pipeline.source))?;
    let sink = open_sink(&pipeline.sink)
        .with_context(|| format!("Failed to open sink {}", pipeline.sink))?;

    let mut mediator = Mediator::new(source, sink);
    mediator.register_filter(AbnormalEndFilter);
    if let Some(sources) = pipeline.one_shot_sources {
        mediator.register_filter(OneShotFilter::new(sources));
    }
    mediator.register_filter(KindCountFilter::new());

    let excluded = config.exclude_kinds().map_err(|e| anyhow!(e))?;
    if !excluded.is_empty() {
        mediator.add_predicate(ExcludeKindsPredicate::new(excluded));
    }
    if let Some((kinds, every)) = config.sample_kinds().map_err(|e| anyhow!(e))? {
        mediator.add_predicate(SamplePredicate::new(kinds, every));
    }
    mediator.add_predicate(ProcessCountPredicate::new(pipeline.skip, pipeline.count));

    info!(
        source = %pipeline.source,
        sink = %pipeline.sink,
        format = %pipeline.format,
        "starting filter pipeline"
    );
    let summary = mediator.run().context("Filter pipeline failed")?;
    info!(
        state = %summary.state,
        read = summary.read,
        written = summary.written,
        "filter pipeline done"
    );
    Ok(())
}

fn run_unglom(config: &RingFilterConfig) -> Result<()> {
    let pipeline = &config.pipeline;
    let source = open_source(&pipeline.source, pipeline.format)
        .with_context(|| format!("Failed to open source {}", pipeline.source))?;
    let sink = open_sink(&pipeline.sink)
        .with_context(|| format!("Failed to open sink {}", pipeline.sink))?;

    let mut unglom = Unglom::new(
        source,
        sink,
        UnglomConfig {
            default_source_id: config.unglom.default_source_id,
            split_built_events: config.unglom.split_built_events,
        },
    );
    unglom.run().context("Unglom failed")?;
    Ok(())
}
