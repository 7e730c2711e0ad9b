use std::error::Error;
#[cfg(feature = "parquet")]
use std::path::PathBuf;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::{ManufacturerPolicy, PipelineConfig, UnrecognizedPolicy};
use crate::metrics::{RunSummary, producer_skew};
use crate::pipeline::AfrPipeline;
use crate::quarter::MonthPartition;
use crate::report::{AfrReport, format_count_with_commas};
#[cfg(feature = "parquet")]
use crate::source::snapshot::SnapshotDirSource;
use crate::source::synthetic::SyntheticFleetSource;

/// Environment variable consulted when `--snapshot-dir` is not passed.
#[cfg(feature = "parquet")]
pub const SNAPSHOT_DIR_ENV: &str = "DRIVESTATS_SNAPSHOT_DIR";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnUnrecognizedArg {
    Fail,
    Skip,
}

impl From<OnUnrecognizedArg> for UnrecognizedPolicy {
    fn from(value: OnUnrecognizedArg) -> Self {
        match value {
            OnUnrecognizedArg::Fail => UnrecognizedPolicy::Fail,
            OnUnrecognizedArg::Skip => UnrecognizedPolicy::Skip,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "synthetic_fleet_demo",
    disable_help_subcommand = true,
    about = "Quarterly AFR report over a generated drive fleet",
    long_about = "Generate a deterministic synthetic drive fleet and stream it through the quarterly annualized-failure-rate pipeline. The CSV report lands on stdout; run accounting lands on stderr."
)]
struct SyntheticFleetDemoCli {
    #[arg(
        long,
        default_value_t = 7,
        help = "Deterministic seed for the generated fleet"
    )]
    seed: u64,
    #[arg(
        long = "start",
        value_name = "YYYY-MM",
        value_parser = parse_month_arg,
        default_value = "2023-01",
        help = "First generated month"
    )]
    start: MonthPartition,
    #[arg(
        long,
        default_value_t = 12,
        value_parser = parse_positive_usize,
        help = "Number of consecutive months to generate"
    )]
    months: usize,
    #[arg(
        long,
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Producer worker threads"
    )]
    workers: usize,
    #[arg(
        long = "min-fleet-size",
        default_value_t = 500,
        help = "Cull models with fewer distinct drives than this"
    )]
    min_fleet_size: usize,
    #[arg(
        long = "batch-size",
        default_value_t = 4096,
        value_parser = parse_positive_usize,
        help = "Observations per channel batch"
    )]
    batch_size: usize,
    #[arg(
        long = "channel-capacity",
        default_value_t = 1024,
        value_parser = parse_positive_usize,
        help = "Bounded channel capacity in messages"
    )]
    channel_capacity: usize,
    #[arg(
        long = "keep-hgst-separate",
        help = "Report WDC and HGST as distinct manufacturers instead of one merged bucket"
    )]
    keep_hgst_separate: bool,
    #[arg(
        long = "on-unrecognized",
        value_enum,
        default_value = "fail",
        help = "What to do with model strings normalization rejects"
    )]
    on_unrecognized: OnUnrecognizedArg,
    #[arg(
        long = "model-pattern",
        value_name = "REGEX",
        help = "Only aggregate raw models matching a pattern, repeat as needed"
    )]
    model_patterns: Vec<String>,
}

#[cfg(feature = "parquet")]
#[derive(Debug, Parser)]
#[command(
    name = "quarterly_afr_demo",
    disable_help_subcommand = true,
    about = "Quarterly AFR report over a drive-stats snapshot directory",
    long_about = "Aggregate a directory of monthly parquet/JSONL telemetry shards into per-model quarterly annualized-failure-rate series. The CSV report lands on stdout; run accounting lands on stderr.",
    after_help = "The snapshot directory is resolved from --snapshot-dir, then the DRIVESTATS_SNAPSHOT_DIR environment variable."
)]
struct QuarterlyAfrDemoCli {
    #[arg(
        long = "snapshot-dir",
        value_name = "PATH",
        help = "Directory of monthly shard files named with a YYYY-MM prefix"
    )]
    snapshot_dir: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Producer worker threads"
    )]
    workers: usize,
    #[arg(
        long = "min-fleet-size",
        default_value_t = 2000,
        help = "Cull models with fewer distinct drives than this"
    )]
    min_fleet_size: usize,
    #[arg(
        long = "batch-size",
        default_value_t = 4096,
        value_parser = parse_positive_usize,
        help = "Observations per channel batch"
    )]
    batch_size: usize,
    #[arg(
        long = "channel-capacity",
        default_value_t = 1024,
        value_parser = parse_positive_usize,
        help = "Bounded channel capacity in messages"
    )]
    channel_capacity: usize,
    #[arg(
        long = "keep-hgst-separate",
        help = "Report WDC and HGST as distinct manufacturers instead of one merged bucket"
    )]
    keep_hgst_separate: bool,
    #[arg(
        long = "on-unrecognized",
        value_enum,
        default_value = "fail",
        help = "What to do with model strings normalization rejects"
    )]
    on_unrecognized: OnUnrecognizedArg,
    #[arg(
        long = "model-pattern",
        value_name = "REGEX",
        help = "Only aggregate raw models matching a pattern, repeat as needed"
    )]
    model_patterns: Vec<String>,
}

/// Run the synthetic fleet demo with the given CLI arguments.
pub fn run_synthetic_fleet_demo<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<SyntheticFleetDemoCli, _>(
        std::iter::once("synthetic_fleet_demo".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let config = PipelineConfig {
        workers: cli.workers,
        channel_capacity: cli.channel_capacity,
        batch_size: cli.batch_size,
        min_fleet_size: cli.min_fleet_size,
        model_patterns: cli.model_patterns,
        manufacturer_policy: manufacturer_policy_for(cli.keep_hgst_separate),
        unrecognized_policy: cli.on_unrecognized.into(),
        ..PipelineConfig::default()
    };

    let source = SyntheticFleetSource::with_default_catalog(
        "synthetic-fleet",
        cli.seed,
        cli.start,
        cli.months,
    )?;
    let run = AfrPipeline::new(config)?.run(&source)?;

    print_report_csv(&run.report);
    print_run_summary(&run.summary);
    Ok(())
}

/// Run the snapshot-directory demo with the given CLI arguments.
#[cfg(feature = "parquet")]
pub fn run_quarterly_afr_demo<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<QuarterlyAfrDemoCli, _>(
        std::iter::once("quarterly_afr_demo".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let snapshot_dir = match cli.snapshot_dir {
        Some(dir) => dir,
        None => match std::env::var_os(SNAPSHOT_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => {
                return Err(format!(
                    "no snapshot directory given; pass --snapshot-dir or set {SNAPSHOT_DIR_ENV}"
                )
                .into())
            }
        },
    };

    let config = PipelineConfig {
        workers: cli.workers,
        channel_capacity: cli.channel_capacity,
        batch_size: cli.batch_size,
        min_fleet_size: cli.min_fleet_size,
        model_patterns: cli.model_patterns,
        manufacturer_policy: manufacturer_policy_for(cli.keep_hgst_separate),
        unrecognized_policy: cli.on_unrecognized.into(),
        ..PipelineConfig::default()
    };

    let source = SnapshotDirSource::open("drive-stats-snapshot", &snapshot_dir)?;
    eprintln!(
        "Indexed {} shard file(s) covering {} rows under {}",
        source.shard_count(),
        format_count_with_commas(source.indexed_rows()),
        snapshot_dir.display()
    );
    let run = AfrPipeline::new(config)?.run(&source)?;

    print_report_csv(&run.report);
    print_run_summary(&run.summary);
    Ok(())
}

fn manufacturer_policy_for(keep_hgst_separate: bool) -> ManufacturerPolicy {
    if keep_hgst_separate {
        ManufacturerPolicy::KeepHgstSeparate
    } else {
        ManufacturerPolicy::MergeWdcHgst
    }
}

fn print_report_csv(report: &AfrReport) {
    println!("model,quarter,afr_percent,cumulative_drive_days,cumulative_failures,fleet_size");
    for (display, series) in &report.models {
        for point in &series.quarters {
            // Display names embed a comma-grouped fleet size, hence the quotes.
            println!(
                "\"{}\",{},{:.4},{},{},{}",
                display,
                point.quarter,
                point.afr_percent,
                point.drive_days,
                point.failures,
                series.fleet_size
            );
        }
    }
}

fn print_run_summary(summary: &RunSummary) {
    eprintln!("=== run summary ===");
    eprintln!("producers: {}", summary.producers);
    eprintln!("partitions: {}", summary.partitions);
    eprintln!(
        "rows scanned: {}",
        format_count_with_commas(summary.rows_scanned)
    );
    eprintln!(
        "rows filtered out: {}",
        format_count_with_commas(summary.rows_filtered_out)
    );
    eprintln!(
        "rows skipped as unrecognized: {}",
        format_count_with_commas(summary.rows_unrecognized)
    );
    eprintln!(
        "observations: {}",
        format_count_with_commas(summary.observations)
    );
    eprintln!("batches: {}", format_count_with_commas(summary.batches));
    eprintln!(
        "models observed: {} ({} reported)",
        summary.models_observed, summary.models_reported
    );
    eprintln!(
        "elapsed: {:.2}s ({:.0} rows/sec)",
        summary.elapsed.as_secs_f64(),
        summary.rows_per_sec()
    );
    if !summary.unrecognized.is_empty() {
        eprintln!("[UNRECOGNIZED MODELS]");
        for (raw, count) in &summary.unrecognized {
            eprintln!("  {raw:?} => {count} rows");
        }
    }
    if let Some(skew) = producer_skew(&summary.per_producer) {
        eprintln!("[PRODUCER SKEW]");
        eprintln!(
            "  min={} max={} mean={:.1} ratio={:.2}",
            skew.min, skew.max, skew.mean, skew.ratio
        );
        for share in &skew.per_producer {
            eprintln!(
                "  producer {} => {} observations ({:.1}%)",
                share.producer,
                format_count_with_commas(share.observations),
                share.share * 100.0
            );
        }
    }
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_month_arg(raw: &str) -> Result<MonthPartition, String> {
    MonthPartition::parse_label(raw.trim())
        .ok_or_else(|| format!("Could not parse '{raw}' as a YYYY-MM month label"))
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
