//! Filesystem snapshot source over monthly telemetry shards.
//!
//! A snapshot directory holds one or more shard files per month, named with a
//! `YYYY-MM` prefix (`2023-10.parquet`, `2023-10_part-01.jsonl`). Parquet
//! shards carry the published drive-stats column layout; JSONL shards carry
//! one row object per line with the same columns. Discovery walks the whole
//! tree, so shards may be grouped into subdirectories freely.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDate;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::reader::RowIter;
use rayon::prelude::*;
use serde_json::Value;
use tracing::info;
use walkdir::WalkDir;

use crate::constants::snapshot::SHARD_EXTENSIONS;
use crate::data::HealthRecord;
use crate::errors::PipelineError;
use crate::quarter::MonthPartition;
use crate::source::{RecordScan, RowSource};

/// Column names expected in every shard.
pub mod columns {
    /// Raw model string.
    pub const MODEL: &str = "model";
    /// Observation date, either a `YYYY-MM-DD` string or days since epoch.
    pub const DATE: &str = "date";
    /// Device serial number.
    pub const SERIAL_NUMBER: &str = "serial_number";
    /// Failure flag, either a boolean or a 0/1 count.
    pub const FAILURE: &str = "failure";
}

#[derive(Clone, Debug)]
struct Shard {
    path: PathBuf,
    partition: MonthPartition,
    rows: u64,
    is_parquet: bool,
}

/// Read-only source over a directory of monthly shard files.
///
/// Opening indexes every shard up front (in parallel) so that
/// [`partitions`](RowSource::partitions) and malformed file names fail fast;
/// row data itself is only read during scans.
#[derive(Debug)]
pub struct SnapshotDirSource {
    id: String,
    shards: BTreeMap<MonthPartition, Vec<Shard>>,
}

impl SnapshotDirSource {
    /// Index all shard files under `root`.
    pub fn open(id: impl Into<String>, root: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let id = id.into();
        let root = root.as_ref();
        let started = Instant::now();

        let mut shard_paths = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ext) = entry.path().extension().and_then(|v| v.to_str()) else {
                continue;
            };
            if SHARD_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
            {
                shard_paths.push(entry.path().to_path_buf());
            }
        }
        shard_paths.sort();
        if shard_paths.is_empty() {
            return Err(PipelineError::SourceRead {
                source_id: id,
                reason: format!(
                    "no snapshot shards found under {} with extensions {:?}",
                    root.display(),
                    SHARD_EXTENSIONS
                ),
            });
        }

        let mut indexed = shard_paths
            .into_par_iter()
            .enumerate()
            .map(|(ordinal, path)| {
                let shard = index_shard(&id, &path)?;
                Ok::<_, PipelineError>((ordinal, shard))
            })
            .collect::<Result<Vec<_>, _>>()?;
        indexed.sort_by_key(|(ordinal, _)| *ordinal);

        let mut shards: BTreeMap<MonthPartition, Vec<Shard>> = BTreeMap::new();
        let mut total_rows = 0u64;
        for (_, shard) in indexed {
            total_rows += shard.rows;
            shards.entry(shard.partition).or_default().push(shard);
        }
        info!(
            source_id = %id,
            partitions = shards.len(),
            rows = total_rows,
            index_ms = started.elapsed().as_millis(),
            "snapshot directory indexed"
        );
        Ok(Self { id, shards })
    }

    /// Total rows counted across all shards during indexing.
    pub fn indexed_rows(&self) -> u64 {
        self.shards
            .values()
            .flat_map(|shards| shards.iter())
            .map(|shard| shard.rows)
            .sum()
    }

    /// Number of shard files discovered.
    pub fn shard_count(&self) -> usize {
        self.shards.values().map(Vec::len).sum()
    }
}

impl RowSource for SnapshotDirSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn partitions(&self) -> Result<Vec<MonthPartition>, PipelineError> {
        Ok(self.shards.keys().copied().collect())
    }

    fn scan(&self, partition: MonthPartition) -> Result<RecordScan<'_>, PipelineError> {
        let pending = self
            .shards
            .get(&partition)
            .map(|shards| shards.as_slice())
            .unwrap_or(&[])
            .iter();
        Ok(Box::new(SnapshotScan {
            source_id: self.id.clone(),
            partition,
            pending,
            current: None,
        }))
    }
}

fn index_shard(source_id: &str, path: &Path) -> Result<Shard, PipelineError> {
    let stem = path.file_stem().and_then(|v| v.to_str()).unwrap_or("");
    let partition =
        partition_for_stem(stem).ok_or_else(|| PipelineError::SourceInconsistent {
            source_id: source_id.to_string(),
            details: format!(
                "shard {} has no YYYY-MM month prefix in its file name",
                path.display()
            ),
        })?;
    let is_parquet = path
        .extension()
        .and_then(|v| v.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    let rows = if is_parquet {
        parquet_row_count(source_id, path)?
    } else {
        jsonl_row_count(source_id, path)?
    };
    Ok(Shard {
        path: path.to_path_buf(),
        partition,
        rows,
        is_parquet,
    })
}

/// Month prefix of a shard file stem. Accepts an optional suffix after the
/// seven `YYYY-MM` characters as long as it does not extend the month digits.
fn partition_for_stem(stem: &str) -> Option<MonthPartition> {
    let prefix = stem.get(..7)?;
    if stem.as_bytes().get(7).is_some_and(u8::is_ascii_digit) {
        return None;
    }
    MonthPartition::parse_label(prefix)
}

fn parquet_row_count(source_id: &str, path: &Path) -> Result<u64, PipelineError> {
    let file = File::open(path).map_err(|err| PipelineError::SourceRead {
        source_id: source_id.to_string(),
        reason: format!("failed opening parquet shard {}: {err}", path.display()),
    })?;
    let reader = SerializedFileReader::new(file).map_err(|err| PipelineError::SourceRead {
        source_id: source_id.to_string(),
        reason: format!("failed reading parquet metadata {}: {err}", path.display()),
    })?;
    u64::try_from(reader.metadata().file_metadata().num_rows()).map_err(|_| {
        PipelineError::SourceInconsistent {
            source_id: source_id.to_string(),
            details: format!("parquet row count is negative in {}", path.display()),
        }
    })
}

fn jsonl_row_count(source_id: &str, path: &Path) -> Result<u64, PipelineError> {
    let file = File::open(path).map_err(|err| PipelineError::SourceRead {
        source_id: source_id.to_string(),
        reason: format!("failed opening jsonl shard {}: {err}", path.display()),
    })?;
    let mut rows = 0u64;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| PipelineError::SourceRead {
            source_id: source_id.to_string(),
            reason: format!("failed reading jsonl shard {}: {err}", path.display()),
        })?;
        if !line.trim().is_empty() {
            rows += 1;
        }
    }
    Ok(rows)
}

/// Streams one partition's shards in path order, opening each lazily.
struct SnapshotScan<'a> {
    source_id: String,
    partition: MonthPartition,
    pending: std::slice::Iter<'a, Shard>,
    current: Option<ShardRows>,
}

enum ShardRows {
    Parquet {
        path: PathBuf,
        iter: RowIter<'static>,
    },
    Jsonl {
        path: PathBuf,
        lines: Lines<BufReader<File>>,
    },
}

fn open_shard(source_id: &str, shard: &Shard) -> Result<ShardRows, PipelineError> {
    let file = File::open(&shard.path).map_err(|err| PipelineError::SourceRead {
        source_id: source_id.to_string(),
        reason: format!(
            "failed opening snapshot shard {}: {err}",
            shard.path.display()
        ),
    })?;
    if shard.is_parquet {
        let reader =
            SerializedFileReader::new(file).map_err(|err| PipelineError::SourceRead {
                source_id: source_id.to_string(),
                reason: format!(
                    "failed reading parquet metadata {}: {err}",
                    shard.path.display()
                ),
            })?;
        Ok(ShardRows::Parquet {
            path: shard.path.clone(),
            iter: RowIter::from_file_into(Box::new(reader)),
        })
    } else {
        Ok(ShardRows::Jsonl {
            path: shard.path.clone(),
            lines: BufReader::new(file).lines(),
        })
    }
}

impl Iterator for SnapshotScan<'_> {
    type Item = Result<HealthRecord, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() {
                let shard = self.pending.next()?;
                match open_shard(&self.source_id, shard) {
                    Ok(rows) => self.current = Some(rows),
                    Err(err) => return Some(Err(err)),
                }
            }
            let Some(rows) = self.current.as_mut() else {
                continue;
            };
            match rows {
                ShardRows::Parquet { path, iter } => match iter.next() {
                    Some(Ok(row)) => {
                        let value = row.to_json_value();
                        return Some(decode_row(&self.source_id, path, self.partition, &value));
                    }
                    Some(Err(err)) => {
                        let reason =
                            format!("failed decoding parquet row in {}: {err}", path.display());
                        self.current = None;
                        return Some(Err(PipelineError::SourceRead {
                            source_id: self.source_id.clone(),
                            reason,
                        }));
                    }
                    None => self.current = None,
                },
                ShardRows::Jsonl { path, lines } => match lines.next() {
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let parsed = serde_json::from_str::<Value>(&line).map_err(|err| {
                            PipelineError::SourceInconsistent {
                                source_id: self.source_id.clone(),
                                details: format!(
                                    "invalid JSON row in {}: {err}",
                                    path.display()
                                ),
                            }
                        });
                        return Some(parsed.and_then(|value| {
                            decode_row(&self.source_id, path, self.partition, &value)
                        }));
                    }
                    Some(Err(err)) => {
                        let reason =
                            format!("failed reading jsonl shard {}: {err}", path.display());
                        self.current = None;
                        return Some(Err(PipelineError::SourceRead {
                            source_id: self.source_id.clone(),
                            reason,
                        }));
                    }
                    None => self.current = None,
                },
            }
        }
    }
}

fn decode_row(
    source_id: &str,
    path: &Path,
    partition: MonthPartition,
    value: &Value,
) -> Result<HealthRecord, PipelineError> {
    let row = value
        .as_object()
        .ok_or_else(|| inconsistent(source_id, path, "row is not a JSON object".to_string()))?;

    let model = text_field(row, columns::MODEL).ok_or_else(|| {
        inconsistent(
            source_id,
            path,
            format!("missing or non-text column '{}'", columns::MODEL),
        )
    })?;
    let serial_number = text_field(row, columns::SERIAL_NUMBER).ok_or_else(|| {
        inconsistent(
            source_id,
            path,
            format!("missing or non-text column '{}'", columns::SERIAL_NUMBER),
        )
    })?;

    let date_value = row.get(columns::DATE).ok_or_else(|| {
        inconsistent(
            source_id,
            path,
            format!("missing column '{}'", columns::DATE),
        )
    })?;
    let date = decode_date(date_value).ok_or_else(|| {
        inconsistent(
            source_id,
            path,
            format!(
                "column '{}' is not a YYYY-MM-DD string or epoch day count: {date_value}",
                columns::DATE
            ),
        )
    })?;
    if !partition.contains(date) {
        return Err(inconsistent(
            source_id,
            path,
            format!("row dated {date} landed in shard for partition {partition}"),
        ));
    }

    let failure_value = row.get(columns::FAILURE).ok_or_else(|| {
        inconsistent(
            source_id,
            path,
            format!("missing column '{}'", columns::FAILURE),
        )
    })?;
    let failure = decode_failure(failure_value).ok_or_else(|| {
        inconsistent(
            source_id,
            path,
            format!(
                "column '{}' is not a boolean or 0/1 count: {failure_value}",
                columns::FAILURE
            ),
        )
    })?;

    Ok(HealthRecord {
        model,
        date,
        serial_number,
        failure,
    })
}

fn text_field(row: &serde_json::Map<String, Value>, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn decode_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(text) => NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok(),
        Value::Number(number) => {
            let days = number.as_i64()?;
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
            epoch.checked_add_signed(chrono::TimeDelta::try_days(days)?)
        }
        _ => None,
    }
}

fn decode_failure(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_i64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn inconsistent(source_id: &str, path: &Path, details: String) -> PipelineError {
    PipelineError::SourceInconsistent {
        source_id: source_id.to_string(),
        details: format!("{}: {details}", path.display()),
    }
}
