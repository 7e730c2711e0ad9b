#![cfg(feature = "parquet")]

use std::fs;

use chrono::NaiveDate;

use drivestats::report::afr_percent;
use drivestats::{
    AfrPipeline, MonthPartition, PipelineConfig, PipelineError, RowSource, SnapshotDirSource,
};

fn write_lines(path: &std::path::Path, lines: &[&str]) {
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(path, body).expect("failed writing snapshot shard");
}

fn shard_line(model: &str, date: &str, serial: &str, failure: u8) -> String {
    format!(r#"{{"model":"{model}","date":"{date}","serial_number":"{serial}","failure":{failure}}}"#)
}

fn month(year: i32, month: u32) -> MonthPartition {
    MonthPartition { year, month }
}

#[test]
fn indexes_jsonl_shards_by_month_prefix() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    write_lines(
        &temp.path().join("2023-10.jsonl"),
        &[
            &shard_line("ST4000DM000", "2023-10-01", "Z1", 0),
            &shard_line("ST4000DM000", "2023-10-02", "Z1", 0),
            &shard_line("ST4000DM000", "2023-10-03", "Z1", 0),
        ],
    );
    write_lines(
        &temp.path().join("2023-11_part-00.jsonl"),
        &[
            &shard_line("ST4000DM000", "2023-11-01", "Z1", 0),
            &shard_line("ST4000DM000", "2023-11-02", "Z1", 0),
        ],
    );
    let nested = temp.path().join("archive");
    fs::create_dir(&nested).expect("failed creating subdir");
    write_lines(
        &nested.join("2023-12.jsonl"),
        &[&shard_line("ST4000DM000", "2023-12-01", "Z1", 0)],
    );
    // Neither of these counts as a shard.
    fs::write(temp.path().join("README.md"), "notes\n").expect("failed writing readme");
    fs::write(temp.path().join("2023-10.csv"), "model,date\n").expect("failed writing csv");

    let source = SnapshotDirSource::open("snap", temp.path()).expect("open");
    assert_eq!(source.shard_count(), 3);
    assert_eq!(source.indexed_rows(), 6);
    assert_eq!(
        source.partitions().expect("partitions"),
        vec![month(2023, 10), month(2023, 11), month(2023, 12)]
    );
}

#[test]
fn an_empty_directory_fails_to_open() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    let err = SnapshotDirSource::open("snap", temp.path()).expect_err("no shards");
    assert!(matches!(err, PipelineError::SourceRead { .. }));
}

#[test]
fn shards_without_month_prefixes_fail_indexing() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    write_lines(
        &temp.path().join("drive_stats.jsonl"),
        &[&shard_line("ST4000DM000", "2023-10-01", "Z1", 0)],
    );
    let err = SnapshotDirSource::open("snap", temp.path()).expect_err("bad stem");
    assert!(matches!(err, PipelineError::SourceInconsistent { .. }));
    assert!(err.to_string().contains("YYYY-MM"), "got: {err}");
}

#[test]
fn scans_decode_mixed_date_and_failure_encodings() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    // 19635 days after the epoch is 2023-10-05.
    write_lines(
        &temp.path().join("2023-10.jsonl"),
        &[
            &shard_line("ST4000DM000", "2023-10-04", "Z1", 0),
            "",
            r#"{"model":"ST4000DM000","date":19635,"serial_number":"Z1","failure":true}"#,
        ],
    );

    let source = SnapshotDirSource::open("snap", temp.path()).expect("open");
    assert_eq!(source.indexed_rows(), 2);

    let rows: Vec<_> = source
        .scan(month(2023, 10))
        .expect("scan")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2023, 10, 4).unwrap());
    assert!(!rows[0].failure);
    assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2023, 10, 5).unwrap());
    assert!(rows[1].failure);
}

#[test]
fn rows_dated_outside_their_shard_fail_the_scan() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    write_lines(
        &temp.path().join("2023-10.jsonl"),
        &[
            &shard_line("ST4000DM000", "2023-10-01", "Z1", 0),
            &shard_line("ST4000DM000", "2023-11-01", "Z1", 0),
        ],
    );

    let source = SnapshotDirSource::open("snap", temp.path()).expect("open");
    let outcome: Result<Vec<_>, _> = source.scan(month(2023, 10)).expect("scan").collect();
    let err = outcome.expect_err("stray date");
    assert!(matches!(err, PipelineError::SourceInconsistent { .. }));
    assert!(err.to_string().contains("2023-11-01"), "got: {err}");
}

#[test]
fn a_snapshot_directory_feeds_the_full_pipeline() {
    let temp = tempfile::tempdir().expect("failed creating tempdir");
    let mut october = Vec::new();
    for day in 1..=10 {
        october.push(shard_line(
            "ST4000DM000",
            &format!("2023-10-{day:02}"),
            "S1",
            0,
        ));
        october.push(shard_line(
            "ST4000DM000",
            &format!("2023-10-{day:02}"),
            "S2",
            0,
        ));
    }
    let october: Vec<&str> = october.iter().map(String::as_str).collect();
    write_lines(&temp.path().join("2023-10.jsonl"), &october);

    let mut november = Vec::new();
    for day in 1..=5 {
        let failure = u8::from(day == 5);
        november.push(shard_line(
            "ST4000DM000",
            &format!("2023-11-{day:02}"),
            "S1",
            failure,
        ));
    }
    let november: Vec<&str> = november.iter().map(String::as_str).collect();
    write_lines(&temp.path().join("2023-11.jsonl"), &november);

    let source = SnapshotDirSource::open("snap", temp.path()).expect("open");
    let config = PipelineConfig {
        workers: 2,
        min_fleet_size: 1,
        ..PipelineConfig::default()
    };
    let run = AfrPipeline::new(config)
        .expect("pipeline")
        .run(&source)
        .expect("run");

    assert_eq!(run.summary.rows_scanned, source.indexed_rows());
    assert_eq!(run.report.models.len(), 1);

    let series = run
        .report
        .models
        .get("Seagate ST4000DM000 (2)")
        .expect("model series");
    assert_eq!(series.fleet_size, 2);
    assert_eq!(series.quarters.len(), 1);
    let point = &series.quarters[0];
    assert_eq!(point.drive_days, 25);
    assert_eq!(point.failures, 1);
    assert!((point.afr_percent - afr_percent(1, 25)).abs() < 1e-12);
}
