//! End-to-end pipeline tests over gzip fixtures and in-memory shards

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use memc_load::codec;
use memc_load::config::RunConfig;
use memc_load::ingestor::IngestError;
use memc_load::parser::Verdict;
use memc_load::pipeline::{Orchestrator, PipelineError};
use memc_load::retry::FixedBackoff;
use memc_load::shard::ShardTable;
use memc_load::store::{MemoryStore, StoreClient};
use tempfile::TempDir;

fn write_gz(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content.as_bytes()).unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();
    path
}

struct Shards {
    idfa: Arc<MemoryStore>,
    gaid: Arc<MemoryStore>,
    table: Arc<ShardTable>,
}

fn shards(idfa: MemoryStore, gaid: MemoryStore) -> Shards {
    let idfa = Arc::new(idfa);
    let gaid = Arc::new(gaid);
    let clients: [(&str, Arc<dyn StoreClient>); 2] = [("idfa", idfa.clone()), ("gaid", gaid.clone())];
    Shards {
        idfa,
        gaid,
        table: Arc::new(ShardTable::from_clients(clients)),
    }
}

fn config(dry_run: bool) -> RunConfig {
    RunConfig {
        workers: 3,
        retry_backoff: Duration::ZERO,
        dry_run,
        channel_capacity: 8,
        ..RunConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_run_writes_records_and_marks_files() {
    let dir = TempDir::new().unwrap();
    let first = write_gz(
        &dir,
        "20170929000000.tsv.gz",
        "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23\n\
         gaid\t7rfw452y52g2gq4g\t55.55\t42.42\t7423,424\n\
         broken line\n",
    );
    let second = write_gz(
        &dir,
        "20170929000100.tsv.gz",
        "idfa\tabc\t-1.5\t2.25\t1,x,3\n\
         dvid\tzzz\t0\t0\t1\n",
    );
    let shards = shards(MemoryStore::new(), MemoryStore::new());

    let report = Orchestrator::new(config(false), shards.table.clone())
        .run(vec![first.clone(), second.clone()])
        .await
        .unwrap();

    assert_eq!(report.files, 2);
    assert_eq!(report.completed, 2);
    assert_eq!(report.aborted, 0);
    assert_eq!(report.stats.parsed, 4);
    assert_eq!(report.stats.failed, 1);
    assert!(matches!(report.verdict, Verdict::HighErrorRate { .. }));
    assert_eq!(report.writes.written, 3);
    assert_eq!(report.writes.unknown_shard, 1);

    let stored = codec::decode(&shards.idfa.value("idfa:abc").unwrap()).unwrap();
    assert_eq!(stored.apps, vec![1, 3]);
    assert_eq!(stored.lat.map(f64::to_bits), Some((-1.5f64).to_bits()));
    assert_eq!(stored.lon, Some(2.25));

    let stored = codec::decode(&shards.gaid.value("gaid:7rfw452y52g2gq4g").unwrap()).unwrap();
    assert_eq!(stored.apps, vec![7423, 424]);

    assert!(!first.exists());
    assert!(!second.exists());
    assert!(dir.path().join(".20170929000000.tsv.gz").exists());
    assert!(dir.path().join(".20170929000100.tsv.gz").exists());
}

#[tokio::test]
async fn test_dry_run_skips_store_and_rename() {
    let dir = TempDir::new().unwrap();
    let path = write_gz(&dir, "a.tsv.gz", "idfa\t1\t1.0\t2.0\t1\ngaid\t2\t1.0\t2.0\t2\n");
    let shards = shards(MemoryStore::new(), MemoryStore::new());

    let report = Orchestrator::new(config(true), shards.table.clone())
        .run(vec![path.clone()])
        .await
        .unwrap();

    assert_eq!(report.writes.dry_run, 2);
    assert_eq!(report.writes.written, 0);
    assert_eq!(shards.idfa.set_calls() + shards.gaid.set_calls(), 0);
    assert!(path.exists());
    assert_eq!(report.completed, 1);
}

#[tokio::test]
async fn test_failed_writes_are_dropped_and_file_still_marked() {
    let dir = TempDir::new().unwrap();
    let path = write_gz(&dir, "a.tsv.gz", "idfa\t1\t1.0\t2.0\t1\nidfa\t2\t1.0\t2.0\t2\n");
    let shards = shards(MemoryStore::rejecting_first(u64::MAX), MemoryStore::new());

    let report = Orchestrator::new(config(false), shards.table.clone())
        .with_retry_strategy(Arc::new(FixedBackoff::immediate(5)))
        .run(vec![path.clone()])
        .await
        .unwrap();

    assert_eq!(report.writes.failed, 2);
    assert_eq!(shards.idfa.set_calls(), 10);
    assert!(shards.idfa.is_empty());
    assert_eq!(report.verdict, Verdict::Acceptable { rate: 0.0 });
    assert!(!path.exists());
}

#[tokio::test]
async fn test_invalid_gzip_is_fatal() {
    let dir = TempDir::new().unwrap();
    let good = write_gz(&dir, "a.tsv.gz", "idfa\t1\t1.0\t2.0\t1\n");
    let bad = dir.path().join("b.tsv.gz");
    std::fs::write(&bad, b"idfa\t1\t1.0\t2.0\t1\n").unwrap();
    let shards = shards(MemoryStore::new(), MemoryStore::new());

    let err = Orchestrator::new(config(false), shards.table.clone())
        .run(vec![good, bad.clone()])
        .await
        .unwrap_err();

    match err {
        PipelineError::Ingest(IngestError::Decompress { path, .. }) => assert_eq!(path, bad),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(bad.exists());
}

#[tokio::test]
async fn test_error_rate_at_threshold_is_high() {
    let dir = TempDir::new().unwrap();
    let mut content: String = (0..99).map(|i| format!("idfa\t{i}\t1.0\t2.0\t1\n")).collect();
    content.push_str("idfa\t\t1.0\t2.0\t1\n");
    let path = write_gz(&dir, "a.tsv.gz", &content);
    let shards = shards(MemoryStore::new(), MemoryStore::new());

    let report = Orchestrator::new(config(false), shards.table.clone())
        .run(vec![path])
        .await
        .unwrap();

    assert_eq!(report.stats.parsed, 99);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.verdict, Verdict::HighErrorRate { rate: 0.01 });
    assert_eq!(shards.idfa.len(), 99);
}

#[tokio::test]
async fn test_no_files_reports_no_input() {
    let shards = shards(MemoryStore::new(), MemoryStore::new());

    let report = Orchestrator::new(config(false), shards.table.clone())
        .run(Vec::new())
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::NoInput);
    assert_eq!(report.writes.total(), 0);
}
