//! Live engine round trip
//!
//! Needs `mysqldump`/`mysql` on PATH and two reachable servers configured
//! through the usual environment (`SOURCE_MYSQL_*`, `MYSQL_*`,
//! `SNAPSHOT_SCHEMA`). Run with `cargo test -- --ignored`.

use std::time::Duration;

use snapshot_relay::config::{ConfigLayer, ProcessEnv, Settings};
use snapshot_relay::engine::{MysqlClient, MysqlDump, SqlClient};
use snapshot_relay::export::Producer;
use snapshot_relay::import::Verifier;
use snapshot_relay::signal::SignalState;
use snapshot_relay::summary::CycleStatus;
use snapshot_relay::transport::DirectoryTransport;
use snapshot_relay::{ExportJob, ImportCycle};
use tempfile::TempDir;

fn table_count(client: &dyn SqlClient, schema: &str) -> u64 {
    Verifier::new(client)
        .verify(schema)
        .report()
        .map(|r| r.tables)
        .unwrap_or(0)
}

#[test]
#[ignore]
fn test_live_export_import_round_trip() {
    let settings = Settings::load(None, &ProcessEnv, ConfigLayer::default()).unwrap();
    let source = MysqlClient::new(settings.source_connection().unwrap());
    let destination = MysqlClient::new(settings.destination_connection().unwrap());
    let source_tables = table_count(&source, &settings.schema);
    assert!(source_tables > 0, "source schema has no tables");

    let root = TempDir::new().unwrap();
    let landing = root.path().join("incoming");
    let archive = root.path().join("archive");
    let cancel = SignalState::new();

    let dumper = MysqlDump::new(settings.source_connection().unwrap());
    let transport = DirectoryTransport::new(&landing);
    ExportJob {
        schema: &settings.schema,
        producer: Producer::new(&dumper, root.path().join("staging")),
        transport: Some(&transport),
        keep_local: false,
        cancel: &cancel,
    }
    .run()
    .unwrap();

    let report = ImportCycle {
        schema: &settings.schema,
        landing_dir: &landing,
        archive_dir: &archive,
        lock_dir: root.path(),
        lock_timeout: Duration::ZERO,
        scratch_dir: root.path(),
        retention: settings.retention_policy(),
        client: &destination,
        cancel: &cancel,
    }
    .run()
    .unwrap();

    assert_eq!(report.status, CycleStatus::Imported);
    assert_eq!(table_count(&destination, &settings.schema), source_tables);
}
