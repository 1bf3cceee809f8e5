//! End-to-end tests for the label refresh cycle against an in-memory cluster.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use keylabel::client::{ClientError, ClientResult, MetadataClient, SchemaVersionSource};
use keylabel::config::RefreshSettings;
use keylabel::labels::{
    LabelRefresher, RefreshError, RefreshOutcome, SkipReason, Strategy, UNSET_SCHEMA_VERSION,
};

// ============================================================================
// Fake cluster
// ============================================================================

/// How the fake serves `/db-table`.
#[derive(Clone, Copy)]
enum DbTableMode {
    /// Answer every batch.
    Serve,
    /// The endpoint does not exist.
    NotFound,
    /// Answer this many batches, then fail with a 500.
    FailAfter(usize),
    /// Answer with a body that is not JSON.
    Garbage,
    /// Never answer.
    Stall,
}

struct FakeCluster {
    version: Mutex<String>,
    db_table: Mutex<DbTableMode>,
    db_table_served: Mutex<usize>,
    bodies: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<String>>,
}

impl FakeCluster {
    fn new(version: i64) -> Arc<Self> {
        Arc::new(Self {
            version: Mutex::new(version.to_string()),
            db_table: Mutex::new(DbTableMode::Serve),
            db_table_served: Mutex::new(0),
            bodies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn set_version(&self, version: i64) {
        *self.version.lock().unwrap() = version.to_string();
    }

    fn set_db_table(&self, mode: DbTableMode) {
        *self.db_table.lock().unwrap() = mode;
    }

    fn serve(&self, path: &str, body: &str) {
        self.bodies
            .lock()
            .unwrap()
            .insert(path.to_string(), body.to_string());
    }

    fn unserve(&self, path: &str) {
        self.bodies.lock().unwrap().remove(path);
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    fn db_table_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|p| p.starts_with("/db-table"))
            .collect()
    }

    fn db_table_body(path: &str) -> String {
        let ids = path.trim_start_matches("/db-table?table_ids=");
        let entries: Vec<String> = ids
            .split(',')
            .map(|id| {
                format!(
                    r#""{id}": {{"db_info": {{"id": 1, "db_name": {{"O": "shop", "L": "shop"}}, "state": 5}},
                              "table_info": {{"id": {id}, "name": {{"O": "t{id}", "L": "t{id}"}}}}}}"#
                )
            })
            .collect();
        format!("{{{}}}", entries.join(","))
    }
}

#[async_trait]
impl MetadataClient for FakeCluster {
    async fn request(&self, path: &str) -> ClientResult<Vec<u8>> {
        self.requests.lock().unwrap().push(path.to_string());

        if path.starts_with("/db-table") {
            let mode = *self.db_table.lock().unwrap();
            if let DbTableMode::Stall = mode {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            let mut served = self.db_table_served.lock().unwrap();
            return match mode {
                DbTableMode::NotFound => Err(ClientError::NotFound {
                    path: path.to_string(),
                }),
                DbTableMode::FailAfter(n) if *served >= n => Err(ClientError::Status {
                    status: 500,
                    path: path.to_string(),
                }),
                DbTableMode::Garbage => Ok(b"{garbage".to_vec()),
                _ => {
                    *served += 1;
                    Ok(Self::db_table_body(path).into_bytes())
                }
            };
        }

        match self.bodies.lock().unwrap().get(path) {
            Some(body) => Ok(body.clone().into_bytes()),
            None => Err(ClientError::Transport(format!("connection reset: {}", path))),
        }
    }
}

#[async_trait]
impl SchemaVersionSource for FakeCluster {
    async fn get(&self, _key: &str) -> ClientResult<Vec<Vec<u8>>> {
        Ok(vec![self.version.lock().unwrap().clone().into_bytes()])
    }
}

const SCHEMA: &str = r#"[
    {"id": 1, "db_name": {"O": "shop", "L": "shop"}, "state": 5},
    {"id": 2, "db_name": {"O": "archive", "L": "archive"}, "state": 0}
]"#;

const SHOP_TABLES: &str = r#"[
    {"id": 100, "name": {"O": "orders", "L": "orders"},
     "index_info": [
        {"id": 1, "idx_name": {"O": "idx_customer", "L": "idx_customer"}},
        {"id": 2, "idx_name": {"O": "idx_created", "L": "idx_created"}}
     ],
     "partition": {"definitions": [
        {"id": 101, "name": {"O": "p0", "L": "p0"}},
        {"id": 102, "name": {"O": "p1", "L": "p1"}}
     ]}},
    {"id": 110, "name": {"O": "users", "L": "users"}, "index_info": []}
]"#;

fn cluster_with_schema(version: i64) -> Arc<FakeCluster> {
    let cluster = FakeCluster::new(version);
    cluster.serve("/schema", SCHEMA);
    cluster.serve("/schema/shop", SHOP_TABLES);
    cluster
}

fn refresher(cluster: &Arc<FakeCluster>) -> LabelRefresher {
    LabelRefresher::new(cluster.clone(), cluster.clone())
}

// ============================================================================
// Full scan
// ============================================================================

#[tokio::test]
async fn test_first_refresh_without_ids_runs_full_scan() {
    let cluster = cluster_with_schema(10);
    let refresher = refresher(&cluster);
    assert_eq!(refresher.schema_version(), UNSET_SCHEMA_VERSION);

    let outcome = refresher.refresh(&HashSet::new()).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            version: 10,
            strategy: Strategy::FullScan,
            applied: 4
        }
    ));
    assert_eq!(refresher.schema_version(), 10);
    assert_eq!(cluster.requests(), vec!["/schema", "/schema/shop"]);

    let labels = refresher.labels();
    assert_eq!(labels.len(), 4);
    for id in [100, 101, 102, 110] {
        assert_eq!(labels.get(id).unwrap().database, "shop");
    }
}

#[tokio::test]
async fn test_partition_label_uses_parent_indices() {
    let cluster = cluster_with_schema(10);
    let refresher = refresher(&cluster);

    refresher.refresh(&HashSet::new()).await;

    let table = refresher.lookup(100).unwrap();
    let partition = refresher.lookup(101).unwrap();
    assert_eq!(partition.name, "orders/p0");
    assert_eq!(partition.indices, table.indices);
    assert_eq!(partition.index_name(2), Some("idx_created"));
}

#[tokio::test]
async fn test_dropped_database_is_skipped() {
    let cluster = cluster_with_schema(10);
    let refresher = refresher(&cluster);

    let outcome = refresher.refresh(&HashSet::new()).await;

    assert!(outcome.is_committed());
    assert!(!cluster.requests().iter().any(|p| p == "/schema/archive"));
    assert!(refresher
        .labels()
        .snapshot()
        .values()
        .all(|label| label.database != "archive"));
}

#[tokio::test]
async fn test_failed_database_blocks_commit() {
    let cluster = cluster_with_schema(10);
    cluster.serve(
        "/schema",
        r#"[
            {"id": 1, "db_name": {"O": "shop", "L": "shop"}, "state": 5},
            {"id": 3, "db_name": {"O": "crm", "L": "crm"}, "state": 5}
        ]"#,
    );
    let refresher = refresher(&cluster);

    let outcome = refresher.refresh(&HashSet::new()).await;

    match outcome {
        RefreshOutcome::Incomplete { version, error, .. } => {
            assert_eq!(version, 10);
            assert!(matches!(
                error,
                RefreshError::PartialApply {
                    failed: 1,
                    total: 2
                }
            ));
        }
        other => panic!("expected incomplete refresh, got {:?}", other),
    }
    assert_eq!(refresher.schema_version(), UNSET_SCHEMA_VERSION);
    // The healthy database is still applied
    assert_eq!(refresher.labels().len(), 4);

    // Next cycle retries from scratch and commits once crm answers
    cluster.serve("/schema/crm", r#"[{"id": 300, "name": {"O": "leads", "L": "leads"}}]"#);
    assert!(refresher.refresh(&HashSet::new()).await.is_committed());
    assert_eq!(refresher.schema_version(), 10);
    assert_eq!(refresher.lookup(300).unwrap().database, "crm");
}

// ============================================================================
// Version gate
// ============================================================================

#[tokio::test]
async fn test_unchanged_version_does_nothing() {
    let cluster = cluster_with_schema(10);
    let refresher = refresher(&cluster);

    assert!(refresher.refresh(&HashSet::new()).await.is_committed());
    let before = refresher.labels().snapshot();
    cluster.clear_requests();

    let outcome = refresher.refresh(&HashSet::from([100])).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Skipped(SkipReason::VersionUnchanged)
    ));
    assert!(cluster.requests().is_empty());
    let after = refresher.labels().snapshot();
    assert_eq!(before.len(), after.len());
    for (id, label) in &before {
        assert!(Arc::ptr_eq(label, &after[id]));
    }
}

#[tokio::test]
async fn test_malformed_version_skips_cycle() {
    let cluster = cluster_with_schema(10);
    *cluster.version.lock().unwrap() = "not-a-number".to_string();
    let refresher = refresher(&cluster);

    let outcome = refresher.refresh(&HashSet::new()).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Skipped(SkipReason::VersionUnavailable {
            first_attempt: true,
            error: RefreshError::InvalidVersion { .. }
        })
    ));
    assert!(cluster.requests().is_empty());
    assert!(refresher.labels().is_empty());
}

// ============================================================================
// Batched fetch
// ============================================================================

#[tokio::test]
async fn test_batches_are_chunked_at_512() {
    let cluster = cluster_with_schema(10);
    let refresher = refresher(&cluster);
    let ids: HashSet<i64> = (1000..1517).collect();

    let outcome = refresher.refresh(&ids).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            strategy: Strategy::Batched,
            applied: 517,
            ..
        }
    ));
    let sizes: Vec<usize> = cluster
        .db_table_requests()
        .iter()
        .map(|p| p.split(',').count())
        .collect();
    assert_eq!(sizes, vec![512, 5]);
    assert_eq!(cluster.requests().len(), 2);
    assert_eq!(refresher.lookup(1516).unwrap().name, "t1516");
}

#[tokio::test]
async fn test_missing_endpoint_is_never_retried() {
    let cluster = cluster_with_schema(10);
    cluster.set_db_table(DbTableMode::NotFound);
    let refresher = refresher(&cluster);
    let ids = HashSet::from([100, 110]);

    let outcome = refresher.refresh(&ids).await;

    // Same cycle falls back to a full scan and commits
    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            version: 10,
            strategy: Strategy::FullScan,
            ..
        }
    ));
    assert!(!refresher.batch_endpoint_available());
    assert_eq!(cluster.db_table_requests().len(), 1);

    // Even if the endpoint appears later, it is not requested again
    cluster.set_db_table(DbTableMode::Serve);
    for version in 11..14 {
        cluster.set_version(version);
        cluster.clear_requests();

        let outcome = refresher.refresh(&ids).await;

        assert!(outcome.is_committed());
        assert!(cluster.db_table_requests().is_empty());
        assert_eq!(cluster.requests(), vec!["/schema", "/schema/shop"]);
    }
}

#[tokio::test]
async fn test_transient_batch_failure_keeps_endpoint() {
    let cluster = cluster_with_schema(10);
    cluster.set_db_table(DbTableMode::FailAfter(0));
    let refresher = refresher(&cluster);
    let ids = HashSet::from([100]);

    assert!(refresher.refresh(&ids).await.is_committed());
    assert!(refresher.batch_endpoint_available());

    cluster.set_db_table(DbTableMode::Serve);
    cluster.set_version(11);
    cluster.clear_requests();

    let outcome = refresher.refresh(&ids).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            version: 11,
            strategy: Strategy::Batched,
            ..
        }
    ));
    assert_eq!(cluster.requests(), vec!["/db-table?table_ids=100"]);
}

#[tokio::test]
async fn test_batch_decode_error_keeps_endpoint() {
    let cluster = cluster_with_schema(7);
    cluster.set_db_table(DbTableMode::Garbage);
    let refresher = refresher(&cluster);
    let ids = HashSet::from([100, 110]);

    let outcome = refresher.refresh(&ids).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            version: 7,
            strategy: Strategy::FullScan,
            ..
        }
    ));
    assert!(refresher.batch_endpoint_available());
    assert_eq!(
        cluster.requests(),
        vec!["/db-table?table_ids=100,110", "/schema", "/schema/shop"]
    );

    // A malformed body is not a missing endpoint: the next cycle batches again
    cluster.set_db_table(DbTableMode::Serve);
    cluster.set_version(8);
    cluster.clear_requests();

    let outcome = refresher.refresh(&ids).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            version: 8,
            strategy: Strategy::Batched,
            ..
        }
    ));
    assert_eq!(cluster.requests(), vec!["/db-table?table_ids=100,110"]);
}

#[tokio::test]
async fn test_cancelled_cycle_does_not_commit() {
    let cluster = cluster_with_schema(10);
    cluster.set_db_table(DbTableMode::Stall);
    let refresher = refresher(&cluster);
    let ids = HashSet::from([100]);

    let result = tokio::time::timeout(Duration::from_millis(100), refresher.refresh(&ids)).await;

    assert!(result.is_err());
    assert_eq!(refresher.schema_version(), UNSET_SCHEMA_VERSION);
    assert!(refresher.batch_endpoint_available());
    assert_eq!(cluster.db_table_requests().len(), 1);

    // The dropped cycle released its lock; the next one runs and commits
    cluster.set_db_table(DbTableMode::Serve);

    let outcome = refresher.refresh(&ids).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            version: 10,
            strategy: Strategy::Batched,
            ..
        }
    ));
    assert_eq!(refresher.schema_version(), 10);
}

#[tokio::test]
async fn test_partial_batches_commit_only_with_full_scan() {
    let cluster = FakeCluster::new(10);
    cluster.set_db_table(DbTableMode::FailAfter(3));
    let refresher = refresher(&cluster);
    let ids: HashSet<i64> = (1..=2000).collect();

    // Full scan fails too: nothing is committed
    let outcome = refresher.refresh(&ids).await;

    match outcome {
        RefreshOutcome::Incomplete { applied, error, .. } => {
            assert_eq!(applied, 3 * 512);
            assert!(matches!(error, RefreshError::Client(_)));
        }
        other => panic!("expected incomplete refresh, got {:?}", other),
    }
    assert_eq!(cluster.db_table_requests().len(), 4);
    assert_eq!(refresher.schema_version(), UNSET_SCHEMA_VERSION);
    assert!(refresher.batch_endpoint_available());
    // Applied batches stay visible
    assert_eq!(refresher.labels().len(), 3 * 512);

    // Full scan succeeds on the next cycle: the fallback alone commits
    cluster.serve("/schema", SCHEMA);
    cluster.serve("/schema/shop", SHOP_TABLES);
    cluster.set_db_table(DbTableMode::FailAfter(3));
    *cluster.db_table_served.lock().unwrap() = 0;

    let outcome = refresher.refresh(&ids).await;

    assert!(matches!(
        outcome,
        RefreshOutcome::Committed {
            version: 10,
            strategy: Strategy::FullScan,
            ..
        }
    ));
    assert_eq!(refresher.schema_version(), 10);
}

#[tokio::test]
async fn test_settings_batch_size_is_honored() {
    let cluster = cluster_with_schema(10);
    let settings = RefreshSettings {
        batch_size: 2,
        ..RefreshSettings::default()
    };
    let refresher = LabelRefresher::with_settings(cluster.clone(), cluster.clone(), settings);

    let outcome = refresher.refresh(&HashSet::from([5, 6, 7])).await;

    assert!(outcome.is_committed());
    assert_eq!(
        cluster.db_table_requests(),
        vec!["/db-table?table_ids=5,6", "/db-table?table_ids=7"]
    );
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_run_during_refresh() {
    let cluster = cluster_with_schema(10);
    let refresher = Arc::new(refresher(&cluster));
    let labels = refresher.labels();
    let ids: HashSet<i64> = (1..=5000).collect();

    let writer = {
        let refresher = refresher.clone();
        tokio::spawn(async move { refresher.refresh(&ids).await })
    };

    let reader = tokio::task::spawn_blocking(move || {
        let mut seen = 0;
        for id in (1..=5000).cycle().take(50_000) {
            if let Some(label) = labels.get(id) {
                assert_eq!(label.name, format!("t{}", id));
                seen += 1;
            }
        }
        seen
    });

    assert!(writer.await.unwrap().is_committed());
    reader.await.unwrap();
    assert_eq!(refresher.labels().len(), 5000);
}

#[tokio::test]
async fn test_only_database_failing_leaves_map_empty() {
    let cluster = cluster_with_schema(10);
    cluster.unserve("/schema/shop");
    let refresher = refresher(&cluster);

    let outcome = refresher.refresh(&HashSet::new()).await;

    assert!(!outcome.is_committed());
    assert!(refresher.labels().is_empty());
}
