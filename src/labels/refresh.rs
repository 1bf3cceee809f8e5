//! Refresh orchestration.
//!
//! One call to [`LabelRefresher::refresh`] runs a full cycle:
//!
//! ```text
//! Idle ─▶ VersionCheck ──unchanged / unavailable──▶ Skip
//!              │
//!              ├─ batched eligible ─▶ BatchAttempt ──all batches ok──▶ Commit
//!              │                           │
//!              │                           └─ any batch failed ─┐
//!              │                                                ▼
//!              └─ not eligible ─────────────────────────────▶ FullScan
//!                                                               │
//!                                          every db ok ─▶ Commit │ else ─▶ NoCommit
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use super::error::RefreshError;
use super::fetch::{BatchFetcher, FullScanFetcher};
use super::label::{LabelMap, ObjectLabel};
use super::version::{VersionCheck, VersionGate, UNSET_SCHEMA_VERSION};
use crate::client::{HttpMetadataClient, MetadataClient, SchemaVersionSource};
use crate::config::{RefreshSettings, Settings, SettingsError};

/// How a cycle fetches schema descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// `/db-table` for the known table ids.
    Batched,
    /// `/schema` then `/schema/{db}` for every database.
    FullScan,
}

/// Why a cycle did nothing.
#[derive(Debug)]
pub enum SkipReason {
    /// The schema version equals the committed one.
    VersionUnchanged,
    /// The schema version could not be read.
    VersionUnavailable {
        /// No version had been committed yet.
        first_attempt: bool,
        error: RefreshError,
    },
}

/// Result of one refresh cycle.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// No requests beyond the version check were made.
    Skipped(SkipReason),
    /// Every unit was applied and `version` is now committed.
    Committed {
        version: i64,
        strategy: Strategy,
        applied: usize,
    },
    /// Some labels may have been written but the version was not committed.
    Incomplete {
        version: i64,
        applied: usize,
        error: RefreshError,
    },
}

impl RefreshOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Keeps a [`LabelMap`] in sync with the schema.
///
/// The refresher owns the committed schema version and remembers, for its
/// whole lifetime, whether the batched endpoint is missing. Cycles are
/// serialized; readers use [`labels`](Self::labels) or
/// [`lookup`](Self::lookup) at any time.
///
/// # Example
///
/// ```ignore
/// use keylabel::config::Settings;
/// use keylabel::labels::LabelRefresher;
///
/// let refresher = LabelRefresher::from_settings(&Settings::load()?)?;
/// let outcome = refresher.refresh(&recent_table_ids).await;
/// if let Some(label) = refresher.lookup(100) {
///     println!("{}", label);
/// }
/// ```
pub struct LabelRefresher {
    client: Arc<dyn MetadataClient>,
    versions: Arc<dyn SchemaVersionSource>,
    labels: LabelMap,
    settings: RefreshSettings,
    schema_version: AtomicI64,
    batch_endpoint_unavailable: AtomicBool,
    cycle: Mutex<()>,
}

impl LabelRefresher {
    /// Create a refresher with default settings.
    pub fn new(client: Arc<dyn MetadataClient>, versions: Arc<dyn SchemaVersionSource>) -> Self {
        Self::with_settings(client, versions, RefreshSettings::default())
    }

    /// Create a refresher with custom refresh settings.
    pub fn with_settings(
        client: Arc<dyn MetadataClient>,
        versions: Arc<dyn SchemaVersionSource>,
        settings: RefreshSettings,
    ) -> Self {
        Self {
            client,
            versions,
            labels: LabelMap::new(),
            settings,
            schema_version: AtomicI64::new(UNSET_SCHEMA_VERSION),
            batch_endpoint_unavailable: AtomicBool::new(false),
            cycle: Mutex::new(()),
        }
    }

    /// Create a refresher backed by HTTP clients built from settings.
    ///
    /// Fails unless `refresh.schema_version_url` is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        settings.refresh.validate()?;
        let client = Arc::new(HttpMetadataClient::from_settings(settings)?);
        let versions = Arc::new(HttpMetadataClient::version_source_from_settings(settings)?);
        Ok(Self::with_settings(
            client,
            versions,
            settings.refresh.clone(),
        ))
    }

    /// Get a handle to the label map.
    pub fn labels(&self) -> LabelMap {
        self.labels.clone()
    }

    /// Get the label for a table or partition id.
    pub fn lookup(&self, id: i64) -> Option<Arc<ObjectLabel>> {
        self.labels.get(id)
    }

    /// Get the last committed schema version.
    pub fn schema_version(&self) -> i64 {
        self.schema_version.load(Ordering::Acquire)
    }

    /// Check if the batched endpoint may still be used.
    pub fn batch_endpoint_available(&self) -> bool {
        !self.batch_endpoint_unavailable.load(Ordering::Acquire)
    }

    /// Choose the first strategy of a cycle for the given known ids.
    pub fn select_strategy(&self, known_ids: &HashSet<i64>) -> Strategy {
        if self.batch_endpoint_available() && !known_ids.is_empty() {
            Strategy::Batched
        } else {
            Strategy::FullScan
        }
    }

    /// Run one refresh cycle.
    ///
    /// Never fails: errors are logged and only decide whether the new
    /// schema version is committed. Dropping the returned future before it
    /// completes leaves the committed version untouched.
    pub async fn refresh(&self, known_ids: &HashSet<i64>) -> RefreshOutcome {
        let _cycle = self.cycle.lock().await;
        let span = tracing::debug_span!("refresh", cycle = %Uuid::new_v4());
        self.run_cycle(known_ids).instrument(span).await
    }

    async fn run_cycle(&self, known_ids: &HashSet<i64>) -> RefreshOutcome {
        let gate = VersionGate::new(
            self.versions.as_ref(),
            &self.settings.schema_version_key,
            self.settings.version_timeout(),
        );
        let version = match gate.check(self.schema_version()).await {
            VersionCheck::Changed(version) => version,
            VersionCheck::Unchanged(_) => return RefreshOutcome::Skipped(SkipReason::VersionUnchanged),
            VersionCheck::Unavailable {
                first_attempt,
                error,
            } => {
                return RefreshOutcome::Skipped(SkipReason::VersionUnavailable {
                    first_attempt,
                    error,
                })
            }
        };

        let mut applied = 0;
        if self.select_strategy(known_ids) == Strategy::Batched {
            let report = BatchFetcher::new(self.client.as_ref(), &self.labels)
                .with_batch_size(self.settings.batch_size)
                .fetch(known_ids)
                .await;
            applied += report.applied;

            match report.error {
                None => return self.commit(version, Strategy::Batched, applied),
                Some(e) if e.is_endpoint_unavailable() => {
                    self.batch_endpoint_unavailable.store(true, Ordering::Release);
                    tracing::info!("batched table endpoint not supported, using full scans from now on");
                }
                Some(e) => {
                    tracing::debug!(error = %e, applied, "try /db-table failed, fallback to /schema");
                }
            }
        }

        let report = FullScanFetcher::new(self.client.as_ref(), &self.labels)
            .fetch()
            .await;
        applied += report.applied;

        match report.error {
            None => self.commit(version, Strategy::FullScan, applied),
            Some(error) => {
                tracing::warn!(
                    version,
                    applied,
                    error = %error,
                    "schema refresh incomplete, keeping previous version"
                );
                RefreshOutcome::Incomplete {
                    version,
                    applied,
                    error,
                }
            }
        }
    }

    fn commit(&self, version: i64, strategy: Strategy, applied: usize) -> RefreshOutcome {
        self.schema_version.store(version, Ordering::Release);
        tracing::debug!(version, ?strategy, applied, "schema labels refreshed");
        RefreshOutcome::Committed {
            version,
            strategy,
            applied,
        }
    }
}
