//! Schema fetch strategies.
//!
//! - [`BatchFetcher`] asks `/db-table` for exactly the table ids the caller
//!   cares about, in fixed-size batches.
//! - [`FullScanFetcher`] lists every database through `/schema` and then
//!   every table of each database through `/schema/{db}`.
//!
//! Both write into the [`LabelMap`] as soon as a response is decoded, so
//! readers may observe a partially refreshed map.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;

use super::error::{RefreshError, RefreshResult};
use super::label::{build_db_table_labels, build_labels, LabelMap};
use super::model::{DbInfo, DbTableInfo, TableInfo};
use crate::client::MetadataClient;

/// Number of table ids per `/db-table` request.
pub const DEFAULT_BATCH_SIZE: usize = 512;

/// Path listing every database.
pub const SCHEMA_PATH: &str = "/schema";

/// Summary of one strategy run.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Requests issued.
    pub requests: usize,
    /// Labels written to the map.
    pub applied: usize,
    /// Why the run is incomplete, if it is.
    pub error: Option<RefreshError>,
}

impl FetchReport {
    /// Check if every unit of the run was applied.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Build the `/db-table` path for a batch of table ids.
pub fn batch_path(ids: &[i64]) -> String {
    let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
    format!("/db-table?table_ids={}", ids.join(","))
}

/// Build the table listing path of a database.
pub fn database_path(name: &str) -> String {
    format!("{}/{}", SCHEMA_PATH, urlencoding::encode(name))
}

/// Issue a request and decode its JSON body.
async fn request_json<T: DeserializeOwned>(
    client: &dyn MetadataClient,
    path: &str,
) -> RefreshResult<T> {
    let body = client.request(path).await?;
    serde_json::from_slice(&body).map_err(|e| RefreshError::decode(path, e))
}

/// Targeted fetch of known table ids through `/db-table`.
pub struct BatchFetcher<'a> {
    client: &'a dyn MetadataClient,
    labels: &'a LabelMap,
    batch_size: usize,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(client: &'a dyn MetadataClient, labels: &'a LabelMap) -> Self {
        Self {
            client,
            labels,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of ids per request (at least one).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Fetch and apply labels for `ids`, one batch at a time.
    ///
    /// Stops at the first failed batch. A missing endpoint is reported as
    /// [`RefreshError::EndpointUnavailable`]. An empty id set issues no
    /// requests and is complete.
    pub async fn fetch(&self, ids: &HashSet<i64>) -> FetchReport {
        let mut report = FetchReport::default();
        tracing::debug!(ids = ids.len(), "updating table infos by ids");

        let mut ids: Vec<i64> = ids.iter().copied().collect();
        ids.sort_unstable();

        for batch in ids.chunks(self.batch_size) {
            let path = batch_path(batch);
            report.requests += 1;

            let entries =
                match request_json::<Option<HashMap<i64, DbTableInfo>>>(self.client, &path).await {
                    Ok(entries) => entries.unwrap_or_default(),
                    Err(RefreshError::Client(e)) if e.is_not_found() => {
                        tracing::debug!(error = %e, "batched table endpoint not found");
                        report.error = Some(RefreshError::EndpointUnavailable);
                        break;
                    }
                    Err(e) => {
                        tracing::error!(
                            batch = batch.len(),
                            first_id = batch[0],
                            error = %e,
                            "fail to send schema request"
                        );
                        report.error = Some(e);
                        break;
                    }
                };

            for entry in entries.values() {
                report.applied += self.labels.extend(build_db_table_labels(entry));
            }
        }

        report
    }
}

/// Fallback fetch of every table of every live database.
pub struct FullScanFetcher<'a> {
    client: &'a dyn MetadataClient,
    labels: &'a LabelMap,
}

impl<'a> FullScanFetcher<'a> {
    pub fn new(client: &'a dyn MetadataClient, labels: &'a LabelMap) -> Self {
        Self { client, labels }
    }

    /// List all databases and apply the tables of each one.
    ///
    /// Databases in the absent state are skipped without a request. A
    /// failed database is skipped, leaving its existing labels alone, and
    /// marks the run incomplete; the remaining databases are still scanned.
    pub async fn fetch(&self) -> FetchReport {
        let mut report = FetchReport {
            requests: 1,
            ..FetchReport::default()
        };

        let databases = match request_json::<Option<Vec<DbInfo>>>(self.client, SCHEMA_PATH).await {
            Ok(databases) => databases.unwrap_or_default(),
            Err(e) => {
                tracing::error!(error = %e, "fail to send schema request");
                report.error = Some(e);
                return report;
            }
        };

        let mut attempted = 0;
        let mut failed = 0;
        for db in databases.iter().filter(|db| !db.state.is_absent()) {
            let name = db.name.as_str();
            let path = database_path(name);
            attempted += 1;
            report.requests += 1;

            match request_json::<Option<Vec<TableInfo>>>(self.client, &path).await {
                Ok(tables) => {
                    for table in tables.unwrap_or_default() {
                        report.applied += self.labels.extend(build_labels(name, &table));
                    }
                }
                Err(e) => {
                    tracing::error!(database = name, error = %e, "fail to send schema request");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            report.error = Some(RefreshError::PartialApply {
                failed,
                total: attempted,
            });
        }
        report
    }
}
