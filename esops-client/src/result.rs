//! Typed response payloads.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EsClientError, Result};

/// Shard statistics attached to most responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    /// Shards addressed.
    #[serde(default)]
    pub total: u64,
    /// Shards that succeeded.
    #[serde(default)]
    pub successful: u64,
    /// Shards skipped.
    #[serde(default)]
    pub skipped: u64,
    /// Shards that failed.
    #[serde(default)]
    pub failed: u64,
}

impl ShardStats {
    /// Whether no shard failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<T> {
    /// Document ID.
    pub id: String,
    /// Document source, absent when the projection filtered it out.
    pub source: Option<T>,
}

/// One page of a search or scroll response.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Time taken in milliseconds.
    pub took: u64,
    /// Whether the search timed out.
    pub timed_out: bool,
    /// Shard statistics.
    pub shards: Option<ShardStats>,
    /// Total matching documents.
    pub total: u64,
    /// Total relation ("eq" or "gte") when reported.
    pub total_relation: Option<String>,
    /// Hits carried by this page.
    pub hits: Vec<Hit<T>>,
    /// Scroll token for the next page.
    pub scroll_id: Option<String>,
    /// Raw aggregation results.
    pub aggregations: Option<Value>,
    seen: u64,
}

impl<T> Page<T> {
    /// Whether every matching hit has been delivered, counting earlier pages of
    /// the same cursor.
    pub fn is_complete(&self) -> bool {
        self.seen >= self.total
    }

    /// Whether this page carries no hits.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Whether a cursor must stop after this page.
    pub fn is_empty_or_complete(&self) -> bool {
        self.is_empty() || self.is_complete()
    }

    /// Scroll token, if the server issued one.
    pub fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Total matching documents.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Hits delivered so far by the cursor, this page included.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Number of hits on this page.
    pub fn size(&self) -> usize {
        self.hits.len()
    }

    /// Source of the first hit.
    pub fn first(&self) -> Option<&T> {
        self.hits.first().and_then(|h| h.source.as_ref())
    }

    /// Source of the last hit.
    pub fn last(&self) -> Option<&T> {
        self.hits.last().and_then(|h| h.source.as_ref())
    }

    /// IDs of the hits, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }

    /// Sources of the hits, in order.
    pub fn values(&self) -> Vec<&T> {
        self.hits.iter().filter_map(|h| h.source.as_ref()).collect()
    }

    /// Consume the page, keeping only the sources.
    pub fn into_values(self) -> Vec<T> {
        self.hits.into_iter().filter_map(|h| h.source).collect()
    }

    /// Count this page on top of `seen_before` hits from earlier pages.
    pub(crate) fn accumulate(&mut self, seen_before: u64) {
        self.seen = seen_before + self.hits.len() as u64;
    }
}

impl<T: DeserializeOwned> Page<T> {
    /// Decode a (possibly `filter_path`-projected) search response body.
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let raw: RawPage = serde_json::from_slice(body)
            .map_err(|e| EsClientError::Protocol(format!("Malformed search response: {}", e)))?;

        let (total, total_relation, raw_hits) = match raw.hits {
            Some(hits) => {
                let (total, relation) = hits.total.into_parts();
                (total, relation, hits.hits)
            }
            None => (0, None, Vec::new()),
        };

        let hits = raw_hits
            .into_iter()
            .map(|hit| {
                let source = hit
                    .source
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(|e| {
                        EsClientError::Protocol(format!(
                            "Undecodable _source for {}: {}",
                            hit.id, e
                        ))
                    })?;
                Ok(Hit {
                    id: hit.id,
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let seen = hits.len() as u64;
        Ok(Self {
            took: raw.took,
            timed_out: raw.timed_out,
            shards: raw.shards,
            total,
            total_relation,
            hits,
            scroll_id: raw.scroll_id,
            aggregations: raw.aggregations,
            seen,
        })
    }
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default, deserialize_with = "lenient_u64")]
    took: u64,
    #[serde(default)]
    timed_out: bool,
    #[serde(rename = "_shards")]
    shards: Option<ShardStats>,
    hits: Option<RawHits>,
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    aggregations: Option<Value>,
}

#[derive(Deserialize)]
struct RawHits {
    #[serde(default)]
    total: TotalHits,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_source")]
    source: Option<Value>,
}

// Older clusters report a bare number, newer ones `{value, relation}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TotalHits {
    Count(u64),
    Object {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
}

impl Default for TotalHits {
    fn default() -> Self {
        TotalHits::Count(0)
    }
}

impl TotalHits {
    fn into_parts(self) -> (u64, Option<String>) {
        match self {
            TotalHits::Count(total) => (total, None),
            TotalHits::Object { value, relation } => (value, relation),
        }
    }
}

/// Aggregated result of one or more bulk requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    /// Time taken in milliseconds, summed over merged batches.
    #[serde(default, deserialize_with = "lenient_u64")]
    pub took: u64,
    /// Whether any item failed.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub errors: bool,
    /// Per-item results, only kept when item output was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<BulkItem>>,
}

#[derive(Deserialize)]
struct ShallowOutcome {
    #[serde(default, deserialize_with = "lenient_u64")]
    took: u64,
    #[serde(default, deserialize_with = "lenient_bool")]
    errors: bool,
}

impl BulkOutcome {
    /// Decode a `_bulk` response. Items are skipped entirely unless `deep`.
    pub fn decode(body: &[u8], deep: bool) -> Result<Self> {
        let malformed = |e: serde_json::Error| {
            EsClientError::Protocol(format!("Malformed bulk response: {}", e))
        };

        if deep {
            let mut outcome: BulkOutcome = serde_json::from_slice(body).map_err(malformed)?;
            outcome.items.get_or_insert_with(Vec::new);
            Ok(outcome)
        } else {
            let shallow: ShallowOutcome = serde_json::from_slice(body).map_err(malformed)?;
            Ok(Self {
                took: shallow.took,
                errors: shallow.errors,
                items: None,
            })
        }
    }

    /// Whether any merged batch reported errors.
    pub fn has_errors(&self) -> bool {
        self.errors
    }

    /// Total time taken.
    pub fn taken(&self) -> u64 {
        self.took
    }

    /// Per-item results (empty unless item output was requested).
    pub fn items(&self) -> &[BulkItem] {
        self.items.as_deref().unwrap_or_default()
    }

    /// Items that did not succeed.
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItem> {
        self.items().iter().filter(|item| !item.is_success())
    }

    /// Fold another outcome into this one.
    ///
    /// Times add up, any failing side taints the result, and item lists are
    /// concatenated in order.
    pub fn merge(mut self, other: BulkOutcome) -> Self {
        self.took += other.took;
        self.errors = self.errors || other.errors;
        self.items = match (self.items, other.items) {
            (Some(mut mine), Some(theirs)) => {
                mine.extend(theirs);
                Some(mine)
            }
            (None, theirs) => theirs,
            (mine, None) => mine,
        };
        self
    }
}

/// Individual bulk item result, keyed by action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkItem {
    /// Index result.
    Index(BulkItemStatus),
    /// Create result.
    Create(BulkItemStatus),
    /// Update result.
    Update(BulkItemStatus),
    /// Delete result.
    Delete(BulkItemStatus),
}

impl BulkItem {
    /// Action name.
    pub fn action(&self) -> &'static str {
        match self {
            BulkItem::Index(_) => "index",
            BulkItem::Create(_) => "create",
            BulkItem::Update(_) => "update",
            BulkItem::Delete(_) => "delete",
        }
    }

    /// Status details.
    pub fn detail(&self) -> &BulkItemStatus {
        match self {
            BulkItem::Index(s)
            | BulkItem::Create(s)
            | BulkItem::Update(s)
            | BulkItem::Delete(s) => s,
        }
    }

    /// Document ID.
    pub fn id(&self) -> &str {
        &self.detail().id
    }

    /// HTTP status of the item.
    pub fn status(&self) -> u16 {
        self.detail().status
    }

    /// Check if the item succeeded.
    pub fn is_success(&self) -> bool {
        self.detail().is_success()
    }
}

/// Status of a bulk item operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemStatus {
    /// Index name.
    #[serde(rename = "_index", default)]
    pub index: String,
    /// Document ID.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Document version.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// Result ("created", "updated", ...).
    #[serde(default)]
    pub result: Option<String>,
    /// HTTP status code.
    pub status: u16,
    /// Error details.
    #[serde(default)]
    pub error: Option<BulkItemError>,
}

impl BulkItemStatus {
    /// Check if the operation was successful.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Bulk item error details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemError {
    /// Error type.
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// Error reason.
    #[serde(default)]
    pub reason: String,
}

/// Retry counters of a by-query operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retries {
    /// Bulk retries.
    #[serde(default)]
    pub bulk: u64,
    /// Search retries.
    #[serde(default)]
    pub search: u64,
}

/// Result of `_delete_by_query` or `_update_by_query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByQueryResult {
    /// Time taken in milliseconds.
    pub took: u64,
    /// Whether the operation timed out.
    pub timed_out: bool,
    /// Documents processed.
    pub total: u64,
    /// Documents updated.
    pub updated: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Scroll batches pulled.
    pub batches: u64,
    /// Version conflicts hit.
    pub version_conflicts: u64,
    /// Documents left unchanged.
    pub noops: u64,
    /// Retry counters.
    pub retries: Retries,
    /// Time spent throttled.
    pub throttled_millis: u64,
    /// Requests per second (-1 when unthrottled).
    pub requests_per_second: f64,
    /// Time until the next throttled request.
    pub throttled_until_millis: u64,
    /// Per-document failures.
    pub failures: Vec<Value>,
    /// Task ID when run asynchronously.
    pub task: Option<String>,
}

impl ByQueryResult {
    /// Whether the operation ran without failures.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.timed_out
    }
}

/// Result of a single document write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Index name.
    #[serde(rename = "_index", default)]
    pub index: String,
    /// Document type, on clusters that still report it.
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Document ID.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Document version.
    #[serde(rename = "_version", default)]
    pub version: Option<i64>,
    /// Result ("created", "updated", "noop", ...).
    #[serde(default)]
    pub result: Option<String>,
    /// Shard statistics.
    #[serde(rename = "_shards", default)]
    pub shards: Option<ShardStats>,
    /// Sequence number.
    #[serde(rename = "_seq_no", default)]
    pub seq_no: Option<i64>,
    /// Primary term.
    #[serde(rename = "_primary_term", default)]
    pub primary_term: Option<i64>,
}

impl WriteResult {
    /// Whether the write created a new document.
    pub fn is_created(&self) -> bool {
        self.result.as_deref() == Some("created")
    }

    /// Whether the write changed an existing document.
    pub fn is_updated(&self) -> bool {
        self.result.as_deref() == Some("updated")
    }
}

/// Result of an index refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshResult {
    /// Shard statistics.
    #[serde(rename = "_shards", default)]
    pub shards: ShardStats,
}

/// Version block of the root endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    /// Version number.
    pub number: String,
    /// Build flavor.
    pub build_flavor: Option<String>,
    /// Lucene version.
    pub lucene_version: Option<String>,
    /// Oldest wire-compatible version.
    pub minimum_wire_compatibility_version: Option<String>,
}

/// Response of the root endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// Cluster name.
    pub cluster_name: String,
    /// Cluster UUID.
    pub cluster_uuid: Option<String>,
    /// Version details.
    pub version: VersionInfo,
    /// Tagline.
    pub tagline: Option<String>,
}

// Some proxies and older nodes send numbers and booleans as strings.
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(b) => Ok(b),
        Raw::Text(s) => Ok(s.trim() == "true"),
    }
}
