//! Search request bodies and update statements.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;

use crate::error::Result;

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Painless script with parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Script source.
    pub source: String,
    /// Script language.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
    /// Script parameters.
    #[serde(skip_serializing_if = "Map::is_empty", default)]
    pub params: Map<String, Value>,
}

impl Script {
    /// Create a painless script.
    pub fn painless(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            lang: Some("painless".to_string()),
            params: Map::new(),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Top-level search request body.
///
/// Also used for count, scroll and by-query requests. `scroll_ttl` only
/// affects the request path and is never serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootQuery {
    /// Offset of the first hit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Whether to return document sources.
    #[serde(rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<bool>,
    /// Query clause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    /// Sort clauses.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sort: Vec<Value>,
    /// Sort values of the last hit of the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_after: Option<Vec<Value>>,
    /// Aggregations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggs: Option<Map<String, Value>>,
    /// Script applied by update-by-query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    /// Scroll context lifetime for this query.
    #[serde(skip)]
    pub scroll_ttl: Option<Duration>,
}

impl RootQuery {
    /// Create an empty query (matches everything server-side).
    pub fn new() -> Self {
        Self::default()
    }

    /// Match all documents.
    pub fn match_all() -> Self {
        Self::new().with_query(json!({ "match_all": {} }))
    }

    /// Exact match on a field.
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Self::new().with_query(json!({ "term": { field: value.into() } }))
    }

    /// Full-text match on a field.
    pub fn matching(field: &str, text: impl Into<Value>) -> Self {
        Self::new().with_query(json!({ "match": { field: text.into() } }))
    }

    /// Set the query clause.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Set the offset of the first hit.
    pub fn starting_at(mut self, from: u64) -> Self {
        self.from = Some(from);
        self
    }

    /// Set the page size.
    pub fn limit(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Enable or disable document sources.
    pub fn with_source(mut self, enabled: bool) -> Self {
        self.source = Some(enabled);
        self
    }

    /// Add a sort clause.
    pub fn sort_by(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push(json!({ field: { "order": order.as_str() } }));
        self
    }

    /// Continue after the given sort values.
    pub fn search_after(mut self, values: Vec<Value>) -> Self {
        self.search_after = Some(values);
        self
    }

    /// Add a named aggregation.
    pub fn aggregation(mut self, name: impl Into<String>, aggregation: Value) -> Self {
        self.aggs
            .get_or_insert_with(Map::new)
            .insert(name.into(), aggregation);
        self
    }

    /// Attach a script (update-by-query).
    pub fn script(mut self, script: Script) -> Self {
        self.script = Some(script);
        self
    }

    /// Set the scroll context lifetime.
    pub fn scroll_ttl(mut self, ttl: Duration) -> Self {
        self.scroll_ttl = Some(ttl);
        self
    }

    /// Scroll lifetime to use, with anything under a second replaced by `default`.
    pub fn scroll_ttl_or(&self, default: Duration) -> Duration {
        match self.scroll_ttl {
            Some(ttl) if ttl >= Duration::from_secs(1) => ttl,
            _ => default,
        }
    }

    /// Serialize the request body.
    pub fn to_body(&self) -> Result<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }

    /// Serialize only the query clause, as accepted by `_count`.
    pub fn to_count_body(&self) -> Result<Bytes> {
        let body = match &self.query {
            Some(query) => json!({ "query": query }),
            None => json!({}),
        };
        Ok(serde_json::to_vec(&body)?.into())
    }
}

/// Update directive applied to one document of a bulk update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UpdateStatement {
    /// Partial document merge.
    Doc {
        /// Fields to merge.
        doc: Value,
        /// Insert `doc` when the document is missing.
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        doc_as_upsert: bool,
    },
    /// Scripted update.
    Script {
        /// Script to run.
        script: Script,
        /// Document to insert when missing.
        #[serde(skip_serializing_if = "Option::is_none")]
        upsert: Option<Value>,
    },
}

impl UpdateStatement {
    /// Merge `doc` into the existing document.
    pub fn doc(doc: impl Into<Value>) -> Self {
        UpdateStatement::Doc {
            doc: doc.into(),
            doc_as_upsert: false,
        }
    }

    /// Merge `doc`, inserting it when the document is missing.
    pub fn upsert(doc: impl Into<Value>) -> Self {
        UpdateStatement::Doc {
            doc: doc.into(),
            doc_as_upsert: true,
        }
    }

    /// Run a script against the document.
    pub fn script(script: Script) -> Self {
        UpdateStatement::Script {
            script,
            upsert: None,
        }
    }

    /// Run a script, inserting `upsert` when the document is missing.
    pub fn script_with_upsert(script: Script, upsert: impl Into<Value>) -> Self {
        UpdateStatement::Script {
            script,
            upsert: Some(upsert.into()),
        }
    }
}
