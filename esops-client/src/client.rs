//! Elasticsearch client implementation.

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bulk::{ActionFramer, BulkBatcher, BulkOptions, IndexAction, UpdateAction};
use crate::config::{EsClientConfig, ErrorPolicy};
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::error::{EsClientError, Result};
use crate::paths;
use crate::query::{RootQuery, UpdateStatement};
use crate::result::{ByQueryResult, NodeInfo, Page, RefreshResult, WriteResult};
use crate::scroll::{PageFuture, PageIter, ScrollCursor};
use crate::selector::EndpointSelector;
use crate::transport::{HttpTransport, Transport};

/// Elasticsearch client for document, search and bulk operations.
///
/// Cloning is cheap; clones share the host pool and its health state.
#[derive(Clone)]
pub struct EsClient {
    dispatcher: Dispatcher,
    config: Arc<EsClientConfig>,
}

impl EsClient {
    /// Create a client over HTTP.
    pub fn new(config: EsClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client from `ESOPS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(EsClientConfig::from_env()?)
    }

    /// Create a client over a custom transport.
    pub fn with_transport(config: EsClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        info!("Initializing Elasticsearch client for: {:?}", config.hosts);

        let selector = EndpointSelector::from_urls(&config.hosts, config.cool_down)?;
        let dispatcher = Dispatcher::new(Arc::new(selector), transport, config.error_policy);

        Ok(Self {
            dispatcher,
            config: Arc::new(config),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &EsClientConfig {
        &self.config
    }

    /// Get the request dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Get the host pool.
    pub fn selector(&self) -> &EndpointSelector {
        self.dispatcher.selector()
    }

    fn doc_path(&self, index: &str, id: &str) -> String {
        paths::document(index, &self.config.doc_type, id)
    }

    // Map "not found" to an absent value, and under best-effort handling any
    // other error status too.
    fn absent_on_error<T>(&self, result: Result<Option<T>>) -> Result<Option<T>> {
        match result {
            Err(e) if e.is_not_found() => Ok(None),
            Err(EsClientError::Application { status, reason })
                if self.dispatcher.policy() == ErrorPolicy::BestEffort =>
            {
                warn!(status, reason = %reason, "Ignoring error response");
                Ok(None)
            }
            other => other,
        }
    }

    // =========================================================================
    // Cluster and Index Operations
    // =========================================================================

    /// Get node and version information.
    pub async fn info(&self) -> Result<Option<NodeInfo>> {
        self.dispatcher.execute(DispatchRequest::get(""), decode_json).await
    }

    /// Get the mappings of an index.
    pub async fn mappings(&self, index: &str) -> Result<Option<Value>> {
        let path = paths::join(&[&paths::segment(index), "_mappings"]);
        let request = DispatchRequest::get(path);
        self.dispatcher
            .execute(request, |body| {
                let mut all: Value = serde_json::from_slice(&body)?;
                all.get_mut(index)
                    .map(Value::take)
                    .ok_or_else(|| EsClientError::Protocol(format!("No mappings for {}", index)))
            })
            .await
    }

    /// Get the index-level settings of an index.
    pub async fn settings(&self, index: &str) -> Result<Option<Value>> {
        let path = paths::join(&[&paths::segment(index), "_settings"]);
        let request = DispatchRequest::get(path);
        self.dispatcher
            .execute(request, |body| {
                let mut all: Value = serde_json::from_slice(&body)?;
                all.pointer_mut(&format!("/{}/settings/index", index))
                    .map(Value::take)
                    .ok_or_else(|| EsClientError::Protocol(format!("No settings for {}", index)))
            })
            .await
    }

    /// Check whether an index (or alias) exists.
    pub async fn exists(&self, index: &str) -> Result<bool> {
        let result = self
            .dispatcher
            .execute_with_policy(
                DispatchRequest::head(paths::segment(index)),
                ErrorPolicy::Propagate,
                |_| Ok(true),
            )
            .await;

        Ok(self.absent_on_error(result)?.unwrap_or(false))
    }

    /// Create an index unless it already exists.
    ///
    /// Returns `true` if the index was created by this call.
    pub async fn create_index(&self, index: &str, definition: &Value) -> Result<bool> {
        if self.exists(index).await? {
            debug!("Index {} already exists", index);
            return Ok(false);
        }

        info!("Creating index: {}", index);
        let request =
            DispatchRequest::put(paths::segment(index)).json(serde_json::to_vec(definition)?);
        Ok(self.dispatcher.execute(request, |_| Ok(())).await?.is_some())
    }

    /// Delete an index if it exists.
    ///
    /// Returns `true` if the index was deleted by this call.
    pub async fn delete_index(&self, index: &str) -> Result<bool> {
        if !self.exists(index).await? {
            debug!("Index {} does not exist", index);
            return Ok(false);
        }

        info!("Deleting index: {}", index);
        let request = DispatchRequest::delete(paths::segment(index));
        Ok(self.dispatcher.execute(request, |_| Ok(())).await?.is_some())
    }

    /// Refresh an index so recent writes become searchable.
    pub async fn refresh(&self, index: &str) -> Result<Option<RefreshResult>> {
        let path = paths::join(&[&paths::segment(index), "_refresh"]);
        let request = DispatchRequest::post(path);
        self.dispatcher.execute(request, decode_json).await
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Index a document under a server-assigned ID.
    pub async fn insert<T: Serialize>(&self, index: &str, doc: &T) -> Result<Option<WriteResult>> {
        self.insert_raw(index, serde_json::to_vec(doc)?).await
    }

    /// Index a pre-serialized document under a server-assigned ID.
    pub async fn insert_raw(
        &self,
        index: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Option<WriteResult>> {
        debug!("Inserting document in index {}", index);
        let path = paths::join(&[&paths::segment(index), &self.config.doc_type]);
        let request = DispatchRequest::post(path).json(payload);
        self.dispatcher.execute(request, decode_json).await
    }

    /// Create or replace the document with the given ID.
    pub async fn save_or_update<T: Serialize>(
        &self,
        index: &str,
        id: &str,
        doc: &T,
    ) -> Result<Option<WriteResult>> {
        self.save_or_update_raw(index, id, serde_json::to_vec(doc)?).await
    }

    /// Create or replace the document with the given ID from a pre-serialized payload.
    pub async fn save_or_update_raw(
        &self,
        index: &str,
        id: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Option<WriteResult>> {
        debug!("Saving document {} in index {}", id, index);
        let request = DispatchRequest::put(self.doc_path(index, id)).json(payload);
        self.dispatcher.execute(request, decode_json).await
    }

    /// Merge `partial` into the existing document.
    pub async fn partial_update<T: Serialize>(
        &self,
        index: &str,
        id: &str,
        partial: &T,
    ) -> Result<Option<WriteResult>> {
        let body = serde_json::to_vec(&json!({ "doc": partial }))?;
        self.partial_update_raw(index, id, body).await
    }

    /// Send a pre-serialized update body (`{"doc": ..}` or `{"script": ..}`).
    pub async fn partial_update_raw(
        &self,
        index: &str,
        id: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Option<WriteResult>> {
        debug!("Updating document {} in index {}", id, index);
        let path = format!("{}/_update", self.doc_path(index, id));
        let request = DispatchRequest::post(path).json(payload);
        self.dispatcher.execute(request, decode_json).await
    }

    /// Fetch a document source by ID, optionally projected to `fields`.
    ///
    /// A missing document resolves to `None`.
    pub async fn lookup<T: DeserializeOwned>(
        &self,
        index: &str,
        id: &str,
        fields: &[&str],
    ) -> Result<Option<T>> {
        let path = paths::single_projection(index, &self.config.doc_type, id, fields);
        let result = self
            .dispatcher
            .execute_with_policy(DispatchRequest::get(path), ErrorPolicy::Propagate, |body| {
                let mut doc: Value = serde_json::from_slice(&body)?;
                match doc.get_mut("_source").map(Value::take) {
                    Some(source) => Ok(Some(serde_json::from_value(source)?)),
                    None => Ok(None),
                }
            })
            .await;

        Ok(self.absent_on_error(result)?.flatten())
    }

    // =========================================================================
    // Search Operations
    // =========================================================================

    /// Run a search and decode hit sources as `T`.
    ///
    /// A non-empty `fields` list restricts returned sources to those fields.
    pub async fn query<T: DeserializeOwned>(
        &self,
        index: &str,
        query: &RootQuery,
        fields: &[&str],
    ) -> Result<Option<Page<T>>> {
        let request =
            DispatchRequest::post(paths::search(index, fields, None)).json(query.to_body()?);
        self.dispatcher
            .execute(request, |body| Page::from_slice(&body))
            .await
    }

    /// Run a search returning raw JSON sources.
    pub async fn query_raw(
        &self,
        index: &str,
        query: &RootQuery,
        fields: &[&str],
    ) -> Result<Option<Page<Value>>> {
        self.query(index, query, fields).await
    }

    /// Count documents matching a query.
    pub async fn count(&self, index: &str, query: &RootQuery) -> Result<Option<u64>> {
        let path = paths::join(&[&paths::segment(index), "_count?filter_path=count"]);
        let request = DispatchRequest::post(path).json(query.to_count_body()?);
        self.dispatcher
            .execute(request, |body| {
                let value: Value = serde_json::from_slice(&body)?;
                value["count"]
                    .as_u64()
                    .ok_or_else(|| EsClientError::Protocol("Missing count".to_string()))
            })
            .await
    }

    /// Open a scroll over a search.
    ///
    /// The first page is requested when the cursor is first consumed. Each
    /// continuation resubmits the scroll token with the query's scroll
    /// lifetime (or the configured default).
    pub fn scroll<T>(
        &self,
        index: &str,
        query: &RootQuery,
        fields: &[&str],
    ) -> Result<ScrollCursor<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let ttl = query.scroll_ttl_or(self.config.scroll_ttl);
        let request =
            DispatchRequest::post(paths::search(index, fields, Some(ttl))).json(query.to_body()?);

        debug!("Opening scroll on index {} (ttl {:?})", index, ttl);

        let dispatcher = self.dispatcher.clone();
        let head: PageFuture<T> = Box::pin(async move {
            dispatcher
                .execute(request, |body| Page::from_slice(&body))
                .await
        });

        let dispatcher = self.dispatcher.clone();
        let scroll = paths::ttl_param(ttl);
        let next = move |scroll_id: String| -> PageFuture<T> {
            let dispatcher = dispatcher.clone();
            let body = json!({ "scroll_id": scroll_id, "scroll": scroll });
            Box::pin(async move {
                let request = DispatchRequest::post(paths::scroll_continuation())
                    .json(serde_json::to_vec(&body)?);
                dispatcher
                    .execute(request, |body| Page::from_slice(&body))
                    .await
            })
        };

        Ok(ScrollCursor::new(head, next, self.dispatcher.policy()))
    }

    /// Scroll through a search as an iterator of page futures.
    pub fn stream<T>(&self, index: &str, query: &RootQuery, fields: &[&str]) -> Result<PageIter<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        Ok(self.scroll(index, query, fields)?.pages())
    }

    /// Scroll through a search as an asynchronous stream of pages.
    pub fn async_stream<T>(
        &self,
        index: &str,
        query: &RootQuery,
        fields: &[&str],
    ) -> Result<BoxStream<'static, Result<Page<T>>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        Ok(self.scroll(index, query, fields)?.into_stream())
    }

    // =========================================================================
    // Bulk Operations
    // =========================================================================

    /// Index documents in batches under server-assigned IDs.
    pub fn bulk_insert<T, I>(
        &self,
        index: &str,
        docs: I,
        options: BulkOptions,
    ) -> BulkBatcher<I::IntoIter, IndexAction<T>>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        self.bulk_insert_with(index, docs, IndexAction::new(), options)
    }

    /// Write documents in batches, framing each one with `framer`.
    pub fn bulk_insert_with<I, A>(
        &self,
        index: &str,
        docs: I,
        framer: A,
        options: BulkOptions,
    ) -> BulkBatcher<I::IntoIter, A>
    where
        I: IntoIterator,
        A: ActionFramer<I::Item>,
    {
        let path = paths::join(&[&paths::segment(index), &self.config.doc_type, "_bulk"]);
        let batch_size = self.config.effective_batch_size(options.batch_size);
        BulkBatcher::new(
            self.dispatcher.clone(),
            path,
            docs.into_iter(),
            framer,
            batch_size,
            options.output_items,
        )
    }

    /// Update `(id, payload)` pairs in batches, turning each pair into an
    /// update statement with `statement`.
    pub fn bulk_update<P, I, F>(
        &self,
        index: &str,
        docs: I,
        statement: F,
        options: BulkOptions,
    ) -> BulkBatcher<I::IntoIter, UpdateAction<F>>
    where
        I: IntoIterator<Item = (String, P)>,
        F: FnMut(&str, P) -> UpdateStatement + Send,
    {
        self.bulk_insert_with(index, docs, UpdateAction::new(statement), options)
    }

    // =========================================================================
    // By-Query Operations
    // =========================================================================

    /// Delete every document matching a query, proceeding past version conflicts.
    pub async fn delete_matching(
        &self,
        index: &str,
        query: &RootQuery,
    ) -> Result<Option<ByQueryResult>> {
        info!("Deleting documents by query in index {}", index);
        let path = paths::join(&[&paths::segment(index), "_delete_by_query?conflicts=proceed"]);
        let request = DispatchRequest::post(path).json(query.to_body()?);
        self.dispatcher.execute(request, decode_json).await
    }

    /// Update every document matching a query with the query's script,
    /// proceeding past version conflicts.
    pub async fn update_matching(
        &self,
        index: &str,
        query: &RootQuery,
    ) -> Result<Option<ByQueryResult>> {
        info!("Updating documents by query in index {}", index);
        let path = paths::join(&[&paths::segment(index), "_update_by_query?conflicts=proceed"]);
        let request = DispatchRequest::post(path).json(query.to_body()?);
        self.dispatcher.execute(request, decode_json).await
    }
}

impl std::fmt::Debug for EsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsClient")
            .field("hosts", &self.config.hosts)
            .field("policy", &self.dispatcher.policy())
            .finish()
    }
}

fn decode_json<R: DeserializeOwned>(body: Bytes) -> Result<R> {
    Ok(serde_json::from_slice(&body)?)
}
