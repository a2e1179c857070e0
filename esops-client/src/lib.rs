//! Resilient Elasticsearch client.
//!
//! This crate provides a client for Elasticsearch-compatible clusters with:
//! - Multi-host failover with host cool-down and re-admission
//! - Bulk writes batched into bounded newline-delimited payloads
//! - Scroll searches consumed as page futures or as an async stream
//! - Typed responses for documents, searches and by-query operations
//!
//! # Example
//!
//! ```rust,no_run
//! use esops_client::{BulkOptions, EsClient, EsClientConfig, RootQuery};
//! use futures::TryStreamExt;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Article {
//!     title: String,
//!     views: u64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EsClientConfig::cluster(["http://es-1:9200", "http://es-2:9200"]);
//!     let client = EsClient::new(config)?;
//!
//!     // Index in batches of 500
//!     let articles = (0..10_000).map(|i| Article { title: format!("a-{i}"), views: 0 });
//!     let outcome = client
//!         .bulk_insert("articles", articles, BulkOptions::new().batch_size(500))
//!         .run()
//!         .await?;
//!     println!("bulk took {}ms, errors: {}", outcome.took, outcome.errors);
//!
//!     // Scroll through everything
//!     let mut pages = client.async_stream::<Article>("articles", &RootQuery::match_all(), &[])?;
//!     while let Some(page) = pages.try_next().await? {
//!         println!("{} of {}", page.seen(), page.total());
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod buffer;
mod bulk;
mod client;
mod config;
mod dispatcher;
mod error;
mod paths;
mod query;
mod result;
mod scroll;
mod selector;
mod transport;

pub use buffer::GrowableBuffer;
pub use bulk::{ActionFramer, BatchFuture, BulkBatcher, BulkOptions, IndexAction, UpdateAction};
pub use client::EsClient;
pub use config::{
    DEFAULT_BATCH_SIZE, EsClientConfig, EsClientConfigBuilder, ErrorPolicy, MAX_BATCH_SIZE,
    clamp_batch_size,
};
pub use dispatcher::{DispatchRequest, Dispatcher};
pub use error::{EsClientError, Result};
pub use query::{RootQuery, Script, SortOrder, UpdateStatement};
pub use result::{
    BulkItem, BulkItemError, BulkItemStatus, BulkOutcome, ByQueryResult, Hit, NodeInfo, Page,
    RefreshResult, Retries, ShardStats, VersionInfo, WriteResult,
};
pub use scroll::{Continuation, PageFuture, PageIter, ScrollCursor};
pub use selector::{Candidates, Endpoint, EndpointSelector};
pub use transport::{HttpTransport, RawResponse, Transport, TransportRequest};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        BulkOptions, BulkOutcome, EsClient, EsClientConfig, EsClientError, ErrorPolicy, Page,
        Result, RootQuery, SortOrder, UpdateStatement,
    };
}
