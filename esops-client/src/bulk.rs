//! Bulk write batching.
//!
//! A [`BulkBatcher`] pulls documents from an iterator, frames each one as an
//! action line plus a source line into a reused [`GrowableBuffer`], and hands
//! out one lazy request future per batch.

use futures::future::{self, BoxFuture};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use tracing::{debug, warn};

use crate::buffer::GrowableBuffer;
use crate::config::clamp_batch_size;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::error::Result;
use crate::query::UpdateStatement;
use crate::result::BulkOutcome;

/// Future for one dispatched batch.
pub type BatchFuture = BoxFuture<'static, Result<Option<BulkOutcome>>>;

/// Action line of an index operation without an explicit ID.
const INDEX_HEADER: &[u8] = b"{\"index\":{}}\n";

/// Per-call bulk options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOptions {
    /// Actions per request; the configured default when unset.
    pub batch_size: Option<usize>,
    /// Keep per-item results in the outcome.
    pub output_items: bool,
}

impl BulkOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of actions per request.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    /// Keep per-item results.
    pub fn output_items(mut self, enabled: bool) -> Self {
        self.output_items = enabled;
        self
    }
}

/// Writes one document as a complete bulk action.
///
/// Implementations write the action line and the source line, each terminated
/// by `\n`. On error the batcher discards whatever was written.
pub trait ActionFramer<T>: Send {
    /// Frame `doc` into `buffer`.
    fn frame(&mut self, doc: T, buffer: &mut GrowableBuffer) -> Result<()>;
}

type IdFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;
type SinkFn<T> = Box<dyn Fn(&T, &mut GrowableBuffer) -> Result<()> + Send + Sync>;

/// Frames documents as `index` actions.
pub struct IndexAction<T> {
    id_fn: Option<IdFn<T>>,
    sink: Option<SinkFn<T>>,
}

impl<T> IndexAction<T> {
    /// Index every document under a server-assigned ID, serialized with serde.
    pub fn new() -> Self {
        Self {
            id_fn: None,
            sink: None,
        }
    }

    /// Derive the document ID from the document.
    pub fn with_id<F>(mut self, id_fn: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.id_fn = Some(Box::new(id_fn));
        self
    }

    /// Write the source line with a custom serializer instead of serde.
    ///
    /// The sink must not write a trailing newline.
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&T, &mut GrowableBuffer) -> Result<()> + Send + Sync + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }
}

impl<T> Default for IndexAction<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for IndexAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexAction")
            .field("id_fn", &self.id_fn.is_some())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl<T: Serialize> ActionFramer<T> for IndexAction<T> {
    fn frame(&mut self, doc: T, buffer: &mut GrowableBuffer) -> Result<()> {
        match &self.id_fn {
            Some(id_fn) => {
                serde_json::to_writer(&mut *buffer, &json!({ "index": { "_id": id_fn(&doc) } }))?;
                buffer.push(b'\n');
            }
            None => buffer.write(INDEX_HEADER),
        }

        match &self.sink {
            Some(sink) => sink(&doc, buffer)?,
            None => serde_json::to_writer(&mut *buffer, &doc)?,
        }
        buffer.push(b'\n');
        Ok(())
    }
}

/// Frames `(id, payload)` pairs as `update` actions built by a statement factory.
pub struct UpdateAction<F> {
    statement: F,
}

impl<F> UpdateAction<F> {
    /// Create an update framer.
    pub fn new(statement: F) -> Self {
        Self { statement }
    }
}

impl<F> fmt::Debug for UpdateAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateAction").finish_non_exhaustive()
    }
}

impl<P, F> ActionFramer<(String, P)> for UpdateAction<F>
where
    F: FnMut(&str, P) -> UpdateStatement + Send,
{
    fn frame(&mut self, (id, payload): (String, P), buffer: &mut GrowableBuffer) -> Result<()> {
        serde_json::to_writer(&mut *buffer, &json!({ "update": { "_id": id } }))?;
        buffer.push(b'\n');
        let statement = (self.statement)(&id, payload);
        serde_json::to_writer(&mut *buffer, &statement)?;
        buffer.push(b'\n');
        Ok(())
    }
}

/// Lazy sequence of bulk requests over a document source.
///
/// Each call to `next` frames up to `batch_size` documents and returns a
/// future for the request carrying them; the request is sent when the future
/// is first polled. Accumulation of the next batch only starts when the
/// consumer asks for it. A partial final batch is flushed once the source is
/// exhausted. Futures may be awaited in any order or concurrently; callers that
/// need strict sequencing await each one before pulling the next.
///
/// A document that fails to frame yields an already failed future in its
/// place. Its partial output is rolled back and batching continues.
pub struct BulkBatcher<I, A> {
    docs: I,
    framer: A,
    buffer: GrowableBuffer,
    dispatcher: Dispatcher,
    path: String,
    batch_size: usize,
    output_items: bool,
    pending: usize,
    dispatched: usize,
    exhausted: bool,
}

impl<I, A> BulkBatcher<I, A>
where
    I: Iterator,
    A: ActionFramer<I::Item>,
{
    /// Create a batcher posting to `path`.
    pub fn new(
        dispatcher: Dispatcher,
        path: impl Into<String>,
        docs: I,
        framer: A,
        batch_size: usize,
        output_items: bool,
    ) -> Self {
        let batch_size = clamp_batch_size(batch_size);
        Self {
            docs,
            framer,
            buffer: GrowableBuffer::for_batch(batch_size),
            dispatcher,
            path: path.into(),
            batch_size,
            output_items,
            pending: 0,
            dispatched: 0,
            exhausted: false,
        }
    }

    /// Effective actions per request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batch futures handed out so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Send every batch in order, awaiting each, and merge the outcomes.
    ///
    /// A batch whose error status was absorbed under best-effort handling marks
    /// the merged outcome as failed.
    pub async fn run(self) -> Result<BulkOutcome> {
        let mut total = BulkOutcome {
            items: self.output_items.then(Vec::new),
            ..BulkOutcome::default()
        };

        for batch in self {
            match batch.await? {
                Some(outcome) => total = total.merge(outcome),
                None => total.errors = true,
            }
        }

        Ok(total)
    }

    fn flush(&mut self) -> BatchFuture {
        let payload = self.buffer.slice();
        let items = std::mem::take(&mut self.pending);
        self.dispatched += 1;

        let dispatcher = self.dispatcher.clone();
        let path = self.path.clone();
        let deep = self.output_items;
        let batch = self.dispatched;

        Box::pin(async move {
            debug!(path = %path, batch, items, bytes = payload.len(), "Dispatching bulk batch");
            dispatcher
                .execute(DispatchRequest::post(path).ndjson(payload), move |body| {
                    BulkOutcome::decode(&body, deep)
                })
                .await
        })
    }
}

impl<I, A> Iterator for BulkBatcher<I, A>
where
    I: Iterator,
    A: ActionFramer<I::Item>,
{
    type Item = BatchFuture;

    fn next(&mut self) -> Option<BatchFuture> {
        while !self.exhausted && self.pending < self.batch_size {
            let Some(doc) = self.docs.next() else {
                self.exhausted = true;
                break;
            };

            let mark = self.buffer.len();
            if let Err(e) = self.framer.frame(doc, &mut self.buffer) {
                self.buffer.truncate(mark);
                warn!(path = %self.path, error = %e, "Dropping document that failed to serialize");
                return Some(Box::pin(future::ready(Err(e))));
            }
            self.pending += 1;
        }

        if self.pending == 0 {
            return None;
        }
        Some(self.flush())
    }
}

impl<I, A> fmt::Debug for BulkBatcher<I, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkBatcher")
            .field("path", &self.path)
            .field("batch_size", &self.batch_size)
            .field("output_items", &self.output_items)
            .field("pending", &self.pending)
            .field("dispatched", &self.dispatched)
            .finish()
    }
}
