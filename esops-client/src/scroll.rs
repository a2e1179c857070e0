//! Scroll cursors.
//!
//! A [`ScrollCursor`] pairs the in-flight first page of a scrolled search with
//! a continuation that fetches the page after a given scroll token. It can be
//! consumed once, either as an iterator of page futures ([`ScrollCursor::pages`])
//! or as an asynchronous stream of pages ([`ScrollCursor::into_stream`]).

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::ErrorPolicy;
use crate::error::Result;
use crate::result::Page;

/// Future for one page of a scroll.
pub type PageFuture<T> = BoxFuture<'static, Result<Option<Page<T>>>>;

/// Fetches the page following a scroll token.
pub type Continuation<T> = Arc<dyn Fn(String) -> PageFuture<T> + Send + Sync>;

/// One-shot scroll over a search.
pub struct ScrollCursor<T> {
    head: PageFuture<T>,
    next: Continuation<T>,
    policy: ErrorPolicy,
}

impl<T: Send + 'static> ScrollCursor<T> {
    /// Create a cursor from the first page and a continuation.
    pub fn new<F>(head: PageFuture<T>, next: F, policy: ErrorPolicy) -> Self
    where
        F: Fn(String) -> PageFuture<T> + Send + Sync + 'static,
    {
        Self {
            head,
            next: Arc::new(next),
            policy,
        }
    }

    /// Iterate over page futures.
    ///
    /// Every fetched page is produced, the terminal one included. Each future
    /// waits for the token of the previous page before fetching, so pages are
    /// never requested concurrently even when futures are pulled eagerly. The
    /// iterator ends once an awaited page is empty, complete, carries no token
    /// or fails. Futures pulled past the end resolve to `Ok(None)`.
    pub fn pages(self) -> PageIter<T> {
        PageIter {
            head: Some(self.head),
            next: self.next,
            policy: self.policy,
            token: None,
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stream the pages that carry hits.
    ///
    /// The stream ends after the first terminal page; a terminal page with no
    /// hits is not yielded.
    pub fn into_stream(self) -> BoxStream<'static, Result<Page<T>>> {
        let next = self.next;
        let policy = self.policy;

        stream::unfold(Cursor::Head(self.head), move |cursor| {
            let next = next.clone();
            async move {
                let (result, seen_before) = match cursor {
                    Cursor::Head(head) => (head.await, 0),
                    Cursor::Next { scroll_id, seen } => (next(scroll_id).await, seen),
                    Cursor::Done => return None,
                };

                match result {
                    Ok(Some(mut page)) => {
                        page.accumulate(seen_before);
                        if page.is_empty() {
                            debug!(seen = seen_before, "Scroll ended on an empty page");
                            return None;
                        }
                        let following = match page.scroll_id() {
                            Some(id) if !page.is_complete() => Cursor::Next {
                                scroll_id: id.to_string(),
                                seen: page.seen(),
                            },
                            _ => Cursor::Done,
                        };
                        Some((Ok(page), following))
                    }
                    Ok(None) => None,
                    Err(e) => match policy {
                        ErrorPolicy::Propagate => Some((Err(e), Cursor::Done)),
                        ErrorPolicy::BestEffort => {
                            warn!(error = %e, "Scroll terminated by failed page");
                            None
                        }
                    },
                }
            }
        })
        .boxed()
    }
}

impl<T> fmt::Debug for ScrollCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollCursor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

enum Cursor<T> {
    Head(PageFuture<T>),
    Next { scroll_id: String, seen: u64 },
    Done,
}

enum Step {
    Continue { scroll_id: String, seen: u64 },
    Stop,
}

/// Iterator of page futures returned by [`ScrollCursor::pages`].
pub struct PageIter<T> {
    head: Option<PageFuture<T>>,
    next: Continuation<T>,
    policy: ErrorPolicy,
    token: Option<oneshot::Receiver<Step>>,
    finished: Arc<AtomicBool>,
}

impl<T: Send + 'static> Iterator for PageIter<T> {
    type Item = PageFuture<T>;

    fn next(&mut self) -> Option<PageFuture<T>> {
        if self.finished.load(Ordering::Acquire) {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        let previous = self.token.replace(rx);
        let finished = self.finished.clone();
        let policy = self.policy;

        if let Some(head) = self.head.take() {
            return Some(Box::pin(async move {
                settle(head.await, 0, tx, &finished, policy)
            }));
        }

        let previous = previous?;
        let next = self.next.clone();
        Some(Box::pin(async move {
            // A dropped predecessor never reports a token and ends the scroll.
            let Ok(Step::Continue { scroll_id, seen }) = previous.await else {
                stop(tx, &finished);
                return Ok(None);
            };
            settle(next(scroll_id).await, seen, tx, &finished, policy)
        }))
    }
}

impl<T> fmt::Debug for PageIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageIter")
            .field("policy", &self.policy)
            .field("finished", &self.finished.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

// Mark the sequence finished and release any successor waiting on a token.
fn stop(tx: oneshot::Sender<Step>, finished: &AtomicBool) {
    finished.store(true, Ordering::Release);
    let _ = tx.send(Step::Stop);
}

// Record the outcome of one page fetch and hand the token to the successor.
fn settle<T>(
    result: Result<Option<Page<T>>>,
    seen_before: u64,
    tx: oneshot::Sender<Step>,
    finished: &AtomicBool,
    policy: ErrorPolicy,
) -> Result<Option<Page<T>>> {
    match result {
        Ok(Some(mut page)) => {
            page.accumulate(seen_before);
            match page.scroll_id() {
                Some(id) if !page.is_empty_or_complete() => {
                    let step = Step::Continue {
                        scroll_id: id.to_string(),
                        seen: page.seen(),
                    };
                    let _ = tx.send(step);
                }
                _ => {
                    debug!(
                        seen = page.seen(),
                        total = page.total(),
                        "Scroll reached its last page"
                    );
                    stop(tx, finished);
                }
            }
            Ok(Some(page))
        }
        Ok(None) => {
            stop(tx, finished);
            Ok(None)
        }
        Err(e) => {
            stop(tx, finished);
            match policy {
                ErrorPolicy::Propagate => Err(e),
                ErrorPolicy::BestEffort => {
                    warn!(error = %e, "Scroll terminated by failed page");
                    Ok(None)
                }
            }
        }
    }
}
