//! Host pool with health tracking and rotating selection.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use url::Url;

use crate::error::{EsClientError, Result};

/// One host of the pool, as handed out to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    index: usize,
    url: Url,
}

impl Endpoint {
    /// Position of the host in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Base URL of the host.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Resolve a request path (which may carry a query string) against this host.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        let base = self.url.as_str();
        let path = path.trim_start_matches('/');
        let joined = if base.ends_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        };
        Ok(Url::parse(&joined)?)
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Pool of cluster hosts.
///
/// A host that suffers a transport failure is taken out of rotation until
/// `cool_down` has elapsed, after which the next selection re-admits it.
/// Hosts are never removed permanently. All bookkeeping is synchronous and
/// never held across an `.await`.
#[derive(Debug)]
pub struct EndpointSelector {
    hosts: Vec<Url>,
    failed_at: Mutex<Vec<Option<Instant>>>,
    cursor: AtomicUsize,
    demotions: AtomicU64,
    cool_down: Duration,
}

impl EndpointSelector {
    /// Create a selector over parsed host URLs.
    pub fn new(hosts: Vec<Url>, cool_down: Duration) -> Result<Self> {
        if hosts.is_empty() {
            return Err(EsClientError::Config("No hosts provided".to_string()));
        }

        let failed_at = Mutex::new(vec![None; hosts.len()]);
        Ok(Self {
            hosts,
            failed_at,
            cursor: AtomicUsize::new(0),
            demotions: AtomicU64::new(0),
            cool_down,
        })
    }

    /// Create a selector from host URL strings.
    pub fn from_urls<S: AsRef<str>>(urls: &[S], cool_down: Duration) -> Result<Self> {
        let hosts = urls
            .iter()
            .map(|u| Url::parse(u.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(hosts, cool_down)
    }

    /// Candidate hosts for one request, starting at the next rotation position.
    ///
    /// Each host appears at most once. Health is read as the sequence is
    /// consumed, so a failure recorded mid-sequence by another request is
    /// visible to the remaining candidates.
    pub fn available(&self) -> Candidates<'_> {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        Candidates {
            selector: self,
            start,
            offset: 0,
        }
    }

    /// First healthy host in rotation order.
    pub fn select(&self) -> Option<Endpoint> {
        self.available().next()
    }

    /// Record a transport failure for `endpoint`.
    ///
    /// Marking an already failed host again keeps its original timestamp.
    pub fn on_failure(&self, endpoint: &Endpoint) {
        let mut failed_at = self.failed_at.lock();
        let Some(slot) = failed_at.get_mut(endpoint.index) else {
            return;
        };

        if slot.is_none() {
            *slot = Some(Instant::now());
            self.demotions.fetch_add(1, Ordering::Relaxed);
            warn!(
                host = %endpoint.url,
                cool_down_secs = self.cool_down.as_secs(),
                "Host marked as failed"
            );
        }
    }

    /// Whether the host at `index` may be selected, re-admitting it if its
    /// cool-down has elapsed.
    pub fn is_healthy(&self, index: usize) -> bool {
        let mut failed_at = self.failed_at.lock();
        match failed_at.get(index).copied().flatten() {
            None => index < self.hosts.len(),
            Some(at) if at.elapsed() >= self.cool_down => {
                failed_at[index] = None;
                info!(host = %self.hosts[index], "Host re-admitted after cool-down");
                true
            }
            Some(_) => false,
        }
    }

    /// Number of hosts currently eligible for selection.
    pub fn healthy_count(&self) -> usize {
        (0..self.hosts.len()).filter(|&i| self.is_healthy(i)).count()
    }

    /// Number of healthy-to-failed transitions recorded so far.
    pub fn demotions(&self) -> u64 {
        self.demotions.load(Ordering::Relaxed)
    }

    /// Configured cool-down interval.
    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }

    /// All configured host URLs.
    pub fn hosts(&self) -> &[Url] {
        &self.hosts
    }

    /// Number of configured hosts.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Always false; a selector cannot be built without hosts.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// Lazily evaluated sequence of healthy hosts for one request.
#[derive(Debug)]
pub struct Candidates<'a> {
    selector: &'a EndpointSelector,
    start: usize,
    offset: usize,
}

impl Iterator for Candidates<'_> {
    type Item = Endpoint;

    fn next(&mut self) -> Option<Endpoint> {
        let len = self.selector.hosts.len();
        while self.offset < len {
            let index = (self.start + self.offset) % len;
            self.offset += 1;

            if self.selector.is_healthy(index) {
                return Some(Endpoint {
                    index,
                    url: self.selector.hosts[index].clone(),
                });
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.selector.hosts.len() - self.offset))
    }
}
