//! Request paths and server-side response projections.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::time::Duration;

/// Bytes that cannot appear literally in a path segment. Commas and `*` stay
/// readable so multi-index and wildcard targets keep working.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Search response projection without field filtering.
pub const SEARCH_FILTER: &str =
    "filter_path=took,_shards,timed_out,hits.hits._source,hits.hits._id,hits.total,aggregations";

/// Search response projection before a `_source` field selection is appended.
const PROJECTED_SEARCH_FILTER: &str =
    "filter_path=took,_shards,timed_out,hits.hits._id,hits.total,aggregations";

/// Scroll continuation endpoint.
pub const SCROLL_PATH: &str = "_search/scroll";

/// Join path segments with `/`, skipping empty ones.
pub fn join(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encode a caller-supplied name (index or document ID) for use as
/// one path segment.
pub fn segment(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT).to_string()
}

/// Path of the document `id` in `index`.
pub fn document(index: &str, doc_type: &str, id: &str) -> String {
    join(&[&segment(index), doc_type, &segment(id)])
}

/// `_search` path for `index`, optionally projecting `fields` and opening a
/// scroll context of `scroll` lifetime.
pub fn search(index: &str, fields: &[&str], scroll: Option<Duration>) -> String {
    let mut path = format!("{}/_search?", segment(index));

    if fields.is_empty() {
        path.push_str(SEARCH_FILTER);
    } else {
        path.push_str(PROJECTED_SEARCH_FILTER);
        path.push_str(",hits.hits._source");
    }

    if let Some(ttl) = scroll {
        path.push_str(",_scroll_id&scroll=");
        path.push_str(&ttl_param(ttl));
    }

    if !fields.is_empty() {
        path.push_str("&_source_includes=");
        path.push_str(&fields.join(","));
    }

    path
}

/// Scroll continuation path, projected like the search that opened it.
pub fn scroll_continuation() -> String {
    format!("{}?{},_scroll_id", SCROLL_PATH, SEARCH_FILTER)
}

/// Single document path projected to `_source` or the given source fields.
pub fn single_projection(index: &str, doc_type: &str, id: &str, fields: &[&str]) -> String {
    let mut path = format!("{}?filter_path=", document(index, doc_type, id));
    if fields.is_empty() {
        path.push_str("_source");
    } else {
        let projected: Vec<String> = fields.iter().map(|f| format!("_source.{}", f)).collect();
        path.push_str(&projected.join(","));
    }
    path
}

/// Scroll lifetime in the server's `Ns` notation.
pub fn ttl_param(ttl: Duration) -> String {
    format!("{}s", ttl.as_secs().max(1))
}
