//! Integration tests for common esops workflows.
//!
//! These tests run the client over real HTTP against a mock cluster.

use esops::BulkItem;
use esops::prelude::*;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Article {
    title: String,
    views: u64,
}

fn article(i: u64) -> Article {
    Article {
        title: format!("article-{}", i),
        views: i,
    }
}

fn client_for(hosts: &[&str]) -> EsClient {
    let config = EsClientConfig::builder()
        .hosts(hosts.iter().copied())
        .connect_timeout(Duration::from_millis(500))
        .request_timeout(Duration::from_secs(5))
        .scroll_ttl(Duration::from_secs(30))
        .build();
    EsClient::new(config).unwrap()
}

fn search_page(scroll_id: &str, total: u64, ids: &[u64]) -> Value {
    let hits: Vec<Value> = ids
        .iter()
        .map(|i| json!({ "_id": i.to_string(), "_source": article(*i) }))
        .collect();
    json!({
        "took": 2,
        "timed_out": false,
        "_shards": { "total": 1, "successful": 1, "skipped": 0, "failed": 0 },
        "hits": { "total": { "value": total, "relation": "eq" }, "hits": hits },
        "_scroll_id": scroll_id
    })
}

// =============================================================================
// Failover Tests
// =============================================================================

#[tokio::test]
async fn test_failover_to_next_host_on_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "node-1",
            "cluster_name": "test",
            "version": { "number": "7.17.0" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Nothing listens on port 1.
    let client = client_for(&["http://127.0.0.1:1", &server.uri()]);

    let info = client.info().await.unwrap().unwrap();
    assert_eq!(info.version.number, "7.17.0");

    assert!(!client.selector().is_healthy(0));
    assert!(client.selector().is_healthy(1));
    assert_eq!(client.selector().demotions(), 1);
}

#[tokio::test]
async fn test_all_hosts_down_is_exhausted() {
    let client = client_for(&["http://127.0.0.1:1"]);

    let err = client.info().await.unwrap_err();
    assert!(err.is_exhausted());
}

// =============================================================================
// Index Tests
// =============================================================================

#[tokio::test]
async fn test_exists_maps_not_found_to_false() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/articles"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);

    assert!(!client.exists("missing").await.unwrap());
    assert!(client.exists("articles").await.unwrap());
}

#[tokio::test]
async fn test_create_index_skips_existing() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/articles"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/articles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let created = client
        .create_index("articles", &json!({ "settings": { "number_of_shards": 1 } }))
        .await
        .unwrap();

    assert!(!created);
}

// =============================================================================
// Document Tests
// =============================================================================

#[tokio::test]
async fn test_save_then_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/articles/_doc/7"))
        .and(body_json(json!({ "title": "article-7", "views": 7 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "_index": "articles",
            "_id": "7",
            "_version": 1,
            "result": "created"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/articles/_doc/7"))
        .and(query_param("filter_path", "_source"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "_source": article(7) })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/articles/_doc/8"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "found": false })))
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);

    let written = client
        .save_or_update("articles", "7", &article(7))
        .await
        .unwrap()
        .unwrap();
    assert!(written.is_created());

    let found: Option<Article> = client.lookup("articles", "7", &[]).await.unwrap();
    assert_eq!(found, Some(article(7)));

    let missing: Option<Article> = client.lookup("articles", "8", &[]).await.unwrap();
    assert_eq!(missing, None);
}

// =============================================================================
// Search Tests
// =============================================================================

#[tokio::test]
async fn test_count_sends_only_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_count"))
        .and(body_json(json!({ "query": { "term": { "views": 3 } } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 12 })))
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let query = RootQuery::term("views", 3).limit(50);

    assert_eq!(client.count("articles", &query).await.unwrap(), Some(12));
}

#[tokio::test]
async fn test_query_error_status_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_search"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "type": "parsing_exception", "reason": "Unknown key for a START_OBJECT" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let err = client
        .query::<Article>("articles", &RootQuery::match_all(), &[])
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(400));
    // An application error does not demote the host.
    assert!(client.selector().is_healthy(0));
}

#[tokio::test]
async fn test_scroll_stream_walks_all_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_search"))
        .and(query_param("scroll", "30s"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page("s-1", 5, &[1, 2])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll_id": "s-1", "scroll": "30s" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page("s-2", 5, &[3, 4])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .and(body_json(json!({ "scroll_id": "s-2", "scroll": "30s" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page("s-3", 5, &[5])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let pages: Vec<Page<Article>> = client
        .async_stream("articles", &RootQuery::match_all(), &[])
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(pages.len(), 3);
    assert_eq!(pages[2].seen(), 5);
    assert!(pages[2].is_complete());

    let titles: Vec<String> = pages
        .into_iter()
        .flat_map(Page::into_values)
        .map(|a| a.title)
        .collect();
    assert_eq!(titles.first().map(String::as_str), Some("article-1"));
    assert_eq!(titles.len(), 5);
}

#[tokio::test]
async fn test_scroll_pages_pull_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_search"))
        .and(query_param("_source_includes", "title"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page("s-1", 3, &[1, 2])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_search/scroll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_page("s-2", 3, &[3])))
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let mut sizes = Vec::new();
    for page in client
        .stream::<Value>("articles", &RootQuery::match_all(), &["title"])
        .unwrap()
    {
        let page = page.await.unwrap().unwrap();
        sizes.push(page.size());
    }

    assert_eq!(sizes, vec![2, 1]);
}

// =============================================================================
// Bulk Tests
// =============================================================================

#[tokio::test]
async fn test_bulk_insert_splits_into_batches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_doc/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 4,
            "errors": false,
            "items": [{ "index": { "_index": "articles", "_id": "x", "status": 201 } }]
        })))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let outcome = client
        .bulk_insert(
            "articles",
            (0..25).map(article),
            BulkOptions::new().batch_size(10).output_items(true),
        )
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.took, 12);
    assert!(!outcome.errors);
    assert_eq!(outcome.items().len(), 3);
    assert!(outcome.items().iter().all(BulkItem::is_success));

    let requests = server.received_requests().await.unwrap();
    let lines: usize = requests
        .iter()
        .map(|r| r.body.iter().filter(|b| **b == b'\n').count())
        .sum();
    // One action line and one source line per document.
    assert_eq!(lines, 50);
    assert!(requests.iter().all(|r| r.body.starts_with(b"{\"index\":{}}\n")));
}

#[tokio::test]
async fn test_bulk_update_frames_statements() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_doc/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 1,
            "errors": true
        })))
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let docs = vec![("a".to_string(), 1u64), ("b".to_string(), 2u64)];
    let outcome = client
        .bulk_update(
            "articles",
            docs,
            |_, views| UpdateStatement::doc(json!({ "views": views })),
            BulkOptions::new(),
        )
        .run()
        .await
        .unwrap();

    assert!(outcome.errors);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines[0], r#"{"update":{"_id":"a"}}"#);
    assert_eq!(lines[1], r#"{"doc":{"views":1}}"#);
    assert_eq!(lines[2], r#"{"update":{"_id":"b"}}"#);
}

// =============================================================================
// By-Query Tests
// =============================================================================

#[tokio::test]
async fn test_delete_matching_proceeds_on_conflicts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/articles/_delete_by_query"))
        .and(query_param("conflicts", "proceed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 30,
            "timed_out": false,
            "total": 4,
            "deleted": 4,
            "version_conflicts": 0,
            "failures": []
        })))
        .mount(&server)
        .await;

    let client = client_for(&[&server.uri()]);
    let result = client
        .delete_matching("articles", &RootQuery::term("views", 0))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.deleted, 4);
    assert!(result.is_success());
}
