//! Integration tests for the crawlers
//!
//! These tests use wiremock to stand in for the portal API and drive the
//! full sync, listing and product pipelines end-to-end over HTTP. The
//! crawlers block, so they run on tokio's blocking pool while the mock
//! server keeps serving.

use catalog_harvest::config::{CrawlerConfig, PortalConfig};
use catalog_harvest::crawler::{CategorySync, ListingCrawler, ProductCrawler};
use catalog_harvest::portal::{PortalClient, Upstream};
use catalog_harvest::storage::{Database, Storage};
use catalog_harvest::HarvestError;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AUTHORIZATION: &str = "Basic dGVzdDp0ZXN0";

/// Creates a portal configuration pointing at the mock server
fn portal_config(base_url: &str) -> PortalConfig {
    PortalConfig {
        api_base: base_url.to_string(),
        site_url: "https://market.example.test".to_string(),
        authorization: AUTHORIZATION.to_string(),
        root_category_id: 1,
        timeout_secs: 5,
        referer_paths: vec!["/category/shirts".to_string()],
    }
}

/// Crawler settings without pauses
fn crawler_config() -> CrawlerConfig {
    CrawlerConfig {
        listing_workers: 2,
        category_workers: 2,
        max_page_delay_ms: 0,
        max_product_delay_ms: 0,
        ..Default::default()
    }
}

fn temp_database() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let database = Database::open(dir.path().join("catalog.db")).expect("Failed to open database");
    (dir, database)
}

/// Runs blocking crawler code off the async runtime
async fn blocking<T, F>(f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("Blocking task panicked")
}

fn category_tree() -> Value {
    json!({
        "error": null,
        "payload": {
            "category": {
                "id": 1,
                "title": "All",
                "children": [
                    {"id": 2, "title": "Clothing", "productAmount": 3, "children": [
                        {"id": 4, "title": "Shirts", "productAmount": 3}
                    ]}
                ]
            }
        }
    })
}

fn listing(ids: &[i64]) -> Value {
    let products: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "productId": id,
                "title": format!("Shirt {}", id),
                "categoryId": 4,
                "rating": 4.5,
                "sellPrice": 19.99
            })
        })
        .collect();
    json!({
        "error": null,
        "payload": {"totalProducts": ids.len(), "products": products, "adultContent": false}
    })
}

fn product(id: i64) -> Value {
    json!({
        "error": null,
        "payload": {
            "data": {
                "id": id,
                "title": format!("Shirt {}", id),
                "description": "Cotton",
                "category": {"id": 4, "title": "Shirts"},
                "seller": {"id": 9, "title": "Acme", "orders": 100, "reviews": 10, "rating": 4.9},
                "ordersAmount": 12,
                "reviewsAmount": 2,
                "totalAvailableAmount": 7,
                "rating": 4.5,
                "characteristics": [
                    {"title": "Size", "values": [
                        {"title": "M", "value": "M"},
                        {"title": "L", "value": "L"}
                    ]}
                ],
                "skuList": [
                    {"availableAmount": 3, "fullPrice": 19.99, "purchasePrice": 17.5,
                     "characteristics": [{"charIndex": 0, "valueIndex": 0}]},
                    {"availableAmount": 4, "fullPrice": 19.99, "purchasePrice": 17.5,
                     "characteristics": [{"charIndex": 0, "valueIndex": 1}]}
                ]
            },
            "promotion": null
        }
    })
}

async fn mount_tree(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/main/search/category"))
        .and(query_param("categoryId", "1"))
        .and(header("Authorization", AUTHORIZATION))
        .respond_with(ResponseTemplate::new(200).set_body_json(category_tree()))
        .mount(server)
        .await;
}

async fn mount_listing(server: &MockServer, ids: &[i64]) {
    Mock::given(method("GET"))
        .and(path("/main/search/product"))
        .and(query_param("categoryId", "4"))
        .and(query_param("page", "0"))
        .and(query_param("size", "24"))
        .and(query_param("sortBy", "orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(ids)))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_product(server: &MockServer, id: i64) {
    Mock::given(method("GET"))
        .and(path(format!("/product/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(product(id)))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_pipeline() {
    let mock_server = MockServer::start().await;
    mount_tree(&mock_server).await;
    mount_listing(&mock_server, &[101, 102, 103]).await;
    for id in [101, 102, 103] {
        mount_product(&mock_server, id).await;
    }

    let (_dir, database) = temp_database();
    let portal = portal_config(&mock_server.uri());

    let (listing_report, product_report) = blocking(move || {
        let client = PortalClient::new(&portal).expect("Failed to build client");

        let sync = CategorySync::new(&client, database.clone()).sync().unwrap();
        assert_eq!(sync.inserted, 2);

        let root = database.connect().unwrap().root_categories().unwrap()[0].id;
        let listings = ListingCrawler::new(&client, database.clone(), crawler_config())
            .crawl_listings(root)
            .unwrap();
        let products = ProductCrawler::new(&client, database.clone(), crawler_config())
            .crawl_products(root)
            .unwrap();

        let storage = database.connect().unwrap();
        assert_eq!(storage.count_products().unwrap(), 3);
        assert_eq!(storage.count_parsed_products().unwrap(), 3);
        assert_eq!(storage.count_characteristics().unwrap(), 1);
        assert_eq!(storage.count_char_values().unwrap(), 2);
        assert_eq!(storage.count_skus().unwrap(), 6);

        (listings, products)
    })
    .await;

    // ceil(3 / 24) bounds the listing to a single page
    assert_eq!(listing_report.pages, 1);
    assert_eq!(listing_report.stubs_inserted, 3);
    assert_eq!(product_report.parsed, 3);
    assert_eq!(product_report.failed, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upstream_error_aborts_category_sync() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/main/search/category"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"error": "Access denied", "payload": null})),
        )
        .mount(&mock_server)
        .await;

    let (_dir, database) = temp_database();
    let portal = portal_config(&mock_server.uri());

    let (result, categories) = blocking(move || {
        let client = PortalClient::new(&portal).unwrap();
        let result = CategorySync::new(&client, database.clone()).sync();
        let categories = database.connect().unwrap().count_categories().unwrap();
        (result, categories)
    })
    .await;

    match result {
        Err(HarvestError::Upstream { message, .. }) => assert_eq!(message, "Access denied"),
        other => panic!("Expected upstream error, got {:?}", other),
    }
    assert_eq!(categories, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_throttled_listing_fails_only_that_category() {
    let mock_server = MockServer::start().await;
    mount_tree(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/main/search/product"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"error": "Too many requests", "payload": null})),
        )
        .mount(&mock_server)
        .await;

    let (_dir, database) = temp_database();
    let portal = portal_config(&mock_server.uri());

    let report = blocking(move || {
        let client = PortalClient::new(&portal).unwrap();
        CategorySync::new(&client, database.clone()).sync().unwrap();
        let root = database.connect().unwrap().root_categories().unwrap()[0].id;
        ListingCrawler::new(&client, database, crawler_config())
            .crawl_listings(root)
            .unwrap()
    })
    .await;

    assert_eq!(report.failed_categories, 1);
    assert_eq!(report.stubs_inserted, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_product_is_skipped() {
    let mock_server = MockServer::start().await;
    mount_tree(&mock_server).await;
    mount_listing(&mock_server, &[101, 102]).await;
    mount_product(&mock_server, 101).await;
    Mock::given(method("GET"))
        .and(path("/product/102"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"payload\": {\"data\": [}"))
        .mount(&mock_server)
        .await;

    let (_dir, database) = temp_database();
    let portal = portal_config(&mock_server.uri());

    let (report, pending) = blocking(move || {
        let client = PortalClient::new(&portal).unwrap();
        CategorySync::new(&client, database.clone()).sync().unwrap();
        let root = database.connect().unwrap().root_categories().unwrap()[0].id;
        ListingCrawler::new(&client, database.clone(), crawler_config())
            .crawl_listings(root)
            .unwrap();
        let report = ProductCrawler::new(&client, database.clone(), crawler_config())
            .crawl_products(root)
            .unwrap();

        let storage = database.connect().unwrap();
        let pending = storage.count_products().unwrap() - storage.count_parsed_products().unwrap();
        (report, pending)
    })
    .await;

    assert_eq!(report.parsed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(pending, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_client_error_classification() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": null})))
        .mount(&mock_server)
        .await;

    let portal = portal_config(&mock_server.uri());
    let errors = blocking(move || {
        let client = PortalClient::new(&portal).unwrap();
        [1, 2, 3].map(|id| client.product(id).unwrap_err())
    })
    .await;

    assert!(matches!(errors[0], HarvestError::Status { status: 503, .. }));
    assert!(matches!(errors[1], HarvestError::Decode { .. }));
    assert!(matches!(errors[2], HarvestError::MissingPayload { .. }));
    assert!(errors.iter().all(HarvestError::is_upstream_failure));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_requests_carry_identity_headers() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/product/7"))
        .and(header("Authorization", AUTHORIZATION))
        .and(header("Referer", "https://market.example.test/category/shirts"))
        .and(header("Origin", "https://market.example.test/category/shirts"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product(7)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let portal = portal_config(&mock_server.uri());
    let detail = blocking(move || PortalClient::new(&portal).unwrap().product(7))
        .await
        .expect("Request should match the identity headers");

    assert_eq!(detail.portal_id, 7);
    assert_eq!(detail.sku_list.len(), 2);
}
