use mockito::{Matcher, Server};
use notion_todo_sync::infrastructure::record_mapper::map_records;
use notion_todo_sync::{ApiError, NotionClient, ReqwestNotionClient};
use serde_json::json;

fn client_for(server: &Server) -> ReqwestNotionClient {
    ReqwestNotionClient::with_base_url("secret_token", format!("{}/v1", server.url()))
}

fn page(id: &str) -> serde_json::Value {
    json!({
        "object": "page",
        "id": id,
        "archived": false,
        "in_trash": false,
        "properties": {
            "Name": {"type": "title", "title": [{"plain_text": id}]}
        }
    })
}

#[tokio::test]
async fn query_follows_cursors_in_page_order() {
    let mut server = Server::new_async().await;
    let path = "/v1/data_sources/ds-1/query";

    let first = server
        .mock("POST", path)
        .match_header("authorization", "Bearer secret_token")
        .match_header("notion-version", "2025-09-03")
        .match_body(Matcher::Json(json!({"page_size": 100})))
        .with_status(200)
        .with_body(
            json!({"results": [page("a"), page("b")], "has_more": true, "next_cursor": "c1"})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("POST", path)
        .match_body(Matcher::Json(json!({"page_size": 100, "start_cursor": "c1"})))
        .with_status(200)
        .with_body(
            json!({"results": [page("c")], "has_more": true, "next_cursor": "c2"}).to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let third = server
        .mock("POST", path)
        .match_body(Matcher::Json(json!({"page_size": 100, "start_cursor": "c2"})))
        .with_status(200)
        .with_body(json!({"results": [page("d")], "has_more": false, "next_cursor": null}).to_string())
        .expect(1)
        .create_async()
        .await;

    let records = client_for(&server)
        .query_data_source("ds-1")
        .await
        .expect("query succeeds");

    let ids: Vec<_> = records.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    first.assert_async().await;
    second.assert_async().await;
    third.assert_async().await;
}

#[tokio::test]
async fn malformed_record_does_not_fail_the_page() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/data_sources/ds-1/query")
        .with_status(200)
        .with_body(
            json!({
                "results": [
                    {"id": "a", "archived": null, "in_trash": null, "properties": {}},
                    {"id": null, "properties": {}},
                    page("c")
                ],
                "has_more": false
            })
            .to_string(),
        )
        .create_async()
        .await;

    let records = client_for(&server)
        .query_data_source("ds-1")
        .await
        .expect("query succeeds");
    assert_eq!(records.len(), 3);

    let tasks = map_records(&records, &Default::default(), chrono_tz::Tz::UTC);
    let ids: Vec<_> = tasks.iter().map(|task| task.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[tokio::test]
async fn has_more_without_cursor_stops_after_first_page() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/data_sources/ds-1/query")
        .with_status(200)
        .with_body(json!({"results": [page("a")], "has_more": true}).to_string())
        .expect(1)
        .create_async()
        .await;

    let records = client_for(&server)
        .query_data_source("ds-1")
        .await
        .expect("query succeeds");

    assert_eq!(records.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn status_codes_map_to_error_variants() {
    let cases = [
        (401, ApiError::Authentication("Invalid credentials".to_string())),
        (403, ApiError::Authentication("Invalid credentials".to_string())),
        (400, ApiError::NotFound("Invalid database id".to_string())),
        (404, ApiError::NotFound("Resource not found".to_string())),
        (429, ApiError::RateLimit("Rate limit exceeded".to_string())),
    ];

    for (status, expected) in cases {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/databases/db-1")
            .with_status(status)
            .with_body(json!({"object": "error", "status": status}).to_string())
            .create_async()
            .await;

        let error = client_for(&server)
            .get_database("db-1")
            .await
            .expect_err("non-2xx fails");
        assert_eq!(error, expected, "status {status}");
    }
}

#[tokio::test]
async fn server_errors_are_generic_api_errors() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/search")
        .with_status(503)
        .create_async()
        .await;

    let error = client_for(&server)
        .search_databases()
        .await
        .expect_err("503 fails");
    assert!(matches!(error, ApiError::Api(_)));
    assert!(error.message().contains("503"));
}

#[tokio::test]
async fn empty_or_invalid_bodies_are_api_errors() {
    let mut server = Server::new_async().await;
    let _empty = server
        .mock("GET", "/v1/databases/empty")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;
    let _garbage = server
        .mock("GET", "/v1/databases/garbage")
        .with_status(200)
        .with_body("{not json")
        .create_async()
        .await;
    let client = client_for(&server);

    assert_eq!(
        client.get_database("empty").await,
        Err(ApiError::Api("Unexpected response".to_string()))
    );
    assert!(matches!(
        client.get_database("garbage").await,
        Err(ApiError::Api(_))
    ));
}

#[tokio::test]
async fn unreachable_host_is_a_communication_error() {
    let client = ReqwestNotionClient::with_base_url("secret_token", "http://127.0.0.1:1/v1");
    let error = client
        .query_data_source("ds-1")
        .await
        .expect_err("connection refused");
    assert!(matches!(error, ApiError::Communication(_)));
}

#[tokio::test]
async fn get_database_reads_data_sources() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/databases/db-1")
        .match_header("authorization", "Bearer secret_token")
        .match_header("notion-version", "2025-09-03")
        .with_status(200)
        .with_body(
            json!({
                "object": "database",
                "id": "db-1",
                "title": [{"plain_text": "Tasks"}],
                "data_sources": [{"id": "ds-1", "name": "Main"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let database = client_for(&server)
        .get_database("db-1")
        .await
        .expect("database");

    assert_eq!(database.id, "db-1");
    assert_eq!(database.title[0].plain_text, "Tasks");
    let sources = database.data_sources.expect("data sources");
    assert_eq!(sources[0].id.as_deref(), Some("ds-1"));
    assert_eq!(sources[0].name.as_deref(), Some("Main"));
    mock.assert_async().await;
}

#[tokio::test]
async fn search_requests_databases_only() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/search")
        .match_body(Matcher::Json(json!({
            "page_size": 100,
            "filter": {"property": "object", "value": "database"}
        })))
        .with_status(200)
        .with_body(
            json!({
                "results": [
                    {"object": "database", "id": "db-1", "title": [{"plain_text": "Tasks"}]}
                ],
                "has_more": false
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let results = client_for(&server)
        .search_databases()
        .await
        .expect("search succeeds");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].object, "database");
    mock.assert_async().await;
}
