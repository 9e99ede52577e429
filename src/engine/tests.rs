//! Tests for the engine module

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_config(server: &MockServer) -> serde_json::Value {
    json!({
        "api_secret": "deadbeef",
        "timezone": "UTC",
        "from_date": "2023-01-01",
        "fetch_days": 2,
        "export_endpoint": format!("{}/export", server.uri()),
        "jql_endpoint": format!("{}/jql", server.uri()),
        "columns": [
            { "name": "event", "type": "string" },
            { "name": "time", "type": "long" },
            { "name": "plan", "type": "string" },
        ],
    })
}

fn runner(config: serde_json::Value) -> Runner {
    let config = ConnectorConfig::from_json(&config.to_string()).unwrap();
    Runner::new(config).unwrap()
}

fn export_line(event: &str, time: i64, plan: &str) -> String {
    json!({ "event": event, "properties": { "time": time, "plan": plan } }).to_string()
}

#[tokio::test]
async fn test_run_projects_records_and_emits_state() {
    let server = MockServer::start().await;
    let body = format!(
        "{}\n{}\n",
        export_line("signup", 100, "pro"),
        export_line("login", 200, "free")
    );
    Mock::given(method("GET"))
        .and(path("/export"))
        .and(query_param("from_date", "2023-01-01"))
        .and(query_param("to_date", "2023-01-02"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let mut sink = MemorySink::new();
    let report = runner(base_config(&server)).run(&mut sink).await.unwrap();

    assert_eq!(
        sink.rows,
        vec![
            vec![json!("signup"), json!(100), json!("pro")],
            vec![json!("login"), json!(200), json!("free")],
        ]
    );
    assert!(sink.finished);
    assert_eq!(report.records_emitted, 2);
    assert_eq!(report.slices_fetched, 1);

    let diff = report.next_config_diff().unwrap();
    assert_eq!(diff.from_date, "2023-01-03".parse::<chrono::NaiveDate>().unwrap());
    assert_eq!(diff.latest_fetched_time, 200);

    let state = report.state.unwrap();
    assert_eq!(state.latest_fetched_time, 200);
    assert_eq!(state.to_date, "2023-01-02".parse().unwrap());
}

#[tokio::test]
async fn test_run_skips_records_already_fetched() {
    let server = MockServer::start().await;
    let body = format!(
        "{}\n{}\n",
        export_line("signup", 100, "pro"),
        export_line("login", 200, "free")
    );
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["latest_fetched_time"] = json!(150);

    let mut sink = MemorySink::new();
    let report = runner(config).run(&mut sink).await.unwrap();

    assert_eq!(report.records_emitted, 1);
    assert_eq!(report.records_skipped_seen, 1);
    assert_eq!(sink.rows, vec![vec![json!("login"), json!(200), json!("free")]]);
    assert_eq!(report.state.unwrap().latest_fetched_time, 200);
}

#[tokio::test]
async fn test_preview_stops_after_first_slice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!("{}\n", export_line("a", 1, "x"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["fetch_days"] = json!(14);
    config["slice_range"] = json!(7);

    let mut sink = MemorySink::new();
    let report = runner(config)
        .with_mode(RunMode::Preview)
        .run(&mut sink)
        .await
        .unwrap();

    assert_eq!(report.slices_fetched, 1);
    assert_eq!(report.records_emitted, 1);
}

#[tokio::test]
async fn test_run_fails_fast_when_service_is_down() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut sink = MemorySink::new();
    let err = runner(base_config(&server)).run(&mut sink).await.unwrap_err();
    assert!(matches!(err, Error::ServiceUnavailable));
    assert!(sink.rows.is_empty());
}

#[tokio::test]
async fn test_truncated_slice_kept_under_partial_import() {
    let server = MockServer::start().await;
    let body = format!("{}\n{{\"event\":\"lo", export_line("signup", 100, "pro"));
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut sink = MemorySink::new();
    let report = runner(base_config(&server)).run(&mut sink).await.unwrap();

    assert_eq!(report.records_emitted, 1);
    assert_eq!(report.truncated_slices, 1);
}

#[tokio::test]
async fn test_truncated_slice_fails_without_partial_import() {
    let server = MockServer::start().await;
    let body = format!("{}\n{{\"event\":\"lo", export_line("signup", 100, "pro"));
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["allow_partial_import"] = json!(false);

    let mut sink = MemorySink::new();
    let err = runner(config).run(&mut sink).await.unwrap_err();
    assert!(matches!(err, Error::IncompleteResponse { .. }));
}

#[tokio::test]
async fn test_marker_column_back_fills_and_pushes_predicate() {
    let server = MockServer::start().await;
    let body = json!({
        "event": "signup",
        "properties": { "time": 100, "plan": "pro", "imported_at": 2000 }
    })
    .to_string();
    Mock::given(method("GET"))
        .and(path("/export"))
        .and(query_param("from_date", "2023-01-05"))
        .and(query_param("to_date", "2023-01-10"))
        .and(query_param_contains("where", "properties[\"imported_at\"] > 1000"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{body}\n")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["from_date"] = json!("2023-01-10");
    config["fetch_days"] = json!(1);
    config["incremental_column"] = json!("imported_at");
    config["latest_fetched_time"] = json!(1000);

    let mut sink = MemorySink::new();
    let report = runner(config).run(&mut sink).await.unwrap();

    assert_eq!(report.records_emitted, 1);
    assert_eq!(report.state.unwrap().latest_fetched_time, 2000);
}

#[tokio::test]
async fn test_jql_mode_posts_script_and_projects_flat_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            json!([{ "name": "alice", "time": 100 }, { "name": "bob", "time": 200 }]).to_string(),
        ))
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["jql_mode"] = json!(true);
    config["jql_script"] = json!("function main() { return People(); }");
    config["columns"] = json!([
        { "name": "name", "type": "string" },
        { "name": "time", "type": "long" },
    ]);

    let mut sink = MemorySink::new();
    let report = runner(config).run(&mut sink).await.unwrap();

    assert_eq!(
        sink.rows,
        vec![
            vec![json!("alice"), json!(100)],
            vec![json!("bob"), json!(200)],
        ]
    );
    assert_eq!(report.records_emitted, 2);
}

#[tokio::test]
async fn test_jql_mode_skips_records_already_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            json!([{ "name": "alice", "time": 100 }, { "name": "bob", "time": 600 }]).to_string(),
        ))
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["jql_mode"] = json!(true);
    config["jql_script"] = json!("function main() { return People(); }");
    config["latest_fetched_time"] = json!(500);
    config["columns"] = json!([
        { "name": "name", "type": "string" },
        { "name": "time", "type": "long" },
    ]);

    let mut sink = MemorySink::new();
    let report = runner(config).run(&mut sink).await.unwrap();

    assert_eq!(sink.rows, vec![vec![json!("bob"), json!(600)]]);
    assert_eq!(report.records_emitted, 1);
    assert_eq!(report.records_skipped_seen, 1);
    assert_eq!(report.state.unwrap().latest_fetched_time, 600);
}

#[tokio::test]
async fn test_jql_marker_outside_schema_ingests_unfiltered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jql"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            json!([{ "name": "alice", "time": 100 }, { "name": "bob", "time": 600 }]).to_string(),
        ))
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["jql_mode"] = json!(true);
    config["jql_script"] = json!("function main() { return People(); }");
    config["latest_fetched_time"] = json!(500);
    config["columns"] = json!([{ "name": "name", "type": "string" }]);

    let mut sink = MemorySink::new();
    let report = runner(config).run(&mut sink).await.unwrap();

    assert_eq!(report.records_emitted, 2);
    assert_eq!(report.records_skipped_seen, 0);
    assert_eq!(report.state.unwrap().latest_fetched_time, 500);
}

#[tokio::test]
async fn test_run_with_future_from_date_is_empty_but_resumable() {
    let server = MockServer::start().await;
    let today = Utc::now().date_naive();
    let future = (today + chrono::Days::new(5)).to_string();
    let mut config = base_config(&server);
    config["from_date"] = json!(future);
    config["latest_fetched_time"] = json!(123);

    let mut sink = MemorySink::new();
    let report = runner(config).run(&mut sink).await.unwrap();

    assert_eq!(report.records_emitted, 0);
    assert!(sink.finished);

    // An empty plan still anchors the resume state at yesterday.
    let state = report.state.unwrap();
    assert_eq!(state.latest_fetched_time, 123);
    assert_eq!(state.to_date, today - chrono::Days::new(1));
}

#[tokio::test]
async fn test_guess_infers_columns_from_sample() {
    let server = MockServer::start().await;
    let body = json!({
        "event": "signup",
        "properties": { "time": 123, "plan": "pro", "seats": 3 }
    })
    .to_string();
    Mock::given(method("GET"))
        .and(path("/export"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{body}\n")))
        .mount(&server)
        .await;

    let mut config = base_config(&server);
    config["from_date"] = json!("2020-01-01");

    let columns = runner(config).guess().await.unwrap();
    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["time", "event", "plan", "seats"]);
}
