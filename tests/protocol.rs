//! Stdio protocol tests: JSON lines in, JSON envelopes out.

#![cfg(unix)]

mod common;

use serde_json::{json, Value};

use common::Fixture;
use rwork::{handle_line, ErrorCode};

fn request(id: u64, op: &str, args: Value) -> String {
    json!({"id": id, "op": op, "args": args}).to_string()
}

#[tokio::test]
async fn full_session_over_json_lines() {
    let fx = Fixture::new();
    let agent = &fx.agent;
    let root = fx.workspace.path().to_string_lossy().into_owned();

    let reply = handle_line(agent, &request(1, "get_state", json!({}))).await;
    assert_eq!(reply.id, json!(1));
    assert_eq!(reply.response.error.unwrap().code, ErrorCode::NoWorkspace);

    let reply = handle_line(agent, &request(2, "set_workspace", json!({"path": root}))).await;
    assert!(reply.response.ok);

    let reply = handle_line(
        agent,
        &request(
            3,
            "write_code",
            json!({"code": "printf 'k\\tv\\n1\\t2\\n' > t.tsv\n", "overwrite": true}),
        ),
    )
    .await;
    assert!(reply.response.ok, "{:?}", reply.response.error);

    let reply = handle_line(agent, &request(4, "run_script", json!({"timeout_secs": 30}))).await;
    let data = reply.response.data.expect("run_script failed");
    assert_eq!(data["exit_code"], json!(0));
    assert_eq!(data["success"], json!(true));
    assert!(data["new_or_modified_files"]
        .as_array()
        .unwrap()
        .contains(&json!("t.tsv")));

    let reply = handle_line(agent, &request(5, "preview_table", json!({"name": "t.tsv"}))).await;
    let data = reply.response.data.unwrap();
    assert_eq!(data["header"], json!(["k", "v"]));
    assert_eq!(data["delimiter"], json!("\t"));

    let reply = handle_line(
        agent,
        &request(6, "read_export", json!({"name": "t.tsv", "as_text": false})),
    )
    .await;
    assert_eq!(
        reply.response.data.unwrap()["data_b64"],
        json!("awl2CjEJMgo=")
    );

    let reply = handle_line(agent, &request(7, "list_exports", json!({"pattern": "../*"}))).await;
    assert_eq!(reply.response.error.unwrap().code, ErrorCode::UnsafePath);

    let reply = handle_line(agent, &request(8, "get_state", Value::Null)).await;
    let data = reply.response.data.unwrap();
    assert_eq!(data["configured"], json!(true));
    assert!(data["exports_manifest"]["t.tsv"].is_number());
}

#[tokio::test]
async fn get_state_twice_is_identical() {
    let fx = Fixture::bound();

    let first = handle_line(&fx.agent, &request(1, "get_state", json!({}))).await;
    let second = handle_line(&fx.agent, &request(1, "get_state", json!({}))).await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn timeout_failure_carries_details() {
    let fx = Fixture::bound();
    std::fs::write(fx.path("agent.r"), "exec sleep 30\n").unwrap();

    let reply = handle_line(
        &fx.agent,
        &request(
            9,
            "run_script",
            json!({"timeout_secs": 1, "save_session": false}),
        ),
    )
    .await;

    let failure = reply.response.error.expect("expected timeout");
    assert_eq!(failure.code, ErrorCode::Timeout);
    let details = failure.details.unwrap();
    assert_eq!(details["timeout_secs"], json!(1));
    assert!(details["duration_ms"].as_u64().unwrap() >= 1000);
}

#[tokio::test]
async fn malformed_and_unknown_requests() {
    let fx = Fixture::new();

    let reply = handle_line(&fx.agent, "not even json").await;
    assert_eq!(reply.id, Value::Null);
    assert_eq!(
        reply.response.error.unwrap().code,
        ErrorCode::InvalidArgument
    );

    let reply = handle_line(&fx.agent, r#"{"id": "a", "op": "launch"}"#).await;
    assert_eq!(reply.id, json!("a"));
    assert_eq!(
        reply.response.error.unwrap().code,
        ErrorCode::UnknownOperation
    );
}
