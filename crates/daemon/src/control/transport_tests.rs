// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

use wm_core::AgentCmd;

fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, reqwest::Error>> + Unpin {
    stream::iter(
        parts
            .iter()
            .map(|part| Ok(part.as_bytes().to_vec()))
            .collect::<Vec<_>>(),
    )
}

#[tokio::test]
async fn messages_split_across_chunks() {
    let upstream = chunks(&[
        r#"{"cmd":"start","#,
        r#""names":["web"]}"#,
        "\n",
        r#"{"cmd":"stop","names":["db"]}"#,
        "\n",
    ]);

    let messages: Vec<_> = ndjson_stream(upstream).collect().await;

    assert_eq!(messages.len(), 2);
    let first = messages[0].as_ref().unwrap();
    assert_eq!(first.cmd, AgentCmd::Start);
    assert_eq!(first.names, vec!["web"]);
    let second = messages[1].as_ref().unwrap();
    assert_eq!(second.cmd, AgentCmd::Stop);
}

#[tokio::test]
async fn trailing_message_without_newline_is_delivered() {
    let upstream = chunks(&[r#"{"cmd":"start","names":["a"]}"#]);

    let messages: Vec<_> = ndjson_stream(upstream).collect().await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].as_ref().unwrap().names, vec!["a"]);
}

#[tokio::test]
async fn blank_lines_are_skipped() {
    let upstream = chunks(&["\n\n", r#"{"cmd":"stop","names":[]}"#, "\n\n"]);

    let messages: Vec<_> = ndjson_stream(upstream).collect().await;

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].as_ref().unwrap().cmd, AgentCmd::Stop);
}

#[tokio::test]
async fn malformed_line_yields_decode_error_then_continues() {
    let upstream = chunks(&["not json\n", r#"{"cmd":"start","names":["x"]}"#, "\n"]);

    let messages: Vec<_> = ndjson_stream(upstream).collect().await;

    assert_eq!(messages.len(), 2);
    assert!(matches!(messages[0], Err(RpcError::Decode(_))));
    assert_eq!(messages[1].as_ref().unwrap().names, vec!["x"]);
}

#[tokio::test]
async fn connection_refused_maps_to_transport_error() {
    // nothing listens on this port; the unary call must surface a
    // transport error rather than hanging
    let transport = HttpTransport::new("127.0.0.1:1", "co-test");
    let result = transport
        .get_config(GetConfigRequest {
            config_uuid: "u".to_string(),
        })
        .await;

    assert!(matches!(result, Err(RpcError::Transport(_))));
}
