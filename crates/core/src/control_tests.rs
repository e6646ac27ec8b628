// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn operate_message_wire_format() {
    let parsed: OperateMessage =
        serde_json::from_str(r#"{"cmd":"start","names":["web","worker"]}"#).unwrap();
    assert_eq!(parsed.cmd, AgentCmd::Start);
    assert_eq!(parsed.names, vec!["web", "worker"]);
}

#[test]
fn operate_message_names_default_empty() {
    let parsed: OperateMessage = serde_json::from_str(r#"{"cmd":"stop"}"#).unwrap();
    assert_eq!(parsed.cmd, AgentCmd::Stop);
    assert!(parsed.names.is_empty());
}

#[test]
fn replies_tolerate_missing_fields() {
    let register: RegisterReply = serde_json::from_str("{}").unwrap();
    assert!(register.config_uuid.is_empty());

    let config: GetConfigReply = serde_json::from_str("{}").unwrap();
    assert!(config.content.is_empty());

    let heartbeat: HeartbeatReply = serde_json::from_str("{}").unwrap();
    assert!(heartbeat.config_uuid.is_empty());
}

#[test]
fn heartbeat_request_round_trip() {
    let request = HeartbeatRequest {
        config_uuid: "u1".to_string(),
        object_id: 42,
        name: "host-1".to_string(),
        version: "0.5.0".to_string(),
        process_list: vec![HeartbeatProcess {
            name: "web".to_string(),
            state: HeartbeatState::Running,
            start_time: 1700000000,
        }],
    };

    let json = serde_json::to_string(&request).unwrap();
    let parsed: HeartbeatRequest = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, request);
}
