// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types for the control-plane RPCs.
//!
//! Five methods: register, get-config, heartbeat, unregister, and the
//! server-streaming operate channel. All requests additionally carry the
//! `company-uuid` metadata tag, which is transport-level and not part of
//! these bodies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::process::HeartbeatState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub version: String,
    pub object_id: u64,
    pub ipv4: String,
    pub ipv6: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterReply {
    #[serde(default)]
    pub config_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConfigRequest {
    pub config_uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConfigReply {
    /// Full configuration document; empty means "keep what you have".
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub config_uuid: String,
    pub object_id: u64,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub process_list: Vec<HeartbeatProcess>,
}

/// One table entry as reported in a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatProcess {
    pub name: String,
    pub state: HeartbeatState,
    /// Unix seconds the process started, 0 when it never ran.
    pub start_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReply {
    #[serde(default)]
    pub config_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterRequest {
    pub object_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperateRequest {
    pub object_id: u64,
}

/// Operator command pushed over the operate stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperateMessage {
    pub cmd: AgentCmd,
    #[serde(default)]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCmd {
    Start,
    Stop,
}

/// Transport-level RPC failure, as seen by the client state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
