// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events processed by the supervisor loop.
//!
//! Everything that happens off the loop (the file watcher thread, per-child
//! wait tasks, RPC completion tasks) is marshaled into one of these
//! variants and handled sequentially on the loop.

use crate::control::{GetConfigReply, HeartbeatReply, OperateMessage, RegisterReply, RpcError};

#[derive(Debug)]
pub enum Event {
    /// The local configuration file was created, modified, or deleted.
    ConfigFileChanged,

    /// A supervised child exited. `pid` guards against a stale waiter
    /// racing a respawn of the same name.
    ProcessExited {
        name: String,
        pid: u32,
        code: Option<i32>,
    },

    RegisterCompleted {
        result: Result<RegisterReply, RpcError>,
    },

    HeartbeatCompleted {
        result: Result<HeartbeatReply, RpcError>,
    },

    GetConfigCompleted {
        result: Result<GetConfigReply, RpcError>,
    },

    /// Operator command received on the operate stream.
    OperateCommand {
        generation: u64,
        message: OperateMessage,
    },

    /// The operate stream ended, by server close or error. Stale
    /// generations are ignored by the client.
    OperateClosed { generation: u64 },
}
