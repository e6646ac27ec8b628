// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane transport: four unary RPCs and the operate stream.
//!
//! The wire is JSON over HTTP. Unary calls are POSTs with a 10-second
//! deadline; the operate channel is a POST whose response body streams
//! newline-delimited JSON messages. Every request carries the
//! `company-uuid` metadata header. Tests substitute the trait with an
//! in-memory mock.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use wm_core::{
    GetConfigReply, GetConfigRequest, HeartbeatReply, HeartbeatRequest, OperateMessage,
    OperateRequest, RegisterReply, RegisterRequest, RpcError, UnregisterRequest,
};

/// Deadline applied to every unary call.
pub const RPC_DEADLINE: Duration = Duration::from_secs(10);

#[async_trait]
pub trait ControllerTransport: Send + Sync {
    async fn register(&self, request: RegisterRequest) -> Result<RegisterReply, RpcError>;

    async fn get_config(&self, request: GetConfigRequest) -> Result<GetConfigReply, RpcError>;

    async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatReply, RpcError>;

    async fn unregister(&self, request: UnregisterRequest) -> Result<(), RpcError>;

    /// Open the server-push operate channel. The stream yields operator
    /// commands until the server closes it or the connection breaks.
    async fn operate(
        &self,
        request: OperateRequest,
    ) -> Result<BoxStream<'static, Result<OperateMessage, RpcError>>, RpcError>;
}

pub struct HttpTransport {
    base: String,
    company_uuid: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(server_address: &str, company_uuid: &str) -> Self {
        Self {
            base: format!("http://{server_address}/agent/v1"),
            company_uuid: company_uuid.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn unary<Req, Reply>(&self, method: &str, request: &Req) -> Result<Reply, RpcError>
    where
        Req: Serialize + Sync,
        Reply: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.base))
            .header("company-uuid", &self.company_uuid)
            .timeout(RPC_DEADLINE)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<Reply>()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ControllerTransport for HttpTransport {
    async fn register(&self, request: RegisterRequest) -> Result<RegisterReply, RpcError> {
        self.unary("register", &request).await
    }

    async fn get_config(&self, request: GetConfigRequest) -> Result<GetConfigReply, RpcError> {
        self.unary("config", &request).await
    }

    async fn heartbeat(&self, request: HeartbeatRequest) -> Result<HeartbeatReply, RpcError> {
        self.unary("heartbeat", &request).await
    }

    async fn unregister(&self, request: UnregisterRequest) -> Result<(), RpcError> {
        let _: serde_json::Value = self.unary("unregister", &request).await?;
        Ok(())
    }

    async fn operate(
        &self,
        request: OperateRequest,
    ) -> Result<BoxStream<'static, Result<OperateMessage, RpcError>>, RpcError> {
        let response = self
            .client
            .post(format!("{}/operate", self.base))
            .header("company-uuid", &self.company_uuid)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(ndjson_stream(response.bytes_stream().boxed()).boxed())
    }
}

fn map_reqwest_error(error: reqwest::Error) -> RpcError {
    if error.is_timeout() {
        RpcError::DeadlineExceeded
    } else {
        RpcError::Transport(error.to_string())
    }
}

struct NdjsonState<S> {
    upstream: S,
    buffer: Vec<u8>,
    pending: VecDeque<Vec<u8>>,
    done: bool,
}

/// Split a chunked byte stream into newline-delimited [`OperateMessage`]s.
/// A transport error ends the stream after being yielded.
fn ndjson_stream<S, B>(upstream: S) -> impl Stream<Item = Result<OperateMessage, RpcError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
{
    let state = NdjsonState {
        upstream,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                let text = String::from_utf8_lossy(&line);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let item = serde_json::from_str::<OperateMessage>(trimmed)
                    .map_err(|e| RpcError::Decode(e.to_string()));
                return Some((item, state));
            }

            if state.done {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                        state.pending.push_back(line);
                    }
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(map_reqwest_error(e)), state));
                }
                None => {
                    state.done = true;
                    if state.buffer.is_empty() {
                        return None;
                    }
                    let line = std::mem::take(&mut state.buffer);
                    state.pending.push_back(line);
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
