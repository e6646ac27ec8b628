// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP introspection: liveness and the live process listing.
//!
//! Two routes on the shared runtime. The server restarts when the
//! `http_server` configuration changes; an empty bind disables it.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wm_core::{HttpServerConfig, ProcessStatus};

use crate::supervisor::ProcessTable;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, io::Error),
}

pub struct HttpServer {
    table: Arc<Mutex<ProcessTable>>,
    running: Option<Running>,
}

struct Running {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    addr: SocketAddr,
}

impl HttpServer {
    pub fn new(table: Arc<Mutex<ProcessTable>>) -> Self {
        Self {
            table,
            running: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    pub async fn start(&mut self, config: &HttpServerConfig) -> Result<(), HttpError> {
        if config.bind.is_empty() {
            info!("http introspection disabled");
            return Ok(());
        }

        let listener = tokio::net::TcpListener::bind(&config.bind)
            .await
            .map_err(|e| HttpError::Bind(config.bind.clone(), e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HttpError::Bind(config.bind.clone(), e))?;

        let mut health_path = if config.health_path.is_empty() {
            "/health".to_string()
        } else {
            config.health_path.clone()
        };
        if !health_path.starts_with('/') {
            health_path.insert(0, '/');
        }

        let app = Router::new()
            .route(&health_path, get(health))
            .route("/process/list", get(process_list))
            .with_state(Arc::clone(&self.table));

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = server.await {
                error!("http server error: {e}");
            }
        });

        info!(%addr, health_path = %health_path, "http introspection listening");
        self.running = Some(Running {
            shutdown,
            task,
            addr,
        });
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown.cancel();
            let _ = running.task.await;
            info!("http introspection stopped");
        }
    }

    pub async fn restart(&mut self, config: &HttpServerConfig) -> Result<(), HttpError> {
        self.stop().await;
        self.start(config).await
    }
}

/// Liveness only: always up while the daemon runs.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "UP"}))
}

#[derive(Serialize)]
struct ProcessEntry {
    name: String,
    pid: Option<u32>,
    status: u8,
}

#[derive(Serialize)]
struct ProcessListResponse {
    process: Vec<ProcessEntry>,
    /// Legend: symbolic status name -> numeric code used in `process`.
    status: std::collections::BTreeMap<&'static str, u8>,
}

async fn process_list(
    State(table): State<Arc<Mutex<ProcessTable>>>,
) -> Json<ProcessListResponse> {
    let process = table
        .lock()
        .iter()
        .map(|instance| ProcessEntry {
            name: instance.name.clone(),
            pid: instance.pid,
            status: instance.status.code(),
        })
        .collect();

    let status = ProcessStatus::ALL
        .iter()
        .map(|status| (status.label(), status.code()))
        .collect();

    Json(ProcessListResponse { process, status })
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
