// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane client state machine.
//!
//! The client lives on the supervisor loop. Every RPC runs in a spawned
//! task whose entire interaction with client state is posting a completion
//! event back to the bus; the loop then calls the matching `on_*` handler.
//! Timers (heartbeat, register retry, health check) are one-shot entries in
//! the client's scheduler, polled by the loop's tick.

mod transport;

pub use transport::{ControllerTransport, HttpTransport};

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wm_core::{
    next_backoff, AgentCmd, Event, GetConfigReply, GetConfigRequest, HeartbeatReply,
    HeartbeatRequest, ManagerConfig, OperateMessage, OperateRequest, RegisterReply,
    RegisterRequest, RpcError, Scheduler, TimerId, UnregisterRequest,
};

use crate::config_store::{ApplyOutcome, ConfigStore};
use crate::event_bus::EventBus;
use crate::netif;
use crate::supervisor::Reconciler;

/// Nominal heartbeat period.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Observational connection-state log period.
pub const HEALTH_CHECK_PERIOD: Duration = Duration::from_secs(30);

/// Consecutive heartbeat failures tolerated before re-registering.
const MAX_HEARTBEAT_FAILURES: u32 = 5;

/// Builds a transport for a server address; swapped in tests and rebuilt
/// when the control plane moves.
pub type TransportFactory = Box<dyn Fn(&str) -> Arc<dyn ControllerTransport> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Registering,
    Active,
    Unregistering,
}

/// Loop-owned collaborators handed into each handler call.
pub struct ControlDeps<'a> {
    pub config: &'a ConfigStore,
    pub reconciler: &'a Reconciler,
}

pub struct ControlClient {
    transport: Arc<dyn ControllerTransport>,
    factory: TransportFactory,
    server_address: String,
    phase: Phase,
    config_uuid: String,
    cached_config: String,
    hostname: String,
    object_id: u64,
    ipv4: String,
    ipv6: String,
    heartbeat_fail_count: u32,
    last_backoff_secs: u64,
    register_inflight: bool,
    stream_generation: u64,
    stream_cancel: Option<CancellationToken>,
    scheduler: Scheduler,
    bus: EventBus,
}

impl ControlClient {
    pub fn new(server_address: String, config: &ManagerConfig, bus: EventBus) -> Self {
        let company_uuid = config.company_uuid.clone();
        let factory: TransportFactory =
            Box::new(move |address| Arc::new(HttpTransport::new(address, &company_uuid)));
        Self::with_factory(server_address, config, bus, factory)
    }

    pub fn with_factory(
        server_address: String,
        config: &ManagerConfig,
        bus: EventBus,
        factory: TransportFactory,
    ) -> Self {
        let transport = factory(&server_address);
        let ips = netif::local_ip(&config.network_interface);
        let hostname = hostname();
        let object_id = machine_object_id();
        info!(
            hostname = %hostname,
            object_id,
            ipv4 = %ips.ipv4,
            ipv6 = %ips.ipv6,
            server = %server_address,
            "control client identity"
        );

        Self {
            transport,
            factory,
            server_address,
            phase: Phase::Disconnected,
            config_uuid: String::new(),
            cached_config: String::new(),
            hostname,
            object_id,
            ipv4: ips.ipv4,
            ipv6: ips.ipv6,
            heartbeat_fail_count: 0,
            last_backoff_secs: 0,
            register_inflight: false,
            stream_generation: 0,
            stream_cancel: None,
            scheduler: Scheduler::new(),
            bus,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timer_enabled(&self, id: TimerId) -> bool {
        self.scheduler.enabled(id)
    }

    /// Drain due timers; the loop feeds each into [`Self::on_timer`].
    pub fn fired_timers(&mut self, now: Instant) -> Vec<TimerId> {
        self.scheduler.fired(now)
    }

    /// Begin the connection: arm the keepalive heartbeat and health check,
    /// then register. Registration immediately disables the heartbeat, so
    /// none fires before the first successful register.
    pub fn start(&mut self, deps: &ControlDeps) {
        self.scheduler
            .schedule_after(TimerId::Heartbeat, HEARTBEAT_PERIOD);
        self.scheduler
            .schedule_after(TimerId::HealthCheck, HEALTH_CHECK_PERIOD);
        self.issue_register(deps);
    }

    pub fn on_timer(&mut self, id: TimerId, deps: &ControlDeps) {
        match id {
            TimerId::Heartbeat => self.issue_heartbeat(deps),
            TimerId::RegisterRetry => self.issue_register(deps),
            TimerId::HealthCheck => {
                debug!(phase = ?self.phase, server = %self.server_address, "control channel state");
                self.scheduler
                    .schedule_after(TimerId::HealthCheck, HEALTH_CHECK_PERIOD);
            }
        }
    }

    /// Issue a register RPC. At most one is in flight: a second issue while
    /// one is pending coalesces into it. The heartbeat timer stays disabled
    /// for the whole registering phase.
    fn issue_register(&mut self, deps: &ControlDeps) {
        self.phase = Phase::Registering;
        self.scheduler.cancel(TimerId::Heartbeat);

        if self.register_inflight {
            debug!("register already in flight, coalescing");
            return;
        }
        self.register_inflight = true;

        let config = deps.config.snapshot();
        let request = RegisterRequest {
            name: self.hostname.clone(),
            version: config.version,
            object_id: self.object_id,
            ipv4: self.ipv4.clone(),
            ipv6: self.ipv6.clone(),
        };
        info!(?request, "registering with control plane");

        let transport = Arc::clone(&self.transport);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let result = transport.register(request).await;
            bus.send(Event::RegisterCompleted { result });
        });
    }

    pub fn on_register_completed(
        &mut self,
        result: Result<RegisterReply, RpcError>,
        deps: &ControlDeps,
    ) {
        self.register_inflight = false;

        match result {
            Ok(reply) => {
                info!(config_uuid = %reply.config_uuid, "registered");
                self.last_backoff_secs = 0;
                self.scheduler.cancel(TimerId::RegisterRetry);
                self.phase = Phase::Active;

                if !reply.config_uuid.is_empty() && reply.config_uuid != self.config_uuid {
                    self.config_uuid = reply.config_uuid;
                    self.issue_get_config();
                }

                // immediate heartbeat; this also rearms the timer
                self.issue_heartbeat(deps);
                self.open_operate_stream();
            }
            Err(e) => {
                self.last_backoff_secs = next_backoff(self.last_backoff_secs);
                info!(
                    error = %e,
                    retry_in_secs = self.last_backoff_secs,
                    "register failed"
                );
                self.scheduler.schedule_after(
                    TimerId::RegisterRetry,
                    Duration::from_secs(self.last_backoff_secs),
                );
                self.scheduler.cancel(TimerId::Heartbeat);
            }
        }
    }

    fn issue_get_config(&mut self) {
        let request = GetConfigRequest {
            config_uuid: self.config_uuid.clone(),
        };
        let transport = Arc::clone(&self.transport);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let result = transport.get_config(request).await;
            bus.send(Event::GetConfigCompleted { result });
        });
    }

    /// Adopt a fetched configuration. Returns the outcome the loop must
    /// apply to the process pool and HTTP server.
    pub fn on_get_config_completed(
        &mut self,
        result: Result<GetConfigReply, RpcError>,
        deps: &ControlDeps,
    ) -> Option<ApplyOutcome> {
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                error!("get config failed: {e}");
                return None;
            }
        };

        if reply.content.is_empty() {
            info!("empty config from server, keeping local");
            return None;
        }
        if reply.content == self.cached_config {
            debug!("config unchanged, ignoring");
            return None;
        }

        self.cached_config = reply.content.clone();
        let outcome = match deps.config.on_server_config(&reply.content) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("server config rejected: {e}");
                return None;
            }
        };

        if let Some(address) = deps.config.server_address() {
            if address != self.server_address {
                info!(%address, "control plane moved, reconnecting");
                self.server_address = address;
                self.transport = (self.factory)(&self.server_address);
                self.issue_register(deps);
            }
        }

        Some(outcome)
    }

    fn issue_heartbeat(&mut self, deps: &ControlDeps) {
        let config = deps.config.snapshot();
        let request = HeartbeatRequest {
            config_uuid: self.config_uuid.clone(),
            object_id: self.object_id,
            name: self.hostname.clone(),
            version: config.version,
            process_list: deps.reconciler.heartbeat_snapshot(),
        };
        debug!(?request, "heartbeat");

        let transport = Arc::clone(&self.transport);
        let bus = self.bus.clone();
        tokio::spawn(async move {
            let result = transport.heartbeat(request).await;
            bus.send(Event::HeartbeatCompleted { result });
        });

        self.scheduler
            .schedule_after(TimerId::Heartbeat, HEARTBEAT_PERIOD);
    }

    pub fn on_heartbeat_completed(
        &mut self,
        result: Result<HeartbeatReply, RpcError>,
        deps: &ControlDeps,
    ) {
        match result {
            Ok(reply) => {
                self.heartbeat_fail_count = 0;
                if !reply.config_uuid.is_empty() && reply.config_uuid != self.config_uuid {
                    info!(config_uuid = %reply.config_uuid, "heartbeat carries new config");
                    self.config_uuid = reply.config_uuid;
                    self.issue_get_config();
                }
                self.scheduler
                    .schedule_after(TimerId::Heartbeat, HEARTBEAT_PERIOD);
            }
            Err(e) => {
                self.heartbeat_fail_count += 1;
                warn!(
                    error = %e,
                    failures = self.heartbeat_fail_count,
                    "heartbeat failed"
                );
                if self.heartbeat_fail_count > MAX_HEARTBEAT_FAILURES {
                    self.heartbeat_fail_count = 0;
                    self.scheduler.cancel(TimerId::Heartbeat);
                    self.issue_register(deps);
                } else {
                    self.scheduler
                        .schedule_after(TimerId::Heartbeat, HEARTBEAT_PERIOD);
                }
            }
        }
    }

    /// Open (or replace) the operate stream. The previous stream's task is
    /// cancelled and its remaining events ignored via the generation tag.
    fn open_operate_stream(&mut self) {
        if let Some(token) = self.stream_cancel.take() {
            token.cancel();
        }
        self.stream_generation += 1;
        let generation = self.stream_generation;

        let token = CancellationToken::new();
        self.stream_cancel = Some(token.clone());

        let transport = Arc::clone(&self.transport);
        let bus = self.bus.clone();
        let request = OperateRequest {
            object_id: self.object_id,
        };

        tokio::spawn(async move {
            let mut stream = match transport.operate(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("operate stream failed to open: {e}");
                    bus.send(Event::OperateClosed { generation });
                    return;
                }
            };
            loop {
                tokio::select! {
                    // superseded by a newer stream; end without a close event
                    _ = token.cancelled() => return,
                    item = stream.next() => match item {
                        Some(Ok(message)) => {
                            bus.send(Event::OperateCommand { generation, message });
                        }
                        Some(Err(e)) => {
                            warn!("operate stream error: {e}");
                            bus.send(Event::OperateClosed { generation });
                            return;
                        }
                        None => {
                            info!("operate stream closed by server");
                            bus.send(Event::OperateClosed { generation });
                            return;
                        }
                    }
                }
            }
        });
    }

    pub fn on_operate_command(
        &mut self,
        generation: u64,
        message: OperateMessage,
        deps: &ControlDeps,
    ) {
        if generation != self.stream_generation {
            return;
        }
        info!(?message, "operator command");

        for name in &message.names {
            match message.cmd {
                AgentCmd::Start => deps.reconciler.start_one(name),
                AgentCmd::Stop => deps.reconciler.stop_one(name),
            }
        }

        // report the new table to the server right away
        self.issue_heartbeat(deps);
    }

    pub fn on_operate_closed(&mut self, generation: u64, deps: &ControlDeps) {
        if generation != self.stream_generation {
            return;
        }
        if self.phase == Phase::Active {
            self.issue_register(deps);
        }
    }

    /// Graceful shutdown: cancel timers and the stream, then unregister
    /// with the usual deadline. Failure is logged and non-fatal.
    pub async fn shutdown(&mut self) {
        self.phase = Phase::Unregistering;
        self.scheduler.cancel(TimerId::Heartbeat);
        self.scheduler.cancel(TimerId::RegisterRetry);
        self.scheduler.cancel(TimerId::HealthCheck);
        if let Some(token) = self.stream_cancel.take() {
            token.cancel();
        }

        let request = UnregisterRequest {
            object_id: self.object_id,
        };
        match self.transport.unregister(request).await {
            Ok(()) => info!("unregistered from control plane"),
            Err(e) => warn!("unregister failed: {e}"),
        }
        self.phase = Phase::Disconnected;
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_default()
}

/// Stable per-host identifier: sha2 over the machine id (hostname as a
/// last resort), folded to 64 bits.
fn machine_object_id() -> u64 {
    let seed = std::fs::read_to_string("/etc/machine-id")
        .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
        .map(|id| id.trim().to_string())
        .unwrap_or_else(|_| hostname());

    let digest = Sha256::digest(seed.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
