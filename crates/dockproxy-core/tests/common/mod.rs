//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without talking to a real container runtime or proxy.

#![allow(dead_code)]

use chrono::Utc;
use dockproxy_core::config::ControllerConfig;
use dockproxy_core::controller::{ControllerEvent, ControllerState, ReconcileController};
use dockproxy_core::error::{Error, Result};
use dockproxy_core::traits::{
    ContainerEvent, ContainerEventKind, ContainerEventStream, ContainerRuntime,
    ContainerSnapshot, DocumentStore, ProxyEngine,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Debounce used by the contract tests
pub const TEST_DEBOUNCE_MS: u64 = 100;

/// A container runtime whose containers and events are driven by the test
///
/// Clones share state, so the test keeps one handle and gives the
/// controller another.
#[derive(Clone)]
pub struct ControlledRuntime {
    containers: Arc<Mutex<Vec<ContainerSnapshot>>>,
    list_calls: Arc<AtomicUsize>,
    watch_calls: Arc<AtomicUsize>,
    list_delay_ms: Arc<AtomicU64>,
    event_tx: mpsc::UnboundedSender<Result<ContainerEvent>>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<Result<ContainerEvent>>>>>,
}

impl ControlledRuntime {
    pub fn new(containers: Vec<ContainerSnapshot>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            containers: Arc::new(Mutex::new(containers)),
            list_calls: Arc::new(AtomicUsize::new(0)),
            watch_calls: Arc::new(AtomicUsize::new(0)),
            list_delay_ms: Arc::new(AtomicU64::new(0)),
            event_tx,
            event_rx: Arc::new(Mutex::new(Some(event_rx))),
        }
    }

    /// Replace the running container set
    pub fn set_containers(&self, containers: Vec<ContainerSnapshot>) {
        *self.containers.lock().unwrap() = containers;
    }

    /// Make every enumeration take this long
    pub fn set_list_delay(&self, delay: Duration) {
        self.list_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of enumerations, i.e. passes that reached the runtime
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    /// Deliver a lifecycle event
    pub fn emit(&self, kind: ContainerEventKind, name: &str) {
        let event = ContainerEvent::new(kind, &format!("{name}-0123456789"), name, Utc::now());
        let _ = self.event_tx.send(Ok(event));
    }

    /// Deliver the terminal error signal
    pub fn fail_stream(&self, message: &str) {
        let _ = self.event_tx.send(Err(Error::event_stream(message)));
    }

    /// Close the event stream without an error
    ///
    /// Takes effect for a subscription made after this call.
    pub fn close_stream(&self) {
        self.event_rx.lock().unwrap().take();
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for ControlledRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSnapshot>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.list_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        Ok(self.containers.lock().unwrap().clone())
    }

    fn watch(&self, _cancel: CancellationToken) -> ContainerEventStream {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);

        match self.event_rx.lock().unwrap().take() {
            Some(rx) => Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)),
            None => Box::pin(tokio_stream::empty::<Result<ContainerEvent>>()),
        }
    }

    fn runtime_name(&self) -> &'static str {
        "controlled"
    }
}

/// A proxy engine that records calls and fails on demand
#[derive(Clone, Default)]
pub struct RecordingEngine {
    validate_calls: Arc<AtomicUsize>,
    reload_calls: Arc<AtomicUsize>,
    fail_validate: Arc<AtomicBool>,
    fail_reload: Arc<AtomicBool>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn reload_calls(&self) -> usize {
        self.reload_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_validate(&self, fail: bool) {
        self.fail_validate.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reload(&self, fail: bool) {
        self.fail_reload.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ProxyEngine for RecordingEngine {
    async fn validate(&self) -> Result<()> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_validate.load(Ordering::SeqCst) {
            return Err(Error::validation(
                "recording",
                "exit status: 1",
                "unknown directive \"upstrem\"",
            ));
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.reload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reload.load(Ordering::SeqCst) {
            return Err(Error::reload("recording", "exit status: 1", "no master process"));
        }
        Ok(())
    }

    fn engine_name(&self) -> &'static str {
        "recording"
    }
}

/// A container publishing TCP ports
pub fn tcp_container(name: &str, ip: [u8; 4], ports: &str) -> ContainerSnapshot {
    ContainerSnapshot::new(format!("{name}-0123456789abcdef"), name, Some(IpAddr::from(ip)))
        .with_label("proxy.tcp.ports", ports)
}

/// A container routed by hostname
pub fn http_container(name: &str, ip: [u8; 4], hosts: &str, port: &str) -> ContainerSnapshot {
    ContainerSnapshot::new(format!("{name}-0123456789abcdef"), name, Some(IpAddr::from(ip)))
        .with_label("proxy.http.host", hosts)
        .with_label("proxy.http.port", port)
}

/// A container with no proxy labels
pub fn unlabeled_container(name: &str, ip: [u8; 4]) -> ContainerSnapshot {
    ContainerSnapshot::new(format!("{name}-0123456789abcdef"), name, Some(IpAddr::from(ip)))
        .with_label("com.example.team", "payments")
}

/// Controller config with a short debounce for tests
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        debounce_ms: TEST_DEBOUNCE_MS,
        event_channel_capacity: 100,
    }
}

/// Sleep for a number of milliseconds
pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// A controller running on its own task
pub struct RunningController {
    pub cancel: CancellationToken,
    pub handle: JoinHandle<Result<()>>,
    pub state: watch::Receiver<ControllerState>,
    pub events: mpsc::Receiver<ControllerEvent>,
}

impl RunningController {
    /// Cancel and wait for the controller to return
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("controller stops within 5 seconds")
            .expect("controller task does not panic")
    }

    /// Drain every controller event emitted so far
    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Build a controller from test doubles and run it
pub fn spawn_controller(
    runtime: &ControlledRuntime,
    engine: &RecordingEngine,
    store: Box<dyn DocumentStore>,
) -> RunningController {
    let (controller, events) = ReconcileController::new(
        Box::new(runtime.clone()),
        Box::new(engine.clone()),
        store,
        test_config(),
    )
    .expect("controller construction succeeds");

    let state = controller.subscribe_state();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { controller.run(token).await });

    RunningController {
        cancel,
        handle,
        state,
        events,
    }
}
