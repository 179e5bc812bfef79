//! Reconciliation controller
//!
//! The ReconcileController is responsible for:
//! - Running one unconditional pass at startup
//! - Debouncing container lifecycle events into single passes
//! - Driving each pass: enumerate, resolve, validate, render, commit,
//!   check, reload
//! - Owning shutdown
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ ContainerRuntime │─── ContainerEvent ───┐
//! └──────────────────┘                      │
//!                                           ▼
//!                               ┌──────────────────────┐
//!                               │ ReconcileController  │
//!                               │  (debounce, passes)  │
//!                               └──────────────────────┘
//!                                           │
//!       ┌───────────────────┬───────────────┼──────────────────┐
//!       │                   │               │                  │
//!       ▼                   ▼               ▼                  ▼
//! ┌───────────┐     ┌───────────────┐ ┌─────────────┐   ┌─────────────┐
//! │ resolve + │     │ DocumentStore │ │ ProxyEngine │   │   Events    │
//! │ conflicts │     │   (commit)    │ │ (check,     │   │  (notify)   │
//! │ + render  │     │               │ │  reload)    │   │             │
//! └───────────┘     └───────────────┘ └─────────────┘   └─────────────┘
//! ```
//!
//! ## State Machine
//!
//! ```text
//! Idle ──event──▶ DebouncePending ──timer──▶ Reconciling ──done──▶ Idle
//!                   │    ▲
//!                   └────┘ event re-arms the timer
//! any ──cancel / stream end──▶ ShuttingDown
//! ```
//!
//! Passes never overlap. Events that arrive during a pass wait in the
//! runtime's buffer and arm the next debounce once the pass is over.

mod event;

pub use event::{ControllerEvent, ControllerState, SyncOutcome};

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::conflict::validate_conflicts;
use crate::error::{Error, Result};
use crate::intent::resolve;
use crate::render::render;
use crate::traits::{ContainerRuntime, DocumentKind, DocumentStore, ProxyEngine, short_id};

/// Event-driven reconciliation controller
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileController::new()`]
/// 2. Start with [`ReconcileController::run()`], or call
///    [`ReconcileController::reconcile()`] /
///    [`ReconcileController::sync_documents()`] for a single pass
/// 3. Cancel the token to stop
///
/// ## Shutdown
///
/// Cancellation is observed between passes and while enumerating
/// containers. A pass that is past enumeration runs to completion so the
/// documents and the engine are never left half-updated by this process.
pub struct ReconcileController {
    runtime: Box<dyn ContainerRuntime>,
    engine: Box<dyn ProxyEngine>,
    store: Box<dyn DocumentStore>,

    /// Quiet period after the last event before a pass runs
    debounce: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ControllerEvent>,

    state_tx: watch::Sender<ControllerState>,
}

impl ReconcileController {
    /// Create a new controller
    ///
    /// # Returns
    ///
    /// A tuple of (controller, event_receiver) where event_receiver yields
    /// controller events
    pub fn new(
        runtime: Box<dyn ContainerRuntime>,
        engine: Box<dyn ProxyEngine>,
        store: Box<dyn DocumentStore>,
        config: ControllerConfig,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (state_tx, _) = watch::channel(ControllerState::Idle);

        let controller = Self {
            runtime,
            engine,
            store,
            debounce: config.debounce(),
            event_tx,
            state_tx,
        };

        Ok((controller, event_rx))
    }

    /// Observe controller state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state_tx.subscribe()
    }

    /// Current controller state
    pub fn state(&self) -> ControllerState {
        *self.state_tx.borrow()
    }

    /// Run the controller until cancelled
    ///
    /// The startup pass runs before the event subscription begins; if it
    /// fails, the controller does not start.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Startup pass failed or the event stream terminated
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.emit_event(ControllerEvent::Started {
            runtime: self.runtime.runtime_name().to_string(),
            engine: self.engine.engine_name().to_string(),
        });
        info!(
            "controller started runtime={} engine={} debounce_ms={}",
            self.runtime.runtime_name(),
            self.engine.engine_name(),
            self.debounce.as_millis()
        );

        match self.reconcile(&cancel).await {
            Ok(_) => {}
            Err(Error::Cancelled) => {
                self.stop("Shutdown requested during startup pass");
                return Ok(());
            }
            Err(e) => {
                self.stop("Startup pass failed");
                return Err(e);
            }
        }

        let mut events = self.runtime.watch(cancel.clone());

        let debounce = tokio::time::sleep(self.debounce);
        tokio::pin!(debounce);
        let mut pending = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Shutdown signal received");
                    self.stop("Shutdown signal");
                    return Ok(());
                }

                item = events.next() => match item {
                    Some(Ok(event)) => {
                        debug!(
                            "container event action={} name={} id={}",
                            event.kind, event.name, event.container_id
                        );
                        self.emit_event(ControllerEvent::EventReceived {
                            kind: event.kind,
                            container: event.name,
                        });
                        debounce
                            .as_mut()
                            .reset(tokio::time::Instant::now() + self.debounce);
                        pending = true;
                        self.set_state(ControllerState::DebouncePending);
                    }
                    Some(Err(e)) => {
                        error!("Event stream terminated: {}", e);
                        self.stop("Event stream error");
                        return Err(if e.is_fatal() {
                            e
                        } else {
                            Error::event_stream(e.to_string())
                        });
                    }
                    None => {
                        if cancel.is_cancelled() {
                            self.stop("Shutdown signal");
                            return Ok(());
                        }
                        error!("Event stream ended unexpectedly");
                        self.stop("Event stream closed");
                        return Err(Error::event_stream("event stream closed"));
                    }
                },

                _ = &mut debounce, if pending => {
                    pending = false;
                    match self.reconcile(&cancel).await {
                        Ok(_) | Err(Error::Cancelled) => {}
                        Err(e) => {
                            // Recoverable: wait for the next event
                            error!("Reconciliation failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    /// Run one full pass: commit the documents, then check and reload the
    /// engine if anything changed
    ///
    /// A failed check leaves the new documents on disk and skips the
    /// reload. A failed reload is reported; the documents stay as written.
    pub async fn reconcile(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        self.set_state(ControllerState::Reconciling);
        self.emit_event(ControllerEvent::ReconcileStarted);

        let result = self.reconcile_inner(cancel).await;

        match &result {
            Ok(outcome) => {
                self.emit_event(ControllerEvent::ReconcileSucceeded {
                    changed: outcome.changed(),
                    targets: outcome.targets,
                    skipped: outcome.skipped,
                });
            }
            Err(Error::Cancelled) => {
                info!("Reconciliation abandoned: shutdown requested");
            }
            Err(e) => {
                self.emit_event(ControllerEvent::ReconcileFailed {
                    error: e.to_string(),
                });
            }
        }

        self.set_state(ControllerState::Idle);
        result
    }

    async fn reconcile_inner(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let outcome = self.sync_documents(cancel).await?;

        if !outcome.changed() {
            info!(
                "configuration unchanged, skipping reload targets={}",
                outcome.targets
            );
            return Ok(outcome);
        }

        self.engine.validate().await?;
        debug!("{} configuration check passed", self.engine.engine_name());

        self.engine.reload().await?;
        info!(
            "{} reloaded targets={} stream={} http={}",
            self.engine.engine_name(),
            outcome.targets,
            outcome.stream.fingerprint.short(),
            outcome.http.fingerprint.short()
        );

        Ok(outcome)
    }

    /// Enumerate, resolve, validate, render and commit
    ///
    /// Does not touch the engine. Containers that fail to resolve are left
    /// out; a conflict fails the pass before anything is written.
    pub async fn sync_documents(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let containers = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            listed = self.runtime.list_containers() => listed?,
        };
        debug!("found {} running containers", containers.len());

        let mut intents = Vec::with_capacity(containers.len());
        let mut skipped = 0;

        for container in &containers {
            match resolve(container) {
                Ok(intent) => {
                    debug!(
                        "container={} id={} ip={} tcp_udp_ports={} http={}",
                        intent.name,
                        intent.id,
                        intent.address,
                        intent.ports.len(),
                        intent.host.is_some()
                    );
                    intents.push(intent);
                }
                Err(e) if e.is_silent() => {}
                Err(e) => {
                    warn!(
                        "skipping container id={}: {}",
                        short_id(&container.id),
                        e
                    );
                    skipped += 1;
                }
            }
        }

        let validated = validate_conflicts(intents)?;
        let targets = validated.len();
        let rendered = render(&validated);

        debug!("stream config:\n{}", rendered.stream.text());
        debug!("http config:\n{}", rendered.http.text());

        let stream = self.store.commit(DocumentKind::Stream, &rendered.stream).await?;
        let http = self.store.commit(DocumentKind::Http, &rendered.http).await?;

        let outcome = SyncOutcome {
            targets,
            skipped,
            stream,
            http,
        };

        info!(
            "documents committed targets={} skipped={} stream_changed={} http_changed={}",
            targets, skipped, stream.changed, http.changed
        );
        for (kind, commit) in [(DocumentKind::Stream, stream), (DocumentKind::Http, http)] {
            if commit.changed {
                debug!(
                    "{} document replaced at {}",
                    kind,
                    self.store.location(kind)
                );
            }
        }

        Ok(outcome)
    }

    fn stop(&self, reason: &str) {
        self.set_state(ControllerState::ShuttingDown);
        self.emit_event(ControllerEvent::Stopped {
            reason: reason.to_string(),
        });
    }

    fn set_state(&self, state: ControllerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("controller state {} -> {}", previous, state);
        }
    }

    /// Emit a controller event, dropping it if the channel is full
    fn emit_event(&self, event: ControllerEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Controller event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
