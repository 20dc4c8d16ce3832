//! Refresh triggers: durable-store mutation events and foreign bus
//! notifications, debounced into a single refresh per burst.
//!
//! The trigger graph is deliberately acyclic: the mutation gateway
//! refreshes directly after its own writes and this listener never writes
//! to the store, so a refresh can never re-trigger itself. Overlapping
//! triggers (a gateway write plus the store event it emitted) cost at most
//! one extra refresh, which the debounce window usually coalesces away.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ldk_core::bridge_ipc::{decode_frame, BridgeMsg, DEFAULT_MAX_FRAME_BYTES};
use ldk_storage::StoreEvent;

use crate::bridge::MessageBus;
use crate::engine::SyncEngine;

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    /// Quiet window after a trigger during which further triggers coalesce
    /// into the same refresh.
    pub debounce: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
        }
    }
}

/// Spawn the change-listener task for the lifetime of the application.
/// Flip the watch channel to true to stop it.
pub fn spawn_change_listener(
    engine: Arc<SyncEngine>,
    bus: MessageBus,
    store_events: broadcast::Receiver<StoreEvent>,
    config: ListenerConfig,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    // Subscribe before spawning so notifications published right after this
    // call returns cannot slip past the listener.
    let inbound = bus.subscribe_inbound();
    tokio::spawn(run(engine, inbound, store_events, config, shutdown))
}

async fn run(
    engine: Arc<SyncEngine>,
    mut inbound: broadcast::Receiver<String>,
    mut store_events: broadcast::Receiver<StoreEvent>,
    config: ListenerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut store_open = true;
    let mut bus_open = true;

    info!(event = "change_listener_start", debounce_ms = config.debounce.as_millis() as u64);

    loop {
        if !store_open && !bus_open {
            debug!(event = "change_listener_sources_closed");
            break;
        }

        let triggered = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                false
            }
            event = store_events.recv(), if store_open => {
                match event {
                    Ok(event) => {
                        debug!(event = "store_trigger", change = ?event);
                        true
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(event = "store_trigger_lagged", skipped = skipped);
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        store_open = false;
                        false
                    }
                }
            }
            frame = inbound.recv(), if bus_open => {
                match frame {
                    Ok(frame) => is_foreign_change(&frame),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(event = "bus_trigger_lagged", skipped = skipped);
                        true
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        bus_open = false;
                        false
                    }
                }
            }
        };

        if !triggered {
            continue;
        }

        // Drain the burst: keep absorbing triggers until the quiet window
        // passes, then refresh once.
        let quiet = tokio::time::sleep(config.debounce);
        tokio::pin!(quiet);
        loop {
            tokio::select! {
                _ = &mut quiet => break,
                event = store_events.recv(), if store_open => {
                    match event {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => store_open = false,
                    }
                }
                frame = inbound.recv(), if bus_open => {
                    match frame {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => bus_open = false,
                    }
                }
            }
        }

        debug!(event = "debounced_refresh");
        engine.refresh().await;
    }

    info!(event = "change_listener_stop");
}

/// Only the ambient notifications trigger a refresh; snapshot responses
/// and mirrored mutations are part of request flows handled elsewhere.
fn is_foreign_change(frame: &str) -> bool {
    match decode_frame(frame, DEFAULT_MAX_FRAME_BYTES) {
        Ok(envelope) => matches!(
            envelope.msg,
            BridgeMsg::DataChanged | BridgeMsg::LinksUpserted
        ),
        Err(err) => {
            debug!(event = "listener_decode_skip", error = %err);
            false
        }
    }
}
