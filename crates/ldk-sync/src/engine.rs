//! Raw-store snapshot cell and mutation gateway.
//!
//! The snapshot is the last full set of links retrieved from the capture
//! agent. It is owned by the engine and replaced only wholesale by
//! `refresh`; readers get a cloned projection and can never mutate it.

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use ldk_core::bridge_ipc::{
    BridgeMsg, DeleteLinksPayload, LinkStatusUpdate, UpdateLinksStatusPayload,
};
use ldk_core::link::{Link, LinkPatch};
use ldk_core::normalize::{normalize_link, RawLinkPayload};
use ldk_storage::LinkStore;

use crate::bridge::CaptureBridge;
use crate::SyncError;

pub struct SyncEngine {
    bridge: CaptureBridge,
    store: Mutex<LinkStore>,
    snapshot: RwLock<Vec<Link>>,
}

impl SyncEngine {
    pub fn new(bridge: CaptureBridge, store: LinkStore) -> Self {
        Self {
            bridge,
            store: Mutex::new(store),
            snapshot: RwLock::new(Vec::new()),
        }
    }

    /// Current snapshot, cloned. Callers own the copy; the engine's state
    /// is never handed out by reference.
    pub async fn links(&self) -> Vec<Link> {
        self.snapshot.read().await.clone()
    }

    /// Re-derive the snapshot from the authoritative source.
    ///
    /// A non-empty response replaces the snapshot wholesale. On an empty
    /// response (agent absent, timeout) the durable store takes over as
    /// the snapshot source when it has content, so local mutations stay
    /// visible and a populated store never renders as zero links; with
    /// nothing locally either, the previous snapshot is preserved rather
    /// than clobbered. Failures here are logged and swallowed: refresh
    /// runs after writes that already succeeded, and the view simply lags
    /// until the next successful refresh.
    pub async fn refresh(&self) {
        let links = self.bridge.request_snapshot().await;
        if !links.is_empty() {
            let count = links.len();
            *self.snapshot.write().await = links;
            info!(event = "snapshot_replaced", count = count);
            return;
        }

        match self.store.lock().await.list_links() {
            Ok(local) if !local.is_empty() => {
                let count = local.len();
                *self.snapshot.write().await = local;
                info!(event = "snapshot_local_fallback", count = count);
            }
            Ok(_) => {
                debug!(event = "snapshot_preserved");
            }
            Err(err) => {
                warn!(event = "refresh_fallback_error", error = %err);
            }
        }
    }

    /// Create a link from a caller-supplied placeholder payload. The
    /// normalizer assigns the id and timestamps; the write goes through
    /// the durable store before any view can observe it.
    pub async fn create(&self, payload: RawLinkPayload) -> Result<Link, SyncError> {
        let link = normalize_link(payload);
        self.store.lock().await.insert_link(&link)?;
        info!(event = "link_created", id = %link.id);
        self.refresh().await;
        Ok(link)
    }

    /// Apply a partial-field patch. When the patch carries a status change
    /// the capture agent is asked to mirror it, fire-and-forget.
    pub async fn update(&self, id: &str, patch: LinkPatch) -> Result<Link, SyncError> {
        let updated = self.store.lock().await.update_link(id, &patch)?;
        info!(event = "link_updated", id = %updated.id);

        if let Some(status) = patch.status {
            self.bridge
                .send(BridgeMsg::UpdateLinksStatus(UpdateLinksStatusPayload {
                    links: vec![LinkStatusUpdate {
                        id: updated.id.clone(),
                        status,
                    }],
                }));
        }

        self.refresh().await;
        Ok(updated)
    }

    /// Physically remove a link and ask the capture agent to forget it.
    pub async fn remove(&self, id: &str) -> Result<(), SyncError> {
        self.store.lock().await.delete_link(id)?;
        info!(event = "link_removed", id = id);

        self.bridge.send(BridgeMsg::DeleteLinks(DeleteLinksPayload {
            link_ids: vec![id.to_string()],
        }));

        self.refresh().await;
        Ok(())
    }

    /// Subscribe to durable-store mutation events (consumed by the change
    /// listener).
    pub async fn subscribe_store_events(
        &self,
    ) -> tokio::sync::broadcast::Receiver<ldk_storage::StoreEvent> {
        self.store.lock().await.subscribe()
    }
}
