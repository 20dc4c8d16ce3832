//! Correlated request/response exchange with the capture agent.
//!
//! The boundary is a pair of broadcast channels carrying untyped JSON text
//! frames: `outbound` is what the application sends toward the agent,
//! `inbound` is what the agent sends back. There is no delivery guarantee
//! on either side; absence of the agent is an expected condition that
//! resolves to an empty snapshot, never an error.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use ldk_core::bridge_ipc::{
    decode_frame, encode_frame, BridgeEnvelope, BridgeMsg, CURRENT_PROTOCOL_VERSION,
    DEFAULT_MAX_FRAME_BYTES,
};
use ldk_core::link::Link;
use ldk_core::normalize::normalize_link;

pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);

const BUS_CAPACITY: usize = 64;

/// The untyped message boundary. Cloning shares the underlying channels, so
/// one side can be handed to a capture-agent shim (or a test double) while
/// the application keeps the other.
#[derive(Clone)]
pub struct MessageBus {
    outbound: broadcast::Sender<String>,
    inbound: broadcast::Sender<String>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        let (outbound, _) = broadcast::channel(BUS_CAPACITY);
        let (inbound, _) = broadcast::channel(BUS_CAPACITY);
        Self { outbound, inbound }
    }

    /// Frames the application has sent toward the capture agent.
    pub fn subscribe_outbound(&self) -> broadcast::Receiver<String> {
        self.outbound.subscribe()
    }

    /// Frames arriving from the capture agent.
    pub fn subscribe_inbound(&self) -> broadcast::Receiver<String> {
        self.inbound.subscribe()
    }

    /// Publish toward the agent. Returns false when nobody is listening,
    /// which is not an error: the agent is simply absent.
    pub fn publish_outbound(&self, frame: String) -> bool {
        self.outbound.send(frame).is_ok()
    }

    /// Publish from the agent side (used by agent shims and tests).
    pub fn publish_inbound(&self, frame: String) -> bool {
        self.inbound.send(frame).is_ok()
    }
}

pub struct CaptureBridge {
    bus: MessageBus,
    sender_id: String,
    timeout: Duration,
}

impl CaptureBridge {
    pub fn new(bus: MessageBus) -> Self {
        Self::with_timeout(bus, DEFAULT_SNAPSHOT_TIMEOUT)
    }

    pub fn with_timeout(bus: MessageBus, timeout: Duration) -> Self {
        Self {
            bus,
            sender_id: "linkdeck".to_string(),
            timeout,
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    fn make_envelope(&self, correlation_id: Option<String>, msg: BridgeMsg) -> BridgeEnvelope {
        BridgeEnvelope {
            version: CURRENT_PROTOCOL_VERSION,
            sender_id: self.sender_id.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id,
            msg,
        }
    }

    /// Fire-and-forget outbound message; no acknowledgment is awaited.
    pub fn send(&self, msg: BridgeMsg) {
        let envelope = self.make_envelope(None, msg);
        match encode_frame(&envelope, DEFAULT_MAX_FRAME_BYTES) {
            Ok(frame) => {
                if !self.bus.publish_outbound(frame) {
                    debug!(event = "bridge_send_no_listener");
                }
            }
            Err(err) => {
                warn!(event = "bridge_encode_error", error = %err);
            }
        }
    }

    /// Request a full snapshot from the capture agent.
    ///
    /// Broadcasts a `get-snapshot` request with a fresh correlation id and
    /// waits for the matching `snapshot-response`, normalizing every
    /// element. Resolves exactly once: with the normalized links on a
    /// match, or with an empty vec once the timeout fires. Responses with
    /// a stale or missing correlation id are skipped, and a late response
    /// after timeout is discarded because this call's receiver is gone.
    ///
    /// Concurrent calls race independently, each with its own correlation
    /// id; callers serialize refreshes at a higher level.
    pub async fn request_snapshot(&self) -> Vec<Link> {
        let correlation_id = Uuid::new_v4().to_string();

        // Subscribe before publishing so the response cannot slip between
        // the send and the first recv.
        let mut inbound = self.bus.subscribe_inbound();

        let request = self.make_envelope(Some(correlation_id.clone()), BridgeMsg::GetSnapshot);
        match encode_frame(&request, DEFAULT_MAX_FRAME_BYTES) {
            Ok(frame) => {
                if !self.bus.publish_outbound(frame) {
                    debug!(event = "snapshot_request_no_listener", correlation_id = %correlation_id);
                }
            }
            Err(err) => {
                warn!(event = "bridge_encode_error", error = %err);
                return Vec::new();
            }
        }

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    debug!(event = "snapshot_timeout", correlation_id = %correlation_id);
                    return Vec::new();
                }
                received = inbound.recv() => {
                    let frame = match received {
                        Ok(frame) => frame,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(event = "bridge_lagged", skipped = skipped);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!(event = "bridge_inbound_closed", correlation_id = %correlation_id);
                            return Vec::new();
                        }
                    };
                    let envelope = match decode_frame(&frame, DEFAULT_MAX_FRAME_BYTES) {
                        Ok(envelope) => envelope,
                        Err(err) => {
                            warn!(event = "bridge_decode_error", error = %err);
                            continue;
                        }
                    };
                    if envelope.correlation_id.as_deref() != Some(correlation_id.as_str()) {
                        continue;
                    }
                    if let BridgeMsg::SnapshotResponse(payload) = envelope.msg {
                        debug!(
                            event = "snapshot_received",
                            correlation_id = %correlation_id,
                            count = payload.links.len()
                        );
                        return payload.links.into_iter().map(normalize_link).collect();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ldk_core::bridge_ipc::SnapshotResponsePayload;
    use ldk_core::normalize::RawLinkPayload;

    fn agent_response(correlation_id: &str, links: Vec<RawLinkPayload>) -> String {
        let envelope = BridgeEnvelope {
            version: CURRENT_PROTOCOL_VERSION,
            sender_id: "capture-agent".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: Some(correlation_id.to_string()),
            msg: BridgeMsg::SnapshotResponse(SnapshotResponsePayload { links }),
        };
        encode_frame(&envelope, DEFAULT_MAX_FRAME_BYTES).expect("encode")
    }

    /// Test double for the agent: answers every `get-snapshot` with the
    /// configured links, after an optional delay.
    fn spawn_fake_agent(
        bus: MessageBus,
        links: Vec<RawLinkPayload>,
        delay: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let mut outbound = bus.subscribe_outbound();
        tokio::spawn(async move {
            while let Ok(frame) = outbound.recv().await {
                let Ok(envelope) = decode_frame(&frame, DEFAULT_MAX_FRAME_BYTES) else {
                    continue;
                };
                if envelope.msg != BridgeMsg::GetSnapshot {
                    continue;
                }
                let correlation_id = envelope.correlation_id.unwrap_or_default();
                tokio::time::sleep(delay).await;
                bus.publish_inbound(agent_response(&correlation_id, links.clone()));
            }
        })
    }

    #[tokio::test]
    async fn snapshot_response_is_normalized() {
        let bus = MessageBus::new();
        let _agent = spawn_fake_agent(
            bus.clone(),
            vec![RawLinkPayload::for_url("https://example.com/a")],
            Duration::from_millis(0),
        );

        let bridge = CaptureBridge::new(bus);
        let links = bridge.request_snapshot().await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/a");
        assert_eq!(links[0].metadata.title, "Untitled");
        assert!(!links[0].id.is_empty());
    }

    #[tokio::test]
    async fn timeout_resolves_with_empty_snapshot() {
        let bus = MessageBus::new();
        let bridge = CaptureBridge::with_timeout(bus, Duration::from_millis(50));
        let links = bridge.request_snapshot().await;
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn late_response_after_timeout_is_discarded() {
        let bus = MessageBus::new();
        let _agent = spawn_fake_agent(
            bus.clone(),
            vec![RawLinkPayload::for_url("https://example.com/late")],
            Duration::from_millis(200),
        );

        let bridge = CaptureBridge::with_timeout(bus, Duration::from_millis(30));
        let links = bridge.request_snapshot().await;
        assert!(links.is_empty(), "late response must not resolve the call");
    }

    #[tokio::test]
    async fn mismatched_correlation_id_is_skipped() {
        let bus = MessageBus::new();
        let responder_bus = bus.clone();
        let mut outbound = bus.subscribe_outbound();
        tokio::spawn(async move {
            let frame = outbound.recv().await.expect("request");
            let envelope = decode_frame(&frame, DEFAULT_MAX_FRAME_BYTES).expect("decode");
            let correlation_id = envelope.correlation_id.expect("correlation id");
            // A stale response from an earlier, abandoned request.
            responder_bus.publish_inbound(agent_response(
                "stale-correlation-id",
                vec![RawLinkPayload::for_url("https://example.com/stale")],
            ));
            responder_bus.publish_inbound(agent_response(
                &correlation_id,
                vec![RawLinkPayload::for_url("https://example.com/fresh")],
            ));
        });

        let bridge = CaptureBridge::new(bus);
        let links = bridge.request_snapshot().await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/fresh");
    }

    #[tokio::test]
    async fn malformed_frames_do_not_abort_the_wait() {
        let bus = MessageBus::new();
        let responder_bus = bus.clone();
        let mut outbound = bus.subscribe_outbound();
        tokio::spawn(async move {
            let frame = outbound.recv().await.expect("request");
            let envelope = decode_frame(&frame, DEFAULT_MAX_FRAME_BYTES).expect("decode");
            let correlation_id = envelope.correlation_id.expect("correlation id");
            responder_bus.publish_inbound("{\"not\":\"valid\"".to_string());
            responder_bus.publish_inbound(agent_response(
                &correlation_id,
                vec![RawLinkPayload::for_url("https://example.com/ok")],
            ));
        });

        let bridge = CaptureBridge::new(bus);
        let links = bridge.request_snapshot().await;
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/ok");
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_independently() {
        let bus = MessageBus::new();
        let _agent = spawn_fake_agent(
            bus.clone(),
            vec![RawLinkPayload::for_url("https://example.com/a")],
            Duration::from_millis(10),
        );

        let first_bridge = CaptureBridge::new(bus.clone());
        let second_bridge = CaptureBridge::new(bus);
        let (first, second) = tokio::join!(
            first_bridge.request_snapshot(),
            second_bridge.request_snapshot()
        );
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
