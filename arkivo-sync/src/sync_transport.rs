//! Message-level transport seam for sync.
//!
//! The byte layer (framing, encryption, multiplexing) is a collaborator;
//! the coordinator only needs request-response message exchange with a
//! connected peer.

use crate::error::SyncResult;
use crate::protocol::SyncMessage;
use arkivo_types::PeerId;
use async_trait::async_trait;

/// Sends a sync message to a peer and waits for its reply.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// The local peer identity the transport speaks as.
    fn local_peer_id(&self) -> PeerId;

    /// Sends a request to a peer and waits for the response.
    async fn send_request(&self, peer_id: &PeerId, message: SyncMessage)
    -> SyncResult<SyncMessage>;
}

/// A scriptable transport for tests.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use crate::protocol::{
        SummaryResponseMessage, VersionResponseMessage, VersionSummary,
    };
    use arkivo_peer::PeerError;
    use arkivo_types::{CollectionId, CollectionVersion};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Emulates remote peers that each hold one version per collection.
    ///
    /// Summary and version requests are answered from the scripted
    /// versions; anything else gets a `Pong`. Failure injection covers
    /// both permanent outages and a bounded number of transient errors.
    pub struct MockSyncTransport {
        local: PeerId,
        versions: Mutex<HashMap<(PeerId, CollectionId), CollectionVersion>>,
        failures: Mutex<HashMap<PeerId, usize>>,
        requests: Mutex<Vec<(PeerId, SyncMessage)>>,
        delay: Mutex<Option<std::time::Duration>>,
    }

    impl MockSyncTransport {
        /// Creates a transport speaking as `local`.
        pub fn new(local: PeerId) -> Self {
            Self {
                local,
                versions: Mutex::new(HashMap::new()),
                failures: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                delay: Mutex::new(None),
            }
        }

        /// Delays every reply, for exercising overlap and single-flight.
        pub fn set_delay(&self, delay: std::time::Duration) {
            *self.delay.lock().unwrap() = Some(delay);
        }

        /// Scripts the version a peer holds for a collection.
        pub fn set_version(
            &self,
            peer: PeerId,
            collection: CollectionId,
            version: CollectionVersion,
        ) {
            self.versions
                .lock()
                .unwrap()
                .insert((peer, collection), version);
        }

        /// Removes a peer's version, as if it dropped the collection.
        pub fn clear_version(&self, peer: PeerId, collection: CollectionId) {
            self.versions.lock().unwrap().remove(&(peer, collection));
        }

        /// Makes every request to the peer fail.
        pub fn fail_always(&self, peer: PeerId) {
            self.failures.lock().unwrap().insert(peer, usize::MAX);
        }

        /// Makes the next `count` requests to the peer fail, then recover.
        pub fn fail_times(&self, peer: PeerId, count: usize) {
            self.failures.lock().unwrap().insert(peer, count);
        }

        /// Every request observed so far.
        pub fn requests(&self) -> Vec<(PeerId, SyncMessage)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SyncTransport for MockSyncTransport {
        fn local_peer_id(&self) -> PeerId {
            self.local
        }

        async fn send_request(
            &self,
            peer_id: &PeerId,
            message: SyncMessage,
        ) -> SyncResult<SyncMessage> {
            self.requests.lock().unwrap().push((*peer_id, message.clone()));

            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(remaining) = failures.get_mut(peer_id) {
                    if *remaining > 0 {
                        if *remaining != usize::MAX {
                            *remaining -= 1;
                        }
                        return Err(SyncError::Peer(PeerError::Unreachable(
                            peer_id.to_string(),
                        )));
                    }
                }
            }

            let versions = self.versions.lock().unwrap();
            let reply = match message {
                SyncMessage::SummaryRequest(req) => {
                    let summary = versions
                        .get(&(*peer_id, req.collection_id))
                        .map(|version| VersionSummary::of(req.collection_id, version));
                    SyncMessage::SummaryResponse(SummaryResponseMessage {
                        peer_id: *peer_id,
                        summary,
                    })
                }
                SyncMessage::VersionRequest(req) => {
                    let version = versions
                        .get(&(*peer_id, req.collection_id))
                        .filter(|version| version.hash == req.hash)
                        .cloned();
                    SyncMessage::VersionResponse(VersionResponseMessage {
                        peer_id: *peer_id,
                        version,
                    })
                }
                SyncMessage::Ping(nonce) => SyncMessage::Pong(nonce),
                _ => SyncMessage::Pong(0),
            };
            Ok(reply)
        }
    }
}
