//! Transport contract for peer channels.
//!
//! The byte-level wire protocol lives outside the core. The registry only
//! needs connect/send/receive/close primitives; each implementation wraps
//! its own socket type behind the opaque `Channel` handle.

use crate::error::{PeerError, PeerResult};
use async_trait::async_trait;
use std::any::Any;

/// Opaque handle to an established peer channel.
/// Each transport implementation wraps its own connection type inside this.
pub struct Channel(Box<dyn Any + Send>);

impl Channel {
    /// Wraps a transport-specific connection.
    pub fn new<T: Any + Send + 'static>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    /// Unwraps back to the transport-specific type.
    pub fn downcast<T: Any + Send + 'static>(self) -> Option<T> {
        self.0.downcast::<T>().ok().map(|b| *b)
    }

    /// Borrows the transport-specific type.
    pub fn downcast_ref<T: Any + Send + 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

/// A byte-level transport that can open channels to peer addresses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes a channel to the given address.
    async fn connect(&self, address: &str) -> PeerResult<Channel>;

    /// Sends bytes over an established channel.
    async fn send(&self, channel: &mut Channel, bytes: &[u8]) -> PeerResult<()>;

    /// Receives the next frame from an established channel.
    async fn receive(&self, channel: &mut Channel) -> PeerResult<Vec<u8>>;

    /// Closes a channel.
    async fn close(&self, channel: Channel) -> PeerResult<()>;
}

/// An in-memory transport for tests.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    /// A mock transport backed by per-address byte queues.
    ///
    /// Addresses must be marked reachable before `connect` succeeds;
    /// `set_hang` simulates a black-holed address that never answers, for
    /// exercising connect timeouts.
    #[derive(Default)]
    pub struct MockTransport {
        reachable: Mutex<HashSet<String>>,
        hanging: Mutex<HashSet<String>>,
        incoming: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl MockTransport {
        /// Creates a mock transport with no reachable addresses.
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks an address as reachable.
        pub fn set_reachable(&self, address: impl Into<String>) {
            self.reachable.lock().unwrap().insert(address.into());
        }

        /// Marks an address as reachable again after `set_hang`.
        pub fn clear_hang(&self, address: &str) {
            self.hanging.lock().unwrap().remove(address);
        }

        /// Makes connect attempts to the address hang indefinitely.
        pub fn set_hang(&self, address: impl Into<String>) {
            self.hanging.lock().unwrap().insert(address.into());
        }

        /// Queues bytes to be received on the channel for an address.
        pub fn queue_incoming(&self, address: impl Into<String>, bytes: Vec<u8>) {
            self.incoming
                .lock()
                .unwrap()
                .entry(address.into())
                .or_default()
                .push_back(bytes);
        }

        /// Everything sent so far, as (address, bytes) pairs.
        pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self, address: &str) -> PeerResult<Channel> {
            if self.hanging.lock().unwrap().contains(address) {
                // Long enough that any realistic connect timeout fires first.
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.reachable.lock().unwrap().contains(address) {
                Ok(Channel::new(address.to_string()))
            } else {
                Err(PeerError::Unreachable(address.to_string()))
            }
        }

        async fn send(&self, channel: &mut Channel, bytes: &[u8]) -> PeerResult<()> {
            let address = channel
                .downcast_ref::<String>()
                .ok_or(PeerError::ChannelClosed)?
                .clone();
            self.sent.lock().unwrap().push((address, bytes.to_vec()));
            Ok(())
        }

        async fn receive(&self, channel: &mut Channel) -> PeerResult<Vec<u8>> {
            let address = channel
                .downcast_ref::<String>()
                .ok_or(PeerError::ChannelClosed)?;
            self.incoming
                .lock()
                .unwrap()
                .get_mut(address)
                .and_then(|queue| queue.pop_front())
                .ok_or(PeerError::ChannelClosed)
        }

        async fn close(&self, _channel: Channel) -> PeerResult<()> {
            Ok(())
        }
    }
}
