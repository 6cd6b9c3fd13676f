//! Connection registry, session lifecycle and message dispatch.
//!
//! [`Relay`] wires the components together once at startup and is shared
//! by reference with every connection task and HTTP handler:
//!
//! - [`ConnectionRegistry`]: live sessions keyed by [`ConnectionId`](relay_core::ConnectionId)
//! - [`SessionLifecycle`]: accept and idempotent disconnect
//! - [`BroadcastDispatcher`]: fan-out to every session on a channel
//! - [`UnicastRouter`]: delivery to one session by ID
//! - [`ImageRelay`]: downscale and re-encode before broadcasting

pub mod broadcast;
pub mod image;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod unicast;

use std::sync::Arc;

pub use broadcast::BroadcastDispatcher;
pub use self::image::{ImageBounds, ImageRelay};
pub use lifecycle::{DisconnectReason, SessionLifecycle};
pub use registry::ConnectionRegistry;
pub use session::{Channel, Session, SessionInfo, SessionState, Transport};
pub use unicast::UnicastRouter;

use crate::config::ServerConfig;

/// The relay's shared components.
pub struct Relay {
    lifecycle: Arc<SessionLifecycle>,
    broadcast: Arc<BroadcastDispatcher>,
    unicast: UnicastRouter,
    images: ImageRelay,
}

impl Relay {
    /// Build the components from server configuration.
    pub fn new(config: &ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.send_timeout()));
        let lifecycle = Arc::new(SessionLifecycle::new(registry));
        let broadcast = Arc::new(BroadcastDispatcher::new(Arc::clone(&lifecycle)));
        let unicast = UnicastRouter::new(Arc::clone(&lifecycle));
        let images = ImageRelay::new(
            config.image_bounds,
            config.jpeg_quality,
            Arc::clone(&broadcast),
        );
        Self {
            lifecycle,
            broadcast,
            unicast,
            images,
        }
    }

    /// Live sessions.
    pub fn registry(&self) -> &ConnectionRegistry {
        self.lifecycle.registry()
    }

    /// Accept and disconnect.
    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    /// Fan-out delivery.
    pub fn broadcast(&self) -> &BroadcastDispatcher {
        &self.broadcast
    }

    /// Targeted delivery.
    pub fn unicast(&self) -> &UnicastRouter {
        &self.unicast
    }

    /// Image transform and broadcast.
    pub fn images(&self) -> &ImageRelay {
        &self.images
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}
