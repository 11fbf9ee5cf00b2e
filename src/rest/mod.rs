//! REST collaborator for the websocket connect handshake.
//!
//! The exchange does not publish a fixed websocket URL: every connection
//! starts with a POST to a "bullet" endpoint that returns the instance
//! servers and a short-lived token. [`BulletClient`] performs that call
//! (signed for user streams) and [`BulletResolver`] packages it as the
//! per-attempt endpoint resolver consumed by the websocket supervisor.

pub mod client;

// Re-export the client structs for easier access
pub use client::{BulletClient, BulletCredentials, BulletData, BulletResolver, InstanceServer};
