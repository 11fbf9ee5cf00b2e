pub mod auth;
pub mod error;
pub mod rest;
pub mod types;
pub mod websocket;
pub use error::{KucoinError, Result};
