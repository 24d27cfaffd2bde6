//! Core types and utilities for plughost
//!
//! # Modules
//!
//! - `config`: Environment loading and host configuration
//! - `error`: Error taxonomy and Result alias
//! - `events`: Ordered publish/subscribe bus

pub mod config;
pub mod error;
pub mod events;

// Re-exports
pub use config::HostConfig;
pub use error::{Error, Result};
pub use events::{EventBus, EventHandler, SubscriptionId};
