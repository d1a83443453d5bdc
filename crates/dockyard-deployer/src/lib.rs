//! Deployment notifiers for Dockyard.
//!
//! Provides notifier implementations:
//! - Release webhook (rollout through the release API)

pub mod webhook;

pub use dockyard_core::deployer::{Notifier, NotifyTarget};
pub use webhook::WebhookNotifier;
