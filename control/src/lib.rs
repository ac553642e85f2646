//! Shipyard Control Plane Library
//!
//! Webhook-driven deployments, preview environments and rollbacks for a
//! self-hosted container platform.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod guard;
pub mod logs;
pub mod models;
pub mod platform;
pub mod preview;
pub mod proxy;
pub mod scm;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
pub mod webhook;
