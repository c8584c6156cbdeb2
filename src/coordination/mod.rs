//! Coordination Layer for 24/7 System Operation
//!
//! This module provides coordination infrastructure for reliable system operation:
//! - Lifecycle management for ordered component startup/shutdown
//! - Graceful shutdown handling across the orchestrator's loops

pub mod lifecycle;
pub mod shutdown;

pub use lifecycle::{ComponentState, LifecycleEvent, LifecycleManager};
pub use shutdown::{GracefulShutdown, ShutdownConfig, ShutdownSignal};
