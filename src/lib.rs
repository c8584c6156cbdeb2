pub mod adapters;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod orchestrator;
pub mod scoreboard;
pub mod strategy;
pub mod supervisor;

pub use config::AppConfig;
pub use coordination::{
    ComponentState, GracefulShutdown, LifecycleEvent, LifecycleManager, ShutdownConfig,
    ShutdownSignal,
};
pub use error::{Result, TraderError};
pub use orchestrator::Orchestrator;
pub use supervisor::{Alert, AlertLevel, AlertSink, Watchdog, WatchdogConfig};
