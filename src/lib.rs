// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod execution;
pub mod models;
pub mod persistence;
pub mod schedule;
pub mod strategy;

// Re-export commonly used types
pub use api::{Broker, BrokerError};
pub use config::{load_settings, Parameters, RuntimeSettings, Settings};
pub use engine::{Engine, EngineError, FrameOutcome, NotificationMessage};
pub use models::*;
