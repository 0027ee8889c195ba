pub mod config;
pub mod error;
pub mod monitor;
pub mod notifications;
pub mod probes;
pub mod version;
