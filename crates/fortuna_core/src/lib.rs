#![forbid(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod ports;

pub use config::FortunaConfig;
pub use coordinator::{AllocationCoordinator, AllocationError};
pub use ports::MessagingPort;
