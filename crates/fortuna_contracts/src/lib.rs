#![forbid(unsafe_code)]

pub mod account;
pub mod common;
pub mod inventory;
pub mod ledger;
pub mod prize;

pub use common::{ContractViolation, SchemaVersion, TimestampNs, Validate};
