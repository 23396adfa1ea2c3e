//! notionfm Core - Domain types and port definitions
//!
//! This crate holds everything the upload engine reasons about without
//! touching the network:
//! - **Domain types** - `FileUploadSpec`, `PartPlan`, `TaskStatus`, `UploadProgress`, `RetryPolicy`
//! - **Port definitions** - `IRemoteStore` (upload sessions) and `IListingSource` (page listings)
//! - **Configuration** - YAML-backed settings with validation and a builder
//!
//! # Architecture
//!
//! Ports & adapters: the transfer and cache crates depend only on the traits
//! in [`ports`]; the Notion HTTP adapter implements them.

pub mod config;
pub mod domain;
pub mod ports;
