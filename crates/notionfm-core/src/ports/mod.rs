//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the transfer engine and the listing cache depend
//! on; their implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Upload sessions, parts, completion, and attachment
//! - [`IListingSource`] - Paginated listing of a container's child blocks

pub mod listing_source;
pub mod remote_store;

pub use listing_source::{IListingSource, ListingItem, ListingPage, ListingRow, FILE_BLOCK_TYPES};
pub use remote_store::{IRemoteStore, RemoteError, RemoteSessionStatus};
