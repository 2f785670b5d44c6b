//! Application services: query translation and the cached listing.

pub mod error;
pub mod filter;
pub mod listing;
pub mod pagination;
pub mod query;
pub mod repos;
