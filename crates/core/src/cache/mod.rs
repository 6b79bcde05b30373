//! SQLite-backed partitioned cache for stored responses.
//!
//! This module provides a persistent response cache using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - Named partitions (a static, version-pinned one and a dynamic one)
//! - Request-identity keys derived from SHA-256 hashing
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Wholesale partition deletion (the only eviction mechanism)

pub mod connection;
pub mod entries;
pub mod identity;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::StoredResponse;
