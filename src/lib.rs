//! Fanout - a DNS proxy that races upstream servers.
//!
//! Queries are answered from the cache, the block list or static records
//! when possible, and otherwise forwarded in parallel to every eligible
//! upstream, taking the first authoritative reply.

pub mod cache;
pub mod commands;
pub mod context;
pub mod dns;
pub mod domain;
pub mod error;
pub mod filter;
pub mod lifecycle;
pub mod notice;
pub mod proxy;
pub mod records;
pub mod resolver;
pub mod servers;
pub mod stats;
pub mod store;
pub mod transport;
pub mod upstream;
