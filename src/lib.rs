//! # authz-cache-client
//!
//! Client-side write-through cache coordinator for a relationship-based
//! authorization service: object types, edge types, objects, edges, and
//! organizations, kept consistent between a local cache and an
//! authoritative HTTP server via an optimistic sentinel protocol.
//!
//! ## Architecture
//!
//! - `sentinel`: typed lock tokens and the commit decision tables
//! - `keys`: deterministic cache key construction
//! - `cache`: the `CacheProvider` abstraction, its two backends, and the
//!   lock/save primitives built on top of it
//! - `http`: bearer-authenticated JSON request client
//! - `client`: the public `AuthzClient` CRUD surface
//! - `model`: entity types
//! - `config`: client and cache configuration
//! - `error`: the crate-wide error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod keys;
pub mod model;
pub mod sentinel;

pub use client::AuthzClient;
pub use config::{CacheConfig, ClientConfig, RequestOptions};
pub use error::{AuthzError, AuthzResult};

/// Crate version, as reported by Cargo.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, as reported by Cargo.
pub const NAME: &str = env!("CARGO_PKG_NAME");
