//! Cache Backend Implementations
//!
//! This module contains both backend implementations for the adaptive cache.
//!
//! # Available Backends
//!
//! ## Local (in-process)
//! - **`DashMap`** - concurrent `HashMap` with per-key TTL and a periodic
//!   expiry sweeper; always available, always supports pattern deletes
//!
//! ## Distributed
//! - **Redis** - shared across instances, selected only when a connection URL
//!   is configured (or the process runs in production mode) and the initial
//!   connection succeeds
//!
//! At most one backend is *active* at any instant; [`crate::BackendSelector`]
//! owns that decision.

pub mod local_cache;
pub mod redis_cache;

pub use local_cache::LocalCache;
pub use redis_cache::RedisCache;

/// Type alias for the in-process fallback backend
pub type LocalBackend = LocalCache;

/// Type alias for the distributed backend
pub type DistributedBackend = RedisCache;
