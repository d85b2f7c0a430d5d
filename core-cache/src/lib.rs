//! # Cache Tiers
//!
//! Three named response caches with one strategy each, see [`manager`].
//!
//! ```rust,ignore
//! use core_cache::{CacheManager, CacheRegion, MemoryCacheStorage};
//!
//! let cache = CacheManager::new(Arc::new(MemoryCacheStorage::new()), http_client, event_bus);
//! let response = cache.cache_first(CacheRegion::StaticAssets, request).await;
//! ```

pub mod error;
pub mod manager;
pub mod region;
pub mod storage;

pub use error::{CacheError, Result};
pub use manager::{offline_api_response, resource_unavailable, CacheManager, CacheOutcome};
pub use region::{cache_key, CacheRegion, CacheStrategy, CachedResponse};
pub use storage::{CacheStorage, MemoryCacheStorage, SqliteCacheStorage};
