//! Infrastructure Layer
//!
//! Cross-cutting components: the coalescing series cache and shutdown
//! coordination.

pub mod series_cache;
pub mod shutdown;

pub use series_cache::{SeriesCache, SERIES_CACHE_CAPACITY};
pub use shutdown::{shutdown_signal, RequestGuard, ShutdownController};
