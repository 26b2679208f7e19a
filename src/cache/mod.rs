//! Value-Set Cache Module
//!
//! The synchronous read path of a consumer process:
//!
//! ```text
//! get_values(time, link)
//!     │
//!     ▼
//! ┌─────────────┐  hit   ┌──────────────┐
//! │ store.get   │───────▶│ decode + ret │
//! └─────┬───────┘        └──────────────┘
//!       │ miss                   ▲
//!       ▼                        │ found
//! ┌─────────────────┐    ┌───────┴────────┐
//! │ publish element │───▶│ request + poll │──┐ ceiling reached:
//! │ set (once)      │    │ (RetryPolicy)  │◀─┘ re-request
//! └─────────────────┘    └────────────────┘
//! ```
//!
//! - **CacheManager**: lookup, request and wait (`manager.rs`)
//! - **RetryPolicy**: poll interval, ceiling and optional limits (`retry.rs`)

mod manager;
mod retry;

pub use manager::CacheManager;
pub use retry::RetryPolicy;
