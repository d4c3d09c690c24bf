//! The interception engine
//!
//! Wrapping a registered callable yields a [`CallHijacker`] that runs an
//! ordered strategy chain on every call: cache, mock, block, redirect,
//! analysis, and conditional composition. See [`registry`] for the
//! process-wide identity → wrapper map and [`strategy`] for the variant
//! set.

pub mod cache;
pub mod context;
pub mod registry;
pub mod strategy;
pub mod wrapper;

pub use cache::{cache_key, canonical_json, CacheStrategy};
pub use context::{HijackContext, HijackResult};
pub use registry::HijackRegistry;
pub use strategy::{
    AnalysisStrategy, BlockStrategy, ConditionalStrategy, MockStrategy, Observation, Priority,
    RedirectStrategy, Strategy,
};
pub use wrapper::{CallHijacker, HijackNotification};
