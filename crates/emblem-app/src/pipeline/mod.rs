//! Pure catalog transformations.
//!
//! Modules under this namespace must remain free of IO and external side effects
//! so they can be reused by the orchestrator and by test harnesses alike.

pub mod catalog;
pub mod dedup;
pub mod item;

pub use catalog::{Catalog, CatalogRecord};
pub use dedup::{is_reserved, reserve_key};
pub use item::{ClassificationResult, Item};
