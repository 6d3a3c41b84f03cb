//! Incremental live pipeline: key buffering and polling reconciliation

pub mod buffer;
pub mod reconciler;

pub use buffer::{KeyBuffer, ProcessedKeySet};
pub use reconciler::{Reconciler, TickPlan};
