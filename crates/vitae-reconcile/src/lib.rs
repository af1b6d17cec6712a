//! The reconciliation engine: diff classification and decision application.
//!
//! Sits between the extraction pipeline's candidate output and the profile
//! store. Classification is pure over its inputs plus the match lookup;
//! application drives the store's atomic compare-and-advance primitive, one
//! transaction per decision.

pub mod apply;
pub mod classify;
pub mod matcher;

pub use apply::{apply_all, apply_all_new};
pub use classify::list_review_items;
pub use matcher::KeyFieldMatcher;
