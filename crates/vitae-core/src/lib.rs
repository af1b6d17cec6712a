//! Core types and trait definitions for the Vitae profile store.
//!
//! This crate is deliberately free of HTTP and database dependencies;
//! every other crate in the workspace depends on it.

pub mod entity;
pub mod error;
pub mod review;
pub mod store;

pub use error::{Error, Result};
