//! Image Variant Service
//!
//! Generates resized and re-encoded variants of uploaded images, with each job's
//! resource budget chosen from the source object's size.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;
pub mod storage;

// Public re-exports
pub use config::Config;
pub use error::{JobError, Result};
