//! Image variant pipeline
//!
//! One job in, one job result out:
//! - `tier`: size-based resource tier selection
//! - `decoder`: notification shapes to a validated job
//! - `prober`: single fetch and decode of the source
//! - `planner` / `keys`: which variants to produce and where they go
//! - `encoder` / `renderer`: resize, encode and upload one variant
//! - `aggregator`: ordered job result
//! - `service`: orchestration, deadline and render parallelism

pub mod aggregator;
pub mod decoder;
pub mod encoder;
pub mod keys;
pub mod planner;
pub mod prober;
pub mod renderer;
pub mod service;
pub mod tier;

pub use decoder::decode_job;
pub use encoder::{ImageCrateEncoder, VariantEncoder};
pub use keys::output_key;
pub use planner::plan_variants;
pub use prober::{probe, SourceImage};
pub use renderer::VariantRenderer;
pub use service::VariantService;
pub use tier::{TierPolicy, TierProfile};
