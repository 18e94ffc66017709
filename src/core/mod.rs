// PftLens - core/mod.rs
//
// Core business logic layer: decoding, validation, classification,
// differentials, report composition and rendering.
// Dependencies: serde/serde_json/toml/csv for data formats, tracing for events.
// Must NOT depend on: platform, app, or the filesystem directly.

pub mod differential;
pub mod diffusion;
pub mod export;
pub mod input;
pub mod measurement;
pub mod model;
pub mod opinion;
pub mod pattern;
pub mod pipeline;
pub mod report;
pub mod severity;
pub mod tables;
pub mod volumes;
