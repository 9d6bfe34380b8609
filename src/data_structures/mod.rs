//! Renderer data structures: textures, models and render targets.
//!
//! - `texture` contains the GPU texture wrapper and creation utilities
//! - `model` contains mesh and material definitions, GPU resources for 3D models
//! - `render_target` holds offscreen attachments and their completeness rules
//! - `registry` owns textures and targets and releases them at shutdown

pub mod model;
pub mod registry;
pub mod render_target;
pub mod texture;
