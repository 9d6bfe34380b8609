//! Render passes that run outside the main pass.
//!
//! - `cubemap` bakes the environment cubemap once at startup
//! - `shadow` renders the depth-only shadow map every frame

pub mod cubemap;
pub mod shadow;
