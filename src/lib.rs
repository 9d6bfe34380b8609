//! vista-ngin
//!
//! A small wgpu scene renderer. At startup an equirectangular panorama is baked
//! into an environment cubemap; every frame then renders a depth-only shadow map
//! of the model, the skybox, the lit model with a reference grid and a debug
//! overlay of the shadow map, in that order.
//!
//! High-level modules
//! - `camera`: look-at camera and controllers
//! - `config`: window, asset and pass settings
//! - `context`: GPU device, queue, output surface and pipelines
//! - `data_structures`: textures, render targets, the resource registry and models
//! - `flow`: the winit application loop
//! - `frame`: per-frame stage orchestration
//! - `passes`: the cubemap bake and the shadow pass
//! - `pipelines`: shader programs and their pipeline variants
//! - `resources`: model and panorama loading, GPU readback
//! - `state`: the explicit render state passes work against
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod flow;
pub mod frame;
pub mod passes;
pub mod pipelines;
pub mod resources;
pub mod state;
