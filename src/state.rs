//! Explicit render state.
//!
//! wgpu has no global "bound framebuffer", culling flag or matrix stack: all of
//! that is baked into pipelines and render passes. The passes in this crate are
//! still written against such a state model, so [`RenderState`] keeps it in one
//! place and the pipeline variant used by a draw is derived from it (see
//! [`RenderState::pipeline_key`]).
//!
//! Every component that changes the state must hand it back unchanged. Use
//! [`RenderState::scoped`]: the returned [`ScopedState`] snapshots everything and
//! restores it when dropped, on early returns and `?` as well.

use std::ops::{Deref, DerefMut};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::registry::TargetId,
    pipelines::{PipelineKey, ShaderKind},
};

/// Pixel rectangle draws are mapped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn apply(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_viewport(
            self.x as f32,
            self.y as f32,
            self.width.max(1) as f32,
            self.height.max(1) as f32,
            0.0,
            1.0,
        );
    }
}

/// Everything [`ScopedState`] restores.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub bound: Option<TargetId>,
    pub viewport: Viewport,
    pub backface_culling: bool,
    pub depth_write: bool,
    pub shader: Option<ShaderKind>,
    pub projection: Matrix4<f32>,
    pub projection_depth: usize,
    pub view: Matrix4<f32>,
}

#[derive(Debug)]
pub struct RenderState {
    window: Viewport,
    bound: Option<TargetId>,
    viewport: Viewport,
    backface_culling: bool,
    depth_write: bool,
    shader: Option<ShaderKind>,
    projection: Matrix4<f32>,
    projection_stack: Vec<Matrix4<f32>>,
    view: Matrix4<f32>,
}

impl RenderState {
    /// Fresh state: default framebuffer bound, culling and depth writes on.
    pub fn new(window_width: u32, window_height: u32) -> Self {
        let window = Viewport::new(window_width, window_height);
        Self {
            window,
            bound: None,
            viewport: window,
            backface_culling: true,
            depth_write: true,
            shader: None,
            projection: Matrix4::identity(),
            projection_stack: Vec::new(),
            view: Matrix4::identity(),
        }
    }

    /// Follow a window resize. The current viewport only moves along when the
    /// default framebuffer is the draw destination.
    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window = Viewport::new(width, height);
        if self.bound.is_none() {
            self.viewport = self.window;
        }
    }

    pub fn window_viewport(&self) -> Viewport {
        self.window
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn bound_target(&self) -> Option<TargetId> {
        self.bound
    }

    /// Make `target` the draw destination. Whatever was bound before is replaced;
    /// there is no target stack.
    pub fn bind_target(&mut self, target: TargetId, width: u32, height: u32) {
        if let Some(previous) = self.bound {
            if previous != target {
                log::debug!("binding {:?} replaces bound {:?}", target, previous);
            }
        }
        self.bound = Some(target);
        self.viewport = Viewport::new(width, height);
    }

    /// Back to the default framebuffer and the window viewport.
    pub fn unbind_target(&mut self) {
        self.bound = None;
        self.viewport = self.window;
    }

    pub fn backface_culling(&self) -> bool {
        self.backface_culling
    }

    pub fn set_backface_culling(&mut self, enabled: bool) {
        self.backface_culling = enabled;
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    pub fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
    }

    pub fn shader(&self) -> Option<ShaderKind> {
        self.shader
    }

    /// Activate a shader program and return the pipeline variant matching the
    /// current culling and depth-write flags.
    pub fn use_shader(&mut self, shader: ShaderKind) -> PipelineKey {
        self.shader = Some(shader);
        self.pipeline_key(shader)
    }

    pub fn clear_shader(&mut self) {
        self.shader = None;
    }

    pub fn pipeline_key(&self, shader: ShaderKind) -> PipelineKey {
        PipelineKey {
            shader,
            backface_culling: self.backface_culling,
            depth_write: self.depth_write,
        }
    }

    pub fn projection(&self) -> Matrix4<f32> {
        self.projection
    }

    pub fn set_projection(&mut self, projection: Matrix4<f32>) {
        self.projection = projection;
    }

    /// Save the current projection and replace it.
    pub fn push_projection(&mut self, projection: Matrix4<f32>) {
        self.projection_stack.push(self.projection);
        self.projection = projection;
    }

    pub fn pop_projection(&mut self) -> anyhow::Result<()> {
        match self.projection_stack.pop() {
            Some(projection) => {
                self.projection = projection;
                Ok(())
            }
            None => anyhow::bail!("projection matrix stack underflow"),
        }
    }

    pub fn projection_depth(&self) -> usize {
        self.projection_stack.len()
    }

    pub fn view(&self) -> Matrix4<f32> {
        self.view
    }

    pub fn set_view(&mut self, view: Matrix4<f32>) {
        self.view = view;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            bound: self.bound,
            viewport: self.viewport,
            backface_culling: self.backface_culling,
            depth_write: self.depth_write,
            shader: self.shader,
            projection: self.projection,
            projection_depth: self.projection_stack.len(),
            view: self.view,
        }
    }

    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.bound = snapshot.bound;
        self.viewport = snapshot.viewport;
        self.backface_culling = snapshot.backface_culling;
        self.depth_write = snapshot.depth_write;
        self.shader = snapshot.shader;
        self.projection_stack.truncate(snapshot.projection_depth);
        self.projection = snapshot.projection;
        self.view = snapshot.view;
    }

    /// Borrow the state for a scoped mutation; the prior state comes back on drop.
    pub fn scoped(&mut self) -> ScopedState<'_> {
        let saved = self.snapshot();
        ScopedState { state: self, saved }
    }
}

/// Guard returned by [`RenderState::scoped`].
pub struct ScopedState<'a> {
    state: &'a mut RenderState,
    saved: Snapshot,
}

impl ScopedState<'_> {
    pub fn saved(&self) -> &Snapshot {
        &self.saved
    }
}

impl Deref for ScopedState<'_> {
    type Target = RenderState;

    fn deref(&self) -> &RenderState {
        self.state
    }
}

impl DerefMut for ScopedState<'_> {
    fn deref_mut(&mut self) -> &mut RenderState {
        self.state
    }
}

impl Drop for ScopedState<'_> {
    fn drop(&mut self) {
        self.state.restore(&self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: u32) -> TargetId {
        TargetId::from_raw(id)
    }

    #[test]
    fn bind_unbind_restores_window_viewport() {
        let mut state = RenderState::new(800, 450);
        state.bind_target(target(1), 1024, 1024);
        assert_eq!(state.viewport(), Viewport::new(1024, 1024));
        assert_eq!(state.bound_target(), Some(target(1)));
        state.unbind_target();
        assert_eq!(state.viewport(), state.window_viewport());
        assert_eq!(state.viewport(), Viewport::new(800, 450));
        assert_eq!(state.bound_target(), None);
    }

    #[test]
    fn binding_replaces_previous_target() {
        let mut state = RenderState::new(8, 8);
        state.bind_target(target(1), 16, 16);
        state.bind_target(target(2), 32, 32);
        assert_eq!(state.bound_target(), Some(target(2)));
        assert_eq!(state.viewport(), Viewport::new(32, 32));
    }

    #[test]
    fn scope_restores_everything_on_drop() {
        let mut state = RenderState::new(800, 450);
        let before = state.snapshot();
        {
            let mut scoped = state.scoped();
            scoped.set_backface_culling(false);
            scoped.set_depth_write(false);
            scoped.use_shader(ShaderKind::Skybox);
            scoped.bind_target(target(3), 16, 16);
            scoped.push_projection(Matrix4::from_scale(2.0));
            scoped.push_projection(Matrix4::from_scale(3.0));
            scoped.set_view(Matrix4::from_scale(4.0));
        }
        assert_eq!(state.snapshot(), before);
    }

    #[test]
    fn scope_restores_on_error_path() {
        fn failing(state: &mut RenderState) -> anyhow::Result<()> {
            let mut scoped = state.scoped();
            scoped.set_depth_write(false);
            anyhow::bail!("draw failed")
        }
        let mut state = RenderState::new(4, 4);
        assert!(failing(&mut state).is_err());
        assert!(state.depth_write());
    }

    #[test]
    fn projection_stack_pops_in_order() {
        let mut state = RenderState::new(4, 4);
        let a = Matrix4::from_scale(2.0);
        state.push_projection(a);
        state.push_projection(Matrix4::from_scale(3.0));
        state.pop_projection().unwrap();
        assert_eq!(state.projection(), a);
        state.pop_projection().unwrap();
        assert_eq!(state.projection(), Matrix4::identity());
        assert!(state.pop_projection().is_err());
    }

    #[test]
    fn pipeline_key_follows_flags() {
        let mut state = RenderState::new(4, 4);
        state.set_backface_culling(false);
        let key = state.use_shader(ShaderKind::Equirect);
        assert_eq!(
            key,
            PipelineKey {
                shader: ShaderKind::Equirect,
                backface_culling: false,
                depth_write: true,
            }
        );
        assert_eq!(state.shader(), Some(ShaderKind::Equirect));
    }

    #[test]
    fn resize_keeps_offscreen_viewport() {
        let mut state = RenderState::new(800, 450);
        state.bind_target(target(1), 64, 64);
        state.set_window_size(1280, 720);
        assert_eq!(state.viewport(), Viewport::new(64, 64));
        state.unbind_target();
        assert_eq!(state.viewport(), Viewport::new(1280, 720));
    }
}
