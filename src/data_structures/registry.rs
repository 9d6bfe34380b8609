//! Owner of every texture and render target created at startup.
//!
//! Passes hold [`TextureId`]s and [`TargetId`]s instead of the resources
//! themselves. This keeps a cubemap attached to a target from being destroyed
//! through the target, and gives shutdown one place to release everything in
//! reverse creation order.

use anyhow::{Context as _, Result, anyhow};

use crate::data_structures::{
    render_target::{AttachmentSpec, RenderTarget, TargetPolicy},
    texture::Texture,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u32);

impl TargetId {
    /// Build an id without a registry. Only meaningful for state bookkeeping.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

impl TextureId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Handle {
    Texture(TextureId),
    Target(TargetId),
}

#[derive(Debug, Default)]
pub struct ResourceRegistry {
    next: u32,
    textures: Vec<(TextureId, Texture)>,
    targets: Vec<(TargetId, RenderTarget)>,
    /// Creation order of everything still alive.
    order: Vec<Handle>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_raw(&mut self) -> u32 {
        self.next += 1;
        self.next
    }

    pub fn insert_texture(&mut self, texture: Texture) -> TextureId {
        let id = TextureId(self.next_raw());
        self.textures.push((id, texture));
        self.order.push(Handle::Texture(id));
        id
    }

    pub fn texture(&self, id: TextureId) -> Result<&Texture> {
        self.textures
            .iter()
            .find(|(tid, _)| *tid == id)
            .map(|(_, texture)| texture)
            .ok_or_else(|| anyhow!("unknown or released texture {:?}", id))
    }

    pub fn create_target(
        &mut self,
        device: &wgpu::Device,
        spec: &AttachmentSpec,
        policy: TargetPolicy,
    ) -> Result<TargetId> {
        let id = TargetId(self.next_raw());
        let target = RenderTarget::create(device, id, spec, policy)
            .with_context(|| format!("creating render target '{}'", spec.label))?;
        self.targets.push((id, target));
        self.order.push(Handle::Target(id));
        Ok(id)
    }

    pub fn target(&self, id: TargetId) -> Result<&RenderTarget> {
        self.targets
            .iter()
            .find(|(tid, _)| *tid == id)
            .map(|(_, target)| target)
            .ok_or_else(|| anyhow!("unknown or released render target {:?}", id))
    }

    /// Attach face `face` of the cubemap `cubemap` to `target`.
    pub fn attach_face(&mut self, target: TargetId, cubemap: TextureId, face: u32) -> Result<()> {
        let texture = self
            .textures
            .iter()
            .find(|(tid, _)| *tid == cubemap)
            .map(|(_, texture)| texture)
            .ok_or_else(|| anyhow!("unknown or released texture {:?}", cubemap))?;
        let render_target = self
            .targets
            .iter_mut()
            .find(|(tid, _)| *tid == target)
            .map(|(_, target)| target)
            .ok_or_else(|| anyhow!("unknown or released render target {:?}", target))?;
        render_target.attach_face(cubemap, texture, face)
    }

    pub fn release_texture(&mut self, id: TextureId) -> Result<()> {
        let index = self
            .textures
            .iter()
            .position(|(tid, _)| *tid == id)
            .ok_or_else(|| anyhow!("texture {:?} released twice or never created", id))?;
        let (_, texture) = self.textures.remove(index);
        self.order.retain(|handle| *handle != Handle::Texture(id));
        texture.release();
        Ok(())
    }

    pub fn release_target(&mut self, id: TargetId) -> Result<()> {
        let index = self
            .targets
            .iter()
            .position(|(tid, _)| *tid == id)
            .ok_or_else(|| anyhow!("render target {:?} released twice or never created", id))?;
        let (_, target) = self.targets.remove(index);
        self.order.retain(|handle| *handle != Handle::Target(id));
        target.release();
        Ok(())
    }

    /// Release everything still alive, newest first.
    pub fn release_all(&mut self) {
        while let Some(handle) = self.order.pop() {
            let released = match handle {
                Handle::Texture(id) => self.release_texture(id),
                Handle::Target(id) => self.release_target(id),
            };
            if let Err(e) = released {
                log::error!("{e:#}");
            }
        }
        log::debug!("resource registry empty");
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_handles_are_errors() {
        let mut registry = ResourceRegistry::new();
        assert!(registry.texture(TextureId::from_raw(7)).is_err());
        assert!(registry.target(TargetId::from_raw(7)).is_err());
        assert!(registry.release_texture(TextureId::from_raw(7)).is_err());
        assert!(registry.release_target(TargetId::from_raw(7)).is_err());
        assert!(registry.is_empty());
    }
}
