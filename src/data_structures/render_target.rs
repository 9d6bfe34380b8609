//! Offscreen render targets.
//!
//! A [`RenderTarget`] is the wgpu counterpart of a framebuffer object: a set of
//! attachments that a render pass draws into. wgpu validates attachments when a
//! pass begins and treats mismatches as fatal, so the completeness rules are
//! checked up front by [`check_target`] and the outcome is handled
//! according to a [`TargetPolicy`].
//!
//! Ownership: a depth attachment and an `Owned` colour attachment belong to the
//! target and are destroyed by [`RenderTarget::release`]. A cubemap face attached
//! with [`RenderTarget::attach_face`] is only borrowed.

use std::fmt;

use anyhow::{Result, bail};

use crate::{
    data_structures::{
        registry::{TargetId, TextureId},
        texture::{Texture, TextureKind},
    },
    state::RenderState,
};

/// What to do with a target that fails the completeness check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPolicy {
    /// Refuse to create or draw into an incomplete target.
    Strict,
    /// Log the problem and carry on until something draws into the target.
    Lenient,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DepthSpec {
    pub format: wgpu::TextureFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColorSpec {
    /// Allocate a 2D colour texture with the target.
    Owned { format: wgpu::TextureFormat },
    /// The colour output is a cubemap face attached later.
    CubeFace { format: wgpu::TextureFormat },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachmentSpec {
    pub label: String,
    pub size: [u32; 2],
    pub depth: Option<DepthSpec>,
    pub color: Option<ColorSpec>,
}

impl AttachmentSpec {
    /// A target with only a depth buffer, as used for shadow maps.
    pub fn depth_only(label: &str, size: [u32; 2]) -> Self {
        Self {
            label: label.to_string(),
            size,
            depth: Some(DepthSpec {
                format: Texture::DEPTH_FORMAT,
            }),
            color: None,
        }
    }

    /// A depth buffer plus a cubemap face colour slot.
    pub fn cube_face(label: &str, face_size: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            label: label.to_string(),
            size: [face_size, face_size],
            depth: Some(DepthSpec {
                format: Texture::DEPTH_FORMAT,
            }),
            color: Some(ColorSpec::CubeFace { format }),
        }
    }

    /// Every slot the target declares, attached yet or not.
    fn slots(&self) -> Vec<Slot> {
        let mut slots = Vec::new();
        if self.depth.is_some() {
            slots.push(Slot::Depth);
        }
        if self.color.is_some() {
            slots.push(Slot::Color);
        }
        slots
    }

    /// Attachments this spec allocates on creation. A `CubeFace` slot has nothing
    /// attached yet and does not take part.
    fn allocated(&self) -> Vec<AttachmentInfo> {
        let mut infos = Vec::new();
        if let Some(depth) = &self.depth {
            infos.push(AttachmentInfo {
                slot: Slot::Depth,
                size: self.size,
                format: depth.format,
                face: None,
            });
        }
        if let Some(ColorSpec::Owned { format }) = &self.color {
            infos.push(AttachmentInfo {
                slot: Slot::Color,
                size: self.size,
                format: *format,
                face: None,
            });
        }
        infos
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Depth,
    Color,
}

/// Description of one attachment, enough to decide completeness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttachmentInfo {
    pub slot: Slot,
    pub size: [u32; 2],
    pub format: wgpu::TextureFormat,
    pub face: Option<u32>,
}

/// Why a set of attachments cannot be rendered to.
#[derive(Clone, Debug, PartialEq)]
pub enum Incomplete {
    MissingAttachment,
    ZeroSize { slot: Slot, size: [u32; 2] },
    SizeMismatch { expected: [u32; 2], found: [u32; 2] },
    WrongFormat { slot: Slot, format: wgpu::TextureFormat },
    FaceOutOfRange(u32),
}

impl fmt::Display for Incomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incomplete::MissingAttachment => f.write_str("no attachments"),
            Incomplete::ZeroSize { slot, size } => {
                write!(f, "{slot:?} attachment has zero size {}x{}", size[0], size[1])
            }
            Incomplete::SizeMismatch { expected, found } => write!(
                f,
                "attachment size {}x{} does not match {}x{}",
                found[0], found[1], expected[0], expected[1]
            ),
            Incomplete::WrongFormat { slot, format } => {
                write!(f, "{format:?} cannot be used as {slot:?} attachment")
            }
            Incomplete::FaceOutOfRange(face) => write!(f, "cubemap face {face} out of range"),
        }
    }
}

impl std::error::Error for Incomplete {}

/// Completeness check over a set of attachments.
pub fn check_attachments(attachments: &[AttachmentInfo]) -> Result<(), Incomplete> {
    let Some(first) = attachments.first() else {
        return Err(Incomplete::MissingAttachment);
    };
    for info in attachments {
        if info.size[0] == 0 || info.size[1] == 0 {
            return Err(Incomplete::ZeroSize {
                slot: info.slot,
                size: info.size,
            });
        }
        if info.size != first.size {
            return Err(Incomplete::SizeMismatch {
                expected: first.size,
                found: info.size,
            });
        }
        let is_depth = info.format.is_depth_stencil_format();
        if is_depth != (info.slot == Slot::Depth) {
            return Err(Incomplete::WrongFormat {
                slot: info.slot,
                format: info.format,
            });
        }
        if let Some(face) = info.face {
            if face >= Texture::CUBE_FACES {
                return Err(Incomplete::FaceOutOfRange(face));
            }
        }
    }
    Ok(())
}

/// Completeness of a target declaring `slots`: each slot needs an attachment
/// and the attachments must pass [`check_attachments`].
pub fn check_target(slots: &[Slot], attachments: &[AttachmentInfo]) -> Result<(), Incomplete> {
    let unfilled = slots
        .iter()
        .any(|slot| !attachments.iter().any(|info| info.slot == *slot));
    if unfilled {
        return Err(Incomplete::MissingAttachment);
    }
    check_attachments(attachments)
}

#[derive(Debug)]
enum ColorAttachment {
    Owned(Texture),
    Face {
        texture: TextureId,
        face: u32,
        size: [u32; 2],
        format: wgpu::TextureFormat,
        view: wgpu::TextureView,
    },
}

/// How a pass started on a target clears its attachments.
#[derive(Clone, Copy, Debug)]
pub struct Clear {
    pub color: Option<wgpu::Color>,
    pub depth: Option<f32>,
}

impl Clear {
    pub const DEPTH: Clear = Clear {
        color: None,
        depth: Some(1.0),
    };

    pub fn all(color: wgpu::Color) -> Self {
        Self {
            color: Some(color),
            depth: Some(1.0),
        }
    }
}

#[derive(Debug)]
pub struct RenderTarget {
    id: TargetId,
    label: String,
    size: [u32; 2],
    policy: TargetPolicy,
    slots: Vec<Slot>,
    depth: Option<Texture>,
    color: Option<ColorAttachment>,
    status: Result<(), Incomplete>,
}

impl RenderTarget {
    /// Allocate the attachments described by `spec` and check completeness.
    ///
    /// Under [`TargetPolicy::Strict`] an inconsistent spec is an error. Under
    /// [`TargetPolicy::Lenient`] it is logged and the target is created anyway,
    /// with every attachment at least 1x1; [`begin_pass`](Self::begin_pass)
    /// still refuses it. A cube face slot leaves the target incomplete until
    /// [`attach_face`](Self::attach_face) fills it.
    pub fn create(
        device: &wgpu::Device,
        id: TargetId,
        spec: &AttachmentSpec,
        policy: TargetPolicy,
    ) -> Result<Self> {
        let allocated = spec.allocated();
        let consistent = check_attachments(&allocated);
        if let Err(reason) = &consistent {
            match policy {
                TargetPolicy::Strict => {
                    bail!("render target '{}' is incomplete: {}", spec.label, reason)
                }
                TargetPolicy::Lenient => {
                    log::error!("render target '{}' is incomplete: {}", spec.label, reason)
                }
            }
        }
        // A declared cube face slot stays empty until a face is attached.
        let pending_face = consistent.is_ok();
        let status = consistent.and_then(|()| check_target(&spec.slots(), &allocated));
        match &status {
            Ok(()) => log::debug!(
                "render target '{}' ({}x{}) is complete",
                spec.label,
                spec.size[0],
                spec.size[1]
            ),
            Err(_) if pending_face => {
                log::debug!("render target '{}' waits for a cubemap face", spec.label)
            }
            Err(_) => (),
        }

        let depth = spec.depth.as_ref().map(|depth| {
            let texture = Texture::create_depth_texture(
                device,
                spec.size,
                1,
                &format!("{} depth", spec.label),
            );
            if depth.format != Texture::DEPTH_FORMAT {
                log::warn!(
                    "render target '{}' asked for {:?}, using {:?}",
                    spec.label,
                    depth.format,
                    Texture::DEPTH_FORMAT
                );
            }
            texture
        });
        let color = match &spec.color {
            Some(ColorSpec::Owned { format }) => Some(ColorAttachment::Owned(
                Texture::create_render_texture(
                    device,
                    spec.size,
                    *format,
                    &format!("{} colour", spec.label),
                ),
            )),
            Some(ColorSpec::CubeFace { .. }) | None => None,
        };

        Ok(Self {
            id,
            label: spec.label.clone(),
            size: spec.size,
            policy,
            slots: spec.slots(),
            depth,
            color,
            status,
        })
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Result of the most recent completeness check.
    pub fn status(&self) -> &Result<(), Incomplete> {
        &self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_ok()
    }

    pub fn depth_texture(&self) -> Option<&Texture> {
        self.depth.as_ref()
    }

    pub fn color_texture(&self) -> Option<&Texture> {
        match &self.color {
            Some(ColorAttachment::Owned(texture)) => Some(texture),
            _ => None,
        }
    }

    /// The cubemap face currently attached as colour output, if any.
    pub fn attached_face(&self) -> Option<(TextureId, u32)> {
        match &self.color {
            Some(ColorAttachment::Face { texture, face, .. }) => Some((*texture, *face)),
            _ => None,
        }
    }

    fn attachments(&self) -> Vec<AttachmentInfo> {
        let mut infos = Vec::new();
        if let Some(depth) = &self.depth {
            infos.push(AttachmentInfo {
                slot: Slot::Depth,
                size: self.size,
                format: depth.format(),
                face: None,
            });
        }
        match &self.color {
            Some(ColorAttachment::Owned(texture)) => infos.push(AttachmentInfo {
                slot: Slot::Color,
                size: texture.size(),
                format: texture.format(),
                face: None,
            }),
            Some(ColorAttachment::Face {
                face, size, format, ..
            }) => infos.push(AttachmentInfo {
                slot: Slot::Color,
                size: *size,
                format: *format,
                face: Some(*face),
            }),
            None => (),
        }
        infos
    }

    /// Point the colour output at one face of `cubemap` without recreating the
    /// target. Re-runs the completeness check.
    pub fn attach_face(&mut self, cubemap_id: TextureId, cubemap: &Texture, face: u32) -> Result<()> {
        if cubemap.kind != TextureKind::Cube {
            bail!(
                "render target '{}': {:?} is not a cubemap",
                self.label,
                cubemap_id
            );
        }
        if let Some(ColorAttachment::Owned(_)) = &self.color {
            bail!(
                "render target '{}' owns its colour attachment, faces cannot be attached",
                self.label
            );
        }
        if face >= Texture::CUBE_FACES {
            // Nothing to view; the previous attachment stays but the target is
            // marked incomplete.
            self.status = Err(Incomplete::FaceOutOfRange(face));
        } else {
            self.color = Some(ColorAttachment::Face {
                texture: cubemap_id,
                face,
                size: cubemap.size(),
                format: cubemap.format(),
                view: cubemap.face_view(face)?,
            });
            self.status = check_target(&self.slots, &self.attachments());
        }
        if let Err(reason) = &self.status {
            match self.policy {
                TargetPolicy::Strict => bail!(
                    "render target '{}' is incomplete after attaching face {face}: {reason}",
                    self.label
                ),
                TargetPolicy::Lenient => log::error!(
                    "render target '{}' is incomplete after attaching face {face}: {reason}",
                    self.label
                ),
            }
        }
        Ok(())
    }

    /// Make this target the draw destination; the viewport follows its size.
    pub fn bind(&self, state: &mut RenderState) {
        state.bind_target(self.id, self.size[0], self.size[1]);
    }

    /// Restore the default framebuffer and the window viewport.
    pub fn unbind(&self, state: &mut RenderState) {
        if state.bound_target() != Some(self.id) {
            log::warn!(
                "unbinding render target '{}' which is not bound ({:?} is)",
                self.label,
                state.bound_target()
            );
        }
        state.unbind_target();
    }

    /// Start a render pass on this target, clearing as requested and applying
    /// the viewport from `state`.
    pub fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        state: &RenderState,
        clear: Clear,
    ) -> Result<wgpu::RenderPass<'e>> {
        if state.bound_target() != Some(self.id) {
            bail!(
                "render target '{}' must be bound before drawing (bound: {:?})",
                self.label,
                state.bound_target()
            );
        }
        // wgpu validates attachments when the pass begins, so even a lenient
        // target cannot be drawn into while incomplete.
        if let Err(reason) = &self.status {
            bail!("cannot draw into incomplete target '{}': {}", self.label, reason);
        }

        let color_view = match &self.color {
            Some(ColorAttachment::Owned(texture)) => Some(&texture.view),
            Some(ColorAttachment::Face { view, .. }) => Some(view),
            None => None,
        };
        let color_attachments = [color_view.map(|view| wgpu::RenderPassColorAttachment {
            view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: clear
                    .color
                    .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                store: wgpu::StoreOp::Store,
            },
        })];
        let color_attachments: &[Option<wgpu::RenderPassColorAttachment>] =
            if color_view.is_some() {
                &color_attachments
            } else {
                &[]
            };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments,
            depth_stencil_attachment: self.depth.as_ref().map(|depth| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: clear.depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        state.viewport().apply(&mut pass);
        Ok(pass)
    }

    /// Destroy the attachments this target owns. Borrowed cubemap faces survive.
    pub fn release(self) {
        log::debug!("releasing render target '{}'", self.label);
        if let Some(depth) = self.depth {
            depth.release();
        }
        if let Some(ColorAttachment::Owned(texture)) = self.color {
            texture.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(size: [u32; 2]) -> AttachmentInfo {
        AttachmentInfo {
            slot: Slot::Depth,
            size,
            format: Texture::DEPTH_FORMAT,
            face: None,
        }
    }

    fn color(size: [u32; 2], face: Option<u32>) -> AttachmentInfo {
        AttachmentInfo {
            slot: Slot::Color,
            size,
            format: Texture::HDR_FORMAT,
            face,
        }
    }

    #[test]
    fn depth_only_target_is_complete() {
        assert_eq!(check_attachments(&[depth([1024, 1024])]), Ok(()));
        let spec = AttachmentSpec::depth_only("shadow", [1024, 1024]);
        assert_eq!(check_attachments(&spec.allocated()), Ok(()));
    }

    #[test]
    fn zero_sized_target_is_incomplete() {
        let spec = AttachmentSpec::depth_only("shadow", [0, 0]);
        assert!(matches!(
            check_attachments(&spec.allocated()),
            Err(Incomplete::ZeroSize { .. })
        ));
        assert!(check_attachments(&[depth([16, 16]), color([0, 16], None)]).is_err());
    }

    #[test]
    fn empty_target_is_incomplete() {
        assert_eq!(check_attachments(&[]), Err(Incomplete::MissingAttachment));
    }

    #[test]
    fn mismatched_sizes_are_incomplete() {
        assert_eq!(
            check_attachments(&[depth([16, 16]), color([32, 32], Some(0))]),
            Err(Incomplete::SizeMismatch {
                expected: [16, 16],
                found: [32, 32]
            })
        );
    }

    #[test]
    fn formats_must_match_their_slot() {
        let wrong_depth = AttachmentInfo {
            format: wgpu::TextureFormat::Rgba8Unorm,
            ..depth([8, 8])
        };
        assert!(matches!(
            check_attachments(&[wrong_depth]),
            Err(Incomplete::WrongFormat { slot: Slot::Depth, .. })
        ));
        let wrong_color = AttachmentInfo {
            format: Texture::DEPTH_FORMAT,
            ..color([8, 8], None)
        };
        assert!(check_attachments(&[wrong_color]).is_err());
    }

    #[test]
    fn cube_faces_are_bounded() {
        assert!(check_attachments(&[depth([8, 8]), color([8, 8], Some(5))]).is_ok());
        assert_eq!(
            check_attachments(&[depth([8, 8]), color([8, 8], Some(6))]),
            Err(Incomplete::FaceOutOfRange(6))
        );
    }

    #[test]
    fn cube_face_spec_is_incomplete_until_a_face_is_attached() {
        let spec = AttachmentSpec::cube_face("bake", 16, Texture::HDR_FORMAT);
        let mut attachments = spec.allocated();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].slot, Slot::Depth);
        assert_eq!(
            check_target(&spec.slots(), &attachments),
            Err(Incomplete::MissingAttachment)
        );

        attachments.push(color([16, 16], Some(2)));
        assert_eq!(check_target(&spec.slots(), &attachments), Ok(()));
    }

    #[test]
    fn depth_only_spec_needs_no_colour() {
        let spec = AttachmentSpec::depth_only("shadow", [64, 64]);
        assert_eq!(check_target(&spec.slots(), &spec.allocated()), Ok(()));
        assert_eq!(
            check_target(&[Slot::Depth], &[]),
            Err(Incomplete::MissingAttachment)
        );
    }
}
