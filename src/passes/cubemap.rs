//! Equirectangular panorama to cubemap conversion.
//!
//! The panorama is projected onto the inside of a unit cube and rendered six
//! times, once per face, with a 90 degree camera at the origin looking down
//! each axis. The result is a cubemap whose face `i` holds what a viewer at the
//! origin sees in direction `CUBE_FACES[i].direction`.

use anyhow::{Context as _, Result};
use cgmath::{Deg, Matrix4, Point3, SquareMatrix, Vector3};

use crate::{
    camera::OPENGL_TO_WGPU_MATRIX,
    context::Context,
    data_structures::{
        model::{DrawModel, Mesh},
        registry::{ResourceRegistry, TargetId, TextureId},
        render_target::{AttachmentSpec, Clear, TargetPolicy},
        texture::Texture,
    },
    pipelines::{
        ShaderKind,
        uniforms::{MatrixUniform, UniformSlot},
    },
};

/// Look direction and up vector of one cube face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubeFace {
    pub direction: [f32; 3],
    pub up: [f32; 3],
}

/// Faces in cubemap layer order: +X, -X, +Y, -Y, +Z, -Z.
pub const CUBE_FACES: [CubeFace; 6] = [
    CubeFace {
        direction: [1.0, 0.0, 0.0],
        up: [0.0, -1.0, 0.0],
    },
    CubeFace {
        direction: [-1.0, 0.0, 0.0],
        up: [0.0, -1.0, 0.0],
    },
    CubeFace {
        direction: [0.0, 1.0, 0.0],
        up: [0.0, 0.0, 1.0],
    },
    CubeFace {
        direction: [0.0, -1.0, 0.0],
        up: [0.0, 0.0, -1.0],
    },
    CubeFace {
        direction: [0.0, 0.0, 1.0],
        up: [0.0, -1.0, 0.0],
    },
    CubeFace {
        direction: [0.0, 0.0, -1.0],
        up: [0.0, -1.0, 0.0],
    },
];

const FACE_NEAR: f32 = 0.1;
const FACE_FAR: f32 = 10.0;

/// View matrix used to render cube face `face`.
pub fn face_view_matrix(face: &CubeFace) -> Matrix4<f32> {
    Matrix4::look_at_rh(
        Point3::new(0.0, 0.0, 0.0),
        Point3::from(face.direction),
        Vector3::from(face.up),
    )
}

/// 90 degree square projection shared by all faces.
///
/// wgpu stores the top of clip space in row 0 while cube sampling expects the
/// row order of the face table, so y is mirrored.
pub fn face_projection() -> Matrix4<f32> {
    Matrix4::from_nonuniform_scale(1.0, -1.0, 1.0)
        * OPENGL_TO_WGPU_MATRIX
        * cgmath::perspective(Deg(90.0), 1.0, FACE_NEAR, FACE_FAR)
}

/// A baked environment cubemap and the view matrix each face was rendered with.
#[derive(Clone, Debug, PartialEq)]
pub struct BakedCubemap {
    pub texture: TextureId,
    pub face_views: [Matrix4<f32>; 6],
}

pub struct CubemapBaker;

impl CubemapBaker {
    /// Pipeline variants [`bake`](Self::bake) uses.
    pub fn prepare(ctx: &mut Context) {
        let key = {
            let mut state = ctx.state.scoped();
            state.set_backface_culling(false);
            state.pipeline_key(ShaderKind::Equirect)
        };
        ctx.pipelines.prepare(&ctx.device, key);
    }

    /// Render `panorama` onto the six faces of a new `face_size` cubemap owned by
    /// `registry`. `panorama` must not be empty.
    ///
    /// The render state is the same before and after, on success and on error.
    /// The bake target is always released; on error the cubemap is released too.
    pub fn bake(
        ctx: &mut Context,
        registry: &mut ResourceRegistry,
        panorama: &Texture,
        cube: &Mesh,
        face_size: u32,
        policy: TargetPolicy,
    ) -> Result<BakedCubemap> {
        Self::prepare(ctx);
        let cubemap = registry.insert_texture(Texture::create_cubemap(
            &ctx.device,
            face_size,
            Texture::HDR_FORMAT,
            "environment cubemap",
        ));
        let baked = registry
            .create_target(
                &ctx.device,
                &AttachmentSpec::cube_face("cubemap bake", face_size, Texture::HDR_FORMAT),
                policy,
            )
            .and_then(|target| {
                let rendered = Self::render_faces(ctx, registry, target, cubemap, panorama, cube);
                let released = registry.release_target(target);
                rendered.and_then(|face_views| released.map(|()| face_views))
            });

        match baked {
            Ok(face_views) => {
                log::info!("baked {face_size}x{face_size} environment cubemap");
                Ok(BakedCubemap {
                    texture: cubemap,
                    face_views,
                })
            }
            Err(e) => {
                if let Err(release) = registry.release_texture(cubemap) {
                    log::warn!("failed to release the unfinished cubemap: {release:#}");
                }
                Err(e)
            }
        }
    }

    fn render_faces(
        ctx: &mut Context,
        registry: &mut ResourceRegistry,
        target: TargetId,
        cubemap: TextureId,
        panorama: &Texture,
        cube: &Mesh,
    ) -> Result<[Matrix4<f32>; 6]> {
        let panorama_bind_group =
            ctx.pipelines
                .layouts
                .sampled_bind_group(&ctx.device, panorama, "panorama")?;
        let uniform = UniformSlot::new(&ctx.device, &ctx.pipelines.layouts, "cubemap bake matrices");

        let mut state = ctx.state.scoped();
        state.set_backface_culling(false);
        let key = state.use_shader(ShaderKind::Equirect);
        let pipeline = ctx.pipelines.get(key)?;
        state.push_projection(face_projection());

        let mut face_views = [Matrix4::identity(); 6];
        for (index, face) in CUBE_FACES.iter().enumerate() {
            let view = face_view_matrix(face);
            state.set_view(view);
            registry
                .attach_face(target, cubemap, index as u32)
                .with_context(|| format!("attaching cubemap face {index}"))?;
            let render_target = registry.target(target)?;
            render_target.bind(&mut state);

            uniform.write(
                &ctx.queue,
                &MatrixUniform::new(state.projection(), state.view(), Matrix4::identity()),
            );
            let mut encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("cubemap bake encoder"),
                });
            {
                let mut pass =
                    render_target.begin_pass(&mut encoder, &state, Clear::all(wgpu::Color::BLACK))?;
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &uniform.bind_group, &[]);
                pass.set_bind_group(1, &panorama_bind_group, &[]);
                pass.draw_mesh(cube);
            }
            // The uniform write above only lands with this submit.
            ctx.queue.submit(std::iter::once(encoder.finish()));
            face_views[index] = view;
            log::debug!("baked cubemap face {index}");
        }

        state.pop_projection()?;
        registry.target(target)?.unbind(&mut state);
        state.clear_shader();
        Ok(face_views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Transform, Vector4};

    #[test]
    fn face_table_is_fixed() {
        let expected = [
            ([1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
            ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0]),
            ([0.0, -1.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, 0.0, 1.0], [0.0, -1.0, 0.0]),
            ([0.0, 0.0, -1.0], [0.0, -1.0, 0.0]),
        ];
        for (face, (direction, up)) in CUBE_FACES.iter().zip(expected) {
            assert_eq!(face.direction, direction);
            assert_eq!(face.up, up);
        }
    }

    #[test]
    fn each_face_looks_down_its_direction() {
        for face in &CUBE_FACES {
            let view = face_view_matrix(face);
            let forward = view.transform_vector(Vector3::from(face.direction));
            assert!((forward - Vector3::new(0.0, 0.0, -1.0)).magnitude() < 1e-6);
            let up = view.transform_vector(Vector3::from(face.up));
            assert!((up - Vector3::new(0.0, 1.0, 0.0)).magnitude() < 1e-6);
        }
    }

    #[test]
    fn face_views_match_look_at() {
        for face in &CUBE_FACES {
            assert_eq!(
                face_view_matrix(face),
                Matrix4::look_at_rh(
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::from(face.direction),
                    Vector3::from(face.up)
                )
            );
        }
    }

    #[test]
    fn projection_covers_ninety_degrees_with_flipped_y() {
        let projection = face_projection();
        // A point on the upper edge of the frustum lands on the lower NDC edge.
        let clip = projection * Vector4::new(0.0, 1.0, -1.0, 1.0);
        assert!((clip.y / clip.w + 1.0).abs() < 1e-5);
        let clip = projection * Vector4::new(1.0, 0.0, -1.0, 1.0);
        assert!((clip.x / clip.w - 1.0).abs() < 1e-5);
        let far = projection * Vector4::new(0.0, 0.0, -FACE_FAR, 1.0);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }
}
