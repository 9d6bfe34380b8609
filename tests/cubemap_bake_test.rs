#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn uniform_panorama_bakes_to_uniform_faces() {
    use common::{PANORAMA_COLOUR, block_on, headless, test_config, uniform_panorama};
    use vista_ngin::{
        data_structures::{
            model::Mesh, registry::ResourceRegistry, render_target::TargetPolicy,
            texture::Texture,
        },
        passes::cubemap::CubemapBaker,
        resources::readback::read_rgba16f,
    };

    let config = test_config();
    let mut ctx = headless(&config);
    let panorama = uniform_panorama(&ctx);
    let cube = Mesh::cube(&ctx.device, "unit cube", 1.0);
    let mut registry = ResourceRegistry::new();

    let before = ctx.state.snapshot();
    let baked = CubemapBaker::bake(
        &mut ctx,
        &mut registry,
        &panorama,
        &cube,
        config.cubemap_size,
        TargetPolicy::Strict,
    )
    .unwrap();
    assert_eq!(ctx.state.snapshot(), before);
    // The temporary bake target is gone, only the cubemap is left.
    assert_eq!(registry.len(), 1);

    let cubemap = registry.texture(baked.texture).unwrap();
    assert_eq!(cubemap.size(), [config.cubemap_size; 2]);
    for face in 0..Texture::CUBE_FACES {
        let texels = block_on(read_rgba16f(&ctx.device, &ctx.queue, cubemap, face)).unwrap();
        assert_eq!(texels.len(), (config.cubemap_size * config.cubemap_size) as usize);
        for texel in texels {
            for (actual, expected) in texel.iter().zip(PANORAMA_COLOUR) {
                assert!(
                    (actual - expected).abs() < 1e-2,
                    "face {face}: {texel:?} != {PANORAMA_COLOUR:?}"
                );
            }
        }
    }
}

#[test]
#[cfg(feature = "integration-tests")]
fn baked_face_views_follow_the_face_table() {
    use cgmath::{Matrix4, Point3, Vector3};
    use common::{headless, test_config, uniform_panorama};
    use vista_ngin::{
        data_structures::{model::Mesh, registry::ResourceRegistry, render_target::TargetPolicy},
        passes::cubemap::{CUBE_FACES, CubemapBaker},
    };

    let config = test_config();
    let mut ctx = headless(&config);
    let panorama = uniform_panorama(&ctx);
    let cube = Mesh::cube(&ctx.device, "unit cube", 1.0);
    let mut registry = ResourceRegistry::new();
    let baked = CubemapBaker::bake(
        &mut ctx,
        &mut registry,
        &panorama,
        &cube,
        8,
        TargetPolicy::Lenient,
    )
    .unwrap();

    for (view, face) in baked.face_views.iter().zip(CUBE_FACES) {
        let expected = Matrix4::look_at_rh(
            Point3::new(0.0, 0.0, 0.0),
            Point3::from(face.direction),
            Vector3::from(face.up),
        );
        assert_eq!(*view, expected);
    }
    registry.release_all();
    assert!(registry.is_empty());
}

#[test]
#[cfg(feature = "integration-tests")]
fn failed_bake_releases_its_resources() {
    use common::{headless, test_config};
    use vista_ngin::{
        data_structures::{
            model::Mesh, registry::ResourceRegistry, render_target::TargetPolicy,
            texture::Texture,
        },
        passes::cubemap::CubemapBaker,
    };

    let config = test_config();
    let mut ctx = headless(&config);
    // A colour buffer has no sampler, so the panorama cannot be bound.
    let unsampled = Texture::create_msaa_texture(
        &ctx.device,
        [8, 8],
        wgpu::TextureFormat::Rgba8UnormSrgb,
        1,
    );
    let cube = Mesh::cube(&ctx.device, "unit cube", 1.0);
    let mut registry = ResourceRegistry::new();

    let before = ctx.state.snapshot();
    let baked = CubemapBaker::bake(
        &mut ctx,
        &mut registry,
        &unsampled,
        &cube,
        8,
        TargetPolicy::Strict,
    );
    assert!(baked.is_err());
    assert_eq!(ctx.state.snapshot(), before);
    assert!(registry.is_empty());
}
