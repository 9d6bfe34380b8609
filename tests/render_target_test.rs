#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn depth_only_target_is_complete() {
    use common::{headless, test_config};
    use vista_ngin::data_structures::{
        registry::ResourceRegistry,
        render_target::{AttachmentSpec, TargetPolicy},
    };

    let ctx = headless(&test_config());
    let mut registry = ResourceRegistry::new();
    let id = registry
        .create_target(
            &ctx.device,
            &AttachmentSpec::depth_only("shadow", [1024, 1024]),
            TargetPolicy::Strict,
        )
        .unwrap();
    let target = registry.target(id).unwrap();
    assert!(target.is_complete());
    assert_eq!(target.depth_texture().unwrap().size(), [1024, 1024]);
    assert!(target.color_texture().is_none());
}

#[test]
#[cfg(feature = "integration-tests")]
fn zero_sized_target_is_refused_or_incomplete() {
    use common::{headless, test_config};
    use vista_ngin::data_structures::{
        registry::ResourceRegistry,
        render_target::{AttachmentSpec, Clear, TargetPolicy},
    };

    let mut ctx = headless(&test_config());
    let mut registry = ResourceRegistry::new();
    let spec = AttachmentSpec::depth_only("empty", [0, 0]);
    assert!(
        registry
            .create_target(&ctx.device, &spec, TargetPolicy::Strict)
            .is_err()
    );

    let id = registry
        .create_target(&ctx.device, &spec, TargetPolicy::Lenient)
        .unwrap();
    let target = registry.target(id).unwrap();
    assert!(!target.is_complete());

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    target.bind(&mut ctx.state);
    assert!(
        target
            .begin_pass(&mut encoder, &ctx.state, Clear::DEPTH)
            .is_err()
    );
    target.unbind(&mut ctx.state);
}

#[test]
#[cfg(feature = "integration-tests")]
fn bind_and_unbind_restore_the_window_viewport() {
    use common::{headless, test_config};
    use vista_ngin::{
        data_structures::{
            registry::ResourceRegistry,
            render_target::{AttachmentSpec, TargetPolicy},
        },
        state::Viewport,
    };

    let config = test_config();
    let mut ctx = headless(&config);
    let mut registry = ResourceRegistry::new();
    let id = registry
        .create_target(
            &ctx.device,
            &AttachmentSpec::depth_only("shadow", [128, 128]),
            TargetPolicy::Strict,
        )
        .unwrap();
    let target = registry.target(id).unwrap();

    let window = ctx.state.viewport();
    assert_eq!(window, Viewport::new(config.width, config.height));
    target.bind(&mut ctx.state);
    assert_eq!(ctx.state.viewport(), Viewport::new(128, 128));
    assert_eq!(ctx.state.bound_target(), Some(id));
    target.unbind(&mut ctx.state);
    assert_eq!(ctx.state.viewport(), window);
    assert_eq!(ctx.state.bound_target(), None);
}

#[test]
#[cfg(feature = "integration-tests")]
fn cube_face_target_completes_once_a_face_is_attached() {
    use common::{headless, test_config};
    use vista_ngin::data_structures::{
        registry::ResourceRegistry,
        render_target::{AttachmentSpec, TargetPolicy},
        texture::Texture,
    };

    let ctx = headless(&test_config());
    let mut registry = ResourceRegistry::new();
    let cubemap = registry.insert_texture(Texture::create_cubemap(
        &ctx.device,
        16,
        Texture::HDR_FORMAT,
        "cubemap",
    ));
    let id = registry
        .create_target(
            &ctx.device,
            &AttachmentSpec::cube_face("bake", 16, Texture::HDR_FORMAT),
            TargetPolicy::Lenient,
        )
        .unwrap();
    assert!(!registry.target(id).unwrap().is_complete());

    registry.attach_face(id, cubemap, 3).unwrap();
    let target = registry.target(id).unwrap();
    assert!(target.is_complete());
    assert_eq!(target.attached_face(), Some((cubemap, 3)));

    // Lenient: an out-of-range face is logged and leaves the target incomplete.
    registry.attach_face(id, cubemap, 6).unwrap();
    assert!(!registry.target(id).unwrap().is_complete());

    registry.release_target(id).unwrap();
    assert!(registry.release_target(id).is_err());
    assert!(registry.target(id).is_err());
}

#[test]
#[cfg(feature = "integration-tests")]
fn strict_cube_face_target_refuses_to_render_without_a_face() {
    use common::{headless, test_config};
    use vista_ngin::data_structures::{
        registry::ResourceRegistry,
        render_target::{AttachmentSpec, Clear, Incomplete, TargetPolicy},
        texture::Texture,
    };

    let mut ctx = headless(&test_config());
    let mut registry = ResourceRegistry::new();
    let cubemap = registry.insert_texture(Texture::create_cubemap(
        &ctx.device,
        16,
        Texture::HDR_FORMAT,
        "cubemap",
    ));
    // Strict creation accepts the target, it only waits for its colour face.
    let id = registry
        .create_target(
            &ctx.device,
            &AttachmentSpec::cube_face("bake", 16, Texture::HDR_FORMAT),
            TargetPolicy::Strict,
        )
        .unwrap();
    let target = registry.target(id).unwrap();
    assert_eq!(target.status(), &Err(Incomplete::MissingAttachment));

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    target.bind(&mut ctx.state);
    assert!(
        target
            .begin_pass(&mut encoder, &ctx.state, Clear::all(wgpu::Color::BLACK))
            .is_err()
    );
    target.unbind(&mut ctx.state);

    registry.attach_face(id, cubemap, 0).unwrap();
    assert!(registry.target(id).unwrap().is_complete());
    registry.release_all();
}
