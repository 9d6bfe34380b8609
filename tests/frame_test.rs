#[cfg(feature = "integration-tests")]
mod common;

#[test]
#[cfg(feature = "integration-tests")]
fn fixed_camera_frames_are_identical() {
    use common::{block_on, cube_model, headless, test_config, uniform_panorama};
    use instant::Duration;
    use vista_ngin::{
        camera::{Camera, FixedCamera},
        frame::{FrameOrchestrator, FrameStage},
        resources::readback::read_rgba8,
    };

    let config = test_config();
    let mut ctx = headless(&config);
    let panorama = uniform_panorama(&ctx);
    let model = cube_model(&ctx, 10.0);
    let mut orchestrator = FrameOrchestrator::new(&mut ctx, &config, panorama, model).unwrap();
    let mut camera = Camera::new(&config.camera);
    let mut controller = FixedCamera;

    let mut frames = Vec::new();
    let mut states = Vec::new();
    for _ in 0..2 {
        orchestrator
            .frame(&mut ctx, &mut camera, &mut controller, Duration::from_millis(16))
            .unwrap();
        assert_eq!(orchestrator.stage(), Some(FrameStage::Present));
        states.push(ctx.state.snapshot());
        let output = ctx.offscreen_texture().unwrap();
        frames.push(block_on(read_rgba8(&ctx.device, &ctx.queue, output)).unwrap());
    }
    assert_eq!(frames[0].dimensions(), (config.width, config.height));
    assert_eq!(frames[0].as_raw(), frames[1].as_raw());
    assert_eq!(states[0], states[1]);
    assert_eq!(states[0].bound, None);
    assert_eq!(states[0].projection_depth, 0);

    orchestrator.shutdown();
    assert!(orchestrator.registry().is_empty());
}

#[test]
#[cfg(feature = "integration-tests")]
fn out_of_order_stages_are_rejected() {
    use common::{cube_model, headless, test_config, uniform_panorama};
    use vista_ngin::frame::{FrameOrchestrator, FrameStage};

    let config = test_config();
    let mut ctx = headless(&config);
    let panorama = uniform_panorama(&ctx);
    let model = cube_model(&ctx, 10.0);
    let mut orchestrator = FrameOrchestrator::new(&mut ctx, &config, panorama, model).unwrap();

    assert!(orchestrator.advance(FrameStage::SceneDraw).is_err());
    orchestrator.advance(FrameStage::CameraUpdate).unwrap();
    assert!(orchestrator.advance(FrameStage::MainPassBegin).is_err());
    orchestrator.advance(FrameStage::ShadowPass).unwrap();
    assert_eq!(orchestrator.stage(), Some(FrameStage::ShadowPass));
}

#[test]
#[cfg(feature = "integration-tests")]
fn startup_owns_the_panorama_cubemap_and_shadow_map() {
    use common::{cube_model, headless, test_config, uniform_panorama};
    use vista_ngin::frame::FrameOrchestrator;

    let config = test_config();
    let mut ctx = headless(&config);
    let panorama = uniform_panorama(&ctx);
    let model = cube_model(&ctx, 10.0);
    let mut orchestrator = FrameOrchestrator::new(&mut ctx, &config, panorama, model).unwrap();

    // panorama, cubemap and shadow map target
    assert_eq!(orchestrator.registry().len(), 3);
    let registry = orchestrator.registry();
    assert!(registry.texture(orchestrator.panorama()).is_ok());
    assert!(registry.texture(orchestrator.environment().texture).is_ok());
    assert!(registry.target(orchestrator.shadow().target()).unwrap().is_complete());
    orchestrator.shutdown();
    assert!(orchestrator.registry().is_empty());
}
