#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
fn render_shadow(
    ctx: &mut vista_ngin::context::Context,
    shadow: &mut vista_ngin::passes::shadow::ShadowPass,
    registry: &vista_ngin::data_structures::registry::ResourceRegistry,
    model: &vista_ngin::data_structures::model::Model,
) -> Vec<f32> {
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("shadow test encoder"),
        });
    shadow.record(ctx, registry, &mut encoder, model).unwrap();
    ctx.queue.submit(std::iter::once(encoder.finish()));
    let depth = shadow.depth_texture(registry).unwrap();
    common::block_on(vista_ngin::resources::readback::read_depth(
        &ctx.device,
        &ctx.queue,
        depth,
    ))
    .unwrap()
}

#[test]
#[cfg(feature = "integration-tests")]
fn shadow_pass_is_idempotent() {
    use common::{cube_model, headless, test_config};
    use vista_ngin::{data_structures::registry::ResourceRegistry, passes::shadow::ShadowPass};

    let config = test_config();
    let mut ctx = headless(&config);
    let mut registry = ResourceRegistry::new();
    let mut shadow = ShadowPass::new(&mut ctx, &mut registry, &config).unwrap();
    let mut model = cube_model(&ctx, 100.0);
    model.place([0.0, 0.0, -200.0], 1.0);

    let before = ctx.state.snapshot();
    let first = render_shadow(&mut ctx, &mut shadow, &registry, &model);
    let second = render_shadow(&mut ctx, &mut shadow, &registry, &model);
    assert_eq!(ctx.state.snapshot(), before);

    let resolution = config.shadow_resolution as usize;
    assert_eq!(first.len(), resolution * resolution);
    assert!(first.iter().any(|depth| *depth < 1.0), "the cube left no depth");
    assert!(first.iter().any(|depth| *depth == 1.0), "the cube covers everything");
    let first_bits: Vec<u32> = first.iter().map(|depth| depth.to_bits()).collect();
    let second_bits: Vec<u32> = second.iter().map(|depth| depth.to_bits()).collect();
    assert_eq!(first_bits, second_bits);
}

#[test]
#[cfg(feature = "integration-tests")]
fn model_outside_the_extent_leaves_the_clear_depth() {
    use common::{cube_model, headless, test_config};
    use vista_ngin::{data_structures::registry::ResourceRegistry, passes::shadow::ShadowPass};

    let config = test_config();
    let mut ctx = headless(&config);
    let mut registry = ResourceRegistry::new();
    let mut shadow = ShadowPass::new(&mut ctx, &mut registry, &config).unwrap();
    let mut model = cube_model(&ctx, 10.0);
    model.place([5000.0, 0.0, -200.0], 1.0);

    let depth = render_shadow(&mut ctx, &mut shadow, &registry, &model);
    assert!(depth.iter().all(|depth| *depth == 1.0));
}
