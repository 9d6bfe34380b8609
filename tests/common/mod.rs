#![allow(dead_code)]

use std::future::Future;

use vista_ngin::{
    config::Config,
    context::Context,
    data_structures::{
        model::{Material, Mesh, Model},
        texture::Texture,
    },
};

/// Colour of the uniform test panorama.
pub const PANORAMA_COLOUR: [f32; 4] = [0.25, 0.5, 0.75, 1.0];

pub fn block_on<F: Future>(future: F) -> F::Output {
    futures::executor::block_on(future)
}

/// Small, single-sampled settings so tests stay fast and deterministic.
pub fn test_config() -> Config {
    Config {
        width: 64,
        height: 64,
        msaa_samples: 1,
        shadow_resolution: 256,
        cubemap_size: 32,
        overlay_size: 16,
        ..Config::default()
    }
}

pub fn headless(config: &Config) -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    block_on(Context::headless(config)).expect("failed to create a headless context")
}

/// A 64x32 panorama of a single colour.
pub fn uniform_panorama(ctx: &Context) -> Texture {
    let img = image::DynamicImage::ImageRgba32F(image::Rgba32FImage::from_pixel(
        64,
        32,
        image::Rgba(PANORAMA_COLOUR),
    ));
    Texture::from_hdr_image(&ctx.device, &ctx.queue, &img, "uniform panorama")
        .expect("failed to upload the panorama")
}

/// A white cube of edge `size` centred on the origin.
pub fn cube_model(ctx: &Context, size: f32) -> Model {
    let material = Material::new(
        &ctx.device,
        "white",
        Texture::create_solid([255; 4], 1, 1, &ctx.device, &ctx.queue),
        &ctx.pipelines.layouts.texture,
    )
    .expect("failed to create the material");
    Model::from_mesh(Mesh::cube(&ctx.device, "test cube", size), material)
}
