//! Simple render example.
//!
//! Builds a few spheres on a floor, with a glass ball throwing caustics,
//! and saves the frame as `output.png`.
//!
//! Run with `RUST_LOG=info cargo run --example simple_render`.

use std::sync::Arc;

use helio_math::{Mat4, Quat};
use helio_renderer::{
    render, Camera, DiffuseShader, GlassShader, ImageDisplay, InstanceParams, MirrorShader, Options,
    PhongShader, PinholeLens, Plane, Plugins, PointLight, SceneBuilder, Sphere, TaskMonitor, Color, Vec3,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let width = 640;
    let height = 360;
    let plugins = Plugins::default();
    let scene = Arc::new(build_scene(width as f32 / height as f32)?.build(&plugins)?);

    let mut options = Options::from_json(
        r#"{
            "aa.min": 0,
            "aa.max": 2,
            "filter": "gaussian",
            "gi.engine": "ambocc",
            "gi.ambocc.samples": 16,
            "gi.ambocc.maxdist": 3.0,
            "caustics": "kd",
            "caustics.emit": 200000
        }"#,
    )?;
    options.set("resolutionX", width);
    options.set("resolutionY", height);

    let display = ImageDisplay::with_output("output.png");
    let stats = render(scene, &options, &display, &TaskMonitor::new(), &plugins)?;
    log::info!("Traced {} rays for {} pixels", stats.rays, stats.pixels);
    Ok(())
}

fn build_scene(aspect: f32) -> anyhow::Result<SceneBuilder> {
    let mut builder = SceneBuilder::new();
    builder
        .primitives("floor", Plane::new(Vec3::ZERO, Vec3::Y))
        .primitives("ball", Sphere::new(Vec3::ZERO, 1.0))
        .shader("floor", DiffuseShader::new(Color::splat(0.6)))
        .shader("glass", GlassShader::new(1.5, Color::ONE).with_absorption(2.0, Color::new(0.7, 0.9, 1.0)))
        .shader("chrome", MirrorShader::new(Color::new(0.8, 0.8, 0.85)))
        .shader("plastic", PhongShader::new(Color::new(0.6, 0.15, 0.1), Color::splat(0.4), 60.0, 4))
        .light(PointLight::new(Vec3::new(2.0, 8.0, 4.0), Color::splat(400.0)))
        .camera(Camera::look_at(
            PinholeLens::new(50.0, aspect),
            Vec3::new(0.0, 3.0, 10.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::Y,
        )?);

    builder.instance("floor", InstanceParams::new("floor").shader("floor"))?;
    builder.instance(
        "glass",
        InstanceParams::new("ball")
            .shader("glass")
            .transform(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))),
    )?;
    builder.instance(
        "chrome",
        InstanceParams::new("ball")
            .shader("chrome")
            .transform(Mat4::from_translation(Vec3::new(-2.5, 1.0, -1.0))),
    )?;
    builder.instance(
        "plastic",
        InstanceParams::new("ball")
            .shader("plastic")
            .transform(Mat4::from_translation(Vec3::new(2.5, 1.0, -1.0))),
    )?;

    // Small scattered spheres
    let mut rng = StdRng::seed_from_u64(7);
    let mut count = 0;
    for a in -4..4 {
        for b in -4..2 {
            let center = Vec3::new(a as f32 + 0.8 * rng.gen::<f32>(), 0.2, b as f32 + 0.8 * rng.gen::<f32>());
            if center.x.abs() < 3.5 && center.z > -2.0 {
                continue;
            }
            let name = format!("pebble{}", count);
            let albedo = Color::new(rng.gen(), rng.gen(), rng.gen()) * 0.8;
            builder.shader(&name, DiffuseShader::new(albedo));
            builder.instance(
                &name,
                InstanceParams::new("ball")
                    .shader(&name)
                    .transform(Mat4::from_scale_rotation_translation(
                        Vec3::splat(0.2),
                        Quat::IDENTITY,
                        center,
                    )),
            )?;
            count += 1;
        }
    }

    Ok(builder)
}
