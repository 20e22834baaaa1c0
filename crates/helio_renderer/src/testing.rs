//! Small scenes and helpers shared by the unit tests.

use std::sync::Arc;

use helio_core::{Options, TaskMonitor};
use helio_math::color::{self, Color};
use helio_math::{Ray, Vec3};
use rayon::ThreadPool;

use crate::camera::{Camera, PinholeLens};
use crate::light::PointLight;
use crate::light_server::LightServer;
use crate::plugins::Plugins;
use crate::primitive::{Plane, Sphere};
use crate::scene::{InstanceParams, Scene, SceneBuilder};
use crate::shader::{ConstantShader, DiffuseShader, GlassShader, MirrorShader};
use crate::shading_state::ShadingState;
use crate::state::IntersectionState;

pub const EYE: Vec3 = Vec3::new(0.0, 0.0, 5.0);

fn camera(aspect: f32) -> Camera {
    Camera::look_at(PinholeLens::new(45.0, aspect), EYE, Vec3::ZERO, Vec3::Y).unwrap()
}

/// A grey unit sphere at the origin lit from above and in front. No camera.
pub fn lit_sphere() -> SceneBuilder {
    let mut builder = SceneBuilder::new();
    builder
        .primitives("ball", Sphere::new(Vec3::ZERO, 1.0))
        .shader("grey", DiffuseShader::new(Color::splat(0.5)))
        .light(PointLight::new(Vec3::new(0.0, 5.0, 5.0), Color::splat(50.0)));
    builder
        .instance("ball", InstanceParams::new("ball").shader("grey"))
        .unwrap();
    builder
}

/// [`lit_sphere`] seen from [`EYE`].
pub fn sphere_builder() -> SceneBuilder {
    let mut builder = lit_sphere();
    builder.camera(camera(1.5));
    builder
}

pub fn sphere_scene() -> Arc<Scene> {
    Arc::new(sphere_builder().build(&Plugins::default()).unwrap())
}

/// An infinite wall through the origin facing the camera, shaded `color`.
pub fn flat_wall(color: Color) -> Arc<Scene> {
    let mut builder = SceneBuilder::new();
    builder
        .primitives("wall", Plane::new(Vec3::ZERO, Vec3::Z))
        .shader("flat", ConstantShader::new(color))
        .camera(camera(1.0));
    builder
        .instance("wall", InstanceParams::new("wall").shader("flat"))
        .unwrap();
    Arc::new(builder.build(&Plugins::default()).unwrap())
}

/// Two parallel mirrors facing each other, with the eye between them.
pub fn mirror_box() -> Arc<Scene> {
    let mut builder = SceneBuilder::new();
    builder
        .primitives("back", Plane::new(Vec3::new(0.0, 0.0, -1.0), Vec3::Z))
        .primitives("front", Plane::new(Vec3::new(0.0, 0.0, 6.0), Vec3::NEG_Z))
        .shader("mirror", MirrorShader::new(color::WHITE))
        .camera(camera(1.0));
    builder
        .instance("back", InstanceParams::new("back").shader("mirror"))
        .unwrap();
    builder
        .instance("front", InstanceParams::new("front").shader("mirror"))
        .unwrap();
    Arc::new(builder.build(&Plugins::default()).unwrap())
}

/// A glass ball above a diffuse floor, lit from straight above.
pub fn glass_over_floor() -> Arc<Scene> {
    let mut builder = SceneBuilder::new();
    builder
        .primitives("ball", Sphere::new(Vec3::new(0.0, 1.0, 0.0), 1.0))
        .primitives("floor", Plane::new(Vec3::new(0.0, -1.0, 0.0), Vec3::Y))
        .shader("glass", GlassShader::new(1.5, color::WHITE))
        .shader("grey", DiffuseShader::new(Color::splat(0.7)))
        .light(PointLight::new(Vec3::new(0.0, 6.0, 0.0), Color::splat(100.0)))
        .camera(camera(1.0));
    builder
        .instance("ball", InstanceParams::new("ball").shader("glass"))
        .unwrap();
    builder
        .instance("floor", InstanceParams::new("floor").shader("grey"))
        .unwrap();
    Arc::new(builder.build(&Plugins::default()).unwrap())
}

pub fn pool(threads: usize) -> ThreadPool {
    rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap()
}

/// A light server over `scene`, built single threaded.
pub fn server(scene: Arc<Scene>, options: &Options) -> LightServer {
    let mut server = LightServer::new(scene);
    server.build(options, &Plugins::default(), &pool(1), &TaskMonitor::new());
    server
}

/// Primary shading state of a ray from `origin` towards the world origin.
pub fn hit_from<'a>(
    server: &'a LightServer,
    istate: &'a mut IntersectionState,
    origin: Vec3,
) -> Option<ShadingState<'a>> {
    let mut ray = Ray::new(origin, -origin);
    server.scene().trace(&mut ray, istate);
    if !istate.hit() {
        return None;
    }
    ShadingState::primary(istate, server, ray, 0.0, 0.0, 0, 4)
}

/// Primary shading state of the eye ray down the -Z axis.
pub fn primary_hit<'a>(server: &'a LightServer, istate: &'a mut IntersectionState) -> Option<ShadingState<'a>> {
    hit_from(server, istate, EYE)
}
