//! Everything known about one shading point.
//!
//! A [`ShadingState`] is created for each ray that hits a surface. It
//! borrows the worker's [`IntersectionState`], carries the surface
//! description filled in by the primitive, and tracks the path lineage:
//! bounce depths per category and the QMC instance/dimension pair `(i, d)`
//! from which all of its random numbers are drawn. Child states for
//! secondary rays reborrow the same intersection state, so a path is shaded
//! depth first with plain recursion.

use std::f64::consts::PI;

use helio_core::qmc;
use helio_math::color::{self, Color};
use helio_math::{Mat4, OrthoNormalBasis, Ray, Vec2, Vec3};

use crate::instance::{Instance, InstanceId};
use crate::light::LightSample;
use crate::light_server::LightServer;
use crate::modifier::ModifierId;
use crate::photon::PhotonStore;
use crate::shader::ShaderId;
use crate::state::IntersectionState;

/// QMC dimension offset of a primary or photon state.
const PRIMARY_DIMENSION: usize = 4;

/// QMC dimensions consumed by each bounce.
const BOUNCE_DIMENSIONS: usize = 2;

/// Bounce counts along a path, one per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Depths {
    pub diffuse: u32,
    pub reflection: u32,
    pub refraction: u32,
}

impl Depths {
    pub fn total(&self) -> u32 {
        self.diffuse + self.reflection + self.refraction
    }
}

/// The category a secondary ray belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bounce {
    Diffuse,
    Glossy,
    Reflection,
    Refraction,
    FinalGather,
}

/// Direction on the hemisphere around +Z with a cosine density.
pub fn cosine_hemisphere(xi: f64, xj: f64) -> Vec3 {
    let phi = 2.0 * PI * xi;
    let sin_theta = xj.sqrt();
    let cos_theta = (1.0 - xj).sqrt();
    Vec3::new(
        (phi.cos() * sin_theta) as f32,
        (phi.sin() * sin_theta) as f32,
        cos_theta as f32,
    )
}

/// Spacing between `x` and the next representable float.
fn ulp(x: f32) -> f32 {
    let x = x.abs();
    if !x.is_finite() {
        return 0.0;
    }
    f32::from_bits(x.to_bits() + 1) - x
}

pub struct ShadingState<'a> {
    istate: &'a mut IntersectionState,
    server: &'a LightServer,
    photons: Option<&'a dyn PhotonStore>,
    instance: &'a Instance,
    instance_id: InstanceId,
    primitive_id: usize,
    hit_u: f32,
    hit_v: f32,
    hit_w: f32,
    time: f32,
    ray: Ray,
    rx: f32,
    ry: f32,
    i: u32,
    d: usize,
    qmc_d0_i: f64,
    qmc_d1_i: f64,
    depths: Depths,
    include_lights: bool,
    include_specular: bool,
    o2w: Mat4,
    w2o: Mat4,
    initialized: bool,
    point: Vec3,
    normal: Vec3,
    geo_normal: Vec3,
    uv: Vec2,
    basis: OrthoNormalBasis,
    cos_nd: f32,
    behind: bool,
    faced: bool,
    bias: f32,
    shader: Option<ShaderId>,
    modifier: Option<ModifierId>,
    result: Color,
    light_samples: Vec<LightSample>,
}

impl<'a> ShadingState<'a> {
    /// `istate` must hold a hit for `ray`.
    #[allow(clippy::too_many_arguments)]
    fn with_lineage(
        istate: &'a mut IntersectionState,
        server: &'a LightServer,
        photons: Option<&'a dyn PhotonStore>,
        ray: Ray,
        i: u32,
        d: usize,
        depths: Depths,
        raster: (f32, f32),
    ) -> Option<Self> {
        let instance_id = istate.instance()?;
        let instance = server.scene().instance(instance_id);
        let time = istate.time();
        Some(Self {
            primitive_id: istate.primitive_id(),
            hit_u: istate.u(),
            hit_v: istate.v(),
            hit_w: istate.w(),
            istate,
            server,
            photons,
            instance,
            instance_id,
            time,
            ray,
            rx: raster.0,
            ry: raster.1,
            i,
            d,
            qmc_d0_i: qmc::halton(d % qmc::NUM_DIMENSIONS, i),
            qmc_d1_i: qmc::halton((d + 1) % qmc::NUM_DIMENSIONS, i),
            depths,
            include_lights: true,
            include_specular: true,
            o2w: instance.object_to_world(time),
            w2o: instance.world_to_object(time),
            initialized: false,
            point: Vec3::ZERO,
            normal: Vec3::ZERO,
            geo_normal: Vec3::ZERO,
            uv: Vec2::ZERO,
            basis: OrthoNormalBasis::from_w(Vec3::Z),
            cos_nd: 0.0,
            behind: false,
            faced: false,
            bias: server.bias(),
            shader: None,
            modifier: None,
            result: color::BLACK,
            light_samples: Vec::new(),
        })
    }

    /// State for an eye ray through raster position `(rx, ry)`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn primary(
        istate: &'a mut IntersectionState,
        server: &'a LightServer,
        ray: Ray,
        rx: f32,
        ry: f32,
        i: u32,
        d: usize,
    ) -> Option<Self> {
        Self::with_lineage(istate, server, None, ray, i, d, Depths::default(), (rx, ry))
    }

    /// State for a photon leaving a light.
    pub(crate) fn photon(
        istate: &'a mut IntersectionState,
        server: &'a LightServer,
        photons: &'a dyn PhotonStore,
        ray: Ray,
        i: u32,
    ) -> Option<Self> {
        Self::with_lineage(
            istate,
            server,
            Some(photons),
            ray,
            i,
            PRIMARY_DIMENSION,
            Depths::default(),
            (0.0, 0.0),
        )
    }

    /// Child state for a secondary ray that was just traced from here.
    ///
    /// The child continues this state's QMC lineage and adds one bounce of
    /// the given category.
    pub(crate) fn bounce(&mut self, ray: Ray, i: u32, kind: Bounce) -> Option<ShadingState<'_>> {
        let mut depths = self.depths;
        match kind {
            Bounce::Diffuse | Bounce::FinalGather => depths.diffuse += 1,
            Bounce::Glossy | Bounce::Reflection => depths.reflection += 1,
            Bounce::Refraction => depths.refraction += 1,
        }
        debug_assert!(
            depths.total() <= self.server.max_depths().total(),
            "path depth {:?} exceeds the configured limits",
            depths
        );

        let server = self.server;
        let photons = self.photons;
        let raster = (self.rx, self.ry);
        let mut child = ShadingState::with_lineage(
            &mut *self.istate,
            server,
            photons,
            ray,
            i.wrapping_add(self.i),
            BOUNCE_DIMENSIONS + self.d,
            depths,
            raster,
        )?;
        if matches!(kind, Bounce::Glossy | Bounce::FinalGather) {
            child.include_lights = false;
            child.include_specular = false;
        }
        Some(child)
    }

    // ------------------------------------------------------------------
    // Lineage
    // ------------------------------------------------------------------

    pub(crate) fn istate_mut(&mut self) -> &mut IntersectionState {
        self.istate
    }

    pub fn server(&self) -> &'a LightServer {
        self.server
    }

    pub fn instance(&self) -> &'a Instance {
        self.instance
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn primitive_id(&self) -> usize {
        self.primitive_id
    }

    pub fn hit_u(&self) -> f32 {
        self.hit_u
    }

    pub fn hit_v(&self) -> f32 {
        self.hit_v
    }

    pub fn hit_w(&self) -> f32 {
        self.hit_w
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// The ray that produced this state, ending at the hit.
    pub fn ray(&self) -> &Ray {
        &self.ray
    }

    pub fn raster_x(&self) -> f32 {
        self.rx
    }

    pub fn raster_y(&self) -> f32 {
        self.ry
    }

    pub fn depths(&self) -> Depths {
        self.depths
    }

    /// Total number of bounces above this state.
    pub fn depth(&self) -> u32 {
        self.depths.total()
    }

    pub fn diffuse_depth(&self) -> u32 {
        self.depths.diffuse
    }

    pub fn reflection_depth(&self) -> u32 {
        self.depths.reflection
    }

    pub fn refraction_depth(&self) -> u32 {
        self.depths.refraction
    }

    pub fn include_lights(&self) -> bool {
        self.include_lights
    }

    pub fn include_specular(&self) -> bool {
        self.include_specular
    }

    pub fn object_to_world(&self) -> Mat4 {
        self.o2w
    }

    pub fn world_to_object(&self) -> Mat4 {
        self.w2o
    }

    pub(crate) fn photon_store(&self) -> Option<&'a dyn PhotonStore> {
        self.photons
    }

    // ------------------------------------------------------------------
    // Surface
    // ------------------------------------------------------------------

    /// Mark the surface description as filled in. Primitives call this
    /// before setting the point and normals.
    pub fn init(&mut self) {
        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn point(&self) -> Vec3 {
        self.point
    }

    pub fn set_point(&mut self, point: Vec3) {
        self.point = point;
    }

    pub fn normal(&self) -> Vec3 {
        self.normal
    }

    pub fn set_normal(&mut self, normal: Vec3) {
        self.normal = normal;
    }

    pub fn geo_normal(&self) -> Vec3 {
        self.geo_normal
    }

    pub fn set_geo_normal(&mut self, normal: Vec3) {
        self.geo_normal = normal;
    }

    pub fn uv(&self) -> Vec2 {
        self.uv
    }

    pub fn set_uv(&mut self, uv: Vec2) {
        self.uv = uv;
    }

    pub fn basis(&self) -> OrthoNormalBasis {
        self.basis
    }

    pub fn set_basis(&mut self, basis: OrthoNormalBasis) {
        self.basis = basis;
    }

    pub fn shader(&self) -> Option<ShaderId> {
        self.shader
    }

    pub fn set_shader(&mut self, shader: Option<ShaderId>) {
        self.shader = shader;
    }

    pub fn modifier(&self) -> Option<ModifierId> {
        self.modifier
    }

    pub fn set_modifier(&mut self, modifier: Option<ModifierId>) {
        self.modifier = modifier;
    }

    /// Cosine between the normal and the reversed ray, set by [`faceforward`](Self::faceforward).
    pub fn cos_nd(&self) -> f32 {
        self.cos_nd
    }

    /// True if the ray arrived from the back of the surface.
    pub fn is_behind(&self) -> bool {
        self.behind
    }

    pub fn result(&self) -> Color {
        self.result
    }

    pub(crate) fn set_result(&mut self, result: Color) {
        self.result = result;
    }

    /// Flip the normals towards the incoming ray and push the point off the
    /// surface to avoid self intersection. Later calls are no-ops.
    pub fn faceforward(&mut self) {
        if self.faced {
            return;
        }
        self.faced = true;
        if self.ray.dot(self.geo_normal) >= 0.0 {
            self.geo_normal = -self.geo_normal;
            self.normal = -self.normal;
            self.basis.flip_w();
            self.behind = true;
        }
        self.cos_nd = (-self.ray.dot(self.normal)).max(0.0);

        // Grow the offset with the magnitude of the dominant coordinate
        let ng = self.geo_normal.abs();
        let p = if ng.x > ng.y && ng.x > ng.z {
            self.point.x
        } else if ng.y > ng.z {
            self.point.y
        } else {
            self.point.z
        };
        self.bias = self.bias.max(25.0 * ulp(p));
        self.point += self.bias * self.geo_normal;
    }

    /// Turn the shading normal to the geometric normal's side.
    pub fn correct_shading_normal(&mut self) {
        if self.normal.dot(self.geo_normal) < 0.0 {
            self.normal = -self.normal;
            self.basis.flip_w();
        }
    }

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------

    /// Sample `j` of dimension `dim` for this state.
    pub fn random(&self, j: u32, dim: usize) -> f64 {
        match dim {
            0 => qmc::mod1(self.qmc_d0_i + qmc::halton(0, j)),
            1 => qmc::mod1(self.qmc_d1_i + qmc::halton(1, j)),
            _ => qmc::mod1(self.halton_i(dim) + qmc::halton(dim % qmc::NUM_DIMENSIONS, j)),
        }
    }

    /// Sample `j` of `n` in dimension `dim`, stratified in dimension 0.
    pub fn random_n(&self, j: u32, dim: usize, n: u32) -> f64 {
        match dim {
            0 => qmc::mod1(self.qmc_d0_i + j as f64 / n as f64),
            1 => qmc::mod1(self.qmc_d1_i + qmc::halton(0, j)),
            _ => qmc::mod1(self.halton_i(dim) + qmc::halton((dim - 1) % qmc::NUM_DIMENSIONS, j)),
        }
    }

    fn halton_i(&self, dim: usize) -> f64 {
        qmc::halton((self.d + dim) % qmc::NUM_DIMENSIONS, self.i)
    }

    // ------------------------------------------------------------------
    // Lighting
    // ------------------------------------------------------------------

    /// Gather direct light samples from every light source.
    pub fn init_light_samples(&mut self) {
        let server = self.server;
        server.init_light_samples(self);
    }

    /// Gather caustic photons as light samples.
    pub fn init_caustic_samples(&mut self) {
        let server = self.server;
        server.init_caustic_samples(self);
    }

    pub fn add_sample(&mut self, sample: LightSample) {
        self.light_samples.push(sample);
    }

    pub fn light_samples(&self) -> &[LightSample] {
        &self.light_samples
    }

    /// Lambertian reflection of the gathered samples plus indirect light.
    pub fn diffuse(&mut self, diffuse: Color) -> Color {
        if color::is_black(diffuse) {
            return color::BLACK;
        }
        let mut lr = color::BLACK;
        for sample in &self.light_samples {
            lr += sample.diffuse * sample.dot(self.normal);
        }
        lr += self.irradiance(diffuse);
        lr * diffuse * std::f32::consts::FRAC_1_PI
    }

    /// Phong lobe around the mirror direction; `num_rays` glossy rays are
    /// traced for indirect light (one below the first bounce).
    pub fn specular_phong(&mut self, specular: Color, power: f32, num_rays: u32) -> Color {
        let mut lr = color::BLACK;
        if !self.include_specular || color::is_black(specular) {
            return lr;
        }
        let reflected = self.ray.direction + 2.0 * self.cos_nd * self.normal;
        for sample in &self.light_samples {
            let cos_nl = sample.dot(self.normal);
            let cos_lr = sample.dot(reflected);
            if cos_lr > 0.0 {
                lr += sample.specular * cos_nl * cos_lr.powf(power);
            }
        }

        if num_rays > 0 {
            let n = if self.depth() == 0 { num_rays } else { 1 };
            let onb = OrthoNormalBasis::from_w(reflected);
            let mul = (2.0 * std::f32::consts::PI / (power + 1.0)) / n as f32;
            for i in 0..n {
                let r1 = self.random_n(i, 0, n);
                let r2 = self.random_n(i, 1, n);
                let u = 2.0 * PI * r1;
                let s = r2.powf(1.0 / (power as f64 + 1.0));
                let s1 = (1.0 - s * s).sqrt();
                let w = onb.transform(Vec3::new(
                    (u.cos() * s1) as f32,
                    (u.sin() * s1) as f32,
                    s as f32,
                ));
                let wn = w.dot(self.normal);
                if wn > 0.0 {
                    lr += wn * mul * self.trace_glossy(Ray::new(self.point, w), i);
                }
            }
        }
        lr * specular * ((power + 2.0) / (2.0 * std::f32::consts::PI))
    }

    /// Fraction of cosine weighted rays that escape within `max_dist`,
    /// as a blend between `bright` (open) and `dark` (blocked).
    pub fn occlusion(&mut self, samples: u32, max_dist: f32, bright: Color, dark: Color) -> Color {
        if !self.initialized {
            return bright;
        }
        self.faceforward();
        let mut result = color::BLACK;
        for i in 0..samples {
            let w = self
                .basis
                .transform(cosine_hemisphere(self.random_n(i, 0, samples), self.random_n(i, 1, samples)));
            let mut ray = Ray::new(self.point, w);
            ray.set_max(max_dist);
            let opacity = self.trace_shadow(ray);
            result += bright + (dark - bright) * opacity;
        }
        result / samples.max(1) as f32
    }

    pub fn global_radiance(&mut self) -> Color {
        let server = self.server;
        server.global_radiance(self)
    }

    pub fn irradiance(&mut self, diffuse_reflectance: Color) -> Color {
        let server = self.server;
        server.irradiance(self, diffuse_reflectance)
    }

    // ------------------------------------------------------------------
    // Secondary rays
    // ------------------------------------------------------------------

    /// Opacity between the point and the end of `ray`.
    pub fn trace_shadow(&mut self, mut ray: Ray) -> Color {
        let server = self.server;
        server.scene().trace_shadow(&mut ray, self.istate)
    }

    pub fn trace_reflection(&mut self, ray: Ray, i: u32) -> Color {
        let server = self.server;
        server.trace_reflection(self, ray, i)
    }

    /// Trace a ray into the surface. The origin is moved back through the
    /// offset applied by [`faceforward`](Self::faceforward).
    pub fn trace_refraction(&mut self, mut ray: Ray, i: u32) -> Color {
        ray.origin -= 2.0 * self.bias * self.geo_normal;
        let server = self.server;
        server.trace_refraction(self, ray, i)
    }

    pub fn trace_glossy(&mut self, ray: Ray, i: u32) -> Color {
        let server = self.server;
        server.trace_glossy(self, ray, i)
    }

    /// Continue the incoming ray straight through the surface.
    pub fn trace_transparency(&mut self) -> Color {
        let ray = Ray::new(self.point, self.ray.direction).with_time(self.time);
        self.trace_refraction(ray, 0)
    }

    /// Trace a gather ray and return the state at its hit, unshaded.
    pub fn trace_final_gather(&mut self, ray: Ray, i: u32) -> Option<ShadingState<'_>> {
        let server = self.server;
        server.trace_final_gather(self, ray, i)
    }

    // ------------------------------------------------------------------
    // Photons
    // ------------------------------------------------------------------

    pub fn store_photon(&self, direction: Vec3, power: Color, diffuse: Color) {
        if let Some(store) = self.photons {
            store.store(self, direction, power, diffuse);
        }
    }

    pub fn trace_diffuse_photon(&mut self, ray: Ray, power: Color) {
        if self.photons.is_some_and(|store| store.allow_diffuse_bounced()) {
            let server = self.server;
            server.trace_diffuse_photon(self, ray, power);
        }
    }

    pub fn trace_reflection_photon(&mut self, ray: Ray, power: Color) {
        if self.photons.is_some_and(|store| store.allow_reflection_bounced()) {
            let server = self.server;
            server.trace_reflection_photon(self, ray, power);
        }
    }

    pub fn trace_refraction_photon(&mut self, mut ray: Ray, power: Color) {
        if self.photons.is_some_and(|store| store.allow_refraction_bounced()) {
            ray.origin -= 2.0 * self.bias * self.geo_normal;
            let server = self.server;
            server.trace_refraction_photon(self, ray, power);
        }
    }
}

impl std::fmt::Debug for ShadingState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadingState")
            .field("instance", &self.instance_id)
            .field("primitive", &self.primitive_id)
            .field("depths", &self.depths)
            .field("i", &self.i)
            .field("d", &self.d)
            .field("point", &self.point)
            .field("normal", &self.normal)
            .finish()
    }
}
