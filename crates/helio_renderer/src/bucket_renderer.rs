//! Adaptive bucket rendering.
//!
//! The image is cut into square buckets that render independently. Inside a
//! bucket, eye rays are traced on a grid of subpixel samples: the corners of
//! coarse cells are traced first, cells whose corners differ are split
//! recursively, and whatever remains is interpolated. Samples are finally
//! filtered into pixels and handed to the [`Display`].

use helio_core::filter::BoxFilter;
use helio_core::{create_bucket_order, qmc, Display, Filter, Options, TaskMonitor};
use helio_math::color::{self, Color};
use helio_math::Vec3;
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::instance::InstanceId;
use crate::light_server::{LightServer, ShadingSample};
use crate::plugins::Plugins;
use crate::shader::ShaderId;
use crate::shading_cache::{ShadingCache, DIRECTION_TOLERANCE, NORMAL_TOLERANCE};
use crate::state::{IntersectionState, RayStats};

/// QMC dimension offset handed to primary shading states.
const PRIMARY_DIMENSION: usize = 4;

/// Minimum normal cosine for two samples to count as the same surface.
const NORMAL_THRESHOLD: f32 = 0.9;

/// One subpixel sample.
#[derive(Debug, Clone, Copy)]
struct ImageSample {
    rx: f32,
    ry: f32,
    i: u32,
    processed: bool,
    /// Traced rather than interpolated.
    traced: bool,
    color: Color,
    alpha: f32,
    instance: Option<InstanceId>,
    shader: Option<ShaderId>,
    normal: Vec3,
}

impl ImageSample {
    fn new(rx: f32, ry: f32, i: u32) -> Self {
        Self {
            rx,
            ry,
            i,
            processed: false,
            traced: false,
            color: color::BLACK,
            alpha: 0.0,
            instance: None,
            shader: None,
            normal: Vec3::ZERO,
        }
    }

    /// Accumulate one shaded ray. The first hit decides the surface
    /// identity used for refinement.
    fn add(&mut self, sample: Option<ShadingSample>, first: bool) {
        if first {
            self.color = color::BLACK;
            self.alpha = 0.0;
        }
        if let Some(s) = sample {
            self.color += s.result;
            self.alpha += 1.0;
            if self.instance.is_none() {
                self.instance = Some(s.instance);
                self.shader = s.shader;
                self.normal = s.normal;
            }
        }
        self.processed = true;
        self.traced = true;
    }

    fn scale(&mut self, s: f32) {
        self.color *= s;
        self.alpha *= s;
    }

    fn is_different(&self, other: &ImageSample, thresh: f32) -> bool {
        if self.instance != other.instance || self.shader != other.shader {
            return true;
        }
        if color::has_contrast(self.color, other.color, thresh) {
            return true;
        }
        let alpha_sum = self.alpha + other.alpha;
        if alpha_sum > 0.0 && (self.alpha - other.alpha).abs() / alpha_sum > thresh {
            return true;
        }
        self.normal.dot(other.normal) < NORMAL_THRESHOLD
    }

    /// Bilinear blend of the four cell corners at `(dx, dy)`.
    fn bilerp(&mut self, s00: &ImageSample, s01: &ImageSample, s10: &ImageSample, s11: &ImageSample, dx: f32, dy: f32) {
        let k00 = (1.0 - dx) * (1.0 - dy);
        let k01 = (1.0 - dx) * dy;
        let k10 = dx * (1.0 - dy);
        let k11 = dx * dy;
        self.color = s00.color * k00 + s01.color * k01 + s10.color * k10 + s11.color * k11;
        self.alpha = s00.alpha * k00 + s01.alpha * k01 + s10.alpha * k10 + s11.alpha * k11;
        self.processed = true;
    }
}

/// Pixel extents of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BucketRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// Renders an image bucket by bucket with adaptive anti-aliasing.
pub struct BucketRenderer {
    image_width: u32,
    image_height: u32,
    bucket_size: u32,
    bucket_coords: Vec<(u32, u32)>,
    min_aa_depth: i32,
    max_aa_depth: i32,
    super_sampling: u32,
    display_aa: bool,
    use_jitter: bool,
    use_cache: bool,
    cache_tolerances: (f32, f32),
    sub_pixel_size: i32,
    min_step_size: usize,
    max_step_size: usize,
    thresh: f32,
    filter: Box<dyn Filter>,
    filter_name: String,
    fhs: f32,
    fs: i32,
    sigma_order: u32,
    sigma_length: u32,
}

impl BucketRenderer {
    /// Read the sampling options and lay out the bucket grid.
    pub fn prepare(options: &Options, plugins: &Plugins, image_width: u32, image_height: u32) -> Self {
        let bucket_size = options.get_int("bucket.size", 48).clamp(16, 512) as u32;
        let num_buckets_x = image_width.div_ceil(bucket_size);
        let num_buckets_y = image_height.div_ceil(bucket_size);
        let order_name = options.get_string("bucket.order", "hilbert");
        let bucket_coords =
            create_bucket_order(&plugins.bucket_orders, &order_name).bucket_sequence(num_buckets_x, num_buckets_y);

        let min_aa_depth = options.get_int("aa.min", 0).clamp(-4, 5);
        let max_aa_depth = options.get_int("aa.max", 1).clamp(min_aa_depth, 5);
        let super_sampling = options.get_int("aa.samples", 1).clamp(1, 256) as u32;
        let display_aa = options.get_bool("aa.display", false);
        let jitter = options.get_bool("aa.jitter", false);
        let use_cache = options.get_bool("aa.cache", false);
        let cache_tolerances = (
            options.get_float("aa.cache.direction", DIRECTION_TOLERANCE).clamp(-1.0, 1.0),
            options.get_float("aa.cache.normal", NORMAL_TOLERANCE).clamp(-1.0, 1.0),
        );
        let contrast = options.get_float("aa.contrast", 0.1).clamp(0.0, 1.0);

        // Stepping through the subpixel grid
        let sub_pixel_size = if max_aa_depth > 0 { 1 << max_aa_depth } else { 1 };
        let min_step_size = if max_aa_depth >= 0 { 1 } else { 1 << -max_aa_depth };
        let max_step_size = if min_aa_depth == max_aa_depth {
            min_step_size
        } else if min_aa_depth > 0 {
            1 << min_aa_depth
        } else {
            sub_pixel_size << -min_aa_depth
        };
        let use_jitter = jitter && max_aa_depth > 0;
        let thresh = contrast * 2f32.powi(min_aa_depth);

        let filter_name = options.get_string("filter", "box");
        let filter = plugins.filters.create(&filter_name).unwrap_or_else(|| {
            log::warn!("Unrecognized filter type: \"{}\" - defaulting to box", filter_name);
            Box::new(BoxFilter)
        });
        let fhs = filter.size() * 0.5;
        let fs = (sub_pixel_size as f32 * (fhs - 0.5)).ceil().max(0.0) as i32;

        let sigma_order = qmc::MAX_SIGMA_ORDER.min(max_aa_depth.max(0) as u32 + 13);

        let renderer = Self {
            image_width,
            image_height,
            bucket_size,
            bucket_coords,
            min_aa_depth,
            max_aa_depth,
            super_sampling,
            display_aa,
            use_jitter,
            use_cache,
            cache_tolerances,
            sub_pixel_size,
            min_step_size: min_step_size as usize,
            max_step_size: max_step_size as usize,
            thresh,
            filter,
            filter_name,
            fhs,
            fs,
            sigma_order,
            sigma_length: 1 << sigma_order,
        };
        renderer.log_settings(num_buckets_x, num_buckets_y);
        renderer
    }

    fn log_settings(&self, nx: u32, ny: u32) {
        let pixel_aa = |depth: i32| {
            if depth < 0 {
                format!("1/{}", 1 << (-2 * depth))
            } else {
                (1 << (2 * depth)).to_string()
            }
        };
        log::info!("Bucket renderer settings:");
        log::info!("  * Resolution:         {}x{}", self.image_width, self.image_height);
        log::info!("  * Bucket size:        {}", self.bucket_size);
        log::info!("  * Number of buckets:  {}x{}", nx, ny);
        log::info!(
            "  * Anti-aliasing:      [{} - {}] samples per pixel",
            pixel_aa(self.min_aa_depth),
            pixel_aa(self.max_aa_depth)
        );
        log::info!("  * Rays per sample:    {}", self.super_sampling);
        log::info!("  * Subpixel jitter:    {}", if self.use_jitter { "on" } else { "off" });
        log::info!("  * Contrast threshold: {:.2}", self.thresh);
        log::info!("  * Filter type:        {}", self.filter_name);
        log::info!("  * Filter size:        {:.2} pixels", self.filter.size());
        log::info!("  * Shading cache:      {}", if self.use_cache { "on" } else { "off" });
    }

    pub fn num_buckets(&self) -> usize {
        self.bucket_coords.len()
    }

    /// Render every bucket on `threads` workers of `pool`.
    ///
    /// The display always receives `image_end`, also when the render is
    /// canceled through `monitor`. Returns the ray statistics of all workers.
    pub fn render(
        &self,
        server: &LightServer,
        display: &dyn Display,
        pool: &ThreadPool,
        threads: usize,
        monitor: &TaskMonitor,
    ) -> RayStats {
        display.image_begin(self.image_width, self.image_height, self.bucket_size);
        monitor.start("Rendering", self.bucket_coords.len());

        let worker_stats: Vec<RayStats> = pool.install(|| {
            (0..threads.max(1))
                .into_par_iter()
                .map(|worker| {
                    let mut istate = IntersectionState::new();
                    let (direction, normal) = self.cache_tolerances;
                    let mut cache = self
                        .use_cache
                        .then(|| ShadingCache::with_tolerances(direction, normal));
                    while let Some(index) = monitor.next_item() {
                        let (bx, by) = self.bucket_coords[index];
                        self.render_bucket(server, display, bx, by, worker, &mut istate, cache.as_mut());
                    }
                    if let Some(cache) = &cache {
                        log::debug!(
                            "Worker {} shading cache: {} hits, {} misses",
                            worker,
                            cache.hits(),
                            cache.misses()
                        );
                    }
                    istate.stats
                })
                .collect()
        });

        let mut stats = RayStats::default();
        for s in &worker_stats {
            stats.merge(s);
        }
        server.scene().accumulate_stats(&stats);
        monitor.stop();
        display.image_end();
        stats
    }

    fn bucket_rect(&self, bx: u32, by: u32) -> BucketRect {
        let x = bx * self.bucket_size;
        let y = by * self.bucket_size;
        BucketRect {
            x,
            y,
            width: self.bucket_size.min(self.image_width - x),
            height: self.bucket_size.min(self.image_height - y),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_bucket(
        &self,
        server: &LightServer,
        display: &dyn Display,
        bx: u32,
        by: u32,
        worker: usize,
        istate: &mut IntersectionState,
        mut cache: Option<&mut ShadingCache>,
    ) {
        let rect = self.bucket_rect(bx, by);
        display.image_prepare(rect.x, rect.y, rect.width, rect.height, worker);

        let mut grid = self.sample_grid(rect);
        let (sbw, sbh) = (grid.width, grid.samples.len() / grid.width);
        let step = self.max_step_size;
        let sps = self.sub_pixel_size;
        let inv_sps = 1.0 / sps as f32;
        for x in (0..sbw - 1).step_by(step) {
            for y in (0..sbh - 1).step_by(step) {
                self.refine_samples(server, &mut grid, x, y, step, self.thresh, istate, cache.as_deref_mut());
            }
        }

        let count = (rect.width * rect.height) as usize;
        let mut colors = Vec::with_capacity(count);
        let mut alphas = Vec::with_capacity(count);
        if self.display_aa {
            let inv_area = inv_sps * inv_sps;
            for y in 0..rect.height as usize {
                for x in 0..rect.width as usize {
                    let mut traced = 0;
                    for j in 0..sps as usize {
                        for i in 0..sps as usize {
                            let sx = x * sps as usize + self.fs as usize + i;
                            let sy = y * sps as usize + self.fs as usize + j;
                            if grid.get(sx, sy).traced {
                                traced += 1;
                            }
                        }
                    }
                    colors.push(Color::splat(traced as f32 * inv_area));
                    alphas.push(1.0);
                }
            }
        } else {
            self.filter_bucket(&grid, rect, &mut colors, &mut alphas);
        }

        istate.stats.pixels += count as u64;
        display.image_update(rect.x, rect.y, rect.width, rect.height, &colors, &alphas);
    }

    /// Lay out the unprocessed subpixel samples of `rect`, padded for the
    /// filter and aligned to the coarsest step.
    fn sample_grid(&self, rect: BucketRect) -> SampleGrid {
        let sps = self.sub_pixel_size;
        let sx0 = rect.x as i32 * sps - self.fs;
        let sy0 = rect.y as i32 * sps - self.fs;
        let step = self.max_step_size;
        let mut sbw = (rect.width as i32 * sps + self.fs * 2) as usize;
        let mut sbh = (rect.height as i32 * sps + self.fs * 2) as usize;
        sbw = sbw.div_ceil(step) * step;
        sbh = sbh.div_ceil(step) * step;
        if step > 1 {
            sbw += 1;
            sbh += 1;
        }
        // A cell needs two samples per side
        sbw = sbw.max(2);
        sbh = sbh.max(2);

        let inv_sps = 1.0 / sps as f32;
        let mask = self.sigma_length as i32 - 1;
        let mut samples = Vec::with_capacity(sbw * sbh);
        for y in 0..sbh {
            for x in 0..sbw {
                let sx = sx0 + x as i32;
                let sy = sy0 + y as i32;
                let j = (sx & mask) as u32;
                let k = (sy & mask) as u32;
                let i = (j << self.sigma_order).wrapping_add(qmc::sigma(k, self.sigma_order));
                let (dx, dy) = if self.use_jitter {
                    (qmc::halton(0, k) as f32, qmc::halton(0, j) as f32)
                } else {
                    (0.5, 0.5)
                };
                let rx = (sx as f32 + dx) * inv_sps;
                let ry = self.image_height as f32 - (sy as f32 + dy) * inv_sps;
                samples.push(ImageSample::new(rx, ry, i));
            }
        }
        SampleGrid { samples, width: sbw }
    }

    /// Reconstruct pixels as the filter weighted average of nearby samples.
    fn filter_bucket(&self, grid: &SampleGrid, rect: BucketRect, colors: &mut Vec<Color>, alphas: &mut Vec<f32>) {
        let sps = self.sub_pixel_size as usize;
        // Whole pixel plus the filter padding on both sides
        let window = sps + 2 * self.fs as usize;
        for y in 0..rect.height as usize {
            let cy = self.image_height as f32 - (rect.y as f32 + y as f32 + 0.5);
            for x in 0..rect.width as usize {
                let cx = rect.x as f32 + x as f32 + 0.5;
                let mut c = color::BLACK;
                let mut a = 0.0;
                let mut weight = 0.0;
                for sy in y * sps..y * sps + window {
                    for sx in x * sps..x * sps + window {
                        let s = grid.get(sx, sy);
                        let dx = s.rx - cx;
                        if dx.abs() > self.fhs {
                            continue;
                        }
                        let dy = s.ry - cy;
                        if dy.abs() > self.fhs {
                            continue;
                        }
                        let f = self.filter.weight(dx, dy);
                        c += f * s.color;
                        a += f * s.alpha;
                        weight += f;
                    }
                }
                if weight != 0.0 {
                    c /= weight;
                    a /= weight;
                }
                colors.push(c);
                alphas.push(a);
            }
        }
    }

    /// Trace every ray of one subpixel sample.
    fn compute_sub_pixel(
        &self,
        server: &LightServer,
        sample: &mut ImageSample,
        istate: &mut IntersectionState,
        mut cache: Option<&mut ShadingCache>,
    ) {
        if let Some(cache) = cache.as_deref_mut() {
            cache.reset();
        }
        let q0 = qmc::halton(1, sample.i);
        let q1 = qmc::halton(2, sample.i);
        let q2 = qmc::halton(3, sample.i);
        let n = self.super_sampling;
        for k in 0..n {
            let (time, lens_u, lens_v) = if k == 0 {
                (q0, q1, q2)
            } else {
                (
                    qmc::mod1(q0 + k as f64 / n as f64),
                    qmc::mod1(q1 + qmc::halton(0, k)),
                    qmc::mod1(q2 + qmc::halton(1, k)),
                )
            };
            let shaded = self.eye_sample(server, sample, time, lens_u, lens_v, sample.i.wrapping_add(k), istate, cache.as_deref_mut());
            sample.add(shaded, k == 0);
        }
        if n > 1 {
            sample.scale(1.0 / n as f32);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eye_sample(
        &self,
        server: &LightServer,
        sample: &ImageSample,
        time: f64,
        lens_u: f64,
        lens_v: f64,
        i: u32,
        istate: &mut IntersectionState,
        cache: Option<&mut ShadingCache>,
    ) -> Option<ShadingSample> {
        let camera = server.scene().camera()?;
        let time = camera.time(time as f32);
        let ray = camera.ray(sample.rx, sample.ry, self.image_width, self.image_height, lens_u, lens_v, time)?;
        server.get_radiance(sample.rx, sample.ry, time, i, PRIMARY_DIMENSION, ray, istate, cache)
    }

    /// Trace the corners of the cell at `(x, y)`, split it while its corners
    /// disagree, then interpolate what is left.
    #[allow(clippy::too_many_arguments)]
    fn refine_samples(
        &self,
        server: &LightServer,
        grid: &mut SampleGrid,
        x: usize,
        y: usize,
        step: usize,
        thresh: f32,
        istate: &mut IntersectionState,
        mut cache: Option<&mut ShadingCache>,
    ) {
        let corners = [(x, y), (x, y + step), (x + step, y), (x + step, y + step)];
        for (cx, cy) in corners {
            let sample = grid.get_mut(cx, cy);
            if !sample.processed {
                self.compute_sub_pixel(server, sample, istate, cache.as_deref_mut());
            }
        }
        let s00 = *grid.get(x, y);
        let s01 = *grid.get(x, y + step);
        let s10 = *grid.get(x + step, y);
        let s11 = *grid.get(x + step, y + step);

        if step > self.min_step_size
            && (s00.is_different(&s01, thresh)
                || s00.is_different(&s10, thresh)
                || s00.is_different(&s11, thresh)
                || s01.is_different(&s11, thresh)
                || s10.is_different(&s11, thresh)
                || s01.is_different(&s10, thresh))
        {
            let half = step >> 1;
            let thresh = thresh * 2.0;
            self.refine_samples(server, grid, x, y, half, thresh, istate, cache.as_deref_mut());
            self.refine_samples(server, grid, x + half, y, half, thresh, istate, cache.as_deref_mut());
            self.refine_samples(server, grid, x, y + half, half, thresh, istate, cache.as_deref_mut());
            self.refine_samples(server, grid, x + half, y + half, half, thresh, istate, cache.as_deref_mut());
            return;
        }

        let ds = 1.0 / step as f32;
        for i in 0..=step {
            for j in 0..=step {
                let sample = grid.get_mut(x + i, y + j);
                if !sample.processed {
                    sample.bilerp(&s00, &s01, &s10, &s11, i as f32 * ds, j as f32 * ds);
                }
            }
        }
    }
}

/// Row major subpixel samples of one bucket.
struct SampleGrid {
    samples: Vec<ImageSample>,
    width: usize,
}

impl SampleGrid {
    fn get(&self, x: usize, y: usize) -> &ImageSample {
        &self.samples[x + y * self.width]
    }

    fn get_mut(&mut self, x: usize, y: usize) -> &mut ImageSample {
        &mut self.samples[x + y * self.width]
    }
}

impl std::fmt::Debug for BucketRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketRenderer")
            .field("image_width", &self.image_width)
            .field("image_height", &self.image_height)
            .field("bucket_size", &self.bucket_size)
            .field("aa", &(self.min_aa_depth, self.max_aa_depth))
            .field("super_sampling", &self.super_sampling)
            .field("filter", &self.filter_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use helio_core::ImageDisplay;

    fn render_with(options: &Options, threads: usize) -> (helio_core::ImageBuffer, RayStats) {
        let scene = testing::sphere_scene();
        let server = testing::server(scene, options);
        let renderer = BucketRenderer::prepare(options, &Plugins::default(), 40, 30);
        let display = ImageDisplay::new();
        let pool = testing::pool(threads);
        let stats = renderer.render(&server, &display, &pool, threads, &TaskMonitor::new());
        (display.image().unwrap(), stats)
    }

    #[test]
    fn test_stepping_rules() {
        let plugins = Plugins::default();
        let mut options = Options::new();
        options.set("aa.min", -2);
        options.set("aa.max", 2);
        let r = BucketRenderer::prepare(&options, &plugins, 64, 64);
        assert_eq!(r.sub_pixel_size, 4);
        assert_eq!(r.min_step_size, 1);
        assert_eq!(r.max_step_size, 16);
        assert!((r.thresh - 0.025).abs() < 1e-6);
        assert_eq!(r.sigma_order, 15);

        options.set("aa.min", -1);
        options.set("aa.max", -1);
        let r = BucketRenderer::prepare(&options, &plugins, 64, 64);
        assert_eq!(r.sub_pixel_size, 1);
        assert_eq!(r.min_step_size, 2);
        assert_eq!(r.max_step_size, 2);

        options.set("aa.min", 1);
        options.set("aa.max", 3);
        let r = BucketRenderer::prepare(&options, &plugins, 64, 64);
        assert_eq!(r.max_step_size, 2);
    }

    #[test]
    fn test_cache_tolerances_from_options() {
        let plugins = Plugins::default();
        let r = BucketRenderer::prepare(&Options::new(), &plugins, 8, 8);
        assert_eq!(r.cache_tolerances, (DIRECTION_TOLERANCE, NORMAL_TOLERANCE));

        let mut options = Options::new();
        options.set("aa.cache.direction", 0.95f32);
        options.set("aa.cache.normal", 2.0f32);
        let r = BucketRenderer::prepare(&options, &plugins, 8, 8);
        assert_eq!(r.cache_tolerances, (0.95, 1.0));
    }

    #[test]
    fn test_unknown_filter_falls_back_to_box() {
        let mut options = Options::new();
        options.set("filter", "fancy");
        let r = BucketRenderer::prepare(&options, &Plugins::default(), 8, 8);
        assert_eq!(r.filter.size(), 1.0);
        assert_eq!(r.fs, 0);
    }

    #[test]
    fn test_bucket_grid_covers_image() {
        let mut options = Options::new();
        options.set("bucket.size", 16);
        let r = BucketRenderer::prepare(&options, &Plugins::default(), 40, 20);
        assert_eq!(r.num_buckets(), 3 * 2);
        let pixels: u32 = r
            .bucket_coords
            .iter()
            .map(|&(bx, by)| {
                let rect = r.bucket_rect(bx, by);
                rect.width * rect.height
            })
            .sum();
        assert_eq!(pixels, 40 * 20);
    }

    /// Filter the first bucket of `r` with every sample shaded by `shade(rx, ry)`.
    fn filter_shaded(r: &BucketRenderer, shade: impl Fn(f32, f32) -> Color) -> (BucketRect, Vec<Color>) {
        let rect = r.bucket_rect(0, 0);
        let mut grid = r.sample_grid(rect);
        for s in &mut grid.samples {
            s.color = shade(s.rx, s.ry);
            s.alpha = 1.0;
            s.processed = true;
        }
        let mut colors = Vec::new();
        let mut alphas = Vec::new();
        r.filter_bucket(&grid, rect, &mut colors, &mut alphas);
        assert!(alphas.iter().all(|&a| (a - 1.0).abs() < 1e-5));
        (rect, colors)
    }

    #[test]
    fn test_box_filter_averages_all_subpixels() {
        let mut options = Options::new();
        options.set("aa.min", 2);
        options.set("aa.max", 2);
        let r = BucketRenderer::prepare(&options, &Plugins::default(), 4, 4);
        assert_eq!((r.sub_pixel_size, r.fs), (4, 0));

        // Right half of every pixel is white
        let (_, colors) = filter_shaded(&r, |rx, _| if rx.fract() > 0.5 { Color::ONE } else { color::BLACK });
        for c in colors {
            assert!((c - Color::splat(0.5)).abs().max_element() < 1e-5, "{:?}", c);
        }
    }

    #[test]
    fn test_wide_filter_is_centered_on_pixel() {
        let mut options = Options::new();
        options.set("aa.min", 2);
        options.set("aa.max", 2);
        options.set("filter", "gaussian");
        let r = BucketRenderer::prepare(&options, &Plugins::default(), 8, 8);
        assert!(r.fs > 0);

        // A horizontal ramp reconstructs to the pixel center
        let (rect, colors) = filter_shaded(&r, |rx, _| Color::splat(rx));
        for (n, c) in colors.iter().enumerate() {
            let cx = (n as u32 % rect.width) as f32 + 0.5;
            assert!((c.x - cx).abs() < 1e-3, "pixel {} gave {} not {}", n, c.x, cx);
        }
    }

    #[test]
    fn test_uniform_region_uses_corner_samples_only() {
        let mut options = Options::new();
        options.set("aa.min", 0);
        options.set("aa.max", 2);
        options.set("bucket.size", 16);
        let server = testing::server(testing::flat_wall(Color::new(0.2, 0.4, 0.6)), &options);
        let renderer = BucketRenderer::prepare(&options, &Plugins::default(), 16, 16);
        let display = ImageDisplay::new();
        let stats = renderer.render(&server, &display, &testing::pool(1), 1, &TaskMonitor::new());

        // 65 x 65 subpixels, a corner every 4
        assert_eq!(stats.eye_rays, 17 * 17);
        let image = display.image().unwrap();
        for y in 0..16 {
            for x in 0..16 {
                let c = image.get(x, y);
                assert!((c - Color::new(0.2, 0.4, 0.6)).abs().max_element() < 1e-5);
                assert!((image.get_alpha(x, y) - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_edges_are_refined() {
        let mut options = Options::new();
        options.set("aa.min", 0);
        options.set("aa.max", 2);
        let (_, stats) = render_with(&options, 1);
        // One corner per pixel at the coarsest step, plus extra samples
        // wherever the sphere silhouette splits a cell
        let corners_only = (40 + 1) * (30 + 1);
        assert!(stats.eye_rays > corners_only as u64);
    }

    #[test]
    fn test_thread_count_does_not_change_pixels() {
        let mut options = Options::new();
        options.set("aa.min", -1);
        options.set("aa.max", 1);
        options.set("aa.samples", 2);
        options.set("bucket.size", 16);
        options.set("filter", "gaussian");
        let (one, one_stats) = render_with(&options, 1);
        let (four, four_stats) = render_with(&options, 4);
        assert_eq!(one, four);
        assert_eq!(one_stats, four_stats);
    }

    #[test]
    fn test_display_aa_shows_sample_density() {
        let mut options = Options::new();
        options.set("aa.min", 0);
        options.set("aa.max", 0);
        options.set("aa.display", true);
        let (image, _) = render_with(&options, 2);
        // One traced sample per pixel at 1x1
        for y in 0..30 {
            for x in 0..40 {
                assert_eq!(image.get(x, y), Color::ONE);
            }
        }
    }

    #[test]
    fn test_canceled_render_still_ends_image() {
        let options = Options::new();
        let server = testing::server(testing::sphere_scene(), &options);
        let renderer = BucketRenderer::prepare(&options, &Plugins::default(), 40, 30);
        let display = ImageDisplay::new();
        let monitor = TaskMonitor::new();
        monitor.cancel();
        let stats = renderer.render(&server, &display, &testing::pool(2), 2, &monitor);
        assert_eq!(stats.eye_rays, 0);
        assert!(display.image().is_some());
    }
}
