//! Top-level render driver.

use std::sync::Arc;
use std::time::Instant;

use helio_core::{Display, Options, TaskMonitor};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;

use crate::bucket_renderer::BucketRenderer;
use crate::light_server::LightServer;
use crate::plugins::Plugins;
use crate::scene::{Scene, SceneError};
use crate::state::RayStats;

/// Largest accepted image edge.
const MAX_RESOLUTION: i32 = 16384;

/// Errors that abort a render before any pixel is produced.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No camera found")]
    NoCamera,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Build the worker pool described by the `threads` option.
pub fn build_pool(options: &Options) -> Result<ThreadPool, ThreadPoolBuildError> {
    let threads = options.get_int("threads", 0).max(0) as usize;
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("helio-worker-{}", i))
        .build()
}

/// Render `scene` into `display`.
///
/// Lighting is prepared first (including the caustic photon pass), then
/// the bucket renderer runs. Cancelling through `monitor` stops either
/// phase early; the display still receives `image_end`.
pub fn render(
    scene: Arc<Scene>,
    options: &Options,
    display: &dyn Display,
    monitor: &TaskMonitor,
    plugins: &Plugins,
) -> Result<RayStats, RenderError> {
    scene.log_stats();
    if scene.camera().is_none() {
        log::error!("No camera found");
        return Err(RenderError::NoCamera);
    }

    let width = options.get_int("resolutionX", 640).clamp(1, MAX_RESOLUTION) as u32;
    let height = options.get_int("resolutionY", 480).clamp(1, MAX_RESOLUTION) as u32;
    let pool = build_pool(options)?;
    let threads = pool.current_num_threads();
    let low_priority = options.get_bool("threads.lowPriority", true);
    log::info!(
        "Using {} worker thread{}{}",
        threads,
        if threads == 1 { "" } else { "s" },
        if low_priority { " (low priority requested)" } else { "" }
    );

    let start = Instant::now();
    let mut server = LightServer::new(scene.clone());
    server.build(options, plugins, &pool, monitor);
    log::info!("Light server ready in {:.2?}", start.elapsed());

    let renderer = BucketRenderer::prepare(options, plugins, width, height);
    let start = Instant::now();
    let stats = renderer.render(&server, display, &pool, threads, monitor);
    log::info!("Render time: {:.2?}", start.elapsed());

    scene.stats().log();
    Ok(stats)
}
