//! Helio Renderer - bucket based ray tracing core.
//!
//! A scene is assembled with a [`SceneBuilder`], frozen into an immutable
//! [`Scene`] and handed to [`render`]. Rendering runs in two phases on one
//! worker pool: the [`LightServer`] sets up global illumination and shoots
//! caustic photons, then the [`BucketRenderer`] traces the image with
//! adaptive anti-aliasing and streams finished buckets to a display.
//!
//! Everything pluggable (filters, bucket orders, acceleration structures,
//! GI engines, photon maps) is looked up by name in [`Plugins`].
//!
//! # Example
//!
//! ```ignore
//! use helio_renderer::{render, Plugins, SceneBuilder};
//!
//! let scene = Arc::new(builder.build(&Plugins::default())?);
//! let stats = render(scene, &options, &display, &TaskMonitor::new(), &Plugins::default())?;
//! ```

pub mod accel;
pub mod bucket_renderer;
pub mod camera;
pub mod geometry;
pub mod gi;
pub mod instance;
pub mod light;
pub mod light_server;
pub mod modifier;
pub mod photon;
pub mod plugins;
pub mod primitive;
pub mod render;
pub mod scene;
pub mod shader;
pub mod shading_cache;
pub mod shading_state;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use bucket_renderer::BucketRenderer;
pub use camera::{Camera, CameraLens, PinholeLens, ThinLens};
pub use gi::GiEngine;
pub use instance::InstanceId;
pub use light::{LightSample, LightSource, PointLight};
pub use light_server::{LightServer, PhotonError, ShadingSample};
pub use modifier::{FlipNormalModifier, Modifier};
pub use photon::{KdCausticMap, PhotonStore};
pub use plugins::Plugins;
pub use primitive::{Plane, PrimitiveList, Sphere, Tesselatable, TriangleMesh};
pub use render::{render, RenderError};
pub use scene::{InstanceParams, Scene, SceneBuilder, SceneError};
pub use shader::{ConstantShader, DiffuseShader, GlassShader, MirrorShader, PhongShader, Shader};
pub use shading_state::ShadingState;
pub use state::{IntersectionState, RayStats};

/// Re-export the math and core types most callers need
pub use helio_core::{Display, ImageDisplay, Options, TaskMonitor};
pub use helio_math::{Color, Vec3};
