//! The set of plugin registries a render draws from.

use helio_core::{bucket_order_registry, filter_registry, BucketOrder, Filter, PluginRegistry};

use crate::accel::{intersector_registry, Intersector};
use crate::gi::{gi_engine_registry, GiEngine};
use crate::photon::{caustic_map_registry, PhotonStore};

/// Name to factory registries for every pluggable strategy.
///
/// `Plugins::default()` holds the built-ins. Applications add their own
/// implementations under new names; built-in names cannot be replaced.
pub struct Plugins {
    pub filters: PluginRegistry<dyn Filter>,
    pub bucket_orders: PluginRegistry<dyn BucketOrder>,
    pub intersectors: PluginRegistry<dyn Intersector>,
    pub gi_engines: PluginRegistry<dyn GiEngine>,
    pub caustic_maps: PluginRegistry<dyn PhotonStore>,
}

impl Default for Plugins {
    fn default() -> Self {
        Self {
            filters: filter_registry(),
            bucket_orders: bucket_order_registry(),
            intersectors: intersector_registry(),
            gi_engines: gi_engine_registry(),
            caustic_maps: caustic_map_registry(),
        }
    }
}
