use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::curvature_profile::{build_inverse_map, build_map, CurvatureMap, WarpDirection};
use crate::error::{check_radius, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct MapKey {
    width: u32,
    height: u32,
    radius_bits: u32,
    direction: WarpDirection,
}

/// Keeps built [`CurvatureMap`]s keyed by size, radius and direction.
///
/// Maps are handed out as `Arc` so several warps, possibly on different
/// threads, can share one map. When `capacity` is reached the cache is
/// cleared before the new map is inserted.
#[derive(Debug)]
pub struct CurvatureMapCache {
    maps: HashMap<MapKey, Arc<CurvatureMap>>,
    capacity: usize,
}

impl Default for CurvatureMapCache {
    fn default() -> Self {
        CurvatureMapCache::with_capacity(8)
    }
}

impl CurvatureMapCache {
    pub fn with_capacity(capacity: usize) -> Self {
        CurvatureMapCache {
            maps: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }

    /// Returns the cached map for these parameters, building it on a miss.
    pub fn get_or_build(
        &mut self,
        width: u32,
        height: u32,
        radius: f32,
        direction: WarpDirection,
    ) -> Result<Arc<CurvatureMap>> {
        check_radius(radius)?;
        let key = MapKey {
            width,
            height,
            radius_bits: radius.to_bits(),
            direction,
        };
        if let Some(map) = self.maps.get(&key) {
            return Ok(Arc::clone(map));
        }

        let map = Arc::new(match direction {
            WarpDirection::ToFlat => build_map(width, height, radius)?,
            WarpDirection::ToCurved => build_inverse_map(width, height, radius)?,
        });
        if self.maps.len() >= self.capacity {
            debug!("curvature map cache full ({} maps), clearing", self.maps.len());
            self.maps.clear();
        }
        self.maps.insert(key, Arc::clone(&map));
        Ok(map)
    }
}
