//! # Device Calibration
//!
//! Per-device min/max bounds and the math that maps raw sensor coordinates
//! into the shared virtual world.
//!
//! ## Axis Mapping
//!
//! ```text
//! device x  ──clamp [minX, maxX]──► rescale [floor, max_x] ──► world x
//! device z  ──clamp [minZ, maxZ]──► rescale [floor, max_y] ──► world y
//! device y  ── ignored (overhead view)
//!                                                     0.0 ──► world z
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::world::VirtualPosition;

/// Default width of the virtual world.
pub const DEFAULT_WORLD_MAX_X: f32 = 1000.0;

/// Default depth of the virtual world.
pub const DEFAULT_WORLD_MAX_Y: f32 = 750.0;

/// Lower bound of every rescaled axis.
///
/// Kept above zero so downstream renderers never see a zero-width range
/// starting at the origin.
pub const WORLD_FLOOR: f32 = 0.1;

/// Raw coordinate bounds reported by one device.
///
/// No validation is applied: `min > max` is stored as given and yields an
/// inverted (degenerate) mapping during normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBounds {
    /// Smallest raw X.
    pub min_x: f32,
    /// Smallest raw Y.
    pub min_y: f32,
    /// Smallest raw Z (depth).
    pub min_z: f32,
    /// Largest raw X.
    pub max_x: f32,
    /// Largest raw Y.
    pub max_y: f32,
    /// Largest raw Z (depth).
    pub max_z: f32,
}

impl CalibrationBounds {
    /// Creates bounds in wire order: three minima, then three maxima.
    #[inline]
    #[must_use]
    pub const fn new(min_x: f32, min_y: f32, min_z: f32, max_x: f32, max_y: f32, max_z: f32) -> Self {
        Self {
            min_x,
            min_y,
            min_z,
            max_x,
            max_y,
            max_z,
        }
    }
}

/// Extent of the virtual world every device is normalized into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldBounds {
    /// Upper bound of world X.
    pub max_x: f32,
    /// Upper bound of world Y.
    pub max_y: f32,
    /// Lower bound of both rescaled axes.
    pub floor: f32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            max_x: DEFAULT_WORLD_MAX_X,
            max_y: DEFAULT_WORLD_MAX_Y,
            floor: WORLD_FLOOR,
        }
    }
}

/// Linearly maps `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// A zero-width input range maps everything onto `out_min`.
#[inline]
#[must_use]
pub fn map_value(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let span = in_max - in_min;
    if span == 0.0 {
        return out_min;
    }
    out_min + (value - in_min) / span * (out_max - out_min)
}

/// Keeps `value` inside `[min, max]`.
///
/// Unlike `f32::clamp` this never panics on `min > max`; the result then
/// collapses onto `max`.
#[inline]
fn keep_in_range(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

/// Calibration data for every device seen so far.
#[derive(Clone, Debug, Default)]
pub struct CalibrationStore {
    bounds: HashMap<String, CalibrationBounds>,
    world: WorldBounds,
}

impl CalibrationStore {
    /// Creates an empty store normalizing into `world`.
    #[must_use]
    pub fn new(world: WorldBounds) -> Self {
        Self {
            bounds: HashMap::new(),
            world,
        }
    }

    /// Stores bounds for `client_id`, replacing any previous value.
    pub fn set(&mut self, client_id: impl Into<String>, bounds: CalibrationBounds) {
        self.bounds.insert(client_id.into(), bounds);
    }

    /// Returns the bounds for `client_id`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UncalibratedDevice`] if the device never sent bounds.
    pub fn get(&self, client_id: &str) -> CoreResult<CalibrationBounds> {
        self.bounds
            .get(client_id)
            .copied()
            .ok_or_else(|| CoreError::UncalibratedDevice {
                client_id: client_id.to_owned(),
            })
    }

    /// Returns true if `client_id` has bounds.
    #[must_use]
    pub fn is_calibrated(&self, client_id: &str) -> bool {
        self.bounds.contains_key(client_id)
    }

    /// Number of calibrated devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Returns true if no device is calibrated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// The world extent used for normalization.
    #[must_use]
    pub const fn world(&self) -> &WorldBounds {
        &self.world
    }

    /// Converts raw device coordinates into a virtual world position.
    ///
    /// Device Y is accepted for wire compatibility but does not contribute:
    /// the world is an overhead view, so device Z becomes world Y.
    ///
    /// # Errors
    ///
    /// [`CoreError::UncalibratedDevice`] if the device never sent bounds.
    pub fn normalize(&self, client_id: &str, x: f32, _y: f32, z: f32) -> CoreResult<VirtualPosition> {
        let bounds = self.get(client_id)?;
        let world = &self.world;

        let x = keep_in_range(x, bounds.min_x, bounds.max_x);
        let world_x = map_value(x, bounds.min_x, bounds.max_x, world.floor, world.max_x);

        let z = keep_in_range(z, bounds.min_z, bounds.max_z);
        let world_y = map_value(z, bounds.min_z, bounds.max_z, world.floor, world.max_y);

        Ok(VirtualPosition::new(world_x, world_y, 0.0))
    }
}
