//! Simulation configuration and derived grid constants
//!
//! A simulation is parameterized once, before it starts, by a cell size and
//! a cell count. Everything else (pixel extents, particle capacity, air
//! solver step) derives from those two numbers. The derived values are
//! carried on the sim as an immutable `FullConfig` instead of module-level
//! globals, so two sims with different sizes can coexist in one process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parts::PMAP_BITS;

/// Number of wireless/portal channels.
pub const CHANNELS: usize = 101;

/// Maximum number of signs in one simulation.
pub const MAX_SIGNS: usize = 16;

/// Maximum number of fighter stickmen.
pub const MAX_FIGHTERS: usize = 100;

/// Hard cap on a particle's per-axis speed, in pixels per tick.
pub const MAX_VELOCITY: f32 = 1e4;

pub const MAX_PRESSURE: f32 = 256.0;
pub const MIN_PRESSURE: f32 = -256.0;

pub const MAX_TEMP: f32 = 9999.0;
pub const MIN_TEMP: f32 = 0.0;

/// Room temperature offset, Celsius. Element defaults are `R_TEMP + n + 273.15`.
pub const R_TEMP: f32 = 22.0;

/// Newtonian gravity constant, scaled by `FullConfig::cfds` per sim.
pub const M_GRAV: f32 = 6.673e-1;

// Air solver step sizes and loss factors.
pub const AIR_TSTEPP: f32 = 0.3;
pub const AIR_TSTEPV: f32 = 0.4;
pub const AIR_VADV: f32 = 0.3;
pub const AIR_VLOSS: f32 = 0.999;
pub const AIR_PLOSS: f32 = 0.9999;

// Photon surface-normal estimation.
pub const SURF_RANGE: i32 = 10;
pub const NORMAL_MIN_EST: i32 = 3;
pub const NORMAL_INTERP: i32 = 20;
pub const NORMAL_FRAC: i32 = 16;

/// Wavelength bit that marks a refracting photon.
pub const REFRACT: u32 = 0x8000_0000;

// Heavy flint glass, for strong refraction and dispersion.
pub const GLASS_IOR: f32 = 1.9;
pub const GLASS_DISP: f32 = 0.07;

/// Configuration validation failure: `which` was `value`, expected `[lo, hi]`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{which} is {value}, expected to be between {lo} and {hi}")]
pub struct CheckFailed {
    pub which: &'static str,
    pub value: i32,
    pub lo: i32,
    pub hi: i32,
}

/// User-facing simulation size: cell size in pixels and cell counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub cell: i32,
    pub cells: (i32, i32),
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig { cell: 4, cells: (153, 96) }
    }
}

impl SimulationConfig {
    /// Validate the raw values and the derived pixel extents.
    pub fn check(&self) -> Result<(), CheckFailed> {
        fn bounds(which: &'static str, value: i32, lo: i32, hi: i32) -> Result<(), CheckFailed> {
            if value >= lo && value <= hi {
                Ok(())
            } else {
                Err(CheckFailed { which, value, lo, hi })
            }
        }
        bounds("cell size", self.cell, 1, 100)?;
        bounds("horizontal cell count", self.cells.0, 1, 15000)?;
        bounds("vertical cell count", self.cells.1, 1, 15000)?;
        bounds("simulation width", self.cells.0 * self.cell, 300, 15000)?;
        bounds("simulation height", self.cells.1 * self.cell, 60, 15000)?;
        Ok(())
    }

    /// Saves only address cell counts with one byte per axis.
    pub fn can_save(&self) -> bool {
        self.cells.0 <= 255 && self.cells.1 <= 255
    }
}

/// All grid constants derived from a checked `SimulationConfig`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FullConfig {
    pub cell: i32,
    pub xcells: i32,
    pub ycells: i32,
    pub ncell: usize,
    pub xres: i32,
    pub yres: i32,
    pub npart: usize,
    pub xcntr: i32,
    pub ycntr: i32,
    /// Maximum swept-movement step, in pixels.
    pub istp: i32,
    /// Cell-size scale factor applied to air-coupled element parameters.
    pub cfds: f32,
}

impl FullConfig {
    pub fn new(config: SimulationConfig) -> Self {
        let xres = config.cells.0 * config.cell;
        let yres = config.cells.1 * config.cell;
        let npart = ((xres as i64 * yres as i64).min(1 << (31 - PMAP_BITS))) as usize;
        let istp = (config.cell / 2).max(1);
        FullConfig {
            cell: config.cell,
            xcells: config.cells.0,
            ycells: config.cells.1,
            ncell: (config.cells.0 * config.cells.1) as usize,
            xres,
            yres,
            npart,
            xcntr: xres / 2,
            ycntr: yres / 2,
            istp,
            cfds: 4.0 / config.cell as f32,
        }
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && x < self.xres && y >= 0 && y < self.yres
    }

    #[inline]
    pub fn cell_in_bounds(&self, cx: i32, cy: i32) -> bool {
        cx >= 0 && cx < self.xcells && cy >= 0 && cy < self.ycells
    }
}

/// Applied/pending configuration pair. The pending value is edited freely;
/// it only takes effect when a new sim is constructed from it.
#[derive(Debug, Clone)]
pub struct ConfigPair {
    applied: SimulationConfig,
    pending: SimulationConfig,
}

impl ConfigPair {
    pub fn new(config: SimulationConfig) -> Self {
        ConfigPair { applied: config, pending: config }
    }

    pub fn applied(&self) -> SimulationConfig {
        self.applied
    }

    pub fn pending(&self) -> SimulationConfig {
        self.pending
    }

    pub fn set_pending(&mut self, config: SimulationConfig) {
        self.pending = config;
    }

    /// True when the next new-sim should be built with a different size.
    pub fn restart_changes_size(&self) -> bool {
        self.applied != self.pending
    }

    /// Promote the pending config; returns the config the new sim should use.
    pub fn apply(&mut self) -> SimulationConfig {
        self.applied = self.pending;
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_check() {
        let config = SimulationConfig::default();
        assert!(config.check().is_ok());
        assert!(config.can_save());
    }

    #[test]
    fn derived_constants_match_default() {
        let full = FullConfig::new(SimulationConfig::default());
        assert_eq!(full.xres, 612);
        assert_eq!(full.yres, 384);
        assert_eq!(full.npart, 612 * 384);
        assert_eq!(full.istp, 2);
        assert!((full.cfds - 1.0).abs() < 1e-6);
    }

    #[test]
    fn check_rejects_tiny_and_huge_sizes() {
        let tiny = SimulationConfig { cell: 1, cells: (10, 10) };
        let err = tiny.check().unwrap_err();
        assert_eq!(err.which, "simulation width");

        let huge = SimulationConfig { cell: 4, cells: (20000, 96) };
        assert!(huge.check().is_err());
    }

    #[test]
    fn npart_is_capped_by_pmap_id_width() {
        let full = FullConfig::new(SimulationConfig { cell: 1, cells: (15000, 15000) });
        assert_eq!(full.npart, 1 << (31 - PMAP_BITS));
    }

    #[test]
    fn pending_config_only_applies_on_restart() {
        let mut pair = ConfigPair::new(SimulationConfig::default());
        assert!(!pair.restart_changes_size());
        pair.set_pending(SimulationConfig { cell: 2, cells: (200, 100) });
        assert!(pair.restart_changes_size());
        assert_eq!(pair.applied().cell, 4);
        let applied = pair.apply();
        assert_eq!(applied.cell, 2);
        assert!(!pair.restart_changes_size());
    }
}
