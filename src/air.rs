//! Air solver - per-cell pressure, velocity and ambient heat
//!
//! Operates on the cell-resolution field planes owned by the simulation.
//! One update is: advect velocity along itself with a 3x3 gauss kernel,
//! derive pressure from velocity divergence, accelerate velocity down the
//! pressure gradient, then clip. Ambient heat diffuses with the same
//! kernel and decays toward the configured ambient temperature.
//!
//! The solver keeps its own scratch planes and wall block maps so a sim
//! tick never allocates.

use crate::config::{
    FullConfig, AIR_PLOSS, AIR_TSTEPP, AIR_TSTEPV, AIR_VADV, AIR_VLOSS, MAX_PRESSURE, MAX_TEMP,
    MIN_PRESSURE, MIN_TEMP,
};
use crate::plane::Plane;
use crate::settings::{AirMode, EdgeMode};
use crate::walls::{wall_blocks_air, WL_FAN};

/// Maximum cell velocity, matching the pressure clip scale.
const MAX_AIR_VELOCITY: f32 = 1e4;

/// Ambient heat relaxation rate toward the configured air temperature.
const AMBIENT_DECAY: f32 = 0.001;

pub struct Air {
    pub air_mode: AirMode,
    pub ambient_air_temp: f32,
    kernel: [f32; 9],
    ovx: Plane<f32>,
    ovy: Plane<f32>,
    opv: Plane<f32>,
    ohv: Plane<f32>,
    /// Cells that block pressure/velocity (from walls).
    pub bmap_blockair: Plane<u8>,
    /// Cells that block ambient heat.
    pub bmap_blockairh: Plane<u8>,
}

impl Air {
    pub fn new(cfg: &FullConfig, ambient_air_temp: f32) -> Self {
        Air {
            air_mode: AirMode::On,
            ambient_air_temp,
            kernel: make_kernel(),
            ovx: Plane::new(cfg.xcells, cfg.ycells),
            ovy: Plane::new(cfg.xcells, cfg.ycells),
            opv: Plane::new(cfg.xcells, cfg.ycells),
            ohv: Plane::new(cfg.xcells, cfg.ycells),
            bmap_blockair: Plane::new(cfg.xcells, cfg.ycells),
            bmap_blockairh: Plane::new(cfg.xcells, cfg.ycells),
        }
    }

    /// Recompute the wall block maps from `bmap`. Called whenever walls
    /// change and on load/restore.
    pub fn approximate_block_air_maps(&mut self, bmap: &Plane<u8>) {
        for cy in 0..bmap.height() {
            for cx in 0..bmap.width() {
                let wall = bmap[(cx, cy)];
                let blocks = wall_blocks_air(wall);
                self.bmap_blockair[(cx, cy)] = blocks as u8;
                self.bmap_blockairh[(cx, cy)] = blocks as u8;
            }
        }
    }

    pub fn clear(&mut self, pv: &mut Plane<f32>, vx: &mut Plane<f32>, vy: &mut Plane<f32>) {
        pv.fill(0.0);
        vx.fill(0.0);
        vy.fill(0.0);
    }

    pub fn clear_airh(&mut self, hv: &mut Plane<f32>) {
        hv.fill(self.ambient_air_temp);
    }

    /// Flip the sign of pressure and velocity everywhere.
    pub fn invert(&mut self, pv: &mut Plane<f32>, vx: &mut Plane<f32>, vy: &mut Plane<f32>) {
        for v in pv.data_mut() {
            *v = -*v;
        }
        for v in vx.data_mut() {
            *v = -*v;
        }
        for v in vy.data_mut() {
            *v = -*v;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_air(
        &mut self,
        cfg: &FullConfig,
        edge_mode: EdgeMode,
        pv: &mut Plane<f32>,
        vx: &mut Plane<f32>,
        vy: &mut Plane<f32>,
        fvx: &Plane<f32>,
        fvy: &Plane<f32>,
        bmap: &Plane<u8>,
    ) {
        match self.air_mode {
            AirMode::NoUpdate => return,
            AirMode::Off => {
                self.clear(pv, vx, vy);
                return;
            }
            _ => {}
        }

        let (w, h) = (cfg.xcells, cfg.ycells);

        if edge_mode == EdgeMode::Void {
            for cx in 0..w {
                for cy in [0, h - 1] {
                    pv[(cx, cy)] = 0.0;
                    vx[(cx, cy)] = 0.0;
                    vy[(cx, cy)] = 0.0;
                }
            }
            for cy in 0..h {
                for cx in [0, w - 1] {
                    pv[(cx, cy)] = 0.0;
                    vx[(cx, cy)] = 0.0;
                    vy[(cx, cy)] = 0.0;
                }
            }
        }

        // Blocked cells carry no flow.
        for cy in 0..h {
            for cx in 0..w {
                if self.bmap_blockair[(cx, cy)] != 0 {
                    pv[(cx, cy)] = 0.0;
                    vx[(cx, cy)] = 0.0;
                    vy[(cx, cy)] = 0.0;
                }
            }
        }

        self.ovx.data_mut().copy_from_slice(vx.data());
        self.ovy.data_mut().copy_from_slice(vy.data());
        self.opv.data_mut().copy_from_slice(pv.data());

        let sample = |plane: &Plane<f32>, mut cx: i32, mut cy: i32| -> Option<f32> {
            match edge_mode {
                EdgeMode::Loop => {
                    cx = cx.rem_euclid(w);
                    cy = cy.rem_euclid(h);
                }
                EdgeMode::Void | EdgeMode::Solid => {
                    if cx < 0 || cx >= w || cy < 0 || cy >= h {
                        return None;
                    }
                }
            }
            if self.bmap_blockair[(cx, cy)] != 0 {
                None
            } else {
                Some(plane[(cx, cy)])
            }
        };

        // 1. Advect velocity along itself: kernel smoothing of the old
        // field sampled one AIR_VADV step upstream.
        for cy in 0..h {
            for cx in 0..w {
                if self.bmap_blockair[(cx, cy)] != 0 {
                    continue;
                }
                // Upstream cell, half a step back along the local flow.
                let sx = cx as f32 - AIR_VADV * self.ovx[(cx, cy)];
                let sy = cy as f32 - AIR_VADV * self.ovy[(cx, cy)];
                let bx = (sx + 0.5).floor() as i32;
                let by = (sy + 0.5).floor() as i32;
                let mut dx = 0.0;
                let mut dy = 0.0;
                let mut weight = 0.0;
                for j in -1..=1 {
                    for i in -1..=1 {
                        let f = self.kernel[((i + 1) + (j + 1) * 3) as usize];
                        let (tx, ty) = (bx + i, by + j);
                        if let (Some(svx), Some(svy)) =
                            (sample(&self.ovx, tx, ty), sample(&self.ovy, tx, ty))
                        {
                            dx += svx * f;
                            dy += svy * f;
                            weight += f;
                        }
                    }
                }
                if weight > 0.0 {
                    vx[(cx, cy)] = dx / weight;
                    vy[(cx, cy)] = dy / weight;
                }
            }
        }

        // 2. Pressure from velocity divergence.
        for cy in 0..h {
            for cx in 0..w {
                if self.bmap_blockair[(cx, cy)] != 0 {
                    continue;
                }
                let right = sample(vx, cx + 1, cy).unwrap_or(0.0);
                let left = sample(vx, cx - 1, cy).unwrap_or(0.0);
                let down = sample(vy, cx, cy + 1).unwrap_or(0.0);
                let up = sample(vy, cx, cy - 1).unwrap_or(0.0);
                let div = (right - left + down - up) * 0.5;
                pv[(cx, cy)] = AIR_PLOSS * self.opv[(cx, cy)] - AIR_TSTEPP * div;
            }
        }

        // 3. Velocity down the pressure gradient.
        for cy in 0..h {
            for cx in 0..w {
                if self.bmap_blockair[(cx, cy)] != 0 {
                    continue;
                }
                let here = pv[(cx, cy)];
                let right = sample(pv, cx + 1, cy).unwrap_or(if edge_mode == EdgeMode::Solid {
                    here
                } else {
                    0.0
                });
                let left = sample(pv, cx - 1, cy).unwrap_or(if edge_mode == EdgeMode::Solid {
                    here
                } else {
                    0.0
                });
                let down = sample(pv, cx, cy + 1).unwrap_or(if edge_mode == EdgeMode::Solid {
                    here
                } else {
                    0.0
                });
                let up = sample(pv, cx, cy - 1).unwrap_or(if edge_mode == EdgeMode::Solid {
                    here
                } else {
                    0.0
                });
                vx[(cx, cy)] = AIR_VLOSS * vx[(cx, cy)] - AIR_TSTEPV * (right - left) * 0.5;
                vy[(cx, cy)] = AIR_VLOSS * vy[(cx, cy)] - AIR_TSTEPV * (down - up) * 0.5;
            }
        }

        // 4. Clip, apply fan walls.
        for cy in 0..h {
            for cx in 0..w {
                if bmap[(cx, cy)] == WL_FAN {
                    vx[(cx, cy)] = fvx[(cx, cy)];
                    vy[(cx, cy)] = fvy[(cx, cy)];
                }
                pv[(cx, cy)] = pv[(cx, cy)].clamp(MIN_PRESSURE, MAX_PRESSURE);
                vx[(cx, cy)] = vx[(cx, cy)].clamp(-MAX_AIR_VELOCITY, MAX_AIR_VELOCITY);
                vy[(cx, cy)] = vy[(cx, cy)].clamp(-MAX_AIR_VELOCITY, MAX_AIR_VELOCITY);
            }
        }

        match self.air_mode {
            AirMode::PressureOff => pv.fill(0.0),
            AirMode::VelocityOff => {
                vx.fill(0.0);
                vy.fill(0.0);
            }
            _ => {}
        }
    }

    /// Ambient heat: kernel diffusion plus decay toward the configured
    /// ambient temperature. Per-cell element contributions are added by
    /// the dispatcher before this runs.
    pub fn update_airh(&mut self, cfg: &FullConfig, edge_mode: EdgeMode, hv: &mut Plane<f32>) {
        if matches!(self.air_mode, AirMode::NoUpdate) {
            return;
        }
        let (w, h) = (cfg.xcells, cfg.ycells);
        self.ohv.data_mut().copy_from_slice(hv.data());
        for cy in 0..h {
            for cx in 0..w {
                if self.bmap_blockairh[(cx, cy)] != 0 {
                    continue;
                }
                let mut acc = 0.0;
                let mut weight = 0.0;
                for j in -1..=1 {
                    for i in -1..=1 {
                        let (mut tx, mut ty) = (cx + i, cy + j);
                        if edge_mode == EdgeMode::Loop {
                            tx = tx.rem_euclid(w);
                            ty = ty.rem_euclid(h);
                        }
                        if tx < 0 || tx >= w || ty < 0 || ty >= h {
                            continue;
                        }
                        if self.bmap_blockairh[(tx, ty)] != 0 {
                            continue;
                        }
                        let f = self.kernel[((i + 1) + (j + 1) * 3) as usize];
                        acc += self.ohv[(tx, ty)] * f;
                        weight += f;
                    }
                }
                let diffused = if weight > 0.0 {
                    acc / weight
                } else {
                    self.ohv[(cx, cy)]
                };
                let relaxed = diffused + (self.ambient_air_temp - diffused) * AMBIENT_DECAY;
                hv[(cx, cy)] = relaxed.clamp(MIN_TEMP, MAX_TEMP);
            }
        }
    }
}

fn make_kernel() -> [f32; 9] {
    let mut kernel = [0.0f32; 9];
    let mut s = 0.0;
    for j in -1i32..=1 {
        for i in -1i32..=1 {
            let f = (-2.0 * (i * i + j * j) as f32).exp();
            kernel[((i + 1) + (j + 1) * 3) as usize] = f;
            s += f;
        }
    }
    for f in &mut kernel {
        *f /= s;
    }
    kernel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;

    fn fixture() -> (FullConfig, Air, Plane<f32>, Plane<f32>, Plane<f32>, Plane<f32>, Plane<f32>, Plane<u8>) {
        let cfg = FullConfig::new(SimulationConfig::default());
        let air = Air::new(&cfg, 295.15);
        let pv = Plane::new(cfg.xcells, cfg.ycells);
        let vx = Plane::new(cfg.xcells, cfg.ycells);
        let vy = Plane::new(cfg.xcells, cfg.ycells);
        let fvx = Plane::new(cfg.xcells, cfg.ycells);
        let fvy = Plane::new(cfg.xcells, cfg.ycells);
        let bmap = Plane::new(cfg.xcells, cfg.ycells);
        (cfg, air, pv, vx, vy, fvx, fvy, bmap)
    }

    #[test]
    fn kernel_is_normalized() {
        let kernel = make_kernel();
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(kernel[4] > kernel[0]);
    }

    #[test]
    fn pressure_spike_pushes_air_outward() {
        let (cfg, mut air, mut pv, mut vx, mut vy, fvx, fvy, bmap) = fixture();
        pv[(50, 50)] = 100.0;
        air.update_air(&cfg, EdgeMode::Void, &mut pv, &mut vx, &mut vy, &fvx, &fvy, &bmap);
        assert!(vx[(51, 50)] > 0.0);
        assert!(vx[(49, 50)] < 0.0);
        assert!(vy[(50, 51)] > 0.0);
        assert!(vy[(50, 49)] < 0.0);
    }

    #[test]
    fn off_mode_clears_fields() {
        let (cfg, mut air, mut pv, mut vx, mut vy, fvx, fvy, bmap) = fixture();
        pv[(10, 10)] = 50.0;
        vx[(10, 10)] = 5.0;
        air.air_mode = AirMode::Off;
        air.update_air(&cfg, EdgeMode::Void, &mut pv, &mut vx, &mut vy, &fvx, &fvy, &bmap);
        assert_eq!(pv[(10, 10)], 0.0);
        assert_eq!(vx[(10, 10)], 0.0);
    }

    #[test]
    fn no_update_mode_freezes_fields() {
        let (cfg, mut air, mut pv, mut vx, mut vy, fvx, fvy, bmap) = fixture();
        pv[(10, 10)] = 50.0;
        air.air_mode = AirMode::NoUpdate;
        air.update_air(&cfg, EdgeMode::Void, &mut pv, &mut vx, &mut vy, &fvx, &fvy, &bmap);
        assert_eq!(pv[(10, 10)], 50.0);
    }

    #[test]
    fn blocked_cells_hold_no_pressure() {
        let (cfg, mut air, mut pv, mut vx, mut vy, fvx, fvy, mut bmap) = fixture();
        bmap[(20, 20)] = crate::walls::WL_WALL;
        air.approximate_block_air_maps(&bmap);
        pv[(20, 20)] = 100.0;
        air.update_air(&cfg, EdgeMode::Void, &mut pv, &mut vx, &mut vy, &fvx, &fvy, &bmap);
        assert_eq!(pv[(20, 20)], 0.0);
    }

    #[test]
    fn ambient_heat_relaxes_toward_ambient() {
        let (cfg, mut air, _, _, _, _, _, _) = fixture();
        let mut hv = Plane::filled(cfg.xcells, cfg.ycells, 295.15f32);
        hv[(30, 30)] = 1000.0;
        for _ in 0..200 {
            air.update_airh(&cfg, EdgeMode::Void, &mut hv);
        }
        assert!(hv[(30, 30)] < 500.0);
        assert!(hv[(30, 30)] > 295.0);
    }
}
