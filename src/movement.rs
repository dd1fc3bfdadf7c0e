//! Movement rules - swept motion, collisions, displacement, refraction
//!
//! Extends `Simulation` with the §4.A movement primitives. `eval_move`
//! classifies a destination cell for an element (blocked / enterable /
//! dynamic interaction), `try_move` performs the side effects of entering,
//! `do_move` commits the position change and keeps the index grids in
//! sync, and `plan_move` integrates velocity, air coupling and gravity
//! into a swept destination.

use crate::config::{GLASS_DISP, GLASS_IOR, MAX_VELOCITY, REFRACT, SURF_RANGE};
use crate::elements::{
    PT_BHOL, PT_ELEC, PT_FILT, PT_GLAS, PT_NEUT, PT_PHOT, PT_PLUT, PT_VOID, PT_WATR,
    PROP_CONDUCTS, PROP_NEUTPASS, TYPE_GAS, TYPE_LIQUID,
};
use crate::elements::energy::{filt_interact_wavelengths, random_wavelength_band};
use crate::parts::{pmap_id, pmap_pack, pmap_typ};
use crate::settings::EdgeMode;
use crate::simulation::Simulation;

/// Destination classification from `eval_move`.
pub const MOVE_BLOCKED: u8 = 0;
pub const MOVE_ALLOWED: u8 = 1;
pub const MOVE_DYNAMIC: u8 = 2;

#[derive(Clone, Copy, Debug)]
pub struct PlanMoveResult {
    pub fin_x: i32,
    pub fin_y: i32,
    pub clear_x: i32,
    pub clear_y: i32,
    pub fin_xf: f32,
    pub fin_yf: f32,
    pub clear_xf: f32,
    pub clear_yf: f32,
    pub vx: f32,
    pub vy: f32,
}

impl Simulation {
    /// Can a particle of element `pt` enter pixel (nx, ny)?
    /// Returns the classification and the occupying pmap slot (if any).
    pub fn eval_move(&self, pt: i32, nx: i32, ny: i32) -> (u8, u32) {
        if !self.cfg.in_bounds(nx, ny) {
            // Void lets the particle leave (and die in do_move), loop
            // wraps it; only solid edges actually block.
            return match self.edge_mode {
                EdgeMode::Solid => (MOVE_BLOCKED, 0),
                EdgeMode::Void | EdgeMode::Loop => (MOVE_ALLOWED, 0),
            };
        }
        if self.is_wall_blocking(nx, ny, pt) {
            return (MOVE_BLOCKED, 0);
        }
        let energy = self.elements.is_energy(pt);
        if energy && self.photons[(nx, ny)] != 0 {
            // Energy particles never stack on each other.
            return (MOVE_BLOCKED, self.photons[(nx, ny)]);
        }
        let r = self.pmap[(nx, ny)];
        if r == 0 {
            return (MOVE_ALLOWED, 0);
        }
        let rt = pmap_typ(r);
        let re = self.elements.get(rt);
        if energy {
            let e = match (pt, rt) {
                (PT_PHOT, PT_GLAS) | (PT_PHOT, PT_FILT) | (PT_PHOT, PT_WATR) => MOVE_DYNAMIC,
                (PT_NEUT, _) if re.properties & PROP_NEUTPASS != 0 => MOVE_DYNAMIC,
                (PT_NEUT, PT_PLUT) => MOVE_DYNAMIC,
                (PT_ELEC, _) if re.properties & PROP_CONDUCTS != 0 => MOVE_DYNAMIC,
                _ => MOVE_BLOCKED,
            };
            (e, r)
        } else {
            // Displacement: a heavier mover sinks through lighter fluids.
            let mover = self.elements.get(pt);
            if re.properties & (TYPE_LIQUID | TYPE_GAS) != 0 && mover.weight > re.weight {
                (MOVE_ALLOWED, r)
            } else {
                (MOVE_BLOCKED, r)
            }
        }
    }

    /// Perform the entry side effects for a move of `i` from (x, y) to
    /// (nx, ny). Returns false when the move must not happen; the particle
    /// may have been killed (check its type).
    pub fn try_move(&mut self, i: usize, x: i32, y: i32, nx: i32, ny: i32) -> bool {
        if nx == x && ny == y {
            return true;
        }
        let pt = self.parts.data[i].ptype;
        let (e, r) = self.eval_move(pt, nx, ny);
        match e {
            MOVE_BLOCKED => {
                if r != 0 {
                    let rt = pmap_typ(r);
                    if rt == PT_VOID || rt == PT_BHOL {
                        self.kill_part(i);
                    } else if pt == PT_PHOT {
                        // Opaque matter absorbs photons by hardness.
                        let hardness = self.elements.get(rt).hardness;
                        if hardness > 0 && self.rng.chance(hardness as u32, 100) {
                            self.kill_part(i);
                        }
                    }
                }
                false
            }
            MOVE_DYNAMIC => {
                let rt = pmap_typ(r);
                let id = pmap_id(r);
                match (pt, rt) {
                    (PT_PHOT, PT_FILT) => {
                        let filt = self.parts.data[id];
                        let wl = self.parts.data[i].ctype;
                        self.parts.data[i].ctype = filt_interact_wavelengths(&filt, wl);
                        true
                    }
                    (PT_PHOT, PT_GLAS) | (PT_PHOT, PT_WATR) => {
                        self.photon_refract(i, x, y, nx, ny, rt);
                        self.parts.data[i].ptype != 0
                    }
                    (PT_NEUT, PT_PLUT) => {
                        // Fission: pressure burst plus prompt neutrons.
                        self.add_pressure(nx, ny, 10.0);
                        self.parts.data[id].temp =
                            (self.parts.data[id].temp + 600.0).min(crate::config::MAX_TEMP);
                        self.part_change_type(id, nx, ny, PT_NEUT);
                        let (dvx, dvy) = (self.rng.uniform01() * 2.0 - 1.0, self.rng.uniform01() * 2.0 - 1.0);
                        self.parts.data[id].vx = dvx * 3.0;
                        self.parts.data[id].vy = dvy * 3.0;
                        true
                    }
                    (PT_ELEC, _) => {
                        // Electrons spark the conductor they hit and die.
                        if self.parts.data[id].life == 0 {
                            self.spark_particle(id, nx, ny);
                        }
                        self.kill_part(i);
                        false
                    }
                    _ => true,
                }
            }
            _ => {
                if r != 0 {
                    // Displace the lighter occupant into our old cell.
                    let id = pmap_id(r);
                    let rt = pmap_typ(r);
                    self.parts.data[id].x = x as f32;
                    self.parts.data[id].y = y as f32;
                    self.pmap[(x, y)] = pmap_pack(id, rt);
                }
                true
            }
        }
    }

    /// Commit a position change, handling edge modes and index grids.
    /// Returns -1 if the particle died, 0 if it stayed, 1 if it moved.
    pub fn do_move(&mut self, i: usize, x: i32, y: i32, nxf: f32, nyf: f32) -> i32 {
        let pt = self.parts.data[i].ptype;
        if pt == 0 {
            return -1;
        }
        let mut nxf = nxf;
        let mut nyf = nyf;
        let (xres, yres) = (self.cfg.xres as f32, self.cfg.yres as f32);
        match self.edge_mode {
            EdgeMode::Loop => {
                nxf = nxf.rem_euclid(xres);
                nyf = nyf.rem_euclid(yres);
            }
            EdgeMode::Solid => {
                if nxf < 0.0 || nxf >= xres {
                    nxf = nxf.clamp(0.0, xres - 1.0);
                    self.parts.data[i].vx = -self.parts.data[i].vx
                        * self.elements.get(pt).collision.abs().max(0.1);
                }
                if nyf < 0.0 || nyf >= yres {
                    nyf = nyf.clamp(0.0, yres - 1.0);
                    self.parts.data[i].vy = -self.parts.data[i].vy
                        * self.elements.get(pt).collision.abs().max(0.1);
                }
            }
            EdgeMode::Void => {}
        }
        let nx = (nxf + 0.5).floor() as i32;
        let ny = (nyf + 0.5).floor() as i32;
        if !self.cfg.in_bounds(nx, ny) {
            self.kill_part(i);
            return -1;
        }
        self.parts.data[i].x = nxf;
        self.parts.data[i].y = nyf;
        if nx == x && ny == y {
            return 0;
        }
        let energy = self.elements.is_energy(pt);
        if self.cfg.in_bounds(x, y) {
            if energy {
                if self.photons[(x, y)] != 0 && pmap_id(self.photons[(x, y)]) == i {
                    self.photons[(x, y)] = 0;
                }
            } else if self.pmap[(x, y)] != 0 && pmap_id(self.pmap[(x, y)]) == i {
                self.pmap[(x, y)] = 0;
            }
        }
        if energy {
            self.photons[(nx, ny)] = pmap_pack(i, pt);
        } else {
            self.pmap[(nx, ny)] = pmap_pack(i, pt);
        }
        1
    }

    /// `try_move` + `do_move` in one step, for callers that do not need
    /// the fallback behaviors of the dispatcher.
    pub fn move_part(&mut self, i: usize, x: i32, y: i32, nxf: f32, nyf: f32) -> i32 {
        let nx = (nxf + 0.5).floor() as i32;
        let ny = (nyf + 0.5).floor() as i32;
        if !self.try_move(i, x, y, nx, ny) {
            return if self.parts.data[i].ptype == 0 { -1 } else { 0 };
        }
        self.do_move(i, x, y, nxf, nyf)
    }

    /// Integrate velocity for one step: element loss/advection/drag, air
    /// feedback, gravity, diffusion, then an all-quadrants swept test
    /// against pmap up to the first obstruction.
    pub fn plan_move(&mut self, i: usize, x: i32, y: i32) -> PlanMoveResult {
        let pt = self.parts.data[i].ptype;
        let el = self.elements.get(pt);
        let (advection, air_drag, loss, diffusion, gravity) =
            (el.advection, el.air_drag, el.loss, el.diffusion, el.gravity);
        let (pgx, pgy) = self.get_gravity_field(x, y, gravity, 1.0);

        let (cx, cy) = self.cell_of(x, y);
        let (avx, avy) = (self.vx[(cx, cy)], self.vy[(cx, cy)]);

        let part = &mut self.parts.data[i];
        part.vx = part.vx * loss + advection * avx + pgx;
        part.vy = part.vy * loss + advection * avy + pgy;
        if diffusion > 0.0 {
            part.vx += diffusion * (2.0 * self.rng.uniform01() - 1.0);
            part.vy += diffusion * (2.0 * self.rng.uniform01() - 1.0);
        }
        part.vx = part.vx.clamp(-MAX_VELOCITY, MAX_VELOCITY);
        part.vy = part.vy.clamp(-MAX_VELOCITY, MAX_VELOCITY);
        let (vx, vy) = (part.vx, part.vy);

        // Particle drags the air field along.
        self.vx[(cx, cy)] += air_drag * vx;
        self.vy[(cx, cy)] += air_drag * vy;

        // Sweep from the true (subpixel) position so slow particles
        // accumulate fractional motion instead of snapping to the grid.
        let (px, py) = (self.parts.data[i].x, self.parts.data[i].y);
        let mut result = PlanMoveResult {
            fin_x: x,
            fin_y: y,
            clear_x: x,
            clear_y: y,
            fin_xf: px,
            fin_yf: py,
            clear_xf: px,
            clear_yf: py,
            vx,
            vy,
        };
        let mv = vx.abs().max(vy.abs());
        if mv < 0.01 {
            return result;
        }

        // Two sub-steps per pixel of travel keeps the sweep from skipping
        // cell corners; ISTP bounds the per-tick travel itself.
        let clamped_mv = mv.min((self.cfg.istp * self.cfg.cell) as f32 * 4.0);
        let steps = ((clamped_mv.ceil() as i32) * 2).max(1);
        let (dx, dy) = (vx / steps as f32, vy / steps as f32);
        let (mut xf, mut yf) = (px, py);
        let (mut last_x, mut last_y) = (x, y);
        for _ in 0..steps {
            xf += dx;
            yf += dy;
            let px = (xf + 0.5).floor() as i32;
            let py = (yf + 0.5).floor() as i32;
            if px == last_x && py == last_y {
                continue;
            }
            let (e, _) = self.eval_move(pt, px, py);
            if e != MOVE_ALLOWED {
                // Blocked or interacting: the sweep ends here and the
                // caller resolves the contact via try_move.
                result.fin_x = px;
                result.fin_y = py;
                result.fin_xf = xf;
                result.fin_yf = yf;
                return result;
            }
            result.clear_x = px;
            result.clear_y = py;
            result.clear_xf = xf;
            result.clear_yf = yf;
            last_x = px;
            last_y = py;
        }
        result.fin_x = result.clear_x;
        result.fin_y = result.clear_y;
        result.fin_xf = xf;
        result.fin_yf = yf;
        result
    }

    /// Estimate the surface normal of the element body of type `pt` near
    /// (x, y), by averaging occupied offsets in a small window. Returns
    /// `None` when there is not enough matter to define a surface.
    pub fn get_normal(&self, pt: i32, x: i32, y: i32) -> Option<(f32, f32)> {
        let mut sx = 0.0f32;
        let mut sy = 0.0f32;
        let mut n = 0;
        let range = (SURF_RANGE / 3).max(2);
        for j in -range..=range {
            for i in -range..=range {
                if i == 0 && j == 0 {
                    continue;
                }
                let r = self.pmap_at(x + i, y + j);
                if r != 0 && pmap_typ(r) == pt {
                    sx += i as f32;
                    sy += j as f32;
                    n += 1;
                }
            }
        }
        if n < crate::config::NORMAL_MIN_EST {
            return None;
        }
        let len = (sx * sx + sy * sy).sqrt();
        if len < 0.001 {
            return None;
        }
        // Normal points out of the body.
        Some((-sx / len, -sy / len))
    }

    /// Bend a photon crossing a refractive boundary; with dispersion the
    /// wavelength band narrows and a shifted secondary photon may split
    /// off. Total internal reflection bounces instead.
    fn photon_refract(&mut self, i: usize, x: i32, y: i32, nx: i32, ny: i32, medium: i32) {
        // Only an outside-to-inside boundary crossing bends the ray;
        // interior steps pass straight through.
        let origin = self.pmap_at(x, y);
        if origin != 0 && pmap_typ(origin) == medium {
            return;
        }
        let Some((nrm_x, nrm_y)) = self.get_normal(medium, nx, ny) else {
            return;
        };
        let part = self.parts.data[i];
        let speed = (part.vx * part.vx + part.vy * part.vy).sqrt();
        if speed < 0.001 {
            return;
        }
        let (ux, uy) = (part.vx / speed, part.vy / speed);
        let eta = 1.0 / GLASS_IOR;
        let cos_i = -(ux * nrm_x + uy * nrm_y);
        let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
        if sin2_t > 1.0 {
            // Total internal reflection.
            let dot = ux * nrm_x + uy * nrm_y;
            self.parts.data[i].vx = (ux - 2.0 * dot * nrm_x) * speed;
            self.parts.data[i].vy = (uy - 2.0 * dot * nrm_y) * speed;
            return;
        }
        let k = eta * cos_i - (1.0 - sin2_t).sqrt();
        self.parts.data[i].vx = (eta * ux + k * nrm_x) * speed;
        self.parts.data[i].vy = (eta * uy + k * nrm_y) * speed;
        self.parts.data[i].flags |= REFRACT as i32;

        if medium == PT_GLAS && GLASS_DISP > 0.0 {
            // Dispersion: the surviving ray keeps a narrowed band; the
            // shifted remainder splits into a secondary photon.
            let wl = self.parts.data[i].ctype;
            let (kept, shifted) = random_wavelength_band(&mut self.rng, wl);
            if kept != 0 {
                self.parts.data[i].ctype = kept;
            }
            if shifted != 0 {
                // The origin cell still holds this photon until the move
                // commits, so the secondary needs a free cell next to it.
                let mut j = -1;
                for (dx, dy) in [(0, -1), (0, 1), (-1, 0), (1, 0), (-1, -1), (1, -1), (-1, 1), (1, 1)]
                {
                    j = self.create_part(-2, x + dx, y + dy, PT_PHOT);
                    if j >= 0 {
                        break;
                    }
                }
                if j >= 0 {
                    let spread = GLASS_DISP * speed;
                    self.parts.data[j as usize].ctype = shifted;
                    self.parts.data[j as usize].vx =
                        self.parts.data[i].vx + (2.0 * self.rng.uniform01() - 1.0) * spread;
                    self.parts.data[j as usize].vy =
                        self.parts.data[i].vy + (2.0 * self.rng.uniform01() - 1.0) * spread;
                    self.parts.data[j as usize].temp = self.parts.data[i].temp;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::elements::{PT_DUST, PT_STNE};

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn eval_move_blocks_occupied_cells() {
        let mut sim = sim();
        sim.create_part(-2, 80, 60, PT_STNE);
        let (e, r) = sim.eval_move(PT_DUST, 80, 60);
        assert_eq!(e, MOVE_BLOCKED);
        assert_ne!(r, 0);
        let (e, _) = sim.eval_move(PT_DUST, 81, 60);
        assert_eq!(e, MOVE_ALLOWED);
    }

    #[test]
    fn heavier_powder_displaces_liquid() {
        let mut sim = sim();
        sim.create_part(-2, 80, 60, PT_WATR);
        let (e, r) = sim.eval_move(PT_STNE, 80, 60);
        assert_eq!(e, MOVE_ALLOWED);
        assert_ne!(r, 0);
        // And not the other way around.
        let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
        sim.create_part(-2, 80, 60, PT_STNE);
        let (e, _) = sim.eval_move(PT_WATR, 80, 60);
        assert_eq!(e, MOVE_BLOCKED);
    }

    #[test]
    fn do_move_updates_index_grids() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        assert_eq!(sim.do_move(i, 80, 60, 85.0, 61.0), 1);
        assert_eq!(sim.pmap[(80, 60)], 0);
        assert_eq!(pmap_id(sim.pmap[(85, 61)]), i);
        assert_eq!(Simulation::part_pos(&sim.parts.data[i]), (85, 61));
    }

    #[test]
    fn void_edge_kills_escaping_particles() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        assert_eq!(sim.do_move(i, 80, 60, 80.0, 1.0e6), -1);
        assert_eq!(sim.parts.data[i].ptype, 0);
    }

    #[test]
    fn loop_edge_wraps_position() {
        let mut sim = sim();
        sim.edge_mode = EdgeMode::Loop;
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        let yres = sim.cfg.yres as f32;
        assert_eq!(sim.do_move(i, 80, 60, 80.0, yres + 3.0), 1);
        assert_eq!(Simulation::part_pos(&sim.parts.data[i]), (80, 3));
    }

    #[test]
    fn plan_move_sweeps_to_first_obstruction() {
        let mut sim = sim();
        // A wall of stone at x=90, dust moving right fast.
        for y in 55..65 {
            sim.create_part(-2, 90, y, PT_STNE);
        }
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        sim.gravity_mode = crate::settings::GravityMode::Off;
        sim.parts.data[i].vx = 20.0;
        sim.parts.data[i].vy = 0.0;
        let plan = sim.plan_move(i, 80, 60);
        assert_eq!(plan.fin_x, 90);
        assert_eq!(plan.clear_x, 89);
        assert_eq!(plan.clear_y, 60);
    }
}
