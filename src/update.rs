//! Per-tick update pipeline
//!
//! One tick is: before-sim bookkeeping (emap decay, gravity handoff, air
//! solve, pool/pmap rebuild with life decrement), the particle update scan
//! in ascending pool order, the stacking sweep at its cadence, then the
//! after-sim hook (Game-of-Life pass, wireless propagation, invariant
//! check in debug builds).

use log::warn;

use crate::config::MAX_PRESSURE;
use crate::elements::{
    gol, PT_EMBR, PROP_CONDUCTS, PROP_LIFE_DEC, PROP_LIFE_KILL, PROP_LIFE_KILL_DEC, PT_SPRK,
    PT_WATR, TYPE_ENERGY, TYPE_SOLID, UpdateCtx,
};
use crate::gravity::update_gravity_mask;
use crate::parts::{pmap_id, pmap_pack, pmap_typ};
use crate::simulation::Simulation;
use crate::transitions::TransitionOutcome;

/// Non-energy particles allowed on one cell before the sweep detonates it.
pub const STACKING_THRESHOLD: u32 = 5;

/// Ticks between stacking sweeps when nothing forces one.
pub const STACKING_CADENCE: u64 = 20;

/// Run the Game-of-Life pass every this many frames.
pub const GOL_SPEED: u64 = 1;

impl Simulation {
    /// Advance the simulation by one full tick.
    pub fn tick(&mut self) {
        self.before_sim();
        let end = self.parts.capacity();
        let start = self.debug_next_to_update;
        self.update_particles(start, end);
        self.debug_next_to_update = 0;
        if self.force_stacking_check || self.frame_count % STACKING_CADENCE == 0 {
            self.force_stacking_check = false;
            self.check_stacking();
        }
        self.after_sim();
    }

    /// Advance particle updates only up to pool index `up_to`, leaving the
    /// rest for the next call. Used by frame-step debugging.
    pub fn tick_up_to(&mut self, up_to: usize) {
        if self.debug_next_to_update == 0 {
            self.before_sim();
        }
        let start = self.debug_next_to_update;
        let end = up_to.min(self.parts.capacity());
        self.update_particles(start, end);
        if end >= self.parts.capacity() {
            self.debug_next_to_update = 0;
            if self.force_stacking_check || self.frame_count % STACKING_CADENCE == 0 {
                self.force_stacking_check = false;
                self.check_stacking();
            }
            self.after_sim();
        } else {
            self.debug_next_to_update = end;
        }
    }

    /// Everything that must settle before particles move.
    pub fn before_sim(&mut self) {
        // Spark-era bookkeeping and emap decay.
        if self.iswire > 0 {
            self.iswire -= 1;
        }
        for e in self.emap.data_mut() {
            if *e > 0 {
                *e -= 1;
            }
        }
        if self.lightning_recreate > 0 {
            self.lightning_recreate -= 1;
        }

        // Gravity handoff: push this tick's mass map, pull last tick's
        // forces.
        if self.grav_wall_changed {
            update_gravity_mask(&self.bmap, &mut self.gravmask);
            self.grav_wall_changed = false;
        }
        if let Some(grav) = self.grav.take() {
            grav.update_async(&mut self.grav_in, &mut self.grav_out, &self.gravmask);
            self.grav = Some(grav);
        }

        // Air solve on the current field state.
        self.air.approximate_block_air_maps(&self.bmap);
        {
            // Planes move out briefly so the solver can borrow sim fields
            // without aliasing the whole struct.
            let mut pv = std::mem::replace(&mut self.pv, crate::plane::Plane::new(1, 1));
            let mut vx = std::mem::replace(&mut self.vx, crate::plane::Plane::new(1, 1));
            let mut vy = std::mem::replace(&mut self.vy, crate::plane::Plane::new(1, 1));
            self.air.update_air(
                &self.cfg,
                self.edge_mode,
                &mut pv,
                &mut vx,
                &mut vy,
                &self.fvx,
                &self.fvy,
                &self.bmap,
            );
            self.pv = pv;
            self.vx = vx;
            self.vy = vy;
        }
        if self.aheat_enable {
            let mut hv = std::mem::replace(&mut self.hv, crate::plane::Plane::new(1, 1));
            self.air.update_airh(&self.cfg, self.edge_mode, &mut hv);
            self.hv = hv;
        }

        self.recalc_free_particles(true);
    }

    /// Rebuild pmap/photons, stacking counts, element counts, the free
    /// list and the high-water mark; decrement lifetimes on the way.
    pub fn recalc_free_particles(&mut self, do_life_dec: bool) {
        self.pmap.fill(0);
        self.photons.fill(0);
        self.pmap_count.fill(0);
        if self.elem_recount {
            self.element_count.fill(0);
        }
        if self.grav.is_some() {
            self.grav_in.mass.fill(0.0);
        }

        let cap = self.parts.capacity();
        let mut live = 0;
        for i in 0..cap {
            if self.parts.data[i].is_vacant() {
                continue;
            }
            let t = self.parts.data[i].ptype;
            let props = self.elements.get(t).properties;

            if do_life_dec {
                let part = &mut self.parts.data[i];
                if props & PROP_LIFE_DEC != 0 && part.life > 0 {
                    part.life -= 1;
                    if part.life == 0 && props & PROP_LIFE_KILL_DEC != 0 {
                        self.kill_part(i);
                        continue;
                    }
                }
                if props & PROP_LIFE_KILL != 0 && self.parts.data[i].life <= 0 {
                    self.kill_part(i);
                    continue;
                }
                // Conductor spark-settle cooldown.
                if t != PT_SPRK && props & PROP_CONDUCTS != 0 && self.parts.data[i].life > 0 {
                    self.parts.data[i].life -= 1;
                }
            }

            let part = self.parts.data[i];
            let (x, y) = Simulation::part_pos(&part);
            if !self.cfg.in_bounds(x, y) {
                self.kill_part(i);
                continue;
            }
            if self.elem_recount {
                self.element_count[t as usize] += 1;
            }
            live += 1;
            if props & TYPE_ENERGY != 0 {
                self.photons[(x, y)] = pmap_pack(i, t);
            } else {
                self.pmap[(x, y)] = pmap_pack(i, t);
                self.pmap_count[(x, y)] += 1;
                if self.grav.is_some() {
                    let (cx, cy) = self.cell_of(x, y);
                    self.grav_in.mass[(cx, cy)] += 1.0;
                }
            }
        }
        self.num_parts = live;
        self.elem_recount = false;
        self.pfree = self.parts.rebuild_free_list();
    }

    /// The main particle scan: strictly ascending pool order, each
    /// particle updated at most once per tick.
    pub fn update_particles(&mut self, start: usize, end: usize) {
        let end = end.min(self.parts.capacity());
        for i in start..end {
            if i > self.parts.last_active_index {
                break;
            }
            if self.parts.data[i].is_vacant() {
                continue;
            }
            let (x, y) = Simulation::part_pos(&self.parts.data[i]);
            let t = self.parts.data[i].ptype;
            if !self.cfg.in_bounds(x, y) {
                self.kill_part(i);
                continue;
            }
            if self.is_wall_blocking(x, y, t) {
                // A wall grew over this particle.
                self.kill_part(i);
                continue;
            }

            let hot_air = self.elements.get(t).hot_air;
            if hot_air != 0.0 {
                let (cx, cy) = self.cell_of(x, y);
                self.pv[(cx, cy)] =
                    (self.pv[(cx, cy)] + hot_air * 4.0).clamp(-MAX_PRESSURE, MAX_PRESSURE);
            }

            self.conduct_heat(i, x, y);
            match self.check_transitions(i, x, y) {
                TransitionOutcome::Killed => continue,
                TransitionOutcome::Changed | TransitionOutcome::Unchanged => {}
            }
            if self.parts.data[i].is_vacant() {
                continue;
            }
            let t = self.parts.data[i].ptype;

            if let Some(update) = self.elements.get(t).update {
                let ctx = self.surroundings(i, x, y, t);
                if update(self, ctx) {
                    continue;
                }
            }
            if self.parts.data[i].is_vacant() {
                continue;
            }

            self.move_behavior(i);
        }
    }

    fn surroundings(&self, i: usize, x: i32, y: i32, t: i32) -> UpdateCtx {
        let mut surround_space = 0;
        let mut nt = 0;
        for (dx, dy) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
            let r = self.pmap_at(x + dx, y + dy);
            if r == 0 {
                surround_space += 1;
                nt += 1;
            } else if pmap_typ(r) != t {
                nt += 1;
            }
        }
        UpdateCtx { i, x, y, surround_space, nt }
    }

    /// Movement after the element callback: swept advance, then the
    /// element-kind fallback (powder slide, liquid flow, energy bounce).
    fn move_behavior(&mut self, i: usize) {
        let part = self.parts.data[i];
        let t = part.ptype;
        let (x, y) = Simulation::part_pos(&part);
        let (props, falldown, collision) = {
            let el = self.elements.get(t);
            (el.properties, el.falldown, el.collision)
        };
        if props & TYPE_SOLID != 0 && falldown == 0 {
            self.parts.data[i].vx = 0.0;
            self.parts.data[i].vy = 0.0;
            return;
        }

        let plan = self.plan_move(i, x, y);
        if self.parts.data[i].is_vacant() {
            return;
        }

        if props & TYPE_ENERGY != 0 {
            match self.move_part(i, x, y, plan.fin_xf, plan.fin_yf) {
                0 => {
                    // Reflected: settle on the last clear spot, bounce.
                    self.do_move(i, x, y, plan.clear_xf, plan.clear_yf);
                    if self.parts.data[i].ptype != 0 {
                        self.parts.data[i].vx *= collision;
                        self.parts.data[i].vy *= collision;
                    }
                }
                _ => {}
            }
            return;
        }

        let unobstructed = plan.fin_x == plan.clear_x && plan.fin_y == plan.clear_y;
        if unobstructed {
            self.do_move(i, x, y, plan.fin_xf, plan.fin_yf);
            return;
        }
        if self.try_move(i, x, y, plan.fin_x, plan.fin_y) {
            self.do_move(i, x, y, plan.fin_xf, plan.fin_yf);
            return;
        }
        if self.parts.data[i].is_vacant() {
            return;
        }

        // Blocked: settle at the last clear cell, damp velocity.
        self.do_move(i, x, y, plan.clear_xf, plan.clear_yf);
        if self.parts.data[i].is_vacant() {
            return;
        }
        self.parts.data[i].vx *= collision.abs().min(1.0);
        self.parts.data[i].vy *= collision.abs().min(1.0);
        let (cx, cy) = (plan.clear_x, plan.clear_y);

        let side = if self.rng.chance(1, 2) { 1 } else { -1 };
        match falldown {
            1 => {
                // Powder: slide down a diagonal.
                for dx in [side, -side] {
                    if self.eval_move(t, cx + dx, cy + 1).0 != crate::movement::MOVE_BLOCKED
                        && self.try_move(i, cx, cy, cx + dx, cy + 1)
                    {
                        self.do_move(i, cx, cy, (cx + dx) as f32, (cy + 1) as f32);
                        return;
                    }
                }
            }
            2 => {
                // Liquid: diagonals, then spread sideways along the
                // surface.
                for dx in [side, -side] {
                    if self.eval_move(t, cx + dx, cy + 1).0 != crate::movement::MOVE_BLOCKED
                        && self.try_move(i, cx, cy, cx + dx, cy + 1)
                    {
                        self.do_move(i, cx, cy, (cx + dx) as f32, (cy + 1) as f32);
                        return;
                    }
                }
                for w in 1..=30 {
                    for dx in [side * w, -side * w] {
                        let (e, r) = self.eval_move(t, cx + dx, cy);
                        if e != crate::movement::MOVE_BLOCKED && r == 0 {
                            if self.try_move(i, cx, cy, cx + dx, cy) {
                                self.do_move(i, cx, cy, (cx + dx) as f32, cy as f32);
                                return;
                            }
                        }
                        if e == crate::movement::MOVE_BLOCKED && r != 0 {
                            // Hit a bank; stop probing this direction.
                            continue;
                        }
                    }
                }
                if self.water_equal && t == PT_WATR && self.rng.chance(1, 200) {
                    self.equalize_water(i, cx, cy);
                }
            }
            _ => {
                // Gases rely on diffusion; nothing further.
            }
        }
    }

    /// Teleport a blocked water particle to a connected surface cell with
    /// head-room, a bounded version of the classic flood probe.
    fn equalize_water(&mut self, i: usize, x: i32, y: i32) {
        let mut seen = std::collections::HashSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back((x, y));
        seen.insert((x, y));
        let mut visited = 0;
        while let Some((px, py)) = queue.pop_front() {
            visited += 1;
            if visited > 1000 {
                return;
            }
            // A free cell above connected water is a surface spot.
            if self.cfg.in_bounds(px, py - 1)
                && self.pmap_at(px, py - 1) == 0
                && !self.is_wall_blocking(px, py - 1, PT_WATR)
                && (px, py) != (x, y)
            {
                if self.try_move(i, x, y, px, py - 1) {
                    self.do_move(i, x, y, px as f32, (py - 1) as f32);
                }
                return;
            }
            for (nx, ny) in [(px - 1, py), (px + 1, py), (px, py - 1), (px, py + 1)] {
                let r = self.pmap_at(nx, ny);
                if r != 0 && pmap_typ(r) == PT_WATR && seen.insert((nx, ny)) {
                    queue.push_back((nx, ny));
                }
            }
        }
    }

    /// Enforce one-non-energy-particle-per-cell: kill the excess on
    /// overloaded cells and detonate the survivor into embers.
    pub fn check_stacking(&mut self) {
        let mut detonated = 0u32;
        let last = self.parts.last_active_index;
        for i in 0..=last {
            if self.parts.data[i].is_vacant() {
                continue;
            }
            let t = self.parts.data[i].ptype;
            if self.elements.get(t).properties & TYPE_ENERGY != 0 {
                continue;
            }
            let (x, y) = Simulation::part_pos(&self.parts.data[i]);
            if !self.cfg.in_bounds(x, y) {
                continue;
            }
            if self.pmap_count[(x, y)] <= STACKING_THRESHOLD {
                continue;
            }
            let r = self.pmap[(x, y)];
            if r != 0 && pmap_id(r) == i {
                // The survivor turns into explosion products.
                if self.part_change_type(i, x, y, PT_EMBR) {
                    self.parts.data[i].life = 30;
                    self.parts.data[i].temp = 1200.0;
                    self.add_pressure(x, y, 1.0);
                }
                detonated += 1;
            } else {
                self.kill_part(i);
            }
        }
        if detonated > 0 {
            warn!("stacking sweep detonated {detonated} overloaded cells");
            // Counts are stale after mass kills.
            self.elem_recount = true;
        }
    }

    /// The after-sim hook: Game-of-Life second pass, wireless channel
    /// propagation, counters.
    pub fn after_sim(&mut self) {
        if self.frame_count % GOL_SPEED == 0 {
            gol::simulate_gol(self);
        }
        for channel in self.wireless.iter_mut() {
            channel[0] = channel[1];
            channel[1] = 0;
        }
        self.current_tick += 1;
        self.frame_count += 1;

        #[cfg(debug_assertions)]
        self.assert_coherence();
    }

    /// Debug invariant check: pmap/pool linkage, free-list accounting and
    /// element counts.
    #[cfg(debug_assertions)]
    pub fn assert_coherence(&self) {
        let mut live = 0;
        for i in 0..=self.parts.last_active_index {
            let part = &self.parts.data[i];
            if part.is_vacant() {
                continue;
            }
            live += 1;
            let (x, y) = Simulation::part_pos(part);
            if !self.cfg.in_bounds(x, y) {
                panic!("live particle {i} out of bounds at ({x}, {y})");
            }
            let energy = self.elements.is_energy(part.ptype);
            let slot = if energy { self.photons[(x, y)] } else { self.pmap[(x, y)] };
            debug_assert!(
                slot != 0,
                "particle {i} (type {}) has no index slot at ({x}, {y})",
                part.ptype
            );
        }
        debug_assert_eq!(live, self.num_parts, "live count drifted");

        let mut free = 0;
        let mut cursor = self.pfree;
        while cursor != -1 && free <= self.parts.capacity() {
            free += 1;
            cursor = self.parts.data[cursor as usize].life;
        }
        debug_assert_eq!(
            free,
            self.parts.capacity() - self.parts.count_live(),
            "free list does not cover all vacant slots"
        );
        log::trace!(target: "ember::coherence", "tick {} coherent, {} live", self.frame_count, live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::elements::{PT_DUST, PT_STNE};
    use crate::settings::GravityMode;

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn dust_falls_under_vertical_gravity() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        for _ in 0..30 {
            sim.tick();
        }
        let part = sim.parts.data[i];
        assert_eq!(part.ptype, PT_DUST);
        let (_, y) = Simulation::part_pos(&part);
        assert!(y > 60, "dust should have fallen, y = {y}");
    }

    #[test]
    fn dust_rests_on_stone_floor() {
        let mut sim = sim();
        for x in 70..90 {
            sim.create_part(-2, x, 80, PT_STNE);
        }
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        for _ in 0..200 {
            sim.tick();
        }
        let part = sim.parts.data[i];
        assert_eq!(part.ptype, PT_DUST);
        let (_, y) = Simulation::part_pos(&part);
        assert!(y < 80, "dust should rest above the floor, y = {y}");
        assert!(y >= 75, "dust should be near the floor, y = {y}");
    }

    #[test]
    fn gravity_off_keeps_dust_in_place() {
        let mut sim = sim();
        sim.gravity_mode = GravityMode::Off;
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        for _ in 0..50 {
            sim.tick();
        }
        let (x, y) = Simulation::part_pos(&sim.parts.data[i]);
        assert_eq!((x, y), (80, 60));
    }

    #[test]
    fn frame_and_tick_counters_advance() {
        let mut sim = sim();
        sim.tick();
        sim.tick();
        assert_eq!(sim.frame_count, 2);
        assert_eq!(sim.current_tick, 2);
    }

    #[test]
    fn partial_update_covers_the_whole_pool() {
        let mut sim = sim();
        sim.create_part(-2, 80, 60, PT_DUST);
        let half = sim.parts.capacity() / 2;
        sim.tick_up_to(half);
        assert_eq!(sim.frame_count, 0);
        assert_eq!(sim.debug_next_to_update, half);
        sim.tick_up_to(sim.parts.capacity());
        assert_eq!(sim.frame_count, 1);
        assert_eq!(sim.debug_next_to_update, 0);
    }

    #[test]
    fn stacking_sweep_detonates_overloaded_cells() {
        let mut sim = sim();
        // Force seven particles onto one cell via explicit slots.
        for slot in 0..7 {
            let i = sim.create_part(-2, 100 + slot, 60, PT_STNE) as usize;
            sim.parts.data[i].x = 100.0;
            sim.parts.data[i].y = 60.0;
        }
        sim.recalc_free_particles(false);
        assert!(sim.pmap_count[(100, 60)] > STACKING_THRESHOLD);
        sim.check_stacking();
        sim.recalc_free_particles(false);
        assert!(sim.pmap_count[(100, 60)] <= 1);
        assert_eq!(sim.element_count[PT_STNE as usize], 0);
    }
}
