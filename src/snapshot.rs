//! Snapshots and snapshot deltas
//!
//! A `Snapshot` is a frozen deep copy of everything the sim needs to
//! reproduce a state; a `SnapshotDelta` d between snapshots A and B
//! (d = B - A) stores difference spans per grid and sparse particle
//! diffs, so `d.forward(A) = B` and `d.restore(B) = A` are exact. In
//! pathological cases a delta may outgrow both snapshots; that is
//! accepted.

use serde_json::Value;

use crate::gravity::update_gravity_mask;
use crate::parts::Particle;
use crate::plane::Plane;
use crate::random::RngState;
use crate::signs::Sign;
use crate::simulation::Simulation;
use crate::stickman::Stickman;

#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub air_pressure: Plane<f32>,
    pub air_velocity_x: Plane<f32>,
    pub air_velocity_y: Plane<f32>,
    pub ambient_heat: Plane<f32>,

    /// Indices `0..=last_active_index`, vacancies included, so pool
    /// indices survive the round trip.
    pub particles: Vec<Particle>,

    pub grav_mass: Plane<f32>,
    pub grav_force_x: Plane<f32>,
    pub grav_force_y: Plane<f32>,

    pub block_map: Plane<u8>,
    pub elec_map: Plane<u8>,
    pub fan_velocity_x: Plane<f32>,
    pub fan_velocity_y: Plane<f32>,

    pub portal_particles: Vec<Particle>,
    pub wireless_data: Vec<[i32; 2]>,
    /// Fighters first, then player2, then player.
    pub stickmen: Vec<Stickman>,
    pub signs: Vec<Sign>,

    pub frame_count: u64,
    pub rng_state: RngState,

    pub authors: Value,
}

impl Snapshot {
    pub fn from_sim(sim: &Simulation) -> Snapshot {
        let mut stickmen = sim.fighters.data.clone();
        stickmen.push(sim.player2);
        stickmen.push(sim.player);
        Snapshot {
            air_pressure: sim.pv.clone(),
            air_velocity_x: sim.vx.clone(),
            air_velocity_y: sim.vy.clone(),
            ambient_heat: sim.hv.clone(),
            particles: sim.parts.data[..=sim.parts.last_active_index].to_vec(),
            grav_mass: sim.grav_in.mass.clone(),
            grav_force_x: sim.grav_out.forcex.clone(),
            grav_force_y: sim.grav_out.forcey.clone(),
            block_map: sim.bmap.clone(),
            elec_map: sim.emap.clone(),
            fan_velocity_x: sim.fvx.clone(),
            fan_velocity_y: sim.fvy.clone(),
            portal_particles: sim.portalp.clone(),
            wireless_data: sim.wireless.clone(),
            stickmen,
            signs: sim.signs.clone(),
            frame_count: sim.frame_count,
            rng_state: sim.rng.state(),
            authors: sim.authors.clone(),
        }
    }

    pub fn restore_into(&self, sim: &mut Simulation) {
        sim.element_count.fill(0);
        sim.elem_recount = true;
        sim.force_stacking_check = true;
        for part in &mut sim.parts.data {
            part.ptype = 0;
        }
        sim.pv = self.air_pressure.clone();
        sim.vx = self.air_velocity_x.clone();
        sim.vy = self.air_velocity_y.clone();
        sim.hv = self.ambient_heat.clone();
        sim.bmap = self.block_map.clone();
        sim.emap = self.elec_map.clone();
        sim.fvx = self.fan_velocity_x.clone();
        sim.fvy = self.fan_velocity_y.clone();
        sim.air.approximate_block_air_maps(&sim.bmap);
        sim.parts.data[..self.particles.len()].copy_from_slice(&self.particles);
        sim.portalp.copy_from_slice(&self.portal_particles);
        sim.wireless.copy_from_slice(&self.wireless_data);
        let n = self.stickmen.len();
        sim.player = self.stickmen[n - 1];
        sim.player2 = self.stickmen[n - 2];
        sim.fighters.data.copy_from_slice(&self.stickmen[..n - 2]);
        sim.fighters.count = sim.fighters.data.iter().filter(|f| f.spwn).count() as u8;
        sim.grav_in.mass = self.grav_mass.clone();
        sim.grav_out.forcex = self.grav_force_x.clone();
        sim.grav_out.forcey = self.grav_force_y.clone();
        update_gravity_mask(&sim.bmap, &mut sim.gravmask);
        if let Some(grav) = &sim.grav {
            grav.ignore_next_result();
        }
        sim.signs = self.signs.clone();
        sim.frame_count = self.frame_count;
        sim.rng.set_state(self.rng_state);
        sim.authors = self.authors.clone();
        sim.parts.last_active_index = sim.parts.capacity() - 1;
        sim.recalc_free_particles(false);
    }

    /// FNV-1a 32 over the simulation-relevant bytes. Signs and authors
    /// are excluded on purpose (they have no effect on the simulation);
    /// so is the electric map, which is runtime-only spark bookkeeping
    /// that the save codec deliberately does not persist.
    pub fn hash(&self) -> u32 {
        let mut hash: u32 = 2166136261;
        let mut take = |bytes: &[u8]| {
            for &b in bytes {
                hash ^= b as u32;
                hash = hash.wrapping_mul(16777619);
            }
        };
        let mut take_f32_plane = |take: &mut dyn FnMut(&[u8]), plane: &Plane<f32>| {
            for v in plane.data() {
                take(&v.to_bits().to_le_bytes());
            }
        };
        take_f32_plane(&mut take, &self.air_pressure);
        take_f32_plane(&mut take, &self.air_velocity_x);
        take_f32_plane(&mut take, &self.air_velocity_y);
        take_f32_plane(&mut take, &self.ambient_heat);
        for part in &self.particles {
            part.hash_bytes(&mut take);
        }
        take_f32_plane(&mut take, &self.grav_mass);
        take_f32_plane(&mut take, &self.grav_force_x);
        take_f32_plane(&mut take, &self.grav_force_y);
        take(self.block_map.data());
        take_f32_plane(&mut take, &self.fan_velocity_x);
        take_f32_plane(&mut take, &self.fan_velocity_y);
        for part in &self.portal_particles {
            part.hash_bytes(&mut take);
        }
        for w in &self.wireless_data {
            take(&w[0].to_le_bytes());
            take(&w[1].to_le_bytes());
        }
        for sm in &self.stickmen {
            take(&[sm.comm, sm.pcomm, sm.spwn as u8, sm.rocket_boots as u8, sm.fan as u8]);
            take(&sm.elem.to_le_bytes());
            for leg in sm.legs {
                take(&leg.to_bits().to_le_bytes());
            }
            for acc in sm.accs {
                take(&acc.to_bits().to_le_bytes());
            }
            take(&sm.frames.to_le_bytes());
            take(&sm.spawn_id.to_le_bytes());
        }
        take(&self.frame_count.to_le_bytes());
        take(&self.rng_state[0].to_le_bytes());
        take(&self.rng_state[1].to_le_bytes());
        hash
    }

    /// Rough memory footprint, for history budget accounting.
    pub fn byte_size(&self) -> usize {
        let plane_f32 = self.air_pressure.len() * 4 * 7;
        let plane_u8 = self.block_map.len() * 2;
        let particles = (self.particles.len() + self.portal_particles.len())
            * std::mem::size_of::<Particle>();
        let stickmen = self.stickmen.len() * std::mem::size_of::<Stickman>();
        plane_f32 + plane_u8 + particles + stickmen + self.signs.len() * 64
    }
}

/// Run-length difference spans for one sequence of `T`.
#[derive(Clone, Debug, Default, PartialEq)]
struct SpanDelta<T> {
    /// (offset, old values, new values); old and new have equal length.
    spans: Vec<(usize, Vec<T>, Vec<T>)>,
    old_len: usize,
    new_len: usize,
}

impl<T: Clone + Default + PartialEq> SpanDelta<T> {
    fn diff(old: &[T], new: &[T]) -> SpanDelta<T> {
        let len = old.len().max(new.len());
        let default = T::default();
        let at = |slice: &[T], i: usize| slice.get(i).cloned().unwrap_or_else(|| default.clone());
        let mut spans = Vec::new();
        let mut i = 0;
        while i < len {
            if at(old, i) == at(new, i) {
                i += 1;
                continue;
            }
            let start = i;
            let mut old_run = Vec::new();
            let mut new_run = Vec::new();
            while i < len && at(old, i) != at(new, i) {
                old_run.push(at(old, i));
                new_run.push(at(new, i));
                i += 1;
            }
            spans.push((start, old_run, new_run));
        }
        SpanDelta { spans, old_len: old.len(), new_len: new.len() }
    }

    fn apply(&self, data: &mut Vec<T>, forward: bool) {
        let target_len = if forward { self.new_len } else { self.old_len };
        data.resize(target_len, T::default());
        for (offset, old_run, new_run) in &self.spans {
            let run = if forward { new_run } else { old_run };
            for (k, v) in run.iter().enumerate() {
                if offset + k < data.len() {
                    data[offset + k] = v.clone();
                }
            }
        }
    }

    fn byte_size(&self) -> usize {
        self.spans
            .iter()
            .map(|(_, old, new)| (old.len() + new.len()) * std::mem::size_of::<T>() + 16)
            .sum()
    }
}

fn plane_diff<T: Clone + Default + PartialEq>(old: &Plane<T>, new: &Plane<T>) -> SpanDelta<T> {
    SpanDelta::diff(old.data(), new.data())
}

fn plane_apply<T: Clone + Default + PartialEq>(delta: &SpanDelta<T>, plane: &mut Plane<T>, forward: bool) {
    let mut data = plane.data().to_vec();
    delta.apply(&mut data, forward);
    plane.data_mut().clone_from_slice(&data);
}

/// Difference between two snapshots; `forward` turns the older one into
/// the newer, `restore` goes the other way.
#[derive(Clone, Debug, Default)]
pub struct SnapshotDelta {
    air_pressure: SpanDelta<f32>,
    air_velocity_x: SpanDelta<f32>,
    air_velocity_y: SpanDelta<f32>,
    ambient_heat: SpanDelta<f32>,
    particles: SpanDelta<Particle>,
    grav_mass: SpanDelta<f32>,
    grav_force_x: SpanDelta<f32>,
    grav_force_y: SpanDelta<f32>,
    block_map: SpanDelta<u8>,
    elec_map: SpanDelta<u8>,
    fan_velocity_x: SpanDelta<f32>,
    fan_velocity_y: SpanDelta<f32>,
    portal_particles: SpanDelta<Particle>,
    wireless_data: SpanDelta<[i32; 2]>,
    /// Full replacement pairs, present only when the values changed.
    stickmen: Option<(Vec<Stickman>, Vec<Stickman>)>,
    signs: Option<(Vec<Sign>, Vec<Sign>)>,
    frame_count_old: u64,
    frame_count_new: u64,
    rng_state_old: RngState,
    rng_state_new: RngState,
    authors_old: Value,
    authors_new: Value,
}

impl SnapshotDelta {
    pub fn diff(old: &Snapshot, new: &Snapshot) -> SnapshotDelta {
        SnapshotDelta {
            air_pressure: plane_diff(&old.air_pressure, &new.air_pressure),
            air_velocity_x: plane_diff(&old.air_velocity_x, &new.air_velocity_x),
            air_velocity_y: plane_diff(&old.air_velocity_y, &new.air_velocity_y),
            ambient_heat: plane_diff(&old.ambient_heat, &new.ambient_heat),
            particles: SpanDelta::diff(&old.particles, &new.particles),
            grav_mass: plane_diff(&old.grav_mass, &new.grav_mass),
            grav_force_x: plane_diff(&old.grav_force_x, &new.grav_force_x),
            grav_force_y: plane_diff(&old.grav_force_y, &new.grav_force_y),
            block_map: plane_diff(&old.block_map, &new.block_map),
            elec_map: plane_diff(&old.elec_map, &new.elec_map),
            fan_velocity_x: plane_diff(&old.fan_velocity_x, &new.fan_velocity_x),
            fan_velocity_y: plane_diff(&old.fan_velocity_y, &new.fan_velocity_y),
            portal_particles: SpanDelta::diff(&old.portal_particles, &new.portal_particles),
            wireless_data: SpanDelta::diff(&old.wireless_data, &new.wireless_data),
            stickmen: (old.stickmen != new.stickmen)
                .then(|| (old.stickmen.clone(), new.stickmen.clone())),
            signs: (old.signs != new.signs).then(|| (old.signs.clone(), new.signs.clone())),
            frame_count_old: old.frame_count,
            frame_count_new: new.frame_count,
            rng_state_old: old.rng_state,
            rng_state_new: new.rng_state,
            authors_old: old.authors.clone(),
            authors_new: new.authors.clone(),
        }
    }

    fn shift(&self, base: &Snapshot, forward: bool) -> Snapshot {
        let mut out = base.clone();
        plane_apply(&self.air_pressure, &mut out.air_pressure, forward);
        plane_apply(&self.air_velocity_x, &mut out.air_velocity_x, forward);
        plane_apply(&self.air_velocity_y, &mut out.air_velocity_y, forward);
        plane_apply(&self.ambient_heat, &mut out.ambient_heat, forward);
        self.particles.apply(&mut out.particles, forward);
        plane_apply(&self.grav_mass, &mut out.grav_mass, forward);
        plane_apply(&self.grav_force_x, &mut out.grav_force_x, forward);
        plane_apply(&self.grav_force_y, &mut out.grav_force_y, forward);
        plane_apply(&self.block_map, &mut out.block_map, forward);
        plane_apply(&self.elec_map, &mut out.elec_map, forward);
        plane_apply(&self.fan_velocity_x, &mut out.fan_velocity_x, forward);
        plane_apply(&self.fan_velocity_y, &mut out.fan_velocity_y, forward);
        self.portal_particles.apply(&mut out.portal_particles, forward);
        self.wireless_data.apply(&mut out.wireless_data, forward);
        if let Some((old, new)) = &self.stickmen {
            out.stickmen = if forward { new.clone() } else { old.clone() };
        }
        if let Some((old, new)) = &self.signs {
            out.signs = if forward { new.clone() } else { old.clone() };
        }
        if forward {
            out.frame_count = self.frame_count_new;
            out.rng_state = self.rng_state_new;
            out.authors = self.authors_new.clone();
        } else {
            out.frame_count = self.frame_count_old;
            out.rng_state = self.rng_state_old;
            out.authors = self.authors_old.clone();
        }
        out
    }

    /// `B = A + d`
    pub fn forward(&self, old: &Snapshot) -> Snapshot {
        self.shift(old, true)
    }

    /// `A = B - d`
    pub fn restore(&self, new: &Snapshot) -> Snapshot {
        self.shift(new, false)
    }

    pub fn byte_size(&self) -> usize {
        self.air_pressure.byte_size()
            + self.air_velocity_x.byte_size()
            + self.air_velocity_y.byte_size()
            + self.ambient_heat.byte_size()
            + self.particles.byte_size()
            + self.grav_mass.byte_size()
            + self.grav_force_x.byte_size()
            + self.grav_force_y.byte_size()
            + self.block_map.byte_size()
            + self.elec_map.byte_size()
            + self.fan_velocity_x.byte_size()
            + self.fan_velocity_y.byte_size()
            + self.portal_particles.byte_size()
            + self.wireless_data.byte_size()
            + self
                .stickmen
                .as_ref()
                .map_or(0, |(o, n)| (o.len() + n.len()) * std::mem::size_of::<Stickman>())
            + self.signs.as_ref().map_or(0, |(o, n)| (o.len() + n.len()) * 64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::elements::{PT_DUST, PT_WATR};

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn snapshot_restore_round_trips_hash() {
        let mut sim = sim();
        sim.create_part(-2, 80, 60, PT_DUST);
        sim.create_part(-2, 90, 60, PT_WATR);
        for _ in 0..10 {
            sim.tick();
        }
        let snap = Snapshot::from_sim(&sim);
        for _ in 0..10 {
            sim.tick();
        }
        assert_ne!(Snapshot::from_sim(&sim).hash(), snap.hash());
        snap.restore_into(&mut sim);
        let back = Snapshot::from_sim(&sim);
        assert_eq!(back.hash(), snap.hash());
        assert_eq!(back, snap);
    }

    #[test]
    fn delta_round_trip_is_exact() {
        let mut sim = sim();
        sim.create_part(-2, 80, 60, PT_DUST);
        let a = Snapshot::from_sim(&sim);
        sim.tick();
        sim.create_part(-2, 90, 60, PT_WATR);
        let b = Snapshot::from_sim(&sim);

        let d = SnapshotDelta::diff(&a, &b);
        assert_eq!(d.forward(&a).hash(), b.hash());
        assert_eq!(d.restore(&b).hash(), a.hash());
        assert_eq!(d.forward(&a), b);
        assert_eq!(d.restore(&b), a);
    }

    #[test]
    fn identical_snapshots_produce_an_empty_delta() {
        let mut sim = sim();
        sim.create_part(-2, 80, 60, PT_DUST);
        let a = Snapshot::from_sim(&sim);
        let b = Snapshot::from_sim(&sim);
        let d = SnapshotDelta::diff(&a, &b);
        assert_eq!(d.byte_size(), 0);
    }

    #[test]
    fn restore_rebuilds_pmap_linkage() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        let snap = Snapshot::from_sim(&sim);
        sim.clear_sim();
        assert_eq!(sim.pmap[(80, 60)], 0);
        snap.restore_into(&mut sim);
        assert_eq!(crate::parts::pmap_id(sim.pmap[(80, 60)]), i);
        assert_eq!(sim.element_count[PT_DUST as usize], 1);
        assert_eq!(sim.num_parts, 1);
    }
}
