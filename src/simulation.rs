//! Simulation - owns all grid state and the particle pool
//!
//! The struct is deliberately flat: every field grid, the pool, the index
//! grids and the scenario flags live here, sized once from `FullConfig`
//! and never reallocated. The per-tick pipeline lives in `update`,
//! movement rules in `movement`, editing in `editing`; they all extend
//! `Simulation` with further `impl` blocks so this file stays focused on
//! state and the §4.A pool primitives.

use std::sync::Arc;

use log::debug;

use crate::air::Air;
use crate::config::{CheckFailed, FullConfig, SimulationConfig, CHANNELS, MAX_PRESSURE, MIN_PRESSURE};
use crate::elements::{
    ElementRegistry, PT_FIGH, PT_NONE, PT_SPRK, PT_STKM, PT_STKM2, PROP_CONDUCTS,
};
use crate::gravity::{self, GravityInput, GravityOutput, GravityThread};
use crate::parts::{pmap_id, pmap_pack, pmap_typ, Particle, Parts};
use crate::plane::Plane;
use crate::random::SimRng;
use crate::settings::{DecoSpace, EdgeMode, GravityMode, SimulationSettings};
use crate::signs::Sign;
use crate::stickman::{Fighters, Stickman};
use crate::walls::{wall_blocks, WL_EHOLE, WL_EWALL};

/// Portal buffer depth per (channel, phase).
pub const PORTAL_SLOTS: usize = 80;
/// Portal phases (frames of delay inside a portal).
pub const PORTAL_PHASES: usize = 8;

/// The subset of simulation state the renderer needs to paint one frame.
/// The renderer thread works off a private copy of this; it never sees
/// `pmap`/`photons` or any other sim-thread-owned index.
#[derive(Clone)]
pub struct RenderableSimulation {
    pub cfg: FullConfig,
    pub elements: Arc<ElementRegistry>,
    pub signs: Vec<Sign>,
    pub current_tick: i32,
    pub frame_count: u64,
    pub player: Stickman,
    pub player2: Stickman,
    pub fighters: Fighters,
    pub vx: Plane<f32>,
    pub vy: Plane<f32>,
    pub pv: Plane<f32>,
    pub hv: Plane<f32>,
    pub bmap: Plane<u8>,
    pub emap: Plane<u8>,
    pub parts: Parts,
    pub aheat_enable: bool,
    pub grav_in: GravityInput,
    pub grav_out: GravityOutput,
    /// Scripting callbacks are never run from the renderer thread.
    pub use_script_callbacks: bool,
}

/// Values sampled under one pixel, for HUD display and sign templates.
#[derive(Clone, Debug, Default)]
pub struct SimulationSample {
    pub position: (i32, i32),
    pub particle: Option<Particle>,
    pub particle_id: Option<usize>,
    pub wall_type: u8,
    pub air_pressure: f32,
    pub air_temperature: f32,
    pub air_velocity: (f32, f32),
    pub gravity_force: (f32, f32),
    pub num_parts: i32,
    pub is_mouse_in_sim: bool,
}

pub struct Simulation {
    pub cfg: FullConfig,
    pub elements: Arc<ElementRegistry>,
    pub rng: SimRng,

    pub parts: Parts,
    pub pmap: Plane<u32>,
    pub photons: Plane<u32>,
    /// Per-cell non-energy occupancy, rebuilt by the stacking sweep.
    pub pmap_count: Plane<u32>,

    pub pv: Plane<f32>,
    pub vx: Plane<f32>,
    pub vy: Plane<f32>,
    pub hv: Plane<f32>,
    pub fvx: Plane<f32>,
    pub fvy: Plane<f32>,
    pub bmap: Plane<u8>,
    pub emap: Plane<u8>,
    pub air: Air,

    pub grav: Option<GravityThread>,
    pub grav_in: GravityInput,
    pub grav_out: GravityOutput,
    pub gravmask: Plane<u32>,
    pub grav_wall_changed: bool,

    pub signs: Vec<Sign>,
    pub portalp: Vec<Particle>,
    pub wireless: Vec<[i32; 2]>,

    pub player: Stickman,
    pub player2: Stickman,
    pub fighters: Fighters,

    pub element_count: Vec<i32>,
    pub elem_recount: bool,
    pub pfree: i32,
    pub num_parts: i32,

    pub current_tick: i32,
    pub frame_count: u64,
    pub iswire: i32,
    pub force_stacking_check: bool,
    pub lightning_recreate: i32,
    pub debug_next_to_update: usize,

    pub edge_mode: EdgeMode,
    pub gravity_mode: GravityMode,
    pub legacy_enable: bool,
    pub water_equal: bool,
    pub aheat_enable: bool,
    pub deco_space: DecoSpace,
    pub ensure_determinism: bool,

    pub sys_pause: bool,
    /// Number of single frames still to run while paused.
    pub framerender: i32,

    pub replace_mode_selected: i32,
    pub replace_mode_flags: u32,

    /// Free-form authorship metadata carried through snapshots and saves.
    pub authors: serde_json::Value,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self, CheckFailed> {
        config.check()?;
        let cfg = FullConfig::new(config);
        let settings = SimulationSettings::default();
        let mut sim = Simulation {
            elements: Arc::new(ElementRegistry::new(cfg.cfds)),
            rng: SimRng::new(0x5eed),
            parts: Parts::new(cfg.npart),
            pmap: Plane::new(cfg.xres, cfg.yres),
            photons: Plane::new(cfg.xres, cfg.yres),
            pmap_count: Plane::new(cfg.xres, cfg.yres),
            pv: Plane::new(cfg.xcells, cfg.ycells),
            vx: Plane::new(cfg.xcells, cfg.ycells),
            vy: Plane::new(cfg.xcells, cfg.ycells),
            hv: Plane::filled(cfg.xcells, cfg.ycells, settings.ambient_air_temp),
            fvx: Plane::new(cfg.xcells, cfg.ycells),
            fvy: Plane::new(cfg.xcells, cfg.ycells),
            bmap: Plane::new(cfg.xcells, cfg.ycells),
            emap: Plane::new(cfg.xcells, cfg.ycells),
            air: Air::new(&cfg, settings.ambient_air_temp),
            grav: None,
            grav_in: GravityInput::new(&cfg),
            grav_out: GravityOutput::new(&cfg),
            gravmask: Plane::filled(cfg.xcells, cfg.ycells, 0xFFFF_FFFFu32),
            grav_wall_changed: false,
            signs: Vec::new(),
            portalp: vec![Particle::default(); CHANNELS * PORTAL_PHASES * PORTAL_SLOTS],
            wireless: vec![[0; 2]; CHANNELS],
            player: Stickman::default(),
            player2: Stickman::default(),
            fighters: Fighters::default(),
            element_count: vec![0; crate::parts::PT_NUM],
            elem_recount: false,
            pfree: -1,
            num_parts: 0,
            current_tick: 0,
            frame_count: 0,
            iswire: 0,
            force_stacking_check: false,
            lightning_recreate: 0,
            debug_next_to_update: 0,
            edge_mode: settings.edge_mode,
            gravity_mode: settings.gravity_mode,
            legacy_enable: settings.legacy_heat,
            water_equal: settings.water_equalization,
            aheat_enable: settings.ambient_heat,
            deco_space: settings.deco_space,
            ensure_determinism: false,
            sys_pause: false,
            framerender: 0,
            replace_mode_selected: 0,
            replace_mode_flags: 0,
            authors: serde_json::Value::Null,
            cfg,
        };
        sim.clear_sim();
        debug!(
            "simulation created: {}x{} px, {} cells, {} particle capacity",
            cfg.xres, cfg.yres, cfg.ncell, cfg.npart
        );
        Ok(sim)
    }

    /// Reset everything except the element registry and configuration.
    pub fn clear_sim(&mut self) {
        for part in &mut self.parts.data {
            *part = Particle::default();
        }
        self.pfree = self.parts.rebuild_free_list();
        self.parts.last_active_index = 0;
        self.pmap.fill(0);
        self.photons.fill(0);
        self.pmap_count.fill(0);
        self.pv.fill(0.0);
        self.vx.fill(0.0);
        self.vy.fill(0.0);
        self.hv.fill(self.air.ambient_air_temp);
        self.fvx.fill(0.0);
        self.fvy.fill(0.0);
        self.bmap.fill(0);
        self.emap.fill(0);
        self.air.approximate_block_air_maps(&self.bmap);
        self.grav_in.mass.fill(0.0);
        self.grav_out.clear();
        self.gravmask.fill(0xFFFF_FFFF);
        if let Some(grav) = &self.grav {
            grav.ignore_next_result();
        }
        self.signs.clear();
        self.portalp.fill(Particle::default());
        self.wireless.fill([0; 2]);
        self.player = Stickman::default();
        self.player2 = Stickman::default();
        self.fighters = Fighters::default();
        self.element_count.fill(0);
        self.elem_recount = false;
        self.num_parts = 0;
        self.current_tick = 0;
        self.frame_count = 0;
        self.iswire = 0;
        self.force_stacking_check = false;
        self.lightning_recreate = 0;
        self.debug_next_to_update = 0;
        self.authors = serde_json::Value::Null;
    }

    // === Settings ===

    pub fn apply_settings(&mut self, settings: &SimulationSettings) {
        self.edge_mode = settings.edge_mode;
        self.gravity_mode = settings.gravity_mode;
        self.air.air_mode = settings.air_mode;
        self.air.ambient_air_temp = settings
            .ambient_air_temp
            .clamp(crate::config::MIN_TEMP, crate::config::MAX_TEMP);
        self.legacy_enable = settings.legacy_heat;
        self.water_equal = settings.water_equalization;
        self.aheat_enable = settings.ambient_heat;
        self.deco_space = settings.deco_space;
        self.enable_newtonian_gravity(settings.newtonian_gravity);
    }

    pub fn current_settings(&self) -> SimulationSettings {
        SimulationSettings {
            edge_mode: self.edge_mode,
            gravity_mode: self.gravity_mode,
            air_mode: self.air.air_mode,
            ambient_air_temp: self.air.ambient_air_temp,
            legacy_heat: self.legacy_enable,
            newtonian_gravity: self.grav.is_some(),
            ambient_heat: self.aheat_enable,
            water_equalization: self.water_equal,
            deco_space: self.deco_space,
        }
    }

    pub fn enable_newtonian_gravity(&mut self, enable: bool) {
        match (enable, self.grav.is_some()) {
            (true, false) => {
                self.grav = Some(GravityThread::start(&self.cfg));
                gravity::update_gravity_mask(&self.bmap, &mut self.gravmask);
            }
            (false, true) => {
                self.grav = None;
                self.grav_in.mass.fill(0.0);
                self.grav_out.clear();
            }
            _ => {}
        }
    }

    pub fn set_edge_mode(&mut self, edge_mode: EdgeMode) {
        self.edge_mode = edge_mode;
    }

    pub fn set_deco_space(&mut self, deco_space: DecoSpace) {
        self.deco_space = deco_space;
    }

    // === Index helpers ===

    #[inline]
    pub fn pmap_at(&self, x: i32, y: i32) -> u32 {
        self.pmap.get(x, y).copied().unwrap_or(0)
    }

    #[inline]
    pub fn photons_at(&self, x: i32, y: i32) -> u32 {
        self.photons.get(x, y).copied().unwrap_or(0)
    }

    /// Pixel position of a particle, rounded the way the index grids are
    /// maintained.
    #[inline]
    pub fn part_pos(part: &Particle) -> (i32, i32) {
        ((part.x + 0.5).floor() as i32, (part.y + 0.5).floor() as i32)
    }

    #[inline]
    pub fn cell_of(&self, x: i32, y: i32) -> (i32, i32) {
        (x / self.cfg.cell, y / self.cfg.cell)
    }

    pub fn add_pressure(&mut self, x: i32, y: i32, dp: f32) {
        let (cx, cy) = self.cell_of(x, y);
        if let Some(pv) = self.pv.get_mut(cx, cy) {
            *pv = (*pv + dp).clamp(MIN_PRESSURE, MAX_PRESSURE);
        }
    }

    /// Is the wall under pixel (x, y) impassable for element `t`?
    pub fn is_wall_blocking(&self, x: i32, y: i32, t: i32) -> bool {
        let (cx, cy) = self.cell_of(x, y);
        let wall = match self.bmap.get(cx, cy) {
            Some(&wall) => wall,
            None => return true,
        };
        let emap_on = self.emap[(cx, cy)] != 0;
        wall_blocks(&self.elements, wall, t, emap_on)
    }

    // === Pool primitives (§4.A) ===

    fn alloc_slot(&mut self) -> i32 {
        if self.pfree == -1 {
            return -1;
        }
        let i = self.pfree as usize;
        self.pfree = self.parts.data[i].life;
        i as i32
    }

    /// Remove slot `i` from the free list, wherever it sits. Only needed
    /// for explicit-slot creation into a vacant slot.
    fn unlink_free_slot(&mut self, i: usize) {
        if self.pfree == i as i32 {
            self.pfree = self.parts.data[i].life;
            return;
        }
        let mut cursor = self.pfree;
        while cursor != -1 {
            let next = self.parts.data[cursor as usize].life;
            if next == i as i32 {
                self.parts.data[cursor as usize].life = self.parts.data[i].life;
                return;
            }
            cursor = next;
        }
    }

    pub fn create_part(&mut self, p: i32, x: i32, y: i32, t: i32) -> i32 {
        self.create_part_v(p, x, y, t, -1)
    }

    /// Create (or spark) a particle. `p == -2` picks a free slot, `p == -1`
    /// reuses the particle at (x, y), `p >= 0` overwrites slot `p`.
    /// Returns the slot index or -1.
    pub fn create_part_v(&mut self, p: i32, x: i32, y: i32, t: i32, v: i32) -> i32 {
        if !self.cfg.in_bounds(x, y) {
            return -1;
        }

        // Creating SPRK means sparking whatever conductor sits there.
        if t == PT_SPRK {
            let r = self.pmap[(x, y)];
            if r == 0 {
                return -1;
            }
            let id = pmap_id(r);
            let rt = pmap_typ(r);
            if rt == PT_SPRK
                || self.elements.get(rt).properties & PROP_CONDUCTS == 0
                || self.parts.data[id].life != 0
            {
                return -1;
            }
            self.spark_particle(id, x, y);
            return id as i32;
        }

        if !self.elements.valid(t) {
            return -1;
        }
        let energy = self.elements.is_energy(t);

        let i = match p {
            -2 => {
                let occupied = if energy {
                    self.photons[(x, y)] != 0
                } else {
                    self.pmap[(x, y)] != 0
                };
                if occupied || self.is_wall_blocking(x, y, t) {
                    return -1;
                }
                self.alloc_slot()
            }
            -1 => {
                let r = if self.photons[(x, y)] != 0 {
                    self.photons[(x, y)]
                } else {
                    self.pmap[(x, y)]
                };
                if r != 0 {
                    self.kill_part(pmap_id(r));
                } else if self.is_wall_blocking(x, y, t) {
                    return -1;
                }
                self.alloc_slot()
            }
            p if p >= 0 && (p as usize) < self.parts.capacity() => {
                let i = p as usize;
                if self.parts.data[i].is_vacant() {
                    self.unlink_free_slot(i);
                } else {
                    self.kill_part(i);
                    // kill_part put the slot at the head of the free list
                    self.pfree = self.parts.data[i].life;
                }
                i as i32
            }
            _ => return -1,
        };
        if i < 0 {
            return -1;
        }
        let i = i as usize;

        if let Some(allowed) = self.elements.get(t).create_allowed {
            if !allowed(self, i as i32, x, y, t) {
                // Slot goes straight back.
                self.parts.data[i] = Particle::default();
                self.parts.data[i].life = self.pfree;
                self.pfree = i as i32;
                return -1;
            }
        }

        let mut part = self.elements.get(t).default_properties;
        part.ptype = t;
        part.x = x as f32;
        part.y = y as f32;
        self.parts.data[i] = part;
        if i > self.parts.last_active_index {
            self.parts.last_active_index = i;
        }
        if energy {
            self.photons[(x, y)] = pmap_pack(i, t);
        } else {
            self.pmap[(x, y)] = pmap_pack(i, t);
        }
        self.element_count[t as usize] += 1;
        self.num_parts += 1;

        if let Some(create) = self.elements.get(t).create {
            create(self, i, x, y, t, v);
        }
        i as i32
    }

    /// Convert conductor `id` into a live spark carrying its old type.
    pub fn spark_particle(&mut self, id: usize, x: i32, y: i32) {
        let old = self.parts.data[id].ptype;
        self.parts.data[id].ctype = old;
        self.parts.data[id].life = 4;
        self.element_count[old as usize] -= 1;
        self.element_count[PT_SPRK as usize] += 1;
        self.parts.data[id].ptype = PT_SPRK;
        if self.cfg.in_bounds(x, y) {
            self.pmap[(x, y)] = pmap_pack(id, PT_SPRK);
        }
        let (cx, cy) = self.cell_of(x, y);
        self.set_emap(cx, cy);
    }

    pub fn kill_part(&mut self, i: usize) {
        let part = self.parts.data[i];
        if part.ptype <= 0 {
            return;
        }
        let (x, y) = Self::part_pos(&part);
        if self.cfg.in_bounds(x, y) {
            if self.pmap[(x, y)] != 0 && pmap_id(self.pmap[(x, y)]) == i {
                self.pmap[(x, y)] = 0;
            }
            if self.photons[(x, y)] != 0 && pmap_id(self.photons[(x, y)]) == i {
                self.photons[(x, y)] = 0;
            }
        }
        match part.ptype {
            PT_STKM => self.player.despawn(),
            PT_STKM2 => self.player2.despawn(),
            PT_FIGH => self.fighters.free(part.tmp2 as usize),
            _ => {}
        }
        if (part.ptype as usize) < self.element_count.len() {
            self.element_count[part.ptype as usize] -= 1;
        }
        self.num_parts -= 1;
        self.parts.data[i] = Particle::default();
        self.parts.data[i].life = self.pfree;
        self.pfree = i as i32;
    }

    /// Kill whatever occupies pixel (x, y), photons first.
    pub fn delete_part(&mut self, x: i32, y: i32) {
        if !self.cfg.in_bounds(x, y) {
            return;
        }
        let r = if self.photons[(x, y)] != 0 {
            self.photons[(x, y)]
        } else {
            self.pmap[(x, y)]
        };
        if r != 0 {
            self.kill_part(pmap_id(r));
        }
    }

    /// Change particle `i` to type `t`, enforcing `create_allowed` and
    /// `change_type` callbacks and retagging the index grids atomically.
    /// Returns false if the change was forbidden (the particle is then
    /// destroyed by convention).
    pub fn part_change_type(&mut self, i: usize, x: i32, y: i32, t: i32) -> bool {
        let old = self.parts.data[i].ptype;
        if old == 0 || !self.cfg.in_bounds(x, y) {
            return false;
        }
        if t == old {
            return true;
        }
        if t == PT_NONE {
            self.kill_part(i);
            return true;
        }
        if !self.elements.valid(t) {
            self.kill_part(i);
            return false;
        }
        if let Some(allowed) = self.elements.get(t).create_allowed {
            if !allowed(self, i as i32, x, y, t) {
                self.kill_part(i);
                return false;
            }
        }
        if let Some(change_type) = self.elements.get(old).change_type {
            change_type(self, i, x, y, old, t);
        }

        let was_energy = self.elements.is_energy(old);
        let now_energy = self.elements.is_energy(t);
        self.element_count[old as usize] -= 1;
        self.element_count[t as usize] += 1;
        self.parts.data[i].ptype = t;
        if was_energy {
            if self.photons[(x, y)] != 0 && pmap_id(self.photons[(x, y)]) == i {
                self.photons[(x, y)] = 0;
            }
        } else if self.pmap[(x, y)] != 0 && pmap_id(self.pmap[(x, y)]) == i {
            self.pmap[(x, y)] = 0;
        }
        if now_energy {
            self.photons[(x, y)] = pmap_pack(i, t);
        } else {
            self.pmap[(x, y)] = pmap_pack(i, t);
        }
        true
    }

    // === Electric map ===

    /// Mark cell (cx, cy) freshly sparked and energize any connected
    /// e-wall region.
    pub fn set_emap(&mut self, cx: i32, cy: i32) {
        if !self.cfg.cell_in_bounds(cx, cy) {
            return;
        }
        self.emap[(cx, cy)] = 16;
        let wall = self.bmap[(cx, cy)];
        if wall == WL_EWALL || wall == WL_EHOLE {
            // Flood through the connected e-wall region.
            let mut stack = vec![(cx, cy)];
            while let Some((x, y)) = stack.pop() {
                for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
                    if self.cfg.cell_in_bounds(nx, ny)
                        && (self.bmap[(nx, ny)] == WL_EWALL || self.bmap[(nx, ny)] == WL_EHOLE)
                        && self.emap[(nx, ny)] < 16
                    {
                        self.emap[(nx, ny)] = 16;
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }

    /// Does cell (cx, cy) contain conductive matter?
    pub fn is_wire(&self, cx: i32, cy: i32) -> bool {
        if !self.cfg.cell_in_bounds(cx, cy) {
            return false;
        }
        if self.bmap[(cx, cy)] == crate::walls::WL_WALLELEC {
            return true;
        }
        for py in cy * self.cfg.cell..(cy + 1) * self.cfg.cell {
            for px in cx * self.cfg.cell..(cx + 1) * self.cfg.cell {
                let r = self.pmap_at(px, py);
                if r != 0 {
                    let t = pmap_typ(r);
                    if t == PT_SPRK || self.elements.get(t).properties & PROP_CONDUCTS != 0 {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// A wire cell whose spark marker has fully decayed.
    pub fn is_wire_off(&self, cx: i32, cy: i32) -> bool {
        self.is_wire(cx, cy) && self.cfg.cell_in_bounds(cx, cy) && self.emap[(cx, cy)] == 0
    }

    // === Gravity coupling ===

    /// Per-particle gravity at pixel (x, y): `pt_grav` scales the ambient
    /// mode, `newton_grav` scales the Newtonian field.
    pub fn get_gravity_field(&self, x: i32, y: i32, pt_grav: f32, newton_grav: f32) -> (f32, f32) {
        let (mut gx, mut gy) = match self.gravity_mode {
            GravityMode::Vertical => (0.0, pt_grav),
            GravityMode::Off => (0.0, 0.0),
            GravityMode::Radial => {
                let dx = (self.cfg.xcntr - x) as f32;
                let dy = (self.cfg.ycntr - y) as f32;
                let d = (dx * dx + dy * dy).sqrt();
                if d > 0.0 {
                    (pt_grav * dx / d, pt_grav * dy / d)
                } else {
                    (0.0, 0.0)
                }
            }
            GravityMode::Custom { gx, gy } => (pt_grav * gx, pt_grav * gy),
        };
        if self.grav.is_some() {
            let (cx, cy) = self.cell_of(x, y);
            if self.cfg.cell_in_bounds(cx, cy) {
                gx += newton_grav * self.grav_out.forcex[(cx, cy)];
                gy += newton_grav * self.grav_out.forcey[(cx, cy)];
            }
        }
        (gx, gy)
    }

    // === Portals and wireless ===

    #[inline]
    fn portal_base(channel: usize, phase: usize) -> usize {
        (channel * PORTAL_PHASES + phase) * PORTAL_SLOTS
    }

    /// Wireless/portal channel derived from a particle temperature.
    pub fn temp_to_channel(temp: f32) -> usize {
        (((temp - 73.15) / 100.0 + 1.0) as i32).clamp(0, CHANNELS as i32 - 1) as usize
    }

    pub fn portal_store(&mut self, channel: usize, phase: usize, part: Particle) -> bool {
        let base = Self::portal_base(channel % CHANNELS, phase % PORTAL_PHASES);
        for slot in 0..PORTAL_SLOTS {
            if self.portalp[base + slot].is_vacant() {
                self.portalp[base + slot] = part;
                return true;
            }
        }
        false
    }

    pub fn portal_take(&mut self, channel: usize, phase: usize) -> Option<Particle> {
        let base = Self::portal_base(channel % CHANNELS, phase % PORTAL_PHASES);
        for slot in 0..PORTAL_SLOTS {
            if !self.portalp[base + slot].is_vacant() {
                let part = self.portalp[base + slot];
                self.portalp[base + slot] = Particle::default();
                return Some(part);
            }
        }
        None
    }

    // === Views and samples ===

    /// Deep-copy the renderer's view of the current state.
    pub fn renderable(&self) -> RenderableSimulation {
        let active = self.parts.last_active_index.min(self.parts.capacity() - 1);
        RenderableSimulation {
            cfg: self.cfg,
            elements: Arc::clone(&self.elements),
            signs: self.signs.clone(),
            current_tick: self.current_tick,
            frame_count: self.frame_count,
            player: self.player,
            player2: self.player2,
            fighters: self.fighters.clone(),
            vx: self.vx.clone(),
            vy: self.vy.clone(),
            pv: self.pv.clone(),
            hv: self.hv.clone(),
            bmap: self.bmap.clone(),
            emap: self.emap.clone(),
            parts: Parts {
                data: self.parts.data[..=active].to_vec(),
                last_active_index: active,
            },
            aheat_enable: self.aheat_enable,
            grav_in: self.grav_in.clone(),
            grav_out: self.grav_out.clone(),
            use_script_callbacks: false,
        }
    }

    pub fn get_sample(&self, x: i32, y: i32) -> SimulationSample {
        let mut sample = SimulationSample {
            position: (x, y),
            num_parts: self.num_parts,
            is_mouse_in_sim: self.cfg.in_bounds(x, y),
            ..SimulationSample::default()
        };
        if !sample.is_mouse_in_sim {
            return sample;
        }
        let r = if self.photons[(x, y)] != 0 {
            self.photons[(x, y)]
        } else {
            self.pmap[(x, y)]
        };
        if r != 0 {
            sample.particle = Some(self.parts.data[pmap_id(r)]);
            sample.particle_id = Some(pmap_id(r));
        }
        let (cx, cy) = self.cell_of(x, y);
        sample.wall_type = self.bmap[(cx, cy)];
        sample.air_pressure = self.pv[(cx, cy)];
        sample.air_temperature = self.hv[(cx, cy)];
        sample.air_velocity = (self.vx[(cx, cy)], self.vy[(cx, cy)]);
        if self.grav.is_some() {
            sample.gravity_force = (self.grav_out.forcex[(cx, cy)], self.grav_out.forcey[(cx, cy)]);
        }
        sample
    }

    pub fn max_parts_reached(&self) -> bool {
        self.pfree == -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{PT_DUST, PT_METL, PT_PHOT, PT_WATR};

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn create_part_links_pmap() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST);
        assert!(i >= 0);
        let slot = sim.pmap[(80, 60)];
        assert_eq!(pmap_typ(slot), PT_DUST);
        assert_eq!(pmap_id(slot), i as usize);
        assert_eq!(sim.element_count[PT_DUST as usize], 1);
        assert_eq!(sim.num_parts, 1);
    }

    #[test]
    fn energy_particles_live_in_photons() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_PHOT);
        assert!(i >= 0);
        assert_eq!(sim.pmap[(80, 60)], 0);
        assert_eq!(pmap_typ(sim.photons[(80, 60)]), PT_PHOT);
        // An energy particle shares the cell with a non-energy one.
        let j = sim.create_part(-2, 80, 60, PT_DUST);
        assert!(j >= 0);
    }

    #[test]
    fn create_part_refuses_occupied_cells() {
        let mut sim = sim();
        assert!(sim.create_part(-2, 80, 60, PT_DUST) >= 0);
        assert_eq!(sim.create_part(-2, 80, 60, PT_WATR), -1);
    }

    #[test]
    fn hint_minus_one_replaces_in_place() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST);
        let j = sim.create_part(-1, 80, 60, PT_WATR);
        assert_eq!(i, j);
        assert_eq!(sim.parts.data[j as usize].ptype, PT_WATR);
        assert_eq!(sim.element_count[PT_DUST as usize], 0);
        assert_eq!(sim.element_count[PT_WATR as usize], 1);
    }

    #[test]
    fn kill_part_returns_slot_to_free_list() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST);
        sim.kill_part(i as usize);
        assert_eq!(sim.pmap[(80, 60)], 0);
        assert_eq!(sim.num_parts, 0);
        assert_eq!(sim.pfree, i);
        let j = sim.create_part(-2, 81, 60, PT_DUST);
        assert_eq!(i, j);
    }

    #[test]
    fn sparking_a_conductor_preserves_its_type_in_ctype() {
        let mut sim = sim();
        let i = sim.create_part(-2, 100, 100, PT_METL);
        let s = sim.create_part(-2, 100, 100, PT_SPRK);
        assert_eq!(i, s);
        let part = sim.parts.data[i as usize];
        assert_eq!(part.ptype, PT_SPRK);
        assert_eq!(part.ctype, PT_METL);
        assert_eq!(part.life, 4);
        let (cx, cy) = sim.cell_of(100, 100);
        assert_ne!(sim.emap[(cx, cy)], 0);
    }

    #[test]
    fn part_change_type_moves_between_index_grids() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        assert!(sim.part_change_type(i, 80, 60, PT_PHOT));
        assert_eq!(sim.pmap[(80, 60)], 0);
        assert_eq!(pmap_typ(sim.photons[(80, 60)]), PT_PHOT);
        assert_eq!(sim.element_count[PT_DUST as usize], 0);
        assert_eq!(sim.element_count[PT_PHOT as usize], 1);
    }

    #[test]
    fn clear_sim_resets_pool_and_counts() {
        let mut sim = sim();
        for x in 0..64 {
            sim.create_part(-2, 100 + x, 60, PT_DUST);
        }
        sim.clear_sim();
        assert_eq!(sim.num_parts, 0);
        assert_eq!(sim.parts.count_live(), 0);
        assert_eq!(sim.element_count[PT_DUST as usize], 0);
        assert_eq!(sim.pfree, 0);
    }

    #[test]
    fn temp_to_channel_spans_the_range() {
        assert_eq!(Simulation::temp_to_channel(0.0), 0);
        assert_eq!(Simulation::temp_to_channel(73.15), 1);
        assert_eq!(Simulation::temp_to_channel(1e5), CHANNELS - 1);
    }
}
