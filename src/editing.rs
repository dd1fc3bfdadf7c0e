//! Editing primitives - brushes, lines, boxes, floods, walls, decoration
//!
//! Everything here mutates the grid on the UI thread's behalf; the
//! orchestrator frames each top-level call in a sim pause so pool
//! invariants hold before the next tick. Flood fills collect the target
//! component first and only then apply, so an overflow aborts with no
//! partial effect.

use log::info;
use thiserror::Error;

use crate::config::{MAX_PRESSURE, MAX_SIGNS, MIN_PRESSURE};
use crate::coord_stack::CoordStack;
use crate::elements::TYPE_ENERGY;
use crate::parts::{pmap_id, pmap_typ};
use crate::plane::Plane;
use crate::settings::DecoSpace;
use crate::signs::{Justification, Sign};
use crate::simulation::Simulation;
use crate::walls::{WL_ERASE, WL_ERASEALL, WL_FAN, WL_GRAV, WL_STREAM};

/// Overwrite existing particles (optionally only of the selected type).
pub const REPLACE_MODE: u32 = 1 << 0;
/// Delete only particles of the selected type.
pub const SPECIFIC_DELETE: u32 = 1 << 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("flood fill exceeded the coordinate stack bound")]
    FloodOverflow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoMode {
    Draw,
    Clear,
    Add,
    Subtract,
    Multiply,
    Divide,
    Smudge,
}

impl Simulation {
    // === Particles ===

    /// Place one particle honoring the replace/delete flags. Returns true
    /// when nothing could be created.
    pub fn create_part_flags(&mut self, x: i32, y: i32, t: i32, v: i32, flags: u32) -> bool {
        if !self.cfg.in_bounds(x, y) {
            return true;
        }
        let photon = self.photons[(x, y)];
        let under = self.pmap[(x, y)];
        if flags & REPLACE_MODE != 0 {
            let selected = self.replace_mode_selected;
            let matches = (selected == 0 && (photon != 0 || under != 0))
                || (photon == 0 && under != 0 && pmap_typ(under) == selected)
                || (photon != 0 && pmap_typ(photon) == selected);
            if matches {
                if t != 0 {
                    let target = if photon != 0 { pmap_id(photon) } else { pmap_id(under) };
                    self.create_part_v(target as i32, x, y, t, v);
                } else {
                    self.delete_part(x, y);
                }
            }
            return false;
        }
        if t == 0 {
            self.delete_part(x, y);
            return false;
        }
        if flags & SPECIFIC_DELETE != 0 {
            let selected = self.replace_mode_selected;
            let matches = (selected == 0 && (photon != 0 || under != 0))
                || (photon == 0 && under != 0 && pmap_typ(under) == selected)
                || (photon != 0 && pmap_typ(photon) == selected);
            if matches {
                self.delete_part(x, y);
            }
            return false;
        }
        self.create_part_v(-2, x, y, t, v) == -1
    }

    /// Fill a (2rx+1) x (2ry+1) rectangle of particles around (x, y).
    /// Returns true when nothing was created.
    pub fn create_parts(&mut self, x: i32, y: i32, rx: i32, ry: i32, t: i32, flags: u32) -> bool {
        let flags = if flags == u32::MAX { self.replace_mode_flags } else { flags };
        let mut created = false;
        for j in -ry..=ry {
            for i in -rx..=rx {
                if !self.create_part_flags(x + i, y + j, t, -1, flags) {
                    created = true;
                }
            }
        }
        !created
    }

    /// Bresenham line of brush stamps.
    pub fn create_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, rx: i32, ry: i32, t: i32, flags: u32) {
        rasterize_line(x1, y1, x2, y2, rx + ry == 0, |sim: &mut Simulation, x, y, gap| {
            if !gap || rx + ry == 0 {
                sim.create_parts(x, y, rx, ry, t, flags);
            }
        }, self);
    }

    pub fn create_box(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, t: i32, flags: u32) {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        for j in (y1..=y2).rev() {
            for i in x1..=x2 {
                self.create_parts(i, j, 0, 0, t, flags);
            }
        }
    }

    /// Outline-only counterpart of `create_box`.
    pub fn create_rect(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, t: i32, flags: u32) {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        for i in x1..=x2 {
            self.create_parts(i, y1, 0, 0, t, flags);
            self.create_parts(i, y2, 0, 0, t, flags);
        }
        for j in y1..=y2 {
            self.create_parts(x1, j, 0, 0, t, flags);
            self.create_parts(x2, j, 0, 0, t, flags);
        }
    }

    /// 4-connected flood fill of element `t` over the component of the
    /// element under (x, y) (or of empty space). Collects the component
    /// first; overflow aborts with no cells changed.
    pub fn flood_parts(&mut self, x: i32, y: i32, t: i32, flags: u32) -> Result<i32, EditError> {
        if !self.cfg.in_bounds(x, y) {
            return Ok(0);
        }
        // What are we flooding over?
        let target = {
            let under = self.pmap[(x, y)];
            if under != 0 {
                pmap_typ(under)
            } else {
                let photon = self.photons[(x, y)];
                if photon != 0 {
                    pmap_typ(photon)
                } else {
                    0
                }
            }
        };
        if target == t && t != 0 {
            return Ok(0);
        }

        let matches = |sim: &Simulation, px: i32, py: i32| -> bool {
            if target == 0 {
                sim.pmap[(px, py)] == 0 && sim.photons[(px, py)] == 0
            } else {
                let r = sim.pmap[(px, py)];
                if r != 0 {
                    pmap_typ(r) == target
                } else {
                    let p = sim.photons[(px, py)];
                    p != 0 && pmap_typ(p) == target
                }
            }
        };

        // Phase 1: collect the 4-connected component, scanline style.
        let limit = (self.cfg.xres as usize) * (self.cfg.yres as usize);
        let mut stack = CoordStack::new(limit);
        let mut bitmap: Plane<u8> = Plane::new(self.cfg.xres, self.cfg.yres);
        let mut component: Vec<(i32, i32)> = Vec::new();
        if t != 0 && self.is_wall_blocking(x, y, t) {
            return Ok(0);
        }
        if !matches(self, x, y) {
            return Ok(0);
        }
        stack.push(x, y).map_err(|_| EditError::FloodOverflow)?;
        while let Some((px, py)) = stack.pop() {
            if bitmap[(px, py)] != 0 {
                continue;
            }
            let mut x1 = px;
            let mut x2 = px;
            while x1 > 0 && bitmap[(x1 - 1, py)] == 0 && matches(self, x1 - 1, py) {
                x1 -= 1;
            }
            while x2 < self.cfg.xres - 1 && bitmap[(x2 + 1, py)] == 0 && matches(self, x2 + 1, py) {
                x2 += 1;
            }
            for cx in x1..=x2 {
                bitmap[(cx, py)] = 1;
                component.push((cx, py));
            }
            for ny in [py - 1, py + 1] {
                if ny < 0 || ny >= self.cfg.yres {
                    continue;
                }
                for cx in x1..=x2 {
                    if bitmap[(cx, ny)] == 0 && matches(self, cx, ny) {
                        stack.push(cx, ny).map_err(|_| EditError::FloodOverflow)?;
                    }
                }
            }
        }

        // Phase 2: apply.
        let mut changed = 0;
        for (px, py) in component {
            if t == 0 {
                let r = if target != 0 && self.elements.get(target).properties & TYPE_ENERGY != 0 {
                    self.photons[(px, py)]
                } else {
                    self.pmap[(px, py)]
                };
                if r != 0 {
                    self.kill_part(pmap_id(r));
                    changed += 1;
                }
            } else if !self.create_part_flags(px, py, t, -1, flags) {
                changed += 1;
            }
        }
        info!("flood fill changed {changed} cells at ({x}, {y})");
        Ok(changed)
    }

    /// Kill every particle and wall inside the pixel rectangle, and drop
    /// contained signs.
    pub fn clear_area(&mut self, area_x: i32, area_y: i32, area_w: i32, area_h: i32) {
        let fx = area_x as f32 - 0.5;
        let fy = area_y as f32 - 0.5;
        for i in 0..=self.parts.last_active_index {
            let part = self.parts.data[i];
            if part.ptype != 0
                && part.x >= fx
                && part.x <= fx + area_w as f32 + 1.0
                && part.y >= fy
                && part.y <= fy + area_h as f32 + 1.0
            {
                self.kill_part(i);
            }
        }
        let cell = self.cfg.cell;
        for cy in area_y / cell..=((area_y + area_h) / cell).min(self.cfg.ycells - 1) {
            for cx in area_x / cell..=((area_x + area_w) / cell).min(self.cfg.xcells - 1) {
                if cx < 0 || cy < 0 {
                    continue;
                }
                if self.bmap[(cx, cy)] == WL_GRAV {
                    self.grav_wall_changed = true;
                }
                self.bmap[(cx, cy)] = 0;
                self.emap[(cx, cy)] = 0;
            }
        }
        self.signs.retain(|s| !s.in_area(area_x, area_y, area_w, area_h));
    }

    // === Walls ===

    /// Stamp walls in a cell-radius box around pixel (x, y). Radii are in
    /// pixels and floored to cells.
    pub fn create_walls(&mut self, x: i32, y: i32, rx: i32, ry: i32, wall: u8) -> bool {
        let cell = self.cfg.cell;
        let (rx, ry) = (rx / cell, ry / cell);
        let (cx, cy) = (x / cell, y / cell);
        if wall == WL_STREAM {
            // Streamlines must not touch each other.
            for ty in cy - 1..=cy + 1 {
                for tx in cx - 1..=cx + 1 {
                    if self.cfg.cell_in_bounds(tx, ty) && self.bmap[(tx, ty)] == WL_STREAM {
                        return true;
                    }
                }
            }
        }
        for wx in cx - rx..=cx + rx {
            for wy in cy - ry..=cy + ry {
                if !self.cfg.cell_in_bounds(wx, wy) {
                    continue;
                }
                if wall == WL_FAN {
                    self.fvx[(wx, wy)] = 0.0;
                    self.fvy[(wx, wy)] = 0.0;
                }
                if wall == WL_GRAV || self.bmap[(wx, wy)] == WL_GRAV {
                    self.grav_wall_changed = true;
                }
                if wall == WL_ERASEALL {
                    for i in 0..cell {
                        for j in 0..cell {
                            self.delete_part(wx * cell + i, wy * cell + j);
                        }
                    }
                    self.signs.retain(|s| {
                        !(s.x >= wx * cell && s.y >= wy * cell && s.x <= (wx + 1) * cell && s.y <= (wy + 1) * cell)
                    });
                    self.bmap[(wx, wy)] = 0;
                } else if wall == WL_ERASE {
                    self.bmap[(wx, wy)] = 0;
                } else {
                    self.bmap[(wx, wy)] = wall;
                }
            }
        }
        self.air.approximate_block_air_maps(&self.bmap);
        true
    }

    pub fn create_wall_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, rx: i32, ry: i32, wall: u8) {
        rasterize_line(x1, y1, x2, y2, true, |sim: &mut Simulation, x, y, _gap| {
            sim.create_walls(x, y, rx, ry, wall);
        }, self);
    }

    pub fn create_wall_box(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, wall: u8) {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        for j in (y1..=y2).step_by(self.cfg.cell as usize) {
            for i in (x1..=x2).step_by(self.cfg.cell as usize) {
                self.create_walls(i, j, 0, 0, wall);
            }
        }
    }

    /// Flood walls over the connected run of cells carrying the same wall
    /// type as (x, y).
    pub fn flood_walls(&mut self, x: i32, y: i32, wall: u8) -> Result<i32, EditError> {
        let cell = self.cfg.cell;
        let (cx, cy) = (x / cell, y / cell);
        if !self.cfg.cell_in_bounds(cx, cy) {
            return Ok(0);
        }
        let target = self.bmap[(cx, cy)];
        if (wall == WL_ERASE || wall == WL_ERASEALL) && target == 0 {
            return Ok(0);
        }
        if target == wall {
            return Ok(0);
        }
        let mut stack = CoordStack::new(self.cfg.ncell);
        let mut bitmap: Plane<u8> = Plane::new(self.cfg.xcells, self.cfg.ycells);
        let mut component = Vec::new();
        stack.push(cx, cy).map_err(|_| EditError::FloodOverflow)?;
        while let Some((px, py)) = stack.pop() {
            if bitmap[(px, py)] != 0 || self.bmap[(px, py)] != target {
                continue;
            }
            bitmap[(px, py)] = 1;
            component.push((px, py));
            for (nx, ny) in [(px - 1, py), (px + 1, py), (px, py - 1), (px, py + 1)] {
                if self.cfg.cell_in_bounds(nx, ny) && bitmap[(nx, ny)] == 0 {
                    stack.push(nx, ny).map_err(|_| EditError::FloodOverflow)?;
                }
            }
        }
        let changed = component.len() as i32;
        for (px, py) in component {
            self.create_walls(px * cell, py * cell, 0, 0, wall);
        }
        Ok(changed)
    }

    /// Set the fan velocity of fan-wall cells in a radius.
    pub fn set_fan_velocity(&mut self, x: i32, y: i32, rx: i32, ry: i32, fvx: f32, fvy: f32) {
        let cell = self.cfg.cell;
        let (cx, cy) = (x / cell, y / cell);
        for wy in cy - ry / cell..=cy + ry / cell {
            for wx in cx - rx / cell..=cx + rx / cell {
                if self.cfg.cell_in_bounds(wx, wy) && self.bmap[(wx, wy)] == WL_FAN {
                    self.fvx[(wx, wy)] = fvx;
                    self.fvy[(wx, wy)] = fvy;
                }
            }
        }
    }

    // === Cell tools ===

    /// Pressure tool: push (or with negative strength, pull) air under the
    /// brush point.
    pub fn tool_air(&mut self, x: i32, y: i32, strength: f32) {
        let (cx, cy) = self.cell_of(x, y);
        if let Some(pv) = self.pv.get_mut(cx, cy) {
            *pv = (*pv + strength * 0.05).clamp(MIN_PRESSURE, MAX_PRESSURE);
        }
    }

    pub fn tool_vacuum(&mut self, x: i32, y: i32, strength: f32) {
        self.tool_air(x, y, -strength);
    }

    // === Decoration ===

    pub fn apply_decoration(&mut self, x: i32, y: i32, colour: (i32, i32, i32, i32), mode: DecoMode) {
        if !self.cfg.in_bounds(x, y) {
            return;
        }
        let r = {
            let under = self.pmap[(x, y)];
            if under != 0 { under } else { self.photons[(x, y)] }
        };
        if r == 0 {
            return;
        }
        let id = pmap_id(r);
        let (col_r, col_g, col_b, col_a) = colour;
        let dcolour = self.parts.data[id].dcolour;
        let mut ta = ((dcolour >> 24) & 0xFF) as f32 / 255.0;
        let mut tr = ((dcolour >> 16) & 0xFF) as f32 / 255.0;
        let mut tg = ((dcolour >> 8) & 0xFF) as f32 / 255.0;
        let mut tb = (dcolour & 0xFF) as f32 / 255.0;
        let (ca, cr, cg, cb) = (
            col_a as f32 / 255.0,
            col_r as f32 / 255.0,
            col_g as f32 / 255.0,
            col_b as f32 / 255.0,
        );
        let strength = 0.01;
        match mode {
            DecoMode::Draw => {
                ta = ca;
                tr = cr;
                tg = cg;
                tb = cb;
            }
            DecoMode::Clear => {
                ta = 0.0;
                tr = 0.0;
                tg = 0.0;
                tb = 0.0;
            }
            DecoMode::Add => {
                tr += cr * strength * ca;
                tg += cg * strength * ca;
                tb += cb * strength * ca;
            }
            DecoMode::Subtract => {
                tr -= cr * strength * ca;
                tg -= cg * strength * ca;
                tb -= cb * strength * ca;
            }
            DecoMode::Multiply => {
                tr *= 1.0 + cr * strength * ca;
                tg *= 1.0 + cg * strength * ca;
                tb *= 1.0 + cb * strength * ca;
            }
            DecoMode::Divide => {
                tr /= 1.0 + cr * strength * ca;
                tg /= 1.0 + cg * strength * ca;
                tb /= 1.0 + cb * strength * ca;
            }
            DecoMode::Smudge => {
                if let Some(avg) = self.smudge_average(x, y) {
                    (ta, tr, tg, tb) = avg;
                    if dcolour == 0 {
                        ta -= 3.0 / 255.0;
                    }
                } else {
                    return;
                }
            }
        }
        let pack = |v: f32| ((v * 255.0 + 0.5) as i32).clamp(0, 255) as u32;
        self.parts.data[id].dcolour =
            (pack(ta) << 24) | (pack(tr) << 16) | (pack(tg) << 8) | pack(tb);
    }

    /// Average the 5x5 ring of decorated neighbors in the configured
    /// decoration color space.
    fn smudge_average(&self, x: i32, y: i32) -> Option<(f32, f32, f32, f32)> {
        let cell = self.cfg.cell;
        if x < cell || x >= self.cfg.xres - cell || y < cell || y >= self.cfg.yres - cell {
            return None;
        }
        let space = self.deco_space;
        let mut acc = [0.0f32; 4];
        let mut num = 0.0f32;
        for rx in -2i32..=2 {
            for ry in -2i32..=2 {
                if rx.abs() + ry.abs() <= 2 {
                    continue;
                }
                let r = self.pmap[(x + rx, y + ry)];
                if r == 0 {
                    continue;
                }
                let dcolour = self.parts.data[pmap_id(r)].dcolour;
                if dcolour == 0 {
                    continue;
                }
                num += 1.0;
                let channels = [
                    ((dcolour >> 24) & 0xFF) as f32 / 255.0,
                    ((dcolour >> 16) & 0xFF) as f32 / 255.0,
                    ((dcolour >> 8) & 0xFF) as f32 / 255.0,
                    (dcolour & 0xFF) as f32 / 255.0,
                ];
                for (slot, v) in acc.iter_mut().zip(channels) {
                    *slot += to_linear(v, space);
                }
            }
        }
        if num == 0.0 {
            return None;
        }
        Some((
            from_linear(acc[0] / num, space),
            from_linear(acc[1] / num, space),
            from_linear(acc[2] / num, space),
            from_linear(acc[3] / num, space),
        ))
    }

    pub fn apply_decoration_line(
        &mut self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        rx: i32,
        ry: i32,
        colour: (i32, i32, i32, i32),
        mode: DecoMode,
    ) {
        rasterize_line(x1, y1, x2, y2, rx + ry == 0, |sim: &mut Simulation, x, y, _gap| {
            for j in -ry..=ry {
                for i in -rx..=rx {
                    sim.apply_decoration(x + i, y + j, colour, mode);
                }
            }
        }, self);
    }

    pub fn apply_decoration_box(
        &mut self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        colour: (i32, i32, i32, i32),
        mode: DecoMode,
    ) {
        let (x1, x2) = (x1.min(x2), x1.max(x2));
        let (y1, y2) = (y1.min(y2), y1.max(y2));
        for j in y1..=y2 {
            for i in x1..=x2 {
                self.apply_decoration(i, j, colour, mode);
            }
        }
    }

    /// Flood decoration over the region of the rendered frame whose color
    /// is close to the color under the start pixel.
    pub fn apply_decoration_fill(
        &mut self,
        frame: &Plane<u32>,
        x: i32,
        y: i32,
        colour: (i32, i32, i32, i32),
        replace: (i32, i32, i32, i32),
    ) -> Result<(), EditError> {
        if !self.cfg.in_bounds(x, y) || !colour_compare(frame, x, y, replace) {
            return Ok(());
        }
        let limit = (self.cfg.xres as usize) * (self.cfg.yres as usize);
        let mut stack = CoordStack::new(limit);
        let mut bitmap: Plane<u8> = Plane::new(self.cfg.xres, self.cfg.yres);
        stack.push(x, y).map_err(|_| EditError::FloodOverflow)?;
        while let Some((px, py)) = stack.pop() {
            if bitmap[(px, py)] != 0 {
                continue;
            }
            bitmap[(px, py)] = 1;
            self.apply_decoration(px, py, colour, DecoMode::Draw);
            for (nx, ny) in [(px - 1, py), (px + 1, py), (px, py - 1), (px, py + 1)] {
                if nx >= 0
                    && nx < self.cfg.xres
                    && ny >= 0
                    && ny < self.cfg.yres
                    && bitmap[(nx, ny)] == 0
                    && colour_compare(frame, nx, ny, replace)
                {
                    stack.push(nx, ny).map_err(|_| EditError::FloodOverflow)?;
                }
            }
        }
        Ok(())
    }

    // === Signs ===

    /// Add a sign; fails when the sign table is full.
    pub fn add_sign(&mut self, x: i32, y: i32, ju: Justification, text: &str) -> bool {
        if self.signs.len() >= MAX_SIGNS {
            return false;
        }
        self.signs.push(Sign::new(x, y, ju, text));
        true
    }
}

fn colour_compare(frame: &Plane<u32>, x: i32, y: i32, replace: (i32, i32, i32, i32)) -> bool {
    let Some(&pix) = frame.get(x, y) else {
        return false;
    };
    let r = ((pix >> 16) & 0xFF) as i32;
    let g = ((pix >> 8) & 0xFF) as i32;
    let b = (pix & 0xFF) as i32;
    (replace.0 - r).abs() + (replace.1 - g).abs() + (replace.2 - b).abs() < 15
}

fn to_linear(v: f32, space: DecoSpace) -> f32 {
    match space {
        DecoSpace::Srgb => {
            if v <= 0.04045 {
                v / 12.92
            } else {
                ((v + 0.055) / 1.055).powf(2.4)
            }
        }
        DecoSpace::Linear => v,
        DecoSpace::Gamma22 => v.powf(2.2),
        DecoSpace::Gamma18 => v.powf(1.8),
    }
}

fn from_linear(v: f32, space: DecoSpace) -> f32 {
    match space {
        DecoSpace::Srgb => {
            if v <= 0.003_130_8 {
                v * 12.92
            } else {
                1.055 * v.powf(1.0 / 2.4) - 0.055
            }
        }
        DecoSpace::Linear => v,
        DecoSpace::Gamma22 => v.powf(1.0 / 2.2),
        DecoSpace::Gamma18 => v.powf(1.0 / 1.8),
    }
}

/// Shared Bresenham walk. `dense` adds the half-step stamp that keeps
/// 1-pixel lines gap-free.
fn rasterize_line<F: FnMut(&mut Simulation, i32, i32, bool)>(
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    dense: bool,
    mut stamp: F,
    sim: &mut Simulation,
) {
    let reverse = (y2 - y1).abs() > (x2 - x1).abs();
    let (mut x1, mut y1, mut x2, mut y2) = if reverse { (y1, x1, y2, x2) } else { (x1, y1, x2, y2) };
    if x1 > x2 {
        std::mem::swap(&mut x1, &mut x2);
        std::mem::swap(&mut y1, &mut y2);
    }
    let dx = x2 - x1;
    let dy = (y2 - y1).abs();
    let de = if dx != 0 { dy as f32 / dx as f32 } else { 0.0 };
    let sy = if y1 < y2 { 1 } else { -1 };
    let mut y = y1;
    let mut e = 0.0f32;
    for x in x1..=x2 {
        if reverse {
            stamp(sim, y, x, false);
        } else {
            stamp(sim, x, y, false);
        }
        e += de;
        if e >= 0.5 {
            y += sy;
            if dense && ((y1 < y2 && y <= y2) || (y1 >= y2 && y >= y2)) {
                if reverse {
                    stamp(sim, y, x, true);
                } else {
                    stamp(sim, x, y, true);
                }
            }
            e -= 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::elements::{PT_DUST, PT_WATR};
    use crate::walls::WL_WALL;

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn create_box_fills_the_rectangle() {
        let mut sim = sim();
        sim.create_box(10, 10, 19, 14, PT_DUST, 0);
        assert_eq!(sim.element_count[PT_DUST as usize], 10 * 5);
    }

    #[test]
    fn create_rect_draws_only_the_outline() {
        let mut sim = sim();
        sim.create_rect(10, 10, 19, 19, PT_DUST, 0);
        assert_eq!(sim.element_count[PT_DUST as usize], 4 * 10 - 4);
        assert_ne!(sim.pmap[(10, 10)], 0);
        assert_eq!(sim.pmap[(15, 15)], 0);
    }

    #[test]
    fn replace_mode_only_touches_existing() {
        let mut sim = sim();
        sim.create_part(-2, 20, 20, PT_DUST);
        sim.replace_mode_selected = PT_DUST;
        sim.create_part_flags(20, 20, PT_WATR, -1, REPLACE_MODE);
        sim.create_part_flags(30, 20, PT_WATR, -1, REPLACE_MODE);
        assert_eq!(pmap_typ(sim.pmap[(20, 20)]), PT_WATR);
        assert_eq!(sim.pmap[(30, 20)], 0);
    }

    #[test]
    fn specific_delete_spares_other_types() {
        let mut sim = sim();
        sim.create_part(-2, 20, 20, PT_DUST);
        sim.create_part(-2, 30, 20, PT_WATR);
        sim.replace_mode_selected = PT_WATR;
        sim.create_part_flags(20, 20, PT_DUST, -1, SPECIFIC_DELETE);
        sim.create_part_flags(30, 20, PT_DUST, -1, SPECIFIC_DELETE);
        assert_ne!(sim.pmap[(20, 20)], 0);
        assert_eq!(sim.pmap[(30, 20)], 0);
    }

    #[test]
    fn flood_parts_fills_exactly_the_component() {
        let mut sim = sim();
        // A dust "U" shape; flooding inside must not leak out.
        for y in 20..30 {
            sim.create_part(-2, 20, y, PT_DUST);
            sim.create_part(-2, 30, y, PT_DUST);
        }
        for x in 20..=30 {
            sim.create_part(-2, x, 30, PT_DUST);
        }
        let changed = sim.flood_parts(25, 25, PT_WATR, 0).unwrap();
        // Interior is 9 wide, 10 tall, open at the top: the fill escapes
        // upward and covers all connected empty space instead.
        assert!(changed > 0);
        assert_eq!(pmap_typ(sim.pmap[(25, 25)]), PT_WATR);
        assert_eq!(pmap_typ(sim.pmap[(20, 25)]), PT_DUST);
    }

    #[test]
    fn flood_replaces_connected_same_type_region() {
        let mut sim = sim();
        for x in 40..50 {
            sim.create_part(-2, x, 40, PT_DUST);
        }
        sim.create_part(-2, 60, 40, PT_DUST);
        let changed = sim.flood_parts(42, 40, PT_WATR, 0).unwrap();
        assert_eq!(changed, 10);
        assert_eq!(pmap_typ(sim.pmap[(45, 40)]), PT_WATR);
        assert_eq!(pmap_typ(sim.pmap[(60, 40)]), PT_DUST);
    }

    #[test]
    fn walls_block_and_clear() {
        let mut sim = sim();
        sim.create_walls(40, 40, 0, 0, WL_WALL);
        let (cx, cy) = sim.cell_of(40, 40);
        assert_eq!(sim.bmap[(cx, cy)], WL_WALL);
        assert_eq!(sim.create_part(-2, 40, 40, PT_DUST), -1);
        sim.create_walls(40, 40, 0, 0, WL_ERASE);
        assert_eq!(sim.bmap[(cx, cy)], 0);
    }

    #[test]
    fn streamlines_refuse_adjacency() {
        let mut sim = sim();
        assert!(sim.create_walls(40, 40, 0, 0, WL_STREAM));
        let (cx, cy) = sim.cell_of(40, 40);
        assert_eq!(sim.bmap[(cx, cy)], WL_STREAM);
        // A streamline in the adjacent cell must be refused.
        sim.create_walls(40 + sim.cfg.cell, 40, 0, 0, WL_STREAM);
        assert_eq!(sim.bmap[(cx + 1, cy)], 0);
    }

    #[test]
    fn decoration_draw_and_clear() {
        let mut sim = sim();
        let i = sim.create_part(-2, 20, 20, PT_DUST) as usize;
        sim.apply_decoration(20, 20, (255, 0, 0, 128), DecoMode::Draw);
        assert_eq!(sim.parts.data[i].dcolour, 0x80FF0000);
        sim.apply_decoration(20, 20, (0, 0, 0, 0), DecoMode::Clear);
        assert_eq!(sim.parts.data[i].dcolour, 0);
    }

    #[test]
    fn clear_area_removes_particles_walls_and_signs(){
        let mut sim = sim();
        sim.create_part(-2, 20, 20, PT_DUST);
        sim.create_walls(24, 24, 0, 0, WL_WALL);
        sim.add_sign(22, 22, Justification::Left, "hi");
        sim.clear_area(16, 16, 16, 16);
        assert_eq!(sim.num_parts, 0);
        let (cx, cy) = sim.cell_of(24, 24);
        assert_eq!(sim.bmap[(cx, cy)], 0);
        assert!(sim.signs.is_empty());
    }
}
