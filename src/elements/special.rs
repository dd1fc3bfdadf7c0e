//! Special elements - clone, void, pressure holes, portals, stickmen

use crate::config::{MAX_PRESSURE, MIN_PRESSURE};
use crate::elements::{
    Element, MenuSection, UpdateCtx, PERSIST_CTYPE, PERSIST_LIFE, PERSIST_TMP, PERSIST_TMP2,
    PROP_NOCTYPEDRAW, PT_BHOL, PT_CLNE, PT_DUST, PT_FIGH, PT_PRTI, PT_PRTO, PT_SPRK, PT_SPWN,
    PT_SPWN2, PT_STKM, PT_STKM2, PT_VOID, PT_WHOL, TYPE_ENERGY, TYPE_SOLID,
};
use crate::parts::{pmap_id, pmap_typ};
use crate::simulation::{Simulation, PORTAL_PHASES};

pub(super) fn register(elements: &mut [Element], _cfds: f32) {
    elements[PT_CLNE as usize] = clne();
    elements[PT_VOID as usize] = void_el();
    elements[PT_BHOL as usize] = hole("DEFAULT_PT_BHOL", "BHOL", 0xFF202020, "Black hole. Draws in air and destroys matter.", true);
    elements[PT_WHOL as usize] = hole("DEFAULT_PT_WHOL", "WHOL", 0xFFEFEFEF, "White hole. Pushes air outward.", false);
    elements[PT_PRTI as usize] = prti();
    elements[PT_PRTO as usize] = prto();
    elements[PT_SPWN as usize] = spwn("DEFAULT_PT_SPWN", "SPWN", 0xFFAAAAAA, false);
    elements[PT_SPWN2 as usize] = spwn("DEFAULT_PT_SPWN2", "SPN2", 0xFFCCCCAA, true);
    elements[PT_STKM as usize] = stkm("DEFAULT_PT_STKM", "STKM", false);
    elements[PT_STKM2 as usize] = stkm("DEFAULT_PT_STKM2", "STK2", true);
    elements[PT_FIGH as usize] = figh();
}

fn special_base() -> Element {
    let mut el = Element::base();
    el.menu_visible = true;
    el.menu_section = MenuSection::Special;
    el.enabled = true;
    el.weight = 100;
    el.properties = TYPE_SOLID;
    el
}

fn clne() -> Element {
    let mut el = special_base();
    el.identifier = "DEFAULT_PT_CLNE".into();
    el.name = "CLNE".into();
    el.colour = 0xFFFFD010;
    el.heat_conduct = 251;
    el.description = "Clone. Duplicates the first particle that touches it.".into();
    el.properties |= PROP_NOCTYPEDRAW;
    el.persist |= PERSIST_CTYPE;
    el.update = Some(update_clne);
    el
}

fn void_el() -> Element {
    let mut el = special_base();
    el.identifier = "DEFAULT_PT_VOID".into();
    el.name = "VOID".into();
    el.colour = 0xFF790B0B;
    el.heat_conduct = 251;
    el.description = "Void. Destroys everything that touches it.".into();
    el.update = Some(update_void);
    el
}

fn hole(identifier: &str, name: &str, colour: u32, description: &str, pull: bool) -> Element {
    let mut el = special_base();
    el.identifier = identifier.into();
    el.name = name.into();
    el.colour = colour;
    el.heat_conduct = 186;
    el.description = description.into();
    el.update = Some(if pull { update_bhol } else { update_whol });
    el
}

fn prti() -> Element {
    let mut el = special_base();
    el.identifier = "DEFAULT_PT_PRTI".into();
    el.name = "PRTI".into();
    el.colour = 0xFFEB5917;
    el.heat_conduct = 0;
    el.description = "Portal in. Swallows particles; channel is tmp.".into();
    el.persist |= PERSIST_TMP;
    el.update = Some(update_prti);
    el
}

fn prto() -> Element {
    let mut el = special_base();
    el.identifier = "DEFAULT_PT_PRTO".into();
    el.name = "PRTO".into();
    el.colour = 0xFF0020EB;
    el.heat_conduct = 0;
    el.description = "Portal out. Emits what the matching portal in swallowed.".into();
    el.persist |= PERSIST_TMP;
    el.update = Some(update_prto);
    el
}

fn spwn(identifier: &str, name: &str, colour: u32, second: bool) -> Element {
    let mut el = special_base();
    el.identifier = identifier.into();
    el.name = name.into();
    el.colour = colour;
    el.heat_conduct = 0;
    el.description = "Stickman spawn point.".into();
    el.persist |= PERSIST_LIFE;
    el.update = Some(if second { update_spwn2 } else { update_spwn });
    el
}

fn stkm(identifier: &str, name: &str, second: bool) -> Element {
    let mut el = special_base();
    el.identifier = identifier.into();
    el.name = name.into();
    el.colour = 0xFFFFE0A0;
    el.menu_visible = false;
    el.advection = 0.5;
    el.loss = 0.9;
    el.gravity = 0.2;
    el.falldown = 1;
    el.weight = 50;
    el.heat_conduct = 0;
    el.hardness = 0;
    el.description = "Stickman host particle.".into();
    el.properties = crate::elements::TYPE_PART;
    el.persist |= PERSIST_LIFE | PERSIST_CTYPE;
    el.default_properties.life = 100;
    if second {
        el.create_allowed = Some(|sim, _, _, _, _| !sim.player2.spwn);
        el.create = Some(create_stkm2);
        el.update = Some(update_stkm2);
    } else {
        el.create_allowed = Some(|sim, _, _, _, _| !sim.player.spwn);
        el.create = Some(create_stkm);
        el.update = Some(update_stkm);
    }
    el
}

fn figh() -> Element {
    let mut el = special_base();
    el.identifier = "DEFAULT_PT_FIGH".into();
    el.name = "FIGH".into();
    el.colour = 0xFFFFE0A0;
    el.menu_visible = false;
    el.advection = 0.5;
    el.loss = 0.9;
    el.gravity = 0.2;
    el.falldown = 1;
    el.weight = 50;
    el.heat_conduct = 0;
    el.hardness = 0;
    el.description = "Fighter. Attacks the stickmen.".into();
    el.properties = crate::elements::TYPE_PART;
    el.persist |= PERSIST_LIFE | PERSIST_TMP2;
    el.default_properties.life = 100;
    el.create_allowed = Some(|sim, _, _, _, _| (sim.fighters.count as usize) < crate::config::MAX_FIGHTERS);
    el.create = Some(create_figh);
    el.update = Some(update_figh);
    el
}

fn update_clne(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let ctype = sim.parts.data[ctx.i].ctype;
    if ctype == 0 {
        // Adopt the first touching particle type.
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let r = sim.pmap_at(ctx.x + dx, ctx.y + dy);
                let r = if r != 0 { r } else { sim.photons_at(ctx.x + dx, ctx.y + dy) };
                if r == 0 {
                    continue;
                }
                let rt = pmap_typ(r);
                if rt != PT_CLNE && rt != PT_SPRK && rt != PT_STKM && rt != PT_STKM2 && rt != PT_FIGH
                {
                    sim.parts.data[ctx.i].ctype = rt;
                    return false;
                }
            }
        }
    } else if sim.rng.chance(1, 4) {
        let dx = sim.rng.between(-1, 1);
        let dy = sim.rng.between(-1, 1);
        if dx != 0 || dy != 0 {
            sim.create_part(-2, ctx.x + dx, ctx.y + dy, ctype);
        }
    }
    false
}

fn update_void(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (nx, ny) = (ctx.x + dx, ctx.y + dy);
            let r = sim.pmap_at(nx, ny);
            if r != 0 && pmap_typ(r) != PT_VOID {
                sim.kill_part(pmap_id(r));
            }
            let p = sim.photons_at(nx, ny);
            if p != 0 {
                sim.kill_part(pmap_id(p));
            }
        }
    }
    false
}

fn update_bhol(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let (cx, cy) = sim.cell_of(ctx.x, ctx.y);
    let pv = &mut sim.pv[(cx, cy)];
    *pv = (*pv - 0.1 * (*pv - MIN_PRESSURE * 0.25)).clamp(MIN_PRESSURE, MAX_PRESSURE);
    false
}

fn update_whol(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let (cx, cy) = sim.cell_of(ctx.x, ctx.y);
    let pv = &mut sim.pv[(cx, cy)];
    *pv = (*pv + 0.1 * (MAX_PRESSURE * 0.25 - *pv)).clamp(MIN_PRESSURE, MAX_PRESSURE);
    false
}

/// Portal in: swallow movable neighbors into the channel buffer for the
/// current phase.
fn update_prti(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let channel = sim.parts.data[ctx.i].tmp.max(0) as usize;
    let phase = (sim.frame_count as usize) % PORTAL_PHASES;
    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        let (nx, ny) = (ctx.x + dx, ctx.y + dy);
        let r = sim.pmap_at(nx, ny);
        let r = if r != 0 { r } else { sim.photons_at(nx, ny) };
        if r == 0 {
            continue;
        }
        let rt = pmap_typ(r);
        let re = sim.elements.get(rt);
        if re.properties & TYPE_SOLID != 0 && re.properties & TYPE_ENERGY == 0 {
            continue;
        }
        let id = pmap_id(r);
        let part = sim.parts.data[id];
        if sim.portal_store(channel, phase, part) {
            sim.kill_part(id);
        }
    }
    false
}

/// Portal out: emit buffered particles of the matching channel into free
/// neighbor pixels, oldest phase first.
fn update_prto(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let channel = sim.parts.data[ctx.i].tmp.max(0) as usize;
    let phase = (sim.frame_count as usize + 1) % PORTAL_PHASES;
    for (dx, dy) in [(0, -1), (1, 0), (0, 1), (-1, 0)] {
        let (nx, ny) = (ctx.x + dx, ctx.y + dy);
        if !sim.cfg.in_bounds(nx, ny) || sim.pmap_at(nx, ny) != 0 {
            continue;
        }
        let Some(stored) = sim.portal_take(channel, phase) else {
            return false;
        };
        let j = sim.create_part(-2, nx, ny, stored.ptype);
        if j >= 0 {
            let j = j as usize;
            let (x, y) = (sim.parts.data[j].x, sim.parts.data[j].y);
            sim.parts.data[j] = stored;
            sim.parts.data[j].x = x;
            sim.parts.data[j].y = y;
            // Fling outward so particles do not pool in the mouth.
            sim.parts.data[j].vx = dx as f32 * 2.0;
            sim.parts.data[j].vy = dy as f32 * 2.0;
        } else {
            // No room after all; put it back for a later phase.
            sim.portal_store(channel, phase, stored);
        }
    }
    false
}

fn update_spwn(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    if !sim.player.spwn {
        if sim.parts.data[ctx.i].life > 0 {
            sim.parts.data[ctx.i].life -= 1;
        } else {
            let j = sim.create_part(-2, ctx.x, ctx.y - 1, PT_STKM);
            if j >= 0 {
                sim.player.spawn_id = ctx.i as i32;
                sim.parts.data[ctx.i].life = 300;
            }
        }
    }
    false
}

fn update_spwn2(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    if !sim.player2.spwn {
        if sim.parts.data[ctx.i].life > 0 {
            sim.parts.data[ctx.i].life -= 1;
        } else {
            let j = sim.create_part(-2, ctx.x, ctx.y - 1, PT_STKM2);
            if j >= 0 {
                sim.player2.spawn_id = ctx.i as i32;
                sim.parts.data[ctx.i].life = 300;
            }
        }
    }
    false
}

fn create_stkm(sim: &mut Simulation, i: usize, x: i32, y: i32, _t: i32, _v: i32) {
    sim.player.spwn = true;
    sim.player.elem = PT_DUST;
    sim.player.init_legs(x as f32, y as f32);
    sim.parts.data[i].life = 100;
}

fn create_stkm2(sim: &mut Simulation, i: usize, x: i32, y: i32, _t: i32, _v: i32) {
    sim.player2.spwn = true;
    sim.player2.elem = PT_DUST;
    sim.player2.init_legs(x as f32, y as f32);
    sim.parts.data[i].life = 100;
}

fn create_figh(sim: &mut Simulation, i: usize, x: i32, y: i32, _t: i32, _v: i32) {
    if let Some(slot) = sim.fighters.alloc() {
        sim.fighters.data[slot].elem = PT_DUST;
        sim.fighters.data[slot].init_legs(x as f32, y as f32);
        sim.parts.data[i].tmp2 = slot as i32;
        sim.parts.data[i].life = 100;
    }
}

fn stickman_step(sim: &mut Simulation, ctx: UpdateCtx, which: StickmanRef) -> bool {
    let part = sim.parts.data[ctx.i];
    // Deadly surroundings hurt.
    if part.temp > 600.0 || part.temp < 243.0 {
        sim.parts.data[ctx.i].life -= 1;
    }
    if sim.parts.data[ctx.i].life <= 0 {
        sim.kill_part(ctx.i);
        return true;
    }
    let (comm, fan) = {
        let sm = which.get(sim);
        (sm.comm, sm.fan)
    };
    let part = &mut sim.parts.data[ctx.i];
    if comm & crate::stickman::COMM_LEFT != 0 {
        part.vx = (part.vx - 0.2).max(-2.0);
    }
    if comm & crate::stickman::COMM_RIGHT != 0 {
        part.vx = (part.vx + 0.2).min(2.0);
    }
    if comm & crate::stickman::COMM_UP != 0 && part.vy > -1.0 {
        part.vy -= 1.5;
    }
    if fan {
        let (x, y) = (ctx.x, ctx.y);
        sim.add_pressure(x, y, 0.03);
    }
    let (xf, yf) = (sim.parts.data[ctx.i].x, sim.parts.data[ctx.i].y);
    which.get_mut(sim).step_legs(xf, yf);
    false
}

#[derive(Clone, Copy)]
enum StickmanRef {
    Player,
    Player2,
    Fighter(usize),
}

impl StickmanRef {
    fn get(self, sim: &Simulation) -> &crate::stickman::Stickman {
        match self {
            StickmanRef::Player => &sim.player,
            StickmanRef::Player2 => &sim.player2,
            StickmanRef::Fighter(slot) => &sim.fighters.data[slot],
        }
    }

    fn get_mut(self, sim: &mut Simulation) -> &mut crate::stickman::Stickman {
        match self {
            StickmanRef::Player => &mut sim.player,
            StickmanRef::Player2 => &mut sim.player2,
            StickmanRef::Fighter(slot) => &mut sim.fighters.data[slot],
        }
    }
}

fn update_stkm(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    stickman_step(sim, ctx, StickmanRef::Player)
}

fn update_stkm2(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    stickman_step(sim, ctx, StickmanRef::Player2)
}

/// Fighters walk toward the nearest player.
fn update_figh(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let slot = sim.parts.data[ctx.i].tmp2.max(0) as usize % crate::config::MAX_FIGHTERS;
    let target = if sim.player.spwn {
        Some(sim.player.legs[0])
    } else if sim.player2.spwn {
        Some(sim.player2.legs[0])
    } else {
        None
    };
    if let Some(tx) = target {
        let comm = if tx < sim.parts.data[ctx.i].x {
            crate::stickman::COMM_LEFT
        } else {
            crate::stickman::COMM_RIGHT
        };
        sim.fighters.data[slot].comm = comm;
    } else {
        sim.fighters.data[slot].comm = 0;
    }
    stickman_step(sim, ctx, StickmanRef::Fighter(slot))
}
