//! Gas elements, including fire

use crate::config::{MAX_PRESSURE, R_TEMP};
use crate::elements::{
    Element, MenuSection, UpdateCtx, PERSIST_CTYPE, PERSIST_LIFE, PERSIST_TMP, PROP_LIFE_DEC,
    PROP_LIFE_KILL, PT_BOYL, PT_FIRE, PT_LAVA, PT_O2, PT_SMKE, PT_STEM, PT_WATR, TYPE_GAS,
};
use crate::parts::{pmap_id, pmap_typ};
use crate::render::{GraphicsOutput, FIRE_ADD, PMODE_NONE};
use crate::simulation::{RenderableSimulation, Simulation};

pub(super) fn register(elements: &mut [Element], cfds: f32) {
    elements[PT_FIRE as usize] = fire(cfds);
    elements[PT_SMKE as usize] = smke(cfds);
    elements[PT_STEM as usize] = stem(cfds);
    elements[PT_O2 as usize] = o2(cfds);
    elements[PT_BOYL as usize] = boyl(cfds);
}

fn gas_base(cfds: f32) -> Element {
    let mut el = Element::base();
    el.menu_visible = true;
    el.menu_section = MenuSection::Gases;
    el.enabled = true;
    el.advection = 1.0;
    el.air_drag = 0.01 * cfds;
    el.air_loss = 0.99;
    el.loss = 0.30;
    el.collision = -0.1;
    el.diffusion = 0.75;
    el.hardness = 1;
    el.weight = 1;
    el.properties = TYPE_GAS;
    el
}

fn fire(cfds: f32) -> Element {
    let mut el = gas_base(cfds);
    el.identifier = "DEFAULT_PT_FIRE".into();
    el.name = "FIRE".into();
    el.colour = 0xFFFF1000;
    el.air_drag = 0.04 * cfds;
    el.air_loss = 0.97;
    el.loss = 0.20;
    el.gravity = -0.1;
    el.diffusion = 0.4;
    el.hot_air = 0.001 * cfds;
    el.heat_conduct = 88;
    el.default_properties.temp = R_TEMP + 400.0 + 273.15;
    el.default_properties.life = 160;
    el.description = "Ignites flammable materials. Heats the air.".into();
    el.properties |= PROP_LIFE_DEC | PROP_LIFE_KILL;
    el.persist |= PERSIST_LIFE | PERSIST_CTYPE;
    el.update = Some(update_fire);
    el.create = Some(create_fire);
    el.graphics = Some(graphics_fire);
    el
}

fn smke(cfds: f32) -> Element {
    let mut el = gas_base(cfds);
    el.identifier = "DEFAULT_PT_SMKE".into();
    el.name = "SMKE".into();
    el.colour = 0xFF303030;
    el.gravity = -0.1;
    el.heat_conduct = 88;
    el.default_properties.temp = R_TEMP + 320.0 + 273.15;
    el.default_properties.life = 250;
    el.description = "Smoke. Produced by fire, dissipates over time.".into();
    el.properties |= PROP_LIFE_DEC | PROP_LIFE_KILL;
    el.persist |= PERSIST_LIFE;
    el.create = Some(create_smke);
    el
}

fn stem(cfds: f32) -> Element {
    let mut el = gas_base(cfds);
    el.identifier = "DEFAULT_PT_STEM".into();
    el.name = "STEM".into();
    el.colour = 0xFFA0A0FF;
    el.gravity = -0.1;
    el.diffusion = 0.6;
    el.heat_conduct = 48;
    el.default_properties.temp = 373.15 + 27.0;
    el.description = "Steam. Condenses back into water when cooled.".into();
    el.low_temperature = 371.15;
    el.low_temperature_transition = PT_WATR;
    el
}

fn o2(cfds: f32) -> Element {
    let mut el = gas_base(cfds);
    el.identifier = "DEFAULT_PT_O2".into();
    el.name = "O2".into();
    el.colour = 0xFF80A0FF;
    el.diffusion = 3.0;
    el.heat_conduct = 70;
    el.flammable = 40000;
    el.description = "Oxygen. Combusts violently.".into();
    el
}

fn boyl(cfds: f32) -> Element {
    let mut el = gas_base(cfds);
    el.identifier = "DEFAULT_PT_BOYL".into();
    el.name = "BOYL".into();
    el.colour = 0xFF0A3200;
    el.loss = 0.30;
    el.diffusion = 0.18;
    el.heat_conduct = 42;
    el.default_properties.temp = R_TEMP + 2.0 + 273.15;
    el.description = "Boyle, variable pressure gas. Expands when heated.".into();
    el.persist |= PERSIST_TMP;
    el.update = Some(update_boyl);
    el
}

/// Try to set every flammable 3x3 neighbor of (x, y) on fire. Shared by
/// fire and lava.
pub(crate) fn ignite_neighbors(sim: &mut Simulation, x: i32, y: i32) {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let r = sim.pmap_at(x + dx, y + dy);
            if r == 0 {
                continue;
            }
            let id = pmap_id(r);
            let rt = pmap_typ(r);
            let (flammable, explosive) = {
                let re = sim.elements.get(rt);
                (re.flammable, re.explosive)
            };
            if flammable > 0 && sim.rng.chance((flammable as u32).min(1000), 1000) {
                if sim.part_change_type(id, x + dx, y + dy, PT_FIRE) {
                    sim.parts.data[id].life = 160 + sim.rng.between(0, 40);
                    sim.parts.data[id].ctype = rt;
                    sim.parts.data[id].temp =
                        (sim.parts.data[id].temp + 200.0 * (1 + explosive) as f32)
                            .min(crate::config::MAX_TEMP);
                    if explosive > 0 {
                        sim.add_pressure(x + dx, y + dy, 0.25 * explosive as f32);
                    }
                }
            }
        }
    }
}

fn update_fire(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    ignite_neighbors(sim, ctx.x, ctx.y);
    // Burned cold (water contact drains heat fast): fade into smoke
    // instead of vanishing.
    if sim.parts.data[ctx.i].temp < 500.0 {
        sim.part_change_type(ctx.i, ctx.x, ctx.y, PT_SMKE);
        sim.parts.data[ctx.i].life = 30 + sim.rng.between(0, 20);
        return true;
    }
    false
}

fn create_fire(sim: &mut Simulation, i: usize, _x: i32, _y: i32, _t: i32, _v: i32) {
    sim.parts.data[i].life = 160 + sim.rng.between(0, 40);
}

fn create_smke(sim: &mut Simulation, i: usize, _x: i32, _y: i32, _t: i32, _v: i32) {
    sim.parts.data[i].life = 220 + sim.rng.between(0, 60);
}

/// Adapted from the classic variable-pressure gas: pressure in the
/// neighborhood is pulled toward a temperature-derived target, water is
/// fogged into steam, oxygen is bound into water.
fn update_boyl(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let limit = sim.parts.data[ctx.i].temp / 100.0;
    let (cx, cy) = sim.cell_of(ctx.x, ctx.y);
    for (dx, dy, only_below_limit) in [
        (0, 0, true),
        (0, 1, true),
        (0, -1, true),
        (1, 0, false),
        (1, 1, false),
        (-1, 0, false),
        (-1, -1, false),
    ] {
        if let Some(pv) = sim.pv.get_mut(cx + dx, cy + dy) {
            if !only_below_limit || *pv < limit {
                *pv = (*pv + 0.001 * (limit - *pv)).clamp(-MAX_PRESSURE, MAX_PRESSURE);
            }
        }
    }
    for ry in -1..=1 {
        for rx in -1..=1 {
            if rx == 0 && ry == 0 {
                continue;
            }
            let r = sim.pmap_at(ctx.x + rx, ctx.y + ry);
            if r == 0 {
                continue;
            }
            match pmap_typ(r) {
                PT_WATR => {
                    if sim.rng.chance(1, 30) {
                        sim.part_change_type(pmap_id(r), ctx.x + rx, ctx.y + ry, PT_STEM);
                    }
                }
                PT_O2 => {
                    if sim.rng.chance(1, 9) {
                        sim.kill_part(pmap_id(r));
                        sim.part_change_type(ctx.i, ctx.x, ctx.y, PT_WATR);
                        sim.add_pressure(ctx.x, ctx.y, 4.0);
                        return true;
                    }
                }
                _ => {}
            }
        }
    }
    false
}

fn graphics_fire(
    _sim: &RenderableSimulation,
    part: &crate::parts::Particle,
    _nx: i32,
    _ny: i32,
    out: &mut GraphicsOutput,
) {
    // Fire renders only through the fire plane; life drives intensity.
    let life = part.life.clamp(0, 200);
    out.pixel_mode = PMODE_NONE | FIRE_ADD;
    out.firea = (life + 55).min(255);
    out.firer = 255;
    out.fireg = (life / 2 + 60).min(255);
    out.fireb = 30;
}
