//! Liquid elements

use crate::config::R_TEMP;
use crate::elements::{
    Element, MenuSection, UpdateCtx, PERSIST_CTYPE, PERSIST_LIFE, PROP_CONDUCTS, PROP_HOT_GLOW,
    PROP_NEUTPASS, PT_ICE, PT_LAVA, PT_NITR, PT_OIL, PT_STEM, PT_STNE, PT_WATR, ST, TYPE_LIQUID,
};
use crate::parts::{pmap_id, pmap_typ};
use crate::render::{GraphicsOutput, FIRE_ADD, PMODE_FLAT};
use crate::simulation::{RenderableSimulation, Simulation};

pub(super) fn register(elements: &mut [Element], cfds: f32) {
    elements[PT_WATR as usize] = watr(cfds);
    elements[PT_OIL as usize] = oil(cfds);
    elements[PT_NITR as usize] = nitr(cfds);
    elements[PT_LAVA as usize] = lava(cfds);
}

fn liquid_base(cfds: f32) -> Element {
    let mut el = Element::base();
    el.menu_visible = true;
    el.menu_section = MenuSection::Liquids;
    el.enabled = true;
    el.advection = 0.6;
    el.air_drag = 0.01 * cfds;
    el.air_loss = 0.98;
    el.loss = 0.95;
    el.gravity = 0.1;
    el.falldown = 2;
    el.hardness = 20;
    el.weight = 30;
    el.properties = TYPE_LIQUID;
    el
}

fn watr(cfds: f32) -> Element {
    let mut el = liquid_base(cfds);
    el.identifier = "DEFAULT_PT_WATR".into();
    el.name = "WATR".into();
    el.colour = 0xFF2030D0;
    el.heat_conduct = 29;
    el.default_properties.temp = R_TEMP - 2.0 + 273.15;
    el.description = "Water. Conducts electricity, freezes and boils.".into();
    el.properties |= PROP_CONDUCTS | PROP_NEUTPASS;
    el.low_temperature = 273.15;
    el.low_temperature_transition = PT_ICE;
    el.high_temperature = 373.15;
    el.high_temperature_transition = PT_STEM;
    el.update = Some(update_watr);
    el
}

fn oil(cfds: f32) -> Element {
    let mut el = liquid_base(cfds);
    el.identifier = "DEFAULT_PT_OIL".into();
    el.name = "OIL".into();
    el.colour = 0xFF404010;
    el.weight = 20;
    el.flammable = 20;
    el.heat_conduct = 42;
    el.description = "Flammable, lighter than water.".into();
    el
}

fn nitr(cfds: f32) -> Element {
    let mut el = liquid_base(cfds);
    el.identifier = "DEFAULT_PT_NITR".into();
    el.name = "NITR".into();
    el.colour = 0xFF20E010;
    el.weight = 23;
    el.flammable = 1000;
    el.explosive = 2;
    el.heat_conduct = 50;
    el.description = "Nitroglycerin. Explodes under pressure and heat.".into();
    el
}

fn lava(cfds: f32) -> Element {
    let mut el = liquid_base(cfds);
    el.identifier = "DEFAULT_PT_LAVA".into();
    el.name = "LAVA".into();
    el.colour = 0xFFE05010;
    el.advection = 0.3;
    el.loss = 0.80;
    el.weight = 45;
    el.hardness = 2;
    el.heat_conduct = 60;
    el.default_properties.temp = 1522.0 + 273.15;
    el.description = "Molten rock. Solidifies into what it was melted from.".into();
    el.properties |= PROP_HOT_GLOW;
    el.persist |= PERSIST_CTYPE | PERSIST_LIFE;
    // Solidification needs the ctype, so it routes through special code.
    el.low_temperature = 973.15;
    el.low_temperature_transition = ST;
    el.update = Some(update_lava);
    el.create = Some(create_lava);
    el.graphics = Some(graphics_lava);
    el
}

/// Water quenches adjacent lava into stone, flashing to steam.
fn update_watr(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let r = sim.pmap_at(ctx.x + dx, ctx.y + dy);
            if r != 0 && pmap_typ(r) == PT_LAVA {
                let id = pmap_id(r);
                sim.part_change_type(id, ctx.x + dx, ctx.y + dy, PT_STNE);
                sim.parts.data[id].temp = 500.0;
                sim.part_change_type(ctx.i, ctx.x, ctx.y, PT_STEM);
                sim.parts.data[ctx.i].temp = 383.15;
                return true;
            }
        }
    }
    false
}

fn update_lava(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    crate::elements::gases::ignite_neighbors(sim, ctx.x, ctx.y);
    false
}

fn create_lava(sim: &mut Simulation, i: usize, _x: i32, _y: i32, _t: i32, v: i32) {
    // Freshly painted lava is molten stone unless told otherwise.
    sim.parts.data[i].ctype = if v > 0 { v } else { PT_STNE };
}

fn graphics_lava(
    _sim: &RenderableSimulation,
    part: &crate::parts::Particle,
    _nx: i32,
    _ny: i32,
    out: &mut GraphicsOutput,
) {
    // Hotter lava glows toward yellow and feeds the fire plane.
    let heat = ((part.temp - 973.15) / 1200.0).clamp(0.0, 1.0);
    out.colr = (out.colr as f32 + heat * 60.0) as i32;
    out.colg = (out.colg as f32 + heat * 90.0) as i32;
    out.pixel_mode = PMODE_FLAT | FIRE_ADD;
    out.firea = 40;
    out.firer = out.colr / 2;
    out.fireg = out.colg / 4;
    out.fireb = out.colb / 8;
}
