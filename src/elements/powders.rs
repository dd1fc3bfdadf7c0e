//! Powder elements

use crate::config::R_TEMP;
use crate::elements::{
    Element, MenuSection, UpdateCtx, PERSIST_LIFE, PERSIST_TMP, PROP_HOT_GLOW, PROP_LIFE_DEC,
    PROP_LIFE_KILL, PROP_NEUTPASS, PROP_RADIOACTIVE, PT_EMBR, PT_DUST, PT_GUNP, PT_LAVA, PT_NEUT,
    PT_PLUT, PT_SNOW, PT_STNE, PT_WATR, TYPE_PART,
};
use crate::render::{GraphicsOutput, FIRE_ADD, PMODE_ADD, PMODE_FLAT};
use crate::simulation::{RenderableSimulation, Simulation};

pub(super) fn register(elements: &mut [Element], cfds: f32) {
    elements[PT_DUST as usize] = dust(cfds);
    elements[PT_STNE as usize] = stne(cfds);
    elements[PT_GUNP as usize] = gunp(cfds);
    elements[PT_PLUT as usize] = plut(cfds);
    elements[PT_SNOW as usize] = snow(cfds);
    elements[PT_EMBR as usize] = embr(cfds);
}

fn powder_base(cfds: f32) -> Element {
    let mut el = Element::base();
    el.menu_visible = true;
    el.menu_section = MenuSection::Powders;
    el.enabled = true;
    el.advection = 0.7;
    el.air_drag = 0.02 * cfds;
    el.air_loss = 0.96;
    el.loss = 0.80;
    el.gravity = 0.1;
    el.falldown = 1;
    el.hardness = 30;
    el.weight = 85;
    el.properties = TYPE_PART;
    el
}

fn dust(cfds: f32) -> Element {
    let mut el = powder_base(cfds);
    el.identifier = "DEFAULT_PT_DUST".into();
    el.name = "DUST".into();
    el.colour = 0xFFFFE0A0;
    el.flammable = 10;
    el.heat_conduct = 70;
    el.description = "Very light dust. Flammable.".into();
    el
}

fn stne(cfds: f32) -> Element {
    let mut el = powder_base(cfds);
    el.identifier = "DEFAULT_PT_STNE".into();
    el.name = "STNE".into();
    el.colour = 0xFFA0A0A0;
    el.advection = 0.4;
    el.air_drag = 0.04 * cfds;
    el.air_loss = 0.94;
    el.loss = 0.95;
    el.gravity = 0.3;
    el.weight = 90;
    el.heat_conduct = 150;
    el.description = "Heavy particles. Meltable.".into();
    el.meltable = 5;
    el.high_temperature = 983.0;
    el.high_temperature_transition = PT_LAVA;
    el
}

fn gunp(cfds: f32) -> Element {
    let mut el = powder_base(cfds);
    el.identifier = "DEFAULT_PT_GUNP".into();
    el.name = "GUNP".into();
    el.colour = 0xFFC0C0D0;
    el.flammable = 600;
    el.explosive = 1;
    el.heat_conduct = 97;
    el.description = "Light dust. Explosive.".into();
    el
}

fn plut(cfds: f32) -> Element {
    let mut el = powder_base(cfds);
    el.identifier = "DEFAULT_PT_PLUT".into();
    el.name = "PLUT".into();
    el.colour = 0xFF407020;
    el.advection = 0.4;
    el.loss = 0.95;
    el.gravity = 0.4;
    el.weight = 90;
    el.heat_conduct = 251;
    el.description = "Plutonium. Heavy, fissile particles.".into();
    el.properties |= PROP_RADIOACTIVE | PROP_NEUTPASS;
    el.persist |= PERSIST_LIFE;
    el.update = Some(update_plut);
    el
}

fn snow(cfds: f32) -> Element {
    let mut el = powder_base(cfds);
    el.identifier = "DEFAULT_PT_SNOW".into();
    el.name = "SNOW".into();
    el.colour = 0xFFC0E0FF;
    el.loss = 0.90;
    el.gravity = 0.05;
    el.weight = 50;
    el.heat_conduct = 46;
    el.default_properties.temp = 253.15;
    el.description = "Light snow. Melts into water.".into();
    el.high_temperature = 273.15;
    el.high_temperature_transition = PT_WATR;
    el
}

fn embr(cfds: f32) -> Element {
    let mut el = powder_base(cfds);
    el.identifier = "DEFAULT_PT_EMBR".into();
    el.name = "EMBR".into();
    el.colour = 0xFFFFF288;
    el.air_loss = 0.94;
    el.loss = 0.95;
    el.gravity = 0.07;
    el.weight = 70;
    el.hardness = 0;
    el.heat_conduct = 30;
    el.default_properties.temp = R_TEMP + 800.0 + 273.15;
    el.default_properties.life = 50;
    el.description = "Sparks and embers. Formed by explosions.".into();
    el.properties |= PROP_LIFE_DEC | PROP_LIFE_KILL | PROP_HOT_GLOW;
    el.persist |= PERSIST_LIFE | PERSIST_TMP;
    el.graphics = Some(graphics_embr);
    el
}

/// Spontaneous and pressure-assisted neutron emission.
fn update_plut(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let pressure = {
        let (cx, cy) = sim.cell_of(ctx.x, ctx.y);
        sim.pv[(cx, cy)]
    };
    let den = if pressure > 10.0 { 1000 } else { 10000 };
    if sim.rng.chance(1, den) {
        let j = sim.create_part(-2, ctx.x, ctx.y, PT_NEUT);
        if j >= 0 {
            let angle = sim.rng.uniform01() * std::f32::consts::TAU;
            sim.parts.data[j as usize].vx = 2.5 * angle.cos();
            sim.parts.data[j as usize].vy = 2.5 * angle.sin();
        }
    }
    false
}

fn graphics_embr(
    _sim: &RenderableSimulation,
    part: &crate::parts::Particle,
    _nx: i32,
    _ny: i32,
    out: &mut GraphicsOutput,
) {
    let fade = (part.life.clamp(0, 50) * 5).min(255);
    out.pixel_mode = PMODE_FLAT | PMODE_ADD | FIRE_ADD;
    out.cola = fade;
    out.firea = fade / 2;
    out.firer = out.colr;
    out.fireg = out.colg;
    out.fireb = out.colb;
}
