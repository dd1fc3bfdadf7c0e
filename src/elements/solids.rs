//! Solid elements

use crate::config::R_TEMP;
use crate::elements::{
    Element, MenuSection, UpdateCtx, PERSIST_CTYPE, PERSIST_LIFE, PERSIST_TMP, PERSIST_TMP2,
    PROP_CONDUCTS, PROP_HOT_GLOW, PROP_NEUTPASS, PT_COAL, PT_DMND, PT_FILT, PT_FIRE, PT_GLAS,
    PT_GOLD, PT_GOO, PT_ICE, PT_INSL, PT_LAVA, PT_METL, PT_PLNT, PT_SMKE, PT_STOR, PT_WATR,
    PT_WOOD, ST, TYPE_SOLID,
};
use crate::parts::{pmap_id, pmap_typ};
use crate::render::{GraphicsOutput, PMODE_FLAT, NO_DECO};
use crate::simulation::{RenderableSimulation, Simulation};

pub(super) fn register(elements: &mut [Element], _cfds: f32) {
    elements[PT_GLAS as usize] = glas();
    elements[PT_PLNT as usize] = plnt();
    elements[PT_GOO as usize] = goo();
    elements[PT_ICE as usize] = ice();
    elements[PT_METL as usize] = metl();
    elements[PT_WOOD as usize] = wood();
    elements[PT_COAL as usize] = coal();
    elements[PT_INSL as usize] = insl();
    elements[PT_DMND as usize] = dmnd();
    elements[PT_GOLD as usize] = gold();
    elements[PT_STOR as usize] = stor();
    elements[PT_FILT as usize] = filt();
}

fn solid_base() -> Element {
    let mut el = Element::base();
    el.menu_visible = true;
    el.menu_section = MenuSection::Solids;
    el.enabled = true;
    el.weight = 100;
    el.properties = TYPE_SOLID;
    el
}

fn glas() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_GLAS".into();
    el.name = "GLAS".into();
    el.colour = 0xFF404040;
    el.hardness = 0;
    el.heat_conduct = 150;
    el.description = "Glass. Refracts and disperses photons.".into();
    el.properties |= PROP_HOT_GLOW | PROP_NEUTPASS;
    el.high_pressure = 100.0;
    el.high_pressure_transition = crate::elements::PT_NONE;
    el
}

fn plnt() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_PLNT".into();
    el.name = "PLNT".into();
    el.colour = 0xFF0CAC00;
    el.flammable = 20;
    el.hardness = 10;
    el.heat_conduct = 65;
    el.description = "Plant. Drinks water and grows.".into();
    el.high_temperature = 573.15;
    el.high_temperature_transition = PT_FIRE;
    el.update = Some(update_plnt);
    el
}

fn goo() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_GOO".into();
    el.name = "GOO".into();
    el.colour = 0xFF804000;
    el.hardness = 12;
    el.weight = 100;
    // Movable solid: the pressure response in its update sets velocity.
    el.falldown = 1;
    el.heat_conduct = 75;
    el.description = "Deforms and disperses under pressure.".into();
    el.persist |= PERSIST_LIFE;
    el.update = Some(update_goo);
    el
}

fn ice() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_ICE".into();
    el.name = "ICE".into();
    el.colour = 0xFFA0C0FF;
    el.hardness = 20;
    el.heat_conduct = 46;
    el.default_properties.temp = 253.15;
    el.default_properties.ctype = PT_WATR;
    el.description = "Ice. Melts into its carried type.".into();
    el.properties |= PROP_NEUTPASS;
    el.persist |= PERSIST_CTYPE;
    // Melts into ctype, which needs special code.
    el.high_temperature = 273.15;
    el.high_temperature_transition = ST;
    el
}

fn metl() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_METL".into();
    el.name = "METL".into();
    el.colour = 0xFF404060;
    el.hardness = 1;
    el.heat_conduct = 251;
    el.description = "Metal. Conducts electricity, meltable.".into();
    el.properties |= PROP_CONDUCTS | PROP_HOT_GLOW;
    el.meltable = 1;
    el.high_temperature = 1273.15;
    el.high_temperature_transition = PT_LAVA;
    el
}

fn wood() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_WOOD".into();
    el.name = "WOOD".into();
    el.colour = 0xFFC0A040;
    el.flammable = 20;
    el.hardness = 15;
    el.heat_conduct = 164;
    el.description = "Wood. Chars into coal when burned.".into();
    el.high_temperature = 873.15;
    el.high_temperature_transition = PT_COAL;
    el
}

fn coal() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_COAL".into();
    el.name = "COAL".into();
    el.colour = 0xFF222222;
    el.flammable = 0;
    el.hardness = 5;
    el.heat_conduct = 200;
    el.default_properties.life = 110;
    el.description = "Coal. Burns slowly, holds a lot of heat.".into();
    el.persist |= PERSIST_LIFE | PERSIST_TMP;
    el.update = Some(update_coal);
    el
}

fn insl() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_INSL".into();
    el.name = "INSL".into();
    el.colour = 0xFF9EA3B6;
    el.hardness = 10;
    el.heat_conduct = 0;
    el.description = "Insulator. Blocks heat and electricity.".into();
    el
}

fn dmnd() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_DMND".into();
    el.name = "DMND".into();
    el.colour = 0xFFCCFFFF;
    el.hardness = 0;
    el.heat_conduct = 186;
    el.description = "Diamond. Indestructible.".into();
    el.properties |= PROP_NEUTPASS;
    el
}

fn gold() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_GOLD".into();
    el.name = "GOLD".into();
    el.colour = 0xFFDCAD2C;
    el.hardness = 0;
    el.heat_conduct = 251;
    el.description = "Corrosion-resistant metal.".into();
    el.properties |= PROP_CONDUCTS | PROP_NEUTPASS;
    el.meltable = 1;
    el.high_temperature = 1337.0;
    el.high_temperature_transition = PT_LAVA;
    el
}

fn stor() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_STOR".into();
    el.name = "STOR".into();
    el.colour = 0xFF50DFDF;
    el.hardness = 1;
    el.heat_conduct = 0;
    el.description = "Storage. Captures a particle, releases it when sparked.".into();
    el.properties |= crate::elements::PROP_POWERED;
    el.persist |= PERSIST_TMP | PERSIST_TMP2 | PERSIST_CTYPE;
    el.update = Some(update_stor);
    el
}

fn filt() -> Element {
    let mut el = solid_base();
    el.identifier = "DEFAULT_PT_FILT".into();
    el.name = "FILT".into();
    el.colour = 0xFF000056;
    el.hardness = 1;
    el.heat_conduct = 251;
    el.description = "Filter for photons. Changes their wavelengths.".into();
    el.persist |= PERSIST_CTYPE | PERSIST_TMP;
    el.graphics = Some(graphics_filt);
    el
}

/// Plants drink adjacent water and grow into it.
fn update_plnt(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let r = sim.pmap_at(ctx.x + dx, ctx.y + dy);
            if r != 0 && pmap_typ(r) == PT_WATR && sim.rng.chance(1, 60) {
                sim.part_change_type(pmap_id(r), ctx.x + dx, ctx.y + dy, PT_PLNT);
            }
        }
    }
    false
}

/// Goo liquefies briefly when pressure pushes on it.
fn update_goo(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let (cx, cy) = sim.cell_of(ctx.x, ctx.y);
    let pressure = sim.pv[(cx, cy)].abs();
    let part = &mut sim.parts.data[ctx.i];
    if part.life > 0 {
        part.life -= 1;
        part.vx += (sim.vx[(cx, cy)]) * 0.5;
        part.vy += (sim.vy[(cx, cy)]) * 0.5;
    } else if pressure > 1.0 {
        part.life = 80;
    }
    false
}

/// Coal burns down its life while hot, then turns to fire.
fn update_coal(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let part = sim.parts.data[ctx.i];
    if part.temp > 573.15 {
        if part.life > 0 {
            sim.parts.data[ctx.i].life -= 1;
            if sim.rng.chance(1, 30) {
                let j = sim.create_part(-2, ctx.x, ctx.y - 1, PT_FIRE);
                if j < 0 {
                    sim.create_part(-2, ctx.x, ctx.y + 1, PT_SMKE);
                }
            }
        } else {
            sim.part_change_type(ctx.i, ctx.x, ctx.y, PT_FIRE);
            return true;
        }
    }
    false
}

/// Storage: empty cells capture the first movable neighbor; a spark from
/// a conductor releases the stored particle into a free neighbor cell.
fn update_stor(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let stored = sim.parts.data[ctx.i].tmp;
    let sparked = {
        let mut sparked = false;
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let r = sim.pmap_at(ctx.x + dx, ctx.y + dy);
            if r != 0 && pmap_typ(r) == crate::elements::PT_SPRK {
                sparked = true;
                break;
            }
        }
        sparked
    };
    if stored == 0 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let r = sim.pmap_at(ctx.x + dx, ctx.y + dy);
                if r == 0 {
                    continue;
                }
                let rt = pmap_typ(r);
                let props = sim.elements.get(rt).properties;
                if props & TYPE_SOLID == 0 && rt != crate::elements::PT_SPRK {
                    let id = pmap_id(r);
                    sim.parts.data[ctx.i].tmp = rt;
                    sim.parts.data[ctx.i].tmp2 = sim.parts.data[id].ctype;
                    sim.kill_part(id);
                    return false;
                }
            }
        }
    } else if sparked {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let j = sim.create_part(-2, ctx.x + dx, ctx.y + dy, stored);
                if j >= 0 {
                    sim.parts.data[j as usize].ctype = sim.parts.data[ctx.i].tmp2;
                    sim.parts.data[ctx.i].tmp = 0;
                    sim.parts.data[ctx.i].tmp2 = 0;
                    return false;
                }
            }
        }
    }
    false
}

fn graphics_filt(
    _sim: &RenderableSimulation,
    part: &crate::parts::Particle,
    _nx: i32,
    _ny: i32,
    out: &mut GraphicsOutput,
) {
    // Tint by the carried wavelengths so filter stacks read visually.
    let (r, g, b) = crate::elements::energy::wavelengths_to_colour(part.ctype);
    if part.ctype != 0 {
        out.colr = r;
        out.colg = g;
        out.colb = b;
    }
    out.cola = 170;
    out.pixel_mode = PMODE_FLAT | NO_DECO;
}
