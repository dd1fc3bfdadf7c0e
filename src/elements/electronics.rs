//! Electronics - sparks, semiconductors, wireless

use crate::elements::{
    Element, MenuSection, UpdateCtx, PERSIST_CTYPE, PERSIST_LIFE, PERSIST_TMP, PROP_CONDUCTS,
    PT_INSL, PT_METL, PT_NSCN, PT_PSCN, PT_SPRK, PT_WIFI, TYPE_SOLID,
};
use crate::parts::{pmap_id, pmap_typ};
use crate::render::{GraphicsOutput, PMODE_GLOW, PMODE_SPARK};
use crate::simulation::{RenderableSimulation, Simulation};

pub(super) fn register(elements: &mut [Element], _cfds: f32) {
    elements[PT_SPRK as usize] = sprk();
    elements[PT_PSCN as usize] = semiconductor("DEFAULT_PT_PSCN", "PSCN", 0xFF805080, "P-type silicon. Sparks anything conductive.");
    elements[PT_NSCN as usize] = semiconductor("DEFAULT_PT_NSCN", "NSCN", 0xFF505080, "N-type silicon. Only accepts sparks from PSCN.");
    elements[PT_WIFI as usize] = wifi();
}

fn semiconductor(identifier: &str, name: &str, colour: u32, description: &str) -> Element {
    let mut el = Element::base();
    el.identifier = identifier.into();
    el.name = name.into();
    el.colour = colour;
    el.menu_visible = true;
    el.menu_section = MenuSection::Electronics;
    el.enabled = true;
    el.weight = 100;
    el.hardness = 1;
    el.heat_conduct = 251;
    el.description = description.into();
    el.properties = TYPE_SOLID | PROP_CONDUCTS;
    el
}

fn sprk() -> Element {
    let mut el = Element::base();
    el.identifier = "DEFAULT_PT_SPRK".into();
    el.name = "SPRK".into();
    el.colour = 0xFFFFFF80;
    el.menu_visible = true;
    el.menu_section = MenuSection::Electronics;
    el.enabled = true;
    el.weight = 100;
    el.hardness = 1;
    el.heat_conduct = 251;
    el.description = "Electricity. Conducted along metals and silicon.".into();
    el.properties = TYPE_SOLID;
    el.persist |= PERSIST_LIFE | PERSIST_CTYPE;
    el.update = Some(update_sprk);
    el.graphics = Some(graphics_sprk);
    el
}

fn wifi() -> Element {
    let mut el = Element::base();
    el.identifier = "DEFAULT_PT_WIFI".into();
    el.name = "WIFI".into();
    el.colour = 0xFF40A060;
    el.menu_visible = true;
    el.menu_section = MenuSection::Electronics;
    el.enabled = true;
    el.weight = 100;
    el.hardness = 1;
    el.heat_conduct = 0;
    el.description = "Wireless transmitter. Channel set by temperature.".into();
    el.properties = TYPE_SOLID;
    el.persist |= PERSIST_TMP;
    el.update = Some(update_wifi);
    el
}

/// May a spark jump from a conductor of type `src` into `dst`?
pub(crate) fn can_conduct(src: i32, dst: i32) -> bool {
    if dst == PT_INSL {
        return false;
    }
    // NSCN only accepts charge from PSCN; PSCN refuses charge from NSCN.
    if dst == PT_NSCN && src != PT_PSCN {
        return false;
    }
    if dst == PT_PSCN && src == PT_NSCN {
        return false;
    }
    true
}

/// Spark lifecycle: conduct outward on the first frame, then burn down
/// `life` and return to the carried conductor type with a settle delay.
fn update_sprk(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let part = sim.parts.data[ctx.i];
    let src = part.ctype;
    let (cx, cy) = sim.cell_of(ctx.x, ctx.y);
    sim.set_emap(cx, cy);

    if part.life == 4 {
        // Freshly sparked: energize neighboring conductors at rest.
        for dy in -2i32..=2 {
            for dx in -2i32..=2 {
                if dx == 0 && dy == 0 || dx.abs() + dy.abs() > 2 {
                    continue;
                }
                let (nx, ny) = (ctx.x + dx, ctx.y + dy);
                let r = sim.pmap_at(nx, ny);
                if r == 0 {
                    continue;
                }
                let rt = pmap_typ(r);
                let id = pmap_id(r);
                if rt == PT_SPRK || sim.elements.get(rt).properties & PROP_CONDUCTS == 0 {
                    continue;
                }
                if !can_conduct(src, rt) || sim.parts.data[id].life != 0 {
                    continue;
                }
                // Insulated across the diagonal gap.
                if dx.abs() == 2 || dy.abs() == 2 {
                    let (mx, my) = (ctx.x + dx.signum(), ctx.y + dy.signum());
                    let mid = sim.pmap_at(mx, my);
                    if mid != 0 && pmap_typ(mid) == PT_INSL {
                        continue;
                    }
                }
                sim.spark_particle(id, nx, ny);
            }
        }
    }

    if sim.parts.data[ctx.i].life == 0 {
        // Burned out: become the conductor again, with a cooldown that
        // stops the same site re-sparking immediately. The dispatcher
        // counts conductor cooldowns back down to zero.
        let back = if sim.elements.valid(src) { src } else { PT_METL };
        if sim.part_change_type(ctx.i, ctx.x, ctx.y, back) {
            sim.parts.data[ctx.i].ctype = 0;
            sim.parts.data[ctx.i].life = 4;
        }
        return true;
    }
    sim.parts.data[ctx.i].life -= 1;
    false
}

/// Wireless: a spark beside the element raises its channel next frame;
/// an active channel sparks adjacent conductors.
fn update_wifi(sim: &mut Simulation, ctx: UpdateCtx) -> bool {
    let channel = Simulation::temp_to_channel(sim.parts.data[ctx.i].temp);
    if sim.wireless[channel][0] != 0 {
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let (nx, ny) = (ctx.x + dx, ctx.y + dy);
            let r = sim.pmap_at(nx, ny);
            if r == 0 {
                continue;
            }
            let rt = pmap_typ(r);
            let id = pmap_id(r);
            if rt != PT_SPRK
                && sim.elements.get(rt).properties & PROP_CONDUCTS != 0
                && sim.parts.data[id].life == 0
            {
                sim.spark_particle(id, nx, ny);
            }
        }
    }
    for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        let r = sim.pmap_at(ctx.x + dx, ctx.y + dy);
        if r != 0 && pmap_typ(r) == PT_SPRK {
            sim.wireless[channel][1] = 1;
        }
    }
    false
}

fn graphics_sprk(
    _sim: &RenderableSimulation,
    part: &crate::parts::Particle,
    _nx: i32,
    _ny: i32,
    out: &mut GraphicsOutput,
) {
    let fade = (part.life * 40).clamp(0, 255);
    out.pixel_mode = PMODE_GLOW | PMODE_SPARK;
    out.cola = fade.max(80);
}
