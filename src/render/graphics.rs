//! Default particle appearance and color modes

use crate::config::R_TEMP;
use crate::elements::{PROP_HOT_GLOW, PROP_LIFE};
use crate::parts::Particle;
use crate::render::{
    ColourMode, GraphicsOutput, RendererStats, FIRE_ADD, PMODE_FLAT,
};
use crate::simulation::RenderableSimulation;

/// Build the pre-callback output: element base color adjusted by the
/// global color mode.
pub(super) fn base_output(
    sim: &RenderableSimulation,
    part: &Particle,
    colour_mode: ColourMode,
    stats: &RendererStats,
) -> GraphicsOutput {
    let el = sim.elements.get(part.ptype);
    let colour = el.colour;
    let mut out = GraphicsOutput {
        pixel_mode: PMODE_FLAT,
        cola: 255,
        colr: ((colour >> 16) & 0xFF) as i32,
        colg: ((colour >> 8) & 0xFF) as i32,
        colb: (colour & 0xFF) as i32,
        ..GraphicsOutput::default()
    };
    match colour_mode {
        ColourMode::Default => {}
        ColourMode::Basic => {
            // Plain element color only; callbacks still run but effects
            // are stripped by the mode mask.
        }
        ColourMode::Heat => {
            let (lo, hi) = if stats.hdisp_limit_valid {
                (stats.hdisp_limit_min, stats.hdisp_limit_max.max(stats.hdisp_limit_min + 1.0))
            } else {
                (0.0, 3500.0 + 273.15)
            };
            let t = ((part.temp - lo) / (hi - lo)).clamp(0.0, 1.0);
            let (r, g, b) = heat_palette(t);
            out.colr = r;
            out.colg = g;
            out.colb = b;
        }
        ColourMode::Life => {
            let v = (part.life.clamp(0, 510) / 2 + 80).min(255);
            out.colr = v;
            out.colg = v;
            out.colb = v;
        }
        ColourMode::Grad => {
            // Shade by vertical position; cheap way to read layering.
            let t = part.y / sim.cfg.yres as f32;
            out.colr = (out.colr as f32 * (1.0 - 0.4 * t)) as i32;
            out.colg = (out.colg as f32 * (1.0 - 0.4 * t)) as i32;
            out.colb = (out.colb as f32 * (1.0 - 0.4 * t)) as i32;
        }
    }
    out
}

/// Appearance for elements without a graphics callback.
pub fn default_graphics(
    sim: &RenderableSimulation,
    part: &Particle,
    _nx: i32,
    _ny: i32,
    out: &mut GraphicsOutput,
) {
    let el = sim.elements.get(part.ptype);
    // Hot metals and glass glow into the fire plane.
    if el.properties & PROP_HOT_GLOW != 0 && part.temp > R_TEMP + 273.15 + 600.0 {
        let glow = (((part.temp - R_TEMP - 273.15 - 600.0) / 1000.0).clamp(0.0, 1.0) * 224.0) as i32;
        out.colr = (out.colr + glow).min(255);
        out.colg = (out.colg + glow / 2).min(255);
        out.pixel_mode |= FIRE_ADD;
        out.firea = glow / 4;
        out.firer = out.colr;
        out.fireg = out.colg / 2;
        out.fireb = 0;
    }
    // Game-of-Life pseudo-elements fade along their two-color gradient
    // through the dying states.
    if el.properties & PROP_LIFE != 0 {
        if let Some(rule) = &el.gol {
            let states = rule.states.max(2) as i32;
            let t = if states > 2 {
                (part.tmp.clamp(0, states - 2)) as f32 / (states - 2) as f32
            } else {
                0.0
            };
            let mix = |a: u32, b: u32, shift: u32| -> i32 {
                let a = ((a >> shift) & 0xFF) as f32;
                let b = ((b >> shift) & 0xFF) as f32;
                (a + (b - a) * t) as i32
            };
            out.colr = mix(rule.colour1, rule.colour2, 16);
            out.colg = mix(rule.colour1, rule.colour2, 8);
            out.colb = mix(rule.colour1, rule.colour2, 0);
        }
    }
}

/// Black-body-ish palette from normalized temperature.
fn heat_palette(t: f32) -> (i32, i32, i32) {
    let stops: [(f32, (i32, i32, i32)); 5] = [
        (0.00, (0, 0, 128)),
        (0.25, (0, 128, 255)),
        (0.50, (64, 255, 64)),
        (0.75, (255, 160, 0)),
        (1.00, (255, 32, 32)),
    ];
    let mut prev = stops[0];
    for &stop in &stops[1..] {
        if t <= stop.0 {
            let span = stop.0 - prev.0;
            let k = if span > 0.0 { (t - prev.0) / span } else { 0.0 };
            let mix = |a: i32, b: i32| (a as f32 + (b as f32 - a as f32) * k) as i32;
            return (
                mix(prev.1 .0, stop.1 .0),
                mix(prev.1 .1, stop.1 .1),
                mix(prev.1 .2, stop.1 .2),
            );
        }
        prev = stop;
    }
    stops[4].1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heat_palette_is_monotone_in_red_at_the_top() {
        let (r1, _, _) = heat_palette(0.8);
        let (r2, _, _) = heat_palette(1.0);
        assert!(r2 >= r1);
        assert_eq!(heat_palette(0.0), (0, 0, 128));
        assert_eq!(heat_palette(1.0), (255, 32, 32));
    }
}
