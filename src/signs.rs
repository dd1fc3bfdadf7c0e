//! Signs - positioned text labels with dynamic templates
//!
//! Signs are read-only to the sim tick and edited only under the UI lock.
//! Display text supports value templates (`{t}`, `{p}`, ...) resolved
//! against the simulation state at the sign's position, a button splitter
//! `{b|label}` and link markers `{s:id}` / `{t:id}` / `{w:query}`.

use crate::simulation::RenderableSimulation;
use crate::walls::wall_info;

pub const MAX_SIGN_TEXT: usize = 45;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Justification {
    Left,
    Centre,
    Right,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignLink {
    None,
    /// `{b|...}` button.
    Button,
    /// `{s:id}` save link.
    Save(i32),
    /// `{t:id}` thread link.
    Thread(i32),
    /// `{w:query}` search link.
    Search,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sign {
    pub x: i32,
    pub y: i32,
    pub ju: Justification,
    pub text: String,
}

impl Sign {
    pub fn new(x: i32, y: i32, ju: Justification, text: impl Into<String>) -> Self {
        let mut text: String = text.into();
        if text.chars().count() > MAX_SIGN_TEXT {
            text = text.chars().take(MAX_SIGN_TEXT).collect();
        }
        Sign { x, y, ju, text }
    }

    /// Resolve templates against the sim state under the sign and classify
    /// the link the sign carries.
    pub fn display_text(&self, sim: &RenderableSimulation) -> (String, SignLink) {
        let sample = sim.sample_under(self.x, self.y);

        // Link markers wrap the whole sign: {b|label}, {s:id|label}, ...
        if let Some(inner) = self.text.strip_prefix("{b|").and_then(|s| s.strip_suffix('}')) {
            return (inner.to_owned(), SignLink::Button);
        }
        if let Some(rest) = self.text.strip_prefix("{s:").and_then(|s| s.strip_suffix('}')) {
            let (id, label) = rest.split_once('|').unwrap_or((rest, rest));
            if let Ok(id) = id.parse::<i32>() {
                return (label.to_owned(), SignLink::Save(id));
            }
        }
        if let Some(rest) = self.text.strip_prefix("{t:").and_then(|s| s.strip_suffix('}')) {
            let (id, label) = rest.split_once('|').unwrap_or((rest, rest));
            if let Ok(id) = id.parse::<i32>() {
                return (label.to_owned(), SignLink::Thread(id));
            }
        }
        if let Some(rest) = self.text.strip_prefix("{w:").and_then(|s| s.strip_suffix('}')) {
            let (_, label) = rest.split_once('|').unwrap_or((rest, rest));
            return (label.to_owned(), SignLink::Search);
        }

        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text.as_str();
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            rest = &rest[open..];
            let Some(close) = rest.find('}') else {
                out.push_str(rest);
                rest = "";
                break;
            };
            let key = &rest[1..close];
            match key {
                "t" => out.push_str(&format!("{:.2}", sample.temp)),
                "p" => out.push_str(&format!("{:.2}", sample.pressure)),
                "aheat" => out.push_str(&format!("{:.2}", sample.ambient_heat)),
                "type" => out.push_str(&sample.ptype.to_string()),
                "ctype" => out.push_str(&sample.ctype.to_string()),
                "life" => out.push_str(&sample.life.to_string()),
                "tmp" => out.push_str(&sample.tmp.to_string()),
                "tmp2" => out.push_str(&sample.tmp2.to_string()),
                "pt" => out.push_str(&sample.element_name),
                "wt" => out.push_str(&sample.wall_name),
                _ => {
                    // Unknown template passes through verbatim.
                    out.push_str(&rest[..=close]);
                }
            }
            rest = &rest[close + 1..];
        }
        out.push_str(rest);
        (out, SignLink::None)
    }

    /// True if the sign sits inside the given pixel rectangle.
    pub fn in_area(&self, x: i32, y: i32, w: i32, h: i32) -> bool {
        !self.text.is_empty() && self.x >= x && self.y >= y && self.x <= x + w && self.y <= y + h
    }
}

/// Values a sign template reads from the simulation under its anchor.
#[derive(Clone, Debug, Default)]
pub struct SignSample {
    pub temp: f32,
    pub pressure: f32,
    pub ambient_heat: f32,
    pub ptype: i32,
    pub ctype: i32,
    pub life: i32,
    pub tmp: i32,
    pub tmp2: i32,
    pub element_name: String,
    pub wall_name: String,
}

impl RenderableSimulation {
    pub(crate) fn sample_under(&self, x: i32, y: i32) -> SignSample {
        let mut sample = SignSample::default();
        if !self.cfg.in_bounds(x, y) {
            return sample;
        }
        let (cx, cy) = (x / self.cfg.cell, y / self.cfg.cell);
        sample.pressure = self.pv[(cx, cy)];
        sample.ambient_heat = self.hv[(cx, cy)];
        sample.wall_name = wall_info(self.bmap[(cx, cy)]).name.to_owned();
        // Topmost particle under the sign anchor; the renderable view has
        // no pmap, a bounded scan is fine for 16 signs.
        for (_, part) in self.parts.iter_live() {
            if (part.x + 0.5) as i32 == x && (part.y + 0.5) as i32 == y {
                sample.temp = part.temp;
                sample.ptype = part.ptype;
                sample.ctype = part.ctype;
                sample.life = part.life;
                sample.tmp = part.tmp;
                sample.tmp2 = part.tmp2;
                sample.element_name = self.elements.get(part.ptype).name.clone();
            }
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_text_is_truncated() {
        let long = "x".repeat(100);
        let sign = Sign::new(0, 0, Justification::Left, long);
        assert_eq!(sign.text.chars().count(), MAX_SIGN_TEXT);
    }

    #[test]
    fn in_area_ignores_empty_signs() {
        let sign = Sign::new(5, 5, Justification::None, "");
        assert!(!sign.in_area(0, 0, 10, 10));
    }
}
