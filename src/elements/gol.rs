//! Game-of-Life pseudo-elements
//!
//! Every GoL variant is one registry entry driven by the same parametric
//! pass: a 9-bit birth mask, a 9-bit survival mask, a state count for
//! dying-phase rules, and a two-color gradient. Built-in rules occupy a
//! fixed id block; custom rules land above them without renumbering
//! anything.
//!
//! The pass itself is two-phase (count, then apply) so births and deaths
//! within one tick never observe each other.

use serde::{Deserialize, Serialize};

use crate::elements::{Element, ElementRegistry, MenuSection, CUSTOM_GOL_FIRST, PT_GOL_FIRST, TYPE_SOLID};
use crate::parts::{pmap_typ, PT_NUM};
use crate::plane::Plane;
use crate::settings::EdgeMode;
use crate::simulation::Simulation;
use crate::walls::WL_STASIS;

/// Number of built-in rules.
pub const NGOL: usize = 24;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GolRule {
    pub name: String,
    /// Bit n: born with n live neighbors.
    pub begin: u16,
    /// Bit n: survives with n live neighbors.
    pub stay: u16,
    /// Total states; 2 is plain alive/dead, more adds dying phases.
    pub states: u8,
    pub colour1: u32,
    pub colour2: u32,
}

impl GolRule {
    /// Parse `B3/S23` or `B2/S/3` canonical notation.
    pub fn from_canonical(text: &str, colour1: u32, colour2: u32) -> Option<GolRule> {
        let mut begin = 0u16;
        let mut stay = 0u16;
        let mut states = 2u8;
        let mut sections = text.split('/');
        let b = sections.next()?.strip_prefix(['B', 'b'])?;
        let s = sections.next()?.strip_prefix(['S', 's'])?;
        for ch in b.chars() {
            begin |= 1 << ch.to_digit(10)? as u16;
        }
        for ch in s.chars() {
            stay |= 1 << ch.to_digit(10)? as u16;
        }
        if let Some(extra) = sections.next() {
            states = extra.parse().ok()?;
            if states < 2 {
                return None;
            }
        }
        Some(GolRule {
            name: text.to_uppercase(),
            begin,
            stay,
            states,
            colour1,
            colour2,
        })
    }

    pub fn canonical(&self) -> String {
        let digits = |mask: u16| -> String {
            (0..=8).filter(|n| mask & (1 << n) != 0).map(|n| n.to_string()).collect()
        };
        if self.states > 2 {
            format!("B{}/S{}/{}", digits(self.begin), digits(self.stay), self.states)
        } else {
            format!("B{}/S{}", digits(self.begin), digits(self.stay))
        }
    }

    fn named(name: &str, canonical: &str, colour1: u32, colour2: u32) -> GolRule {
        let mut rule = GolRule::from_canonical(canonical, colour1, colour2)
            .unwrap_or(GolRule {
                name: String::new(),
                begin: 0,
                stay: 0,
                states: 2,
                colour1,
                colour2,
            });
        rule.name = name.to_owned();
        rule
    }
}

/// The built-in rule block, in id order from `PT_GOL_FIRST`.
pub fn builtin_rules() -> Vec<GolRule> {
    vec![
        GolRule::named("GOL", "B3/S23", 0xFF0CAC00, 0xFF0A3200),
        GolRule::named("HLIF", "B36/S23", 0xFFFF0000, 0xFF600000),
        GolRule::named("ASIM", "B345/S4567", 0xFF0000FF, 0xFF000080),
        GolRule::named("2X2", "B36/S125", 0xFFFBEC7D, 0xFF766F42),
        GolRule::named("DANI", "B34678/S35678", 0xFF00B7FF, 0xFF0059FF),
        GolRule::named("AMOE", "B357/S1358", 0xFFFF00FF, 0xFF800080),
        GolRule::named("MOVE", "B368/S245", 0xFFFFFF00, 0xFF808000),
        GolRule::named("PGOL", "B357/S238", 0xFF8080FF, 0xFF404080),
        GolRule::named("DMOE", "B35678/S5678", 0xFF20FFE0, 0xFF107F70),
        GolRule::named("34", "B34/S34", 0xFF500AF5, 0xFF28057A),
        GolRule::named("LLIF", "B345/S5", 0xFF9000FF, 0xFF480080),
        GolRule::named("STAN", "B3678/S34678", 0xFF5A5A5A, 0xFF2D2D2D),
        GolRule::named("SEED", "B2/S", 0xFFFBA076, 0xFF7D503B),
        GolRule::named("MAZE", "B3/S12345", 0xFFA8E4A0, 0xFF547250),
        GolRule::named("COAG", "B378/S235678", 0xFF9ACD32, 0xFF4D6619),
        GolRule::named("WALL", "B45678/S2345", 0xFF0047AB, 0xFF002355),
        GolRule::named("GNAR", "B1/S1", 0xFFE5B73B, 0xFF725B1D),
        GolRule::named("REPL", "B1357/S1357", 0xFF6E0C40, 0xFF370620),
        GolRule::named("MYST", "B3458/S05678", 0xFF739BD2, 0xFF394D69),
        GolRule::named("LOTE", "B345/S458/3", 0xFFFF0000, 0xFFFFFF00),
        GolRule::named("FRG2", "B3/S124/3", 0xFF006432, 0xFF00FF5A),
        GolRule::named("STAR", "B278/S3456/6", 0xFF0000E6, 0xFF7575FF),
        GolRule::named("FROG", "B34/S12/3", 0xFF00AA00, 0xFF55FF55),
        GolRule::named("BRAN", "B2/S/3", 0xFFFFFF00, 0xFF969600),
    ]
}

fn gol_element(rule: GolRule) -> Element {
    let mut el = Element::base();
    el.identifier = format!("DEFAULT_PT_LIFE_{}", rule.name);
    el.name = rule.name.clone();
    el.colour = rule.colour1;
    el.menu_visible = true;
    el.menu_section = MenuSection::Life;
    el.enabled = true;
    el.weight = 100;
    el.hardness = 0;
    el.heat_conduct = 40;
    el.description = format!("Cellular automaton {}.", rule.canonical());
    el.properties = TYPE_SOLID | crate::elements::PROP_LIFE;
    // Dying-phase progress lives in tmp and must survive saves.
    el.persist = crate::elements::PERSIST_TMP;
    el.gol = Some(rule);
    el
}

pub(super) fn register_builtin(elements: &mut [Element]) {
    for (offset, rule) in builtin_rules().into_iter().enumerate() {
        elements[PT_GOL_FIRST as usize + offset] = gol_element(rule);
    }
}

pub(super) fn register_custom(elements: &mut Vec<Element>, rule: GolRule) -> Option<i32> {
    for t in CUSTOM_GOL_FIRST as usize..PT_NUM {
        if !elements[t].enabled {
            elements[t] = gol_element(rule);
            return Some(t as i32);
        }
    }
    None
}

pub(super) fn rule_of(registry: &ElementRegistry, t: i32) -> Option<&GolRule> {
    registry.get(t).gol.as_ref()
}

pub(super) fn rule_of_element(element: &Element) -> Option<&GolRule> {
    element.gol.as_ref()
}

/// The two-phase Game-of-Life pass, run from the after-sim hook every
/// `gol_speed` frames.
pub fn simulate_gol(sim: &mut Simulation) {
    // Skip the whole pass (and its count plane) when no GoL matter exists.
    let has_gol = sim.element_count[PT_GOL_FIRST as usize..].iter().any(|&c| c > 0);
    if !has_gol {
        return;
    }
    let (w, h) = (sim.cfg.xres, sim.cfg.yres);
    let mut counts: Plane<u8> = Plane::new(w, h);
    let wrap = sim.edge_mode == EdgeMode::Loop;

    // Phase 1: every fully-alive GoL particle votes into its neighborhood.
    let mut live: Vec<(usize, i32, i32, i32)> = Vec::new();
    let last = sim.parts.last_active_index;
    for i in 0..=last {
        let part = sim.parts.data[i];
        if part.is_vacant() || sim.elements.get(part.ptype).gol.is_none() {
            continue;
        }
        let (x, y) = Simulation::part_pos(&part);
        if !sim.cfg.in_bounds(x, y) {
            continue;
        }
        let (cx, cy) = sim.cell_of(x, y);
        if sim.bmap[(cx, cy)] == WL_STASIS {
            continue;
        }
        live.push((i, x, y, part.ptype));
        if part.tmp != 0 {
            continue; // dying phases do not vote
        }
        for j in -1..=1 {
            for k in -1..=1 {
                if j == 0 && k == 0 {
                    continue;
                }
                let (mut nx, mut ny) = (x + k, y + j);
                if wrap {
                    nx = nx.rem_euclid(w);
                    ny = ny.rem_euclid(h);
                } else if !sim.cfg.in_bounds(nx, ny) {
                    continue;
                }
                counts[(nx, ny)] = counts[(nx, ny)].saturating_add(1);
            }
        }
    }
    if live.is_empty() {
        return;
    }

    // Phase 2a: survival and decay decisions against the counted state.
    let mut kills: Vec<usize> = Vec::new();
    for &(i, x, y, t) in &live {
        let rule = match &sim.elements.get(t).gol {
            Some(rule) => rule.clone(),
            None => continue,
        };
        let part = &mut sim.parts.data[i];
        let n = counts[(x, y)];
        if part.tmp == 0 {
            if n > 8 || rule.stay & (1 << n) == 0 {
                if rule.states > 2 {
                    part.tmp = 1;
                } else {
                    kills.push(i);
                }
            }
        } else {
            part.tmp += 1;
            if part.tmp as u32 > rule.states as u32 - 2 {
                kills.push(i);
            }
        }
    }

    // Phase 2b: births into empty cells, majority neighbor type wins.
    let mut births: Vec<(i32, i32, i32)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let n = counts[(x, y)];
            if n == 0 || n > 8 || sim.pmap[(x, y)] != 0 {
                continue;
            }
            // Majority type among the (at most 8) live GoL neighbors.
            let mut candidates: [(i32, i32); 8] = [(0, 0); 8];
            let mut used = 0;
            for j in -1..=1 {
                for k in -1..=1 {
                    if j == 0 && k == 0 {
                        continue;
                    }
                    let (mut nx, mut ny) = (x + k, y + j);
                    if wrap {
                        nx = nx.rem_euclid(w);
                        ny = ny.rem_euclid(h);
                    } else if !sim.cfg.in_bounds(nx, ny) {
                        continue;
                    }
                    let r = sim.pmap[(nx, ny)];
                    if r == 0 {
                        continue;
                    }
                    let rt = pmap_typ(r);
                    if sim.elements.get(rt).gol.is_none() {
                        continue;
                    }
                    if sim.parts.data[crate::parts::pmap_id(r)].tmp != 0 {
                        continue;
                    }
                    if let Some(slot) = candidates[..used].iter_mut().find(|(t, _)| *t == rt) {
                        slot.1 += 1;
                    } else if used < candidates.len() {
                        candidates[used] = (rt, 1);
                        used += 1;
                    }
                }
            }
            let Some(&(best_type, _)) = candidates[..used].iter().max_by_key(|(_, n)| *n) else {
                continue;
            };
            if let Some(rule) = &sim.elements.get(best_type).gol {
                if rule.begin & (1 << n) != 0 {
                    births.push((x, y, best_type));
                }
            }
        }
    }

    for i in kills {
        sim.kill_part(i);
    }
    for (x, y, t) in births {
        sim.create_part(-2, x, y, t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trips() {
        let rule = GolRule::from_canonical("B36/S125", 0, 0).unwrap();
        assert_eq!(rule.begin, (1 << 3) | (1 << 6));
        assert_eq!(rule.stay, (1 << 1) | (1 << 2) | (1 << 5));
        assert_eq!(rule.canonical(), "B36/S125");

        let brain = GolRule::from_canonical("B2/S/3", 0, 0).unwrap();
        assert_eq!(brain.states, 3);
        assert_eq!(brain.canonical(), "B2/S/3");
    }

    #[test]
    fn builtin_table_has_ngol_entries() {
        let rules = builtin_rules();
        assert_eq!(rules.len(), NGOL);
        assert_eq!(rules[0].name, "GOL");
        assert_eq!(rules[0].canonical(), "B3/S23");
    }

    #[test]
    fn bad_canonical_is_rejected(){
        assert!(GolRule::from_canonical("3/23", 0, 0).is_none());
        assert!(GolRule::from_canonical("B3/S23/1", 0, 0).is_none());
    }

    #[test]
    fn blinker_oscillates_under_b3s23() {
        let mut sim =
            Simulation::new(crate::config::SimulationConfig::default()).unwrap();
        for dy in -1..=1 {
            assert!(sim.create_part(-2, 100, 100 + dy, PT_GOL_FIRST) >= 0);
        }
        sim.tick();
        // Vertical triple becomes horizontal.
        for dx in -1..=1 {
            assert_ne!(sim.pmap[(100 + dx, 100)], 0, "missing cell at dx {dx}");
        }
        assert_eq!(sim.pmap[(100, 99)], 0);
        assert_eq!(sim.pmap[(100, 101)], 0);
        sim.tick();
        // And back again.
        assert_ne!(sim.pmap[(100, 99)], 0);
        assert_ne!(sim.pmap[(100, 101)], 0);
        assert_eq!(sim.pmap[(99, 100)], 0);
        assert_eq!(sim.element_count[PT_GOL_FIRST as usize], 3);
    }
}
