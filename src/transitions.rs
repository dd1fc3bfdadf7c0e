//! Heat conduction and pressure/temperature transitions
//!
//! Runs once per particle per tick, before the element's update callback.
//! Conduction exchanges heat pairwise with pmap neighbors (energy
//! conserving), then the element's transition quad is checked. The `ST`
//! sentinel routes into the hand-written special cases (lava
//! solidification, ice melting); `PT_NONE` destroys the particle.

use crate::config::{MAX_TEMP, MIN_TEMP};
use crate::elements::{
    NT, PT_ICE, PT_LAVA, PT_NONE, PT_STNE, PT_WATR, ST, TYPE_GAS, TYPE_LIQUID,
};
use crate::parts::pmap_id;
use crate::simulation::Simulation;

/// What the transition pass did to the particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    Unchanged,
    Changed,
    Killed,
}

impl Simulation {
    /// Pairwise heat exchange with the 8 pmap neighbors plus the ambient
    /// heat cell. Skipped entirely in legacy-heat mode.
    pub(crate) fn conduct_heat(&mut self, i: usize, x: i32, y: i32) {
        if self.legacy_enable {
            return;
        }
        let t = self.parts.data[i].ptype;
        let own_hc = self.elements.get(t).heat_conduct as f32;
        if own_hc <= 0.0 {
            return;
        }
        for (dx, dy) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
            let r = self.pmap_at(x + dx, y + dy);
            if r == 0 {
                continue;
            }
            let id = pmap_id(r);
            if id == i {
                continue;
            }
            let other_t = self.parts.data[id].ptype;
            let other_hc = self.elements.get(other_t).heat_conduct as f32;
            if other_hc <= 0.0 {
                continue;
            }
            // Symmetric transfer scaled by both conductivities; capped at
            // half the difference so sequential pairwise exchanges settle
            // instead of oscillating.
            let rate = ((own_hc * other_hc) / (250.0 * 250.0) * 0.5).min(0.5);
            let d = (self.parts.data[id].temp - self.parts.data[i].temp) * rate;
            self.parts.data[i].temp =
                (self.parts.data[i].temp + d).clamp(MIN_TEMP, MAX_TEMP);
            self.parts.data[id].temp =
                (self.parts.data[id].temp - d).clamp(MIN_TEMP, MAX_TEMP);
        }
        if self.aheat_enable {
            let (cx, cy) = self.cell_of(x, y);
            let rate = own_hc / 250.0 * 0.05;
            let d = (self.hv[(cx, cy)] - self.parts.data[i].temp) * rate;
            self.parts.data[i].temp = (self.parts.data[i].temp + d).clamp(MIN_TEMP, MAX_TEMP);
            self.hv[(cx, cy)] = (self.hv[(cx, cy)] - d).clamp(MIN_TEMP, MAX_TEMP);
        }
    }

    /// Check the element's transition thresholds and apply the configured
    /// transition.
    pub(crate) fn check_transitions(&mut self, i: usize, x: i32, y: i32) -> TransitionOutcome {
        let part = self.parts.data[i];
        let t = part.ptype;
        let (cx, cy) = self.cell_of(x, y);
        let pv = self.pv[(cx, cy)];
        let el = self.elements.get(t);
        let (threshold_hit, target) = if pv < el.low_pressure {
            (true, el.low_pressure_transition)
        } else if pv > el.high_pressure {
            (true, el.high_pressure_transition)
        } else if !self.legacy_enable && part.temp < el.low_temperature {
            (true, el.low_temperature_transition)
        } else if !self.legacy_enable && part.temp > el.high_temperature {
            (true, el.high_temperature_transition)
        } else {
            (false, NT)
        };
        if !threshold_hit || target == NT {
            return TransitionOutcome::Unchanged;
        }
        if target == PT_NONE {
            self.kill_part(i);
            return TransitionOutcome::Killed;
        }
        if target == ST {
            return self.special_transition(i, x, y, t);
        }

        let from_props = el.properties;
        let to_props = self.elements.get(target).properties;
        if self.part_change_type(i, x, y, target) {
            // Boiling expands: a liquid flashing to gas pushes on the air.
            if from_props & TYPE_LIQUID != 0 && to_props & TYPE_GAS != 0 {
                self.add_pressure(x, y, 4.0);
            }
            TransitionOutcome::Changed
        } else {
            TransitionOutcome::Killed
        }
    }

    /// The `ST` cases: transitions that need to consult the particle.
    fn special_transition(&mut self, i: usize, x: i32, y: i32, t: i32) -> TransitionOutcome {
        match t {
            PT_LAVA => {
                // Solidify back into the element it was melted from.
                let ctype = self.parts.data[i].ctype;
                let target = if self.elements.valid(ctype) { ctype } else { PT_STNE };
                if self.part_change_type(i, x, y, target) {
                    self.parts.data[i].ctype = 0;
                    TransitionOutcome::Changed
                } else {
                    TransitionOutcome::Killed
                }
            }
            PT_ICE => {
                let ctype = self.parts.data[i].ctype;
                let target = if self.elements.valid(ctype) { ctype } else { PT_WATR };
                if self.part_change_type(i, x, y, target) {
                    TransitionOutcome::Changed
                } else {
                    TransitionOutcome::Killed
                }
            }
            _ => TransitionOutcome::Unchanged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::elements::{PT_DUST, PT_STEM};

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn hot_water_boils_to_steam_and_pushes_air() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_WATR) as usize;
        sim.parts.data[i].temp = 400.0;
        let outcome = sim.check_transitions(i, 80, 60);
        assert_eq!(outcome, TransitionOutcome::Changed);
        assert_eq!(sim.parts.data[i].ptype, PT_STEM);
        let (cx, cy) = sim.cell_of(80, 60);
        assert!(sim.pv[(cx, cy)] > 0.0);
    }

    #[test]
    fn cold_water_freezes_carrying_its_type() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_WATR) as usize;
        sim.parts.data[i].temp = 250.0;
        assert_eq!(sim.check_transitions(i, 80, 60), TransitionOutcome::Changed);
        assert_eq!(sim.parts.data[i].ptype, PT_ICE);
        // And melts back.
        sim.parts.data[i].temp = 300.0;
        sim.parts.data[i].ctype = PT_WATR;
        assert_eq!(sim.check_transitions(i, 80, 60), TransitionOutcome::Changed);
        assert_eq!(sim.parts.data[i].ptype, PT_WATR);
    }

    #[test]
    fn lava_solidifies_into_its_ctype() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_LAVA) as usize;
        sim.parts.data[i].temp = 500.0;
        sim.parts.data[i].ctype = crate::elements::PT_METL;
        assert_eq!(sim.check_transitions(i, 80, 60), TransitionOutcome::Changed);
        assert_eq!(sim.parts.data[i].ptype, crate::elements::PT_METL);
    }

    #[test]
    fn conduction_moves_heat_between_neighbors() {
        let mut sim = sim();
        let hot = sim.create_part(-2, 80, 60, PT_STNE) as usize;
        let cold = sim.create_part(-2, 81, 60, PT_STNE) as usize;
        sim.parts.data[hot].temp = 1000.0;
        sim.parts.data[cold].temp = 200.0;
        // Keep below the melting point so only conduction acts.
        for _ in 0..200 {
            sim.conduct_heat(hot, 80, 60);
            sim.conduct_heat(cold, 81, 60);
        }
        let a = sim.parts.data[hot].temp;
        let b = sim.parts.data[cold].temp;
        assert!((a - b).abs() < 100.0, "temps should converge: {a} vs {b}");
        assert!((a + b - 1200.0).abs() < 1.0, "energy should be conserved");
    }

    #[test]
    fn inert_elements_never_transition() {
        let mut sim = sim();
        let i = sim.create_part(-2, 80, 60, PT_DUST) as usize;
        sim.parts.data[i].temp = 9000.0;
        assert_eq!(sim.check_transitions(i, 80, 60), TransitionOutcome::Unchanged);
    }
}
