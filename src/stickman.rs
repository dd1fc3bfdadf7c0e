//! Stickman state machines
//!
//! Each stickman is a small state machine owned by (or pointed at by) a
//! single host particle: 16 leg positions, 8 acceleration components, a
//! command byte and a spawn marker. The two players and up to
//! `MAX_FIGHTERS` fighters live on the simulation, not in the pool.

use crate::config::MAX_FIGHTERS;

// Command bits set by input (players) or the fighter AI.
pub const COMM_LEFT: u8 = 0x01;
pub const COMM_RIGHT: u8 = 0x02;
pub const COMM_UP: u8 = 0x04;
pub const COMM_DOWN: u8 = 0x08;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stickman {
    pub comm: u8,
    pub pcomm: u8,
    /// Element the stickman shoots.
    pub elem: i32,
    pub legs: [f32; 16],
    pub accs: [f32; 8],
    pub spwn: bool,
    /// Frames since the last particle spawn.
    pub frames: u32,
    pub rocket_boots: bool,
    pub fan: bool,
    /// Pool index of the SPWN particle that respawns this stickman.
    pub spawn_id: i32,
}

impl Default for Stickman {
    fn default() -> Self {
        Stickman {
            comm: 0,
            pcomm: 0,
            elem: 0,
            legs: [0.0; 16],
            accs: [0.0; 8],
            spwn: false,
            frames: 0,
            rocket_boots: false,
            fan: false,
            spawn_id: -1,
        }
    }
}

impl Stickman {
    /// Place the skeleton in its rest pose around the head position.
    pub fn init_legs(&mut self, x: f32, y: f32) {
        for n in 0..4 {
            let side = if n < 2 { -1.0 } else { 1.0 };
            let base = n * 4;
            self.legs[base] = x + side;
            self.legs[base + 1] = y + 6.0;
            self.legs[base + 2] = x + side * 3.0;
            self.legs[base + 3] = y + 12.0;
        }
        self.accs = [0.0; 8];
        self.frames = 0;
    }

    /// Advance the leg springs one step toward the head at (x, y).
    /// Movement commands bias the feet; everything else is damped settling.
    pub fn step_legs(&mut self, x: f32, y: f32) {
        let walk = if self.comm & COMM_LEFT != 0 {
            -1.0
        } else if self.comm & COMM_RIGHT != 0 {
            1.0
        } else {
            0.0
        };
        for n in 0..4 {
            let base = n * 4;
            let side = if n < 2 { -1.0 } else { 1.0 };
            let rest_x = x + side * 3.0 + walk * 2.0;
            let rest_y = y + 12.0;
            for (leg, rest, acc) in [
                (base + 2, rest_x, n * 2),
                (base + 3, rest_y, n * 2 + 1),
            ] {
                let d = rest - self.legs[leg];
                self.accs[acc] = (self.accs[acc] + d * 0.2) * 0.85;
                self.legs[leg] += self.accs[acc];
            }
            // Knees follow midway between head and feet.
            self.legs[base] = (x + self.legs[base + 2]) * 0.5 + side;
            self.legs[base + 1] = (y + self.legs[base + 3]) * 0.5;
        }
        self.pcomm = self.comm;
    }

    pub fn despawn(&mut self) {
        self.spwn = false;
        self.comm = 0;
        self.pcomm = 0;
    }
}

/// Fixed-size fighter array plus a live count, capped at `MAX_FIGHTERS`.
#[derive(Clone, Debug)]
pub struct Fighters {
    pub data: Vec<Stickman>,
    pub count: u8,
}

impl Default for Fighters {
    fn default() -> Self {
        Fighters {
            data: vec![Stickman::default(); MAX_FIGHTERS],
            count: 0,
        }
    }
}

impl Fighters {
    /// Claim a free fighter slot, or `None` when at the cap.
    pub fn alloc(&mut self) -> Option<usize> {
        if (self.count as usize) >= MAX_FIGHTERS {
            return None;
        }
        let slot = self.data.iter().position(|f| !f.spwn)?;
        self.data[slot].spwn = true;
        self.count += 1;
        Some(slot)
    }

    pub fn free(&mut self, slot: usize) {
        if slot < self.data.len() && self.data[slot].spwn {
            self.data[slot].despawn();
            self.count = self.count.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legs_settle_toward_rest_pose() {
        let mut sm = Stickman::default();
        sm.init_legs(50.0, 50.0);
        for _ in 0..60 {
            sm.step_legs(50.0, 50.0);
        }
        for n in 0..4 {
            let side = if n < 2 { -1.0 } else { 1.0 };
            assert!((sm.legs[n * 4 + 2] - (50.0 + side * 3.0)).abs() < 0.5);
            assert!((sm.legs[n * 4 + 3] - 62.0).abs() < 0.5);
        }
    }

    #[test]
    fn fighter_cap_is_enforced() {
        let mut fighters = Fighters::default();
        for _ in 0..MAX_FIGHTERS {
            assert!(fighters.alloc().is_some());
        }
        assert!(fighters.alloc().is_none());
        fighters.free(0);
        assert_eq!(fighters.alloc(), Some(0));
    }
}
