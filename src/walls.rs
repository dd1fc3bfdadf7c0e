//! Wall types and their blocking rules
//!
//! Walls live on the cell-resolution `bmap`. Each type carries a small
//! static record describing what it blocks and how it renders; the sim and
//! the air solver consult the blocking predicates, the editor consults the
//! names.

use crate::elements::{ElementRegistry, TYPE_ENERGY, TYPE_GAS, TYPE_LIQUID, TYPE_SOLID};

pub const WL_NONE: u8 = 0;
pub const WL_WALL: u8 = 1;
pub const WL_WALLELEC: u8 = 2;
pub const WL_EWALL: u8 = 3;
pub const WL_DETECT: u8 = 4;
pub const WL_STREAM: u8 = 5;
pub const WL_FAN: u8 = 6;
pub const WL_ALLOWLIQUID: u8 = 7;
pub const WL_ALLOWPOWDER: u8 = 8;
pub const WL_ALLOWAIR: u8 = 9;
pub const WL_ALLOWGAS: u8 = 10;
pub const WL_ALLOWENERGY: u8 = 11;
pub const WL_EHOLE: u8 = 12;
pub const WL_GRAV: u8 = 13;
pub const WL_BLOCKAIR: u8 = 14;
pub const WL_STASIS: u8 = 15;
pub const WL_ERASE: u8 = 16;
pub const WL_ERASEALL: u8 = 17;
pub const WALL_TYPE_COUNT: usize = 18;

pub struct WallInfo {
    pub name: &'static str,
    pub colour: u32,
    /// Blocks the air solver (pressure and velocity).
    pub blocks_air: bool,
}

static WALLS: [WallInfo; WALL_TYPE_COUNT] = [
    WallInfo { name: "NONE", colour: 0x00000000, blocks_air: false },
    WallInfo { name: "WALL", colour: 0xFF808080, blocks_air: true },
    WallInfo { name: "CNDW", colour: 0xFFFFFFFF, blocks_air: true },
    WallInfo { name: "EWLL", colour: 0xFF808080, blocks_air: true },
    WallInfo { name: "WDET", colour: 0xFFFF0000, blocks_air: false },
    WallInfo { name: "STRM", colour: 0xFF202020, blocks_air: false },
    WallInfo { name: "WFAN", colour: 0xFF8080FF, blocks_air: false },
    WallInfo { name: "WLIQ", colour: 0xFF5050A0, blocks_air: true },
    WallInfo { name: "WPWD", colour: 0xFFC0A020, blocks_air: true },
    WallInfo { name: "WAIR", colour: 0xFF3C3C3C, blocks_air: false },
    WallInfo { name: "WGAS", colour: 0xFF509050, blocks_air: true },
    WallInfo { name: "WNRG", colour: 0xFFFFFF40, blocks_air: true },
    WallInfo { name: "EHOL", colour: 0xFF404040, blocks_air: false },
    WallInfo { name: "WGRV", colour: 0xFF00EEEE, blocks_air: false },
    WallInfo { name: "WBAR", colour: 0xFF5C5C5C, blocks_air: true },
    WallInfo { name: "WSTS", colour: 0xFF6070A0, blocks_air: false },
    WallInfo { name: "ERAS", colour: 0xFF101010, blocks_air: false },
    WallInfo { name: "ERSA", colour: 0xFF101010, blocks_air: false },
];

#[inline]
pub fn wall_info(wall: u8) -> &'static WallInfo {
    &WALLS[(wall as usize).min(WALL_TYPE_COUNT - 1)]
}

pub fn wall_by_name(name: &str) -> Option<u8> {
    WALLS
        .iter()
        .position(|w| w.name.eq_ignore_ascii_case(name))
        .map(|i| i as u8)
}

/// Does `wall` block a particle of element `t`? `emap_on` reports whether
/// the cell's e-wall is energized (open).
pub fn wall_blocks(registry: &ElementRegistry, wall: u8, t: i32, emap_on: bool) -> bool {
    let props = registry.get(t).properties;
    match wall {
        WL_NONE | WL_DETECT | WL_STREAM | WL_GRAV | WL_BLOCKAIR | WL_STASIS | WL_ERASE
        | WL_ERASEALL => false,
        WL_WALL | WL_WALLELEC => true,
        WL_EWALL => !emap_on,
        WL_EHOLE => emap_on,
        WL_FAN => props & TYPE_ENERGY == 0 && props & TYPE_GAS == 0,
        WL_ALLOWLIQUID => props & TYPE_LIQUID == 0,
        WL_ALLOWPOWDER => {
            // powder = particle that is none of solid/liquid/gas/energy
            props & (TYPE_SOLID | TYPE_LIQUID | TYPE_GAS | TYPE_ENERGY) != 0
        }
        WL_ALLOWAIR => true,
        WL_ALLOWGAS => props & TYPE_GAS == 0,
        WL_ALLOWENERGY => props & TYPE_ENERGY == 0,
        _ => true,
    }
}

#[inline]
pub fn wall_blocks_air(wall: u8) -> bool {
    wall_info(wall).blocks_air
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{ElementRegistry, PT_DUST, PT_PHOT, PT_WATR};

    #[test]
    fn plain_wall_blocks_everything() {
        let reg = ElementRegistry::new(1.0);
        assert!(wall_blocks(&reg, WL_WALL, PT_DUST, false));
        assert!(wall_blocks(&reg, WL_WALL, PT_PHOT, false));
    }

    #[test]
    fn selective_walls_pass_their_category() {
        let reg = ElementRegistry::new(1.0);
        assert!(!wall_blocks(&reg, WL_ALLOWLIQUID, PT_WATR, false));
        assert!(wall_blocks(&reg, WL_ALLOWLIQUID, PT_DUST, false));
        assert!(!wall_blocks(&reg, WL_ALLOWPOWDER, PT_DUST, false));
        assert!(wall_blocks(&reg, WL_ALLOWPOWDER, PT_WATR, false));
        assert!(!wall_blocks(&reg, WL_ALLOWENERGY, PT_PHOT, false));
    }

    #[test]
    fn ewall_opens_when_energized() {
        let reg = ElementRegistry::new(1.0);
        assert!(wall_blocks(&reg, WL_EWALL, PT_DUST, false));
        assert!(!wall_blocks(&reg, WL_EWALL, PT_DUST, true));
        assert!(!wall_blocks(&reg, WL_EHOLE, PT_DUST, false));
        assert!(wall_blocks(&reg, WL_EHOLE, PT_DUST, true));
    }

    #[test]
    fn wall_lookup_by_name() {
        assert_eq!(wall_by_name("wfan"), Some(WL_FAN));
        assert_eq!(wall_by_name("nope"), None);
    }
}
