//! Save codec - bit-packed snapshot of a simulation
//!
//! Container: a 4-byte magic (`PSv\0`; the legacy `OPS1` is recognized
//! but not decoded), a 4-byte little-endian uncompressed payload length,
//! then a bzip2 stream. The payload is a fixed header (version, block
//! size, scenario flags) followed by tagged sections in any order.
//! Particle records delta-code their positions and write per-element
//! whitelisted fields only; walls are run-length coded; decoration is a
//! sparse list of non-zero ARGB words; signs and custom Game-of-Life
//! rules ride along verbatim.
//!
//! Parsing is atomic: a `GameSave` is fully decoded and validated before
//! anything touches a simulation.

use std::io::{Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use log::{debug, info};
use thiserror::Error;

use crate::config::{CheckFailed, SimulationConfig};
use crate::elements::{
    GolRule, PERSIST_CTYPE, PERSIST_LIFE, PERSIST_TMP, PERSIST_TMP2, PERSIST_TMP3, PERSIST_TMP4,
    PERSIST_VEL,
};
use crate::parts::{pmap_id, Particle};
use crate::settings::{AirMode, DecoSpace, EdgeMode, GravityMode, SimulationSettings};
use crate::signs::{Justification, Sign};
use crate::simulation::Simulation;
use crate::walls::{WALL_TYPE_COUNT, WL_FAN};

const MAGIC: &[u8; 4] = b"PSv\0";
const MAGIC_LEGACY: &[u8; 4] = b"OPS1";
const VERSION: u16 = 3;

/// Largest accepted uncompressed payload (a full 255x255-cell save with
/// every optional section stays far below this).
const MAX_PAYLOAD: usize = 64 << 20;

const SECT_PART: u8 = 0x01;
const SECT_WALL: u8 = 0x02;
const SECT_AIR: u8 = 0x03;
const SECT_AMBH: u8 = 0x04;
const SECT_DECO: u8 = 0x05;
const SECT_SIGN: u8 = 0x06;
const SECT_PALT: u8 = 0x07;
const SECT_AUTH: u8 = 0x08;

// Particle field-mask bits, in write order.
const FIELD_LIFE: u16 = 1 << 0;
const FIELD_CTYPE: u16 = 1 << 1;
const FIELD_TMP: u16 = 1 << 2;
const FIELD_TMP2: u16 = 1 << 3;
const FIELD_TMP3: u16 = 1 << 4;
const FIELD_TMP4: u16 = 1 << 5;
const FIELD_VEL: u16 = 1 << 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("save is larger than this simulation allows")]
    TooLarge,
    #[error("save data ends unexpectedly")]
    Truncated,
    #[error("not a save file")]
    BadMagic,
    #[error("unknown section {0:#04x}")]
    UnknownSection(u8),
    #[error("bad field: {0}")]
    BadField(&'static str),
    #[error("inconsistent save data")]
    Inconsistent,
}

/// A fully decoded save, ready to apply to a simulation.
#[derive(Clone, Debug, PartialEq)]
pub struct GameSave {
    pub cells: (i32, i32),
    pub settings: SimulationSettings,
    pub frame_count: u64,
    pub rng_state: crate::random::RngState,
    /// (x, y, particle) triplets in scan order.
    pub particles: Vec<(i32, i32, Particle)>,
    pub walls: Vec<u8>,
    pub fans: Vec<(i32, i32, f32, f32)>,
    pub air: Option<(Vec<f32>, Vec<f32>, Vec<f32>)>,
    pub ambient_heat: Option<Vec<f32>>,
    pub decorations: Vec<(i32, i32, u32)>,
    pub signs: Vec<Sign>,
    pub custom_gol: Vec<GolRule>,
    pub authors: serde_json::Value,
}

pub struct Codec {
    /// Accept the pre-v3 container magic; the body is still not decoded.
    pub allow_legacy: bool,
    /// Write the air section.
    pub include_pressure: bool,
}

impl Default for Codec {
    fn default() -> Self {
        Codec { allow_legacy: false, include_pressure: true }
    }
}

impl Codec {
    // === Encode ===

    /// Serialize the whole simulation. Fails when the grid is too large
    /// to address in the wire format.
    pub fn encode(&self, sim: &Simulation) -> Result<Vec<u8>, CheckFailed> {
        let config = SimulationConfig { cell: sim.cfg.cell, cells: (sim.cfg.xcells, sim.cfg.ycells) };
        if !config.can_save() {
            return Err(CheckFailed {
                which: "saveable cell count",
                value: sim.cfg.xcells.max(sim.cfg.ycells),
                lo: 1,
                hi: 255,
            });
        }

        let mut payload = Vec::new();
        payload.extend_from_slice(&VERSION.to_le_bytes());
        payload.push(sim.cfg.xcells as u8);
        payload.push(sim.cfg.ycells as u8);
        write_settings(&mut payload, &sim.current_settings());
        // Determinism state rides in the header so a loaded save replays
        // identically.
        payload.extend_from_slice(&sim.frame_count.to_le_bytes());
        let rng_state = sim.rng.state();
        payload.extend_from_slice(&rng_state[0].to_le_bytes());
        payload.extend_from_slice(&rng_state[1].to_le_bytes());

        write_section(&mut payload, SECT_PART, &self.encode_particles(sim));
        write_section(&mut payload, SECT_WALL, &encode_walls(sim));
        if self.include_pressure {
            write_section(&mut payload, SECT_AIR, &encode_air(sim));
        }
        if sim.aheat_enable {
            write_section(&mut payload, SECT_AMBH, &encode_ambient(sim));
        }
        write_section(&mut payload, SECT_DECO, &encode_decorations(sim));
        if !sim.signs.is_empty() {
            write_section(&mut payload, SECT_SIGN, &encode_signs(&sim.signs));
        }
        let palette = sim.elements.custom_gol_rules();
        if !palette.is_empty() {
            write_section(&mut payload, SECT_PALT, &encode_palette(&palette));
        }
        if !sim.authors.is_null() {
            let authors = serde_json::to_vec(&sim.authors).unwrap_or_default();
            write_section(&mut payload, SECT_AUTH, &authors);
        }

        let mut out = Vec::with_capacity(payload.len() / 3 + 16);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        let mut encoder = BzEncoder::new(out, Compression::best());
        // Writing into a Vec cannot fail.
        let _ = encoder.write_all(&payload);
        let out = encoder.finish().unwrap_or_default();
        debug!("encoded save: {} bytes payload, {} bytes compressed", payload.len(), out.len());
        Ok(out)
    }

    fn encode_particles(&self, sim: &Simulation) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut records: Vec<(i32, i32, &Particle)> = Vec::new();
        for y in 0..sim.cfg.yres {
            for x in 0..sim.cfg.xres {
                let under = sim.pmap[(x, y)];
                if under != 0 {
                    records.push((x, y, &sim.parts.data[pmap_id(under)]));
                }
                let photon = sim.photons[(x, y)];
                if photon != 0 {
                    records.push((x, y, &sim.parts.data[pmap_id(photon)]));
                }
            }
        }
        buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
        let (mut prev_x, mut prev_y) = (0i32, 0i32);
        for (x, y, part) in records {
            buf.extend_from_slice(&((x - prev_x) as i16).to_le_bytes());
            buf.extend_from_slice(&((y - prev_y) as i16).to_le_bytes());
            prev_x = x;
            prev_y = y;
            // Subpixel offsets keep motion state exact across a round
            // trip; they stay within half a pixel of the indexed cell.
            buf.extend_from_slice(&(part.x - x as f32).to_bits().to_le_bytes());
            buf.extend_from_slice(&(part.y - y as f32).to_bits().to_le_bytes());
            buf.extend_from_slice(&(part.ptype as u16).to_le_bytes());
            buf.extend_from_slice(&part.temp.to_bits().to_le_bytes());

            let persist = sim.elements.get(part.ptype).persist;
            let mut mask = 0u16;
            if persist & PERSIST_LIFE != 0 && part.life != 0 {
                mask |= FIELD_LIFE;
            }
            if persist & PERSIST_CTYPE != 0 && part.ctype != 0 {
                mask |= FIELD_CTYPE;
            }
            if persist & PERSIST_TMP != 0 && part.tmp != 0 {
                mask |= FIELD_TMP;
            }
            if persist & PERSIST_TMP2 != 0 && part.tmp2 != 0 {
                mask |= FIELD_TMP2;
            }
            if persist & PERSIST_TMP3 != 0 && part.tmp3 != 0 {
                mask |= FIELD_TMP3;
            }
            if persist & PERSIST_TMP4 != 0 && part.tmp4 != 0 {
                mask |= FIELD_TMP4;
            }
            // Velocity is motion state, not element state; any moving
            // particle keeps it.
            if persist & PERSIST_VEL != 0 || part.vx != 0.0 || part.vy != 0.0 {
                mask |= FIELD_VEL;
            }
            buf.extend_from_slice(&mask.to_le_bytes());
            if mask & FIELD_LIFE != 0 {
                buf.extend_from_slice(&part.life.to_le_bytes());
            }
            if mask & FIELD_CTYPE != 0 {
                buf.extend_from_slice(&part.ctype.to_le_bytes());
            }
            if mask & FIELD_TMP != 0 {
                buf.extend_from_slice(&part.tmp.to_le_bytes());
            }
            if mask & FIELD_TMP2 != 0 {
                buf.extend_from_slice(&part.tmp2.to_le_bytes());
            }
            if mask & FIELD_TMP3 != 0 {
                buf.extend_from_slice(&part.tmp3.to_le_bytes());
            }
            if mask & FIELD_TMP4 != 0 {
                buf.extend_from_slice(&part.tmp4.to_le_bytes());
            }
            if mask & FIELD_VEL != 0 {
                buf.extend_from_slice(&part.vx.to_bits().to_le_bytes());
                buf.extend_from_slice(&part.vy.to_bits().to_le_bytes());
            }
        }
        buf
    }

    // === Decode ===

    pub fn decode(&self, data: &[u8]) -> Result<GameSave, ParseError> {
        if data.len() < 8 {
            return Err(ParseError::Truncated);
        }
        let magic: [u8; 4] = data[..4].try_into().map_err(|_| ParseError::Truncated)?;
        if &magic == MAGIC_LEGACY {
            return if self.allow_legacy {
                // Legacy bodies predate the tagged-section format and are
                // not decoded; the flag only admits them past the magic.
                Err(ParseError::BadField("legacy save body"))
            } else {
                Err(ParseError::BadMagic)
            };
        }
        if &magic != MAGIC {
            return Err(ParseError::BadMagic);
        }
        let declared =
            u32::from_le_bytes(data[4..8].try_into().map_err(|_| ParseError::Truncated)?) as usize;
        if declared > MAX_PAYLOAD {
            return Err(ParseError::TooLarge);
        }
        let mut payload = Vec::with_capacity(declared);
        BzDecoder::new(&data[8..])
            .take(MAX_PAYLOAD as u64 + 1)
            .read_to_end(&mut payload)
            .map_err(|_| ParseError::Truncated)?;
        if payload.len() != declared {
            return Err(ParseError::Inconsistent);
        }

        let mut reader = Reader::new(&payload);
        let version = reader.u16()?;
        if version != VERSION {
            return Err(ParseError::BadField("version"));
        }
        let cells_x = reader.u8()? as i32;
        let cells_y = reader.u8()? as i32;
        if cells_x == 0 || cells_y == 0 {
            return Err(ParseError::BadField("block size"));
        }
        let settings = read_settings(&mut reader)?;
        let frame_count = u64::from_le_bytes(
            reader.bytes(8)?.try_into().map_err(|_| ParseError::Truncated)?,
        );
        let rng_state = [
            u64::from_le_bytes(reader.bytes(8)?.try_into().map_err(|_| ParseError::Truncated)?),
            u64::from_le_bytes(reader.bytes(8)?.try_into().map_err(|_| ParseError::Truncated)?),
        ];

        let mut save = GameSave {
            cells: (cells_x, cells_y),
            settings,
            frame_count,
            rng_state,
            particles: Vec::new(),
            walls: vec![0; (cells_x * cells_y) as usize],
            fans: Vec::new(),
            air: None,
            ambient_heat: None,
            decorations: Vec::new(),
            signs: Vec::new(),
            custom_gol: Vec::new(),
            authors: serde_json::Value::Null,
        };

        while !reader.at_end() {
            let tag = reader.u8()?;
            let len = reader.u32()? as usize;
            let body = reader.bytes(len)?;
            let mut section = Reader::new(body);
            match tag {
                SECT_PART => decode_particles(&mut section, &mut save)?,
                SECT_WALL => decode_walls(&mut section, &mut save)?,
                SECT_AIR => decode_air(&mut section, &mut save)?,
                SECT_AMBH => decode_ambient(&mut section, &mut save)?,
                SECT_DECO => decode_decorations(&mut section, &mut save)?,
                SECT_SIGN => decode_signs(&mut section, &mut save)?,
                SECT_PALT => decode_palette(&mut section, &mut save)?,
                SECT_AUTH => {
                    save.authors =
                        serde_json::from_slice(body).map_err(|_| ParseError::BadField("authors"))?;
                }
                other => return Err(ParseError::UnknownSection(other)),
            }
        }
        Ok(save)
    }

    /// Decode and apply in one step. The target simulation is only
    /// touched after the save parsed completely.
    pub fn load(&self, sim: &mut Simulation, data: &[u8]) -> Result<(), ParseError> {
        let save = self.decode(data)?;
        apply(sim, &save)?;
        info!(
            "loaded save: {}x{} cells, {} particles",
            save.cells.0,
            save.cells.1,
            save.particles.len()
        );
        Ok(())
    }
}

/// Apply a decoded save to a simulation. Fails (before mutating) when the
/// save does not fit.
pub fn apply(sim: &mut Simulation, save: &GameSave) -> Result<(), ParseError> {
    if save.cells.0 > sim.cfg.xcells || save.cells.1 > sim.cfg.ycells {
        return Err(ParseError::TooLarge);
    }
    sim.clear_sim();
    sim.apply_settings(&save.settings);
    let cell = sim.cfg.cell;
    for cy in 0..save.cells.1 {
        for cx in 0..save.cells.0 {
            sim.bmap[(cx, cy)] = save.walls[(cy * save.cells.0 + cx) as usize];
        }
    }
    sim.grav_wall_changed = true;
    sim.air.approximate_block_air_maps(&sim.bmap);
    for &(cx, cy, fvx, fvy) in &save.fans {
        if sim.cfg.cell_in_bounds(cx, cy) {
            sim.fvx[(cx, cy)] = fvx;
            sim.fvy[(cx, cy)] = fvy;
        }
    }
    if let Some((pv, vx, vy)) = &save.air {
        for (i, ((pv_v, vx_v), vy_v)) in pv.iter().zip(vx).zip(vy).enumerate() {
            let (cx, cy) = ((i as i32) % save.cells.0, (i as i32) / save.cells.0);
            if sim.cfg.cell_in_bounds(cx, cy) {
                sim.pv[(cx, cy)] = *pv_v;
                sim.vx[(cx, cy)] = *vx_v;
                sim.vy[(cx, cy)] = *vy_v;
            }
        }
    }
    if let Some(hv) = &save.ambient_heat {
        for (i, v) in hv.iter().enumerate() {
            let (cx, cy) = ((i as i32) % save.cells.0, (i as i32) / save.cells.0);
            if sim.cfg.cell_in_bounds(cx, cy) {
                sim.hv[(cx, cy)] = *v;
            }
        }
    }
    if !save.custom_gol.is_empty() {
        // Registry mutation happens while the sim is paused for the load.
        let mut elements = (*sim.elements).clone();
        for rule in &save.custom_gol {
            elements.register_custom_gol(rule.clone());
        }
        sim.elements = std::sync::Arc::new(elements);
    }
    for &(x, y, ref part) in &save.particles {
        if x < 0 || y < 0 || x >= save.cells.0 * cell || y >= save.cells.1 * cell {
            return Err(ParseError::Inconsistent);
        }
        let i = sim.create_part_v(-2, x, y, part.ptype, -1);
        if i >= 0 {
            // The record carries the exact (subpixel) position.
            sim.parts.data[i as usize] = *part;
        }
    }
    for &(x, y, dcolour) in &save.decorations {
        let r = sim.pmap_at(x, y);
        let r = if r != 0 { r } else { sim.photons_at(x, y) };
        if r != 0 {
            sim.parts.data[pmap_id(r)].dcolour = dcolour;
        }
    }
    for sign in &save.signs {
        sim.signs.push(sign.clone());
        if sim.signs.len() >= crate::config::MAX_SIGNS {
            break;
        }
    }
    sim.authors = save.authors.clone();
    sim.frame_count = save.frame_count;
    sim.rng.set_state(save.rng_state);
    sim.recalc_free_particles(false);
    Ok(())
}

/// Build a `GameSave` directly from a simulation, bypassing the byte
/// format; used by thumbnail rendering and tests.
pub fn save_from_sim(sim: &Simulation, include_pressure: bool) -> GameSave {
    let codec = Codec { allow_legacy: false, include_pressure };
    // Encoding then decoding keeps one canonical field-selection path.
    let bytes = codec.encode(sim).ok();
    match bytes.and_then(|b| codec.decode(&b).ok()) {
        Some(save) => save,
        None => GameSave {
            cells: (sim.cfg.xcells, sim.cfg.ycells),
            settings: sim.current_settings(),
            frame_count: sim.frame_count,
            rng_state: sim.rng.state(),
            particles: Vec::new(),
            walls: vec![0; sim.cfg.ncell],
            fans: Vec::new(),
            air: None,
            ambient_heat: None,
            decorations: Vec::new(),
            signs: Vec::new(),
            custom_gol: Vec::new(),
            authors: serde_json::Value::Null,
        },
    }
}

// === Section encoders ===

fn write_section(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}

fn write_settings(out: &mut Vec<u8>, settings: &SimulationSettings) {
    let (gravity_mode, gx, gy) = match settings.gravity_mode {
        GravityMode::Vertical => (0u8, 0.0, 0.0),
        GravityMode::Off => (1, 0.0, 0.0),
        GravityMode::Radial => (2, 0.0, 0.0),
        GravityMode::Custom { gx, gy } => (3, gx, gy),
    };
    out.push(gravity_mode);
    out.extend_from_slice(&gx.to_bits().to_le_bytes());
    out.extend_from_slice(&gy.to_bits().to_le_bytes());
    out.push(match settings.air_mode {
        AirMode::On => 0,
        AirMode::PressureOff => 1,
        AirMode::VelocityOff => 2,
        AirMode::Off => 3,
        AirMode::NoUpdate => 4,
    });
    out.push(match settings.edge_mode {
        EdgeMode::Void => 0,
        EdgeMode::Solid => 1,
        EdgeMode::Loop => 2,
    });
    out.push(settings.legacy_heat as u8);
    out.push(settings.newtonian_gravity as u8);
    out.push(settings.ambient_heat as u8);
    out.push(settings.water_equalization as u8);
    out.push(match settings.deco_space {
        DecoSpace::Srgb => 0,
        DecoSpace::Linear => 1,
        DecoSpace::Gamma22 => 2,
        DecoSpace::Gamma18 => 3,
    });
    out.extend_from_slice(&settings.ambient_air_temp.to_bits().to_le_bytes());
}

fn encode_walls(sim: &Simulation) -> Vec<u8> {
    let mut buf = Vec::new();
    let data = sim.bmap.data();
    let mut i = 0;
    while i < data.len() {
        let value = data[i];
        let mut run = 1usize;
        while i + run < data.len() && data[i + run] == value && run < u16::MAX as usize {
            run += 1;
        }
        buf.push(value);
        buf.extend_from_slice(&(run as u16).to_le_bytes());
        i += run;
    }
    // Fan cells carry their velocities after the RLE stream.
    let mut fans = Vec::new();
    for cy in 0..sim.cfg.ycells {
        for cx in 0..sim.cfg.xcells {
            if sim.bmap[(cx, cy)] == WL_FAN {
                fans.push((cx, cy));
            }
        }
    }
    buf.extend_from_slice(&(fans.len() as u32).to_le_bytes());
    for (cx, cy) in fans {
        buf.extend_from_slice(&(cx as u16).to_le_bytes());
        buf.extend_from_slice(&(cy as u16).to_le_bytes());
        buf.extend_from_slice(&sim.fvx[(cx, cy)].to_bits().to_le_bytes());
        buf.extend_from_slice(&sim.fvy[(cx, cy)].to_bits().to_le_bytes());
    }
    buf
}

fn encode_air(sim: &Simulation) -> Vec<u8> {
    let mut buf = Vec::new();
    for plane in [&sim.pv, &sim.vx, &sim.vy] {
        for v in plane.data() {
            buf.extend_from_slice(&v.to_bits().to_le_bytes());
        }
    }
    buf
}

fn encode_ambient(sim: &Simulation) -> Vec<u8> {
    let mut buf = Vec::new();
    for v in sim.hv.data() {
        buf.extend_from_slice(&v.to_bits().to_le_bytes());
    }
    buf
}

fn encode_decorations(sim: &Simulation) -> Vec<u8> {
    let mut entries = Vec::new();
    for y in 0..sim.cfg.yres {
        for x in 0..sim.cfg.xres {
            for slot in [sim.pmap[(x, y)], sim.photons[(x, y)]] {
                if slot != 0 {
                    let dcolour = sim.parts.data[pmap_id(slot)].dcolour;
                    if dcolour != 0 {
                        entries.push((x, y, dcolour));
                    }
                }
            }
        }
    }
    let mut buf = Vec::new();
    buf.extend_from_slice(&(entries.len() as u32).to_le_bytes());
    for (x, y, dcolour) in entries {
        buf.extend_from_slice(&(x as u16).to_le_bytes());
        buf.extend_from_slice(&(y as u16).to_le_bytes());
        buf.extend_from_slice(&dcolour.to_le_bytes());
    }
    buf
}

fn encode_signs(signs: &[Sign]) -> Vec<u8> {
    let mut buf = vec![signs.len() as u8];
    for sign in signs {
        buf.extend_from_slice(&(sign.x as u16).to_le_bytes());
        buf.extend_from_slice(&(sign.y as u16).to_le_bytes());
        buf.push(match sign.ju {
            Justification::Left => 0,
            Justification::Centre => 1,
            Justification::Right => 2,
            Justification::None => 3,
        });
        let bytes = sign.text.as_bytes();
        buf.push(bytes.len() as u8);
        buf.extend_from_slice(bytes);
    }
    buf
}

fn encode_palette(palette: &[(i32, GolRule)]) -> Vec<u8> {
    let mut buf = vec![palette.len() as u8];
    for (id, rule) in palette {
        buf.extend_from_slice(&(*id as u16).to_le_bytes());
        let name = rule.name.as_bytes();
        buf.push(name.len() as u8);
        buf.extend_from_slice(name);
        buf.extend_from_slice(&rule.begin.to_le_bytes());
        buf.extend_from_slice(&rule.stay.to_le_bytes());
        buf.push(rule.states);
        buf.extend_from_slice(&rule.colour1.to_le_bytes());
        buf.extend_from_slice(&rule.colour2.to_le_bytes());
    }
    buf
}

// === Section decoders ===

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.pos + n > self.data.len() {
            return Err(ParseError::Truncated);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ParseError> {
        Ok(u16::from_le_bytes(self.bytes(2)?.try_into().unwrap_or([0; 2])))
    }

    fn i16(&mut self) -> Result<i16, ParseError> {
        Ok(i16::from_le_bytes(self.bytes(2)?.try_into().unwrap_or([0; 2])))
    }

    fn u32(&mut self) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.bytes(4)?.try_into().unwrap_or([0; 4])))
    }

    fn i32(&mut self) -> Result<i32, ParseError> {
        Ok(self.u32()? as i32)
    }

    fn f32(&mut self) -> Result<f32, ParseError> {
        Ok(f32::from_bits(self.u32()?))
    }
}

fn read_settings(reader: &mut Reader) -> Result<SimulationSettings, ParseError> {
    let gravity_mode = reader.u8()?;
    let gx = reader.f32()?;
    let gy = reader.f32()?;
    let gravity_mode = match gravity_mode {
        0 => GravityMode::Vertical,
        1 => GravityMode::Off,
        2 => GravityMode::Radial,
        3 => GravityMode::Custom { gx, gy },
        _ => return Err(ParseError::BadField("gravity mode")),
    };
    let air_mode = match reader.u8()? {
        0 => AirMode::On,
        1 => AirMode::PressureOff,
        2 => AirMode::VelocityOff,
        3 => AirMode::Off,
        4 => AirMode::NoUpdate,
        _ => return Err(ParseError::BadField("air mode")),
    };
    let edge_mode = match reader.u8()? {
        0 => EdgeMode::Void,
        1 => EdgeMode::Solid,
        2 => EdgeMode::Loop,
        _ => return Err(ParseError::BadField("edge mode")),
    };
    let legacy_heat = reader.u8()? != 0;
    let newtonian_gravity = reader.u8()? != 0;
    let ambient_heat = reader.u8()? != 0;
    let water_equalization = reader.u8()? != 0;
    let deco_space = match reader.u8()? {
        0 => DecoSpace::Srgb,
        1 => DecoSpace::Linear,
        2 => DecoSpace::Gamma22,
        3 => DecoSpace::Gamma18,
        _ => return Err(ParseError::BadField("deco space")),
    };
    let ambient_air_temp = reader.f32()?;
    if !ambient_air_temp.is_finite() {
        return Err(ParseError::BadField("ambient temperature"));
    }
    Ok(SimulationSettings {
        edge_mode,
        gravity_mode,
        air_mode,
        ambient_air_temp,
        legacy_heat,
        newtonian_gravity,
        ambient_heat,
        water_equalization,
        deco_space,
    })
}

fn decode_particles(reader: &mut Reader, save: &mut GameSave) -> Result<(), ParseError> {
    let count = reader.u32()? as usize;
    if count > (save.cells.0 as usize) * (save.cells.1 as usize) * 100 * 100 * 2 {
        return Err(ParseError::Inconsistent);
    }
    let (mut x, mut y) = (0i32, 0i32);
    for _ in 0..count {
        x += reader.i16()? as i32;
        y += reader.i16()? as i32;
        let off_x = reader.f32()?;
        let off_y = reader.f32()?;
        if !off_x.is_finite() || !off_y.is_finite() || off_x.abs() > 1.0 || off_y.abs() > 1.0 {
            return Err(ParseError::BadField("particle position"));
        }
        let ptype = reader.u16()? as i32;
        if ptype <= 0 || ptype >= crate::parts::PT_NUM as i32 {
            return Err(ParseError::BadField("particle type"));
        }
        let temp = reader.f32()?;
        if !temp.is_finite() {
            return Err(ParseError::BadField("particle temperature"));
        }
        let mask = reader.u16()?;
        let mut part = Particle {
            ptype,
            temp,
            x: x as f32 + off_x,
            y: y as f32 + off_y,
            ..Particle::default()
        };
        if mask & FIELD_LIFE != 0 {
            part.life = reader.i32()?;
        }
        if mask & FIELD_CTYPE != 0 {
            part.ctype = reader.i32()?;
        }
        if mask & FIELD_TMP != 0 {
            part.tmp = reader.i32()?;
        }
        if mask & FIELD_TMP2 != 0 {
            part.tmp2 = reader.i32()?;
        }
        if mask & FIELD_TMP3 != 0 {
            part.tmp3 = reader.i32()?;
        }
        if mask & FIELD_TMP4 != 0 {
            part.tmp4 = reader.i32()?;
        }
        if mask & FIELD_VEL != 0 {
            part.vx = reader.f32()?;
            part.vy = reader.f32()?;
        }
        save.particles.push((x, y, part));
    }
    Ok(())
}

fn decode_walls(reader: &mut Reader, save: &mut GameSave) -> Result<(), ParseError> {
    let total = (save.cells.0 * save.cells.1) as usize;
    let mut i = 0;
    while i < total {
        let value = reader.u8()?;
        if value as usize >= WALL_TYPE_COUNT {
            return Err(ParseError::BadField("wall type"));
        }
        let run = reader.u16()? as usize;
        if run == 0 || i + run > total {
            return Err(ParseError::Inconsistent);
        }
        for slot in &mut save.walls[i..i + run] {
            *slot = value;
        }
        i += run;
    }
    let fan_count = reader.u32()? as usize;
    if fan_count > total {
        return Err(ParseError::Inconsistent);
    }
    for _ in 0..fan_count {
        let cx = reader.u16()? as i32;
        let cy = reader.u16()? as i32;
        let fvx = reader.f32()?;
        let fvy = reader.f32()?;
        save.fans.push((cx, cy, fvx, fvy));
    }
    Ok(())
}

fn decode_air(reader: &mut Reader, save: &mut GameSave) -> Result<(), ParseError> {
    let total = (save.cells.0 * save.cells.1) as usize;
    let mut planes = Vec::with_capacity(3);
    for _ in 0..3 {
        let mut plane = Vec::with_capacity(total);
        for _ in 0..total {
            plane.push(reader.f32()?);
        }
        planes.push(plane);
    }
    let vy = planes.pop().unwrap_or_default();
    let vx = planes.pop().unwrap_or_default();
    let pv = planes.pop().unwrap_or_default();
    save.air = Some((pv, vx, vy));
    Ok(())
}

fn decode_ambient(reader: &mut Reader, save: &mut GameSave) -> Result<(), ParseError> {
    let total = (save.cells.0 * save.cells.1) as usize;
    let mut hv = Vec::with_capacity(total);
    for _ in 0..total {
        hv.push(reader.f32()?);
    }
    save.ambient_heat = Some(hv);
    Ok(())
}

fn decode_decorations(reader: &mut Reader, save: &mut GameSave) -> Result<(), ParseError> {
    let count = reader.u32()? as usize;
    for _ in 0..count {
        let x = reader.u16()? as i32;
        let y = reader.u16()? as i32;
        let dcolour = reader.u32()?;
        if dcolour == 0 {
            return Err(ParseError::BadField("decoration colour"));
        }
        save.decorations.push((x, y, dcolour));
    }
    Ok(())
}

fn decode_signs(reader: &mut Reader, save: &mut GameSave) -> Result<(), ParseError> {
    let count = reader.u8()? as usize;
    if count > crate::config::MAX_SIGNS {
        return Err(ParseError::Inconsistent);
    }
    for _ in 0..count {
        let x = reader.u16()? as i32;
        let y = reader.u16()? as i32;
        let ju = match reader.u8()? {
            0 => Justification::Left,
            1 => Justification::Centre,
            2 => Justification::Right,
            3 => Justification::None,
            _ => return Err(ParseError::BadField("sign justification")),
        };
        let len = reader.u8()? as usize;
        let text = std::str::from_utf8(reader.bytes(len)?)
            .map_err(|_| ParseError::BadField("sign text"))?;
        save.signs.push(Sign::new(x, y, ju, text));
    }
    Ok(())
}

fn decode_palette(reader: &mut Reader, save: &mut GameSave) -> Result<(), ParseError> {
    let count = reader.u8()? as usize;
    for _ in 0..count {
        let _id = reader.u16()?;
        let name_len = reader.u8()? as usize;
        let name = std::str::from_utf8(reader.bytes(name_len)?)
            .map_err(|_| ParseError::BadField("gol name"))?
            .to_owned();
        let begin = reader.u16()?;
        let stay = reader.u16()?;
        let states = reader.u8()?;
        if states < 2 || begin > 0x1FF || stay > 0x1FF {
            return Err(ParseError::BadField("gol rule"));
        }
        let colour1 = reader.u32()?;
        let colour2 = reader.u32()?;
        save.custom_gol.push(GolRule { name, begin, stay, states, colour1, colour2 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{PT_DUST, PT_FILT, PT_WATR};
    use crate::snapshot::Snapshot;

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::default()).unwrap()
    }

    #[test]
    fn empty_sim_round_trips() {
        let mut a = sim();
        let bytes = Codec::default().encode(&a).unwrap();
        let mut b = sim();
        Codec::default().load(&mut b, &bytes).unwrap();
        assert_eq!(Snapshot::from_sim(&a).particles, Snapshot::from_sim(&b).particles);
        assert_eq!(Snapshot::from_sim(&a).hash(), Snapshot::from_sim(&b).hash());
    }

    #[test]
    fn filt_fields_round_trip_bit_exact() {
        let mut a = sim();
        let i = a.create_part(-2, 5, 5, PT_FILT) as usize;
        a.parts.data[i].ctype = 0x3FFF_FFFF;
        a.parts.data[i].tmp = 2;
        a.parts.data[i].dcolour = 0x80FF_0000;
        a.apply_settings(&SimulationSettings {
            gravity_mode: GravityMode::Custom { gx: 1.0, gy: 0.0 },
            ..SimulationSettings::default()
        });

        let bytes = Codec::default().encode(&a).unwrap();
        let mut b = sim();
        Codec::default().load(&mut b, &bytes).unwrap();

        let r = b.pmap[(5, 5)];
        assert_ne!(r, 0);
        let part = b.parts.data[pmap_id(r)];
        assert_eq!(part.ptype, PT_FILT);
        assert_eq!(part.ctype, 0x3FFF_FFFF);
        assert_eq!(part.tmp, 2);
        assert_eq!(part.dcolour, 0x80FF_0000);
        assert_eq!(b.gravity_mode, GravityMode::Custom { gx: 1.0, gy: 0.0 });
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut b = sim();
        let err = Codec::default().load(&mut b, b"XXXXRUBBISH").unwrap_err();
        assert_eq!(err, ParseError::BadMagic);
        assert_eq!(b.num_parts, 0);
    }

    #[test]
    fn legacy_magic_is_gated() {
        let codec = Codec::default();
        assert_eq!(codec.decode(b"OPS1AAAAAAAA"), Err(ParseError::BadMagic));
        let permissive = Codec { allow_legacy: true, ..Codec::default() };
        assert_eq!(
            permissive.decode(b"OPS1AAAAAAAA"),
            Err(ParseError::BadField("legacy save body"))
        );
    }

    #[test]
    fn truncated_saves_do_not_touch_the_sim() {
        let mut a = sim();
        a.create_part(-2, 50, 50, PT_DUST);
        let bytes = Codec::default().encode(&a).unwrap();
        let mut b = sim();
        b.create_part(-2, 9, 9, PT_WATR);
        let before = Snapshot::from_sim(&b).hash();
        assert!(Codec::default().load(&mut b, &bytes[..bytes.len() / 2]).is_err());
        assert_eq!(Snapshot::from_sim(&b).hash(), before);
    }

    #[test]
    fn walls_and_signs_round_trip() {
        let mut a = sim();
        a.create_walls(40, 40, 8, 8, crate::walls::WL_WALL);
        a.add_sign(100, 50, Justification::Centre, "hello {t}");
        let bytes = Codec::default().encode(&a).unwrap();
        let mut b = sim();
        Codec::default().load(&mut b, &bytes).unwrap();
        let (cx, cy) = b.cell_of(40, 40);
        assert_eq!(b.bmap[(cx, cy)], crate::walls::WL_WALL);
        assert_eq!(b.signs.len(), 1);
        assert_eq!(b.signs[0].text, "hello {t}");
        assert_eq!(b.signs[0].ju, Justification::Centre);
    }

    #[test]
    fn oversized_saves_fail_with_too_large() {
        let save = GameSave {
            cells: (200, 200),
            settings: SimulationSettings::default(),
            frame_count: 0,
            rng_state: [1, 2],
            particles: Vec::new(),
            walls: vec![0; 200 * 200],
            fans: Vec::new(),
            air: None,
            ambient_heat: None,
            decorations: Vec::new(),
            signs: Vec::new(),
            custom_gol: Vec::new(),
            authors: serde_json::Value::Null,
        };
        let mut small = sim(); // 153x96 cells
        assert_eq!(apply(&mut small, &save), Err(ParseError::TooLarge));
    }

    #[test]
    fn custom_gol_palette_round_trips() {
        let mut a = sim();
        {
            let mut registry = (*a.elements).clone();
            registry
                .register_custom_gol(GolRule::from_canonical("B36/S125", 1, 2).unwrap())
                .unwrap();
            a.elements = std::sync::Arc::new(registry);
        }
        // Temperature stays default; the palette alone must survive.
        let bytes = Codec::default().encode(&a).unwrap();
        let mut b = sim();
        Codec::default().load(&mut b, &bytes).unwrap();
        let rules = b.elements.custom_gol_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].1.canonical(), "B36/S125");
    }
}
