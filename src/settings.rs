//! Runtime-settable simulation options
//!
//! Everything here is changeable without re-initializing the sim, unlike
//! `SimulationConfig`. The whole set round-trips through serde so the UI
//! layer can persist scenario flags alongside saves and preferences.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMode {
    Void,
    Solid,
    Loop,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GravityMode {
    Vertical,
    Off,
    Radial,
    Custom { gx: f32, gy: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirMode {
    On,
    PressureOff,
    VelocityOff,
    Off,
    NoUpdate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecoSpace {
    Srgb,
    Linear,
    Gamma22,
    Gamma18,
}

/// Display-only temperature unit; the sim always works in Kelvin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempScale {
    Kelvin,
    Celsius,
    Fahrenheit,
}

impl TempScale {
    pub fn from_kelvin(self, k: f32) -> f32 {
        match self {
            TempScale::Kelvin => k,
            TempScale::Celsius => k - 273.15,
            TempScale::Fahrenheit => (k - 273.15) * 1.8 + 32.0,
        }
    }
}

/// Scenario flags written into save headers and applied on load.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    pub edge_mode: EdgeMode,
    pub gravity_mode: GravityMode,
    pub air_mode: AirMode,
    pub ambient_air_temp: f32,
    pub legacy_heat: bool,
    pub newtonian_gravity: bool,
    pub ambient_heat: bool,
    pub water_equalization: bool,
    pub deco_space: DecoSpace,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            edge_mode: EdgeMode::Void,
            gravity_mode: GravityMode::Vertical,
            air_mode: AirMode::On,
            ambient_air_temp: crate::config::R_TEMP + 273.15,
            legacy_heat: false,
            newtonian_gravity: false,
            ambient_heat: false,
            water_equalization: false,
            deco_space: DecoSpace::Srgb,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_scale_conversions() {
        assert_eq!(TempScale::Kelvin.from_kelvin(295.15), 295.15);
        assert!((TempScale::Celsius.from_kelvin(295.15) - 22.0).abs() < 1e-4);
        assert!((TempScale::Fahrenheit.from_kelvin(273.15) - 32.0).abs() < 1e-4);
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = SimulationSettings {
            gravity_mode: GravityMode::Custom { gx: 1.0, gy: 0.0 },
            newtonian_gravity: true,
            ..SimulationSettings::default()
        };
        let text = serde_json::to_string(&settings).unwrap();
        let back: SimulationSettings = serde_json::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }
}
