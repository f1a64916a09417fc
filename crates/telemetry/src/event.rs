//! # Event codes
//!
//! Devices tag every reading with an integer describing the vehicle state.
//! The code space is open: unknown codes are kept as-is and classified as
//! [`VehicleState::Other`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Folded labels understood on import, English and Spanish, by code.
const LABELS: &[(&str, EventCode)] = &[
    ("in transit", EventCode::IN_TRANSIT),
    ("transit", EventCode::IN_TRANSIT),
    ("transito", EventCode::IN_TRANSIT),
    ("stopped", EventCode::STOPPED),
    ("detenido", EventCode::STOPPED),
    ("panic", EventCode::PANIC),
    ("panico", EventCode::PANIC),
    ("power restored", EventCode::POWER_RESTORED),
    ("con alimentacion", EventCode::POWER_RESTORED),
    ("power lost", EventCode::POWER_LOST),
    ("sin alimentacion", EventCode::POWER_LOST),
    ("engine off", EventCode::ENGINE_OFF),
    ("motor detenido", EventCode::ENGINE_OFF),
    ("engine on", EventCode::ENGINE_ON),
    ("motor encendido", EventCode::ENGINE_ON),
];

/// Integer event code reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCode(pub i64);

impl EventCode {
    pub const UNKNOWN: Self = Self(0);
    pub const IN_TRANSIT: Self = Self(10);
    pub const STOPPED: Self = Self(11);
    pub const PANIC: Self = Self(20);
    pub const PANIC_ALT: Self = Self(21);
    pub const POWER_RESTORED: Self = Self(28);
    pub const POWER_LOST: Self = Self(29);
    pub const ENGINE_OFF: Self = Self(30);
    pub const ENGINE_ON: Self = Self(31);

    /// Code assumed when a reading carries none: moving if the speed is
    /// positive, stopped otherwise.
    #[must_use]
    pub fn from_speed(speed: f64) -> Self {
        if speed > 0.0 { Self::IN_TRANSIT } else { Self::STOPPED }
    }

    /// Human-readable label, as used in exports.
    #[must_use]
    pub fn label(self) -> String {
        match self {
            Self::PANIC => "Panic".to_string(),
            Self::ENGINE_ON => "Engine on".to_string(),
            Self::ENGINE_OFF => "Engine off".to_string(),
            Self::POWER_LOST => "Power lost".to_string(),
            Self::POWER_RESTORED => "Power restored".to_string(),
            Self::STOPPED => "Stopped".to_string(),
            Self::IN_TRANSIT => "In transit".to_string(),
            Self(code) => format!("Event {code}"),
        }
    }

    /// Map an exported or hand-written label back to a code. Every label
    /// produced by [`EventCode::label`] maps back to its code.
    ///
    /// Matching ignores case and accents and understands both the English
    /// labels and the Spanish ones older exports carry. `Event N` and
    /// `Evento N` give code `N`; anything else is [`EventCode::UNKNOWN`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let folded = fold(label);
        let folded = folded.trim();

        if let Ok(code) = folded.parse::<i64>() {
            return Self(code);
        }
        if let Some(code) = folded.strip_prefix("event ").or_else(|| folded.strip_prefix("evento "))
            && let Ok(code) = code.trim().parse::<i64>()
        {
            return Self(code);
        }

        LABELS.iter().find(|(name, _)| *name == folded).map_or(Self::UNKNOWN, |&(_, code)| code)
    }

    #[must_use]
    pub const fn state(self) -> VehicleState {
        match self.0 {
            10 | 31 => VehicleState::InTransit,
            11 => VehicleState::Stopped,
            30 => VehicleState::EngineOff,
            20 | 21 => VehicleState::Panic,
            _ => VehicleState::Other,
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventCode {
    fn from(code: i64) -> Self {
        Self(code)
    }
}

/// Coarse vehicle state derived from an event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
    InTransit,
    Stopped,
    EngineOff,
    Panic,
    Other,
}

impl VehicleState {
    /// Stopped with the engine running or off.
    #[must_use]
    pub const fn is_stationary(self) -> bool {
        matches!(self, Self::Stopped | Self::EngineOff)
    }
}

/// Lowercase and strip the accents found in Spanish and Portuguese text, so
/// labels and headers compare loosely.
#[must_use]
pub fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}
