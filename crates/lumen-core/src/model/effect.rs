// ── Effects ──
//
// Named, firmware-side animations. The core only carries the name and
// two tuning knobs; what "rainbow" looks like is up to the device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const MAX_EFFECT_NAME: usize = 32;
const DEFAULT_SPEED: u8 = 50;
const DEFAULT_INTENSITY: u8 = 100;

/// Validated effect name: ASCII alphanumerics, `_` or `-`, at most 32 chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EffectId(String);

impl EffectId {
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::validation("effect", "name cannot be empty"));
        }
        if name.len() > MAX_EFFECT_NAME {
            return Err(CoreError::validation(
                "effect",
                format!("name longer than {MAX_EFFECT_NAME} characters"),
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CoreError::validation(
                "effect",
                format!("'{name}' may only contain letters, digits, '_' and '-'"),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EffectId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EffectId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<EffectId> for String {
    fn from(id: EffectId) -> Self {
        id.0
    }
}

/// Optional tuning passed alongside an effect name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectOptions {
    pub speed: Option<u8>,
    pub intensity: Option<u8>,
}

/// A fully specified effect as sent to the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectSpec {
    pub id: EffectId,
    /// 0..=100
    pub speed: u8,
    /// 0..=100
    pub intensity: u8,
}

impl EffectSpec {
    pub fn new(name: &str, options: EffectOptions) -> Result<Self, CoreError> {
        let id = EffectId::new(name)?;
        let speed = options.speed.unwrap_or(DEFAULT_SPEED);
        let intensity = options.intensity.unwrap_or(DEFAULT_INTENSITY);
        if speed > 100 {
            return Err(CoreError::validation(
                "speed",
                format!("{speed} is outside 0..=100"),
            ));
        }
        if intensity > 100 {
            return Err(CoreError::validation(
                "intensity",
                format!("{intensity} is outside 0..=100"),
            ));
        }
        Ok(Self {
            id,
            speed,
            intensity,
        })
    }

    pub fn has_default_intensity(&self) -> bool {
        self.intensity == DEFAULT_INTENSITY
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn effect_names_are_validated() {
        assert!(EffectId::new("rainbow").is_ok());
        assert!(EffectId::new("color_wipe-2").is_ok());
        assert!(EffectId::new("").is_err());
        assert!(EffectId::new("fire & ice").is_err());
        assert!(EffectId::new("x".repeat(33)).is_err());
        assert!(EffectId::new("x".repeat(32)).is_ok());
    }

    #[test]
    fn spec_fills_defaults() {
        let spec = EffectSpec::new("rainbow", EffectOptions::default()).unwrap();
        assert_eq!(spec.speed, 50);
        assert_eq!(spec.intensity, 100);
        assert!(spec.has_default_intensity());
    }

    #[test]
    fn spec_rejects_out_of_range_tuning() {
        let err = EffectSpec::new(
            "strobe",
            EffectOptions {
                speed: Some(101),
                intensity: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "speed"));

        let err = EffectSpec::new(
            "strobe",
            EffectOptions {
                speed: None,
                intensity: Some(200),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "intensity"));
    }
}
