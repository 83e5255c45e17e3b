use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SensorError;

/// Entity state as returned by `GET /api/states/{entity_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
    #[serde(default)]
    pub last_changed: Option<String>,
}

impl EntityState {
    /// Numeric attribute. Accepts JSON numbers and numeric strings; rejects NaN/inf.
    pub fn attribute_f64(&self, name: &str) -> Option<f64> {
        let value = match self.attributes.get(name)? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }

    /// Parse the state string as a number.
    pub fn numeric_state(&self) -> Result<f64, SensorError> {
        parse_numeric_state(&self.entity_id, &self.state)
    }
}

/// Body of a `POST /api/services/{domain}/{service}` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub entity_id: String,
}

/// Parse a raw sensor state.
///
/// `unknown`, `unavailable` and empty states are reported as unavailable;
/// anything that is not a finite number is unparseable.
pub fn parse_numeric_state(entity_id: &str, raw: &str) -> Result<f64, SensorError> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("unknown")
        || trimmed.eq_ignore_ascii_case("unavailable")
    {
        return Err(SensorError::Unavailable {
            entity_id: entity_id.to_string(),
        });
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(SensorError::Unparseable {
            entity_id: entity_id.to_string(),
            raw: raw.to_string(),
        }),
    }
}
