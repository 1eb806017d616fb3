//! Aura reading data and response validation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ReadingError;

/// Number of palette colours a reading declares
pub const PALETTE_SIZE: usize = 3;

/// Structured result of a reading request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuraReading {
    /// What the dominant aura colour signifies
    pub aura_color_insight: String,
    /// A short glimpse of the near future
    pub future_glimpse: String,
    /// Guiding number, 3-4 digits by convention
    pub angel_number: i64,
    /// Advice or mantra to reflect on
    pub spiritual_guidance: String,
    /// Dominant colours as `#RRGGBB`
    pub primary_colors: Vec<String>,
}

/// How strictly `primaryColors` is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PalettePolicy {
    /// Exactly three `#RRGGBB` strings
    #[default]
    Enforced,
    /// Any array of strings
    Advisory,
}

impl PalettePolicy {
    pub fn from_enforce(enforce: bool) -> Self {
        if enforce {
            PalettePolicy::Enforced
        } else {
            PalettePolicy::Advisory
        }
    }
}

/// Parse model output text into a reading.
///
/// Either every field is present with the declared type, or the whole response
/// is rejected; no partially populated reading is ever returned.
pub fn parse_reading(text: &str, policy: PalettePolicy) -> Result<AuraReading, ReadingError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| shape(format!("response is not valid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| shape("response is not a JSON object"))?;

    let reading = AuraReading {
        aura_color_insight: text_field(object, "auraColorInsight")?,
        future_glimpse: text_field(object, "futureGlimpse")?,
        angel_number: integer_field(object, "angelNumber")?,
        spiritual_guidance: text_field(object, "spiritualGuidance")?,
        primary_colors: string_array_field(object, "primaryColors")?,
    };

    if policy == PalettePolicy::Enforced {
        check_palette(&reading.primary_colors)?;
    }

    Ok(reading)
}

/// Whether `color` has the form `#RRGGBB`
pub fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

fn shape(message: impl Into<String>) -> ReadingError {
    ReadingError::InvalidResponseShape(message.into())
}

fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Result<&'a Value, ReadingError> {
    object
        .get(name)
        .ok_or_else(|| shape(format!("missing field `{}`", name)))
}

fn text_field(object: &Map<String, Value>, name: &str) -> Result<String, ReadingError> {
    match field(object, name)? {
        Value::String(text) if !text.trim().is_empty() => Ok(text.clone()),
        Value::String(_) => Err(shape(format!("`{}` is empty", name))),
        other => Err(shape(format!("`{}` must be a string, got {}", name, kind(other)))),
    }
}

fn integer_field(object: &Map<String, Value>, name: &str) -> Result<i64, ReadingError> {
    let value = field(object, name)?;
    let Value::Number(number) = value else {
        return Err(shape(format!("`{}` must be a number, got {}", name, kind(value))));
    };

    if let Some(integer) = number.as_i64() {
        return Ok(integer);
    }
    // Whole-valued floats such as 777.0 are accepted
    match number.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => Ok(float as i64),
        _ => Err(shape(format!("`{}` must be an integer, got {}", name, number))),
    }
}

fn string_array_field(object: &Map<String, Value>, name: &str) -> Result<Vec<String>, ReadingError> {
    let value = field(object, name)?;
    let Value::Array(items) = value else {
        return Err(shape(format!("`{}` must be an array, got {}", name, kind(value))));
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(text) => Ok(text.clone()),
            other => Err(shape(format!(
                "`{}` must contain only strings, got {}",
                name,
                kind(other)
            ))),
        })
        .collect()
}

fn check_palette(colors: &[String]) -> Result<(), ReadingError> {
    if colors.len() != PALETTE_SIZE {
        return Err(shape(format!(
            "expected {} primary colors, got {}",
            PALETTE_SIZE,
            colors.len()
        )));
    }
    if let Some(bad) = colors.iter().find(|c| !is_hex_color(c)) {
        return Err(shape(format!("`{}` is not a #RRGGBB color", bad)));
    }
    Ok(())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
