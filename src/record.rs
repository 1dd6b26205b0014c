use std::fmt::{Display, Formatter};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identity of a reservation or borrow request. Older records carry numeric
/// ids, newer ones strings. Both load and compare by their text form.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Millisecond timestamp id, bumped past any id already taken.
    pub fn time_ordered<'a>(now_ms: i64, taken: impl Iterator<Item = &'a RecordId> + Clone) -> Self {
        let mut ms = now_ms;
        while taken.clone().any(|id| id.0 == ms.to_string()) {
            ms += 1;
        }
        Self(ms.to_string())
    }
    pub fn matches(&self, id: &str) -> bool {
        self.0 == id
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self(value_to_text(Value::deserialize(deserializer)?).unwrap_or_default()))
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Any scalar becomes text, `null` becomes `None`.
pub(crate) fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_text(Value::deserialize(deserializer)?))
}

/// Numbers and numeric strings, anything else is `None`.
pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let n = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(n)
}

pub(crate) fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}
