use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive type tag for a schema field. Values are matched by runtime
/// type tag, not by structural inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Boolean,
}

/// Partial per-field spec as supplied by the caller. Any subset of the
/// descriptor may be given; omitted parts fall back to the defaults
/// (string type, not required, not unique, null default).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn of(field_type: FieldType) -> Self {
        FieldSpec {
            field_type,
            ..FieldSpec::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Identifier generation strategy carried by the schema. The default
/// produces a 20-character alphanumeric random string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Alphanumeric,
    Ulid,
    Uuid,
    Nanoid,
}

impl IdStrategy {
    /// Generate a fresh identifier. Uniqueness among concurrently live
    /// identifiers holds with overwhelmingly high probability; the store
    /// tolerates (does not detect) the theoretical collision case.
    pub fn generate(&self) -> String {
        match self {
            IdStrategy::Alphanumeric => alphanumeric_id(),
            IdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            IdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}

fn alphanumeric_id() -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let alphabet: Vec<char> = CHARS.iter().map(|&b| b as char).collect();
    nanoid::nanoid!(20, &alphabet)
}
