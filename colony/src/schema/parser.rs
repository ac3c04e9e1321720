use super::types::{FieldSpec, IdStrategy};
use super::Schema;
use crate::error::{ColonyError, Result};
use serde::Deserialize;

/// On-disk shape of a schema document.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    fields: serde_yaml::Mapping,
    #[serde(default)]
    id: Option<IdStrategy>,
}

/// Parse a schema YAML string into a normalized [`Schema`].
///
/// ```yaml
/// fields:
///   name: { type: string, required: true, unique: true }
///   age: { type: number, required: true }
///   memo: { type: string }
/// id: ulid
/// ```
pub fn parse_schema_str(content: &str) -> Result<Schema> {
    let file: SchemaFile = serde_yaml::from_str(content)?;

    // serde_yaml mappings preserve declaration order, which becomes the
    // schema's canonical field order.
    let mut specs = Vec::with_capacity(file.fields.len());
    for (key, value) in file.fields {
        let name = key
            .as_str()
            .ok_or_else(|| ColonyError::Schema(format!("Field name must be a string: {key:?}")))?
            .to_string();
        let spec: FieldSpec = serde_yaml::from_value(value)?;
        specs.push((name, spec));
    }

    let mut schema = Schema::normalize(specs);
    if let Some(strategy) = file.id {
        schema = schema.with_id_strategy(strategy);
    }
    Ok(schema)
}
