//! Declarative argument schemas. Each action describes its parameters as a
//! const table; the same table renders the JSON Schema advertised to the
//! planner and validates/normalizes incoming arguments (defaults applied,
//! unknown keys stripped, violations enumerated per field).

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    StringArray,
}

impl FieldType {
    const fn json_name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::StringArray => "array",
        }
    }
}

/// Const-constructible default for optional fields.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    None,
    Bool(bool),
    Int(u64),
    Str(&'static str),
}

impl DefaultValue {
    fn to_value(self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Bool(b) => Some(Value::Bool(b)),
            Self::Int(i) => Some(json!(i)),
            Self::Str(s) => Some(Value::String(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub default: DefaultValue,
    pub description: &'static str,
    /// Enumerated values for string fields; empty slice = unconstrained.
    pub allowed: &'static [&'static str],
}

impl Field {
    pub const fn required(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            default: DefaultValue::None,
            description,
            allowed: &[],
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: DefaultValue::None,
            description,
            allowed: &[],
        }
    }

    pub const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    pub const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = allowed;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub fields: &'static [Field],
}

pub const EMPTY: Schema = Schema { fields: &[] };

/// Validation failure: which fields were missing, which were malformed.
#[derive(Debug, Clone, Default)]
pub struct SchemaViolation {
    pub missing: Vec<&'static str>,
    pub malformed: Vec<(&'static str, String)>,
}

impl SchemaViolation {
    fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.malformed.is_empty()
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing required field(s): {}", self.missing.join(", ")));
        }
        if !self.malformed.is_empty() {
            let detail: Vec<String> = self
                .malformed
                .iter()
                .map(|(name, why)| format!("{name} ({why})"))
                .collect();
            parts.push(format!("malformed field(s): {}", detail.join(", ")));
        }
        f.write_str(&parts.join("; "))
    }
}

/// Normalized arguments: defaults applied, unknown keys gone, every present
/// value type-checked against the schema.
#[derive(Debug, Clone, Default)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str).map(str::trim)
    }

    pub fn u64(&self, name: &str) -> Option<u64> {
        self.0.get(name).and_then(Value::as_u64)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn str_list(&self, name: &str) -> Option<Vec<&str>> {
        self.0.get(name).and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    pub fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl Schema {
    /// Validate and normalize. `null` is treated as the empty object so
    /// zero-argument tool calls from sloppy planners still succeed.
    pub fn validate(&self, raw: &Value) -> Result<Args, SchemaViolation> {
        let empty = Map::new();
        let obj = match raw {
            Value::Object(m) => m,
            Value::Null => &empty,
            _ => {
                return Err(SchemaViolation {
                    missing: vec![],
                    malformed: vec![("arguments", "expected a JSON object".to_owned())],
                })
            }
        };

        let mut out = Map::new();
        let mut violation = SchemaViolation::default();

        for field in self.fields {
            let Some(v) = obj.get(field.name).filter(|v| !v.is_null()) else {
                if let Some(d) = field.default.to_value() {
                    out.insert(field.name.to_owned(), d);
                } else if field.required {
                    violation.missing.push(field.name);
                }
                continue;
            };

            match field.ty {
                FieldType::String => match v.as_str() {
                    Some(s) if field.allowed.is_empty() || field.allowed.contains(&s.trim()) => {
                        out.insert(field.name.to_owned(), Value::String(s.to_owned()));
                    }
                    Some(s) => violation.malformed.push((
                        field.name,
                        format!("\"{s}\" is not one of {}", field.allowed.join("|")),
                    )),
                    None => violation
                        .malformed
                        .push((field.name, "expected string".to_owned())),
                },
                FieldType::Integer => match v.as_u64() {
                    Some(i) => {
                        out.insert(field.name.to_owned(), json!(i));
                    }
                    None => violation
                        .malformed
                        .push((field.name, "expected non-negative integer".to_owned())),
                },
                FieldType::Boolean => match v.as_bool() {
                    Some(b) => {
                        out.insert(field.name.to_owned(), Value::Bool(b));
                    }
                    None => violation
                        .malformed
                        .push((field.name, "expected boolean".to_owned())),
                },
                FieldType::StringArray => {
                    let ok = v
                        .as_array()
                        .is_some_and(|arr| arr.iter().all(Value::is_string));
                    if ok {
                        out.insert(field.name.to_owned(), v.clone());
                    } else {
                        violation
                            .malformed
                            .push((field.name, "expected array of strings".to_owned()));
                    }
                }
            }
        }

        if violation.is_empty() {
            Ok(Args(out))
        } else {
            Err(violation)
        }
    }

    /// Render the JSON Schema advertised in the tool definition.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in self.fields {
            let mut prop = Map::new();
            prop.insert("type".to_owned(), json!(field.ty.json_name()));
            if !field.description.is_empty() {
                prop.insert("description".to_owned(), json!(field.description));
            }
            if field.ty == FieldType::StringArray {
                prop.insert("items".to_owned(), json!({ "type": "string" }));
            }
            if !field.allowed.is_empty() {
                prop.insert("enum".to_owned(), json!(field.allowed));
            }
            if let Some(d) = field.default.to_value() {
                prop.insert("default".to_owned(), d);
            }
            properties.insert(field.name.to_owned(), Value::Object(prop));
            if field.required {
                required.push(field.name);
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER_FIELDS: &[Field] = &[
        Field::required("to", FieldType::String, "Recipient address."),
        Field::required("amount", FieldType::String, "Amount in UI units."),
        Field::optional("token", FieldType::String, "ERC-20 address or native.")
            .with_default(DefaultValue::Str("native")),
        Field::optional("wait", FieldType::Boolean, "Block until confirmed.")
            .with_default(DefaultValue::Bool(true)),
    ];
    const TRANSFER: Schema = Schema {
        fields: TRANSFER_FIELDS,
    };

    #[test]
    fn empty_schema_accepts_empty_and_null() {
        assert!(EMPTY.validate(&json!({})).is_ok());
        assert!(EMPTY.validate(&Value::Null).is_ok());
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let err = TRANSFER.validate(&json!({ "amount": "1.5" })).err();
        assert!(err.is_some(), "expected violation");
        if let Some(v) = err {
            assert_eq!(v.missing, vec!["to"]);
            assert!(v.to_string().contains("missing required field(s): to"));
        }
    }

    #[test]
    fn defaults_are_applied_and_unknown_keys_stripped() -> Result<(), SchemaViolation> {
        let args = TRANSFER.validate(&json!({
            "to": "0x1",
            "amount": "1",
            "bogus": 42,
        }))?;
        assert_eq!(args.str("token"), Some("native"));
        assert_eq!(args.boolean("wait"), Some(true));
        assert!(!args.has("bogus"));
        Ok(())
    }

    #[test]
    fn type_mismatches_are_malformed_not_missing() {
        let err = TRANSFER.validate(&json!({ "to": "0x1", "amount": 5 })).err();
        assert!(err.is_some(), "expected violation");
        if let Some(v) = err {
            assert!(v.missing.is_empty());
            assert_eq!(v.malformed.len(), 1);
            assert_eq!(v.malformed[0].0, "amount");
        }
    }

    #[test]
    fn enums_constrain_string_values() {
        const F: &[Field] = &[Field::required("units", FieldType::String, "Unit system.")
            .one_of(&["ui", "base"])];
        const S: Schema = Schema { fields: F };
        assert!(S.validate(&json!({ "units": "ui" })).is_ok());
        assert!(S.validate(&json!({ "units": "wei" })).is_err());
    }

    #[test]
    fn json_schema_shape_matches_planner_contract() {
        let v = TRANSFER.to_json_schema();
        assert_eq!(v.get("type").and_then(Value::as_str), Some("object"));
        assert_eq!(
            v.get("additionalProperties").and_then(Value::as_bool),
            Some(false)
        );
        let req: Vec<&str> = v
            .get("required")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        assert_eq!(req, vec!["to", "amount"]);
    }
}
