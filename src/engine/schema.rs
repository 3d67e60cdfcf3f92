use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use crate::Record;

/// The JSON type a field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Number,
    Integer,
    String,
    Boolean,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

fn default_required() -> bool {
    true
}

/// Constraints for a single field.
///
/// Numeric bounds apply to `number` and `integer` fields, length bounds to
/// `string` fields (counted in chars). All bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub kind: FieldKind,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

impl FieldRule {
    pub fn new(kind: FieldKind) -> Self {
        Self { kind, required: true, min: None, max: None, min_len: None, max_len: None }
    }

    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    pub fn integer() -> Self {
        Self::new(FieldKind::Integer)
    }

    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn min_len(mut self, len: usize) -> Self {
        self.min_len = Some(len);
        self
    }

    pub fn max_len(mut self, len: usize) -> Self {
        self.max_len = Some(len);
        self
    }

    fn check(&self, field: &str, value: &Value, out: &mut Vec<Violation>) {
        let mut fail = |message: String| out.push(Violation { field: field.to_string(), message });

        match self.kind {
            FieldKind::String => {
                let Some(s) = value.as_str() else {
                    return fail(format!("\"{}\" must be a string", field));
                };
                let len = s.chars().count();
                if let Some(min) = self.min_len {
                    if len < min {
                        fail(format!("\"{}\" length must be at least {} characters long", field, min));
                    }
                }
                if let Some(max) = self.max_len {
                    if len > max {
                        fail(format!("\"{}\" length must be less than or equal to {} characters long", field, max));
                    }
                }
            }
            FieldKind::Boolean => {
                if !value.is_boolean() {
                    fail(format!("\"{}\" must be a boolean", field));
                }
            }
            FieldKind::Number | FieldKind::Integer => {
                let Some(n) = value.as_f64() else {
                    return fail(format!("\"{}\" must be a number", field));
                };
                if self.kind == FieldKind::Integer && !(value.is_i64() || value.is_u64()) {
                    return fail(format!("\"{}\" must be an integer", field));
                }
                if let Some(min) = self.min {
                    if n < min {
                        fail(format!("\"{}\" must be greater than or equal to {}", field, min));
                    }
                }
                if let Some(max) = self.max {
                    if n > max {
                        fail(format!("\"{}\" must be less than or equal to {}", field, max));
                    }
                }
            }
        }
    }
}

/// One failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

/// Every constraint a record failed, in schema order followed by unknown fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// A single violation not tied to a schema rule (e.g. a duplicate id).
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self { violations: vec![Violation { field: field.to_string(), message: message.into() }] }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.violations.iter().map(|v| v.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// A declarative record shape: field name to [`FieldRule`].
///
/// Field order is kept so violations are reported in the order the schema
/// declares them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<(String, FieldRule)>,
    #[serde(default)]
    pub allow_unknown: bool,
}

impl Schema {
    /// An empty schema, same as `Schema::default()`. Only records without
    /// fields pass until rules are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in record shape used when no schema file is configured:
    /// `{id: integer, name: string(min 3), age: integer[18,100]}`, all required.
    pub fn reference() -> Self {
        Schema::new()
            .field("id", FieldRule::integer())
            .field("name", FieldRule::string().min_len(3))
            .field("age", FieldRule::integer().range(18.0, 100.0))
    }

    /// Adds or replaces the rule for `name`.
    pub fn field(mut self, name: &str, rule: FieldRule) -> Self {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = rule,
            None => self.fields.push((name.to_string(), rule)),
        }
        self
    }

    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    /// Loads a schema from a JSON file.
    ///
    /// The file holds `{"fields": [["name", {"kind": "string", "min_len": 3}], ...], "allow_unknown": false}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Checks `record` against every rule and reports all failures at once.
    pub fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        let mut violations = Vec::new();

        for (name, rule) in &self.fields {
            match record.get(name) {
                None | Some(Value::Null) => {
                    if rule.required {
                        violations.push(Violation {
                            field: name.clone(),
                            message: format!("\"{}\" is required", name),
                        });
                    }
                }
                Some(value) => rule.check(name, value, &mut violations),
            }
        }

        if !self.allow_unknown {
            for key in record.keys() {
                if !self.fields.iter().any(|(n, _)| n == key) {
                    violations.push(Violation {
                        field: key.clone(),
                        message: format!("\"{}\" is not allowed", key),
                    });
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { violations })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_new_and_default_agree() {
        assert_eq!(Schema::new(), Schema::default());
        assert!(Schema::new().fields.is_empty());
        assert!(Schema::new().validate(&rec(json!({"id": 1}))).is_err());
        assert_eq!(Schema::reference().fields.len(), 3);
    }

    #[test]
    fn test_reference_schema_accepts_valid_record() {
        let schema = Schema::reference();
        assert!(schema.validate(&rec(json!({"id": 1, "name": "John", "age": 25}))).is_ok());
    }

    #[test]
    fn test_name_too_short() {
        let schema = Schema::reference();
        let err = schema.validate(&rec(json!({"id": 1, "name": "Jo", "age": 25}))).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "name");
        assert!(err.to_string().contains("at least 3"));
    }

    #[test]
    fn test_aggregates_all_violations() {
        let schema = Schema::reference();
        let err = schema.validate(&rec(json!({"name": 5, "age": 17, "extra": true}))).unwrap_err();
        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["id", "name", "age", "extra"]);
        assert!(err.to_string().contains("\"extra\" is not allowed"));
    }

    #[test]
    fn test_integer_rejects_fraction() {
        let schema = Schema::reference();
        let err = schema.validate(&rec(json!({"id": 1, "name": "John", "age": 25.5}))).unwrap_err();
        assert!(err.to_string().contains("must be an integer"));
    }

    #[test]
    fn test_range_bounds_are_inclusive() {
        let schema = Schema::reference();
        assert!(schema.validate(&rec(json!({"id": 1, "name": "John", "age": 18}))).is_ok());
        assert!(schema.validate(&rec(json!({"id": 1, "name": "John", "age": 100}))).is_ok());
        assert!(schema.validate(&rec(json!({"id": 1, "name": "John", "age": 101}))).is_err());
    }

    #[test]
    fn test_optional_and_unknown_fields() {
        let schema = Schema::new()
            .field("id", FieldRule::integer())
            .field("note", FieldRule::string().max_len(4).optional())
            .allow_unknown(true);

        assert!(schema.validate(&rec(json!({"id": 1}))).is_ok());
        assert!(schema.validate(&rec(json!({"id": 1, "note": null, "other": [1, 2]}))).is_ok());
        assert!(schema.validate(&rec(json!({"id": 1, "note": "toolong"}))).is_err());
    }

    #[test]
    fn test_schema_from_json() {
        let raw = r#"{
  "fields": [
    ["id", {"kind": "integer"}],
    ["active", {"kind": "boolean", "required": false}],
    ["score", {"kind": "number", "min": 0, "max": 1}]
  ]
}"#;
        let schema: Schema = serde_json::from_str(raw).unwrap();
        assert!(!schema.allow_unknown);
        assert!(schema.validate(&rec(json!({"id": 2, "score": 0.5}))).is_ok());

        let err = schema.validate(&rec(json!({"id": 2, "active": "yes", "score": 2}))).unwrap_err();
        assert_eq!(err.violations.len(), 2);
    }
}
