//! Declarative tool schemas and argument validation

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// JSON type a tool parameter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Object => write!(f, "object"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// One typed parameter of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    /// Allowed values for string parameters; empty means unrestricted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

/// Name, description and typed parameters of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a required parameter
    pub fn required(self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.param(name, kind, description, true)
    }

    /// Add an optional parameter
    pub fn optional(self, name: &str, kind: ParamKind, description: &str) -> Self {
        self.param(name, kind, description, false)
    }

    /// Restrict the most recently added parameter to a fixed set of string values
    pub fn one_of(mut self, values: &[&str]) -> Self {
        if let Some(last) = self.params.last_mut() {
            last.allowed = values.iter().map(|v| v.to_string()).collect();
        }
        self
    }

    fn param(mut self, name: &str, kind: ParamKind, description: &str, required: bool) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required,
            allowed: Vec::new(),
        });
        self
    }

    /// JSON Schema object sent to completion services
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let mut prop = json!({
                "type": param.kind.to_string(),
                "description": param.description,
            });
            if !param.allowed.is_empty() {
                prop["enum"] = json!(param.allowed);
            }
            properties.insert(param.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check arguments against the declared parameters.
    ///
    /// Rejects missing required parameters, unknown parameters, type
    /// mismatches and values outside an enumerated set. `null` counts as absent.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for key in args.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                return Err(format!("unexpected argument '{}'", key));
            }
        }

        for param in &self.params {
            match args.get(&param.name) {
                None | Some(Value::Null) => {
                    if param.required {
                        return Err(format!("missing required argument '{}'", param.name));
                    }
                }
                Some(value) => {
                    if !param.kind.accepts(value) {
                        return Err(format!(
                            "argument '{}' must be of type {}",
                            param.name, param.kind
                        ));
                    }
                    if !param.allowed.is_empty() {
                        let s = value.as_str().unwrap_or_default();
                        if !param.allowed.iter().any(|a| a == s) {
                            return Err(format!(
                                "argument '{}' must be one of: {}",
                                param.name,
                                param.allowed.join(", ")
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tour_schema() -> ToolSchema {
        ToolSchema::new("schedule_tour", "Schedule a tour")
            .required("lead_id", ParamKind::String, "Lead id")
            .required("guests", ParamKind::Integer, "Number of guests")
            .optional("notes", ParamKind::String, "Notes")
            .optional("channel", ParamKind::String, "Confirmation channel")
            .one_of(&["sms", "email"])
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_input_schema_shape() {
        let schema = tour_schema().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["guests"]["type"], "integer");
        assert_eq!(schema["properties"]["channel"]["enum"], json!(["sms", "email"]));
        assert_eq!(schema["required"], json!(["lead_id", "guests"]));
    }

    #[test]
    fn test_validate_accepts_valid_arguments() {
        let schema = tour_schema();
        assert!(schema.validate(&args(json!({"lead_id": "l1", "guests": 2}))).is_ok());
        assert!(
            schema
                .validate(&args(json!({"lead_id": "l1", "guests": 2, "notes": null, "channel": "sms"})))
                .is_ok()
        );
    }

    #[test]
    fn test_validate_missing_required() {
        let err = tour_schema().validate(&args(json!({"guests": 1}))).unwrap_err();
        assert!(err.contains("missing required argument 'lead_id'"));
    }

    #[test]
    fn test_validate_wrong_type() {
        let err = tour_schema()
            .validate(&args(json!({"lead_id": "l1", "guests": "two"})))
            .unwrap_err();
        assert!(err.contains("'guests' must be of type integer"));

        let err = tour_schema()
            .validate(&args(json!({"lead_id": "l1", "guests": 1.5})))
            .unwrap_err();
        assert!(err.contains("integer"));
    }

    #[test]
    fn test_validate_unknown_argument() {
        let err = tour_schema()
            .validate(&args(json!({"lead_id": "l1", "guests": 1, "color": "red"})))
            .unwrap_err();
        assert!(err.contains("unexpected argument 'color'"));
    }

    #[test]
    fn test_validate_enum() {
        let err = tour_schema()
            .validate(&args(json!({"lead_id": "l1", "guests": 1, "channel": "fax"})))
            .unwrap_err();
        assert!(err.contains("one of: sms, email"));
    }
}
