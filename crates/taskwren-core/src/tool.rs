//! Tool registry and argument validation.
//!
//! The registry is the catalog the model sees and the validation contract
//! every proposed call passes before execution. Validation failures carry
//! the offending parameter and a reason; the dispatch loop feeds them back
//! to the model as correction hints rather than surfacing them to the user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde_json::{json, Map, Value};
use taskwren_backend::BackendError;

use crate::error::DispatchError;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    /// ISO-8601 calendar date, `YYYY-MM-DD`.
    Date,
    /// Wall-clock time, `HH:MM` (24h).
    Time,
    /// RFC 3339 timestamp.
    DateTime,
    Enum(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, kind: ParamKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

/// A proposed invocation extracted from model output. Raw and untrusted.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub tool: String,
    pub arguments: Map<String, Value>,
}

/// A call that passed validation: arguments coerced to canonical JSON,
/// defaults filled in.
#[derive(Debug, Clone)]
pub struct ValidatedCall {
    pub tool: String,
    pub arguments: Map<String, Value>,
}

impl ValidatedCall {
    fn missing(&self, name: &str) -> BackendError {
        BackendError::Invalid(format!("{}: missing argument '{name}'", self.tool))
    }

    pub fn str_arg(&self, name: &str) -> Result<&str, BackendError> {
        self.opt_str_arg(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_str_arg(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Value::as_str)
    }

    pub fn int_arg(&self, name: &str) -> Result<i64, BackendError> {
        self.opt_int_arg(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_int_arg(&self, name: &str) -> Option<i64> {
        self.arguments.get(name).and_then(Value::as_i64)
    }

    pub fn date_arg(&self, name: &str) -> Result<NaiveDate, BackendError> {
        self.opt_date_arg(name).ok_or_else(|| self.missing(name))
    }

    pub fn opt_date_arg(&self, name: &str) -> Option<NaiveDate> {
        self.opt_str_arg(name).and_then(|s| s.parse().ok())
    }

    pub fn opt_time_arg(&self, name: &str) -> Option<NaiveTime> {
        self.opt_str_arg(name)
            .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M").ok())
    }
}

/// One executable capability behind the registry.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<(), DispatchError> {
        let name = handler.spec().name;
        if self.tools.contains_key(&name) {
            return Err(DispatchError::DuplicateTool(name));
        }
        self.order.push(name.clone());
        self.tools.insert(name, handler);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&Arc<dyn ToolHandler>, DispatchError> {
        self.tools
            .get(name)
            .ok_or_else(|| DispatchError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check a proposed call against its schema. Unknown tools, unknown
    /// parameters, missing required parameters and uncoercible values are
    /// all rejected with the offending parameter named.
    pub fn validate(&self, call: &ToolCall) -> Result<ValidatedCall, DispatchError> {
        let handler = self.resolve(&call.tool)?;
        let spec = handler.spec();

        let mut arguments = Map::new();
        for (name, value) in &call.arguments {
            // Models routinely send explicit nulls for omitted optionals.
            if value.is_null() {
                continue;
            }
            let param = spec
                .params
                .iter()
                .find(|p| p.name == *name)
                .ok_or_else(|| invalid(&spec.name, name, "unknown parameter"))?;
            let coerced =
                coerce(&param.kind, value).map_err(|reason| invalid(&spec.name, name, &reason))?;
            arguments.insert(name.clone(), coerced);
        }

        for param in &spec.params {
            if arguments.contains_key(&param.name) {
                continue;
            }
            if param.required {
                return Err(invalid(
                    &spec.name,
                    &param.name,
                    "required parameter is missing",
                ));
            }
            if let Some(default) = &param.default {
                arguments.insert(param.name.clone(), default.clone());
            }
        }

        Ok(ValidatedCall {
            tool: spec.name,
            arguments,
        })
    }

    pub async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
        match self.tools.get(&call.tool) {
            Some(handler) => handler.execute(call).await,
            None => Err(BackendError::Invalid(format!(
                "no handler for tool {}",
                call.tool
            ))),
        }
    }

    /// The catalog embedded in the system prompt: names, descriptions and a
    /// JSON-schema-shaped parameter block per tool, in registration order.
    pub fn catalog(&self) -> Value {
        let tools: Vec<Value> = self
            .order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|handler| {
                let spec = handler.spec();
                let mut properties = Map::new();
                let mut required = Vec::new();
                for param in &spec.params {
                    let mut schema = param_schema(&param.kind);
                    if let Value::Object(ref mut obj) = schema {
                        obj.insert("description".into(), json!(param.description));
                        if let Some(default) = &param.default {
                            obj.insert("default".into(), default.clone());
                        }
                    }
                    properties.insert(param.name.clone(), schema);
                    if param.required {
                        required.push(json!(param.name));
                    }
                }
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                })
            })
            .collect();
        Value::Array(tools)
    }
}

fn invalid(tool: &str, param: &str, reason: &str) -> DispatchError {
    DispatchError::InvalidArguments {
        tool: tool.to_string(),
        param: param.to_string(),
        reason: reason.to_string(),
    }
}

fn param_schema(kind: &ParamKind) -> Value {
    match kind {
        ParamKind::String => json!({"type": "string"}),
        ParamKind::Integer => json!({"type": "integer"}),
        ParamKind::Boolean => json!({"type": "boolean"}),
        ParamKind::Date => json!({"type": "string", "format": "date"}),
        ParamKind::Time => json!({"type": "string", "pattern": "^\\d{2}:\\d{2}$"}),
        ParamKind::DateTime => json!({"type": "string", "format": "date-time"}),
        ParamKind::Enum(literals) => json!({"type": "string", "enum": literals}),
    }
}

/// Coerce a raw value to the canonical JSON shape for its kind, or explain
/// why it cannot be.
fn coerce(kind: &ParamKind, value: &Value) -> Result<Value, String> {
    match kind {
        ParamKind::String => match value {
            Value::String(s) => Ok(json!(s)),
            Value::Number(n) => Ok(json!(n.to_string())),
            _ => Err("expected a string".to_string()),
        },
        ParamKind::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .map(|i| json!(i))
                .ok_or_else(|| "expected a whole number".to_string()),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| json!(i))
                .map_err(|_| format!("'{s}' is not a whole number")),
            _ => Err("expected a whole number".to_string()),
        },
        ParamKind::Boolean => match value {
            Value::Bool(b) => Ok(json!(b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(json!(true)),
                "false" => Ok(json!(false)),
                _ => Err(format!("'{s}' is not a boolean")),
            },
            _ => Err("expected a boolean".to_string()),
        },
        ParamKind::Date => {
            let s = value.as_str().ok_or("expected a YYYY-MM-DD date string")?;
            s.trim()
                .parse::<NaiveDate>()
                .map(|d| json!(d.to_string()))
                .map_err(|_| format!("'{s}' is not a YYYY-MM-DD date"))
        }
        ParamKind::Time => {
            let s = value.as_str().ok_or("expected an HH:MM time string")?;
            let trimmed = s.trim();
            NaiveTime::parse_from_str(trimmed, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
                .map(|t| json!(t.format("%H:%M").to_string()))
                .map_err(|_| format!("'{s}' is not an HH:MM time"))
        }
        ParamKind::DateTime => {
            let s = value.as_str().ok_or("expected an RFC 3339 timestamp")?;
            DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| json!(dt.to_rfc3339()))
                .map_err(|_| format!("'{s}' is not an RFC 3339 timestamp"))
        }
        ParamKind::Enum(literals) => {
            let s = value.as_str().ok_or("expected a string")?;
            literals
                .iter()
                .find(|lit| lit.eq_ignore_ascii_case(s.trim()))
                .map(|lit| json!(lit))
                .ok_or_else(|| format!("'{s}' is not one of: {}", literals.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "echo".into(),
                description: "Echo the input back".into(),
                params: vec![
                    ParamSpec::required("text", ParamKind::String, "What to echo"),
                    ParamSpec::optional("repeat", ParamKind::Integer, "Repetitions")
                        .with_default(json!(1)),
                    ParamSpec::optional("when", ParamKind::Date, "Optional date"),
                ],
            }
        }

        async fn execute(&self, call: &ValidatedCall) -> Result<Value, BackendError> {
            Ok(json!({"echoed": call.str_arg("text")?}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry
    }

    fn call(arguments: Value) -> ToolCall {
        ToolCall {
            tool: "echo".into(),
            arguments: arguments.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateTool(name) if name == "echo"));
    }

    #[test]
    fn resolve_unknown_tool() {
        let registry = registry();
        assert!(matches!(
            registry.resolve("nonexistent"),
            Err(DispatchError::UnknownTool(_))
        ));
        assert!(registry.contains("echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn exact_call_accepted_with_defaults_filled() {
        let registry = registry();
        let validated = registry.validate(&call(json!({"text": "hi"}))).unwrap();
        assert_eq!(validated.str_arg("text").unwrap(), "hi");
        assert_eq!(validated.int_arg("repeat").unwrap(), 1);
        assert!(validated.opt_date_arg("when").is_none());
    }

    #[test]
    fn missing_required_parameter_rejected() {
        let registry = registry();
        let err = registry.validate(&call(json!({"repeat": 3}))).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidArguments { ref param, .. } if param == "text"
        ));
    }

    #[test]
    fn unknown_parameter_rejected() {
        let registry = registry();
        let err = registry
            .validate(&call(json!({"text": "hi", "volume": 11})))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::InvalidArguments { ref param, .. } if param == "volume"
        ));
    }

    #[test]
    fn unknown_tool_rejected_by_validate() {
        let registry = registry();
        let unknown = ToolCall {
            tool: "launch_rocket".into(),
            arguments: Map::new(),
        };
        assert!(matches!(
            registry.validate(&unknown),
            Err(DispatchError::UnknownTool(_))
        ));
    }

    #[test]
    fn null_arguments_treated_as_absent() {
        let registry = registry();
        let validated = registry
            .validate(&call(json!({"text": "hi", "when": null})))
            .unwrap();
        assert!(!validated.arguments.contains_key("when"));
    }

    #[test]
    fn integer_coerced_from_string() {
        let registry = registry();
        let validated = registry
            .validate(&call(json!({"text": "hi", "repeat": "4"})))
            .unwrap();
        assert_eq!(validated.int_arg("repeat").unwrap(), 4);
    }

    #[test]
    fn bad_date_named_in_error() {
        let registry = registry();
        let err = registry
            .validate(&call(json!({"text": "hi", "when": "tomorrow"})))
            .unwrap_err();
        match err {
            DispatchError::InvalidArguments { param, reason, .. } => {
                assert_eq!(param, "when");
                assert!(reason.contains("tomorrow"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn coerce_time_variants() {
        assert_eq!(coerce(&ParamKind::Time, &json!("09:30")).unwrap(), json!("09:30"));
        assert_eq!(
            coerce(&ParamKind::Time, &json!("09:30:15")).unwrap(),
            json!("09:30")
        );
        assert!(coerce(&ParamKind::Time, &json!("9 am")).is_err());
    }

    #[test]
    fn coerce_enum_case_insensitive() {
        let kind = ParamKind::Enum(vec!["low".into(), "high".into()]);
        assert_eq!(coerce(&kind, &json!("HIGH")).unwrap(), json!("high"));
        assert!(coerce(&kind, &json!("medium")).is_err());
    }

    #[test]
    fn catalog_shape() {
        let registry = registry();
        let catalog = registry.catalog();
        let tools = catalog.as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");
        assert_eq!(tools[0]["parameters"]["type"], "object");
        assert_eq!(tools[0]["parameters"]["required"][0], "text");
        assert_eq!(
            tools[0]["parameters"]["properties"]["repeat"]["default"],
            json!(1)
        );
        assert_eq!(
            tools[0]["parameters"]["properties"]["when"]["format"],
            "date"
        );
    }

    #[tokio::test]
    async fn execute_round_trip() {
        let registry = registry();
        let validated = registry.validate(&call(json!({"text": "ping"}))).unwrap();
        let result = registry.execute(&validated).await.unwrap();
        assert_eq!(result["echoed"], "ping");
    }
}
