//! Tool manifests
//!
//! A scenario advertises its callable capabilities as a [`ToolManifest`].
//! Parameters are JSON-Schema shaped and are enforced on every call.

use axm_types::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Protocol version carried by every manifest
pub const PROTOCOL_VERSION: &str = "1.0";

/// Tool names are non-empty ASCII alphanumerics and underscores
#[must_use]
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Scenario identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// Rough cost class of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostEstimate {
    #[default]
    Low,
    Medium,
    High,
    Variable,
}

/// JSON-Schema shaped parameter block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolParameters {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub additional_properties: bool,
}

fn object_type() -> String {
    "object".to_string()
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            schema_type: object_type(),
            properties: Map::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }
}

impl ToolParameters {
    /// Add a property schema
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// The block as a JSON Schema document
    #[must_use]
    pub fn to_schema(&self) -> Value {
        // serialization of plain maps and strings cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Call and execution metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolMetadata {
    pub enabled_by_default: bool,
    pub requires_approval: bool,
    /// Zero disables the local timeout
    pub timeout_seconds: u64,
    /// Zero disables the local rate limit
    pub rate_limit_per_minute: u32,
    pub cost_estimate: CostEstimate,
    pub long_running: bool,
    pub idempotent: bool,
    pub tags: Vec<String>,
}

impl Default for ToolMetadata {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            requires_approval: false,
            timeout_seconds: 30,
            rate_limit_per_minute: 0,
            cost_estimate: CostEstimate::Low,
            long_running: false,
            idempotent: false,
            tags: Vec::new(),
        }
    }
}

/// Example invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExample {
    pub description: String,
    pub arguments: Value,
}

/// A callable tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parameters: ToolParameters,
    #[serde(default)]
    pub metadata: ToolMetadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<ToolExample>,
}

impl ToolDefinition {
    /// Tool with default metadata and no parameters
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: String::new(),
            parameters: ToolParameters::default(),
            metadata: ToolMetadata::default(),
            examples: Vec::new(),
        }
    }

    /// With category
    #[inline]
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// With parameters
    #[inline]
    #[must_use]
    pub fn with_parameters(mut self, parameters: ToolParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// With metadata
    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, metadata: ToolMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Validate the definition itself
    pub fn validate(&self) -> Result<(), ValidationError> {
        let field = format!("tools.{}", self.name);
        if !is_valid_tool_name(&self.name) {
            return Err(ValidationError::new(
                "tools.name",
                format!("'{}' is not alphanumeric/underscore", self.name),
            ));
        }
        if self.parameters.schema_type != "object" {
            return Err(ValidationError::new(
                field,
                format!("parameters type must be object, got '{}'", self.parameters.schema_type),
            ));
        }
        if let Some(missing) = self
            .parameters
            .required
            .iter()
            .find(|r| !self.parameters.properties.contains_key(r.as_str()))
        {
            return Err(ValidationError::new(
                field,
                format!("required parameter '{missing}' has no property schema"),
            ));
        }
        jsonschema::JSONSchema::compile(&self.parameters.to_schema())
            .map(|_| ())
            .map_err(|e| ValidationError::new(field, format!("invalid parameter schema: {e}")))
    }

    /// Validate call arguments against the parameter schema
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<(), ValidationError> {
        if let Some(missing) = self
            .parameters
            .required
            .iter()
            .find(|r| !arguments.contains_key(r.as_str()))
        {
            return Err(ValidationError::new(
                format!("arguments.{missing}"),
                format!("required by tool '{}'", self.name),
            ));
        }

        let schema = self.parameters.to_schema();
        let compiled = jsonschema::JSONSchema::compile(&schema).map_err(|e| {
            ValidationError::new(format!("tools.{}", self.name), e.to_string())
        })?;
        let instance = Value::Object(arguments.clone());
        let result = compiled.validate(&instance);
        if let Err(errors) = result {
            let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
            return Err(ValidationError::new("arguments", messages.join("; "))
                .with_hint(format!("see the parameter schema of '{}'", self.name)));
        }
        Ok(())
    }
}

/// Tool grouping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCategory {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Discovery payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolManifest {
    pub protocol_version: String,
    pub scenario: ScenarioInfo,
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub categories: Vec<ToolCategory>,
    pub generated_at: DateTime<Utc>,
}

impl ToolManifest {
    /// Manifest at the current protocol version
    #[must_use]
    pub fn new(
        scenario: ScenarioInfo,
        tools: Vec<ToolDefinition>,
        categories: Vec<ToolCategory>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            scenario,
            tools,
            categories,
            generated_at,
        }
    }

    /// Look up a tool by name
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Validate the whole manifest
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(ValidationError::new(
                "protocolVersion",
                format!("unsupported version '{}'", self.protocol_version),
            )
            .with_hint(format!("expected {PROTOCOL_VERSION}")));
        }
        if self.scenario.name.trim().is_empty() {
            return Err(ValidationError::new("scenario.name", "must not be empty"));
        }

        let categories: HashSet<&str> = self.categories.iter().map(|c| c.id.as_str()).collect();
        let mut seen = HashSet::new();
        for tool in &self.tools {
            tool.validate()?;
            if !seen.insert(tool.name.as_str()) {
                return Err(ValidationError::new(
                    "tools.name",
                    format!("duplicate tool '{}'", tool.name),
                ));
            }
            if !categories.is_empty()
                && !tool.category.is_empty()
                && !categories.contains(tool.category.as_str())
            {
                return Err(ValidationError::new(
                    format!("tools.{}", tool.name),
                    format!("unknown category '{}'", tool.category),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_tool() -> ToolDefinition {
        ToolDefinition::new("search_notes", "Full-text search").with_parameters(
            ToolParameters::default()
                .with_property("query", json!({"type": "string"}), true)
                .with_property("limit", json!({"type": "integer", "minimum": 1}), false),
        )
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn tool_names_are_restricted() {
        assert!(search_tool().validate().is_ok());
        assert!(ToolDefinition::new("search-notes", "x").validate().is_err());
        assert!(ToolDefinition::new("", "x").validate().is_err());
    }

    #[test]
    fn required_argument_missing() {
        let err = search_tool().validate_arguments(&args(json!({"limit": 3}))).unwrap_err();
        assert_eq!(err.field, "arguments.query");
    }

    #[test]
    fn schema_violation_reported() {
        let err = search_tool()
            .validate_arguments(&args(json!({"query": "x", "limit": 0})))
            .unwrap_err();
        assert_eq!(err.field, "arguments");

        let err = search_tool()
            .validate_arguments(&args(json!({"query": "x", "extra": true})))
            .unwrap_err();
        assert_eq!(err.field, "arguments");
    }

    #[test]
    fn valid_arguments_pass() {
        assert!(search_tool()
            .validate_arguments(&args(json!({"query": "rust", "limit": 5})))
            .is_ok());
    }

    #[test]
    fn manifest_rules() {
        let scenario = ScenarioInfo {
            name: "notes".into(),
            version: "1.2.0".into(),
            description: String::new(),
        };
        let mut manifest = ToolManifest::new(
            scenario,
            vec![search_tool().with_category("read")],
            vec![ToolCategory {
                id: "read".into(),
                name: "Read".into(),
                description: String::new(),
            }],
            Utc::now(),
        );
        assert!(manifest.validate().is_ok());

        manifest.tools.push(search_tool());
        assert!(manifest.validate().unwrap_err().message.contains("duplicate"));

        manifest.tools.pop();
        manifest.protocol_version = "2.0".into();
        assert_eq!(manifest.validate().unwrap_err().field, "protocolVersion");
    }

    #[test]
    fn manifest_wire_shape() {
        let value = serde_json::to_value(search_tool()).unwrap();
        assert_eq!(value["parameters"]["type"], "object");
        assert_eq!(value["parameters"]["additionalProperties"], false);
        assert_eq!(value["metadata"]["enabledByDefault"], true);
        assert_eq!(value["metadata"]["costEstimate"], "low");
    }
}
