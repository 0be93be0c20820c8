// ABOUTME: Validator capability with schema, custom-predicate, and composite implementations
// ABOUTME: ValidationHook rejects contexts whose input fails the configured validator

use crate::context::HookContext;
use crate::result::{ErrorInfo, HookResult};
use crate::traits::Hook;
use crate::types::HookMetadata;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Issue severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One problem found during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dot path into the validated value, empty at the root.
    pub path: String,
    pub message: String,
    pub code: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn error(path: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(
        path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
            severity: Severity::Warning,
        }
    }
}

/// Validation outcome: `valid` iff no error-severity issues were recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            Severity::Error => {
                self.valid = false;
                self.errors.push(issue);
            }
            Severity::Warning => self.warnings.push(issue),
        }
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Short human-readable digest of the first few errors.
    pub fn summary(&self) -> String {
        if self.valid {
            return "valid".to_string();
        }
        self.errors
            .iter()
            .take(3)
            .map(|issue| {
                if issue.path.is_empty() {
                    issue.message.clone()
                } else {
                    format!("{}: {}", issue.path, issue.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Structural validation capability.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &JsonValue) -> ValidationResult;

    fn name(&self) -> &str {
        "validator"
    }
}

/// Validator over a documented JSON-schema subset: `type`, `required`,
/// `properties`, `items`, `minLength`/`maxLength`, `minimum`/`maximum`,
/// and `enum`.
pub struct SchemaValidator {
    schema: JsonValue,
}

impl SchemaValidator {
    pub fn new(schema: JsonValue) -> Self {
        Self { schema }
    }

    fn check(schema: &JsonValue, value: &JsonValue, path: &str, result: &mut ValidationResult) {
        if let Some(expected) = schema.get("type").and_then(JsonValue::as_str) {
            if !type_matches(expected, value) {
                result.push(ValidationIssue::error(
                    path,
                    format!("expected type '{}', got '{}'", expected, type_name(value)),
                    "type_mismatch",
                ));
                return;
            }
        }

        if let Some(allowed) = schema.get("enum").and_then(JsonValue::as_array) {
            if !allowed.contains(value) {
                result.push(ValidationIssue::error(
                    path,
                    "value not in enum".to_string(),
                    "enum_mismatch",
                ));
            }
        }

        match value {
            JsonValue::Object(map) => {
                if let Some(required) = schema.get("required").and_then(JsonValue::as_array) {
                    for field in required.iter().filter_map(JsonValue::as_str) {
                        if !map.contains_key(field) {
                            result.push(ValidationIssue::error(
                                join_path(path, field),
                                format!("required field '{}' is missing", field),
                                "required_field_missing",
                            ));
                        }
                    }
                }
                if let Some(properties) = schema.get("properties").and_then(JsonValue::as_object) {
                    for (field, field_schema) in properties {
                        if let Some(field_value) = map.get(field) {
                            Self::check(field_schema, field_value, &join_path(path, field), result);
                        }
                    }
                }
            }
            JsonValue::Array(items) => {
                if let Some(item_schema) = schema.get("items") {
                    for (index, item) in items.iter().enumerate() {
                        Self::check(item_schema, item, &join_path(path, &index.to_string()), result);
                    }
                }
            }
            JsonValue::String(s) => {
                if let Some(min) = schema.get("minLength").and_then(JsonValue::as_u64) {
                    if (s.len() as u64) < min {
                        result.push(ValidationIssue::error(
                            path,
                            format!("string shorter than minLength {}", min),
                            "min_length",
                        ));
                    }
                }
                if let Some(max) = schema.get("maxLength").and_then(JsonValue::as_u64) {
                    if (s.len() as u64) > max {
                        result.push(ValidationIssue::error(
                            path,
                            format!("string longer than maxLength {}", max),
                            "max_length",
                        ));
                    }
                }
            }
            JsonValue::Number(_) => {
                let number = value.as_f64().unwrap_or(0.0);
                if let Some(min) = schema.get("minimum").and_then(JsonValue::as_f64) {
                    if number < min {
                        result.push(ValidationIssue::error(
                            path,
                            format!("value below minimum {}", min),
                            "minimum",
                        ));
                    }
                }
                if let Some(max) = schema.get("maximum").and_then(JsonValue::as_f64) {
                    if number > max {
                        result.push(ValidationIssue::error(
                            path,
                            format!("value above maximum {}", max),
                            "maximum",
                        ));
                    }
                }
            }
            _ => {}
        }
    }
}

impl Validator for SchemaValidator {
    fn validate(&self, value: &JsonValue) -> ValidationResult {
        let mut result = ValidationResult::ok();
        Self::check(&self.schema, value, "", &mut result);
        result
    }

    fn name(&self) -> &str {
        "schema"
    }
}

fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", base, segment)
    }
}

fn type_matches(expected: &str, value: &JsonValue) -> bool {
    match expected {
        "null" => value.is_null(),
        "boolean" => value.is_boolean(),
        "integer" => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        "number" => value.is_number(),
        "string" => value.is_string(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => false,
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Validator wrapping an arbitrary predicate.
pub struct CustomValidator {
    label: String,
    code: String,
    message: String,
    predicate: Arc<dyn Fn(&JsonValue) -> bool + Send + Sync>,
}

impl CustomValidator {
    pub fn new(
        label: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        predicate: impl Fn(&JsonValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            code: code.into(),
            message: message.into(),
            predicate: Arc::new(predicate),
        }
    }
}

impl Validator for CustomValidator {
    fn validate(&self, value: &JsonValue) -> ValidationResult {
        let mut result = ValidationResult::ok();
        if !(self.predicate)(value) {
            result.push(ValidationIssue::error("", self.message.clone(), self.code.clone()));
        }
        result
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// How a composite combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    /// Every child must pass.
    All,
    /// At least one child must pass.
    Any,
    /// Exactly one child must pass.
    OneOf,
}

/// Applies child validators under [`CompositeMode`] semantics.
pub struct CompositeValidator {
    mode: CompositeMode,
    children: Vec<Arc<dyn Validator>>,
}

impl CompositeValidator {
    pub fn new(mode: CompositeMode, children: Vec<Arc<dyn Validator>>) -> Self {
        Self { mode, children }
    }
}

impl Validator for CompositeValidator {
    fn validate(&self, value: &JsonValue) -> ValidationResult {
        let reports: Vec<ValidationResult> =
            self.children.iter().map(|v| v.validate(value)).collect();
        let passing = reports.iter().filter(|r| r.valid).count();

        match self.mode {
            CompositeMode::All => {
                let mut merged = ValidationResult::ok();
                for report in reports {
                    merged.merge(report);
                }
                merged
            }
            CompositeMode::Any => {
                if passing > 0 {
                    ValidationResult::ok()
                } else {
                    let mut merged = ValidationResult::ok();
                    for report in reports {
                        merged.merge(report);
                    }
                    merged
                }
            }
            CompositeMode::OneOf => {
                if passing == 1 {
                    ValidationResult::ok()
                } else {
                    let mut merged = ValidationResult::ok();
                    merged.push(ValidationIssue::error(
                        "",
                        format!("expected exactly one passing validator, got {}", passing),
                        "one_of_mismatch",
                    ));
                    merged
                }
            }
        }
    }

    fn name(&self) -> &str {
        "composite"
    }
}

/// Hook running a validator against `context.input_data`.
///
/// Invalid input (or any warning when `fail_on_warning` is set) yields a
/// non-continue result with error kind `ValidationError`.
pub struct ValidationHook {
    input_validator: Arc<dyn Validator>,
    fail_on_warning: bool,
    metadata: HookMetadata,
}

impl ValidationHook {
    pub fn new(input_validator: Arc<dyn Validator>) -> Self {
        Self {
            input_validator,
            fail_on_warning: false,
            metadata: HookMetadata {
                name: "validation".to_string(),
                description: Some("Structural input validation".to_string()),
                tags: vec!["builtin".to_string(), "validation".to_string()],
                ..HookMetadata::new("validation_hook")
            },
        }
    }

    pub fn with_fail_on_warning(mut self, fail_on_warning: bool) -> Self {
        self.fail_on_warning = fail_on_warning;
        self
    }
}

#[async_trait]
impl Hook for ValidationHook {
    async fn execute(&self, context: &mut HookContext) -> Result<HookResult> {
        let report = self.input_validator.validate(&context.input_data);
        let failed = !report.valid || (self.fail_on_warning && !report.warnings.is_empty());

        if !failed {
            return Ok(HookResult::ok());
        }

        context.insert_metadata(
            "validation.issues",
            serde_json::to_value(&report.errors).unwrap_or_default(),
        );
        Ok(HookResult::from_error(ErrorInfo::new(
            report.summary(),
            "ValidationError",
        )))
    }

    fn metadata(&self) -> HookMetadata {
        self.metadata.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HookPoint;
    use serde_json::json;

    fn person_schema() -> JsonValue {
        json!({
            "type": "object",
            "required": ["name", "age"],
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "age": {"type": "integer", "minimum": 0, "maximum": 150}
            }
        })
    }

    #[test]
    fn test_missing_required_field() {
        let validator = SchemaValidator::new(person_schema());
        let report = validator.validate(&json!({"name": "John"}));

        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].path, "age");
        assert_eq!(report.errors[0].code, "required_field_missing");
    }

    #[test]
    fn test_valid_document() {
        let validator = SchemaValidator::new(person_schema());
        let report = validator.validate(&json!({"name": "John", "age": 40}));
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_range_and_length_checks() {
        let validator = SchemaValidator::new(person_schema());

        let report = validator.validate(&json!({"name": "", "age": 200}));
        assert!(!report.valid);
        let codes: Vec<&str> = report.errors.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"min_length"));
        assert!(codes.contains(&"maximum"));
    }

    #[test]
    fn test_type_mismatch_and_nested_paths() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });
        let validator = SchemaValidator::new(schema);
        let report = validator.validate(&json!({"tags": ["ok", 5]}));

        assert!(!report.valid);
        assert_eq!(report.errors[0].path, "tags.1");
        assert_eq!(report.errors[0].code, "type_mismatch");
    }

    #[test]
    fn test_integer_accepts_whole_floats_only() {
        let schema = json!({"type": "integer"});
        let validator = SchemaValidator::new(schema);
        assert!(validator.validate(&json!(3)).valid);
        assert!(validator.validate(&json!(3.0)).valid);
        assert!(!validator.validate(&json!(3.5)).valid);
    }

    #[test]
    fn test_enum_membership() {
        let schema = json!({"enum": ["red", "green", "blue"]});
        let validator = SchemaValidator::new(schema);
        assert!(validator.validate(&json!("green")).valid);
        assert!(!validator.validate(&json!("yellow")).valid);
    }

    #[test]
    fn test_custom_validator() {
        let validator = CustomValidator::new(
            "non_empty",
            "empty_payload",
            "payload must not be empty",
            |value| !value.is_null(),
        );
        assert!(validator.validate(&json!(1)).valid);

        let report = validator.validate(&json!(null));
        assert!(!report.valid);
        assert_eq!(report.errors[0].code, "empty_payload");
    }

    #[test]
    fn test_composite_modes() {
        let is_string: Arc<dyn Validator> =
            Arc::new(SchemaValidator::new(json!({"type": "string"})));
        let is_number: Arc<dyn Validator> =
            Arc::new(SchemaValidator::new(json!({"type": "number"})));

        let all = CompositeValidator::new(CompositeMode::All, vec![is_string.clone(), is_number.clone()]);
        assert!(!all.validate(&json!("x")).valid);

        let any = CompositeValidator::new(CompositeMode::Any, vec![is_string.clone(), is_number.clone()]);
        assert!(any.validate(&json!("x")).valid);
        assert!(!any.validate(&json!(true)).valid);

        let one_of =
            CompositeValidator::new(CompositeMode::OneOf, vec![is_string, is_number]);
        assert!(one_of.validate(&json!("x")).valid);
        assert!(!one_of.validate(&json!(true)).valid);
    }

    #[tokio::test]
    async fn test_validation_hook_blocks_invalid_input() {
        let hook = ValidationHook::new(Arc::new(SchemaValidator::new(person_schema())));
        let mut context =
            HookContext::new(HookPoint::AgentBeforeRun).with_input(json!({"name": "John"}));

        let result = hook.execute(&mut context).await.unwrap();
        assert!(!result.should_continue());
        assert_eq!(result.error_info.unwrap().error_type, "ValidationError");
        assert!(context.get_metadata("validation.issues").is_some());
    }

    #[tokio::test]
    async fn test_validation_hook_passes_valid_input() {
        let hook = ValidationHook::new(Arc::new(SchemaValidator::new(person_schema())));
        let mut context = HookContext::new(HookPoint::AgentBeforeRun)
            .with_input(json!({"name": "John", "age": 30}));

        let result = hook.execute(&mut context).await.unwrap();
        assert!(result.should_continue());
    }
}
