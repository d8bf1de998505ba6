//! Config templating.
//!
//! Job agent configs and metric provider fields are Handlebars templates
//! rendered against the job or verification context. HTML escaping is off
//! and missing keys render as the empty string.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use handlebars::{handlebars_helper, no_escape, Handlebars};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use ctrlplane_id::JobId;
use ctrlplane_reconcile::ErrorKind;

use crate::model::{Deployment, DeploymentVersion, Environment, Release, Resource};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    /// The template failed to parse or render.
    #[error("template error in {field}: {message}")]
    Render { field: String, message: String },

    /// The context could not be serialized.
    #[error("template context: {0}")]
    Context(String),
}

impl TemplateError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(trim: |s: str| s.trim().to_string());
handlebars_helper!(json: |v: Json| v.to_string());
handlebars_helper!(default: |v: Json, fallback: Json| {
    match v {
        Value::Null => fallback.clone(),
        Value::String(s) if s.is_empty() => fallback.clone(),
        other => other.clone(),
    }
});

fn registry() -> &'static Handlebars<'static> {
    static REGISTRY: OnceLock<Handlebars<'static>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(no_escape);
        hb.register_helper("upper", Box::new(upper));
        hb.register_helper("lower", Box::new(lower));
        hb.register_helper("trim", Box::new(trim));
        hb.register_helper("json", Box::new(json));
        hb.register_helper("default", Box::new(default));
        hb
    })
}

/// Render one template string.
pub fn render_str(template: &str, context: &Value) -> Result<String, TemplateError> {
    if !template.contains("{{") {
        return Ok(template.to_string());
    }
    registry()
        .render_template(template, context)
        .map_err(|e| TemplateError::Render {
            field: "template".to_string(),
            message: e.to_string(),
        })
}

/// Render every string inside `value`, recursively. Keys are left as is.
pub fn render_value(value: &Value, context: &Value) -> Result<Value, TemplateError> {
    render_at(value, context, "")
}

fn render_at(value: &Value, context: &Value, path: &str) -> Result<Value, TemplateError> {
    let field = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };
    match value {
        Value::String(s) => render_str(s, context)
            .map(Value::String)
            .map_err(|e| match e {
                TemplateError::Render { message, .. } => TemplateError::Render {
                    field: if path.is_empty() { "value".to_string() } else { path.to_string() },
                    message,
                },
                other => other,
            }),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| render_at(v, context, &field(&i.to_string())))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), render_at(v, context, &field(k))?)))
            .collect::<Result<serde_json::Map<_, _>, TemplateError>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// The context dispatcher templates render against.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatableJob {
    pub id: JobId,
    pub release: Release,
    pub version: DeploymentVersion,
    pub deployment: Deployment,
    pub environment: Environment,
    pub resource: Resource,
    pub variables: BTreeMap<String, Value>,
}

impl TemplatableJob {
    pub fn to_context(&self) -> Result<Value, TemplateError> {
        serde_json::to_value(self).map_err(|e| TemplateError::Context(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_str_with_helpers() {
        let ctx = json!({"resource": {"name": " Api "}, "env": {"name": "prod"}});
        assert_eq!(
            render_str("{{trim resource.name}}-{{upper env.name}}", &ctx).unwrap(),
            "Api-PROD"
        );
        assert_eq!(render_str("{{default missing \"x\"}}", &ctx).unwrap(), "x");
    }

    #[test]
    fn test_missing_key_is_empty_and_no_escaping() {
        let ctx = json!({"url": "https://a/b?c=1&d=2"});
        assert_eq!(render_str("{{nope}}", &ctx).unwrap(), "");
        assert_eq!(render_str("{{url}}", &ctx).unwrap(), "https://a/b?c=1&d=2");
    }

    #[test]
    fn test_render_value_walks_nested_strings() {
        let ctx = json!({"resource": {"identifier": "cluster-1"}});
        let config = json!({"server": {"url": "https://{{resource.identifier}}"}, "replicas": 3});
        assert_eq!(
            render_value(&config, &ctx).unwrap(),
            json!({"server": {"url": "https://cluster-1"}, "replicas": 3})
        );
    }

    #[test]
    fn test_render_error_names_field() {
        let err = render_value(&json!({"a": ["{{#if}}"]}), &json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Render { ref field, .. } if field == "a.0"));
    }
}
