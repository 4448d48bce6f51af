//! Tool capability: a named synchronous callable taking keyword arguments.

use anyhow::{Context, Result, anyhow};
use minijinja::Environment;
use serde_json::{Map, Value};

pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn execute(&self, kwargs: &Map<String, Value>) -> Result<Value>;
}

/// Returns its keyword arguments unchanged.
#[derive(Debug, Clone)]
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Returns its arguments unchanged."
    }

    fn execute(&self, kwargs: &Map<String, Value>) -> Result<Value> {
        Ok(Value::Object(kwargs.clone()))
    }
}

/// Renders a configured minijinja template with the keyword arguments as context.
#[derive(Debug, Clone)]
pub struct TemplateTool {
    name: String,
    template: String,
}

impl TemplateTool {
    pub fn from_config(name: &str, config: &Map<String, Value>) -> Result<Self> {
        let template = config
            .get("template")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("'template' must be a string"))?;
        // Fail at load time rather than on first use.
        Environment::new()
            .template_from_str(template)
            .context("compile template")?;
        Ok(Self {
            name: name.to_string(),
            template: template.to_string(),
        })
    }
}

impl Tool for TemplateTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Renders a text template with the given arguments."
    }

    fn execute(&self, kwargs: &Map<String, Value>) -> Result<Value> {
        let rendered = Environment::new()
            .render_str(&self.template, kwargs)
            .with_context(|| format!("render template for tool '{}'", self.name))?;
        Ok(Value::String(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn echo_returns_kwargs() {
        let tool = EchoTool::new("echo");
        let kwargs = map(json!({"city": "Oslo", "days": 3}));
        assert_eq!(tool.execute(&kwargs).expect("run"), json!({"city": "Oslo", "days": 3}));
    }

    #[test]
    fn template_renders_arguments() {
        let tool = TemplateTool::from_config(
            "greet",
            &map(json!({"template": "Hello {{ name }}, you have {{ items | length }} items"})),
        )
        .expect("tool");
        let out = tool
            .execute(&map(json!({"name": "Ada", "items": [1, 2]})))
            .expect("render");
        assert_eq!(out, json!("Hello Ada, you have 2 items"));
    }

    #[test]
    fn template_rejects_invalid_syntax_at_load() {
        let err = TemplateTool::from_config("bad", &map(json!({"template": "{{ unclosed"})))
            .unwrap_err();
        assert!(err.to_string().contains("compile template"));
    }
}
