//! Template rendering
//!
//! Wraps Tera. Templates are read from the configured directory (every
//! `*.html` below it, named by relative path); a built-in `index.html` is
//! provided when the directory does not define one.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::error::Error as _;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera, Value};
use thiserror::Error;

/// Template errors
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const BUILTIN_INDEX: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{{ title }}</title></head>
<body>
<h1>{{ title }}</h1>
<ul class="rank">
{% for item in items %}  <li><span class="{{ loop.index | index_filter }}">{{ loop.index }}</span>{{ item }}</li>
{% endfor %}</ul>
</body>
</html>
"#;

/// Tera wrapper with the blog's custom filters registered
pub struct TemplateEngine {
    tera: Tera,
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("templates", &self.tera.get_template_names().count())
            .finish()
    }
}

impl TemplateEngine {
    /// Load all templates below `templates_dir` (a missing directory is fine)
    pub fn new(templates_dir: &Path) -> Result<Self, TemplateError> {
        let mut templates = Vec::new();
        collect_templates(templates_dir, templates_dir, &mut templates)?;

        if !templates.iter().any(|(name, _)| name == "index.html") {
            templates.push(("index.html".to_string(), BUILTIN_INDEX.to_string()));
        }

        let mut tera = Tera::default();
        tera.register_filter("index_filter", index_filter);
        tera.add_raw_templates(templates)
            .map_err(|e| TemplateError::Render(describe(&e)))?;

        tracing::debug!(
            "Loaded {} templates from {:?}",
            tera.get_template_names().count(),
            templates_dir
        );
        Ok(Self { tera })
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, TemplateError> {
        self.tera
            .render(template, context)
            .map_err(|e| TemplateError::Render(describe(&e)))
    }
}

/// Flatten a Tera error and its causes into one message
fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

fn collect_templates(
    base: &Path,
    current: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<(), TemplateError> {
    if !current.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(current)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_templates(base, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");
            templates.push((name, fs::read_to_string(&path)?));
        }
    }
    Ok(())
}

/// Ranking label for the first three positions of a list
///
/// `1` → `first`, `2` → `second`, `3` → `third`, anything else → empty.
pub fn index_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let label = match value.as_i64() {
        Some(1) => "first",
        Some(2) => "second",
        Some(3) => "third",
        _ => "",
    };
    Ok(Value::String(label.to_string()))
}
