//! Tests for the template engine

use super::*;
use tempfile::TempDir;

fn builtin_engine() -> (TempDir, TemplateEngine) {
    let dir = TempDir::new().unwrap();
    let engine = TemplateEngine::new(dir.path()).unwrap();
    (dir, engine)
}

fn filter(value: Value) -> String {
    match index_filter(&value, &HashMap::new()).unwrap() {
        Value::String(s) => s,
        other => panic!("unexpected filter output: {other:?}"),
    }
}

#[test]
fn test_index_filter_labels() {
    assert_eq!(filter(Value::from(1)), "first");
    assert_eq!(filter(Value::from(2)), "second");
    assert_eq!(filter(Value::from(3)), "third");
}

#[test]
fn test_index_filter_other_values_are_empty() {
    assert_eq!(filter(Value::from(0)), "");
    assert_eq!(filter(Value::from(4)), "");
    assert_eq!(filter(Value::from(-1)), "");
    assert_eq!(filter(Value::from("1")), "");
    assert_eq!(filter(Value::Null), "");
}

#[test]
fn test_builtin_index_uses_filter() {
    let (_dir, engine) = builtin_engine();
    let mut context = TeraContext::new();
    context.insert("title", "Blog");
    context.insert("items", &["a", "b", "c", "d"]);

    let html = engine.render("index.html", &context).unwrap();
    assert!(html.contains("<title>Blog</title>"));
    assert!(html.contains(r#"class="first""#));
    assert!(html.contains(r#"class="second""#));
    assert!(html.contains(r#"class="third""#));
    assert!(html.contains(r#"class="""#));
}

#[test]
fn test_missing_directory_uses_builtin() {
    let dir = TempDir::new().unwrap();
    let engine = TemplateEngine::new(&dir.path().join("missing")).unwrap();
    assert!(engine.has_template("index.html"));
}

#[test]
fn test_directory_templates_override_builtin() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("news")).unwrap();
    fs::write(
        dir.path().join("base.html"),
        "<main>{% block content %}{% endblock %}</main>",
    )
    .unwrap();
    fs::write(
        dir.path().join("index.html"),
        r#"{% extends "base.html" %}{% block content %}{{ 2 | index_filter }}{% endblock %}"#,
    )
    .unwrap();
    fs::write(dir.path().join("news/detail.html"), "{{ title }}").unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let engine = TemplateEngine::new(dir.path()).unwrap();

    assert!(engine.has_template("news/detail.html"));
    assert!(!engine.has_template("notes.txt"));
    let html = engine.render("index.html", &TeraContext::new()).unwrap();
    assert_eq!(html, "<main>second</main>");
}

#[test]
fn test_render_unknown_template() {
    let (_dir, engine) = builtin_engine();
    let err = engine.render("nope.html", &TeraContext::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Render(_)));
}
