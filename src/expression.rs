//! Expressions evaluated against items.
//!
//! The evaluator is a collaborator injected into the [`Transmogrifier`];
//! the built-in [`BasicEngine`] understands these prefixes:
//!
//! - `path:item/title` - look up a value (the default without a prefix);
//!   roots are `item`, `options`, `name`, `context` and `nothing`
//! - `exists:item/title` - whether the path resolves
//! - `not:<expression>` - negated truthiness of another expression
//! - `string:Hello ${item/name}` - text with `${path}` interpolation
//! - `json:[{"a": 1}]` - a JSON literal

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, TransmogrifierError};
use crate::executor::Transmogrifier;
use crate::options::Options;
use crate::section::Item;

static PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*([a-z][a-z0-9_\-]*):").expect("valid regex"));
static INTERPOLATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").expect("valid regex"));

const DEFAULT_PREFIX: &str = "path";

/// What an expression can see besides the item.
pub struct Scope<'a> {
    pub transmogrifier: &'a Transmogrifier,
    /// Name of the section evaluating the expression.
    pub name: &'a str,
    pub options: &'a Options,
}

/// Evaluates expression text against an item.
pub trait Evaluate {
    fn evaluate(&self, expression: &str, item: Option<&Item>, scope: &Scope<'_>) -> Result<Value>;
}

/// Split `prefix:body`, defaulting to the path prefix.
fn split_prefix(expression: &str) -> (&str, &str) {
    match PREFIX.captures(expression) {
        Some(caps) => {
            let whole = caps.get(0).map_or(0, |m| m.end());
            let prefix = caps.get(1).map_or(DEFAULT_PREFIX, |m| m.as_str());
            (prefix, &expression[whole..])
        }
        None => (DEFAULT_PREFIX, expression),
    }
}

/// Truthiness of an expression result.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The built-in expression language.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicEngine;

impl BasicEngine {
    fn fail(expression: &str, message: impl Into<String>) -> TransmogrifierError {
        TransmogrifierError::Expression {
            expression: expression.to_string(),
            message: message.into(),
        }
    }

    fn resolve_path(
        &self,
        path: &str,
        item: Option<&Item>,
        scope: &Scope<'_>,
    ) -> Result<Option<Value>> {
        let mut segments = path.trim().split('/').filter(|s| !s.is_empty());
        let Some(root) = segments.next() else {
            return Err(Self::fail(path, "empty path"));
        };

        let mut current = match root {
            "item" => item.cloned(),
            "nothing" => Some(Value::Null),
            "name" => Some(Value::String(scope.name.to_string())),
            "context" => Some(scope.transmogrifier.context().borrow().clone()),
            "options" => {
                let Some(option) = segments.next() else {
                    return Err(Self::fail(path, "options path needs an option name"));
                };
                scope.options.get(option)?.map(Value::String)
            }
            other => return Err(Self::fail(path, format!("unknown path root '{other}'"))),
        };

        for segment in segments {
            current = match current {
                Some(Value::Object(mut map)) => map.remove(segment),
                Some(Value::Array(mut items)) => match segment.parse::<usize>() {
                    Ok(index) if index < items.len() => Some(items.swap_remove(index)),
                    _ => None,
                },
                _ => None,
            };
        }
        Ok(current)
    }

    fn interpolate(&self, text: &str, item: Option<&Item>, scope: &Scope<'_>) -> Result<String> {
        let mut result = String::with_capacity(text.len());
        let mut last = 0;
        for caps in INTERPOLATION.captures_iter(text) {
            let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            result.push_str(&text[last..whole.start()]);
            last = whole.end();
            match self.resolve_path(path.as_str(), item, scope)? {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) => result.push_str(&s),
                Some(other) => result.push_str(&other.to_string()),
            }
        }
        result.push_str(&text[last..]);
        Ok(result)
    }
}

impl Evaluate for BasicEngine {
    fn evaluate(&self, expression: &str, item: Option<&Item>, scope: &Scope<'_>) -> Result<Value> {
        let (prefix, body) = split_prefix(expression);
        match prefix {
            "path" => Ok(self.resolve_path(body, item, scope)?.unwrap_or(Value::Null)),
            "exists" => Ok(Value::Bool(self.resolve_path(body, item, scope)?.is_some())),
            "not" => Ok(Value::Bool(!truthy(&self.evaluate(body, item, scope)?))),
            "string" => Ok(Value::String(self.interpolate(body, item, scope)?)),
            "json" => serde_json::from_str(body.trim()).map_err(|e| Self::fail(expression, e.to_string())),
            other => Err(Self::fail(expression, format!("unknown expression type '{other}'"))),
        }
    }
}

/// An expression bound to the section that evaluates it.
#[derive(Clone)]
pub struct Expression {
    expression: String,
    transmogrifier: Transmogrifier,
    name: String,
    options: Options,
}

impl Expression {
    pub fn new(
        expression: impl Into<String>,
        transmogrifier: &Transmogrifier,
        name: &str,
        options: &Options,
    ) -> Self {
        Self {
            expression: expression.into(),
            transmogrifier: transmogrifier.clone(),
            name: name.to_string(),
            options: options.clone(),
        }
    }

    /// Evaluate against `item` (or without an item, for sources).
    pub fn call(&self, item: Option<&Item>) -> Result<Value> {
        let scope = Scope {
            transmogrifier: &self.transmogrifier,
            name: &self.name,
            options: &self.options,
        };
        let result = self
            .transmogrifier
            .engine()
            .evaluate(&self.expression, item, &scope)?;
        debug!(
            section = self.name.as_str(),
            expression = self.expression.as_str(),
            result = %result,
            "expression returned"
        );
        Ok(result)
    }
}

/// A section's `condition` option; without one every item matches.
#[derive(Clone, Default)]
pub struct Condition {
    expression: Option<Expression>,
}

impl Condition {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn new(expression: Expression) -> Self {
        Self {
            expression: Some(expression),
        }
    }

    /// Read the `condition` option of a section.
    pub fn from_options(transmogrifier: &Transmogrifier, name: &str, options: &Options) -> Result<Self> {
        Ok(match options.get("condition")? {
            Some(text) if !text.trim().is_empty() => {
                Self::new(Expression::new(text, transmogrifier, name, options))
            }
            _ => Self::always(),
        })
    }

    pub fn is_conditional(&self) -> bool {
        self.expression.is_some()
    }

    pub fn matches(&self, item: &Item) -> Result<bool> {
        match &self.expression {
            Some(expression) => Ok(truthy(&expression.call(Some(item))?)),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, SectionMap};
    use crate::registry::BlueprintRegistry;
    use serde_json::json;
    use std::rc::Rc;

    fn transmogrifier() -> Transmogrifier {
        let mut sections = SectionMap::new();
        sections.insert(
            "demo".to_string(),
            [
                ("blueprint".to_string(), "x".to_string()),
                ("greeting".to_string(), "hello".to_string()),
            ]
            .into(),
        );
        Transmogrifier::new(
            "test",
            &Configuration::new(sections),
            Rc::new(BlueprintRegistry::new()),
        )
        .with_context(json!({"site": "example"}))
    }

    fn eval(expression: &str, item: Option<&Item>) -> Result<Value> {
        let tm = transmogrifier();
        let options = tm.options("demo").unwrap();
        Expression::new(expression, &tm, "demo", &options).call(item)
    }

    #[test]
    fn test_split_prefix() {
        assert_eq!(split_prefix("string:abc"), ("string", "abc"));
        assert_eq!(split_prefix("  not:item/x"), ("not", "item/x"));
        assert_eq!(split_prefix("item/x"), ("path", "item/x"));
    }

    #[test]
    fn test_path_expressions() {
        let item = json!({"a": {"b": [10, 20]}, "title": "T"});
        assert_eq!(eval("item/title", Some(&item)).unwrap(), json!("T"));
        assert_eq!(eval("path:item/a/b/1", Some(&item)).unwrap(), json!(20));
        assert_eq!(eval("item/missing", Some(&item)).unwrap(), Value::Null);
        assert_eq!(eval("name", None).unwrap(), json!("demo"));
        assert_eq!(eval("options/greeting", None).unwrap(), json!("hello"));
        assert_eq!(eval("context/site", None).unwrap(), json!("example"));
        assert_eq!(eval("nothing", None).unwrap(), Value::Null);
        assert!(eval("bogus/x", None).is_err());
    }

    #[test]
    fn test_exists_and_not() {
        let item = json!({"a": 0});
        assert_eq!(eval("exists:item/a", Some(&item)).unwrap(), json!(true));
        assert_eq!(eval("exists:item/b", Some(&item)).unwrap(), json!(false));
        assert_eq!(eval("not:item/a", Some(&item)).unwrap(), json!(true));
        assert_eq!(eval("not:exists:item/a", Some(&item)).unwrap(), json!(false));
    }

    #[test]
    fn test_string_and_json() {
        let item = json!({"name": "World", "n": 3});
        assert_eq!(
            eval("string:Hello ${item/name} x${item/n}${item/none}", Some(&item)).unwrap(),
            json!("Hello World x3")
        );
        assert_eq!(eval("json:[{}, {}]", None).unwrap(), json!([{}, {}]));
        assert!(matches!(
            eval("json:[", None),
            Err(TransmogrifierError::Expression { .. })
        ));
        assert!(eval("python:True", None).is_err());
    }

    #[test]
    fn test_truthy() {
        for value in [json!(null), json!(false), json!(0), json!(""), json!([]), json!({})] {
            assert!(!truthy(&value), "{value}");
        }
        for value in [json!(true), json!(1), json!("x"), json!([0]), json!({"a": 1})] {
            assert!(truthy(&value), "{value}");
        }
    }

    #[test]
    fn test_condition() {
        let tm = transmogrifier();
        let options = tm.options("demo").unwrap();
        let always = Condition::from_options(&tm, "demo", &options).unwrap();
        assert!(!always.is_conditional());
        assert!(always.matches(&json!("anything")).unwrap());

        options.set("condition", "item/keep");
        let condition = Condition::from_options(&tm, "demo", &options).unwrap();
        assert!(condition.is_conditional());
        assert!(condition.matches(&json!({"keep": true})).unwrap());
        assert!(!condition.matches(&json!({"keep": false})).unwrap());
    }
}
