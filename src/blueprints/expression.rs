//! Blueprints driven by expressions.

use serde_json::Value;

use crate::error::Result;
use crate::executor::Transmogrifier;
use crate::expression::{Condition, Expression};
use crate::options::Options;
use crate::section::{ItemStream, Section, new_item};

use super::map_items;

const DEFAULT_SOURCE: &str = "json:[{}]";

/// `transmogrifier.from_expression`: upstream items, then the elements of
/// the list `expression` evaluates to.
pub fn expression_source(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let text = match options.get("expression")? {
        Some(text) if !text.trim().is_empty() => text,
        _ => DEFAULT_SOURCE.to_string(),
    };
    let expression = Expression::new(text, transmogrifier, name, &options);

    // Evaluated only once upstream is exhausted.
    let produced = std::iter::once(()).flat_map(move |_| -> Vec<Result<Value>> {
        match expression.call(None) {
            Ok(Value::Array(items)) => items.into_iter().map(Ok).collect(),
            Ok(Value::Null) => Vec::new(),
            Ok(item) => vec![Ok(item)],
            Err(e) => vec![Err(e)],
        }
    });
    Ok(Box::new(previous.chain(produced)))
}

/// `transmogrifier.expression`: set every non-reserved option to the
/// value of its expression on matching items.
pub fn expression_transform(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    let mut expressions = Vec::new();
    for (option, value) in options.items()? {
        if option == "blueprint" || option == "condition" || option.starts_with('_') {
            continue;
        }
        let value = if value.trim().is_empty() { "json:true".to_string() } else { value };
        expressions.push((option, Expression::new(value, transmogrifier, name, &options)));
    }

    Ok(Box::new(map_items(previous, move |item| {
        let mut transformed = if item.is_object() { item.clone() } else { new_item() };
        if condition.matches(&item)? {
            let mut values = Vec::with_capacity(expressions.len());
            for (option, expression) in &expressions {
                values.push((option.clone(), expression.call(Some(&item))?));
            }
            if let Some(map) = transformed.as_object_mut() {
                map.extend(values);
            }
        }
        Ok(transformed)
    })))
}

/// `transmogrifier.filter`: only items matching `condition` get through.
pub fn filter(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    Ok(Box::new(previous.filter_map(move |item| match item {
        Ok(item) => match condition.matches(&item) {
            Ok(true) => Some(Ok(item)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        },
        Err(e) => Some(Err(e)),
    })))
}
