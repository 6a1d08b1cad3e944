//! Small item sources and reshaping transforms.

use serde_json::{Map, Value};
use tracing::warn;

use crate::error::Result;
use crate::executor::Transmogrifier;
use crate::expression::Condition;
use crate::options::Options;
use crate::section::{ItemStream, Section, new_item};
use crate::utils::get_words;

use super::map_items;

/// `transmogrifier.from`: upstream items, then `amount` empty items.
pub fn item_source(
    _transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let amount = match options.get("amount")? {
        None => 1,
        Some(text) if text.trim().is_empty() => 1,
        Some(text) => text.trim().parse::<usize>().unwrap_or_else(|_| {
            warn!(section = name, amount = text.as_str(), "unparsable amount, using 1");
            1
        }),
    };
    Ok(Box::new(
        previous.chain(std::iter::repeat_with(|| Ok(new_item())).take(amount)),
    ))
}

/// `transmogrifier.del`: remove `keys` from matching items.
pub fn delete_keys(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    let keys = get_words(options.get("keys")?.as_deref());
    Ok(Box::new(map_items(previous, move |mut item| {
        if condition.matches(&item)?
            && let Some(map) = item.as_object_mut()
        {
            for key in &keys {
                map.shift_remove(key);
            }
        }
        Ok(item)
    })))
}

/// `transmogrifier.wrap`: replace matching items with `{key: item}`.
pub fn wrap(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    let key = options.get("key")?;
    Ok(Box::new(map_items(previous, move |item| {
        let Some(key) = &key else {
            return Ok(item);
        };
        if !condition.matches(&item)? {
            return Ok(item);
        }
        let mut wrapped = Map::new();
        wrapped.insert(key.clone(), item);
        Ok(Value::Object(wrapped))
    })))
}

/// `transmogrifier.invert`: lift the object at `key` and merge the rest of
/// the item into it.
pub fn invert(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    let key = options.get("key")?.unwrap_or_default();
    Ok(Box::new(map_items(previous, move |mut item| {
        let nested_is_object = item.get(&key).is_some_and(Value::is_object);
        if !nested_is_object || !condition.matches(&item)? {
            return Ok(item);
        }
        let Some(map) = item.as_object_mut() else {
            return Ok(item);
        };
        let Some(Value::Object(mut inverted)) = map.shift_remove(&key) else {
            return Ok(item);
        };
        for (k, v) in std::mem::take(map) {
            inverted.insert(k, v);
        }
        Ok(Value::Object(inverted))
    })))
}
