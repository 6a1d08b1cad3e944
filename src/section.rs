//! Items, item streams and the section capability.
//!
//! A section is one pipeline stage: it receives the stream produced by the
//! previous section and hands back its own lazy, single-pass stream. It may
//! forward, drop, change or multiply upstream items, and may yield items of
//! its own once upstream is exhausted.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::executor::Transmogrifier;
use crate::options::Options;

/// One record flowing through a pipeline.
///
/// Usually an object; sections that don't care about shape pass anything
/// else through untouched.
pub type Item = Value;

/// A lazy, single-pass stream of items. An `Err` ends the run.
pub type ItemStream = Box<dyn Iterator<Item = Result<Item>>>;

/// What a blueprint builds.
pub trait Section {
    /// Hand over the section's output stream.
    ///
    /// Returns `None` when the value cannot produce a stream; the pipeline
    /// builder rejects it before any item is pulled.
    fn into_stream(self: Box<Self>) -> Option<ItemStream>;
}

impl<I> Section for I
where
    I: Iterator<Item = Result<Item>> + 'static,
{
    fn into_stream(self: Box<Self>) -> Option<ItemStream> {
        Some(self)
    }
}

/// Factory for sections: `(transmogrifier, section name, options, previous)`.
pub type Blueprint = Rc<dyn Fn(&Transmogrifier, &str, Options, ItemStream) -> Result<Box<dyn Section>>>;

/// Wrap a blueprint function for registration.
pub fn blueprint<F>(factory: F) -> Blueprint
where
    F: Fn(&Transmogrifier, &str, Options, ItemStream) -> Result<Box<dyn Section>> + 'static,
{
    Rc::new(factory)
}

/// The stream a pipeline starts from when no upstream is given.
pub fn empty() -> ItemStream {
    Box::new(std::iter::empty())
}

/// A stream over already materialized items.
pub fn from_items(items: Vec<Item>) -> ItemStream {
    Box::new(items.into_iter().map(Ok))
}

/// A fresh, empty object item.
pub fn new_item() -> Item {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_iterators_are_sections() {
        let section: Box<dyn Section> = Box::new(from_items(vec![json!({"x": 1})]));
        let stream = section.into_stream().unwrap();
        let items: Vec<Item> = stream.map(|r| r.unwrap()).collect();
        assert_eq!(items, vec![json!({"x": 1})]);
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(empty().count(), 0);
        assert_eq!(new_item(), json!({}));
    }
}
