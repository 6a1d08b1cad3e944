//! The standard blueprint library.
//!
//! | id                                 | module         |
//! |------------------------------------|----------------|
//! | `transmogrifier.from`              | [`misc`]       |
//! | `transmogrifier.del`               | [`misc`]       |
//! | `transmogrifier.wrap`              | [`misc`]       |
//! | `transmogrifier.invert`            | [`misc`]       |
//! | `transmogrifier.from_expression`   | [`expression`] |
//! | `transmogrifier.expression`        | [`expression`] |
//! | `transmogrifier.filter`            | [`expression`] |
//! | `transmogrifier.logger`            | [`logger`]     |
//! | `transmogrifier.from_jsonl`        | [`jsonl`]      |
//! | `transmogrifier.to_jsonl`          | [`jsonl`]      |
//! | `transmogrifier.pipeline`          | [`pipeline`]   |
//! | `transmogrifier.pipeline.each`     | [`pipeline`]   |

pub mod expression;
pub mod jsonl;
pub mod logger;
pub mod misc;
pub mod pipeline;

use crate::error::Result;
use crate::registry::BlueprintRegistry;
use crate::section::{Item, ItemStream, blueprint};

/// Register every standard blueprint in `registry`.
pub fn register_defaults(registry: &mut BlueprintRegistry) {
    registry.register("transmogrifier.from", blueprint(misc::item_source));
    registry.register("transmogrifier.del", blueprint(misc::delete_keys));
    registry.register("transmogrifier.wrap", blueprint(misc::wrap));
    registry.register("transmogrifier.invert", blueprint(misc::invert));
    registry.register(
        "transmogrifier.from_expression",
        blueprint(expression::expression_source),
    );
    registry.register(
        "transmogrifier.expression",
        blueprint(expression::expression_transform),
    );
    registry.register("transmogrifier.filter", blueprint(expression::filter));
    registry.register("transmogrifier.logger", blueprint(logger::logger));
    registry.register("transmogrifier.from_jsonl", blueprint(jsonl::source));
    registry.register("transmogrifier.to_jsonl", blueprint(jsonl::sink));
    registry.register("transmogrifier.pipeline", blueprint(pipeline::pipeline));
    registry.register(
        "transmogrifier.pipeline.each",
        blueprint(pipeline::pipeline_each),
    );
}

/// Apply `f` to every `Ok` item, forwarding errors untouched.
pub(crate) fn map_items<F>(previous: ItemStream, mut f: F) -> ItemStream
where
    F: FnMut(Item) -> Result<Item> + 'static,
{
    Box::new(previous.map(move |item| item.and_then(&mut f)))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::rc::Rc;

    use crate::config::{Configuration, OptionMap, SectionMap};
    use crate::executor::Transmogrifier;
    use crate::registry::BlueprintRegistry;
    use crate::section::{Item, ItemStream};

    /// Run context over `(section, [(option, value)])` pairs with the
    /// standard blueprints.
    pub(crate) fn transmogrifier(sections: &[(&str, &[(&str, &str)])]) -> Transmogrifier {
        let sections: SectionMap = sections
            .iter()
            .map(|(name, options)| {
                let options: OptionMap = options
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                (name.to_string(), options)
            })
            .collect();
        Transmogrifier::new(
            "test",
            &Configuration::new(sections),
            Rc::new(BlueprintRegistry::with_defaults()),
        )
    }

    /// Build `section` on top of `upstream` and collect its output.
    pub(crate) fn run_section(tm: &Transmogrifier, section: &str, upstream: ItemStream) -> Vec<Item> {
        tm.construct(&[section.to_string()], Some(upstream))
            .unwrap()
            .map(|item| item.unwrap())
            .collect()
    }

    #[test]
    fn test_defaults_registered() {
        let registry = BlueprintRegistry::with_defaults();
        for id in [
            "transmogrifier.from",
            "transmogrifier.from_expression",
            "transmogrifier.expression",
            "transmogrifier.filter",
            "transmogrifier.del",
            "transmogrifier.wrap",
            "transmogrifier.invert",
            "transmogrifier.logger",
            "transmogrifier.from_jsonl",
            "transmogrifier.to_jsonl",
            "transmogrifier.pipeline",
            "transmogrifier.pipeline.each",
        ] {
            assert!(registry.get(id).is_some(), "{id}");
        }
    }
}
