//! Nested pipelines.
//!
//! `transmogrifier.pipeline` composes the sections listed in its `pipeline`
//! option onto the upstream. With an empty list it is a plain pass-through,
//! a slot that other configurations can fill through `pipeline +=`. Given a
//! `condition`, only matching items are fed into the nested pipeline and
//! the rest bypass it (see [`BypassRouter`]).
//!
//! `transmogrifier.pipeline.each` hands every matching item to the nested
//! pipeline in place (see [`InlineRouter`]).

use tracing::debug;

use crate::error::Result;
use crate::executor::{Transmogrifier, construct_pipeline};
use crate::expression::Condition;
use crate::options::Options;
use crate::router::{BypassRouter, InlineRouter};
use crate::section::{ItemStream, Section};
use crate::utils::get_lines;

/// Nested section ids, leaving out blanks and the section itself.
fn nested_sections(name: &str, options: &Options) -> Result<Vec<String>> {
    Ok(get_lines(options.get("pipeline")?.as_deref())
        .into_iter()
        .filter(|section| section != name)
        .collect())
}

pub fn pipeline(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let sections = nested_sections(name, &options)?;
    if sections.is_empty() {
        return Ok(Box::new(previous));
    }

    let condition = Condition::from_options(transmogrifier, name, &options)?;
    debug!(
        section = name,
        nested = sections.len(),
        conditional = condition.is_conditional(),
        "building nested pipeline"
    );
    if condition.is_conditional() {
        let router = BypassRouter::new(transmogrifier, &sections, condition, previous)?;
        return Ok(Box::new(router));
    }
    Ok(Box::new(construct_pipeline(transmogrifier, &sections, Some(previous))?))
}

pub fn pipeline_each(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let sections = nested_sections(name, &options)?;
    if sections.is_empty() {
        return Ok(Box::new(previous));
    }
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    Ok(Box::new(InlineRouter::new(
        transmogrifier,
        name,
        sections,
        condition,
        previous,
    )?))
}

#[cfg(test)]
mod tests {
    use crate::blueprints::tests::{run_section, transmogrifier};
    use crate::error::TransmogrifierError;
    use crate::section::{Item, from_items};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_pipeline_is_pass_through() {
        let tm = transmogrifier(&[(
            "slot",
            &[("blueprint", "transmogrifier.pipeline"), ("pipeline", "\n  \nslot")],
        )]);
        let input = vec![json!({"a": 1}), json!(2)];
        assert_eq!(run_section(&tm, "slot", from_items(input.clone())), input);
    }

    #[test]
    fn test_composition() {
        let tm = transmogrifier(&[
            (
                "nested",
                &[("blueprint", "transmogrifier.pipeline"), ("pipeline", "nested\nsource\nmark")],
            ),
            ("source", &[("blueprint", "transmogrifier.from")]),
            ("mark", &[("blueprint", "transmogrifier.expression"), ("marked", "json:true")]),
        ]);
        assert_eq!(
            run_section(&tm, "nested", from_items(vec![json!({"a": 1})])),
            vec![json!({"a": 1, "marked": true}), json!({"marked": true})]
        );
    }

    #[test]
    fn test_conditional_pipeline_bypasses() {
        let tm = transmogrifier(&[
            (
                "nested",
                &[
                    ("blueprint", "transmogrifier.pipeline"),
                    ("pipeline", "drop"),
                    ("condition", "item/odd"),
                ],
            ),
            ("drop", &[("blueprint", "transmogrifier.filter"), ("condition", "not:item/drop")]),
        ]);
        let input: Vec<Item> = vec![
            json!({"n": 1, "odd": true}),
            json!({"n": 2, "odd": false, "drop": true}),
            json!({"n": 3, "odd": true, "drop": true}),
            json!({"n": 4, "odd": false}),
            json!({"n": 5, "odd": true}),
        ];
        let output: Vec<i64> = run_section(&tm, "nested", from_items(input))
            .iter()
            .filter_map(|item| item["n"].as_i64())
            .collect();
        // 3 is dropped inside; 2 bypasses the filter and survives
        assert_eq!(output, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_each_runs_once_per_match() {
        let tm = transmogrifier(&[
            (
                "each",
                &[
                    ("blueprint", "transmogrifier.pipeline.each"),
                    ("pipeline", "wrap"),
                    ("condition", "exists:item/wrap"),
                ],
            ),
            ("wrap", &[("blueprint", "transmogrifier.wrap"), ("key", "wrapped")]),
        ]);
        let input = vec![json!({"wrap": 1}), json!({"n": 2})];
        assert_eq!(
            run_section(&tm, "each", from_items(input)),
            vec![json!({"wrapped": {"wrap": 1}}), json!({"n": 2})]
        );
    }

    #[test]
    fn test_each_keeps_nested_sink_open_across_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hits.jsonl");
        let filename = path.display().to_string();
        let tm = transmogrifier(&[
            (
                "each",
                &[
                    ("blueprint", "transmogrifier.pipeline.each"),
                    ("pipeline", "write"),
                    ("condition", "item/hit"),
                ],
            ),
            ("write", &[("blueprint", "transmogrifier.to_jsonl"), ("filename", filename.as_str())]),
        ]);
        let input = vec![
            json!({"n": 1, "hit": true}),
            json!({"n": 2}),
            json!({"n": 3, "hit": true}),
        ];
        assert_eq!(run_section(&tm, "each", from_items(input.clone())), input);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\"n\":1,\"hit\":true}\n{\"n\":3,\"hit\":true}\n"
        );
    }

    #[test]
    fn test_broken_nested_pipeline_fails_at_construction() {
        let tm = transmogrifier(&[
            ("nested", &[("blueprint", "transmogrifier.pipeline"), ("pipeline", "ghost")]),
            ("each", &[("blueprint", "transmogrifier.pipeline.each"), ("pipeline", "ghost")]),
        ]);
        for section in ["nested", "each"] {
            let result = tm.construct(&[section.to_string()], Some(from_items(vec![])));
            assert!(matches!(result, Err(TransmogrifierError::MissingSection(_))), "{section}");
        }
    }
}
