//! `transmogrifier.logger`: log items passing through.
//!
//! Options:
//!
//! - `level`: `TRACE`, `DEBUG`, `INFO` (default), `WARN`/`WARNING` or
//!   `ERROR`/`CRITICAL`, or a number on the 10 (debug) to 50 (critical)
//!   scale, mapped to the level at or below it
//! - `key`: log only this key of the item (`-- Missing key --` if absent)
//! - `delete`: keys (or `re:` patterns), one per line, left out when
//!   logging whole items; defaults to the section's private keys
//!   (`_<blueprint>_<section>`, `_<blueprint>`, `_<section>`)
//! - `name`: logger name, defaults to `<configuration id>.<section>`
//! - `condition`: only log matching items
//!
//! Items are always passed on unchanged.

use serde_json::{Map, Value};
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::{Result, TransmogrifierError};
use crate::executor::Transmogrifier;
use crate::expression::Condition;
use crate::options::Options;
use crate::section::{Item, ItemStream, Section};
use crate::utils::{Matcher, default_matcher};

const MISSING_KEY: &str = "-- Missing key --";

/// Numeric levels: 0 is unset, below 10 is trace.
fn numeric_level(level: u32) -> Level {
    match level {
        0 => Level::INFO,
        1..=9 => Level::TRACE,
        10..=19 => Level::DEBUG,
        20..=29 => Level::INFO,
        30..=39 => Level::WARN,
        _ => Level::ERROR,
    }
}

fn parse_level(section: &str, text: &str) -> Result<Level> {
    if let Ok(level) = text.trim().parse::<u32>() {
        return Ok(numeric_level(level));
    }
    match text.trim().to_uppercase().as_str() {
        "" | "NOTSET" => Ok(Level::INFO),
        "WARNING" => Ok(Level::WARN),
        "CRITICAL" | "FATAL" => Ok(Level::ERROR),
        other => other
            .parse::<Level>()
            .map_err(|_| TransmogrifierError::section(section, format!("unknown log level '{text}'"))),
    }
}

fn emit(level: Level, logger: &str, message: &str) {
    // Event levels must be constants.
    if level == Level::TRACE {
        trace!(logger = logger, "{message}");
    } else if level == Level::DEBUG {
        debug!(logger = logger, "{message}");
    } else if level == Level::INFO {
        info!(logger = logger, "{message}");
    } else if level == Level::WARN {
        warn!(logger = logger, "{message}");
    } else {
        error!(logger = logger, "{message}");
    }
}

/// The text logged for `item`.
fn format_item(item: &Item, key: Option<&str>, delete: &Matcher) -> Result<String> {
    let value = match key {
        Some(key) => match item.get(key) {
            Some(Value::String(text)) => return Ok(text.clone()),
            Some(value) => value.clone(),
            None => return Ok(MISSING_KEY.to_string()),
        },
        None => match item {
            Value::Object(map) if !delete.is_empty() => Value::Object(
                map.iter()
                    .filter(|(k, _)| !delete.is_match(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Map<_, _>>(),
            ),
            other => other.clone(),
        },
    };
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn logger(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    let key = options.get("key")?;
    let delete = default_matcher(&options, "delete", None, &[])?;
    let logger_name = match options.get("name")? {
        Some(logger_name) => logger_name,
        None => format!("{}.{}", transmogrifier.configuration_id(), name),
    };
    let level = parse_level(name, &options.get_or("level", "INFO")?)?;

    Ok(Box::new(previous.map(move |item| {
        let item = item?;
        if condition.matches(&item)? {
            let message = format_item(&item, key.as_deref(), &delete)?;
            emit(level, &logger_name, &message);
        }
        Ok(item)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints::tests::{run_section, transmogrifier};
    use crate::section::from_items;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Collects formatted log output.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture<F: FnOnce()>(f: F) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        captured.text()
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("s", "debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("s", "WARNING").unwrap(), Level::WARN);
        assert_eq!(parse_level("s", "CRITICAL").unwrap(), Level::ERROR);
        assert_eq!(parse_level("s", "NOTSET").unwrap(), Level::INFO);
        assert!(matches!(parse_level("s", "LOUD"), Err(TransmogrifierError::Section { .. })));
    }

    #[test]
    fn test_parse_numeric_level() {
        assert_eq!(parse_level("s", "0").unwrap(), Level::INFO);
        assert_eq!(parse_level("s", "5").unwrap(), Level::TRACE);
        assert_eq!(parse_level("s", "10").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("s", " 20 ").unwrap(), Level::INFO);
        assert_eq!(parse_level("s", "25").unwrap(), Level::INFO);
        assert_eq!(parse_level("s", "30").unwrap(), Level::WARN);
        assert_eq!(parse_level("s", "40").unwrap(), Level::ERROR);
        assert_eq!(parse_level("s", "50").unwrap(), Level::ERROR);
        assert!(parse_level("s", "-10").is_err());
    }

    #[test]
    fn test_format_item() {
        let delete = Matcher::new(["secret", "re:_.*"]).unwrap();
        let item = json!({"title": "Hi", "secret": "x", "_hidden": 1, "n": 2});
        let text = format_item(&item, None, &delete).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json!({"title": "Hi", "n": 2}));
        assert_eq!(format_item(&item, Some("title"), &delete).unwrap(), "Hi");
        assert_eq!(format_item(&item, Some("n"), &delete).unwrap(), "2");
        assert_eq!(format_item(&item, Some("nope"), &delete).unwrap(), MISSING_KEY);
    }

    #[test]
    fn test_format_item_without_delete_keeps_everything() {
        let item = json!({"_hidden": 1, "n": 2});
        let text = format_item(&item, None, &Matcher::default()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), item);
    }

    #[test]
    fn test_logger_delete_defaults_to_private_keys() {
        let tm = transmogrifier(&[
            ("log", &[("blueprint", "transmogrifier.logger")]),
            ("picky", &[("blueprint", "transmogrifier.logger"), ("delete", "title")]),
        ]);
        let input = vec![json!({"title": "shown", "_log": "private-value", "_other": "other-value"})];
        let logged = capture(|| {
            run_section(&tm, "log", from_items(input.clone()));
        });
        assert!(logged.contains("shown"), "{logged}");
        assert!(logged.contains("other-value"), "{logged}");
        assert!(!logged.contains("private-value"), "{logged}");

        let logged = capture(|| {
            run_section(&tm, "picky", from_items(input.clone()));
        });
        assert!(!logged.contains("shown"), "{logged}");
        assert!(logged.contains("private-value"), "{logged}");
    }

    #[test]
    fn test_logger_logs_and_passes_items() {
        let tm = transmogrifier(&[(
            "log",
            &[
                ("blueprint", "transmogrifier.logger"),
                ("key", "title"),
                ("level", "WARNING"),
                ("condition", "exists:item/title"),
            ],
        )]);
        let input = vec![json!({"title": "first"}), json!({"other": 1})];
        let mut output = Vec::new();
        let logged = capture(|| output = run_section(&tm, "log", from_items(input.clone())));
        assert_eq!(output, input);
        assert!(logged.contains("WARN"), "{logged}");
        assert!(logged.contains("first"), "{logged}");
        assert!(logged.contains("test.log"), "{logged}");
        assert!(!logged.contains(MISSING_KEY), "{logged}");
    }
}
