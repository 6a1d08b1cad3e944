//! Newline delimited JSON source and sink.
//!
//! `filename` names the file (`-` for stdin/stdout); relative paths are
//! taken from the working directory. Files are opened when the first item
//! is pulled, not when the pipeline is built.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{Result, TransmogrifierError};
use crate::executor::Transmogrifier;
use crate::expression::Condition;
use crate::options::Options;
use crate::section::{Item, ItemStream, Section};
use crate::utils::get_words;

const STDIO: &str = "-";

fn filename(options: &Options, default: &str) -> Result<String> {
    let filename = options.get_or("filename", default)?;
    let filename = filename.trim();
    Ok(if filename.is_empty() { default } else { filename }.to_string())
}

/// Reads one JSON value per non-blank line.
struct JsonlReader {
    path: PathBuf,
    lines: Option<Lines<Box<dyn BufRead>>>,
    line: usize,
    failed: bool,
}

impl JsonlReader {
    fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            lines: None,
            line: 0,
            failed: false,
        }
    }

    fn open(&mut self) -> Result<()> {
        let reader: Box<dyn BufRead> = if self.path.as_os_str() == STDIO {
            Box::new(BufReader::new(io::stdin()))
        } else {
            let file = File::open(&self.path).map_err(|e| TransmogrifierError::io(&self.path, e))?;
            Box::new(BufReader::new(file))
        };
        debug!(path = %self.path.display(), "reading items");
        self.lines = Some(reader.lines());
        Ok(())
    }
}

impl Iterator for JsonlReader {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.lines.is_none()
            && let Err(e) = self.open()
        {
            self.failed = true;
            return Some(Err(e));
        }
        let lines = self.lines.as_mut()?;
        loop {
            let text = match lines.next()? {
                Ok(text) => text,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(TransmogrifierError::io(&self.path, e)));
                }
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&text).map_err(|e| TransmogrifierError::Parse {
                path: self.path.clone(),
                line: self.line,
                message: e.to_string(),
            }));
        }
    }
}

/// `transmogrifier.from_jsonl`: upstream items, then the items of
/// `filename` (default `input.jsonl`).
pub fn source(
    _transmogrifier: &Transmogrifier,
    _name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let reader = JsonlReader::new(&filename(&options, "input.jsonl")?);
    Ok(Box::new(previous.chain(reader)))
}

/// Writes matching object items while passing every item on.
struct JsonlWriter {
    name: String,
    path: PathBuf,
    previous: ItemStream,
    condition: Condition,
    fieldnames: Vec<String>,
    writer: Option<Box<dyn Write>>,
    written: usize,
    finished: bool,
}

impl JsonlWriter {
    fn writer(&mut self) -> Result<&mut Box<dyn Write>> {
        if self.writer.is_none() {
            let writer: Box<dyn Write> = if self.path.as_os_str() == STDIO {
                Box::new(io::stdout())
            } else {
                let file = File::create(&self.path).map_err(|e| TransmogrifierError::io(&self.path, e))?;
                Box::new(BufWriter::new(file))
            };
            self.writer = Some(writer);
        }
        self.writer
            .as_mut()
            .ok_or_else(|| TransmogrifierError::section(&self.name, "output not open"))
    }

    /// The part of `item` that gets written.
    fn record(&self, item: &Map<String, Value>) -> Value {
        let record: Map<String, Value> = if self.fieldnames.is_empty() {
            item.iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            self.fieldnames
                .iter()
                .map(|key| (key.clone(), item.get(key).cloned().unwrap_or(Value::Null)))
                .collect()
        };
        Value::Object(record)
    }

    fn write(&mut self, item: &Item) -> Result<()> {
        let Some(map) = item.as_object() else {
            return Ok(());
        };
        if !self.condition.matches(item)? {
            return Ok(());
        }
        let line = serde_json::to_string(&self.record(map))?;
        let path = self.path.clone();
        let writer = self.writer()?;
        writeln!(writer, "{line}").map_err(|e| TransmogrifierError::io(&path, e))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        // Created even when nothing matched.
        let path = self.path.clone();
        self.writer()?.flush().map_err(|e| TransmogrifierError::io(&path, e))?;
        self.writer = None;
        info!(
            section = self.name.as_str(),
            path = %self.path.display(),
            items = self.written,
            "wrote items"
        );
        Ok(())
    }
}

impl Iterator for JsonlWriter {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.previous.next() {
            Some(Ok(item)) => Some(self.write(&item).map(|()| item)),
            Some(Err(e)) => {
                // Keep what was written before the failure.
                self.finished = true;
                if let Some(mut writer) = self.writer.take()
                    && let Err(flush) = writer.flush()
                {
                    warn!(
                        section = self.name.as_str(),
                        path = %self.path.display(),
                        error = %flush,
                        "flush after upstream error failed"
                    );
                }
                Some(Err(e))
            }
            None => self.finish().err().map(Err),
        }
    }
}

/// `transmogrifier.to_jsonl`: write matching object items to `filename`
/// (default `output.jsonl`). `fieldnames` limits (and orders) the written
/// keys; otherwise keys starting with `_` are left out.
pub fn sink(
    transmogrifier: &Transmogrifier,
    name: &str,
    options: Options,
    previous: ItemStream,
) -> Result<Box<dyn Section>> {
    let condition = Condition::from_options(transmogrifier, name, &options)?;
    Ok(Box::new(JsonlWriter {
        name: name.to_string(),
        path: PathBuf::from(filename(&options, "output.jsonl")?),
        previous,
        condition,
        fieldnames: get_words(options.get("fieldnames")?.as_deref()),
        writer: None,
        written: 0,
        finished: false,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprints::tests::{run_section, transmogrifier};
    use crate::executor::drain;
    use crate::section::from_items;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_source_reads_after_upstream() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.jsonl");
        fs::write(&path, "{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();
        let filename = path.display().to_string();
        let tm = transmogrifier(&[(
            "read",
            &[("blueprint", "transmogrifier.from_jsonl"), ("filename", filename.as_str())],
        )]);
        assert_eq!(
            run_section(&tm, "read", from_items(vec![json!({"up": 0})])),
            vec![json!({"up": 0}), json!({"a": 1}), json!({"a": 2})]
        );
    }

    #[test]
    fn test_source_reports_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("in.jsonl");
        fs::write(&path, "{\"a\": 1}\nnot json\n").unwrap();
        let filename = path.display().to_string();
        let tm = transmogrifier(&[(
            "read",
            &[("blueprint", "transmogrifier.from_jsonl"), ("filename", filename.as_str())],
        )]);
        let pipeline = tm.construct(&["read".to_string()], None).unwrap();
        assert!(matches!(drain(pipeline), Err(TransmogrifierError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_source_missing_file_fails_on_pull() {
        let dir = TempDir::new().unwrap();
        let filename = dir.path().join("absent.jsonl").display().to_string();
        let tm = transmogrifier(&[(
            "read",
            &[("blueprint", "transmogrifier.from_jsonl"), ("filename", filename.as_str())],
        )]);
        let pipeline = tm.construct(&["read".to_string()], None).unwrap();
        assert!(matches!(drain(pipeline), Err(TransmogrifierError::Io { .. })));
    }

    #[test]
    fn test_sink_writes_matching_objects_and_passes_all() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let filename = path.display().to_string();
        let tm = transmogrifier(&[(
            "write",
            &[
                ("blueprint", "transmogrifier.to_jsonl"),
                ("filename", filename.as_str()),
                ("condition", "item/ok"),
            ],
        )]);
        let input = vec![
            json!({"ok": true, "n": 1, "_skip": 0}),
            json!({"ok": false, "n": 2}),
            json!("opaque"),
        ];
        assert_eq!(run_section(&tm, "write", from_items(input.clone())), input);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"ok\":true,\"n\":1}\n");
    }

    #[test]
    fn test_sink_flushes_written_lines_on_upstream_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let filename = path.display().to_string();
        let tm = transmogrifier(&[(
            "write",
            &[("blueprint", "transmogrifier.to_jsonl"), ("filename", filename.as_str())],
        )]);
        let upstream: ItemStream = Box::new(
            vec![
                Ok(json!({"n": 1})),
                Ok(json!({"n": 2})),
                Err(TransmogrifierError::section("up", "broken record")),
            ]
            .into_iter(),
        );
        let mut pipeline = tm.construct(&["write".to_string()], Some(upstream)).unwrap();
        assert_eq!(pipeline.next().unwrap().unwrap(), json!({"n": 1}));
        assert_eq!(pipeline.next().unwrap().unwrap(), json!({"n": 2}));
        assert!(matches!(pipeline.next(), Some(Err(TransmogrifierError::Section { .. }))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"n\":1}\n{\"n\":2}\n");
        assert!(pipeline.next().is_none());
    }

    #[test]
    fn test_sink_fieldnames_and_empty_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");
        let empty = dir.path().join("empty.jsonl");
        let (filename, empty_name) = (path.display().to_string(), empty.display().to_string());
        let tm = transmogrifier(&[
            (
                "write",
                &[
                    ("blueprint", "transmogrifier.to_jsonl"),
                    ("filename", filename.as_str()),
                    ("fieldnames", "b a"),
                ],
            ),
            ("none", &[("blueprint", "transmogrifier.to_jsonl"), ("filename", empty_name.as_str())]),
        ]);
        run_section(&tm, "write", from_items(vec![json!({"a": 1, "c": 3})]));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"b\":null,\"a\":1}\n");
        assert!(run_section(&tm, "none", from_items(vec![])).is_empty());
        assert_eq!(fs::read_to_string(&empty).unwrap(), "");
    }
}
