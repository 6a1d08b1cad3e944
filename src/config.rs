//! Configuration loading: INI parsing, the include chain and overrides.
//!
//! Configuration format:
//! ```text
//! [transmogrifier]
//! include = base
//! pipeline =
//!     source
//!     sink
//!
//! [source]
//! blueprint = transmogrifier.from
//! amount = 2
//! ```
//!
//! - `[name]` starts a section; section names are unique per file
//! - `key = value` or `key: value`; keys are case-sensitive
//! - Indented lines continue the previous value (joined with newlines)
//! - Lines starting with `#` or `;` are comments
//!
//! Include merge rules (per option of the including section):
//! - `key -= lines` removes those lines from the included value
//! - `key += lines` appends lines to the included value (after removals)
//! - a bare `key` replaces the included value outright

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, TransmogrifierError};
use crate::registry::ConfigurationRegistry;
use crate::utils::{get_lines, get_words};

/// Name of the section holding pipeline metadata.
pub const TRANSMOGRIFIER: &str = "transmogrifier";

/// Option name to raw value.
pub type OptionMap = BTreeMap<String, String>;
/// Section name to options.
pub type SectionMap = BTreeMap<String, OptionMap>;

/// A fully merged configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    /// Raw option values, subject to `${section:option}` substitution.
    pub sections: SectionMap,
    /// Caller-supplied final values; never substituted.
    pub overrides: SectionMap,
}

impl Configuration {
    pub fn new(sections: SectionMap) -> Self {
        Self {
            sections,
            overrides: SectionMap::new(),
        }
    }

    /// Override values replace raw values in a copy of the sections.
    pub fn effective_sections(&self) -> SectionMap {
        let mut sections = self.sections.clone();
        for (name, options) in &self.overrides {
            let target = sections.entry(name.clone()).or_default();
            for (key, value) in options {
                target.insert(key.clone(), value.clone());
            }
        }
        sections
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, options) in &self.effective_sections() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            writeln!(f, "[{name}]")?;
            for (key, value) in options {
                if value.contains('\n') {
                    writeln!(f, "{key} =")?;
                    for line in value.lines() {
                        writeln!(f, "    {line}")?;
                    }
                } else {
                    writeln!(f, "{key} = {value}")?;
                }
            }
        }
        Ok(())
    }
}

/// Parse INI text into sections. `path` is only used in error messages.
pub fn parse_config(text: &str, path: &Path) -> Result<SectionMap> {
    let mut sections = SectionMap::new();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;

    let error = |line_num: usize, message: String| TransmogrifierError::Parse {
        path: path.to_path_buf(),
        line: line_num + 1,
        message,
    };

    for (line_num, raw) in text.lines().enumerate() {
        let line = raw.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        // Indented lines continue the previous value
        let indented = raw.starts_with([' ', '\t']);
        if indented
            && let (Some(section), Some(key)) = (&current, &last_key)
            && let Some(value) = sections.get_mut(section).and_then(|s| s.get_mut(key))
        {
            value.push('\n');
            value.push_str(line);
            continue;
        }

        if let Some(inner) = line.strip_prefix('[') {
            let Some(name) = inner.strip_suffix(']') else {
                return Err(error(line_num, format!("Unclosed section header: {line}")));
            };
            let name = name.trim();
            if sections.contains_key(name) {
                return Err(error(line_num, format!("Duplicate section [{name}]")));
            }
            sections.insert(name.to_string(), OptionMap::new());
            current = Some(name.to_string());
            last_key = None;
            continue;
        }

        let Some(section) = &current else {
            return Err(error(
                line_num,
                format!("Option outside of a section: {line}"),
            ));
        };

        let Some(idx) = line.find(['=', ':']) else {
            return Err(error(line_num, format!("Expected 'key = value': {line}")));
        };
        let key = line[..idx].trim();
        let value = line[idx + 1..].trim();
        if key.is_empty() {
            return Err(error(line_num, "Missing option name".to_string()));
        }

        let options = sections.entry(section.clone()).or_default();
        if options.contains_key(key) {
            return Err(error(
                line_num,
                format!("Duplicate option {key} in [{section}]"),
            ));
        }
        options.insert(key.to_string(), value.to_string());
        last_key = Some(key.to_string());
    }

    // A value whose first line was empty starts with a newline
    for options in sections.values_mut() {
        for value in options.values_mut() {
            let trimmed = value.trim();
            if trimmed.len() != value.len() {
                *value = trimmed.to_string();
            }
        }
    }

    Ok(sections)
}

/// Read and parse a configuration file.
pub fn read_config(path: &Path) -> Result<SectionMap> {
    let text = fs::read_to_string(path).map_err(|e| TransmogrifierError::io(path, e))?;
    parse_config(&text, path)
}

/// Load a configuration by id, following its include chain and applying
/// `overrides`.
///
/// Every override must name a section and option that exist once the
/// include chain is merged.
pub fn load_config(
    registry: &ConfigurationRegistry,
    configuration_id: &str,
    overrides: &SectionMap,
) -> Result<Configuration> {
    let mut seen = Vec::new();
    let sections = load_sections(registry, configuration_id, &mut seen)?;
    check_overrides(&sections, overrides)?;

    info!(
        configuration = configuration_id,
        sections = sections.len(),
        overrides = overrides.values().map(BTreeMap::len).sum::<usize>(),
        "loaded configuration"
    );

    Ok(Configuration {
        sections,
        overrides: overrides.clone(),
    })
}

/// Load one configuration file and merge its includes into it.
///
/// `seen` holds the ids currently being resolved on the call stack.
fn load_sections(
    registry: &ConfigurationRegistry,
    configuration_id: &str,
    seen: &mut Vec<String>,
) -> Result<SectionMap> {
    if seen.iter().any(|id| id == configuration_id) {
        return Err(TransmogrifierError::RecursiveInclude {
            id: configuration_id.to_string(),
            chain: seen.clone(),
        });
    }
    seen.push(configuration_id.to_string());

    let path = registry.resolve(configuration_id)?;
    let mut result = read_config(&path)?;

    let includes = result
        .get_mut(TRANSMOGRIFIER)
        .and_then(|options| options.remove("include"));

    if let Some(includes) = includes {
        // Later includes form the base; earlier ones are laid over them.
        let mut combined = SectionMap::new();
        for include_id in get_words(Some(&includes)).iter().rev() {
            debug!(
                configuration = configuration_id,
                include = include_id.as_str(),
                "merging included configuration"
            );
            let included = load_sections(registry, include_id, seen)?;
            combined = merge_sections(included, combined)?;
        }
        result = merge_sections(result, combined)?;
    }

    seen.pop();
    Ok(result)
}

/// Merge every section of `included` into `including`.
fn merge_sections(mut including: SectionMap, mut included: SectionMap) -> Result<SectionMap> {
    let names: BTreeSet<String> = including.keys().chain(included.keys()).cloned().collect();
    let mut merged = SectionMap::new();
    for name in names {
        let section = including.remove(&name).unwrap_or_default();
        let base = included.remove(&name).unwrap_or_default();
        let options = update_section(&name, section, base)?;
        merged.insert(name, options);
    }
    Ok(merged)
}

/// Merge one included section into the including one.
///
/// Included options only fill gaps. `key-` options subtract lines from the
/// included value and are applied before `key+` options, which append lines.
/// A bare key and a suffixed form of the same key cannot both be present.
pub fn update_section(name: &str, mut section: OptionMap, mut included: OptionMap) -> Result<OptionMap> {
    let remove: Vec<String> = section.keys().filter(|k| k.ends_with('-')).cloned().collect();
    let add: Vec<String> = section.keys().filter(|k| k.ends_with('+')).cloned().collect();

    for key in remove {
        let option = suffixed_option(&key, '-');
        if section.contains_key(&option) {
            return Err(TransmogrifierError::DuplicateOption {
                section: name.to_string(),
                option,
            });
        }
        let drop = get_lines(section.get(&key).map(String::as_str));
        let kept: Vec<String> = get_lines(included.get(&option).map(String::as_str))
            .into_iter()
            .filter(|line| !drop.contains(line))
            .collect();
        included.insert(option, kept.join("\n"));
        section.remove(&key);
    }

    for key in add {
        let option = suffixed_option(&key, '+');
        if section.contains_key(&option) {
            return Err(TransmogrifierError::DuplicateOption {
                section: name.to_string(),
                option,
            });
        }
        let mut lines = get_lines(included.get(&option).map(String::as_str));
        lines.extend(get_lines(section.get(&key).map(String::as_str)));
        included.insert(option, lines.join("\n"));
        section.remove(&key);
    }

    included.extend(section);
    Ok(included)
}

/// `"bar +"` -> `"bar"`.
fn suffixed_option(key: &str, marker: char) -> String {
    key.trim_end_matches(|c: char| c == marker || c.is_whitespace())
        .trim()
        .to_string()
}

fn check_overrides(sections: &SectionMap, overrides: &SectionMap) -> Result<()> {
    for (section, options) in overrides {
        let Some(existing) = sections.get(section) else {
            return Err(TransmogrifierError::UnknownOverrideSection(section.clone()));
        };
        for option in options.keys() {
            if !existing.contains_key(option) {
                return Err(TransmogrifierError::UnknownOverrideOption {
                    section: section.clone(),
                    option: option.clone(),
                });
            }
        }
    }
    Ok(())
}
