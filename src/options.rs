//! Per-section option access with lazy `${section:option}` substitution.
//!
//! Each option is looked up in three layers, first hit wins:
//! 1. explicit values (overrides and values set at run time), never substituted
//! 2. cooked values, the memoized result of substituting a raw value
//! 3. raw values as read from the configuration
//!
//! A raw value is only substituted when it is first read, so a broken
//! reference in an option nobody reads never fails a run.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::{Configuration, OptionMap, SectionMap};
use crate::error::{Result, TransmogrifierError};

static REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{[^}]*\}").expect("valid regex"));
static VALID_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\{[-a-zA-Z0-9 ._]*:[-a-zA-Z0-9 ._]+\}$").expect("valid regex"));
/// Values in the `string:` expression language keep their `${...}` text.
static STRING_EXPRESSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*string:").expect("valid regex"));

type OptionKey = (String, String);

/// Option values for every section of one run.
#[derive(Debug, Default)]
pub struct OptionStore {
    raw: RefCell<SectionMap>,
    cooked: RefCell<HashMap<OptionKey, String>>,
    explicit: RefCell<SectionMap>,
}

impl OptionStore {
    pub fn new(configuration: &Configuration) -> Self {
        Self {
            raw: RefCell::new(configuration.sections.clone()),
            cooked: RefCell::new(HashMap::new()),
            explicit: RefCell::new(configuration.overrides.clone()),
        }
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.raw.borrow().contains_key(section) || self.explicit.borrow().contains_key(section)
    }

    /// Options handle for `section`.
    pub fn options(self: &Rc<Self>, section: &str) -> Result<Options> {
        if !self.has_section(section) {
            return Err(TransmogrifierError::MissingSection(section.to_string()));
        }
        Ok(Options {
            section: section.to_string(),
            store: Rc::clone(self),
        })
    }

    /// Fully resolved value of `section:option`, or `None` if unset.
    pub fn get(&self, section: &str, option: &str) -> Result<Option<String>> {
        let mut seen = Vec::new();
        self.resolve(section, option, &mut seen)
    }

    /// `seen` is the chain of options currently being substituted.
    fn resolve(
        &self,
        section: &str,
        option: &str,
        seen: &mut Vec<OptionKey>,
    ) -> Result<Option<String>> {
        if let Some(value) = self
            .explicit
            .borrow()
            .get(section)
            .and_then(|options| options.get(option))
        {
            return Ok(Some(value.clone()));
        }

        let key = (section.to_string(), option.to_string());
        if let Some(value) = self.cooked.borrow().get(&key) {
            return Ok(Some(value.clone()));
        }

        let raw = self
            .raw
            .borrow()
            .get(section)
            .and_then(|options| options.get(option))
            .cloned();
        let Some(raw) = raw else {
            return Ok(None);
        };
        if !raw.contains("${") {
            return Ok(Some(raw));
        }

        if seen.contains(&key) {
            return Err(TransmogrifierError::CircularReference {
                section: section.to_string(),
                option: option.to_string(),
            });
        }
        seen.push(key.clone());
        let value = self.substitute(section, option, &raw, seen);
        seen.pop();
        let value = value?;

        debug!(section, option, value = value.as_str(), "substituted option");
        self.cooked.borrow_mut().insert(key, value.clone());
        Ok(Some(value))
    }

    fn substitute(
        &self,
        section: &str,
        option: &str,
        template: &str,
        seen: &mut Vec<OptionKey>,
    ) -> Result<String> {
        let mut result = String::with_capacity(template.len());
        let mut last = 0;

        for found in REFERENCE.find_iter(template) {
            result.push_str(&template[last..found.start()]);
            last = found.end();

            let reference = found.as_str();
            if !VALID_REFERENCE.is_match(reference) {
                if STRING_EXPRESSION.is_match(template) {
                    result.push_str(reference);
                    continue;
                }
                return Err(TransmogrifierError::InvalidSubstitution {
                    section: section.to_string(),
                    option: option.to_string(),
                    reference: reference.to_string(),
                });
            }

            let inner = &reference[2..reference.len() - 1];
            let (target_section, target_option) = match inner.split_once(':') {
                Some(("", name)) => (section, name),
                Some((other, name)) => (other, name),
                None => (section, inner),
            };

            let missing = || TransmogrifierError::MissingReference {
                section: target_section.to_string(),
                option: target_option.to_string(),
            };
            if !self.has_section(target_section) {
                return Err(missing());
            }
            let value = self
                .resolve(target_section, target_option, seen)?
                .ok_or_else(missing)?;
            result.push_str(&value);
        }

        result.push_str(&template[last..]);
        Ok(result)
    }

    fn set(&self, section: &str, option: &str, value: String) {
        self.explicit
            .borrow_mut()
            .entry(section.to_string())
            .or_default()
            .insert(option.to_string(), value);
    }

    fn delete(&self, section: &str, option: &str) -> Result<()> {
        let key = (section.to_string(), option.to_string());
        let in_raw = self
            .raw
            .borrow_mut()
            .get_mut(section)
            .and_then(|options| options.remove(option))
            .is_some();
        let in_explicit = self
            .explicit
            .borrow_mut()
            .get_mut(section)
            .and_then(|options| options.remove(option))
            .is_some();
        self.cooked.borrow_mut().remove(&key);

        if in_raw || in_explicit {
            Ok(())
        } else {
            Err(TransmogrifierError::MissingOption {
                section: section.to_string(),
                option: option.to_string(),
            })
        }
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .raw
            .borrow()
            .get(section)
            .map(|options| options.keys().cloned().collect())
            .unwrap_or_default();
        if let Some(explicit) = self.explicit.borrow().get(section) {
            for key in explicit.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    fn snapshot(&self, section: &str) -> OptionMap {
        let mut result = self.raw.borrow().get(section).cloned().unwrap_or_default();
        for ((cooked_section, option), value) in self.cooked.borrow().iter() {
            if cooked_section == section {
                result.insert(option.clone(), value.clone());
            }
        }
        if let Some(explicit) = self.explicit.borrow().get(section) {
            result.extend(explicit.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        result
    }
}

/// The options of one section: a cheap handle into the shared [`OptionStore`].
///
/// Values are always strings; blueprints parse them themselves (see
/// [`crate::utils`]).
#[derive(Clone)]
pub struct Options {
    section: String,
    store: Rc<OptionStore>,
}

impl Options {
    /// Name of the section these options belong to.
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Resolved value, or `None` when the option is not set.
    pub fn get(&self, option: &str) -> Result<Option<String>> {
        self.store.get(&self.section, option)
    }

    pub fn get_or(&self, option: &str, default: &str) -> Result<String> {
        Ok(self.get(option)?.unwrap_or_else(|| default.to_string()))
    }

    /// Resolved value; a missing option is an error.
    pub fn require(&self, option: &str) -> Result<String> {
        self.get(option)?
            .ok_or_else(|| TransmogrifierError::MissingOption {
                section: self.section.clone(),
                option: option.to_string(),
            })
    }

    /// Set an explicit value. Explicit values are never substituted.
    pub fn set(&self, option: &str, value: impl Into<String>) {
        self.store.set(&self.section, option, value.into());
    }

    pub fn delete(&self, option: &str) -> Result<()> {
        self.store.delete(&self.section, option)
    }

    pub fn contains(&self, option: &str) -> bool {
        self.keys().iter().any(|key| key == option)
    }

    /// Declared option names followed by names only set explicitly.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys(&self.section)
    }

    /// Every option with its resolved value.
    pub fn items(&self) -> Result<Vec<(String, String)>> {
        self.keys()
            .into_iter()
            .map(|key| {
                let value = self.require(&key)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Current values without triggering substitution: explicit over cooked
    /// over raw.
    pub fn to_map(&self) -> OptionMap {
        self.store.snapshot(&self.section)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("section", &self.section)
            .field("values", &self.to_map())
            .finish()
    }
}
