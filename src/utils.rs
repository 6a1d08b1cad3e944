//! Helpers blueprints use to interpret their (string-only) options.

use regex::Regex;

use crate::error::{Result, TransmogrifierError};
use crate::options::Options;

/// Non-empty whitespace separated parts of an option value.
pub fn get_words(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Non-empty, trimmed, newline separated parts of an option value.
pub fn get_lines(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or("")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Boolean coercion for option text.
pub fn to_boolean(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "on" | "yes" | "enabled"
    )
}

/// Item keys for a blueprint/section pair, most specific first.
///
/// With a key: `_blueprint_section_key`, `_blueprint_key`, `_section_key`,
/// `_key`. Without: `_blueprint_section`, `_blueprint`, `_section`.
pub fn default_keys(blueprint: &str, section: &str, key: Option<&str>) -> Vec<String> {
    match key {
        Some(key) => vec![
            format!("_{blueprint}_{section}_{key}"),
            format!("_{blueprint}_{key}"),
            format!("_{section}_{key}"),
            format!("_{key}"),
        ],
        None => vec![
            format!("_{blueprint}_{section}"),
            format!("_{blueprint}"),
            format!("_{section}"),
        ],
    }
}

/// Build a [`Matcher`] from `option_name`, falling back to [`default_keys`].
pub fn default_matcher(
    options: &Options,
    option_name: &str,
    key: Option<&str>,
    extra: &[&str],
) -> Result<Matcher> {
    if options.contains(option_name) {
        let value = options.require(option_name)?;
        return Matcher::new(get_lines(Some(&value)));
    }
    let blueprint = options.require("blueprint")?;
    let mut keys = default_keys(&blueprint, options.section(), key);
    keys.extend(extra.iter().map(|k| k.to_string()));
    Matcher::new(keys)
}

#[derive(Debug, Clone)]
enum MatchExpr {
    Literal(String),
    Pattern(Regex),
}

/// Matches values against a list of literal strings or `re:`/`regexp:`
/// regular expressions. Expressions are tried in order; the first value
/// they match wins.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    expressions: Vec<MatchExpr>,
}

impl Matcher {
    pub fn new<I, S>(expressions: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut compiled = Vec::new();
        for expr in expressions {
            let expr = expr.as_ref().trim();
            if expr.is_empty() {
                continue;
            }
            let pattern = expr
                .strip_prefix("re:")
                .or_else(|| expr.strip_prefix("regexp:"));
            match pattern {
                Some(pattern) => {
                    // Anchored at the start, like a match (not a search).
                    let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| {
                        TransmogrifierError::Expression {
                            expression: expr.to_string(),
                            message: e.to_string(),
                        }
                    })?;
                    compiled.push(MatchExpr::Pattern(regex));
                }
                None => compiled.push(MatchExpr::Literal(expr.to_string())),
            }
        }
        Ok(Self {
            expressions: compiled,
        })
    }

    /// Return the first of `values` matched by any expression.
    pub fn find<'v>(&self, values: &[&'v str]) -> Option<&'v str> {
        for expr in &self.expressions {
            for value in values {
                let hit = match expr {
                    MatchExpr::Literal(literal) => literal == value,
                    MatchExpr::Pattern(regex) => regex.is_match(value),
                };
                if hit {
                    return Some(value);
                }
            }
        }
        None
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.find(&[value]).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.expressions.is_empty()
    }
}
