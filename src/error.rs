//! Error types for configuration loading, option substitution and
//! pipeline execution.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can abort a transmogrifier run.
#[derive(Error, Debug)]
pub enum TransmogrifierError {
    // --- configuration ---
    #[error("Duplicate pipeline configuration: {0}")]
    DuplicateConfiguration(String),

    #[error("Unknown pipeline configuration: {0}")]
    UnknownConfiguration(String),

    #[error("Unknown package '{package}' in configuration reference '{reference}'")]
    UnknownPackage { package: String, reference: String },

    #[error("Error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}, line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Recursive configuration include: {id} (via {})", chain.join(" -> "))]
    RecursiveInclude { id: String, chain: Vec<String> },

    #[error("Option {section}:{option} specified twice")]
    DuplicateOption { section: String, option: String },

    #[error("Overrides include non-existing section {0}")]
    UnknownOverrideSection(String),

    #[error("Overrides include non-existing key {section}:{option}")]
    UnknownOverrideOption { section: String, option: String },

    // --- substitution ---
    #[error("Circular reference in substitutions at {section}:{option}")]
    CircularReference { section: String, option: String },

    #[error("Not a valid substitution {reference} in {section}:{option}")]
    InvalidSubstitution {
        section: String,
        option: String,
        reference: String,
    },

    #[error("Referenced option does not exist: {section}:{option}")]
    MissingReference { section: String, option: String },

    #[error("Missing option: {section}:{option}")]
    MissingOption { section: String, option: String },

    #[error("Missing section: {0}")]
    MissingSection(String),

    // --- structure ---
    #[error("Unknown blueprint {blueprint} for section {section}")]
    UnknownBlueprint { blueprint: String, section: String },

    #[error("Blueprint {blueprint} for section {section} did not return a section")]
    NotASection { blueprint: String, section: String },

    // --- runtime ---
    #[error("Expression '{expression}' failed: {message}")]
    Expression { expression: String, message: String },

    #[error("Section {section}: {message}")]
    Section { section: String, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransmogrifierError {
    /// Wrap an I/O failure together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TransmogrifierError::Io {
            path: path.into(),
            source,
        }
    }

    /// A failure raised by a section while it was producing items.
    pub fn section(section: &str, message: impl Into<String>) -> Self {
        TransmogrifierError::Section {
            section: section.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransmogrifierError>;
