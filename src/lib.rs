//! # transmogrifier-rs
//!
//! Configuration-driven item pipelines.
//!
//! A pipeline is not written in code: an INI-style configuration lists the
//! sections to run, binds each one to a named blueprint, and gives it
//! string options. Items (JSON values, usually objects) are pulled lazily
//! from the last section back to the first.
//!
//! ## Overview
//!
//! - **Configuration loading**: named configurations, `include` chains,
//!   `key +=` / `key -=` line merging, validated overrides
//! - **Option substitution**: `${section:option}` references resolved on
//!   first use, memoized, with cycle detection
//! - **Pipeline construction**: each section wraps the stream of the one
//!   before it; structural mistakes fail before any item is pulled
//! - **Sub-pipelines**: sections that route some items through an embedded
//!   pipeline without reordering the rest
//!
//! ## Example
//!
//! ```
//! use std::path::Path;
//! use std::rc::Rc;
//! use transmogrifier_rs::{BlueprintRegistry, Configuration, Transmogrifier, parse_config};
//!
//! let text = "
//! [transmogrifier]
//! pipeline =
//!     source
//!     keep
//!
//! [source]
//! blueprint = transmogrifier.from_expression
//! expression = json:[{\"n\": 1, \"keep\": true}, {\"n\": 2}, {\"n\": 3, \"keep\": true}]
//!
//! [keep]
//! blueprint = transmogrifier.filter
//! condition = item/keep
//! ";
//! let sections = parse_config(text, Path::new("inline.cfg")).unwrap();
//! let tm = Transmogrifier::new(
//!     "inline",
//!     &Configuration::new(sections),
//!     Rc::new(BlueprintRegistry::with_defaults()),
//! );
//! assert_eq!(tm.run().unwrap(), 2);
//! ```

pub mod blueprints;
pub mod config;
pub mod error;
pub mod executor;
pub mod expression;
pub mod logging;
pub mod options;
pub mod registry;
pub mod router;
pub mod section;
pub mod utils;

pub use config::{
    Configuration, OptionMap, SectionMap, TRANSMOGRIFIER, load_config, parse_config, read_config,
    update_section,
};
pub use error::{Result, TransmogrifierError};
pub use executor::{Transmogrifier, construct_pipeline, drain};
pub use expression::{BasicEngine, Condition, Evaluate, Expression, Scope, truthy};
pub use options::{OptionStore, Options};
pub use registry::{BlueprintRegistry, ConfigurationInfo, ConfigurationRegistry};
pub use router::{BypassRouter, InlineRouter, PushBuffer};
pub use section::{Blueprint, Item, ItemStream, Section, blueprint};
