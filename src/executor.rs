//! Pipeline construction and execution.
//!
//! A pipeline is built by walking its section ids in order: each section's
//! blueprint is looked up, handed the stream of the section before it, and
//! must give back a stream of its own. Nothing runs until the final stream
//! is pulled; running a pipeline pulls it to exhaustion and discards the
//! items, since the sections' side effects are the product.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};

use crate::config::{Configuration, SectionMap, TRANSMOGRIFIER, load_config};
use crate::error::{Result, TransmogrifierError};
use crate::expression::{BasicEngine, Evaluate};
use crate::options::{OptionStore, Options};
use crate::registry::{BlueprintRegistry, ConfigurationRegistry};
use crate::section::{Item, ItemStream, empty, new_item};
use crate::utils::get_lines;

/// Everything one pipeline run shares: resolved options, blueprints, the
/// expression engine and the context object.
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct Transmogrifier {
    configuration_id: Rc<str>,
    configuration: Rc<Configuration>,
    store: Rc<OptionStore>,
    blueprints: Rc<BlueprintRegistry>,
    engine: Rc<dyn Evaluate>,
    context: Rc<RefCell<Item>>,
}

impl Transmogrifier {
    pub fn new(
        configuration_id: &str,
        configuration: &Configuration,
        blueprints: Rc<BlueprintRegistry>,
    ) -> Self {
        Self {
            configuration_id: Rc::from(configuration_id),
            configuration: Rc::new(configuration.clone()),
            store: Rc::new(OptionStore::new(configuration)),
            blueprints,
            engine: Rc::new(BasicEngine),
            context: Rc::new(RefCell::new(new_item())),
        }
    }

    /// Load `configuration_id` (following includes, applying `overrides`)
    /// and prepare a run for it.
    pub fn load(
        registry: &ConfigurationRegistry,
        blueprints: Rc<BlueprintRegistry>,
        configuration_id: &str,
        overrides: &SectionMap,
    ) -> Result<Self> {
        let configuration = load_config(registry, configuration_id, overrides)?;
        Ok(Self::new(configuration_id, &configuration, blueprints))
    }

    pub fn with_engine(mut self, engine: Rc<dyn Evaluate>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_context(mut self, context: Item) -> Self {
        self.context = Rc::new(RefCell::new(context));
        self
    }

    pub fn configuration_id(&self) -> &str {
        &self.configuration_id
    }

    /// The merged configuration this run was created from.
    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn store(&self) -> &Rc<OptionStore> {
        &self.store
    }

    pub fn blueprints(&self) -> &BlueprintRegistry {
        &self.blueprints
    }

    pub fn engine(&self) -> &dyn Evaluate {
        self.engine.as_ref()
    }

    /// The object the pipeline works on; sections may read and change it.
    pub fn context(&self) -> &Rc<RefCell<Item>> {
        &self.context
    }

    pub fn options(&self, section: &str) -> Result<Options> {
        self.store.options(section)
    }

    /// Section ids of the top-level pipeline, in execution order.
    pub fn pipeline_sections(&self) -> Result<Vec<String>> {
        let options = self.options(TRANSMOGRIFIER)?;
        Ok(get_lines(Some(&options.require("pipeline")?)))
    }

    /// Build `sections` on top of `previous` (an empty stream when `None`).
    pub fn construct(&self, sections: &[String], previous: Option<ItemStream>) -> Result<ItemStream> {
        construct_pipeline(self, sections, previous)
    }

    /// Build the top-level pipeline and pull it to exhaustion.
    ///
    /// Returns the number of items that came out of the last section.
    pub fn run(&self) -> Result<usize> {
        let sections = self.pipeline_sections()?;
        let pipeline = self.construct(&sections, None)?;
        let count = drain(pipeline)?;
        info!(
            configuration = &*self.configuration_id,
            sections = sections.len(),
            items = count,
            "pipeline finished"
        );
        Ok(count)
    }
}

/// Chain the sections named by `sections`, each reading from the one before.
///
/// Every blueprint must hand back a streaming section; otherwise this fails
/// naming the blueprint and section, before any item has been pulled.
pub fn construct_pipeline(
    transmogrifier: &Transmogrifier,
    sections: &[String],
    previous: Option<ItemStream>,
) -> Result<ItemStream> {
    let mut pipeline = previous.unwrap_or_else(empty);

    for section_id in sections {
        let options = transmogrifier.options(section_id)?;
        let blueprint_id = options.require("blueprint")?;
        let blueprint = transmogrifier
            .blueprints()
            .get(&blueprint_id)
            .cloned()
            .ok_or_else(|| TransmogrifierError::UnknownBlueprint {
                blueprint: blueprint_id.clone(),
                section: section_id.clone(),
            })?;

        debug!(
            section = section_id.as_str(),
            blueprint = blueprint_id.as_str(),
            "constructing section"
        );
        let section = blueprint(transmogrifier, section_id, options, pipeline)?;
        pipeline = section
            .into_stream()
            .ok_or_else(|| TransmogrifierError::NotASection {
                blueprint: blueprint_id,
                section: section_id.clone(),
            })?;
    }

    Ok(pipeline)
}

/// Pull every item out of `pipeline`, stopping at the first error.
pub fn drain(pipeline: ItemStream) -> Result<usize> {
    let mut count = 0;
    for item in pipeline {
        item?;
        count += 1;
    }
    Ok(count)
}
