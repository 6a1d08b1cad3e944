//! CLI tool to run transmogrifier pipeline configurations.
//!
//! Usage:
//!   transmogrify <pipeline>... [--overrides overrides.cfg] [--context context.json]
//!   transmogrify --package demo=./pipelines demo:import.cfg
//!   transmogrify --list
//!
//! A pipeline is a registered id, a `package:relative/path.cfg` reference
//! or a path to a configuration file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use clap::Parser;
use serde_json::Value;
use transmogrifier_rs::logging::init_logging;
use transmogrifier_rs::section::new_item;
use transmogrifier_rs::{
    BlueprintRegistry, ConfigurationRegistry, Result, SectionMap, TRANSMOGRIFIER, Transmogrifier,
    TransmogrifierError, load_config, read_config,
};

/// Run pipeline configurations, one after another, sharing one context.
#[derive(Parser)]
#[command(name = "transmogrify")]
struct Cli {
    /// Pipeline ids, package references or configuration files
    #[arg(required_unless_present = "list")]
    pipelines: Vec<String>,

    /// INI file with `[section]` option overrides
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// JSON file with the initial context object
    #[arg(long)]
    context: Option<PathBuf>,

    /// Resolve `NAME:path` references below DIR
    #[arg(long = "package", value_name = "NAME=DIR", value_parser = parse_package)]
    packages: Vec<(String, PathBuf)>,

    /// List blueprints and pipelines, then exit
    #[arg(long)]
    list: bool,

    /// Print the merged configuration instead of running it
    #[arg(long)]
    show: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_package(value: &str) -> std::result::Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, dir)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(dir.trim())))
        }
        _ => Err(format!("expected NAME=DIR, got '{value}'")),
    }
}

/// Title and description from a configuration's `[transmogrifier]` section.
fn describe(path: &Path) -> (String, String) {
    let Ok(sections) = read_config(path) else {
        return (String::new(), String::new());
    };
    let meta = sections.get(TRANSMOGRIFIER);
    let get = |key: &str| {
        meta.and_then(|options| options.get(key))
            .cloned()
            .unwrap_or_default()
    };
    (get("title"), get("description"))
}

/// Register package `*.cfg` files and pipeline arguments naming files.
fn build_registry(cli: &Cli) -> Result<ConfigurationRegistry> {
    let mut registry = ConfigurationRegistry::new();
    for (name, dir) in &cli.packages {
        registry.register_package(name, dir);
        let entries = fs::read_dir(dir).map_err(|e| TransmogrifierError::io(dir, e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "cfg"))
            .collect();
        files.sort();
        for path in files {
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let (title, description) = describe(&path);
            registry.register(&format!("{name}:{file_name}"), &title, &description, &path)?;
        }
    }
    for pipeline in &cli.pipelines {
        let path = Path::new(pipeline);
        if !registry.contains(pipeline) && path.is_file() {
            let (title, description) = describe(path);
            registry.register(pipeline, &title, &description, path)?;
        }
    }
    Ok(registry)
}

fn list(registry: &ConfigurationRegistry, blueprints: &BlueprintRegistry) -> Result<()> {
    println!("Available blueprints");
    println!("--------------------");
    for id in blueprints.ids() {
        println!("{id}");
    }
    println!();
    println!("Available pipelines");
    println!("-------------------");
    for id in registry.ids() {
        let info = registry.get(id)?;
        println!("{id}");
        println!("    {}: {}", info.title, info.description);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let registry = build_registry(cli)?;
    let blueprints = Rc::new(BlueprintRegistry::with_defaults());

    if cli.list {
        return list(&registry, &blueprints);
    }

    let overrides = match &cli.overrides {
        Some(path) => read_config(path)?,
        None => SectionMap::new(),
    };

    let mut context: Value = match &cli.context {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| TransmogrifierError::io(path, e))?;
            serde_json::from_str(&text)?
        }
        None => new_item(),
    };

    for pipeline in &cli.pipelines {
        if cli.show {
            let configuration = load_config(&registry, pipeline, &overrides)?;
            println!("# {pipeline}");
            println!("{configuration}");
            continue;
        }
        let tm = Transmogrifier::load(&registry, Rc::clone(&blueprints), pipeline, &overrides)?
            .with_context(context);
        tm.run()?;
        context = tm.context().borrow().clone();
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Pipeline error: {e}");
        process::exit(1);
    }
}
