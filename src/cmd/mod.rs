use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::Path;
use transformers_auto::auto;
use transformers_auto::{
    Backend, BackendKind, CandleBackend, ConfigOptions, Family, LoadOptions, MatchDiscipline, PreTrainedModel, PretrainedConfig,
    ReferenceBackend, Task, UnusedKeys,
};

pub fn families() -> Result<()> {
    println!("{:<14} {:<20} {:<14} {}", "MARKER", "CONFIGURATION", "PARENT", "BODY PREFIX");
    for family in Family::MARKER_ORDER {
        let parent = family.parent().map(|p| p.marker()).unwrap_or("-");
        println!("{:<14} {:<20} {:<14} {}", family.marker(), family.to_string(), parent, family.base_prefix());
    }
    Ok(())
}

pub fn resolve(identifier: &str) -> Result<()> {
    let family = auto::resolve_family(identifier)?;
    println!("{} -> {} ({})", identifier, family.marker(), family);
    Ok(())
}

pub fn config(identifier: &str, overrides: Vec<(String, Value)>, keep_unknown: bool) -> Result<()> {
    let options = ConfigOptions {
        overrides: overrides.into_iter().collect(),
        unused: UnusedKeys::Reject,
        keep_unknown_fields: keep_unknown,
    };
    let resolved = auto::config_from_pretrained(identifier, &options)
        .with_context(|| format!("resolving configuration for {}", identifier))?;
    println!("{}", resolved.config.to_json_string()?);
    Ok(())
}

pub fn tables(backend: BackendKind) -> Result<()> {
    match backend {
        BackendKind::Candle => print_tables::<CandleBackend>(),
        BackendKind::Reference => print_tables::<ReferenceBackend>(),
    }
    Ok(())
}

fn print_tables<B: Backend>() {
    for table in B::registry().tables() {
        let discipline = match table.discipline() {
            MatchDiscipline::Compatible => "compatible",
            MatchDiscipline::Exact => "exact",
        };
        println!("{} [{}, {} match]", table.task().auto_name(), table.task(), discipline);
        if table.is_empty() {
            println!("  (no classes on the {} backend)", B::KIND);
        }
        for (family, class) in table.entries() {
            println!("  {:<14} {}", family.marker(), class.name());
        }
    }
}

pub fn init(family: Family, task: Task, dir: &Path, backend: BackendKind, overrides: Vec<(String, Value)>) -> Result<()> {
    let mut config = PretrainedConfig::new(family);
    config.apply_overrides(overrides.into_iter().collect(), UnusedKeys::Reject)?;
    match backend {
        BackendKind::Candle => init_with::<CandleBackend>(task, &config, dir),
        BackendKind::Reference => init_with::<ReferenceBackend>(task, &config, dir),
    }
}

fn init_with<B: Backend>(task: Task, config: &PretrainedConfig, dir: &Path) -> Result<()> {
    let model = auto::from_config::<B>(task, config)?;
    model
        .save_pretrained(dir)
        .with_context(|| format!("saving to {}", dir.display()))?;
    println!(
        "saved {} ({} parameters) to {}",
        model.class_name(),
        model.num_parameters(),
        dir.display()
    );
    Ok(())
}

pub fn inspect(identifier: &str, task: Task, backend: BackendKind, strict: bool, from_alternate: bool) -> Result<()> {
    match backend {
        BackendKind::Candle => inspect_with::<CandleBackend>(identifier, task, strict, from_alternate),
        BackendKind::Reference => inspect_with::<ReferenceBackend>(identifier, task, strict, from_alternate),
    }
}

fn inspect_with<B: Backend>(identifier: &str, task: Task, strict: bool, from_alternate: bool) -> Result<()> {
    let mut options = LoadOptions::new().with_loading_info();
    if strict {
        options = options.strict();
    }
    if from_alternate {
        options = options.from_alternate();
    }

    let loaded = auto::from_pretrained::<B>(task, identifier, options)?;
    let model = &loaded.model;
    let report = json!({
        "class": model.class_name(),
        "family": model.config().family,
        "backend": B::KIND.to_string(),
        "parameters": model.num_parameters(),
        "training": model.is_training(),
        "loading_info": loaded.loading_info,
        "unused": Value::Object(loaded.unused.clone()),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
