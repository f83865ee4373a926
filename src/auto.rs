//! Auto dispatch: pick the family and class for an identifier or a configuration.
//!
//! Two routes exist. Identifier resolution matches the family markers in
//! [`Family::MARKER_ORDER`]; configuration resolution looks the configuration's
//! family up in a backend's registry table for the requested task.

use crate::core::backend::Backend;
use crate::core::config::{document_family, ConfigOptions, PretrainedConfig, ResolvedConfig};
use crate::core::family::Family;
use crate::core::model::{LoadOptions, Loaded, PreTrainedModel};
use crate::core::registry::Task;
use crate::error::{Error, Result};
use crate::infra::storage::{HubStore, LocalStore, WeightStore};
use once_cell::sync::OnceCell;
use tracing::{debug, info};

static DEFAULT_STORE: OnceCell<HubStore> = OnceCell::new();

/// Process-wide store configured from the environment.
pub fn default_store() -> Result<&'static HubStore> {
    DEFAULT_STORE.get_or_try_init(HubStore::from_env)
}

/// Family named by `identifier`.
///
/// The first marker contained in the identifier wins. A local path matching no
/// marker falls back to the `model_type` of its configuration document.
pub fn resolve_family(identifier: &str) -> Result<Family> {
    if let Some(family) = Family::from_identifier(identifier) {
        debug!(identifier, family = family.marker(), "family from identifier");
        return Ok(family);
    }
    if let Some(family) = LocalStore::new().locate(identifier).and_then(|path| document_family(&path)) {
        debug!(identifier, family = family.marker(), "family from configuration document");
        return Ok(family);
    }
    Err(Error::UnrecognizedIdentifier {
        identifier: identifier.to_string(),
        markers: Family::markers(),
    })
}

pub fn config_from_pretrained(identifier: &str, options: &ConfigOptions) -> Result<ResolvedConfig> {
    config_from_pretrained_with(default_store()?, identifier, options)
}

pub fn config_from_pretrained_with(store: &dyn WeightStore, identifier: &str, options: &ConfigOptions) -> Result<ResolvedConfig> {
    let family = resolve_family(identifier)?;
    PretrainedConfig::from_pretrained_with(store, family, identifier, options)
}

/// Load the base model of the family named by `identifier`.
pub fn model_from_identifier<B: Backend>(identifier: &str, options: LoadOptions<B::Tensor>) -> Result<Loaded<B>> {
    model_from_identifier_with::<B>(default_store()?, identifier, options)
}

pub fn model_from_identifier_with<B: Backend>(
    store: &dyn WeightStore,
    identifier: &str,
    options: LoadOptions<B::Tensor>,
) -> Result<Loaded<B>> {
    let family = resolve_family(identifier)?;
    let class = *B::registry().table(Task::Base).resolve_by_exact_type(family)?;
    info!(identifier, class = class.name(), backend = %B::KIND, "loading model");
    class.from_pretrained_with(store, identifier, options)
}

/// Fresh model of the class registered for `config`'s family under `task`.
pub fn from_config<B: Backend>(task: Task, config: &PretrainedConfig) -> Result<Box<dyn PreTrainedModel<B>>> {
    B::registry().table(task).from_config(config)
}

pub fn from_pretrained<B: Backend>(task: Task, identifier: &str, options: LoadOptions<B::Tensor>) -> Result<Loaded<B>> {
    from_pretrained_with::<B>(default_store()?, task, identifier, options)
}

pub fn from_pretrained_with<B: Backend>(
    store: &dyn WeightStore,
    task: Task,
    identifier: &str,
    options: LoadOptions<B::Tensor>,
) -> Result<Loaded<B>> {
    B::registry().table(task).from_pretrained_with(store, identifier, options)
}
