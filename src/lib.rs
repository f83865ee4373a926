pub mod auto;
pub mod core;
pub mod envconfig;
pub mod error;
pub mod infra;
pub mod rng;

pub mod model {
    pub use crate::core::model::*;
}

pub use error::{Error, Result};
pub use rng::SeededRng;

pub use crate::core::{
    Activation, Backend, BackendKind, CandleBackend, ClassInfo, ConfigOptions, Family, Head, Labels, LoadOptions, Loaded,
    LoadingInfo, LossKind, MatchDiscipline, ModelClass, ModelInput, ModelOutputs, OutputKind, OutputValue, PreTrainedModel,
    PretrainedConfig, PretrainedConfigBuilder, ReferenceBackend, Registry, RegistryTable, ResolvedConfig, SummaryType, Task,
    Tensor, TensorOps, UnusedKeys,
};

pub use crate::infra::{Artifact, HubStore, LocalStore, WeightStore};
