pub mod backend;
pub mod config;
pub mod family;
pub mod model;
pub mod registry;
pub mod tensor;

pub use backend::{Backend, BackendKind, CandleBackend, ReferenceBackend};
pub use config::{Activation, ConfigOptions, PretrainedConfig, PretrainedConfigBuilder, ResolvedConfig, SummaryType, UnusedKeys};
pub use family::{Family, MemoryKind};
pub use model::{
    ClassInfo, Head, Labels, LoadOptions, Loaded, LoadingInfo, LossKind, ModelInput, ModelOutputs, OutputKind, OutputValue,
    PreTrainedModel,
};
pub use registry::{MatchDiscipline, ModelClass, Registry, RegistryTable, Task, CANDLE_REGISTRY, REFERENCE_REGISTRY};
pub use tensor::{Shape, Tensor, TensorOps};

pub use crate::error::Result;
