pub mod body;
pub mod heads;
pub mod loading;
pub mod outputs;
pub mod params;
pub mod summary;
pub mod traits;

pub use body::{BodyOutput, Layout, TransformerBody};
pub use heads::{
    build, BaseModel, LmHeadModel, MultipleChoiceModel, QuestionAnsweringModel, SequenceClassificationModel,
    TokenClassificationModel, IGNORE_INDEX,
};
pub use loading::{load_pretrained, load_state_dict, LoadOptions, Loaded, LoadingInfo};
pub use outputs::{Labels, ModelInput, ModelOutputs, OutputKind, OutputValue};
pub use params::{Init, ParamSpec, ParamStore};
pub use summary::SequenceSummary;
pub use traits::{ClassInfo, Head, LossKind, ModelCore, PreTrainedModel};
