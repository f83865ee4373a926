pub mod storage;

pub use storage::{Artifact, HubStore, LocalStore, WeightStore};
