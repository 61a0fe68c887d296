mod engine;
mod variables;

pub use engine::{
    build_timestamp, EngineLimits, HostCallbacks, NullHost, QspEngine, QspEngineOptions,
    DEFAULT_ENGINE_VERSION, SNAPSHOT_FORMAT_VERSION,
};
pub use variables::VariableStore;
