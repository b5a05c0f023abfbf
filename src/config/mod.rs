mod loader;
mod schema;

pub use loader::load;
pub use schema::{
    ApprovalConfig, Config, DispatchConfig, LlmConfig, LoggingConfig, ServerConfig,
};
