pub mod config;
pub mod error;
pub mod types;

pub use config::CourierConfig;
pub use error::{CoreError, Result};
pub use types::{
    ChatId, EngineId, MessageId, ResumeToken, RunContext, ThreadId, TransportMessageContext,
};
