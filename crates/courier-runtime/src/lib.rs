pub mod debounce;
pub mod dispatch;
pub mod error;
pub mod resolve;

pub use debounce::{MessageBatch, PendingMessage, TopicDebouncer, TopicKey};
pub use dispatch::{DispatchScheduler, InboundEvent, InboundMessage, ReplySender};
pub use error::DispatchError;
pub use resolve::{parse_directives, Directives, MessageResolver, ResolvedMessage};
