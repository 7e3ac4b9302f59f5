//! Chat session engine
//!
//! Turns a stateless streaming chat API into a threaded, cancellable,
//! undoable conversation. Provider specifics sit behind adapters, network
//! and persistence behind injected collaborators.

pub mod catalog;
pub mod chat;
pub mod clock;
pub mod decoder;
pub mod error;
pub mod images;
pub mod provider;
pub mod session;
pub mod settings;
pub mod transport;

pub use chat::{Message, MessageId, MessageStatus, Role};
pub use error::SessionError;
pub use session::{CancelHandle, Session, SessionBuilder, SessionEvent};
pub use settings::{EngineConfig, Settings};
