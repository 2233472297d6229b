pub mod audio;
pub mod config;
pub mod display;
pub mod error;
pub mod messages;
pub mod services;
pub mod shell;
pub mod storage;

pub use error::{AudioError, SessionError, StorageError};
pub use messages::{Intent, Session, Snapshot};
pub use storage::{Recording, StorageGateway};
