pub mod session;

pub use session::{SessionHandle, SessionMachine};
