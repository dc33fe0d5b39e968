//! Chat session state and the foreground view that drives it

pub mod store;
pub mod typing;
pub mod view;

pub use store::{SessionSnapshot, SessionStore};
pub use typing::TypingDebouncer;
pub use view::{ChatView, PresenceFeed};
