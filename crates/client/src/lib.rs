//! Support Chat Client Library
//!
//! This crate contains the client side of the support chat: the realtime
//! connection layer, per-session state, the customer widget and the admin
//! session directory.

pub mod config;
pub mod context;
pub mod directory;
pub mod error;
pub mod presence;
pub mod rest;
pub mod session;
pub mod websocket;
pub mod widget;

pub use config::{ChatTimings, Config, ConfigError};
pub use context::ChatContext;
pub use directory::SessionDirectory;
pub use error::{ClientError, ClientResult};
pub use presence::{PresenceListener, UnreadCounter};
pub use rest::{ChatApi, RestClient};
pub use session::{ChatView, SessionSnapshot};
pub use widget::ChatWidget;
