pub mod app;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod logging;
pub mod session;
pub mod sse;
pub mod transport;
pub mod tui;
pub mod ui;
