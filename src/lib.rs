pub mod log;
pub mod poll;
pub mod reducer;
pub mod server;
pub mod services;
pub mod span;
pub mod store;
pub mod websocket;
