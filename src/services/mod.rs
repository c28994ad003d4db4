pub mod api;
pub mod auth;
pub mod chat;
pub mod protocol;
pub mod render;
#[cfg(not(target_arch = "wasm32"))]
pub mod setup;
#[cfg(not(target_arch = "wasm32"))]
pub mod terminal;
