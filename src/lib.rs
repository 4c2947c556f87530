pub mod ai_client;
pub mod analysis;
pub mod chat;
pub mod document;
pub mod http_server;
pub mod render;
pub mod session;
pub mod settings;
pub mod utils;
