// Renderer WebSocket subscriptions

pub mod manager;

pub use manager::ConnectionManager;
