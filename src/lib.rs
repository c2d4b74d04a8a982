// Change events and validation
pub mod event;

// Entity state: reducer, history, merger, live store
pub mod state;

// Aggregate metrics over the change log
pub mod metrics;

// Upstream push channel and bulk snapshot client
pub mod feed;

// Deterministic layout generation and persistence
pub mod layout;

// HTTP and WebSocket APIs
pub mod api;

// Renderer WebSocket subscriptions
pub mod subscription;

// Configuration
pub mod config;
