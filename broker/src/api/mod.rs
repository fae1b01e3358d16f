//! HTTP and WebSocket endpoints.

pub mod panels;
pub mod websocket;
