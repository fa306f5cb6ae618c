// StreamRelay API Library
//
// HTTP/WebSocket surface for the relay core

pub mod http;

// Re-export commonly used types
pub use http::{AppError, AppResult, AppState};
