//! berrydoc-server: web front end for strawberry disease detection
//!
//! Serves the upload and camera pages, keeps each visitor's latest result in
//! a signed-cookie session and relays chatbot questions to Gemini.

pub mod config;
pub mod error;
pub mod http;
pub mod pages;
pub mod session;
pub mod storage;

pub use config::{CliArgs, ServerConfig};
pub use error::ApiError;
pub use http::{create_router, AppState};
