//! # basedai-server
//!
//! Serves the BasedAI assistant over HTTP: `POST /query` with
//! `{"question": "..."}` answers `{"answer": "..."}`.
//!
//! The same [`service::QueryService`] backs the `basedai ask` command.

pub mod config;
pub mod error;
pub mod server;
pub mod service;

pub use config::AppConfig;
pub use error::{Result, ServerError};
pub use server::{QueryRequest, QueryResponse, router, serve};
pub use service::QueryService;
