//! Axum HTTP API server for comic panels.
//!
//! This crate provides:
//! - The panel status protocol (GET / POST / DELETE per panel)
//! - The volatile job registry and its sweeper
//! - The background generation pipeline
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{GenerationPipeline, JobRegistry, PanelService, SweeperHandle};
pub use state::AppState;
