//! # API Shared
//!
//! Shared definitions for the bed board APIs.
//!
//! Contains:
//! - Wire request/response types (`dto` module), serde-serialisable with OpenAPI schemas
//! - Shared services like `HealthService`
//!
//! Used by `api-rest`. Conversions from core types live with the API
//! surface that needs them, so this crate does not depend on `bedboard-core`.

pub mod dto;
pub mod health;

pub use dto::*;
pub use health::HealthService;
