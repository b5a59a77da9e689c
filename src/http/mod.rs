//! HTTP server module for the GAT backend.
//!
//! This module provides an axum-based HTTP server that exposes the GAT
//! backend as a REST API. It reuses the service layer, repository pattern,
//! and DTOs from the core library.
//!
//! Authentication happens upstream: requests arrive with an `x-user-id`
//! header set by the auth proxy, parsed here by the [`identity`] extractor.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  HTTP Layer (axum handlers)                               │
//! │  - Request parsing and validation                         │
//! │  - Caller identity, permission checks                     │
//! │  - JSON serialization, CORS, compression, error mapping   │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Service Layer (db::services, services)                   │
//! │  - Slot/group workflow rules, matching                    │
//! └───────────────────┬──────────────────────────────────────┘
//! │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Repository Layer (db/)                                   │
//! │  - Data persistence and aggregate maintenance             │
//! │  - LocalRepository / PostgresRepository                   │
//! └──────────────────────────────────────────────────────────┘
//! ```

#[cfg(feature = "http-server")]
pub mod handlers;

#[cfg(feature = "http-server")]
pub mod router;

#[cfg(feature = "http-server")]
pub mod state;

#[cfg(feature = "http-server")]
pub mod error;

#[cfg(feature = "http-server")]
pub mod dto;

#[cfg(feature = "http-server")]
pub mod identity;

#[cfg(feature = "http-server")]
pub use router::create_router;

#[cfg(feature = "http-server")]
pub use state::AppState;
