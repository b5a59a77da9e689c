//! # GAT Rust Backend
//!
//! Guild availability tracking backend.
//!
//! This crate provides a Rust backend for the Guild Availability Tracker (GAT),
//! a scheduler for game communities: members mark 30-minute time-slot
//! availability, browse aggregate heatmaps, find members with overlapping
//! schedules, and organize into small parties via an invite workflow. The
//! backend exposes a REST API via Axum for the web frontend.
//!
//! ## Features
//!
//! - **Slot Store**: per-user, per-slot tri-state availability with uniqueness
//!   enforcement and delete-on-unavailable storage
//! - **Aggregate Maintainer**: per-slot available/maybe counts kept consistent
//!   with the slot store, recomputed atomically with every write
//! - **Matching**: rank members by overlapping available slots
//! - **Groups**: five-person parties with leader-managed invites
//! - **HTTP API**: RESTful endpoints for frontend integration
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`api`]: Public type surface shared by the API layers
//! - [`models`]: Domain types (slot state, slot index, roster)
//! - [`db`]: Database operations, repository pattern, and persistence layer
//! - [`services`]: Read-side business logic (matching, group schedules)
//! - [`http`]: Axum-based HTTP server and request handlers
//! - [`routes`]: Route-specific data types
//!

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;

pub mod db;
pub mod models;

pub mod routes;

pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
