//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// REST API client and list-endpoint refresh sources.
pub mod api;

/// Configuration loaded from the environment.
pub mod config;

/// CSV and XLSX table export.
pub mod export;

/// Websocket event feed client.
pub mod feed;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
