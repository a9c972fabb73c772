//! Configuration Module
//!
//! Environment-driven configuration for the sync service.

mod settings;

pub use settings::{
    ApiSettings, ConfigError, DashboardConfig, FeedSettings, RefreshSettings, ServerSettings,
};
