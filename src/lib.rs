/// Error types for the admin console
pub mod error;

/// Records exchanged with the backend
pub mod models;

/// Backend contract, REST client and in-memory stand-in
pub mod api;

/// Transient operator feedback
pub mod toasts;

/// One panel per resource type
pub mod panels;

/// Tabbed console driving the panels
pub mod console;

/// Request statistics for the status line
pub mod monitoring;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{ApiError, CommandError, ConfigError, PanelError, ValidationError};
