//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → composition root builds store, breakers, limiter from it
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads and validates
//!     → new rate limits swapped into the limiter
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CircuitBreakerConfig, GuardConfig, HealthCheckConfig, ObservabilityConfig,
    RateLimitConfig, ServiceLimits, StoreBackend, StoreConfig,
};
pub use validation::{validate_config, ValidationError};
