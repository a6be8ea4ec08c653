//! psytest-providers: text-generation backends and configuration.
//!
//! Implements the `TextGenerator` trait for the Gemini API and a scripted
//! mock, and loads `psytest.toml`.

pub mod config;
pub mod gemini;
pub mod mock;

pub use config::{
    create_generator, load_config, load_config_from, GeminiConfig, PsytestConfig, RetryConfig,
    ScoringConfig,
};
pub use gemini::GeminiGenerator;
pub use mock::MockGenerator;
