//! # Dispatch Testing Utils
//!
//! Shared testing utilities for the chat dispatch workspace.
//! This crate provides hand-written doubles for every port and
//! test data builders that can be used across all other crates.
//!
//! ## Features
//!
//! - **Mock Backend**: scripted conversation creation, injectable status feeds
//!   and counters for subscriptions, closed feeds, miss-writes and opening messages
//! - **Mock Contract Pool**: fixed or failing contract repository
//! - **Time Sources**: fixed and failing clocks
//! - **Test Data Builders**: contracts and customer forms with sensible defaults
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! dispatch-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use helpers::*;
pub use mocks::*;
