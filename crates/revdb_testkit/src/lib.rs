//! # revdb Testkit
//!
//! Test utilities for revdb.
//!
//! This crate provides:
//! - Fixtures: the human schema and instance helpers
//! - A reference collection that answers queries by brute force
//! - Seeded generators for humans, write procedures, selectors and sorts,
//!   plus proptest strategies
//! - The query-correctness fuzzer
//! - Concurrency stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use revdb_testkit::prelude::*;
//!
//! #[test]
//! fn queries_agree_with_the_oracle() {
//!     let report = QueryCorrectnessFuzzer::new(FuzzConfig::default().seed(7))
//!         .run()
//!         .unwrap();
//!     assert!(report.is_success());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod oracle;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::oracle::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use oracle::*;
pub use stress::*;
