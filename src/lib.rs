//! Poxide: a vulnerability detection engine driven by declarative YAML
//! proof-of-concept templates.
//!
//! A template describes a chain of HTTP probes with matchers and
//! extractors over the responses; the engine runs the chain against a
//! target, threading extracted values through an expression environment,
//! and emits a verdict with evidence.
//!
//! ```no_run
//! use poxide::controller::{Controller, Mode};
//!
//! # async fn demo() -> poxide::errors::Result<()> {
//! let controller = Controller::new();
//! controller.load_poc(std::path::Path::new("pocs/cve-2024-0001.yaml"))?;
//! let output = controller
//!     .execute_poc("cve-2024-0001", "http://target.example", Mode::Verify)
//!     .await?;
//! println!("{output}");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod controller;
pub mod engine;
pub mod errors;
pub mod expr;
pub mod http;
pub mod output;
pub mod providers;
pub mod registry;
pub mod template;

pub use controller::{Controller, Mode};
pub use errors::{PoxideError, Result};
pub use output::Output;
pub use template::Template;
