//! A "prelude" for users of the `probe-core` crate.
//!
//! This prelude re-exports the most commonly used traits, structs, and macros
//! so that they can be easily imported.
//!
//! # Example
//!
//! ```
//! use probe_core::prelude::*;
//! ```

pub use crate::{
    // Core structs
    HandlerSet,
    Probe,
    ProbeBuilder,
    ProbeSummary,
    ResponseMeta,
    UrlSink,
    // Core traits
    Fetcher,
    Handler,
    // Essential re-exports for trait implementation
    async_trait,
};

pub use crate::error::ProbeError;
pub use scraper::Html;
pub use serde_json::Value;
