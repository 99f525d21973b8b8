//! # Flowline Engine
//!
//! Client for the flow execution engine: definition inspection, language
//! rewriting, simulation sessions and PO translation catalogs.

pub mod client;
pub mod error;
pub mod po;
pub mod simulate;

pub use client::{EngineClient, HttpEngineClient};
pub use error::{EngineError, EngineResult};
pub use po::{parse_info, PoInfo};
