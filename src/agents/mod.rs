//! Agents shipped with the crate
//!
//! - [`MathAgent`]: arithmetic and percentages, type `math`
//! - [`EchoAgent`]: returns the command text, a typical fallback
//! - [`HttpAgent`]: forwards the command to a remote JSON endpoint

pub mod echo;
pub mod http;
pub mod math;

pub use echo::EchoAgent;
pub use http::{HttpAgent, HttpAgentConfig};
pub use math::MathAgent;
