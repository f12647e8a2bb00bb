//! Differential privacy for released counts
//!
//! Raw check counts never leave a report unprotected. Before a count is stored
//! as an obfuscated value it passes through the [`NoiseMechanism`], which
//! applies the Laplace mechanism and then suppresses small cohorts:
//!
//! ```text
//! raw count ──▶ + Laplace(0, sensitivity/ε) ──▶ clamp ≥ 0 ──▶ < 10.0 ? 0.0 : value
//! ```
//!
//! The randomness is injected through [`UniformSource`] so that checks and the
//! mechanism itself can be tested deterministically.

pub mod noise;

pub use noise::{LOW_COUNT_THRESHOLD, NoiseMechanism, OsUniformSource, UniformSource};
