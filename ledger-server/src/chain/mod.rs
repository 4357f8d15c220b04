//! Per-tenant cryptographic hash chain
//!
//! ```text
//! genesis(tenant) → event₀ → event₁ → ... → eventₙ
//! ```
//!
//! `hash` holds the digest formula; `engine` owns the cached chain
//! position per tenant and the single-cursor-per-tenant discipline.

pub mod engine;
pub mod hash;

pub use engine::HashChainEngine;
pub use hash::{chain_hash, genesis_hash};
