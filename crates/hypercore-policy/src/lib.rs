//! # hypercore-policy: Admission and placement policy
//!
//! A policy has a mode, a hard filter over peer telemetry, descriptor
//! rules for admission, and a scoring vector for placement:
//! - [`Policy::can_spawn`] gates a descriptor before any cluster work
//! - [`Policy::select_nodes`] ranks candidate nodes by weighted,
//!   min-max-normalized telemetry
//!
//! In `permissive` mode admission always passes and the hard filter is
//! skipped, but scoring still ranks. The policy is a leaf: it holds no
//! references back into the agent.

mod evaluator;
mod policy;

pub use evaluator::Admission;
pub use policy::{HardFilter, Policy, PolicyError, PolicyMode, Result, ScoreWeights, SpawnRules};
