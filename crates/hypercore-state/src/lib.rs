//! # hypercore-state: State digests
//!
//! Keeps gossip traffic proportional to change, not to time:
//! - [`state_hash`] fingerprints a workload set; unchanged digests are
//!   never rebroadcast
//! - [`fragment`] splits large digests to respect the user-event size
//!   cap
//! - [`Reassembler`] rebuilds fragmented digests on the receiving side

mod digest;
mod reassembly;

pub use digest::{BATCH_SIZE, fragment, state_hash};
pub use reassembly::Reassembler;
