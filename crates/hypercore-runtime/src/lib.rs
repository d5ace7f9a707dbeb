//! # hypercore-runtime: The container runtime port
//!
//! A narrow capability set over whatever actually runs workloads:
//! create, delete, list, and inspect. The backend is chosen once at
//! process start, never per call; the agent only ever sees
//! `Arc<dyn ContainerRuntime>`.
//!
//! Failures split into transient (I/O, temporarily unreachable) and
//! terminal (image not found, rejected spec). The agent treats both as
//! terminal for the in-progress operation and re-enters reconciliation
//! for workloads already present in `list()`.

mod error;
mod memory;

pub use error::{Result, RuntimeError};
pub use memory::MemoryRuntime;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;

/// CPU/memory bounds applied at create time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceLimits {
    /// Fraction of the host's cores granted, (0, 1].
    pub cpu_fraction: f64,

    /// Memory ceiling in MiB.
    pub memory_mib: u32,
}

/// Coarse task status as reported by `list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Stopped,
}

/// One entry of the runtime's task listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub id: String,
    pub status: TaskStatus,
}

/// Detail view of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetail {
    /// Labels exactly as supplied at create time; values round-trip
    /// byte-identically.
    pub labels: BTreeMap<String, String>,

    /// The task's primary IPv4 address.
    pub primary_ip: Ipv4Addr,
}

/// The runtime capability set the agent consumes.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates a workload and returns its runtime-assigned id.
    async fn create(
        &self,
        spec: &hypercore_types::VmSpawnRequest,
        labels: BTreeMap<String, String>,
        limits: ResourceLimits,
    ) -> Result<String>;

    /// Deletes a workload, returning its exit code.
    async fn delete(&self, id: &str) -> Result<i32>;

    /// Lists all tasks the runtime knows about.
    async fn list(&self) -> Result<Vec<TaskSummary>>;

    /// Returns labels and primary IP for one task.
    async fn get(&self, id: &str) -> Result<TaskDetail>;
}
