//! In-process runtime backend.
//!
//! Runs nothing: tasks are bookkeeping entries with loopback IPs. Used
//! for development single-node clusters and throughout the test suite.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use hypercore_types::VmSpawnRequest;

use crate::error::{Result, RuntimeError};
use crate::{ContainerRuntime, ResourceLimits, TaskDetail, TaskStatus, TaskSummary};

#[derive(Debug, Clone)]
struct Task {
    labels: BTreeMap<String, String>,
    primary_ip: Ipv4Addr,
    status: TaskStatus,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: BTreeMap<String, Task>,
    rejected_images: Vec<String>,
    next_ip_octet: u8,
}

/// The in-process development backend.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    inner: Mutex<Inner>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an image reference as unresolvable; subsequent creates for
    /// it fail with [`RuntimeError::ImageNotFound`].
    pub fn reject_image(&self, image_ref: impl Into<String>) {
        self.inner
            .lock()
            .expect("runtime state poisoned")
            .rejected_images
            .push(image_ref.into());
    }

    /// Flips a task to stopped, as an exited workload would appear.
    pub fn stop_task(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().expect("runtime state poisoned");
        match inner.tasks.get_mut(id) {
            Some(task) => {
                task.status = TaskStatus::Stopped;
                true
            }
            None => false,
        }
    }

    /// Number of tasks currently tracked.
    pub fn task_count(&self) -> usize {
        self.inner.lock().expect("runtime state poisoned").tasks.len()
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn create(
        &self,
        spec: &VmSpawnRequest,
        labels: BTreeMap<String, String>,
        limits: ResourceLimits,
    ) -> Result<String> {
        let mut inner = self.inner.lock().expect("runtime state poisoned");

        if inner.rejected_images.iter().any(|i| *i == spec.image_ref) {
            return Err(RuntimeError::ImageNotFound(spec.image_ref.clone()));
        }
        if limits.cpu_fraction <= 0.0 || limits.cpu_fraction > 1.0 {
            return Err(RuntimeError::RejectedSpec(format!(
                "cpu fraction {} out of range",
                limits.cpu_fraction
            )));
        }

        let id = Uuid::new_v4().simple().to_string()[..12].to_string();
        inner.next_ip_octet = inner.next_ip_octet.wrapping_add(1).max(2);
        let primary_ip = Ipv4Addr::new(127, 0, 1, inner.next_ip_octet);

        inner.tasks.insert(
            id.clone(),
            Task {
                labels,
                primary_ip,
                status: TaskStatus::Running,
            },
        );

        info!(%id, image = %spec.image_ref, %primary_ip, "task created");
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<i32> {
        let mut inner = self.inner.lock().expect("runtime state poisoned");
        match inner.tasks.remove(id) {
            Some(_) => {
                info!(%id, "task deleted");
                Ok(0)
            }
            None => Err(RuntimeError::NotFound(id.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<TaskSummary>> {
        let inner = self.inner.lock().expect("runtime state poisoned");
        Ok(inner
            .tasks
            .iter()
            .map(|(id, task)| TaskSummary {
                id: id.clone(),
                status: task.status,
            })
            .collect())
    }

    async fn get(&self, id: &str) -> Result<TaskDetail> {
        let inner = self.inner.lock().expect("runtime state poisoned");
        inner
            .tasks
            .get(id)
            .map(|task| TaskDetail {
                labels: task.labels.clone(),
                primary_ip: task.primary_ip,
            })
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }
}
