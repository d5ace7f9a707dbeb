//! Local admission: host capacity guards.

use std::collections::BTreeMap;

use tracing::warn;

use hypercore_runtime::{ContainerRuntime, TaskStatus};
use hypercore_types::{SPAWN_REQUEST_LABEL, VmSpawnRequest};

/// Cores the host can schedule.
pub(crate) fn host_cores(override_cores: Option<u32>) -> u32 {
    override_cores.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1)
    })
}

/// `MemAvailable` in MiB, where the platform exposes it.
#[cfg(target_os = "linux")]
pub(crate) fn mem_available_mib() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kib: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kib / 1024);
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn mem_available_mib() -> Option<u64> {
    None
}

/// Cores and memory already committed to live tasks, summed from their
/// stored descriptor labels.
pub(crate) async fn committed_resources(
    runtime: &dyn ContainerRuntime,
) -> Result<(u32, u64), hypercore_runtime::RuntimeError> {
    let mut cores = 0u32;
    let mut memory_mib = 0u64;

    for task in runtime.list().await? {
        if task.status != TaskStatus::Running {
            continue;
        }
        let Ok(detail) = runtime.get(&task.id).await else {
            continue;
        };
        if let Some(spec) = stored_spec(&detail.labels) {
            cores = cores.saturating_add(spec.cores);
            memory_mib = memory_mib.saturating_add(u64::from(spec.memory_mib));
        }
    }

    Ok((cores, memory_mib))
}

/// The descriptor a workload was spawned from, out of its labels.
pub(crate) fn stored_spec(labels: &BTreeMap<String, String>) -> Option<VmSpawnRequest> {
    labels
        .get(SPAWN_REQUEST_LABEL)
        .and_then(|value| VmSpawnRequest::from_label_value(value))
}

/// Checks a descriptor against local capacity.
///
/// Core exhaustion rejects; memory beyond `MemAvailable` only warns.
/// Port validation happens first so a bad mapping never reaches the
/// runtime.
pub(crate) async fn admit(
    runtime: &dyn ContainerRuntime,
    spec: &VmSpawnRequest,
    capacity_override: Option<u32>,
) -> Result<(), String> {
    if let Some(port) = spec.invalid_port() {
        return Err(format!("port {port} out of range [1, 65535]"));
    }

    let capacity = host_cores(capacity_override);
    let (used_cores, _used_memory) = committed_resources(runtime)
        .await
        .map_err(|e| format!("capacity check failed: {e}"))?;

    if used_cores + spec.cores > capacity {
        return Err(format!(
            "insufficient cores: {used_cores} in use + {} requested > {capacity} available",
            spec.cores
        ));
    }

    if let Some(available) = mem_available_mib() {
        if u64::from(spec.memory_mib) > available {
            warn!(
                requested_mib = spec.memory_mib,
                available_mib = available,
                "requested memory exceeds MemAvailable"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypercore_runtime::{MemoryRuntime, ResourceLimits};

    fn spec(cores: u32) -> VmSpawnRequest {
        VmSpawnRequest {
            cores,
            memory_mib: 128,
            image_ref: "nginx".to_string(),
            ..VmSpawnRequest::default()
        }
    }

    async fn occupy(runtime: &MemoryRuntime, cores: u32) {
        let spec = spec(cores);
        let labels: BTreeMap<_, _> =
            [(SPAWN_REQUEST_LABEL.to_string(), spec.to_label_value())].into();
        runtime
            .create(
                &spec,
                labels,
                ResourceLimits {
                    cpu_fraction: 0.5,
                    memory_mib: 128,
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_admits_within_capacity() {
        let runtime = MemoryRuntime::new();
        assert!(admit(&runtime, &spec(2), Some(4)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_core_exhaustion() {
        let runtime = MemoryRuntime::new();
        occupy(&runtime, 3).await;

        let err = admit(&runtime, &spec(2), Some(4)).await.unwrap_err();
        assert!(err.contains("insufficient cores"));
        assert!(err.contains("3 in use"));
    }

    #[tokio::test]
    async fn test_rejects_invalid_port() {
        let runtime = MemoryRuntime::new();
        let mut bad = spec(1);
        bad.ports.insert(99_999, 80);

        let err = admit(&runtime, &bad, Some(4)).await.unwrap_err();
        assert!(err.contains("99999"));
    }

    #[tokio::test]
    async fn test_tasks_without_label_do_not_count() {
        let runtime = MemoryRuntime::new();
        runtime
            .create(
                &spec(3),
                BTreeMap::new(),
                ResourceLimits {
                    cpu_fraction: 0.5,
                    memory_mib: 128,
                },
            )
            .await
            .unwrap();

        // No stored descriptor, so nothing is counted against capacity.
        assert!(admit(&runtime, &spec(4), Some(4)).await.is_ok());
    }

    #[test]
    fn test_host_cores_override() {
        assert_eq!(host_cores(Some(7)), 7);
        assert!(host_cores(None) >= 1);
    }
}
