// Edge Engine — Capability Prober
//
// One-shot description of what this device can do, taken at startup and
// sent with device registration. Each probe runs in isolation: a probe that
// panics or cannot read its source reports false/zero and the rest carry on.
//
//   storage   sysinfo disk holding the data dir + a write test
//   compute   available_parallelism, sysinfo total memory, GPU/NPU nodes,
//             runtime CPU feature detection
//   network   whatever the ConnectivitySource reports

use crate::atoms::traits::ConnectivitySource;
use crate::atoms::types::{
    ComputeCapabilities, DeviceCapabilities, NumericKernels, StorageCapabilities,
};
use log::{info, warn};
use sha2::{Digest, Sha256};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use sysinfo::{Disks, System};

const PROBE_FILE: &str = ".edge-probe";

pub fn probe(data_dir: &Path, connectivity: &dyn ConnectivitySource) -> DeviceCapabilities {
    let caps = DeviceCapabilities {
        storage: guarded("storage", || probe_storage(data_dir)),
        compute: ComputeCapabilities {
            cores: guarded("cores", probe_cores),
            memory_bytes: guarded("memory", probe_memory),
            gpu_acceleration: guarded("gpu", probe_gpu),
            tensor_acceleration: guarded("tensor", probe_tensor),
            numeric_kernels: guarded("numeric kernels", probe_numeric_kernels),
        },
        network: guarded("network", || connectivity.network_info()),
    };
    info!(
        "[probe] {} cores, {} MiB memory, gpu={}, tensor={}, {} MiB free storage",
        caps.compute.cores,
        caps.compute.memory_bytes / (1024 * 1024),
        caps.compute.gpu_acceleration,
        caps.compute.tensor_acceleration,
        caps.storage.available_bytes / (1024 * 1024),
    );
    caps
}

/// Stable hash of the hardware/OS profile. Not an identity: two identical
/// machines share a fingerprint.
pub fn device_fingerprint(caps: &DeviceCapabilities) -> String {
    let mut hasher = Sha256::new();
    hasher.update(std::env::consts::OS.as_bytes());
    hasher.update(b"|");
    hasher.update(std::env::consts::ARCH.as_bytes());
    hasher.update(b"|");
    hasher.update(caps.compute.cores.to_le_bytes());
    hasher.update(b"|");
    hasher.update(caps.compute.memory_bytes.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

fn guarded<T: Default>(name: &str, f: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        warn!("[probe] {} probe panicked, reporting default", name);
        T::default()
    })
}

// ── Storage ────────────────────────────────────────────────────────────────

fn probe_storage(data_dir: &Path) -> StorageCapabilities {
    let (quota_bytes, available_bytes) = disk_space(data_dir).unwrap_or((0, 0));
    StorageCapabilities {
        quota_bytes,
        available_bytes,
        persistence_granted: can_write(data_dir),
    }
}

fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(PROBE_FILE);
    let ok = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}

/// Total and available bytes of the disk holding `dir`: the mounted disk
/// with the longest mount point that is a prefix of the path.
fn disk_space(dir: &Path) -> Option<(u64, u64)> {
    // The data dir may not exist yet; measure its nearest existing ancestor.
    let existing = dir.ancestors().find(|p| p.exists())?;
    let existing = existing.canonicalize().unwrap_or_else(|_| existing.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| existing.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| (disk.total_space(), disk.available_space()))
}

// ── Compute ────────────────────────────────────────────────────────────────

fn probe_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn probe_memory() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.total_memory()
}

fn probe_gpu() -> bool {
    if cfg!(target_os = "macos") {
        // Metal is always present on supported macOS hardware.
        return true;
    }
    ["/dev/dri/renderD128", "/dev/nvidia0", "/dev/kfd"]
        .iter()
        .any(|p| Path::new(p).exists())
}

fn probe_tensor() -> bool {
    std::fs::read_dir("/dev/accel")
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

#[allow(unused_mut)]
fn probe_numeric_kernels() -> NumericKernels {
    let mut kernels = NumericKernels::default();
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        kernels.simd = std::arch::is_x86_feature_detected!("sse4.1");
        kernels.avx2 = std::arch::is_x86_feature_detected!("avx2");
        kernels.fma = std::arch::is_x86_feature_detected!("fma");
    }
    #[cfg(target_arch = "aarch64")]
    {
        kernels.neon = std::arch::is_aarch64_feature_detected!("neon");
        kernels.simd = kernels.neon;
    }
    kernels
}
