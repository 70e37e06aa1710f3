// gpu/mod.rs — Vulkan plumbing for the single compute dispatch.
//
// Everything here is a thin, explicitly-ordered wrapper over raw `ash`
// calls. The split mirrors the resource lifecycle:
//
//   context  — instance, validation layer, physical/logical device, queue,
//              command pool
//   buffer   — device buffers, memory-type selection, staged host↔device
//              transfers
//   dispatch — descriptor set, compute pipeline, command recording and
//              synchronous submission
//   runner   — orchestration: wires the above into the recover-a-mesh flow
//
// OWNERSHIP MODEL
// ────────────────
// Every Vulkan handle is wrapped in exactly one owning struct whose `Drop`
// releases it, children before parents (command buffers before their pool,
// the descriptor set via its pool, pipeline before layout). No handle is
// ever shared between owners; the runner controls teardown order purely
// through field declaration order. All `unsafe` stays inside this module —
// the permutation engine and mesh code never see a raw handle.
//
// SYNCHRONISATION
// ────────────────
// There is none to speak of: both the staging copy and the compute dispatch
// submit one command buffer and block on queue-idle. No fences, no
// semaphores, no frames in flight. A driver hang blocks the run forever;
// that is accepted for a one-shot offline tool.

pub mod buffer;
pub mod context;
pub mod dispatch;
pub mod runner;

use std::fmt;

use ash::vk;

/// Errors from the GPU layer. Every native failure is fatal — there is no
/// retry anywhere; a failing driver call means the environment is broken
/// and the run aborts with the operation name and status code.
#[derive(Debug)]
pub enum GpuError {
    /// The Vulkan loader itself could not be found/loaded.
    Loader(ash::LoadingError),
    /// A native call returned non-success. Carries the entry point name and
    /// the raw status code for diagnosis.
    Setup {
        op: &'static str,
        result: vk::Result,
    },
    /// Zero physical devices, or none exposing a compute queue family.
    NoSuitableDevice,
    /// No memory type satisfies both the requirement bits and the requested
    /// property flags.
    NoSuitableMemoryType,
}

impl GpuError {
    pub(crate) fn setup(op: &'static str, result: vk::Result) -> Self {
        GpuError::Setup { op, result }
    }
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::Loader(e) => write!(f, "Vulkan loader unavailable: {e}"),
            GpuError::Setup { op, result } => write!(f, "{op} failed: {result:?}"),
            GpuError::NoSuitableDevice => {
                write!(f, "no physical device with a compute-capable queue family")
            }
            GpuError::NoSuitableMemoryType => {
                write!(f, "no memory type satisfies the requested property flags")
            }
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::Loader(e) => Some(e),
            _ => None,
        }
    }
}
