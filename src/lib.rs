// unveil — headless Vulkan compute recovery of keyed-shuffled mesh assets.
//
// A family of OBJ assets ships with two layers of obfuscation applied by the
// original .NET packer: vertex positions are transformed by an opaque compute
// kernel (the inverse kernel is supplied as a pre-compiled SPIR-V blob), and
// the flattened face-index list is permuted by a keyed Fisher–Yates shuffle.
// This crate runs the inverse kernel through a single synchronous Vulkan
// compute dispatch and replays the keyed shuffle in reverse on the CPU.
//
// Layering (leaf-first):
//
//   rng      — bit-compatible port of the packer's pseudo-random generator
//   permute  — keyed exchange sequences, shuffle/deshuffle
//   mesh     — minimal OBJ in/out, point and index extraction
//   gpu      — Vulkan device/buffer/dispatch plumbing (all unsafe lives here)
//
// The GPU layer is a single-dispatch, single-queue design: every submission
// blocks on queue-idle before the host continues. There is no frame loop and
// no presentation — the crate is compute-only.

pub mod gpu;
pub mod mesh;
pub mod permute;
pub mod rng;
