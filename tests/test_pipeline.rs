// tests/test_pipeline.rs — CPU side of the recovery flow, plus GPU-gated
// smoke tests (run with `cargo test -- --ignored` on a machine with a
// Vulkan device).

use unveil::gpu::runner::{recover_indices, scramble_indices, RunConfig};
use unveil::mesh::Mesh;

fn tetrahedron() -> Mesh {
    Mesh::parse_obj_str(
        "v 0 0 0\n\
         v 1 0 0\n\
         v 0 1 0\n\
         v 0 0 1\n\
         f 1 2 3\n\
         f 1 2 4\n\
         f 1 3 4\n\
         f 2 3 4\n",
    )
    .unwrap()
}

#[test]
fn scramble_then_recover_round_trips_through_obj_text() {
    let plain = tetrahedron();

    // Pack: scramble the indices and serialize, as the packer did.
    let scrambled = Mesh {
        positions: plain.positions.clone(),
        faces: plain.rebuild_faces(&scramble_indices(&plain, 1337)),
    };
    let shipped = scrambled.to_obj_string();

    // Recover: parse the shipped asset and deshuffle.
    let loaded = Mesh::parse_obj_str(&shipped).unwrap();
    let recovered = loaded.rebuild_faces(&recover_indices(&loaded, 1337));
    assert_eq!(recovered, plain.faces);
}

#[test]
fn sizes_derive_from_the_loaded_mesh() {
    let mesh = tetrahedron();
    assert_eq!(mesh.points().len(), mesh.positions.len());
    assert_eq!(mesh.flat_indices().len(), 12);
    // 4 vertices → 16-byte elements → 64 bytes staged.
    assert_eq!(bytemuck::cast_slice::<_, u8>(&mesh.points()).len(), 64);
}

#[test]
fn config_key_is_a_run_parameter() {
    let mesh = tetrahedron();
    let with_default = recover_indices(&mesh, RunConfig::default().key);
    let with_other = recover_indices(&mesh, 42);
    assert_ne!(with_default, with_other);
}

// ===== GPU-gated =====

#[test]
#[ignore = "requires a Vulkan device"]
fn staging_round_trip_on_real_device() {
    use ash::vk;
    use unveil::gpu::buffer::BufferManager;
    use unveil::gpu::context::DeviceContext;

    let ctx = DeviceContext::new(true).expect("need a Vulkan device");
    let manager = BufferManager::new(&ctx);

    let payload: Vec<u8> = (0..1588u32 * 16).map(|i| (i % 255) as u8).collect();
    let buffer = manager
        .upload(vk::BufferUsageFlags::TRANSFER_SRC, &payload)
        .expect("upload");
    assert_eq!(manager.download(&buffer).expect("download"), payload);
}
