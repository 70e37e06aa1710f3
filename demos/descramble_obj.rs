// demos/descramble_obj.rs — end-to-end asset recovery from the command line.
//
// Usage:
//   cargo run --example descramble_obj -- <model.obj> <kernel.spv> [key] [out.obj]
//
// Loads the scrambled OBJ, runs the inverse compute kernel over its vertex
// positions on the first compute-capable Vulkan device, deshuffles the face
// indices with the given key (default 1337) and writes the recovered mesh.

use std::env;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Cursor};
use std::process::ExitCode;

use unveil::gpu::runner::{descramble, RunConfig};
use unveil::mesh::Mesh;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <model.obj> <kernel.spv> [key] [out.obj]", args[0]);
        return ExitCode::FAILURE;
    }
    let obj_path = &args[1];
    let shader_path = &args[2];
    let key: i32 = match args.get(3) {
        Some(raw) => match raw.parse() {
            Ok(key) => key,
            Err(_) => {
                eprintln!("[unveil] bad key '{raw}'");
                return ExitCode::FAILURE;
            }
        },
        None => RunConfig::default().key,
    };
    let out_path = args.get(4).map(String::as_str).unwrap_or("Recovered.obj");

    let mesh = match File::open(obj_path).map_err(|e| e.to_string()).and_then(|f| {
        Mesh::parse_obj(BufReader::new(f)).map_err(|e| e.to_string())
    }) {
        Ok(mesh) => mesh,
        Err(e) => {
            eprintln!("[unveil] failed to load {obj_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!(
        "[unveil] loaded {}: {} vertices, {} faces, {} flattened indices",
        obj_path,
        mesh.positions.len(),
        mesh.faces.len(),
        mesh.flat_indices().len()
    );

    let shader_words = match fs::read(shader_path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| {
            ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| e.to_string())
        }) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("[unveil] failed to load {shader_path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = RunConfig { key, validation: true };
    let recovered = match descramble(&mesh, &shader_words, &config) {
        Ok(recovered) => recovered,
        Err(e) => {
            eprintln!("[unveil] recovery failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let out = match File::create(out_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("[unveil] cannot create {out_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = recovered.write_obj(BufWriter::new(out)) {
        eprintln!("[unveil] write failed: {e}");
        return ExitCode::FAILURE;
    }

    eprintln!("[unveil] recovered mesh written to {out_path}");
    ExitCode::SUCCESS
}
