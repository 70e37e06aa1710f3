// mesh.rs — minimal Wavefront OBJ mesh and the two views the pipeline needs.
//
// RESPONSIBILITIES
// ─────────────────
// 1. `Mesh` — positions plus per-face index lists, parsed from OBJ text.
// 2. `Mesh::points()` — the vertex positions padded to vec4, the exact byte
//    layout the compute kernel reads (binding 0) and writes (binding 1).
// 3. `Mesh::flat_indices()` — the face-vertex references flattened in
//    declaration order: the payload the keyed permutation operates on.
// 4. OBJ serialization for the recovered mesh.
//
// INDEX HANDLING
// ───────────────
// Face indices are carried exactly as written in the file — 1-based, never
// translated. The permutation treats them as opaque integers, and the
// recovered mesh must serialize them byte-for-byte as the packer originally
// emitted them; normalising to 0-based and back would only add a place for
// an off-by-one to hide.
//
// Only `v` and `f` directives are interpreted. Everything else (`o`, `vn`,
// `vt`, `s`, comments, blank lines) is skipped, matching what the packer's
// loader did with these assets.

use std::fmt;
use std::io::{self, BufRead, Write};

use bytemuck::{Pod, Zeroable};

/// One vertex position padded to 16 bytes: `(x, y, z, 0.0)`.
///
/// `#[repr(C)]` + `Pod` so a `&[Point]` casts directly to the byte slice
/// handed to the staging upload. Matches the kernel's `vec4` element stride.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Point { x, y, z, w: 0.0 }
    }
}

/// A loaded mesh: ordered vertex positions and ordered faces, each face an
/// ordered list of vertex-index references as written in the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub faces: Vec<Vec<u32>>,
}

/// OBJ parse failure: 1-based source line plus what went wrong there.
#[derive(Debug)]
pub struct MeshError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OBJ line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for MeshError {}

impl MeshError {
    fn at(line: usize, message: impl Into<String>) -> Self {
        MeshError {
            line,
            message: message.into(),
        }
    }
}

impl Mesh {
    /// Parse OBJ text from a buffered reader.
    ///
    /// Recognises `v x y z` (extra components ignored) and `f a b c ...`
    /// where each reference may be `i`, `i/t`, `i/t/n` or `i//n` — only the
    /// vertex index is kept. Faces need at least three references.
    ///
    /// # Errors
    /// Returns [`MeshError`] with the offending line number on malformed
    /// `v`/`f` directives or on I/O failure.
    pub fn parse_obj(reader: impl BufRead) -> Result<Mesh, MeshError> {
        let mut positions = Vec::new();
        let mut faces = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let lineno = idx + 1;
            let line = line.map_err(|e| MeshError::at(lineno, format!("read failed: {e}")))?;
            let mut parts = line.split_whitespace();

            match parts.next() {
                Some("v") => {
                    let mut coord = [0f32; 3];
                    for c in &mut coord {
                        let tok = parts
                            .next()
                            .ok_or_else(|| MeshError::at(lineno, "vertex needs 3 coordinates"))?;
                        *c = tok.parse().map_err(|_| {
                            MeshError::at(lineno, format!("bad coordinate '{tok}'"))
                        })?;
                    }
                    positions.push(coord);
                }
                Some("f") => {
                    let mut face = Vec::new();
                    for tok in parts {
                        // "i", "i/t", "i/t/n", "i//n" — vertex index first.
                        let vert = tok.split('/').next().unwrap_or(tok);
                        let index: u32 = vert.parse().map_err(|_| {
                            MeshError::at(lineno, format!("bad face index '{tok}'"))
                        })?;
                        face.push(index);
                    }
                    if face.len() < 3 {
                        return Err(MeshError::at(lineno, "face needs at least 3 indices"));
                    }
                    faces.push(face);
                }
                _ => {} // o, vn, vt, s, #, blank — skipped
            }
        }

        Ok(Mesh { positions, faces })
    }

    /// Parse OBJ text held in memory.
    pub fn parse_obj_str(text: &str) -> Result<Mesh, MeshError> {
        Self::parse_obj(io::Cursor::new(text))
    }

    /// Vertex positions padded to vec4 — the compute pass's input buffer,
    /// one 16-byte element per vertex.
    pub fn points(&self) -> Vec<Point> {
        self.positions
            .iter()
            .map(|&[x, y, z]| Point::new(x, y, z))
            .collect()
    }

    /// Face-vertex references flattened across all faces in declaration
    /// order. This is the sequence the keyed permutation scrambles.
    pub fn flat_indices(&self) -> Vec<u32> {
        self.faces.iter().flatten().copied().collect()
    }

    /// Rebuild the per-face structure from a flat index list, using this
    /// mesh's own face arities. Inverse of [`flat_indices`] — the total
    /// length must match.
    ///
    /// [`flat_indices`]: Mesh::flat_indices
    pub fn rebuild_faces(&self, flat: &[u32]) -> Vec<Vec<u32>> {
        debug_assert_eq!(
            flat.len(),
            self.faces.iter().map(Vec::len).sum::<usize>(),
            "flat index count must match the mesh's face arities"
        );
        let mut cursor = 0;
        self.faces
            .iter()
            .map(|face| {
                let chunk = flat[cursor..cursor + face.len()].to_vec();
                cursor += face.len();
                chunk
            })
            .collect()
    }

    /// Serialize as OBJ text: one object, positions at 6 decimal places,
    /// face indices written exactly as stored.
    pub fn write_obj(&self, mut out: impl Write) -> io::Result<()> {
        writeln!(out, "o Model")?;
        for &[x, y, z] in &self.positions {
            writeln!(out, "v {x:.6} {y:.6} {z:.6}")?;
        }
        for face in &self.faces {
            write!(out, "f")?;
            for index in face {
                write!(out, " {index}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// [`write_obj`] into a `String`.
    ///
    /// [`write_obj`]: Mesh::write_obj
    pub fn to_obj_string(&self) -> String {
        let mut buf = Vec::new();
        self.write_obj(&mut buf).expect("writing to a Vec cannot fail");
        String::from_utf8(buf).expect("OBJ output is ASCII")
    }
}
