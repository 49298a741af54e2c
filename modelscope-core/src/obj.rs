/// Wavefront OBJ parser (v, vt, vn, f, usemtl, mtllib)
use std::collections::HashMap;

use nom::{
    character::complete::{char, i64 as integer},
    combinator::{all_consuming, opt},
    sequence::{pair, preceded},
    IResult,
};

use crate::error::ParseError;
use crate::geometry::{Mesh, TEXCOORD_ABSENT};

/// One `v/vt/vn` reference from a face, still 1-based or negative-relative.
type RawFaceRef = (i64, Option<i64>, Option<i64>);

/// A face reference resolved to 0-based indices into the parsed attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FaceRef {
    position: usize,
    texcoord: Option<usize>,
    normal: Option<usize>,
}

/// Accumulates attribute pools and unpacked output while walking the lines.
#[derive(Default)]
struct ObjBuilder {
    positions: Vec<[f32; 3]>,
    texcoords: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    normals_numeric: bool,
    missing_normal_reference: bool,

    mesh: Mesh,
    unpacked_texcoords: Vec<Option<[f32; 2]>>,
    unpacked: HashMap<FaceRef, u32>,
    group_by_name: HashMap<String, usize>,
    current_group: Option<usize>,
}

impl ObjBuilder {
    fn new() -> Self {
        Self {
            normals_numeric: true,
            ..Self::default()
        }
    }

    fn select_group(&mut self, name: &str) {
        let index = match self.group_by_name.get(name) {
            Some(&index) => index,
            None => {
                let index = self.mesh.indices_per_material.len();
                self.mesh.indices_per_material.push(Vec::new());
                self.mesh.material_names.push(name.to_string());
                self.group_by_name.insert(name.to_string(), index);
                index
            }
        };
        self.current_group = Some(index);
    }

    fn resolve(&self, line: usize, raw: RawFaceRef) -> Result<FaceRef, ParseError> {
        let (v, vt, vn) = raw;
        Ok(FaceRef {
            position: resolve_index(line, "vertex", v, self.positions.len())?,
            texcoord: vt
                .map(|i| resolve_index(line, "texture coordinate", i, self.texcoords.len()))
                .transpose()?,
            normal: vn
                .map(|i| resolve_index(line, "normal", i, self.normals.len()))
                .transpose()?,
        })
    }

    fn unpack(&mut self, face_ref: FaceRef) -> u32 {
        if let Some(&index) = self.unpacked.get(&face_ref) {
            return index;
        }

        let normal = match face_ref.normal {
            Some(n) => self.normals[n],
            None => {
                self.missing_normal_reference = true;
                [0.0; 3]
            }
        };
        let index = self.mesh.push_vertex(self.positions[face_ref.position], normal);
        self.unpacked_texcoords
            .push(face_ref.texcoord.map(|t| self.texcoords[t]));
        self.unpacked.insert(face_ref, index);
        index
    }

    fn push_face(&mut self, line: usize, refs: &[RawFaceRef]) -> Result<(), ParseError> {
        if refs.len() < 3 {
            return Err(ParseError::at_line(
                line,
                format!("face needs at least 3 vertices, found {}", refs.len()),
            ));
        }

        let mut indices = Vec::with_capacity(refs.len());
        for &raw in refs {
            let face_ref = self.resolve(line, raw)?;
            indices.push(self.unpack(face_ref));
        }

        if self.current_group.is_none() {
            self.select_group("");
        }
        let group = self.current_group.unwrap_or_default();

        // Fan triangulation for polygons.
        let target = &mut self.mesh.indices_per_material[group];
        for i in 2..indices.len() {
            target.extend_from_slice(&[indices[0], indices[i - 1], indices[i]]);
        }
        Ok(())
    }

    fn finish(mut self) -> Mesh {
        if !self.texcoords.is_empty() {
            self.mesh.textures = self
                .unpacked_texcoords
                .iter()
                .flat_map(|uv| uv.unwrap_or([TEXCOORD_ABSENT, TEXCOORD_ABSENT]))
                .collect();
        }

        let reconstruct =
            self.normals.is_empty() || !self.normals_numeric || self.missing_normal_reference;
        if reconstruct {
            log::debug!("OBJ normals absent or incomplete, reconstructing smooth normals");
            self.mesh.compute_vertex_normals();
        }

        // Drop material groups that never received a face.
        let mut mesh = self.mesh;
        let (indices, names): (Vec<_>, Vec<_>) = mesh
            .indices_per_material
            .drain(..)
            .zip(mesh.material_names.drain(..))
            .filter(|(indices, _)| !indices.is_empty())
            .unzip();
        mesh.indices_per_material = indices;
        mesh.material_names = names;
        mesh
    }
}

/// Convert a 1-based (or negative, relative-to-end) OBJ index to 0-based.
fn resolve_index(line: usize, what: &str, raw: i64, len: usize) -> Result<usize, ParseError> {
    let resolved = if raw > 0 {
        raw - 1
    } else if raw < 0 {
        len as i64 + raw
    } else {
        return Err(ParseError::at_line(line, format!("{} index 0 is invalid", what)));
    };

    if resolved < 0 || resolved as usize >= len {
        return Err(ParseError::at_line(
            line,
            format!("{} index {} out of range ({} defined)", what, raw, len),
        ));
    }
    Ok(resolved as usize)
}

/// `v`, `v/vt`, `v//vn` or `v/vt/vn`
fn face_ref(input: &str) -> IResult<&str, RawFaceRef> {
    let (input, v) = integer(input)?;
    let (input, rest) = opt(preceded(
        char('/'),
        pair(opt(integer), opt(preceded(char('/'), integer))),
    ))(input)?;
    let (vt, vn) = rest.unwrap_or((None, None));
    Ok((input, (v, vt, vn)))
}

fn parse_face_refs(line: usize, args: &[&str]) -> Result<Vec<RawFaceRef>, ParseError> {
    args.iter()
        .map(|token| {
            all_consuming(face_ref)(*token)
                .map(|(_, r)| r)
                .map_err(|_| ParseError::at_line(line, format!("malformed face reference '{}'", token)))
        })
        .collect()
}

fn parse_floats(line: usize, args: &[&str]) -> Result<Vec<f32>, ParseError> {
    args.iter()
        .map(|token| {
            token
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseError::at_line(line, format!("'{}' is not a number", token)))
        })
        .collect()
}

/// Parse OBJ text into a mesh with one index group per material.
///
/// Missing or non-numeric normals are reconstructed as smooth vertex normals.
/// Out-of-range face references fail the whole parse.
pub fn parse_obj(text: &str) -> Result<Mesh, ParseError> {
    let mut builder = ObjBuilder::new();

    for (number, raw_line) in text.lines().enumerate() {
        let line = number + 1;
        let content = raw_line.split('#').next().unwrap_or("").trim();
        let mut tokens = content.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        let args: Vec<&str> = tokens.collect();

        match keyword {
            "v" => {
                let values = parse_floats(line, &args)?;
                if values.len() < 3 {
                    return Err(ParseError::at_line(line, "vertex needs 3 coordinates"));
                }
                builder.positions.push([values[0], values[1], values[2]]);
            }
            "vt" => {
                let values = parse_floats(line, &args)?;
                let u = values.first().copied().ok_or_else(|| {
                    ParseError::at_line(line, "texture coordinate needs at least 1 value")
                })?;
                let v = values.get(1).copied().unwrap_or(0.0);
                builder.texcoords.push([u, v]);
            }
            "vn" => {
                let values: Vec<f32> = args
                    .iter()
                    .filter_map(|t| t.parse::<f32>().ok())
                    .filter(|v| v.is_finite())
                    .collect();
                if values.len() < 3 || values.len() != args.len() {
                    if builder.normals_numeric {
                        log::warn!("line {}: non-numeric vertex normal, normals will be recomputed", line);
                    }
                    builder.normals_numeric = false;
                    builder.normals.push([0.0; 3]);
                } else {
                    builder.normals.push([values[0], values[1], values[2]]);
                }
            }
            "f" => {
                let refs = parse_face_refs(line, &args)?;
                builder.push_face(line, &refs)?;
            }
            "usemtl" => builder.select_group(&args.join(" ")),
            "mtllib" => builder
                .mesh
                .material_libraries
                .extend(args.iter().map(|s| s.to_string())),
            other => log::debug!("line {}: ignoring OBJ directive '{}'", line, other),
        }
    }

    let mesh = builder.finish();
    log::info!(
        "Parsed OBJ: {} vertices, {} triangles, {} material groups",
        mesh.vertex_count(),
        mesh.triangle_count(),
        mesh.indices_per_material.len()
    );
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
# a unit quad in the xy plane
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";

    fn assert_unit_normals(mesh: &Mesh) {
        for n in mesh.vertex_normals.chunks_exact(3) {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-5, "normal {:?} has length {}", n, len);
        }
    }

    #[test]
    fn test_quad_is_fan_triangulated() {
        let mesh = parse_obj(QUAD).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.indices_per_material, vec![vec![0, 1, 2, 0, 2, 3]]);
        assert_eq!(mesh.material_names, vec![String::new()]);
        assert!(mesh.textures.is_empty());
    }

    #[test]
    fn test_missing_normals_are_reconstructed() {
        let mesh = parse_obj(QUAD).unwrap();
        assert_unit_normals(&mesh);
        for i in 0..4 {
            assert!((mesh.normal(i).z - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_tetrahedron_normals_unit() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 0 0 1
f 1 3 2
f 1 2 4
f 1 4 3
f 2 3 4
";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.triangle_count(), 4);
        assert_unit_normals(&mesh);
    }

    #[test]
    fn test_supplied_normals_used_as_is() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
vn 0.6 0.8 0
f 1//1 2//1 3//1
";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.normal(0).as_slice(), &[0.6, 0.8, 0.0]);
    }

    #[test]
    fn test_non_numeric_normals_trigger_reconstruction() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
vn nan? 0 1
f 1//1 2//1 3//1
";
        let mesh = parse_obj(text).unwrap();
        assert!((mesh.normal(0).z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_texcoords_and_sentinel() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0.25 0.75
f 1/1 2 3
";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.textures.len(), mesh.vertex_count() * 2);
        assert_eq!(&mesh.textures[0..2], &[0.25, 0.75]);
        assert!(mesh.textures[2].is_nan());
    }

    #[test]
    fn test_distinct_references_unpack_to_distinct_vertices() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
vt 0 0
vt 1 1
f 1/1 2/1 3/1
f 1/2 3/1 2/1
";
        let mesh = parse_obj(text).unwrap();
        // 1/1, 2/1, 3/1 shared; 1/2 is new
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_usemtl_groups_and_mtllib() {
        let text = "\
mtllib fox.mtl
v 0 0 0
v 1 0 0
v 0 1 0
usemtl Fur
f 1 2 3
usemtl Eyes
f 3 2 1
usemtl Fur
f 1 3 2
";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.material_libraries, vec!["fox.mtl".to_string()]);
        assert_eq!(mesh.material_names, vec!["Fur".to_string(), "Eyes".to_string()]);
        assert_eq!(mesh.indices_per_material[0].len(), 6);
        assert_eq!(mesh.indices_per_material[1].len(), 3);
    }

    #[test]
    fn test_negative_indices() {
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
f -3 -2 -1
";
        let mesh = parse_obj(text).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.position(2).y, 1.0);
    }

    #[test]
    fn test_out_of_range_face_fails_with_line() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n";
        let err = parse_obj(text).unwrap_err();
        assert_eq!(
            err,
            ParseError::at_line(4, "vertex index 9 out of range (3 defined)")
        );
    }

    #[test]
    fn test_malformed_vertex_fails() {
        assert!(parse_obj("v 0 zero 0\n").is_err());
        assert!(parse_obj("v 0 0 0\nf 1/x 1 1\n").is_err());
        assert!(parse_obj("v 0 0 0\nv 1 0 0\nf 1 2\n").is_err());
    }

    #[test]
    fn test_unknown_directives_ignored() {
        let text = "o thing\ng part\ns off\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        assert_eq!(parse_obj(text).unwrap().triangle_count(), 1);
    }
}
