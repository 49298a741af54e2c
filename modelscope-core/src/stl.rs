/// STL file parser for binary and ASCII formats
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{multispace0, multispace1, space1},
    combinator::{all_consuming, eof, map, rest, value},
    number::complete::float,
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::error::ParseError;
use crate::geometry::Mesh;

/// Size of the (ignored) binary header.
pub const HEADER_LEN: usize = 80;
/// Header plus the little-endian u32 triangle count.
pub const PREAMBLE_LEN: usize = HEADER_LEN + 4;
/// Normal + 3 vertices (12 f32) + 2 attribute bytes.
pub const FACET_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StlFormat {
    Binary,
    Ascii,
}

/// Classify a file by its first (up to) 80 bytes: ASCII iff the trimmed
/// text starts with `solid`.
///
/// Binary files whose header happens to begin with "solid" are
/// misclassified as ASCII and then rejected as malformed; there is no
/// fallback.
pub fn detect_format(data: &[u8]) -> StlFormat {
    let header = &data[..data.len().min(HEADER_LEN)];
    if String::from_utf8_lossy(header).trim().starts_with("solid") {
        StlFormat::Ascii
    } else {
        StlFormat::Binary
    }
}

/// STL is z-up; the renderer is y-up. Swapping y and z maps one to the other
/// and is its own inverse, so the exporter applies the same swap.
pub fn swap_yz([x, y, z]: [f32; 3]) -> [f32; 3] {
    [x, z, y]
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn read_vec3(data: &[u8], offset: usize) -> [f32; 3] {
    [
        read_f32(data, offset),
        read_f32(data, offset + 4),
        read_f32(data, offset + 8),
    ]
}

fn read_finite_vec3(data: &[u8], offset: usize) -> Result<[f32; 3], ParseError> {
    let v = read_vec3(data, offset);
    if v.iter().all(|c| c.is_finite()) {
        Ok(v)
    } else {
        Err(ParseError::at_offset(offset, "non-finite coordinate"))
    }
}

/// Parse a binary STL file
pub fn parse_binary_stl(data: &[u8]) -> Result<Mesh, ParseError> {
    if data.len() < PREAMBLE_LEN {
        return Err(ParseError::at_offset(
            data.len(),
            format!("file too small to be a binary STL ({} bytes)", data.len()),
        ));
    }

    let triangle_count =
        u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    let expected = triangle_count
        .checked_mul(FACET_LEN)
        .and_then(|len| len.checked_add(PREAMBLE_LEN))
        .ok_or_else(|| {
            ParseError::at_offset(HEADER_LEN, format!("triangle count {} too large", triangle_count))
        })?;
    if data.len() < expected {
        let complete = (data.len() - PREAMBLE_LEN) / FACET_LEN;
        return Err(ParseError::at_offset(
            PREAMBLE_LEN + complete * FACET_LEN,
            format!(
                "unexpected end of file: header declares {} triangles, found {}",
                triangle_count, complete
            ),
        ));
    }

    let mut mesh = Mesh::single_group(triangle_count * 3);
    let mut offset = PREAMBLE_LEN;

    for _ in 0..triangle_count {
        let normal = swap_yz(read_finite_vec3(data, offset)?);
        offset += 12;

        // Every facet gets three fresh vertices carrying the facet normal.
        for _ in 0..3 {
            let position = swap_yz(read_finite_vec3(data, offset)?);
            let index = mesh.push_vertex(position, normal);
            mesh.indices_per_material[0].push(index);
            offset += 12;
        }

        // Skip attribute byte count (2 bytes)
        offset += 2;
    }

    Ok(mesh)
}

/// One meaningful ASCII STL line.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StlLine {
    Solid,
    FacetNormal([f32; 3]),
    OuterLoop,
    Vertex([f32; 3]),
    EndLoop,
    EndFacet,
    EndSolid,
}

fn parse_vector3(input: &str) -> IResult<&str, [f32; 3]> {
    map(
        tuple((
            preceded(multispace1, float),
            preceded(multispace1, float),
            preceded(multispace1, float),
        )),
        |(x, y, z)| [x, y, z],
    )(input)
}

/// Optional name after `solid`/`endsolid`, separated by blanks.
fn solid_name(input: &str) -> IResult<&str, &str> {
    alt((preceded(space1, rest), eof))(input)
}

fn parse_line(input: &str) -> IResult<&str, StlLine> {
    alt((
        map(
            preceded(tuple((tag("facet"), multispace1, tag("normal"))), parse_vector3),
            StlLine::FacetNormal,
        ),
        map(preceded(tag("vertex"), parse_vector3), StlLine::Vertex),
        value(StlLine::OuterLoop, tuple((tag("outer"), multispace1, tag("loop")))),
        value(StlLine::EndLoop, tag("endloop")),
        value(StlLine::EndFacet, tag("endfacet")),
        value(StlLine::EndSolid, terminated(tag("endsolid"), solid_name)),
        value(StlLine::Solid, terminated(tag("solid"), solid_name)),
    ))(input)
}

fn finite(line: usize, v: [f32; 3]) -> Result<[f32; 3], ParseError> {
    if v.iter().all(|c| c.is_finite()) {
        Ok(v)
    } else {
        Err(ParseError::at_line(line, "non-finite coordinate"))
    }
}

/// Parse an ASCII STL file
pub fn parse_ascii_stl(input: &str) -> Result<Mesh, ParseError> {
    let mut mesh = Mesh::single_group(0);
    let mut normal: Option<[f32; 3]> = None;
    let mut pending = 0usize;

    for (number, raw_line) in input.lines().enumerate() {
        let line = number + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (_, parsed) = all_consuming(terminated(parse_line, multispace0))(trimmed)
            .map_err(|_| ParseError::at_line(line, format!("unrecognized STL line '{}'", trimmed)))?;

        match parsed {
            StlLine::FacetNormal(n) => {
                if pending != 0 && pending != 3 {
                    return Err(ParseError::at_line(line, "previous facet has fewer than 3 vertices"));
                }
                normal = Some(swap_yz(finite(line, n)?));
                pending = 0;
            }
            StlLine::Vertex(v) => {
                let Some(n) = normal else {
                    return Err(ParseError::at_line(line, "vertex outside of a facet"));
                };
                if pending == 3 {
                    return Err(ParseError::at_line(line, "facet has more than 3 vertices"));
                }
                let index = mesh.push_vertex(swap_yz(finite(line, v)?), n);
                mesh.indices_per_material[0].push(index);
                pending += 1;
            }
            StlLine::Solid
            | StlLine::OuterLoop
            | StlLine::EndLoop
            | StlLine::EndFacet
            | StlLine::EndSolid => {}
        }
    }

    if pending != 0 && pending != 3 {
        return Err(ParseError::Structure("last facet has fewer than 3 vertices".into()));
    }

    Ok(mesh)
}

/// Detect and parse STL file (binary or ASCII)
pub fn parse_stl(data: &[u8]) -> Result<Mesh, ParseError> {
    let mesh = match detect_format(data) {
        StlFormat::Ascii => {
            let text = std::str::from_utf8(data).map_err(|e| {
                ParseError::at_offset(e.valid_up_to(), "ASCII STL contains invalid UTF-8")
            })?;
            parse_ascii_stl(text)?
        }
        StlFormat::Binary => parse_binary_stl(data)?,
    };

    log::info!("Parsed STL: {} triangles", mesh.triangle_count());
    Ok(mesh)
}
