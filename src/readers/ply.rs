//! PLY point clouds.
//!
//! Reads the `vertex` element of `ascii` and `binary_little_endian` files:
//! positions from `x`, `y`, `z` and, when present, colors from `red`, `green`,
//! `blue`. Elements declared before `vertex` are skipped when their size is
//! known; list properties are only supported after the vertex element.

use std::path::Path;

use crate::error::DecodeError;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<[f32; 3]>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl Scalar {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "char" | "int8" => Scalar::I8,
            "uchar" | "uint8" => Scalar::U8,
            "short" | "int16" => Scalar::I16,
            "ushort" | "uint16" => Scalar::U16,
            "int" | "int32" => Scalar::I32,
            "uint" | "uint32" => Scalar::U32,
            "float" | "float32" => Scalar::F32,
            "double" | "float64" => Scalar::F64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            Scalar::I8 | Scalar::U8 => 1,
            Scalar::I16 | Scalar::U16 => 2,
            Scalar::I32 | Scalar::U32 | Scalar::F32 => 4,
            Scalar::F64 => 8,
        }
    }

    fn read_le(self, b: &[u8]) -> f64 {
        match self {
            Scalar::I8 => b[0] as i8 as f64,
            Scalar::U8 => b[0] as f64,
            Scalar::I16 => i16::from_le_bytes([b[0], b[1]]) as f64,
            Scalar::U16 => u16::from_le_bytes([b[0], b[1]]) as f64,
            Scalar::I32 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Scalar::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Scalar::F32 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Scalar::F64 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        }
    }
}

#[derive(Clone, Debug)]
enum Property {
    Scalar { name: String, kind: Scalar },
    List,
}

#[derive(Clone, Debug)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

impl Element {
    fn fixed_size(&self) -> Option<usize> {
        self.properties
            .iter()
            .map(|p| match p {
                Property::Scalar { kind, .. } => Some(kind.size()),
                Property::List => None,
            })
            .sum()
    }

    fn index_of(&self, wanted: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| matches!(p, Property::Scalar { name, .. } if name == wanted))
    }
}

struct Header {
    format: Format,
    elements: Vec<Element>,
    body_offset: usize,
}

/// Decode an in-memory PLY file. `path` is only used in errors.
pub fn parse(path: &Path, bytes: &[u8]) -> Result<PointCloud, DecodeError> {
    let invalid = |reason: &str| DecodeError::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let unsupported = |reason: &str| DecodeError::Unsupported {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let header = parse_header(bytes).map_err(|reason| match reason {
        HeaderError::Invalid(r) => invalid(&r),
        HeaderError::Unsupported(r) => unsupported(&r),
    })?;
    let vertex_pos = header
        .elements
        .iter()
        .position(|e| e.name == "vertex")
        .ok_or_else(|| invalid("no vertex element"))?;
    let vertex = &header.elements[vertex_pos];
    if vertex.properties.iter().any(|p| matches!(p, Property::List)) {
        return Err(unsupported("list properties in vertex element"));
    }
    let axis = |name: &str| {
        vertex
            .index_of(name)
            .ok_or_else(|| invalid(&format!("vertex element has no {} property", name)))
    };
    let (ix, iy, iz) = (axis("x")?, axis("y")?, axis("z")?);
    let color_idx = match (
        vertex.index_of("red"),
        vertex.index_of("green"),
        vertex.index_of("blue"),
    ) {
        (Some(r), Some(g), Some(b)) => Some((r, g, b)),
        _ => None,
    };

    let body = &bytes[header.body_offset..];
    let rows: Vec<Vec<f64>> = match header.format {
        Format::Ascii => {
            let text = std::str::from_utf8(body).map_err(|_| invalid("ascii body is not text"))?;
            let mut lines = text.lines().filter(|l| !l.trim().is_empty());
            for before in &header.elements[..vertex_pos] {
                for _ in 0..before.count {
                    lines.next().ok_or_else(|| invalid("truncated body"))?;
                }
            }
            // Each row takes at least two bytes of body text.
            let mut rows = Vec::with_capacity(vertex.count.min(body.len() / 2));
            for _ in 0..vertex.count {
                let line = lines.next().ok_or_else(|| invalid("truncated vertex data"))?;
                let row = line
                    .split_whitespace()
                    .map(|v| v.parse::<f64>())
                    .collect::<Result<Vec<f64>, _>>()
                    .map_err(|_| invalid("malformed vertex value"))?;
                if row.len() < vertex.properties.len() {
                    return Err(invalid("vertex row has too few values"));
                }
                rows.push(row);
            }
            rows
        }
        Format::BinaryLittleEndian => {
            let mut offset = 0usize;
            for before in &header.elements[..vertex_pos] {
                let size = before
                    .fixed_size()
                    .ok_or_else(|| unsupported("list properties before vertex element"))?;
                offset = size
                    .checked_mul(before.count)
                    .and_then(|len| offset.checked_add(len))
                    .ok_or_else(|| invalid("element data size overflows"))?;
            }
            let stride = vertex.fixed_size().unwrap_or(0);
            let needed = stride
                .checked_mul(vertex.count)
                .and_then(|len| offset.checked_add(len))
                .ok_or_else(|| invalid("vertex data size overflows"))?;
            if body.len() < needed {
                return Err(invalid("truncated vertex data"));
            }
            let mut rows = Vec::with_capacity(vertex.count);
            for _ in 0..vertex.count {
                let mut row = Vec::with_capacity(vertex.properties.len());
                for p in &vertex.properties {
                    if let Property::Scalar { kind, .. } = p {
                        row.push(kind.read_le(&body[offset..offset + kind.size()]));
                        offset += kind.size();
                    }
                }
                rows.push(row);
            }
            rows
        }
    };

    let points = rows
        .iter()
        .map(|r| [r[ix] as f32, r[iy] as f32, r[iz] as f32])
        .collect();
    let colors = color_idx.map(|(r, g, b)| {
        rows.iter()
            .map(|row| {
                let c = |v: f64| v.round().clamp(0.0, 255.0) as u8;
                [c(row[r]), c(row[g]), c(row[b])]
            })
            .collect()
    });
    Ok(PointCloud { points, colors })
}

enum HeaderError {
    Invalid(String),
    Unsupported(String),
}

fn parse_header(bytes: &[u8]) -> Result<Header, HeaderError> {
    let invalid = |r: &str| HeaderError::Invalid(r.to_string());
    let marker = b"end_header";
    let end = bytes
        .windows(marker.len())
        .position(|w| w == marker)
        .ok_or_else(|| invalid("missing end_header"))?;
    let mut body_offset = end + marker.len();
    if bytes.get(body_offset) == Some(&b'\r') {
        body_offset += 1;
    }
    if bytes.get(body_offset) == Some(&b'\n') {
        body_offset += 1;
    }
    let text = std::str::from_utf8(&bytes[..end]).map_err(|_| invalid("header is not text"))?;
    let mut lines = text.lines().map(str::trim);
    if lines.next() != Some("ply") {
        return Err(invalid("missing ply magic"));
    }

    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();
    for line in lines {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] | ["comment", ..] | ["obj_info", ..] => {}
            ["format", "ascii", _] => format = Some(Format::Ascii),
            ["format", "binary_little_endian", _] => format = Some(Format::BinaryLittleEndian),
            ["format", other, ..] => {
                return Err(HeaderError::Unsupported(format!("format {}", other)));
            }
            ["element", name, count] => elements.push(Element {
                name: name.to_string(),
                count: count.parse().map_err(|_| invalid("bad element count"))?,
                properties: Vec::new(),
            }),
            ["property", "list", ..] => elements
                .last_mut()
                .ok_or_else(|| invalid("property before element"))?
                .properties
                .push(Property::List),
            ["property", kind, name] => {
                let kind = Scalar::parse(kind)
                    .ok_or_else(|| HeaderError::Unsupported(format!("property type {}", kind)))?;
                elements
                    .last_mut()
                    .ok_or_else(|| invalid("property before element"))?
                    .properties
                    .push(Property::Scalar {
                        name: name.to_string(),
                        kind,
                    });
            }
            _ => return Err(HeaderError::Invalid(format!("unexpected header line '{}'", line))),
        }
    }
    Ok(Header {
        format: format.ok_or_else(|| invalid("missing format line"))?,
        elements,
        body_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII: &str = "ply\nformat ascii 1.0\ncomment test\nelement vertex 2\n\
property float x\nproperty float y\nproperty float z\n\
property uchar red\nproperty uchar green\nproperty uchar blue\n\
element face 1\nproperty list uchar int vertex_indices\nend_header\n\
0 0 0 255 0 0\n1.5 2 -3 0 128 255\n3 0 1 1\n";

    #[test]
    fn reads_ascii_vertices_and_colors() -> anyhow::Result<()> {
        let cloud = parse(Path::new("c.ply"), ASCII.as_bytes())?;
        assert_eq!(cloud.points, vec![[0.0, 0.0, 0.0], [1.5, 2.0, -3.0]]);
        assert_eq!(cloud.colors, Some(vec![[255, 0, 0], [0, 128, 255]]));
        Ok(())
    }

    #[test]
    fn reads_binary_little_endian() -> anyhow::Result<()> {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 2\n\
property float x\nproperty float y\nproperty double z\nend_header\n"
            .to_vec();
        for (x, y, z) in [(1.0f32, 2.0f32, 3.0f64), (-1.0, 0.5, 10.0)] {
            bytes.extend_from_slice(&x.to_le_bytes());
            bytes.extend_from_slice(&y.to_le_bytes());
            bytes.extend_from_slice(&z.to_le_bytes());
        }
        let cloud = parse(Path::new("c.ply"), &bytes)?;
        assert_eq!(cloud.points, vec![[1.0, 2.0, 3.0], [-1.0, 0.5, 10.0]]);
        assert!(cloud.colors.is_none());
        Ok(())
    }

    #[test]
    fn rejects_big_endian_and_missing_axes() {
        let be = b"ply\nformat binary_big_endian 1.0\nelement vertex 0\nend_header\n";
        assert!(matches!(
            parse(Path::new("c.ply"), be),
            Err(DecodeError::Unsupported { .. })
        ));

        let no_z = b"ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nend_header\n1 2\n";
        assert!(matches!(
            parse(Path::new("c.ply"), no_z),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn oversized_ascii_count_is_invalid() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1152921504606846976\n\
property float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n";
        assert!(matches!(
            parse(Path::new("c.ply"), text.as_bytes()),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn oversized_binary_count_is_invalid() {
        let overflowing = b"ply\nformat binary_little_endian 1.0\nelement vertex 3074457345618258603\n\
property float x\nproperty float y\nproperty float z\nend_header\n";
        assert!(matches!(
            parse(Path::new("c.ply"), overflowing),
            Err(DecodeError::Invalid { .. })
        ));

        let skipped = b"ply\nformat binary_little_endian 1.0\nelement camera 9223372036854775807\n\
property double k\nelement vertex 1\nproperty float x\nproperty float y\n\
property float z\nend_header\n";
        assert!(matches!(
            parse(Path::new("c.ply"), skipped),
            Err(DecodeError::Invalid { .. })
        ));

        let huge_but_representable = b"ply\nformat binary_little_endian 1.0\nelement vertex 1000000000\n\
property float x\nproperty float y\nproperty float z\nend_header\n";
        assert!(matches!(
            parse(Path::new("c.ply"), huge_but_representable),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn truncated_ascii_body_is_invalid() {
        let text = "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\n\
property float y\nproperty float z\nend_header\n0 0 0\n";
        assert!(matches!(
            parse(Path::new("c.ply"), text.as_bytes()),
            Err(DecodeError::Invalid { .. })
        ));
    }
}
