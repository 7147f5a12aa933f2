//! NumPy `.npy` arrays (hyperspectral cubes).
//!
//! Supports format versions 1-3, little-endian (or byte-sized) `u1`, `i2`, `u2`,
//! `i4`, `f4` and `f8` data in C order. Values are widened to `f32`.

use std::path::Path;

use crate::error::DecodeError;

const MAGIC: &[u8] = b"\x93NUMPY";

/// An n-dimensional array in row-major (C) order.
#[derive(Clone, Debug, PartialEq)]
pub struct SpectralCube {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl SpectralCube {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Element at a full multi-index, or `None` when out of range.
    pub fn get(&self, index: &[usize]) -> Option<f32> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0usize;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        self.data.get(offset).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dtype {
    U1,
    I2,
    U2,
    I4,
    F4,
    F8,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        let order = descr.get(..1)?;
        let kind = descr.get(1..)?;
        match (order, kind) {
            ("|" | "<", "u1") | ("|", "b1") => Some(Dtype::U1),
            ("<", "i2") => Some(Dtype::I2),
            ("<", "u2") => Some(Dtype::U2),
            ("<", "i4") => Some(Dtype::I4),
            ("<", "f4") => Some(Dtype::F4),
            ("<", "f8") => Some(Dtype::F8),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Dtype::U1 => 1,
            Dtype::I2 | Dtype::U2 => 2,
            Dtype::I4 | Dtype::F4 => 4,
            Dtype::F8 => 8,
        }
    }

    fn decode(self, b: &[u8]) -> f32 {
        match self {
            Dtype::U1 => b[0] as f32,
            Dtype::I2 => i16::from_le_bytes([b[0], b[1]]) as f32,
            Dtype::U2 => u16::from_le_bytes([b[0], b[1]]) as f32,
            Dtype::I4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
            Dtype::F4 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            Dtype::F8 => {
                f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
            }
        }
    }
}

/// Decode an in-memory `.npy` file. `path` is only used in errors.
pub fn parse(path: &Path, bytes: &[u8]) -> Result<SpectralCube, DecodeError> {
    let invalid = |reason: String| DecodeError::Invalid {
        path: path.to_path_buf(),
        reason,
    };
    let unsupported = |reason: String| DecodeError::Unsupported {
        path: path.to_path_buf(),
        reason,
    };

    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err(invalid("missing .npy magic".to_string()));
    }
    let major = bytes[MAGIC.len()];
    let rest = &bytes[MAGIC.len() + 2..];
    let (header_len, rest) = match major {
        1 => {
            if rest.len() < 2 {
                return Err(invalid("truncated header length".to_string()));
            }
            (u16::from_le_bytes([rest[0], rest[1]]) as usize, &rest[2..])
        }
        2 | 3 => {
            if rest.len() < 4 {
                return Err(invalid("truncated header length".to_string()));
            }
            (
                u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize,
                &rest[4..],
            )
        }
        v => return Err(unsupported(format!("format version {}", v))),
    };
    if rest.len() < header_len {
        return Err(invalid("truncated header".to_string()));
    }
    let header = std::str::from_utf8(&rest[..header_len])
        .map_err(|_| invalid("header is not text".to_string()))?;
    let payload = &rest[header_len..];

    let descr = header_string(header, "descr").ok_or_else(|| invalid("missing descr".to_string()))?;
    let dtype = Dtype::parse(&descr).ok_or_else(|| unsupported(format!("dtype {}", descr)))?;
    let fortran = header_value(header, "fortran_order")
        .ok_or_else(|| invalid("missing fortran_order".to_string()))?;
    if fortran.starts_with("True") {
        return Err(unsupported("fortran-ordered arrays".to_string()));
    }
    let shape = header_shape(header).ok_or_else(|| invalid("malformed shape".to_string()))?;

    let count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| invalid("shape overflows".to_string()))?;
    let needed = count
        .checked_mul(dtype.size())
        .ok_or_else(|| invalid("shape overflows".to_string()))?;
    if payload.len() < needed {
        return Err(invalid(format!(
            "expected {} data bytes, found {}",
            needed,
            payload.len()
        )));
    }
    let data = payload[..needed]
        .chunks_exact(dtype.size())
        .map(|b| dtype.decode(b))
        .collect();
    Ok(SpectralCube { shape, data })
}

/// Raw text following `'key':` in the header dict.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let quoted = [format!("'{}'", key), format!("\"{}\"", key)];
    let start = quoted.iter().find_map(|k| header.find(k.as_str()).map(|i| i + k.len()))?;
    let after = header[start..].trim_start();
    Some(after.strip_prefix(':')?.trim_start())
}

fn header_string(header: &str, key: &str) -> Option<String> {
    let value = header_value(header, key)?;
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = &value[1..];
    let end = inner.find(quote)?;
    Some(inner[..end].to_string())
}

fn header_shape(header: &str) -> Option<Vec<usize>> {
    let value = header_value(header, "shape")?;
    let inner = value.strip_prefix('(')?;
    let end = inner.find(')')?;
    inner[..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse::<usize>().ok())
        .collect()
}

#[cfg(test)]
pub(crate) fn encode_f4(shape: &[usize], values: &[f32]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_text = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}, }}",
        shape_text
    );
    // Pad so the data starts on a 64-byte boundary, newline-terminated.
    while (MAGIC.len() + 4 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');
    let mut out = MAGIC.to_vec();
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_one_float_cube() -> anyhow::Result<()> {
        let values: Vec<f32> = (0..24).map(|v| v as f32 * 0.5).collect();
        let bytes = encode_f4(&[2, 3, 4], &values);
        let cube = parse(Path::new("cube.npy"), &bytes)?;
        assert_eq!(cube.shape, vec![2, 3, 4]);
        assert_eq!(cube.len(), 24);
        assert_eq!(cube.get(&[1, 2, 3]), Some(11.5));
        assert_eq!(cube.get(&[2, 0, 0]), None);
        Ok(())
    }

    #[test]
    fn parses_version_two_u2() -> anyhow::Result<()> {
        let header = "{'descr': '<u2', 'fortran_order': False, 'shape': (3,), }\n";
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(header.len() as u32).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        for v in [1u16, 500, 65535] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let cube = parse(Path::new("x.npy"), &bytes)?;
        assert_eq!(cube.data, vec![1.0, 500.0, 65535.0]);
        Ok(())
    }

    #[test]
    fn rejects_big_endian_and_fortran_order() {
        let mut bytes = encode_f4(&[2], &[1.0, 2.0]);
        let pos = bytes.windows(3).position(|w| w == b"<f4").unwrap_or(0);
        bytes[pos] = b'>';
        assert!(matches!(
            parse(Path::new("x.npy"), &bytes),
            Err(DecodeError::Unsupported { .. })
        ));

        let mut bytes = encode_f4(&[2], &[1.0, 2.0]);
        let pos = bytes.windows(5).position(|w| w == b"False").unwrap_or(0);
        bytes[pos..pos + 5].copy_from_slice(b"True ");
        assert!(matches!(
            parse(Path::new("x.npy"), &bytes),
            Err(DecodeError::Unsupported { .. })
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut bytes = encode_f4(&[4], &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            parse(Path::new("x.npy"), &bytes),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_shapes_larger_than_the_payload() {
        let overflowing = encode_f4(&[4611686018427387904, 4], &[]);
        assert!(matches!(
            parse(Path::new("x.npy"), &overflowing),
            Err(DecodeError::Invalid { .. })
        ));

        let oversized = encode_f4(&[1_000_000, 1_000], &[1.0, 2.0]);
        assert!(matches!(
            parse(Path::new("x.npy"), &oversized),
            Err(DecodeError::Invalid { .. })
        ));
    }

    #[test]
    fn rejects_non_npy_data() {
        assert!(matches!(
            parse(Path::new("x.npy"), b"PK\x03\x04 not numpy"),
            Err(DecodeError::Invalid { .. })
        ));
    }
}
