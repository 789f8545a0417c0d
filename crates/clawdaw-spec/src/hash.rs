//! Canonical hashing and seed derivation.
//!
//! Two projects that are equal as data hash equally regardless of key order
//! or whitespace in their persisted form:
//!
//! ```text
//! project_hash = hex(BLAKE3(JCS(project_json)))
//! ```
//!
//! Render-time randomness (note chance, humanize jitter) is drawn from
//! streams whose seeds are derived here, so identical inputs always expand
//! to identical events.

use serde_json::Value;

use crate::error::SpecError;
use crate::project::Project;

/// Computes the canonical BLAKE3 hash of a project.
///
/// # Example
/// ```
/// use clawdaw_spec::hash::canonical_project_hash;
/// use clawdaw_spec::Project;
///
/// let hash = canonical_project_hash(&Project::new("demo", 120.0)).unwrap();
/// assert_eq!(hash.len(), 64);
/// ```
pub fn canonical_project_hash(project: &Project) -> Result<String, SpecError> {
    let value = serde_json::to_value(project)?;
    canonical_value_hash(&value)
}

/// Computes the canonical BLAKE3 hash of a JSON value.
pub fn canonical_value_hash(value: &Value) -> Result<String, SpecError> {
    let canonical = canonicalize_json(value)?;
    Ok(blake3_hash(canonical.as_bytes()))
}

/// Canonicalizes a JSON value according to RFC 8785 (JCS).
///
/// Object keys are sorted, no whitespace is emitted and numbers use their
/// shortest form.
pub fn canonicalize_json(value: &Value) -> Result<String, SpecError> {
    let mut out = String::new();
    write_canonical(value, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_jcs_number(n)),
        Value::String(s) => out.push_str(&format_jcs_string(s)),
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(obj) => {
            let mut entries: Vec<(&String, &Value)> = obj.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&format_jcs_string(k));
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
    }
}

fn format_jcs_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(f) if f.is_finite() => {
            if f == 0.0 {
                return "0".to_string();
            }
            if f.fract() == 0.0 && f.abs() < 1e15 {
                return format!("{}", f as i64);
            }
            let s = format!("{}", f);
            if s.contains('.') && !s.contains('e') && !s.contains('E') {
                return s.trim_end_matches('0').trim_end_matches('.').to_string();
            }
            s
        }
        _ => "null".to_string(),
    }
}

fn format_jcs_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c < '\x20' => result.push_str(&format!("\\u{:04x}", c as u32)),
            c => result.push(c),
        }
    }
    result.push('"');
    result
}

fn truncate_u64(hash: &blake3::Hash) -> u64 {
    let b = hash.as_bytes();
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}

/// Derives an independent seed for one track from a base seed.
///
/// ```text
/// track_seed = truncate_u64(BLAKE3(base_seed || track_index))
/// ```
///
/// # Example
/// ```
/// use clawdaw_spec::hash::derive_track_seed;
///
/// assert_ne!(derive_track_seed(42, 0), derive_track_seed(42, 1));
/// ```
pub fn derive_track_seed(base_seed: u64, track_index: u32) -> u64 {
    let mut input = Vec::with_capacity(12);
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(&track_index.to_le_bytes());
    truncate_u64(&blake3::hash(&input))
}

/// Derives a seed for a named random stream (e.g. `"chance"`).
pub fn derive_stream_seed(base_seed: u64, stream: &str) -> u64 {
    let mut input = Vec::with_capacity(8 + stream.len());
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(stream.as_bytes());
    truncate_u64(&blake3::hash(&input))
}

/// Computes a BLAKE3 hash of arbitrary data as lowercase hex.
pub fn blake3_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonicalize_sorts_keys() {
        let v = json!({"b": 1, "a": {"d": [1, 2.5, "x"], "c": null}});
        assert_eq!(
            canonicalize_json(&v).unwrap(),
            r#"{"a":{"c":null,"d":[1,2.5,"x"]},"b":1}"#
        );
    }

    #[test]
    fn test_number_forms() {
        let v = json!([1.0, -0.0, 0.125, 1e20]);
        assert_eq!(canonicalize_json(&v).unwrap(), "[1,0,0.125,100000000000000000000]");
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(format_jcs_string("a\"b\n\u{1}"), r#""a\"b\n\u0001""#);
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": [true]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "y": [true], "x": 1 }"#).unwrap();
        assert_eq!(
            canonical_value_hash(&a).unwrap(),
            canonical_value_hash(&b).unwrap()
        );
    }

    #[test]
    fn test_project_hash_tracks_content() {
        let mut p = Project::new("h", 120.0);
        let first = canonical_project_hash(&p).unwrap();
        assert_eq!(first, canonical_project_hash(&p.clone()).unwrap());
        p.set_bpm(121.0).unwrap();
        assert_ne!(first, canonical_project_hash(&p).unwrap());
    }

    #[test]
    fn test_seed_derivation_is_stable() {
        assert_eq!(derive_track_seed(7, 3), derive_track_seed(7, 3));
        assert_ne!(derive_stream_seed(7, "chance"), derive_stream_seed(7, "humanize"));
    }
}
