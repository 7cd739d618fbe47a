/// Canonical writer: byte-stable serialization and atomic commit.
///
/// Canonical form: keys sorted at every level, `,` and `:` separators with
/// no whitespace, strings escaped to printable ASCII, one trailing newline.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write to {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not move staged output into {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document is not representable as JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a successful write committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub path: PathBuf,
    pub bytes: usize,
    /// Lowercase hex SHA-256 of the committed bytes.
    pub sha256: String,
}

/// Canonical bytes of any serializable document.
pub fn to_canonical_bytes<T: Serialize + ?Sized>(document: &T) -> Result<Vec<u8>, WriteError> {
    let value = serde_json::to_value(document)?;
    Ok(canonical_value_bytes(&value))
}

/// Canonical bytes of a JSON value, including the trailing newline.
pub fn canonical_value_bytes(value: &Value) -> Vec<u8> {
    let mut out = String::new();
    encode_value(value, &mut out);
    out.push('\n');
    out.into_bytes()
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => encode_str(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_str(key, out);
                out.push(':');
                encode_value(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn encode_str(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
        }
    }
    out.push('"');
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Serialize `document` canonically and commit it to `path` atomically.
///
/// Bytes are staged in a temp file beside the destination, synced, then
/// renamed into place. On any failure the temp file is removed and the
/// destination is untouched.
pub fn write(document: &Value, path: &Path) -> Result<WriteReceipt, WriteError> {
    let bytes = canonical_value_bytes(document);
    commit_bytes(&bytes, path)
}

/// Atomically commit already-canonical bytes to `path`.
pub fn commit_bytes(bytes: &[u8], path: &Path) -> Result<WriteReceipt, WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".script-engine-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(io_err)?;
    staged.write_all(bytes).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;
    staged.persist(path).map_err(|e| WriteError::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    let receipt = WriteReceipt {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        sha256: sha256_hex(bytes),
    };
    tracing::info!(
        path = %receipt.path.display(),
        bytes = receipt.bytes,
        sha256 = %receipt.sha256,
        "canonical output committed"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical_string(value: &Value) -> String {
        String::from_utf8(canonical_value_bytes(value)).unwrap()
    }

    #[test]
    fn keys_sorted_compact_newline() {
        let value = json!({"b": 1, "a": {"z": [1, 2], "m": null}, "c": true});
        assert_eq!(
            canonical_string(&value),
            "{\"a\":{\"m\":null,\"z\":[1,2]},\"b\":1,\"c\":true}\n"
        );
    }

    #[test]
    fn strings_escaped_to_ascii() {
        let value = json!("x\u{1}\u{7f}/\u{1F600}\u{8}\u{c}\"\\\n\r\té");
        assert_eq!(
            canonical_string(&value),
            "\"x\\u0001\\u007f/\\ud83d\\ude00\\b\\f\\\"\\\\\\n\\r\\t\\u00e9\"\n"
        );
    }

    #[test]
    fn numbers_keep_integer_form() {
        let value = json!({"seed": u64::MAX, "neg": -3, "zero": 0});
        assert_eq!(
            canonical_string(&value),
            "{\"neg\":-3,\"seed\":18446744073709551615,\"zero\":0}\n"
        );
    }

    #[test]
    fn reencoding_is_idempotent() {
        let value = json!({"title": "Señor", "scenes": [{"line": "Go.\nNow"}]});
        let first = canonical_value_bytes(&value);
        let reparsed: Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(reparsed, value);
        assert_eq!(canonical_value_bytes(&reparsed), first);
    }

    #[test]
    fn serializable_records_match_values() {
        #[derive(Serialize)]
        struct Doc {
            zeta: u32,
            alpha: &'static str,
        }
        let bytes = to_canonical_bytes(&Doc { zeta: 1, alpha: "a" }).unwrap();
        assert_eq!(bytes, b"{\"alpha\":\"a\",\"zeta\":1}\n".to_vec());
    }

    #[test]
    fn write_commits_and_reports_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        let receipt = write(&json!({"b": 1, "a": "é"}), &path).unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk, b"{\"a\":\"\\u00e9\",\"b\":1}\n".to_vec());
        assert_eq!(receipt.bytes, 21);
        assert_eq!(
            receipt.sha256,
            "c950d72bfb3be5e3a88559cf381c3d463c7bdaf7f1ceccc080d85413268eaeed"
        );

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "stale").unwrap();
        write(&json!([1]), &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1]\n");
    }

    #[test]
    fn write_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let path = blocker.join("out.json");
        assert!(matches!(
            write(&json!({}), &path),
            Err(WriteError::Io { .. })
        ));
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn empty_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
