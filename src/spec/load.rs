use super::SpecLoadError;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

const METHODS: [&str; 8] = [
    "get", "post", "put", "delete", "patch", "options", "head", "trace",
];

/// Remove path-item keys that are neither verbs nor standard path-item fields.
///
/// The typed model rejects unknown keys inside path items, so vendor verbs
/// (e.g. `query`) are dropped here. Extensions (`x-*`) are kept.
pub(crate) fn strip_unknown_verbs(val: &mut Value) {
    let Some(Value::Object(paths_map)) = val.get_mut("paths") else {
        return;
    };
    for item in paths_map.values_mut() {
        if let Value::Object(obj) = item {
            obj.retain(|k, _| {
                let lk = k.to_ascii_lowercase();
                match lk.as_str() {
                    "summary" | "description" | "servers" | "parameters" | "$ref" => true,
                    m if METHODS.contains(&m) => true,
                    _ => k.starts_with("x-"),
                }
            });
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn is_spec_file(path: &Path) -> bool {
    is_yaml(path) || path.extension().and_then(|e| e.to_str()) == Some("json")
}

/// Parse one YAML or JSON document into a JSON value.
///
/// The format is chosen by extension (`.yaml`/`.yml` vs anything else).
pub fn load_document(path: impl AsRef<Path>) -> Result<Value, SpecLoadError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| SpecLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut value: Value = if is_yaml(path) {
        serde_yaml::from_str(&content).map_err(|e| SpecLoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    } else {
        serde_json::from_str(&content).map_err(|e| SpecLoadError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
    };
    if !value.is_object() {
        return Err(SpecLoadError::Parse {
            path: path.to_path_buf(),
            message: "document root must be a mapping".to_string(),
        });
    }
    strip_unknown_verbs(&mut value);
    debug!(path = %path.display(), "Loaded specification document");
    Ok(value)
}

/// Discover spec documents below `dir`, sorted lexicographically by path.
pub fn discover_documents(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, SpecLoadError> {
    let dir = dir.as_ref();
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| SpecLoadError::Io {
            path: e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dir.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop detected")),
        })?;
        if entry.file_type().is_file() && is_spec_file(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    info!(
        dir = %dir.display(),
        documents = found.len(),
        "Discovered specification documents"
    );
    Ok(found)
}

/// Lowercase, underscore-separated form of an API title.
pub(crate) fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .replace(|c: char| !c.is_ascii_alphanumeric(), "_")
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_strip_unknown_verbs() {
        let mut v = json!({
            "paths": {
                "/x": { "get": {}, "patch": {}, "unknown": {}, "x-owner": "team" }
            }
        });
        strip_unknown_verbs(&mut v);
        assert!(v["paths"]["/x"].get("unknown").is_none());
        assert!(v["paths"]["/x"].get("get").is_some());
        assert!(v["paths"]["/x"].get("x-owner").is_some());
    }

    #[test]
    fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("a.yaml");
        std::fs::File::create(&yaml)
            .unwrap()
            .write_all(b"openapi: 3.1.0\ninfo:\n  title: A\n  version: '1'\npaths: {}\n")
            .unwrap();
        let json_path = dir.path().join("b.json");
        std::fs::write(
            &json_path,
            r#"{"openapi":"3.1.0","info":{"title":"B","version":"1"},"paths":{}}"#,
        )
        .unwrap();

        assert_eq!(load_document(&yaml).unwrap()["info"]["title"], "A");
        assert_eq!(load_document(&json_path).unwrap()["info"]["title"], "B");
    }

    #[test]
    fn test_load_reports_parse_errors_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        match load_document(&bad) {
            Err(SpecLoadError::Parse { path, .. }) => assert_eq!(path, bad),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(matches!(
            load_document(dir.path().join("missing.yaml")),
            Err(SpecLoadError::Io { .. })
        ));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Pet Store API"), "pet_store_api");
        assert_eq!(slugify("  --Orders--"), "orders");
    }
}
