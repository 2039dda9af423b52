use super::load::{discover_documents, load_document, slugify, strip_unknown_verbs};
use super::SpecLoadError;
use oas3::OpenApiV3Spec;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Top-level lists unioned across documents (duplicates removed by equality).
const UNION_KEYS: [&str; 3] = ["servers", "tags", "security"];

/// A single logical API description built from one or more documents.
#[derive(Debug, Clone)]
pub struct MergedSpec {
    document: Value,
    spec: OpenApiV3Spec,
    sources: Vec<String>,
    slug: String,
    base_path: String,
}

impl MergedSpec {
    /// Interpret an already merged JSON document.
    pub fn from_value(document: Value) -> Result<Self, SpecLoadError> {
        Self::from_parts(document, vec!["<memory>".to_string()])
    }

    /// Merge in-memory documents labelled by their source names.
    pub fn from_documents<I, S>(documents: I) -> Result<Self, SpecLoadError>
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let mut merger = Merger::default();
        for (source, mut doc) in documents {
            strip_unknown_verbs(&mut doc);
            merger.add(source.into(), doc)?;
        }
        let (document, sources) = merger.finish()?;
        Self::from_parts(document, sources)
    }

    fn from_parts(document: Value, sources: Vec<String>) -> Result<Self, SpecLoadError> {
        let spec: OpenApiV3Spec =
            serde_json::from_value(document.clone()).map_err(|e| SpecLoadError::InvalidDocument {
                message: e.to_string(),
            })?;
        let slug = slugify(&spec.info.title);
        let base_path = base_path_of(&spec);
        Ok(Self {
            document,
            spec,
            sources,
            slug,
            base_path,
        })
    }

    /// Merged document as JSON.
    #[must_use]
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Typed OpenAPI model of the merged document.
    #[must_use]
    pub fn spec(&self) -> &OpenApiV3Spec {
        &self.spec
    }

    /// Contributing sources in merge order.
    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Path component of `servers[0].url`, without a trailing slash.
    ///
    /// Informational only; routes are not mounted under it.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Render the merged document as YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(&self.document)?)
    }
}

fn base_path_of(spec: &OpenApiV3Spec) -> String {
    let Some(server) = spec.servers.first() else {
        return String::new();
    };
    let url_str = &server.url;
    url::Url::parse(url_str)
        .or_else(|_| url::Url::parse(&format!("http://placeholder{url_str}")))
        .map(|u| {
            let p = u.path().trim_end_matches('/');
            if p == "/" || p.is_empty() {
                String::new()
            } else {
                p.to_string()
            }
        })
        .unwrap_or_default()
}

/// Merge the documents at `paths`, in the given order.
///
/// The first document is the base. Callers should pass a stable ordering;
/// [`merge_all_in_directory`] sorts lexicographically.
pub fn merge_all<P: AsRef<Path>>(paths: &[P]) -> Result<MergedSpec, SpecLoadError> {
    let mut merger = Merger::default();
    for path in paths {
        let path = path.as_ref();
        let doc = load_document(path)?;
        merger.add(path.display().to_string(), doc)?;
    }
    let (document, sources) = merger.finish()?;
    let merged = MergedSpec::from_parts(document, sources)?;
    info!(
        documents = merged.sources.len(),
        title = %merged.spec.info.title,
        base_path = %merged.base_path,
        "Merged specification documents"
    );
    Ok(merged)
}

/// Discover every `*.yaml`/`*.yml`/`*.json` below `dir` and merge them in
/// lexicographic path order.
pub fn merge_all_in_directory(dir: impl AsRef<Path>) -> Result<MergedSpec, SpecLoadError> {
    let paths: Vec<PathBuf> = discover_documents(dir)?;
    merge_all(&paths)
}

#[derive(Default)]
struct Merger {
    base: Option<Value>,
    sources: Vec<String>,
    path_owner: HashMap<String, String>,
}

impl Merger {
    fn add(&mut self, source: String, doc: Value) -> Result<(), SpecLoadError> {
        let Value::Object(incoming) = doc else {
            return Err(SpecLoadError::InvalidDocument {
                message: format!("document '{source}' is not a mapping"),
            });
        };

        let Some(Value::Object(base)) = self.base.as_mut() else {
            if let Some(Value::Object(paths)) = incoming.get("paths") {
                for path in paths.keys() {
                    self.path_owner.insert(path.clone(), source.clone());
                }
            }
            self.base = Some(Value::Object(incoming));
            self.sources.push(source);
            return Ok(());
        };

        for (key, value) in incoming {
            match key.as_str() {
                "openapi" => {
                    base.entry(key).or_insert(value);
                }
                "info" => {
                    let current = base.entry(key).or_insert(Value::Null);
                    if current.is_null() {
                        *current = value;
                    }
                }
                "paths" => {
                    merge_paths(base, value, &source, &mut self.path_owner)?;
                }
                "components" => {
                    let target = base
                        .entry(key)
                        .or_insert_with(|| Value::Object(Map::new()));
                    merge_components(target, value);
                }
                k if UNION_KEYS.contains(&k) => {
                    let target = base.entry(key).or_insert_with(|| Value::Array(Vec::new()));
                    union_list(target, value);
                }
                k if k == "webhooks" || k.starts_with("x-") => {
                    let target = base.entry(key).or_insert(Value::Null);
                    merge_map(target, value);
                }
                _ => {
                    base.insert(key, value);
                }
            }
        }
        debug!(source = %source, "Merged document into base");
        self.sources.push(source);
        Ok(())
    }

    fn finish(self) -> Result<(Value, Vec<String>), SpecLoadError> {
        match self.base {
            Some(doc) => Ok((doc, self.sources)),
            None => Err(SpecLoadError::NoDocuments),
        }
    }
}

fn merge_paths(
    base: &mut Map<String, Value>,
    incoming: Value,
    source: &str,
    owners: &mut HashMap<String, String>,
) -> Result<(), SpecLoadError> {
    let Value::Object(incoming) = incoming else {
        return Ok(());
    };
    let target = base
        .entry("paths")
        .or_insert_with(|| Value::Object(Map::new()));
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target) = target else {
        return Ok(());
    };
    for (path, item) in incoming {
        match target.get(&path) {
            Some(existing) if *existing == item => {
                // Identical definition, e.g. the same document merged twice.
            }
            Some(_) => {
                return Err(SpecLoadError::DuplicatePath {
                    first: owners.get(&path).cloned().unwrap_or_default(),
                    second: source.to_string(),
                    path,
                });
            }
            None => {
                owners.insert(path.clone(), source.to_string());
                target.insert(path, item);
            }
        }
    }
    Ok(())
}

/// Each component subsection is a map; later entries override earlier ones.
fn merge_components(target: &mut Value, incoming: Value) {
    let Value::Object(incoming) = incoming else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(target) = target else {
        return;
    };
    for (section, entries) in incoming {
        let slot = target.entry(section).or_insert(Value::Null);
        merge_map(slot, entries);
    }
}

fn merge_map(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(target), Value::Object(incoming)) => {
            for (k, v) in incoming {
                target.insert(k, v);
            }
        }
        (target, incoming) => *target = incoming,
    }
}

fn union_list(target: &mut Value, incoming: Value) {
    let Value::Array(incoming) = incoming else {
        return;
    };
    if !target.is_array() {
        *target = Value::Array(Vec::new());
    }
    if let Value::Array(existing) = target {
        for item in incoming {
            if !existing.contains(&item) {
                existing.push(item);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(title: &str, paths: Value, schemas: Value) -> Value {
        json!({
            "openapi": "3.1.0",
            "info": { "title": title, "version": "1.0.0" },
            "servers": [{ "url": "http://localhost:8080/api" }],
            "paths": paths,
            "components": { "schemas": schemas }
        })
    }

    #[test]
    fn test_info_is_first_non_null() {
        let merged = MergedSpec::from_documents([
            ("a", doc("First", json!({}), json!({}))),
            ("b", doc("Second", json!({}), json!({}))),
        ])
        .unwrap();
        assert_eq!(merged.spec().info.title, "First");
        assert_eq!(merged.slug(), "first");
        assert_eq!(merged.base_path(), "/api");
    }

    #[test]
    fn test_servers_are_unioned_without_duplicates() {
        let mut second = doc("B", json!({}), json!({}));
        second["servers"] = json!([
            { "url": "http://localhost:8080/api" },
            { "url": "https://prod.example.com/api" }
        ]);
        let merged =
            MergedSpec::from_documents([("a", doc("A", json!({}), json!({}))), ("b", second)])
                .unwrap();
        assert_eq!(merged.document()["servers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let docs: Vec<(String, Value)> = Vec::new();
        assert!(matches!(
            MergedSpec::from_documents(docs),
            Err(SpecLoadError::NoDocuments)
        ));
    }

    #[test]
    fn test_non_openapi_document_is_invalid() {
        let err = MergedSpec::from_value(json!({ "swagger": "2.0" })).unwrap_err();
        assert!(matches!(err, SpecLoadError::InvalidDocument { .. }));
    }

    #[test]
    fn test_relative_server_url_base_path() {
        let mut d = doc("A", json!({}), json!({}));
        d["servers"] = json!([{ "url": "/v2/" }]);
        let merged = MergedSpec::from_value(d).unwrap();
        assert_eq!(merged.base_path(), "/v2");
    }
}
