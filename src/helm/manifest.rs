use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use super::RenderError;

const SOURCE_PREFIX: &str = "# Source: ";

/// Group/version/kind of a rendered object.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Gvk {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    /// Split an `apiVersion` (`apps/v1`, or `v1` for the core group).
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Gvk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, Kind={}", self.api_version(), self.kind)
    }
}

/// One rendered Kubernetes object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    pub gvk: Gvk,
    pub name: String,
    pub namespace: Option<String>,
    /// Chart template the object came from.
    pub source: String,
    pub content: String,
}

impl ResourceTemplate {
    /// Resource node name in a run-time context: `name+Kind`.
    pub fn context_name(&self) -> String {
        format!("{}+{}", self.name, self.gvk.kind)
    }
}

/// A raw document cut out of a combined manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDoc {
    pub source: String,
    pub body: String,
}

/// Cut `helm template` output at `---` boundaries.
///
/// Documents from `NOTES.txt` and from `_`-prefixed partials are dropped, as
/// are documents holding nothing but whitespace and comments.
pub fn split_manifest(manifest: &str) -> Vec<ManifestDoc> {
    let mut docs = Vec::new();
    let mut source = String::new();
    let mut body = String::new();

    let mut flush = |source: &mut String, body: &mut String| {
        let doc = ManifestDoc {
            source: std::mem::take(source),
            body: std::mem::take(body),
        };
        if keep_document(&doc) {
            docs.push(doc);
        }
    };

    for line in manifest.lines() {
        if line.trim_end() == "---" {
            flush(&mut source, &mut body);
            continue;
        }
        if let Some(path) = line.strip_prefix(SOURCE_PREFIX) {
            source = path.trim().to_string();
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    flush(&mut source, &mut body);
    docs
}

fn keep_document(doc: &ManifestDoc) -> bool {
    let file = doc.source.rsplit('/').next().unwrap_or_default();
    if file == "NOTES.txt" || file.starts_with('_') {
        return false;
    }
    doc.body
        .lines()
        .map(str::trim)
        .any(|l| !l.is_empty() && !l.starts_with('#'))
}

/// Identity fields read from an object's YAML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHeader {
    pub gvk: Gvk,
    pub name: String,
    pub namespace: Option<String>,
}

/// Read apiVersion, kind, name and namespace from a YAML object; `None`
/// when any of kind or name is missing.
pub fn parse_header(content: &str) -> Option<ObjectHeader> {
    let value: Value = serde_yaml::from_str(content).ok()?;
    header_of(&value)
}

fn header_of(value: &Value) -> Option<ObjectHeader> {
    let kind = value.get("kind")?.as_str()?;
    let api_version = value.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let metadata = value.get("metadata")?;
    let name = metadata.get("name")?.as_str()?;
    if kind.is_empty() || name.is_empty() {
        return None;
    }
    let namespace = metadata
        .get("namespace")
        .and_then(Value::as_str)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string);
    Some(ObjectHeader {
        gvk: Gvk::from_api_version(api_version, kind),
        name: name.to_string(),
        namespace,
    })
}

/// Turn split documents into resource templates, skipping objects that have
/// no kind or no name.
pub fn parse_documents(docs: &[ManifestDoc]) -> Result<Vec<ResourceTemplate>, RenderError> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        let value: Value = serde_yaml::from_str(&doc.body).map_err(|e| {
            RenderError::RenderFailed(format!("{} is not valid YAML: {e}", doc.source))
        })?;
        if value.is_null() {
            continue;
        }
        let Some(header) = header_of(&value) else {
            tracing::debug!(source = %doc.source, "Skipping object without kind or name");
            continue;
        };
        out.push(ResourceTemplate {
            gvk: header.gvk,
            name: header.name,
            namespace: header.namespace,
            source: doc.source.clone(),
            content: doc.body.clone(),
        });
    }
    Ok(out)
}

/// Point an object that declares a namespace at `namespace` instead.
/// Objects without a namespace (cluster-scoped or defaulted) are untouched.
/// Returns whether the content changed.
pub fn rewrite_namespace(tpl: &mut ResourceTemplate, namespace: &str) -> Result<bool, RenderError> {
    match &tpl.namespace {
        Some(current) if current != namespace => {}
        _ => return Ok(false),
    }
    let mut value: Value = serde_yaml::from_str(&tpl.content)
        .map_err(|e| RenderError::RenderFailed(format!("{}: {e}", tpl.source)))?;
    if let Some(Value::Mapping(metadata)) = value.get_mut("metadata") {
        metadata.insert(
            Value::String("namespace".to_string()),
            Value::String(namespace.to_string()),
        );
    } else {
        let mut metadata = Mapping::new();
        metadata.insert(
            Value::String("namespace".to_string()),
            Value::String(namespace.to_string()),
        );
        if let Value::Mapping(root) = &mut value {
            root.insert(Value::String("metadata".to_string()), Value::Mapping(metadata));
        }
    }
    tpl.content = serde_yaml::to_string(&value)
        .map_err(|e| RenderError::RenderFailed(format!("{}: {e}", tpl.source)))?;
    tpl.namespace = Some(namespace.to_string());
    Ok(true)
}
