use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use super::RenderError;

/// Profile manifest shipped at the root of every app-profile tarball.
///
/// ```yaml
/// version: v1
/// type:
///   values: "override_values.yaml"
///   configresource:
///     - filepath: config.yaml
///       chartpath: web/templates/config.yaml
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileManifest {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default)]
    pub spec: ProfileSpec,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileSpec {
    /// Values file inside the profile, relative to the manifest.
    #[serde(default)]
    pub values: String,
    #[serde(default)]
    pub configresource: Vec<ConfigResource>,
}

/// A profile file copied over the chart tree before rendering.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigResource {
    pub filepath: String,
    pub chartpath: String,
}

/// Find and parse the manifest; returns it with the directory it lives in.
pub fn load_manifest(root: &Path, file_name: &str) -> Result<(ProfileManifest, PathBuf), RenderError> {
    let base = if root.join(file_name).is_file() {
        root.to_path_buf()
    } else {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.is_dir() && path.join(file_name).is_file() {
                dirs.push(path);
            }
        }
        match dirs.len() {
            1 => dirs.remove(0),
            0 => {
                return Err(RenderError::ProfileInvalid(format!(
                    "profile has no {file_name}"
                )))
            }
            _ => {
                return Err(RenderError::ProfileInvalid(format!(
                    "profile has more than one {file_name}"
                )))
            }
        }
    };

    let raw = std::fs::read_to_string(base.join(file_name))?;
    let manifest: ProfileManifest = serde_yaml::from_str(&raw)
        .map_err(|e| RenderError::ProfileInvalid(format!("{file_name}: {e}")))?;
    Ok((manifest, base))
}

/// Join a path taken from a profile onto `base`, rejecting anything that
/// could step outside it.
pub fn safe_join(base: &Path, relative: &str) -> Result<PathBuf, RenderError> {
    let rel = Path::new(relative);
    if relative.is_empty()
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(RenderError::ProfileInvalid(format!(
            "path {relative:?} must be relative and stay inside the archive"
        )));
    }
    Ok(base.join(rel))
}

/// Copy every config resource of the profile onto the chart tree.
/// `chart_base` is the directory the chart tarball was unpacked into.
pub fn overlay(manifest: &ProfileManifest, profile_base: &Path, chart_base: &Path) -> Result<usize, RenderError> {
    for res in &manifest.spec.configresource {
        let src = safe_join(profile_base, &res.filepath)?;
        let dst = safe_join(chart_base, &res.chartpath)?;
        if !src.is_file() {
            return Err(RenderError::ProfileInvalid(format!(
                "config resource {} is missing from the profile",
                res.filepath
            )));
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dst)?;
        tracing::debug!(from = %res.filepath, to = %res.chartpath, "Applied profile config resource");
    }
    Ok(manifest.spec.configresource.len())
}

/// Path of the profile values file, if the manifest names one.
pub fn values_path(manifest: &ProfileManifest, profile_base: &Path) -> Result<Option<PathBuf>, RenderError> {
    if manifest.spec.values.is_empty() {
        return Ok(None);
    }
    let path = safe_join(profile_base, &manifest.spec.values)?;
    if !path.is_file() {
        return Err(RenderError::ProfileInvalid(format!(
            "values file {} is missing from the profile",
            manifest.spec.values
        )));
    }
    Ok(Some(path))
}
