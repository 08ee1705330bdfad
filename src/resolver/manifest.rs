//! Unit manifests: `<dir>/<unit>/package.json` files naming a unit and its dependencies.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ResolverError;

/// File name looked up inside every unit directory.
pub const MANIFEST_FILE: &str = "package.json";

/// Name and declared dependencies of one loadable unit.
///
/// `dependencies` is read from a JSON object whose keys are unit names (values are ignored);
/// a plain array of names is accepted too.
///
/// ```
/// use taskcore::resolver::UnitManifest;
///
/// let m: UnitManifest = serde_json::from_str(
///     r#"{"name": "guider", "dependencies": {"camera": "^1.0", "mount": "*"}}"#,
/// ).unwrap();
/// assert_eq!(m.dependencies, vec!["camera", "mount"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitManifest {
    pub name: String,
    #[serde(default, deserialize_with = "dependency_names")]
    pub dependencies: Vec<String>,
}

impl UnitManifest {
    pub fn new<I, S>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses one manifest file.
    pub fn from_path(path: &Path) -> Result<Self, ResolverError> {
        let raw = fs::read_to_string(path).map_err(|source| ResolverError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ResolverError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Dependencies {
    Object(BTreeMap<String, serde_json::Value>),
    List(Vec<String>),
}

fn dependency_names<'de, D>(de: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Dependencies>::deserialize(de)? {
        Some(Dependencies::Object(map)) => map.into_keys().collect(),
        Some(Dependencies::List(names)) => names,
        None => Vec::new(),
    })
}

/// Reads `<dir>/*/package.json`, in directory-name order.
///
/// Subdirectories without a manifest are skipped; an unreadable or malformed manifest is an error.
pub fn load_manifests(dir: impl AsRef<Path>) -> Result<Vec<UnitManifest>, ResolverError> {
    let dir = dir.as_ref();
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ResolverError::Io { path, source }
    };

    let mut unit_dirs: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err(dir))? {
        let entry = entry.map_err(io_err(dir))?;
        let path = entry.path();
        if path.is_dir() {
            unit_dirs.push(path);
        }
    }
    unit_dirs.sort();

    let mut manifests = Vec::with_capacity(unit_dirs.len());
    for unit_dir in unit_dirs {
        let path = unit_dir.join(MANIFEST_FILE);
        if !path.is_file() {
            tracing::debug!(dir = %unit_dir.display(), "no manifest, skipping");
            continue;
        }
        let manifest = UnitManifest::from_path(&path)?;
        tracing::trace!(unit = %manifest.name, deps = ?manifest.dependencies, "manifest loaded");
        manifests.push(manifest);
    }
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_unit(root: &Path, dir: &str, body: &str) {
        let unit = root.join(dir);
        fs::create_dir_all(&unit).unwrap();
        fs::write(unit.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn test_dependency_shapes() {
        let obj: UnitManifest =
            serde_json::from_str(r#"{"name": "a", "dependencies": {"z": "1", "b": "2"}}"#).unwrap();
        assert_eq!(obj.dependencies, vec!["b", "z"]);

        let list: UnitManifest =
            serde_json::from_str(r#"{"name": "a", "dependencies": ["z", "b"]}"#).unwrap();
        assert_eq!(list.dependencies, vec!["z", "b"]);

        let none: UnitManifest = serde_json::from_str(r#"{"name": "a"}"#).unwrap();
        assert!(none.dependencies.is_empty());
        let null: UnitManifest =
            serde_json::from_str(r#"{"name": "a", "dependencies": null}"#).unwrap();
        assert!(null.dependencies.is_empty());
    }

    #[test]
    fn test_load_sorted_and_skips_bare_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write_unit(tmp.path(), "b_mount", r#"{"name": "mount"}"#);
        write_unit(
            tmp.path(),
            "a_guider",
            r#"{"name": "guider", "dependencies": {"mount": "*"}}"#,
        );
        fs::create_dir_all(tmp.path().join("c_assets")).unwrap();
        fs::write(tmp.path().join("README"), "not a unit").unwrap();

        let manifests = load_manifests(tmp.path()).unwrap();
        assert_eq!(
            manifests,
            vec![
                UnitManifest::new("guider", ["mount"]),
                UnitManifest::new("mount", Vec::<String>::new()),
            ]
        );
    }

    #[test]
    fn test_load_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = load_manifests(tmp.path().join("nope")).unwrap_err();
        assert_eq!(missing.as_label(), "resolver_io");

        write_unit(tmp.path(), "bad", "{ not json");
        let bad = load_manifests(tmp.path()).unwrap_err();
        assert!(matches!(
            bad,
            ResolverError::Manifest { ref path, .. } if path.ends_with("bad/package.json")
        ));
    }
}
