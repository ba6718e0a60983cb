//! Process-wide read-only catalog state (design note: "convert
//! [global mutable caches] to process-wide read-only state initialized at
//! startup from YAML paths declared in config").

use super::model::{Evidence, Gate, Importance, Phase, PathologyId, TransformOption};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

/// One catalog entry as it's stored on disk (`PATHOLOGY_PROFILE_PATH`).
#[derive(Debug, Clone, Deserialize)]
pub struct PathologyProfileEntry {
    pub id: PathologyId,
    pub importance: Importance,
    pub phase: Phase,
    pub transform_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PathologyProfileFile {
    pathologies: Vec<PathologyProfileEntry>,
}

/// One transform's catalog entry (`TRANSFORM_CATALOG_PATH`): named
/// rewrite family plus historical evidence and gate descriptions.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformCatalogEntry {
    pub transform_id: String,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub exemplars: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransformCatalogFile {
    transforms: Vec<TransformCatalogEntry>,
}

/// The loaded, read-only catalog pair a `PathologyEngine` and `Dispatcher`
/// both consult.
#[derive(Debug, Clone)]
pub struct Catalog {
    pathologies: HashMap<PathologyId, PathologyProfileEntry>,
    transforms: HashMap<String, TransformCatalogEntry>,
}

impl Catalog {
    pub fn load(pathology_profile_path: &str, transform_catalog_path: &str) -> Result<Self, anyhow::Error> {
        let pathology_raw = fs::read_to_string(pathology_profile_path)
            .map_err(|e| anyhow::anyhow!("reading {pathology_profile_path}: {e}"))?;
        let pathology_file: PathologyProfileFile = serde_yaml::from_str(&pathology_raw)
            .map_err(|e| anyhow::anyhow!("parsing {pathology_profile_path}: {e}"))?;

        let transform_raw = fs::read_to_string(transform_catalog_path)
            .map_err(|e| anyhow::anyhow!("reading {transform_catalog_path}: {e}"))?;
        let transform_file: TransformCatalogFile = serde_yaml::from_str(&transform_raw)
            .map_err(|e| anyhow::anyhow!("parsing {transform_catalog_path}: {e}"))?;

        Ok(Self {
            pathologies: pathology_file.pathologies.into_iter().map(|e| (e.id, e)).collect(),
            transforms: transform_file.transforms.into_iter().map(|e| (e.transform_id.clone(), e)).collect(),
        })
    }

    pub fn pathology(&self, id: PathologyId) -> Option<&PathologyProfileEntry> {
        self.pathologies.get(&id)
    }

    pub fn transform(&self, transform_id: &str) -> Option<&TransformCatalogEntry> {
        self.transforms.get(transform_id)
    }

    /// Build the `TransformOption`s a pathology's catalog entry names,
    /// resolving each transform id against the transform catalog.
    pub fn transform_options_for(&self, id: PathologyId) -> Vec<TransformOption> {
        let Some(entry) = self.pathology(id) else { return Vec::new() };
        entry
            .transform_ids
            .iter()
            .filter_map(|tid| self.transform(tid))
            .map(|t| TransformOption { transform_id: t.transform_id.clone(), evidence: t.evidence, gates: t.gates.clone() })
            .collect()
    }
}

static CATALOG: OnceCell<Catalog> = OnceCell::new();

/// Initialize the process-wide catalog once, at startup. Subsequent calls
/// with an already-initialized catalog are a no-op (mirrors `OnceCell`'s own
/// set-once contract).
pub fn init(pathology_profile_path: &str, transform_catalog_path: &str) -> Result<(), anyhow::Error> {
    let catalog = Catalog::load(pathology_profile_path, transform_catalog_path)?;
    let _ = CATALOG.set(catalog);
    Ok(())
}

pub fn get() -> &'static Catalog {
    CATALOG.get().expect("catalog::init must run before catalog::get is called")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writes the two catalog YAML files into a fresh temp dir and returns
    /// their paths; avoids depending on the real `conf/` fixtures so the
    /// test stays self-contained.
    fn write_fixture_files() -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("sql_optimizer_catalog_test_{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).expect("create temp dir");

        let pathology_path = dir.join("pathology_profile.yaml");
        std::fs::write(
            &pathology_path,
            r#"
pathologies:
  - id: P1
    importance: Two
    phase: RedundancyElimination
    transform_ids:
      - single_pass_aggregation
      - missing_transform
"#,
        )
        .expect("write pathology fixture");

        let transform_path = dir.join("transform_catalog.yaml");
        std::fs::write(
            &transform_path,
            r#"
transforms:
  - transform_id: single_pass_aggregation
    evidence:
      win_count: 12
      mean_speedup: 2.5
      worst_speedup: 1.1
    gates:
      - description: "no window function over the same grouping set"
"#,
        )
        .expect("write transform fixture");

        (pathology_path, transform_path)
    }

    #[test]
    fn loads_pathologies_and_transforms_from_yaml() {
        let (pathology_path, transform_path) = write_fixture_files();
        let catalog = Catalog::load(pathology_path.to_str().unwrap(), transform_path.to_str().unwrap())
            .expect("loads fixture catalog");

        let entry = catalog.pathology(PathologyId::P1).expect("P1 present");
        assert_eq!(entry.importance, Importance::Two);
        assert_eq!(entry.phase, Phase::RedundancyElimination);

        let transform = catalog.transform("single_pass_aggregation").expect("transform present");
        assert_eq!(transform.evidence.win_count, 12);
    }

    #[test]
    fn missing_pathology_id_resolves_to_none() {
        let (pathology_path, transform_path) = write_fixture_files();
        let catalog = Catalog::load(pathology_path.to_str().unwrap(), transform_path.to_str().unwrap()).unwrap();
        assert!(catalog.pathology(PathologyId::P9).is_none());
    }

    /// A transform id named in the pathology profile but absent from the
    /// transform catalog is silently dropped, not an error — the catalog
    /// author may intentionally retire a transform before removing every
    /// reference to it.
    #[test]
    fn transform_options_for_skips_ids_missing_from_transform_catalog() {
        let (pathology_path, transform_path) = write_fixture_files();
        let catalog = Catalog::load(pathology_path.to_str().unwrap(), transform_path.to_str().unwrap()).unwrap();
        let options = catalog.transform_options_for(PathologyId::P1);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].transform_id, "single_pass_aggregation");
    }

    #[test]
    fn load_fails_on_unreadable_path() {
        let result = Catalog::load("/nonexistent/path/pathology.yaml", "/nonexistent/path/transforms.yaml");
        assert!(result.is_err());
    }
}
