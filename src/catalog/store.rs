//! Catalog and check-bank stores — process-wide immutable snapshots with
//! an explicit, atomic reload.
//!
//! In-flight requests hold an `Arc` to the snapshot they started with and
//! never observe a reload mid-pipeline.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::catalog::FALLBACK_FLOW;
use crate::catalog::model::FlowPack;
use crate::error::CatalogError;
use crate::session::model::MicroCheck;

/// Immutable view over the loaded flow packs, preserving catalog order.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    packs: Vec<FlowPack>,
    by_id: HashMap<String, usize>,
}

impl CatalogSnapshot {
    pub fn from_packs(packs: Vec<FlowPack>) -> Self {
        let by_id = packs
            .iter()
            .enumerate()
            .map(|(i, p)| (p.flow_id.clone(), i))
            .collect();
        Self { packs, by_id }
    }

    pub fn get(&self, flow_id: &str) -> Option<&FlowPack> {
        self.by_id.get(flow_id).map(|&i| &self.packs[i])
    }

    /// Packs in catalog (file name) order — the stable-sort tie-break order.
    pub fn list(&self) -> &[FlowPack] {
        &self.packs
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Resolve a flow id with a fallback chain: requested id →
    /// designated fallback flow → first catalog entry. Only an empty
    /// catalog fails, and that is caught at load time.
    pub fn get_or_fallback(&self, flow_id: &str) -> Option<&FlowPack> {
        self.get(flow_id)
            .or_else(|| self.get(FALLBACK_FLOW))
            .or_else(|| self.packs.first())
    }
}

/// Flow pack catalog with atomic-swap reload.
#[derive(Debug)]
pub struct CatalogStore {
    flows_dir: Option<PathBuf>,
    inner: RwLock<Arc<CatalogSnapshot>>,
}

impl CatalogStore {
    /// Load all `*.json` flow packs under `dir`, sorted by file name.
    ///
    /// An empty catalog is a configuration error, fatal at startup.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref().to_path_buf();
        let snapshot = read_packs(&dir)?;
        info!(count = snapshot.len(), dir = %dir.display(), "Loaded flow catalog");
        Ok(Self {
            flows_dir: Some(dir),
            inner: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Build a catalog directly from packs (tests, embedded defaults).
    pub fn from_packs(packs: Vec<FlowPack>) -> Result<Self, CatalogError> {
        if packs.is_empty() {
            return Err(CatalogError::Empty {
                dir: "<in-memory>".into(),
            });
        }
        Ok(Self {
            flows_dir: None,
            inner: RwLock::new(Arc::new(CatalogSnapshot::from_packs(packs))),
        })
    }

    /// Current snapshot. Callers keep the `Arc` for the whole pipeline run.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.inner.read().expect("catalog lock poisoned").clone()
    }

    /// Re-read the flows directory and swap the snapshot atomically.
    /// On any error the previous snapshot stays in place.
    pub fn reload(&self) -> Result<usize, CatalogError> {
        let Some(dir) = &self.flows_dir else {
            // In-memory catalogs have nothing to reload from.
            return Ok(self.snapshot().len());
        };
        let snapshot = read_packs(dir)?;
        let count = snapshot.len();
        *self.inner.write().expect("catalog lock poisoned") = Arc::new(snapshot);
        info!(count, "Reloaded flow catalog");
        Ok(count)
    }
}

fn read_packs(dir: &Path) -> Result<CatalogSnapshot, CatalogError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| CatalogError::Io {
            path: dir.display().to_string(),
            source,
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut packs = Vec::new();
    for path in paths {
        let text = std::fs::read_to_string(&path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let pack: FlowPack =
            serde_json::from_str(&text).map_err(|e| CatalogError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        packs.push(pack);
    }

    if packs.is_empty() {
        return Err(CatalogError::Empty {
            dir: dir.display().to_string(),
        });
    }
    Ok(CatalogSnapshot::from_packs(packs))
}

// ── Check bank ───────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
struct CheckBankFile {
    #[serde(default)]
    checks: Vec<MicroCheck>,
}

/// Shared micro-check bank, keyed by check id, reloaded alongside the
/// catalog.
pub struct CheckBank {
    path: Option<PathBuf>,
    inner: RwLock<Arc<BTreeMap<String, MicroCheck>>>,
}

impl CheckBank {
    /// Load the shared check bank. A missing file is soft: micro-checks
    /// degrade to the generated ones only.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let checks = read_checks(&path)?;
        info!(count = checks.len(), path = %path.display(), "Loaded micro-check bank");
        Ok(Self {
            path: Some(path),
            inner: RwLock::new(Arc::new(checks)),
        })
    }

    pub fn from_checks(checks: Vec<MicroCheck>) -> Self {
        let map = checks
            .into_iter()
            .map(|c| (c.check_id.clone(), c))
            .collect();
        Self {
            path: None,
            inner: RwLock::new(Arc::new(map)),
        }
    }

    pub fn snapshot(&self) -> Arc<BTreeMap<String, MicroCheck>> {
        self.inner.read().expect("check bank lock poisoned").clone()
    }

    pub fn reload(&self) -> Result<usize, CatalogError> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot().len());
        };
        let checks = read_checks(path)?;
        let count = checks.len();
        *self.inner.write().expect("check bank lock poisoned") = Arc::new(checks);
        Ok(count)
    }
}

fn read_checks(path: &Path) -> Result<BTreeMap<String, MicroCheck>, CatalogError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: CheckBankFile = serde_json::from_str(&text).map_err(|e| CatalogError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(file
        .checks
        .into_iter()
        .map(|c| (c.check_id.clone(), c))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_pack(dir: &Path, name: &str, flow_id: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        write!(
            file,
            r#"{{"flow_id": "{flow_id}", "title": "{flow_id} title", "description": "d"}}"#
        )
        .unwrap();
    }

    #[test]
    fn loads_packs_in_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "02_second.json", "second");
        write_pack(dir.path(), "01_first.json", "first");

        let store = CatalogStore::load(dir.path()).unwrap();
        let snapshot = store.snapshot();
        let ids: Vec<&str> = snapshot.list().iter().map(|p| p.flow_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn empty_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CatalogStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, CatalogError::Empty { .. }));
    }

    #[test]
    fn reload_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "a.json", "alpha");
        let store = CatalogStore::load(dir.path()).unwrap();
        let before = store.snapshot();
        assert_eq!(before.len(), 1);

        write_pack(dir.path(), "b.json", "beta");
        let count = store.reload().unwrap();
        assert_eq!(count, 2);

        // The old snapshot is untouched; only new lookups see the swap.
        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn failed_reload_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "a.json", "alpha");
        let store = CatalogStore::load(dir.path()).unwrap();

        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn fallback_chain_prefers_designated_flow() {
        let packs = vec![
            serde_json::from_str::<FlowPack>(
                r#"{"flow_id": "other", "title": "Other", "description": "d"}"#,
            )
            .unwrap(),
            serde_json::from_str::<FlowPack>(
                r#"{"flow_id": "f1_work_basics", "title": "Basics", "description": "d"}"#,
            )
            .unwrap(),
        ];
        let store = CatalogStore::from_packs(packs).unwrap();
        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.get_or_fallback("missing").unwrap().flow_id,
            "f1_work_basics"
        );
        assert_eq!(snapshot.get_or_fallback("other").unwrap().flow_id, "other");
    }

    #[test]
    fn fallback_chain_uses_first_entry_without_designated_flow() {
        let packs = vec![
            serde_json::from_str::<FlowPack>(
                r#"{"flow_id": "only", "title": "Only", "description": "d"}"#,
            )
            .unwrap(),
        ];
        let store = CatalogStore::from_packs(packs).unwrap();
        assert_eq!(
            store.snapshot().get_or_fallback("missing").unwrap().flow_id,
            "only"
        );
    }

    #[test]
    fn empty_in_memory_catalog_is_rejected() {
        assert!(CatalogStore::from_packs(Vec::new()).is_err());
    }

    #[test]
    fn missing_check_bank_is_soft() {
        let bank = CheckBank::load("/nonexistent/micro_checks.json").unwrap();
        assert!(bank.snapshot().is_empty());
    }

    #[test]
    fn check_bank_loads_and_keys_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checks.json");
        std::fs::write(
            &path,
            r#"{"checks": [{
                "check_id": "mc_1",
                "prompt": "p",
                "options": ["a", "b"],
                "correct_option": "a",
                "explanation": "e"
            }]}"#,
        )
        .unwrap();
        let bank = CheckBank::load(&path).unwrap();
        assert!(bank.snapshot().contains_key("mc_1"));
    }
}
