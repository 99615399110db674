#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use columnar_loader::{
    mapping::{MappingConfiguration, MappingDocument, MappingOverrides, resolve},
    memory::{Catalog, MemoryStore},
};
use tempfile::{TempDir, tempdir};

/// Catalog with a `demo.people` table used across the integration tests.
pub const PEOPLE_CATALOG: &str = "\
keyspaces:
  demo:
    people:
      columns:
        - name: name
          type: text
        - name: source
          type: text
        - name: loaded_at
          type: timestamp
        - name: line
          type: bigint
        - name: id
          type: uuid
        - name: tags
          type: set<text>
";

/// Same table with an `age int` column, so an `AGE` header auto-matches.
pub const PEOPLE_WITH_AGE_CATALOG: &str = "\
keyspaces:
  demo:
    people:
      columns:
        - name: name
          type: text
        - name: age
          type: int
        - name: source
          type: text
        - name: loaded_at
          type: timestamp
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn arg(path: &Path) -> &str {
        path.to_str().expect("utf-8 path")
    }
}

pub fn catalog(yaml: &str) -> Catalog {
    serde_yaml::from_str(yaml).expect("valid catalog yaml")
}

pub fn store(yaml: &str) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(catalog(yaml)))
}

pub fn mapping(json: &str) -> MappingConfiguration {
    let document = MappingDocument::parse(json).expect("valid mapping json");
    resolve(&document, &MappingOverrides::default()).expect("consistent mapping")
}

/// Tab-separated text from rows of cells.
pub fn tsv(rows: &[&[&str]]) -> String {
    rows.iter()
        .map(|row| format!("{}\n", row.join("\t")))
        .collect()
}
