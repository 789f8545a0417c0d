//! Project file loading for the subcommands.

use std::path::Path;

use thiserror::Error;

use clawdaw_spec::validation::migrate::{load_project_str, MigrationReport};
use clawdaw_spec::{Project, SpecError};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: SpecError,
    },
}

/// A project read from disk, migrated and repaired.
#[derive(Debug)]
pub struct LoadResult {
    pub project: Project,
    pub migration: MigrationReport,
    /// BLAKE3 of the file bytes as read.
    pub source_hash: String,
}

pub fn load_project(path: &Path) -> Result<LoadResult, InputError> {
    let text = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let source_hash = blake3::hash(text.as_bytes()).to_hex().to_string();
    let (project, migration) = load_project_str(&text).map_err(|source| InputError::Load {
        path: path.display().to_string(),
        source,
    })?;
    Ok(LoadResult {
        project,
        migration,
        source_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawdaw_spec::validation::migrate::to_json_pretty;

    #[test]
    fn loads_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        let project = Project::new("demo", 110.0);
        std::fs::write(&path, to_json_pretty(&project).unwrap()).unwrap();

        let loaded = load_project(&path).unwrap();
        assert_eq!(loaded.project, project);
        assert!(loaded.migration.is_clean());
        assert_eq!(loaded.source_hash.len(), 64);
    }

    #[test]
    fn errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = load_project(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
        assert!(matches!(
            load_project(&dir.path().join("missing.json")),
            Err(InputError::Read { .. })
        ));
    }
}
