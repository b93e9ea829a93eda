//! Deployments kept in a local redb file instead of custom resources.
//!
//! `tesserad apply` and `tesserad delete` edit the file; `tesserad run
//! --state` reconciles what it holds.

use std::path::Path;

use anyhow::Context;

use tessera_pod::names::validate_resource_name;
use tessera_state::StateStore;

use crate::validate::{load_spec, validate_spec};

pub fn open_state(path: &Path) -> anyhow::Result<StateStore> {
    StateStore::open(path).with_context(|| format!("opening state file {}", path.display()))
}

/// Validate the spec file and store it under `name`, keeping any status.
/// Returns the spec checksum.
pub fn apply_spec_file(store: &StateStore, name: &str, path: &Path) -> anyhow::Result<String> {
    validate_resource_name(name)?;
    let spec = load_spec(path)?;
    let checksum = validate_spec(&spec)?;
    store.put_deployment(name, &spec)?;
    Ok(checksum)
}

/// Forget a deployment. Its pods are left to their owner references.
pub fn delete_deployment(store: &StateStore, name: &str) -> anyhow::Result<()> {
    if !store.delete_deployment(name)? {
        anyhow::bail!("deployment {name} not found");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tessera_state::{StatusStore, with_status_update};

    const SPEC: &str = r#"
image = "arangodb/arangodb:3.11"

[coordinators]
count = 3
minCount = 2
maxCount = 5
"#;

    fn spec_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[tokio::test]
    async fn apply_keeps_status_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        let spec = spec_file(SPEC);

        let store = open_state(&path).unwrap();
        apply_spec_file(&store, "db", spec.path()).unwrap();
        with_status_update(&store, "db", |status| {
            status.accepted_spec_checksum = Some("seen".to_string());
            true
        })
        .await
        .unwrap();

        let newer = spec_file(&SPEC.replace("count = 3", "count = 4"));
        apply_spec_file(&store, "db", newer.path()).unwrap();
        drop(store);

        let store = open_state(&path).unwrap();
        assert_eq!(store.list_deployments().unwrap(), vec!["db".to_string()]);
        let current = store.read("db").await.unwrap();
        assert_eq!(current.spec.coordinators.count, Some(4));
        assert_eq!(current.status.accepted_spec_checksum.as_deref(), Some("seen"));
    }

    #[test]
    fn invalid_spec_or_name_is_not_stored() {
        let store = StateStore::open_in_memory().unwrap();
        let bad = spec_file(&SPEC.replace("count = 3", "count = 9"));
        assert!(apply_spec_file(&store, "db", bad.path()).is_err());
        let good = spec_file(SPEC);
        assert!(apply_spec_file(&store, "Not_A_Name", good.path()).is_err());
        assert!(store.list_deployments().unwrap().is_empty());
    }

    #[test]
    fn delete_of_unknown_deployment_fails() {
        let store = StateStore::open_in_memory().unwrap();
        let spec = spec_file(SPEC);
        apply_spec_file(&store, "db", spec.path()).unwrap();
        delete_deployment(&store, "db").unwrap();
        assert!(delete_deployment(&store, "db").is_err());
    }
}
