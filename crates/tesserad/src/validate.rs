//! Offline checks of deployment spec files.

use std::path::Path;

use anyhow::Context;

use tessera_pod::PodCreator;
use tessera_state::DeploymentSpec;

/// Parse a TOML deployment spec (camelCase keys, as in the custom resource).
pub fn load_spec(path: &Path) -> anyhow::Result<DeploymentSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let spec: DeploymentSpec =
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    Ok(spec)
}

/// Validate a spec file the way a reconciliation pass would. Returns the
/// spec checksum.
pub fn validate_spec_file(path: &Path) -> anyhow::Result<String> {
    validate_spec(&load_spec(path)?)
}

pub fn validate_spec(spec: &DeploymentSpec) -> anyhow::Result<String> {
    spec.validate()?;
    for group in spec.active_groups() {
        PodCreator::for_group(group).validate(spec)?;
    }
    Ok(spec.checksum()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn spec_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn valid_spec_yields_checksum() {
        let f = spec_file(
            r#"
image = "arangodb/arangodb:3.11"

[coordinators]
count = 3
minCount = 2
maxCount = 5
"#,
        );
        let checksum = validate_spec_file(f.path()).unwrap();
        assert_eq!(checksum.len(), 64);
        assert_eq!(load_spec(f.path()).unwrap().coordinators.count, Some(3));
    }

    #[test]
    fn count_above_maximum_is_rejected() {
        let f = spec_file(
            r#"
image = "arangodb/arangodb:3.11"

[coordinators]
count = 6
minCount = 2
maxCount = 5
"#,
        );
        let err = validate_spec_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("above maximum"), "{err}");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(validate_spec_file(Path::new("/nonexistent/spec.toml")).is_err());
    }
}
