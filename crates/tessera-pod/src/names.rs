//! Resource names and DNS names for deployment members.

use std::time::{SystemTime, UNIX_EPOCH};

use k8s_openapi::api::core::v1::PodSpec;
use regex::Regex;
use sha2::{Digest, Sha256};

use tessera_core::{Feature, FeatureSet};
use tessera_state::{ServerGroup, sha256_json};

use crate::error::{PodError, PodResult};

const MAX_NAME_LEN: usize = 63;

/// Check that `name` is a valid DNS-1123 label.
pub fn validate_resource_name(name: &str) -> PodResult<()> {
    let invalid = |reason| PodError::InvalidName {
        name: name.to_string(),
        reason,
    };
    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 63 characters"));
    }
    let label_re = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")?;
    if !label_re.is_match(name) {
        return Err(invalid(
            "must consist of lower case alphanumerics or '-', starting and ending with an alphanumeric",
        ));
    }
    Ok(())
}

/// Lowercase and drop characters not allowed in a resource name.
pub fn strip_invalid(s: &str) -> String {
    s.chars()
        .filter_map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            _ => None,
        })
        .collect()
}

fn trim_name(mut name: String) -> String {
    name.truncate(MAX_NAME_LEN);
    while name.ends_with('-') {
        name.pop();
    }
    name
}

/// Host name of a member: `{deployment}-{role}-{id}`.
pub fn pod_host_name(deployment: &str, group: ServerGroup, id: &str) -> String {
    trim_name(strip_invalid(&format!("{deployment}-{}-{id}", group.role())))
}

/// First 6 hex characters of the pod spec hash.
pub fn pod_suffix(spec: &PodSpec) -> PodResult<String> {
    let sum = sha256_json(spec)?;
    Ok(sum[..6].to_string())
}

fn random_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    hex::encode(Sha256::digest(nanos.to_le_bytes()))[..6].to_string()
}

/// Pod name of a member, honouring the pod name features.
pub fn pod_name(
    deployment: &str,
    group: ServerGroup,
    id: &str,
    spec: &PodSpec,
    features: &FeatureSet,
) -> PodResult<String> {
    let host = pod_host_name(deployment, group, id);
    if features.enabled(Feature::ShortPodNames) {
        return Ok(host);
    }
    let suffix = if features.enabled(Feature::RandomPodNames) {
        random_suffix()
    } else {
        pod_suffix(spec)?
    };
    // Keep the suffix intact when the host part is long.
    let host = trim_name(host.chars().take(MAX_NAME_LEN - suffix.len() - 1).collect());
    Ok(format!("{host}-{suffix}"))
}

/// Headless service giving members stable DNS names.
pub fn headless_service_name(deployment: &str) -> String {
    format!("{deployment}-int")
}

fn with_domain(name: String, domain: Option<&str>) -> String {
    match domain {
        Some(d) if !d.is_empty() => format!("{name}.{d}"),
        _ => name,
    }
}

/// `{deployment}-{role}-{id}.{deployment}-int.{namespace}.svc[.domain]`
pub fn pod_dns_name(
    deployment: &str,
    group: ServerGroup,
    id: &str,
    namespace: &str,
    domain: Option<&str>,
) -> String {
    with_domain(
        format!(
            "{}.{}.{namespace}.svc",
            pod_host_name(deployment, group, id),
            headless_service_name(deployment)
        ),
        domain,
    )
}

/// `{deployment}.{namespace}.svc[.domain]`
pub fn client_service_dns_name(deployment: &str, namespace: &str, domain: Option<&str>) -> String {
    with_domain(format!("{deployment}.{namespace}.svc"), domain)
}

/// PVC name of a member.
pub fn pvc_name(deployment: &str, group: ServerGroup, id: &str) -> String {
    trim_name(format!("{}-data", pod_host_name(deployment, group, id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_names() {
        assert!(validate_resource_name("abc").is_ok());
        assert!(validate_resource_name("db-1").is_ok());
        assert!(validate_resource_name("").is_err());
        assert!(validate_resource_name("Upper").is_err());
        assert!(validate_resource_name("name_underscore").is_err());
        assert!(validate_resource_name("-leading").is_err());
        assert!(validate_resource_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn host_name_is_lowercased() {
        assert_eq!(
            pod_host_name("db", ServerGroup::Coordinators, "CRDN-ab12"),
            "db-coordinator-crdn-ab12"
        );
    }

    #[test]
    fn dns_names() {
        assert_eq!(
            pod_dns_name("test", ServerGroup::Agents, "AGNT-1", "ns", None),
            "test-agent-agnt-1.test-int.ns.svc"
        );
        assert_eq!(
            pod_dns_name("test", ServerGroup::Agents, "AGNT-1", "ns", Some("cluster.local")),
            "test-agent-agnt-1.test-int.ns.svc.cluster.local"
        );
        assert_eq!(client_service_dns_name("test", "ns", None), "test.ns.svc");
        assert_eq!(
            client_service_dns_name("test", "ns", Some("cluster.local")),
            "test.ns.svc.cluster.local"
        );
    }

    #[test]
    fn pod_name_features() {
        let spec = PodSpec::default();
        let defaults = FeatureSet::default();
        let name = pod_name("db", ServerGroup::DBServers, "PRMR-1", &spec, &defaults).unwrap();
        assert_eq!(name, format!("db-dbserver-prmr-1-{}", pod_suffix(&spec).unwrap()));

        let short = defaults.with(Feature::ShortPodNames, true);
        assert_eq!(
            pod_name("db", ServerGroup::DBServers, "PRMR-1", &spec, &short).unwrap(),
            "db-dbserver-prmr-1"
        );

        let random = defaults.with(Feature::RandomPodNames, true);
        let name = pod_name("db", ServerGroup::DBServers, "PRMR-1", &spec, &random).unwrap();
        assert!(name.starts_with("db-dbserver-prmr-1-"));
        assert_eq!(name.len(), "db-dbserver-prmr-1-".len() + 6);
    }

    #[test]
    fn long_names_fit_and_keep_suffix() {
        let deployment = "x".repeat(70);
        let spec = PodSpec::default();
        let name = pod_name(&deployment, ServerGroup::Agents, "AGNT-1", &spec, &FeatureSet::default())
            .unwrap();
        assert!(name.len() <= 63);
        assert!(name.ends_with(&pod_suffix(&spec).unwrap()));
        assert!(validate_resource_name(&name).is_ok());
    }
}
