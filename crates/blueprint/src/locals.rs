use std::collections::BTreeMap;

use crate::{
    Error, Result,
    api::{EksCluster, GkeCluster},
    cidr::NetworkRanges,
    vars,
};

/// Read-only configuration derived once per run and threaded through every layer.
#[derive(Debug, Clone)]
pub struct Locals {
    pub cluster_name: String,
    /// Labels attached to cloud resources (lowercase keys and values only).
    pub cloud_labels: BTreeMap<String, String>,
    pub kubernetes_labels: BTreeMap<String, String>,
    pub network_tag: String,
    pub pod_secondary_range_name: String,
    pub service_secondary_range_name: String,
    pub ranges: NetworkRanges,
}

impl Locals {
    pub fn for_gke(cluster: &GkeCluster) -> Result<Self> {
        let name = cluster
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingField("name"))?;
        Self::build(name, "gke", cluster.metadata.labels.as_ref())
    }

    pub fn for_eks(cluster: &EksCluster) -> Result<Self> {
        let name = cluster
            .metadata
            .name
            .as_deref()
            .ok_or(Error::MissingField("name"))?;
        Self::build(name, "eks", cluster.metadata.labels.as_ref())
    }

    fn build(name: &str, kind: &str, extra: Option<&BTreeMap<String, String>>) -> Result<Self> {
        let mut cloud_labels = cloud_labels(extra.into_iter().flatten())?;
        cloud_labels.insert("managed-by".to_string(), vars::MANAGED_BY.to_string());
        cloud_labels.insert("cluster-name".to_string(), name.to_string());
        cloud_labels.insert("cluster-kind".to_string(), kind.to_string());

        let mut kubernetes_labels = extra.cloned().unwrap_or_default();
        kubernetes_labels.insert(
            "app.kubernetes.io/managed-by".to_string(),
            vars::MANAGED_BY.to_string(),
        );
        kubernetes_labels.insert(format!("{}/cluster", vars::MANAGED_BY), name.to_string());

        Ok(Self {
            cluster_name: name.to_string(),
            cloud_labels,
            kubernetes_labels,
            network_tag: format!("{name}-gke-node"),
            pod_secondary_range_name: format!("{name}-pods"),
            service_secondary_range_name: format!("{name}-services"),
            ranges: NetworkRanges::cluster_default()?,
        })
    }
}

/// Sanitized copies of the cluster's labels. A key must still start with a letter after
/// sanitizing, and no two keys may sanitize to the same one.
fn cloud_labels<'a>(
    labels: impl Iterator<Item = (&'a String, &'a String)>,
) -> Result<BTreeMap<String, String>> {
    let mut sanitized = BTreeMap::new();
    for (key, value) in labels {
        let label = cloud_label(key);
        if !label.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(Error::InvalidInput(format!(
                "label key {key:?} must start with a letter"
            )));
        }
        if sanitized.insert(label.clone(), cloud_label(value)).is_some() {
            return Err(Error::InvalidInput(format!(
                "label key {key:?} collides with another label as {label:?}"
            )));
        }
    }
    Ok(sanitized)
}

/// GCP labels only allow lowercase letters, digits, `-` and `_`.
fn cloud_label(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '-' | '_') => c,
            _ => '_',
        })
        .take(63)
        .collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::api::tests::gke_input;

    #[test]
    fn gke_locals() {
        let locals = Locals::for_gke(&gke_input().target).unwrap();

        assert_eq!(locals.cluster_name, "demo");
        assert_eq!(locals.cloud_labels["cluster-kind"], "gke");
        assert_eq!(locals.cloud_labels["team"], "platform");
        assert_eq!(
            locals.kubernetes_labels["app.kubernetes.io/managed-by"],
            vars::MANAGED_BY
        );
        assert_eq!(locals.network_tag, "demo-gke-node");
        assert_eq!(locals.pod_secondary_range_name, "demo-pods");
    }

    #[test]
    fn cloud_labels_are_sanitized() {
        assert_eq!(cloud_label("app.kubernetes.io/Name"), "app_kubernetes_io_name");
    }

    #[rstest]
    #[case(&[("1team", "platform")])]
    #[case(&[("_team", "platform")])]
    #[case(&[("/team", "platform")])]
    #[case(&[("a.b", "one"), ("a_b", "two")])]
    #[case(&[("Team", "one"), ("team", "two")])]
    fn unusable_cloud_label_keys_are_rejected(#[case] labels: &[(&str, &str)]) {
        let mut cluster = gke_input().target;
        cluster.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );

        let err = Locals::for_gke(&cluster).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "{err}");
    }
}
