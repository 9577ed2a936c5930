//! Translation configuration and well-known keys

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label identifying a certificate-challenge solver ingress
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Label key
    pub key: String,
    /// Required label value
    pub value: String,
}

impl Default for LabelSelector {
    fn default() -> Self {
        Self {
            key: labels::HTTP01_SOLVER.to_string(),
            value: "true".to_string(),
        }
    }
}

/// Controller-wide settings consulted during translation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutesConfig {
    /// Prefix for recognized annotation keys (`<prefix>/<suffix>`)
    #[serde(default = "default_annotation_prefix")]
    pub annotation_prefix: String,
    /// DNS suffix of in-cluster service names
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,
    /// Marker set by issuance automation on challenge solver ingresses
    #[serde(default)]
    pub challenge_solver_label: LabelSelector,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            annotation_prefix: default_annotation_prefix(),
            cluster_domain: default_cluster_domain(),
            challenge_solver_label: LabelSelector::default(),
        }
    }
}

fn default_annotation_prefix() -> String {
    "ingress.access-proxy.io".to_string()
}

fn default_cluster_domain() -> String {
    "cluster.local".to_string()
}

/// Annotation suffixes recognized under the configured prefix
pub mod annotations {
    /// Use `https` to reach the upstream service
    pub const SECURE_UPSTREAM: &str = "secure-upstream";
    /// Skip proxy authentication for every route of the ingress
    pub const ALLOW_PUBLIC_UNAUTHENTICATED_ACCESS: &str = "allow-public-unauthenticated-access";
    /// Pass the original Host header to the upstream
    pub const PRESERVE_HOST_HEADER: &str = "preserve-host-header";

    /// Full annotation key for `suffix` under `prefix`
    pub fn key(prefix: &str, suffix: &str) -> String {
        format!("{}/{}", prefix, suffix)
    }
}

/// Labels recognized on ingress resources
pub mod labels {
    /// Set by cert-manager on HTTP-01 challenge solver ingresses
    pub const HTTP01_SOLVER: &str = "acme.cert-manager.io/http01-solver";
}

/// TLS secret layout
pub mod secrets {
    /// Required secret type
    pub const TLS_TYPE: &str = "kubernetes.io/tls";
    /// Certificate chain data key
    pub const TLS_CERT_KEY: &str = "tls.crt";
    /// Private key data key
    pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
}
