//! Proxy route records and their identity

use std::fmt;
use std::str::FromStr;

use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};

use crate::model::ObjectKey;

/// Request path matcher; a route carries exactly one
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PathMatch {
    /// Matches only the identical path
    Exact(String),
    /// Matches any path starting with the prefix
    Prefix(String),
}

impl PathMatch {
    /// Catch-all match used for missing paths and default backends
    pub fn root() -> Self {
        PathMatch::Prefix("/".to_string())
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathMatch::Exact(path) | PathMatch::Prefix(path) => path,
        }
    }

    /// Effective match length used for precedence
    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, PathMatch::Exact(_))
    }
}

impl fmt::Display for PathMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathMatch::Exact(path) => write!(f, "={}", path),
            PathMatch::Prefix(prefix) => write!(f, "{}*", prefix),
        }
    }
}

/// Certificate and key served for a route's host
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsMaterial {
    pub certificate: ByteString,
    pub private_key: ByteString,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("certificate_len", &self.certificate.0.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Identity of a route across reconciliations
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteId {
    pub name: String,
    pub namespace: String,
    pub host: String,
    pub path: String,
}

impl RouteId {
    pub fn new(owner: &ObjectKey, host: &str, path: &PathMatch) -> Self {
        Self {
            name: owner.name.clone(),
            namespace: owner.namespace.clone(),
            host: host.to_string(),
            path: path.as_str().to_string(),
        }
    }

    pub fn owner(&self) -> ObjectKey {
        ObjectKey::new(self.name.clone(), self.namespace.clone())
    }

    /// Stable string form handed to the downstream control plane
    pub fn marshal(&self) -> String {
        // Serializing four string fields cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} host={:?} path={:?}",
            self.namespace, self.name, self.host, self.path
        )
    }
}

impl FromStr for RouteId {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(s)
    }
}

/// A single proxy route
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Ingress that produced this route
    pub owner: ObjectKey,
    /// Host to match; empty matches any host
    pub host: String,
    #[serde(rename = "match")]
    pub path: PathMatch,
    /// Upstream URLs
    pub to: Vec<String>,
    pub allow_public_unauthenticated_access: bool,
    pub preserve_host_header: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsMaterial>,
    /// Marshaled [`RouteId`]
    pub id: String,
}

impl Route {
    /// Create a route with both flags off and no TLS
    pub fn new(owner: ObjectKey, host: impl Into<String>, path: PathMatch, to: String) -> Self {
        let host = host.into();
        let id = RouteId::new(&owner, &host, &path).marshal();
        Self {
            owner,
            host,
            path,
            to: vec![to],
            allow_public_unauthenticated_access: false,
            preserve_host_header: false,
            tls: None,
            id,
        }
    }

    pub fn route_id(&self) -> RouteId {
        RouteId::new(&self.owner, &self.host, &self.path)
    }

    pub fn is_owned_by(&self, owner: &ObjectKey) -> bool {
        self.owner == *owner
    }
}
