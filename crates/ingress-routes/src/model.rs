//! Per-reconciliation input bundle
//!
//! Everything the translation needs is materialized up front: the Ingress
//! itself plus the Services and Secrets it references. Nothing here talks to
//! the API server.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend, IngressRule, IngressTLS};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::config::RoutesConfig;

/// Namespace used when an object carries none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Name and namespace of a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub name: String,
    pub namespace: String,
}

impl ObjectKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Key of an object, falling back to the default namespace
    pub fn of<K: ResourceExt>(obj: &K) -> Self {
        Self {
            name: obj.name_any(),
            namespace: obj
                .namespace()
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Services and Secrets available to one reconciliation
#[derive(Clone, Debug, Default)]
pub struct Lookups {
    services: BTreeMap<ObjectKey, Service>,
    secrets: BTreeMap<ObjectKey, Secret>,
}

impl Lookups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Service, keyed by its own metadata
    pub fn with_service(mut self, service: Service) -> Self {
        self.insert_service(service);
        self
    }

    /// Add a Secret, keyed by its own metadata
    pub fn with_secret(mut self, secret: Secret) -> Self {
        self.insert_secret(secret);
        self
    }

    pub fn insert_service(&mut self, service: Service) {
        self.services.insert(ObjectKey::of(&service), service);
    }

    pub fn insert_secret(&mut self, secret: Secret) {
        self.secrets.insert(ObjectKey::of(&secret), secret);
    }

    pub fn service(&self, key: &ObjectKey) -> Option<&Service> {
        self.services.get(key)
    }

    pub fn secret(&self, key: &ObjectKey) -> Option<&Secret> {
        self.secrets.get(key)
    }
}

/// One Ingress resource together with the annotation prefix in effect
#[derive(Clone, Debug)]
pub struct IngressInput {
    ingress: Ingress,
    annotation_prefix: String,
}

impl IngressInput {
    pub fn new(ingress: Ingress, annotation_prefix: impl Into<String>) -> Self {
        Self {
            ingress,
            annotation_prefix: annotation_prefix.into(),
        }
    }

    /// Bundle an Ingress using the configured annotation prefix
    pub fn from_config(ingress: Ingress, config: &RoutesConfig) -> Self {
        Self::new(ingress, config.annotation_prefix.clone())
    }

    pub fn ingress(&self) -> &Ingress {
        &self.ingress
    }

    /// Owner identity stamped on every produced route
    pub fn owner(&self) -> ObjectKey {
        ObjectKey::of(&self.ingress)
    }

    pub fn namespace(&self) -> String {
        self.ingress
            .namespace()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    pub fn annotation_prefix(&self) -> &str {
        &self.annotation_prefix
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        self.ingress.annotations()
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        self.ingress.labels()
    }

    pub fn rules(&self) -> &[IngressRule] {
        self.ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.rules.as_deref())
            .unwrap_or_default()
    }

    pub fn tls(&self) -> &[IngressTLS] {
        self.ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.tls.as_deref())
            .unwrap_or_default()
    }

    pub fn default_backend(&self) -> Option<&IngressBackend> {
        self.ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.default_backend.as_ref())
    }
}
