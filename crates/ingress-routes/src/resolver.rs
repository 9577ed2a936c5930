//! Backend resolution
//!
//! Maps an Ingress backend reference to an upstream URL:
//! 1. ExternalName Services pass their DNS name through unchanged
//! 2. Everything else resolves to the in-cluster service DNS name
//!
//! The Service's declared port is used, never its target port.

use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::api::networking::v1::{IngressBackend, ServiceBackendPort};
use thiserror::Error;
use tracing::debug;

use crate::model::{Lookups, ObjectKey};

/// Service type that aliases an external DNS name
const EXTERNAL_NAME_TYPE: &str = "ExternalName";

/// Port name that implies a TLS upstream
const HTTPS_PORT_NAME: &str = "https";

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Service {namespace}/{name} not found")]
    BackendNotFound { namespace: String, name: String },
    #[error("Service {namespace}/{name} has no port {port}")]
    PortNotFound {
        namespace: String,
        name: String,
        port: String,
    },
    #[error("Backend does not reference a Service")]
    NotAService,
    #[error("ExternalName Service {namespace}/{name} has no external name")]
    MissingExternalName { namespace: String, name: String },
}

/// Resolves backend references against the Services of one reconciliation
pub struct BackendResolver<'a> {
    lookups: &'a Lookups,
    cluster_domain: &'a str,
}

impl<'a> BackendResolver<'a> {
    pub fn new(lookups: &'a Lookups, cluster_domain: &'a str) -> Self {
        Self {
            lookups,
            cluster_domain,
        }
    }

    /// Resolve `backend` in `namespace` to an upstream URL
    pub fn resolve(
        &self,
        backend: &IngressBackend,
        namespace: &str,
        secure_upstream: bool,
    ) -> Result<String, ResolverError> {
        let service_ref = backend.service.as_ref().ok_or(ResolverError::NotAService)?;
        let key = ObjectKey::new(service_ref.name.clone(), namespace);

        let service = self
            .lookups
            .service(&key)
            .ok_or_else(|| ResolverError::BackendNotFound {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            })?;

        let port_ref = service_ref.port.as_ref();
        let port = port_ref
            .and_then(|p| find_port(service, p))
            .ok_or_else(|| ResolverError::PortNotFound {
                namespace: key.namespace.clone(),
                name: key.name.clone(),
                port: port_ref.map(describe_port).unwrap_or_else(|| "<unset>".to_string()),
            })?;

        let host = if is_external_name(service) {
            service
                .spec
                .as_ref()
                .and_then(|spec| spec.external_name.as_deref())
                .filter(|name| !name.is_empty())
                .ok_or_else(|| ResolverError::MissingExternalName {
                    namespace: key.namespace.clone(),
                    name: key.name.clone(),
                })?
                .to_string()
        } else {
            format!("{}.{}.svc.{}", key.name, key.namespace, self.cluster_domain)
        };

        let secure = secure_upstream
            || port
                .name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case(HTTPS_PORT_NAME));
        let scheme = if secure { "https" } else { "http" };
        let url = format!("{}://{}:{}", scheme, host, port.port);

        debug!(service = %key, upstream = %url, "Resolved backend");
        Ok(url)
    }
}

fn is_external_name(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|spec| spec.type_.as_deref())
        .is_some_and(|t| t == EXTERNAL_NAME_TYPE)
}

/// Find the Service port a backend refers to; a number wins over a name
fn find_port<'s>(service: &'s Service, port_ref: &ServiceBackendPort) -> Option<&'s ServicePort> {
    let ports = service.spec.as_ref()?.ports.as_ref()?;

    match (port_ref.number, port_ref.name.as_deref()) {
        (Some(number), _) if number != 0 => ports.iter().find(|p| p.port == number),
        (_, Some(name)) if !name.is_empty() => {
            ports.iter().find(|p| p.name.as_deref() == Some(name))
        }
        _ => None,
    }
}

fn describe_port(port_ref: &ServiceBackendPort) -> String {
    match (port_ref.number, port_ref.name.as_deref()) {
        (Some(number), _) if number != 0 => number.to_string(),
        (_, Some(name)) if !name.is_empty() => name.to_string(),
        _ => "<unset>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ServiceSpec;
    use k8s_openapi::api::networking::v1::IngressServiceBackend;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    fn port(name: &str, number: i32, target: i32) -> ServicePort {
        ServicePort {
            name: Some(name.to_string()),
            port: number,
            target_port: Some(IntOrString::Int(target)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }
    }

    fn internal_service(name: &str, ports: Vec<ServicePort>) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(ports),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn external_service(
        name: &str,
        external_name: Option<&str>,
        ports: Vec<ServicePort>,
    ) -> Service {
        let mut service = internal_service(name, ports);
        if let Some(spec) = service.spec.as_mut() {
            spec.type_ = Some("ExternalName".to_string());
            spec.external_name = external_name.map(str::to_string);
        }
        service
    }

    fn backend_by_name(service: &str, port: &str) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    name: Some(port.to_string()),
                    number: None,
                }),
            }),
            resource: None,
        }
    }

    fn backend_by_number(service: &str, port: i32) -> IngressBackend {
        IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    name: None,
                    number: Some(port),
                }),
            }),
            resource: None,
        }
    }

    #[test]
    fn test_internal_service() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("http", 80, 8080)]));
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let url = resolver
            .resolve(&backend_by_name("service", "http"), "default", false)
            .unwrap();
        assert_eq!(url, "http://service.default.svc.cluster.local:80");
    }

    #[test]
    fn test_internal_service_by_number_uses_service_port() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("web", 8089, 9000)]));
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let url = resolver
            .resolve(&backend_by_number("service", 8089), "default", false)
            .unwrap();
        assert_eq!(url, "http://service.default.svc.cluster.local:8089");
    }

    #[test]
    fn test_custom_cluster_domain() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("http", 80, 80)]));
        let resolver = BackendResolver::new(&lookups, "corp.internal");

        let url = resolver
            .resolve(&backend_by_name("service", "http"), "default", false)
            .unwrap();
        assert_eq!(url, "http://service.default.svc.corp.internal:80");
    }

    #[test]
    fn test_https_port_name_implies_secure() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("HTTPS", 443, 443)]));
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let url = resolver
            .resolve(&backend_by_number("service", 443), "default", false)
            .unwrap();
        assert_eq!(url, "https://service.default.svc.cluster.local:443");
    }

    #[test]
    fn test_secure_upstream_requested() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("app", 8443, 8443)]));
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let url = resolver
            .resolve(&backend_by_name("service", "app"), "default", true)
            .unwrap();
        assert_eq!(url, "https://service.default.svc.cluster.local:8443");
    }

    #[test]
    fn test_external_name_passthrough() {
        let lookups = Lookups::new().with_service(external_service(
            "service",
            Some("service.external.com"),
            vec![ServicePort {
                name: Some("app".to_string()),
                port: 9999,
                ..Default::default()
            }],
        ));
        let resolver = BackendResolver::new(&lookups, "cluster.local");
        let backend = backend_by_name("service", "app");

        assert_eq!(
            resolver.resolve(&backend, "default", false).unwrap(),
            "http://service.external.com:9999"
        );
        assert_eq!(
            resolver.resolve(&backend, "default", true).unwrap(),
            "https://service.external.com:9999"
        );
    }

    #[test]
    fn test_external_name_missing_dns_name() {
        let lookups = Lookups::new().with_service(external_service(
            "service",
            None,
            vec![port("app", 9999, 9999)],
        ));
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let err = resolver
            .resolve(&backend_by_name("service", "app"), "default", false)
            .unwrap_err();
        assert!(matches!(err, ResolverError::MissingExternalName { .. }));
    }

    #[test]
    fn test_service_not_found() {
        let lookups = Lookups::new();
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let err = resolver
            .resolve(&backend_by_name("missing", "http"), "default", false)
            .unwrap_err();
        assert!(matches!(
            err,
            ResolverError::BackendNotFound { ref name, ref namespace }
                if name == "missing" && namespace == "default"
        ));
        assert_eq!(err.to_string(), "Service default/missing not found");
    }

    #[test]
    fn test_service_in_other_namespace_not_found() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("http", 80, 80)]));
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let err = resolver
            .resolve(&backend_by_name("service", "http"), "prod", false)
            .unwrap_err();
        assert!(matches!(err, ResolverError::BackendNotFound { .. }));
    }

    #[test]
    fn test_port_not_found() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("http", 80, 80)]));
        let resolver = BackendResolver::new(&lookups, "cluster.local");

        let err = resolver
            .resolve(&backend_by_name("service", "grpc"), "default", false)
            .unwrap_err();
        assert!(matches!(err, ResolverError::PortNotFound { ref port, .. } if port == "grpc"));

        let err = resolver
            .resolve(&backend_by_number("service", 8080), "default", false)
            .unwrap_err();
        assert!(matches!(err, ResolverError::PortNotFound { ref port, .. } if port == "8080"));
    }

    #[test]
    fn test_port_unset() {
        let lookups =
            Lookups::new().with_service(internal_service("service", vec![port("http", 80, 80)]));
        let resolver = BackendResolver::new(&lookups, "cluster.local");
        let backend = IngressBackend {
            service: Some(IngressServiceBackend {
                name: "service".to_string(),
                port: None,
            }),
            resource: None,
        };

        let err = resolver.resolve(&backend, "default", false).unwrap_err();
        assert!(matches!(err, ResolverError::PortNotFound { ref port, .. } if port == "<unset>"));
    }

    #[test]
    fn test_resource_backend_rejected() {
        let lookups = Lookups::new();
        let resolver = BackendResolver::new(&lookups, "cluster.local");
        let backend = IngressBackend {
            service: None,
            resource: None,
        };

        let err = resolver.resolve(&backend, "default", false).unwrap_err();
        assert!(matches!(err, ResolverError::NotAService));
    }
}
