//! Ingress translation
//!
//! Expands one Ingress into its candidate routes: one per rule path, plus a
//! catch-all for the default backend. The result is unsorted; ordering is
//! applied when the routes are installed into a [`RouteList`].
//!
//! [`RouteList`]: crate::reconcile::RouteList

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::networking::v1::{HTTPIngressPath, IngressBackend};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::{annotations, secrets, LabelSelector, RoutesConfig};
use crate::model::{IngressInput, Lookups, ObjectKey};
use crate::resolver::{BackendResolver, ResolverError};
use crate::route::{PathMatch, Route, RouteId, TlsMaterial};

/// Path type with exact-match semantics; every other value is a prefix
const PATH_TYPE_EXACT: &str = "Exact";

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Backend resolution failed: {0}")]
    Backend(#[from] ResolverError),
    #[error("Invalid TLS secret {namespace}/{name}: {reason}")]
    InvalidTlsSecret {
        namespace: String,
        name: String,
        reason: String,
    },
    #[error("Duplicate route {0}")]
    DuplicateRoute(RouteId),
    #[error("Invalid value {value:?} for annotation {key}")]
    InvalidAnnotation { key: String, value: String },
}

/// Route flags derived from annotations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RouteOptions {
    secure_upstream: bool,
    allow_public_unauthenticated_access: bool,
    preserve_host_header: bool,
}

impl RouteOptions {
    fn from_input(input: &IngressInput) -> Result<Self, TranslateError> {
        Ok(Self {
            secure_upstream: annotation_flag(input, annotations::SECURE_UPSTREAM)?,
            allow_public_unauthenticated_access: annotation_flag(
                input,
                annotations::ALLOW_PUBLIC_UNAUTHENTICATED_ACCESS,
            )?,
            preserve_host_header: annotation_flag(input, annotations::PRESERVE_HOST_HEADER)?,
        })
    }

    /// Challenge solvers must be reachable by the validator without auth
    ///
    /// Only the upstream scheme is read from annotations; the access flags
    /// are forced on whatever the annotations say.
    fn for_challenge_solver(input: &IngressInput) -> Result<Self, TranslateError> {
        Ok(Self {
            secure_upstream: annotation_flag(input, annotations::SECURE_UPSTREAM)?,
            allow_public_unauthenticated_access: true,
            preserve_host_header: true,
        })
    }
}

/// Parse a boolean annotation value
///
/// Accepts the usual spellings: `1`, `t`, `T`, `TRUE`, `true`, `True` and
/// their false counterparts.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Read a boolean annotation; unset means false
fn annotation_flag(input: &IngressInput, suffix: &str) -> Result<bool, TranslateError> {
    let key = annotations::key(input.annotation_prefix(), suffix);
    match input.annotations().get(&key) {
        None => Ok(false),
        Some(value) => parse_bool(value).ok_or_else(|| TranslateError::InvalidAnnotation {
            key,
            value: value.clone(),
        }),
    }
}

/// Check if the Ingress carries the challenge solver label
fn is_challenge_solver(input: &IngressInput, label: &LabelSelector) -> bool {
    input
        .labels()
        .get(&label.key)
        .is_some_and(|value| *value == label.value)
}

/// Path matcher for an Ingress path; a missing path matches everything
fn path_match(path: &HTTPIngressPath) -> PathMatch {
    match path.path.as_deref() {
        None | Some("") => PathMatch::root(),
        Some(p) if path.path_type == PATH_TYPE_EXACT => PathMatch::Exact(p.to_string()),
        Some(p) => PathMatch::Prefix(p.to_string()),
    }
}

/// Translates Ingress resources into candidate routes
#[derive(Debug, Clone, Default)]
pub struct Translator {
    config: RoutesConfig,
}

impl Translator {
    pub fn new(config: RoutesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RoutesConfig {
        &self.config
    }

    /// Build the complete candidate route set for one Ingress
    ///
    /// Either every route is produced or an error is returned; there is no
    /// partial output.
    #[instrument(skip_all, fields(ingress = %input.owner()))]
    pub fn translate(
        &self,
        input: &IngressInput,
        lookups: &Lookups,
    ) -> Result<Vec<Route>, TranslateError> {
        let namespace = input.namespace();
        let options = if is_challenge_solver(input, &self.config.challenge_solver_label) {
            debug!("Ingress is a challenge solver, allowing unauthenticated access");
            RouteOptions::for_challenge_solver(input)?
        } else {
            RouteOptions::from_input(input)?
        };

        let mut set = CandidateSet {
            owner: input.owner(),
            namespace: &namespace,
            options,
            resolver: BackendResolver::new(lookups, &self.config.cluster_domain),
            input,
            lookups,
            tls_cache: BTreeMap::new(),
            seen: BTreeSet::new(),
            routes: Vec::new(),
        };

        for rule in input.rules() {
            let host = rule.host.as_deref().unwrap_or_default();
            let Some(http) = &rule.http else {
                debug!(host = %host, "Rule has no HTTP paths");
                continue;
            };
            for path in &http.paths {
                set.push(host, path_match(path), &path.backend)?;
            }
        }

        if let Some(backend) = input.default_backend() {
            let root = PathMatch::root();
            if set.routes.iter().any(|r| r.host.is_empty() && r.path == root) {
                debug!("Catch-all rule present, default backend not added");
            } else {
                set.push("", root, backend)?;
            }
        }

        info!(routes = set.routes.len(), "Translated ingress");
        Ok(set.routes)
    }
}

/// Routes accumulated for one Ingress
struct CandidateSet<'a> {
    owner: ObjectKey,
    namespace: &'a str,
    options: RouteOptions,
    resolver: BackendResolver<'a>,
    input: &'a IngressInput,
    lookups: &'a Lookups,
    tls_cache: BTreeMap<String, Option<TlsMaterial>>,
    seen: BTreeSet<RouteId>,
    routes: Vec<Route>,
}

impl CandidateSet<'_> {
    fn push(
        &mut self,
        host: &str,
        path: PathMatch,
        backend: &IngressBackend,
    ) -> Result<(), TranslateError> {
        let id = RouteId::new(&self.owner, host, &path);
        if !self.seen.insert(id.clone()) {
            return Err(TranslateError::DuplicateRoute(id));
        }

        let to = self
            .resolver
            .resolve(backend, self.namespace, self.options.secure_upstream)?;
        let tls = self.tls_for_host(host)?;

        let mut route = Route::new(self.owner.clone(), host, path, to);
        route.allow_public_unauthenticated_access =
            self.options.allow_public_unauthenticated_access;
        route.preserve_host_header = self.options.preserve_host_header;
        route.tls = tls;

        debug!(
            host = %route.host,
            path = %route.path,
            to = ?route.to,
            tls = route.tls.is_some(),
            "Built route"
        );
        self.routes.push(route);
        Ok(())
    }

    /// TLS material for `host`, from the first TLS block covering it
    fn tls_for_host(&mut self, host: &str) -> Result<Option<TlsMaterial>, TranslateError> {
        if let Some(cached) = self.tls_cache.get(host) {
            return Ok(cached.clone());
        }

        let block = self.input.tls().iter().find(|tls| {
            tls.hosts
                .as_deref()
                .map_or(true, |hosts| hosts.is_empty() || hosts.iter().any(|h| h == host))
        });

        let material = match block {
            Some(block) => Some(load_tls_secret(
                self.lookups,
                block.secret_name.as_deref(),
                self.namespace,
            )?),
            None => None,
        };

        self.tls_cache.insert(host.to_string(), material.clone());
        Ok(material)
    }
}

/// Load a `kubernetes.io/tls` Secret
fn load_tls_secret(
    lookups: &Lookups,
    secret_name: Option<&str>,
    namespace: &str,
) -> Result<TlsMaterial, TranslateError> {
    let invalid = |name: &str, reason: &str| TranslateError::InvalidTlsSecret {
        namespace: namespace.to_string(),
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let name = secret_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| invalid("", "TLS block has no secret name"))?;
    let secret = lookups
        .secret(&ObjectKey::new(name, namespace))
        .ok_or_else(|| invalid(name, "secret not found"))?;

    if secret.type_.as_deref() != Some(secrets::TLS_TYPE) {
        return Err(invalid(
            name,
            &format!(
                "expected type {}, got {}",
                secrets::TLS_TYPE,
                secret.type_.as_deref().unwrap_or("<none>")
            ),
        ));
    }

    let data = secret.data.as_ref();
    let certificate = data
        .and_then(|d| d.get(secrets::TLS_CERT_KEY))
        .ok_or_else(|| invalid(name, "missing tls.crt"))?;
    let private_key = data
        .and_then(|d| d.get(secrets::TLS_PRIVATE_KEY_KEY))
        .ok_or_else(|| invalid(name, "missing tls.key"))?;

    Ok(TlsMaterial {
        certificate: certificate.clone(),
        private_key: private_key.clone(),
    })
}
