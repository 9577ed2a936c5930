//! ingress-routes: translate Kubernetes Ingress resources into ordered
//! access-proxy routes
//!
//! # Data Flow
//! ```text
//! IngressInput + Lookups (Services, Secrets)
//!     → translate.rs (rules, default backend, TLS, annotations)
//!         → resolver.rs (backend → upstream URL)
//!     → candidate routes for one owner
//!     → reconcile.rs (replace owner's routes in the shared RouteList)
//!         → order.rs (longest match first, exact before prefix)
//! ```

pub mod config;
pub mod model;
pub mod order;
pub mod reconcile;
pub mod resolver;
pub mod route;
pub mod translate;

pub use config::RoutesConfig;
pub use model::{IngressInput, Lookups, ObjectKey};
pub use reconcile::{delete, upsert, ReconcileError, RouteList, SharedRoutes, UpsertSummary};
pub use resolver::ResolverError;
pub use route::{PathMatch, Route, RouteId, TlsMaterial};
pub use translate::{TranslateError, Translator};
