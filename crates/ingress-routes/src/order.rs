//! Route precedence
//!
//! Follows the Ingress rules for multiple matches:
//! 1. The longest matching path wins
//! 2. At equal length an exact path beats a prefix
//!
//! The proxy evaluates routes in order and takes the first match, so the
//! collection is kept sorted by this order. Remaining ties keep their
//! relative order.

use std::cmp::Ordering;

use crate::route::{PathMatch, Route};

/// Total order over path matches; `Less` sorts first
pub fn compare_paths(a: &PathMatch, b: &PathMatch) -> Ordering {
    b.len()
        .cmp(&a.len())
        .then_with(|| b.is_exact().cmp(&a.is_exact()))
}

/// Total order over routes; `Less` sorts first
pub fn compare_precedence(a: &Route, b: &Route) -> Ordering {
    compare_paths(&a.path, &b.path)
}

/// Whether `a` must be evaluated before `b`
pub fn has_precedence(a: &Route, b: &Route) -> bool {
    compare_precedence(a, b) == Ordering::Less
}

/// Stable sort by precedence
pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(compare_precedence);
}
