//! Shared route collection
//!
//! Many Ingress resources contribute to a single ordered route list. Each
//! reconciliation replaces exactly the contribution of one owner and leaves
//! every other owner's routes untouched, then restores precedence order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::model::{IngressInput, Lookups, ObjectKey};
use crate::order::sort_routes;
use crate::route::{Route, RouteId};
use crate::translate::{TranslateError, Translator};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Translate(#[from] TranslateError),
    #[error("Route {route} is not owned by {owner}")]
    ForeignOwner { route: RouteId, owner: ObjectKey },
    #[error("Duplicate route {0}")]
    DuplicateRoute(RouteId),
}

/// Ordered route collection shared by all owners
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteList {
    routes: Vec<Route>,
}

/// What an [`upsert`] changed for one owner
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Route ids new for this owner
    pub added: usize,
    /// Route ids no longer produced by this owner
    pub removed: usize,
    /// Route ids present before and after
    pub retained: usize,
}

impl UpsertSummary {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

impl RouteList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.routes.iter()
    }

    pub fn as_slice(&self) -> &[Route] {
        &self.routes
    }

    pub fn get(&self, id: &RouteId) -> Option<&Route> {
        self.routes.iter().find(|r| r.route_id() == *id)
    }

    /// Routes contributed by `owner`, in collection order
    pub fn owned_by<'a>(&'a self, owner: &'a ObjectKey) -> impl Iterator<Item = &'a Route> + 'a {
        self.routes.iter().filter(move |r| r.is_owned_by(owner))
    }

    /// Every owner with at least one route
    pub fn owners(&self) -> BTreeSet<ObjectKey> {
        self.routes.iter().map(|r| r.owner.clone()).collect()
    }

    /// Index the collection by route id
    ///
    /// Fails if two entries share an id, which means the collection was not
    /// built through [`upsert`].
    pub fn index(&self) -> Result<BTreeMap<RouteId, &Route>, ReconcileError> {
        let mut index = BTreeMap::new();
        for route in &self.routes {
            let id = route.route_id();
            if index.contains_key(&id) {
                return Err(ReconcileError::DuplicateRoute(id));
            }
            index.insert(id, route);
        }
        Ok(index)
    }

    pub fn into_inner(self) -> Vec<Route> {
        self.routes
    }
}

impl<'a> IntoIterator for &'a RouteList {
    type Item = &'a Route;
    type IntoIter = std::slice::Iter<'a, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}

/// Replace every route of `owner` with `candidates` and restore ordering
///
/// An empty candidate set removes the owner from the collection. Retained
/// routes keep their position, so reconciling an unchanged candidate set
/// leaves the collection identical. Routes of other owners keep their
/// relative order.
///
/// Candidates owned by someone else, or sharing a route id, are rejected
/// before the collection is touched.
#[instrument(skip_all, fields(owner = %owner, candidates = candidates.len()))]
pub fn upsert(
    collection: &mut RouteList,
    owner: &ObjectKey,
    candidates: Vec<Route>,
) -> Result<UpsertSummary, ReconcileError> {
    let mut incoming: BTreeMap<RouteId, Route> = BTreeMap::new();
    let mut order = Vec::with_capacity(candidates.len());
    for route in candidates {
        if !route.is_owned_by(owner) {
            return Err(ReconcileError::ForeignOwner {
                route: route.route_id(),
                owner: owner.clone(),
            });
        }
        let id = route.route_id();
        if incoming.contains_key(&id) {
            return Err(ReconcileError::DuplicateRoute(id));
        }
        order.push(id.clone());
        incoming.insert(id, route);
    }

    Ok(merge(collection, owner, order, incoming))
}

/// Remove every route of `owner`
pub fn delete(collection: &mut RouteList, owner: &ObjectKey) -> UpsertSummary {
    merge(collection, owner, Vec::new(), BTreeMap::new())
}

/// Swap the owner's routes in place, append new ones and re-sort
fn merge(
    collection: &mut RouteList,
    owner: &ObjectKey,
    order: Vec<RouteId>,
    mut incoming: BTreeMap<RouteId, Route>,
) -> UpsertSummary {
    let mut summary = UpsertSummary::default();
    let mut merged = Vec::with_capacity(collection.routes.len() + incoming.len());

    for route in std::mem::take(&mut collection.routes) {
        if !route.is_owned_by(owner) {
            merged.push(route);
            continue;
        }
        match incoming.remove(&route.route_id()) {
            Some(replacement) => {
                summary.retained += 1;
                merged.push(replacement);
            }
            None => summary.removed += 1,
        }
    }

    for id in order {
        if let Some(route) = incoming.remove(&id) {
            summary.added += 1;
            merged.push(route);
        }
    }

    sort_routes(&mut merged);
    collection.routes = merged;

    info!(
        added = summary.added,
        removed = summary.removed,
        retained = summary.retained,
        total = collection.routes.len(),
        "Upserted routes"
    );
    summary
}

/// Route collection guarded for single-writer access
#[derive(Debug, Default)]
pub struct SharedRoutes {
    routes: Mutex<RouteList>,
}

impl SharedRoutes {
    pub fn new(routes: RouteList) -> Self {
        Self {
            routes: Mutex::new(routes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouteList> {
        // The list is only ever replaced wholesale, so a poisoned lock still
        // holds a consistent collection.
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Translate `input` and install its routes
    ///
    /// Translation happens before the lock is taken; on error the collection
    /// is left exactly as it was.
    pub fn reconcile(
        &self,
        translator: &Translator,
        input: &IngressInput,
        lookups: &Lookups,
    ) -> Result<UpsertSummary, ReconcileError> {
        let owner = input.owner();
        let candidates = translator.translate(input, lookups).map_err(|e| {
            warn!(owner = %owner, error = %e, "Translation failed, routes unchanged");
            e
        })?;
        upsert(&mut self.lock(), &owner, candidates)
    }

    /// Remove an owner's routes, e.g. after its Ingress was deleted
    pub fn remove(&self, owner: &ObjectKey) -> UpsertSummary {
        delete(&mut self.lock(), owner)
    }

    /// Copy of the current collection
    pub fn snapshot(&self) -> RouteList {
        self.lock().clone()
    }
}
