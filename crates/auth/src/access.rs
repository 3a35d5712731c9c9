//! Role → route access table and the policy evaluated on every request.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::{Role, Route};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessTableError {
    #[error("role {0} has no access entry")]
    MissingRole(Role),

    #[error("role {0} has an empty access entry")]
    EmptyEntry(Role),
}

/// Immutable mapping from each role to the routes it may reach.
///
/// Every role carries an explicit, non-empty entry. Built once at start-up and
/// shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTable {
    entries: BTreeMap<Role, BTreeSet<Route>>,
}

impl AccessTable {
    pub fn new<I, R>(entries: I) -> Result<Self, AccessTableError>
    where
        I: IntoIterator<Item = (Role, R)>,
        R: IntoIterator<Item = Route>,
    {
        let mut map: BTreeMap<Role, BTreeSet<Route>> = BTreeMap::new();
        for (role, routes) in entries {
            map.entry(role).or_default().extend(routes);
        }

        for role in Role::ALL {
            match map.get(&role) {
                None => return Err(AccessTableError::MissingRole(role)),
                Some(routes) if routes.is_empty() => return Err(AccessTableError::EmptyEntry(role)),
                Some(_) => {}
            }
        }

        Ok(Self { entries: map })
    }

    /// The farm's standard staffing table.
    pub fn standard() -> Self {
        let entries = BTreeMap::from([
            (Role::Admin, Route::all().into_iter().collect::<BTreeSet<_>>()),
            (
                Role::Manager,
                BTreeSet::from([
                    Route::ANIMALS,
                    Route::BULLS,
                    Route::INSEMINATIONS,
                    Route::PREGNANCY_CHECKS,
                    Route::REPORTS,
                ]),
            ),
            (
                Role::Vet,
                BTreeSet::from([
                    Route::ANIMALS,
                    Route::INSEMINATIONS,
                    Route::PREGNANCY_CHECKS,
                    Route::REPORTS,
                ]),
            ),
            (
                Role::Zootechnician,
                BTreeSet::from([
                    Route::ANIMALS,
                    Route::BULLS,
                    Route::INSEMINATIONS,
                    Route::PREGNANCY_CHECKS,
                    Route::REPORTS,
                ]),
            ),
            (Role::Caretaker, BTreeSet::from([Route::ANIMALS])),
            (
                Role::Inseminator,
                BTreeSet::from([Route::ANIMALS, Route::INSEMINATIONS]),
            ),
        ]);
        Self { entries }
    }

    pub fn routes_for(&self, role: Role) -> impl Iterator<Item = &Route> {
        self.entries.get(&role).into_iter().flat_map(|routes| routes.iter())
    }

    pub fn permits(&self, role: Role, route: &str) -> bool {
        self.entries
            .get(&role)
            .is_some_and(|routes| routes.contains(route))
    }
}

impl Default for AccessTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// ADMIN bypasses the table.
    AdminBypass,
    /// The role's entry lists the route.
    GrantedByTable,
    /// Default deny.
    NotInTable,
}

/// Auditable outcome of one access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub role: Role,
    pub route: String,
    pub granted: bool,
    pub reason: DecisionReason,
}

/// Stateless gate over an injected [`AccessTable`].
///
/// Callers pass the role the user holds *now*; nothing is cached here, so a
/// role change takes effect on the very next check.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    table: Arc<AccessTable>,
}

impl AccessPolicy {
    pub fn new(table: AccessTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &AccessTable {
        &self.table
    }

    pub fn is_authorized(&self, role: Role, route: &str) -> bool {
        role.is_admin() || self.table.permits(role, route)
    }

    pub fn explain(&self, role: Role, route: &str) -> AccessDecision {
        let reason = if role.is_admin() {
            DecisionReason::AdminBypass
        } else if self.table.permits(role, route) {
            DecisionReason::GrantedByTable
        } else {
            DecisionReason::NotInTable
        };

        AccessDecision {
            role,
            route: route.to_string(),
            granted: reason != DecisionReason::NotInTable,
            reason,
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(AccessTable::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_satisfies_construction_rules() {
        let standard = AccessTable::standard();
        let rebuilt = AccessTable::new(
            Role::ALL.map(|r| (r, standard.routes_for(r).cloned().collect::<Vec<_>>())),
        )
        .unwrap();
        assert_eq!(rebuilt, standard);
    }

    #[test]
    fn missing_role_is_rejected() {
        let err = AccessTable::new([(Role::Admin, vec![Route::USERS])]).unwrap_err();
        assert!(matches!(err, AccessTableError::MissingRole(_)));
    }

    #[test]
    fn empty_entry_is_rejected() {
        let mut entries: Vec<(Role, Vec<Route>)> =
            Role::ALL.iter().map(|r| (*r, vec![Route::ANIMALS])).collect();
        entries[4].1.clear();
        let err = AccessTable::new(entries).unwrap_err();
        assert_eq!(err, AccessTableError::EmptyEntry(Role::Caretaker));
    }

    #[test]
    fn admin_reaches_every_route_including_unknown_ones() {
        let policy = AccessPolicy::default();
        for route in Route::all() {
            assert!(policy.is_authorized(Role::Admin, route.as_str()));
        }
        assert!(policy.is_authorized(Role::Admin, "no-such-screen"));
    }

    #[test]
    fn default_deny_for_unlisted_routes() {
        let policy = AccessPolicy::default();
        assert!(policy.is_authorized(Role::Caretaker, "animals"));
        assert!(!policy.is_authorized(Role::Caretaker, "bulls"));
        assert!(!policy.is_authorized(Role::Inseminator, "users"));
        assert!(!policy.is_authorized(Role::Vet, "no-such-screen"));
    }

    #[test]
    fn alternate_tables_can_be_injected() {
        let table = AccessTable::new(Role::ALL.map(|r| (r, vec![Route::REPORTS]))).unwrap();
        let policy = AccessPolicy::new(table);
        assert!(policy.is_authorized(Role::Caretaker, "reports"));
        assert!(!policy.is_authorized(Role::Manager, "bulls"));
    }

    #[test]
    fn explain_names_the_reason() {
        let policy = AccessPolicy::default();
        assert_eq!(policy.explain(Role::Admin, "users").reason, DecisionReason::AdminBypass);

        let granted = policy.explain(Role::Vet, "pregnancy-checks");
        assert!(granted.granted);
        assert_eq!(granted.reason, DecisionReason::GrantedByTable);

        let denied = policy.explain(Role::Inseminator, "bulls");
        assert!(!denied.granted);
        assert_eq!(denied.reason, DecisionReason::NotInTable);
    }
}
