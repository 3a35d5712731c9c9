use std::borrow::{Borrow, Cow};

use serde::{Deserialize, Serialize};

/// Identifier of an application route (a screen / resource family).
///
/// Opaque at this layer: the access table decides what a role may reach,
/// unknown identifiers simply never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route(Cow<'static, str>);

impl Route {
    pub const ANIMALS: Route = Route::from_static("animals");
    pub const BULLS: Route = Route::from_static("bulls");
    pub const INSEMINATIONS: Route = Route::from_static("inseminations");
    pub const PREGNANCY_CHECKS: Route = Route::from_static("pregnancy-checks");
    pub const REPORTS: Route = Route::from_static("reports");
    pub const USERS: Route = Route::from_static("users");

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Every route the application serves.
    pub fn all() -> [Route; 6] {
        [
            Route::ANIMALS,
            Route::BULLS,
            Route::INSEMINATIONS,
            Route::PREGNANCY_CHECKS,
            Route::REPORTS,
            Route::USERS,
        ]
    }
}

impl Borrow<str> for Route {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Route {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
