//! `herdbook-auth` — who may do what.
//!
//! Roles, the role→route access table and its policy, the user aggregate,
//! bearer-token claims and the server-side session registry. No HTTP here.

pub mod access;
pub mod claims;
pub mod roles;
pub mod routes;
pub mod session;
pub mod user;

pub use access::{AccessDecision, AccessPolicy, AccessTable, AccessTableError, DecisionReason};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use roles::{Role, UnknownRole};
pub use routes::Route;
pub use session::{
    FileSessionStore, InMemorySessionStore, Session, SessionError, SessionRegistry, SessionStore,
};
pub use user::{
    ActivateUser, ChangeRole, CreateUser, DeactivateUser, DeleteUser, RoleChanged, User,
    UserActivated, UserCommand, UserCreated, UserDeactivated, UserDeleted, UserEvent, UserStatus,
};
