//! `tokoledger-auth`: authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: the API layer extracts a bearer token,
//! this crate turns it into claims and answers permission questions.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, Principal, TenantMembership, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use policy::role_permissions;
pub use roles::Role;
