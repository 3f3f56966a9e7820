use std::str::FromStr;

use axum::http::StatusCode;
use axum::response::Response;

use tokoledger_auth::{CommandAuthorization, Permission};

use crate::app::errors::{invalid_id, json_error};
use crate::authz::authorize_command;
use crate::context::{PrincipalContext, TenantContext};

/// Associates the permissions a request needs with its payload.
pub struct CmdAuth<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> CmdAuth<C> {
    pub fn new(inner: C, permission: &'static str) -> Self {
        Self {
            inner,
            required: vec![Permission::new(permission)],
        }
    }

    /// Unwrap the payload once the caller is authorized.
    pub fn authorize(self, tenant: &TenantContext, principal: &PrincipalContext) -> Result<C, Response> {
        match authorize_command(tenant, principal, &self) {
            Ok(()) => Ok(self.inner),
            Err(e) => Err(json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string())),
        }
    }
}

impl<C> CommandAuthorization for CmdAuth<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Guard for reads, which carry no payload.
pub fn require(tenant: &TenantContext, principal: &PrincipalContext, permission: &'static str) -> Result<(), Response> {
    CmdAuth::new((), permission).authorize(tenant, principal)
}

/// Parse a path id, answering 400 with `what` named on failure.
pub fn parse_id<T: FromStr>(raw: &str, what: &'static str) -> Result<T, Response> {
    raw.parse().map_err(|_| invalid_id(what))
}
