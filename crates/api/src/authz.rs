//! API-side authorization guard.
//!
//! Enforced at the request boundary before any workflow runs, keeping the
//! domain crates and infra auth-agnostic.

use tokoledger_auth::{
    AuthzError, CommandAuthorization, Principal, Role, TenantMembership, authorize, role_permissions,
};

use crate::context::{PrincipalContext, TenantContext};

/// Check every permission `command` requires in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let membership = TenantMembership {
        tenant_id: tenant.tenant_id(),
        roles: principal.roles().to_vec(),
        permissions: permissions_from_roles(principal.roles()),
    };

    let principal = Principal {
        user_id: principal.user_id(),
        active_tenant_id: tenant.tenant_id(),
        membership,
    };

    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }

    Ok(())
}

fn permissions_from_roles(roles: &[Role]) -> Vec<tokoledger_auth::Permission> {
    roles.iter().flat_map(role_permissions).collect()
}

#[cfg(test)]
mod tests {
    use tokoledger_auth::Permission;
    use tokoledger_core::{TenantId, UserId};

    use super::*;

    struct Needs(Vec<Permission>);

    impl CommandAuthorization for Needs {
        fn required_permissions(&self) -> &[Permission] {
            &self.0
        }
    }

    #[test]
    fn roles_are_resolved_through_the_policy() {
        let tenant = TenantContext::new(TenantId::new());
        let cashier = PrincipalContext::new(UserId::new(), vec![Role::new("cashier")]);
        let checkout = Needs(vec![Permission::new("pos.checkout")]);
        let backfill = Needs(vec![Permission::new("ledger.backfill")]);

        assert!(authorize_command(&tenant, &cashier, &checkout).is_ok());
        assert!(matches!(
            authorize_command(&tenant, &cashier, &backfill),
            Err(AuthzError::Forbidden(_))
        ));

        let nobody = PrincipalContext::new(UserId::new(), vec![]);
        assert!(authorize_command(&tenant, &nobody, &checkout).is_err());
    }
}
