//! Membership resolution for the HTTP boundary (§4.J, §6).
//!
//! Membership is resolved once at the boundary and trusted thereafter by
//! everything downstream; handlers never re-check it.

use async_trait::async_trait;
use docpipe_protocol::{OrganizationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Superadmin,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("missing organization_id header")]
    MissingOrganizationHeader,
    #[error("user is not a member of this organization")]
    NotAMember,
}

/// Resolves whether a user belongs to an organization, and with what role.
#[async_trait]
pub trait MembershipResolver: Send + Sync {
    async fn role_in_organization(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> Option<Role>;
}

/// Check membership for a request that named `organization_id` (possibly
/// absent). Missing header -> [`MembershipError::MissingOrganizationHeader`]
/// (maps to HTTP 400); non-member -> [`MembershipError::NotAMember`] (maps
/// to HTTP 403); `superadmin` bypasses the membership filter entirely.
pub async fn check_membership(
    resolver: &dyn MembershipResolver,
    user_id: UserId,
    organization_id: Option<OrganizationId>,
) -> Result<(), MembershipError> {
    let organization_id = organization_id.ok_or(MembershipError::MissingOrganizationHeader)?;
    match resolver.role_in_organization(user_id, organization_id).await {
        Some(Role::Superadmin) | Some(Role::Member) => Ok(()),
        None => Err(MembershipError::NotAMember),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeResolver(Mutex<HashMap<(UserId, OrganizationId), Role>>);

    #[async_trait]
    impl MembershipResolver for FakeResolver {
        async fn role_in_organization(
            &self,
            user_id: UserId,
            organization_id: OrganizationId,
        ) -> Option<Role> {
            self.0.lock().unwrap().get(&(user_id, organization_id)).copied()
        }
    }

    #[tokio::test]
    async fn missing_header_is_rejected() {
        let resolver = FakeResolver(Mutex::new(HashMap::new()));
        let result = check_membership(&resolver, UserId::new(), None).await;
        assert_eq!(result, Err(MembershipError::MissingOrganizationHeader));
    }

    #[tokio::test]
    async fn non_member_is_rejected() {
        let resolver = FakeResolver(Mutex::new(HashMap::new()));
        let org = OrganizationId::new();
        let result = check_membership(&resolver, UserId::new(), Some(org)).await;
        assert_eq!(result, Err(MembershipError::NotAMember));
    }

    #[tokio::test]
    async fn member_is_accepted() {
        let user = UserId::new();
        let org = OrganizationId::new();
        let mut map = HashMap::new();
        map.insert((user, org), Role::Member);
        let resolver = FakeResolver(Mutex::new(map));
        assert!(check_membership(&resolver, user, Some(org)).await.is_ok());
    }

    #[tokio::test]
    async fn superadmin_bypasses_membership_filter() {
        let user = UserId::new();
        let org = OrganizationId::new();
        let mut map = HashMap::new();
        map.insert((user, org), Role::Superadmin);
        let resolver = FakeResolver(Mutex::new(map));
        assert!(check_membership(&resolver, user, Some(org)).await.is_ok());
    }
}
