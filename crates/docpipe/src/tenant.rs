//! The membership resolver wired into the HTTP boundary (§4.J, §6).
//!
//! No identity provider is integrated into this binary (no JWT verifier
//! is in the dependency stack): the bearer token is trusted as an opaque
//! user id rather than cryptographically verified. Every bearer-authenticated
//! user is treated as a member of any organization, except that
//! `DOCPIPE_SUPERADMIN_USERS` (comma-separated user ids) and
//! `DOCPIPE_DENIED_ORGANIZATIONS` (comma-separated organization ids) let a
//! deployer exercise the superadmin-bypass and non-member-rejection paths
//! without a real membership service.

use async_trait::async_trait;
use docpipe_protocol::{OrganizationId, UserId};
use docpipe_tenant::{MembershipResolver, Role};
use std::collections::HashSet;
use std::str::FromStr;

pub struct EnvMembershipResolver {
    superadmins: HashSet<UserId>,
    denied_organizations: HashSet<OrganizationId>,
}

impl EnvMembershipResolver {
    pub fn from_env() -> Self {
        Self {
            superadmins: parse_id_list(std::env::var("DOCPIPE_SUPERADMIN_USERS").ok()),
            denied_organizations: parse_id_list(std::env::var("DOCPIPE_DENIED_ORGANIZATIONS").ok()),
        }
    }
}

fn parse_id_list<T: FromStr + Eq + std::hash::Hash>(raw: Option<String>) -> HashSet<T> {
    raw.map(|v| v.split(',').filter_map(|s| T::from_str(s.trim()).ok()).collect())
        .unwrap_or_default()
}

#[async_trait]
impl MembershipResolver for EnvMembershipResolver {
    async fn role_in_organization(&self, user_id: UserId, organization_id: OrganizationId) -> Option<Role> {
        if self.superadmins.contains(&user_id) {
            return Some(Role::Superadmin);
        }
        if self.denied_organizations.contains(&organization_id) {
            return None;
        }
        Some(Role::Member)
    }
}

/// Extracts the opaque user id from `Authorization: Bearer <id>`.
pub fn user_id_from_bearer(header: &str) -> Option<UserId> {
    let token = header.strip_prefix("Bearer ")?.trim();
    UserId::from_str(token).ok()
}
