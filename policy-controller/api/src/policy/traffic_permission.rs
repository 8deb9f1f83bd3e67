use super::{PolicyConf, PolicyKind};
use crate::Documents;
use mesh_policy_core::{Conf, Policy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Authorizes (or denies) traffic from the selected clients.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TrafficPermission {
    pub action: Action,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Action {
    Allow,
    Deny,

    /// Allows traffic while reporting what a `Deny` would have rejected.
    AllowWithShadowDeny,
}

impl Conf for TrafficPermission {}

impl PolicyConf for TrafficPermission {
    const KIND: PolicyKind = PolicyKind::MeshTrafficPermission;

    fn policies(docs: &Documents) -> &[Policy<Self>] {
        &docs.traffic_permissions
    }
}
