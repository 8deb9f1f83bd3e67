use crate::{target_ref::TargetRef, ConvertError, Documents};
use mesh_policy_core::{Conf, Policy, PolicyEntry, ResourceId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub mod access_log;
pub mod http_route;
pub mod timeout;
pub mod traffic_permission;

pub use self::{
    access_log::AccessLog, http_route::HttpRoute, timeout::Timeout,
    traffic_permission::TrafficPermission,
};

/// A configuration schema that is distributed as its own kind of policy resource.
pub trait PolicyConf:
    Conf + Clone + fmt::Debug + PartialEq + JsonSchema + Send + Sync + 'static
{
    const KIND: PolicyKind;

    /// Selects the policies of this kind from a set of loaded documents.
    fn policies(docs: &Documents) -> &[Policy<Self>];
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PolicyKind {
    MeshTrafficPermission,
    MeshTimeout,
    MeshAccessLog,
    MeshHttpRoute,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown policy kind {0:?}")]
pub struct UnknownPolicyKind(String);

/// A policy resource document.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct PolicyDoc<C> {
    pub name: String,

    #[serde(default = "crate::default_namespace")]
    pub namespace: String,

    pub spec: PolicySpec<C>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", bound(deserialize = "C: Deserialize<'de>"))]
pub struct PolicySpec<C> {
    /// Selects the proxies the policy is applied to.
    pub target_ref: TargetRef,

    /// Configures traffic arriving from the selected clients.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from: Vec<Entry<C>>,

    /// Configures traffic sent to the selected destinations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub to: Vec<Entry<C>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Entry<C> {
    pub target_ref: TargetRef,
    pub default: C,
}

// === impl PolicyKind ===

impl PolicyKind {
    pub const ALL: [Self; 4] = [
        Self::MeshTrafficPermission,
        Self::MeshTimeout,
        Self::MeshAccessLog,
        Self::MeshHttpRoute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MeshTrafficPermission => "MeshTrafficPermission",
            Self::MeshTimeout => "MeshTimeout",
            Self::MeshAccessLog => "MeshAccessLog",
            Self::MeshHttpRoute => "MeshHTTPRoute",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = UnknownPolicyKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPolicyKind(s.to_string()))
    }
}

// === impl PolicyDoc ===

impl<C> PolicyDoc<C> {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.namespace, &self.name)
    }

    pub fn into_policy(self) -> Result<Policy<C>, ConvertError> {
        let id = self.id();
        let target_ref = convert_target(&id, &self.spec.target_ref)?;
        let from = convert_entries(&id, self.spec.from)?;
        let to = convert_entries(&id, self.spec.to)?;
        Ok(Policy {
            id,
            target_ref,
            from,
            to,
        })
    }
}

fn convert_target(
    policy: &ResourceId,
    target_ref: &TargetRef,
) -> Result<mesh_policy_core::TargetRef, ConvertError> {
    target_ref
        .to_core()
        .map_err(|source| ConvertError::TargetRef {
            policy: policy.clone(),
            source,
        })
}

fn convert_entries<C>(
    policy: &ResourceId,
    entries: Vec<Entry<C>>,
) -> Result<Vec<PolicyEntry<C>>, ConvertError> {
    entries
        .into_iter()
        .map(|Entry { target_ref, default }| -> Result<_, ConvertError> {
            Ok(PolicyEntry {
                target_ref: convert_target(policy, &target_ref)?,
                conf: default,
            })
        })
        .collect()
}
