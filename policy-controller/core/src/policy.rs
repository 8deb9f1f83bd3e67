use crate::{
    subset::{Subset, Tag},
    SERVICE_TAG,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Identifies the policy resource an item came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

/// The kinds of resources a policy may target.
///
/// Variants are declared from least to most specific.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetKind {
    Mesh,
    MeshSubset,
    MeshService,
    MeshServiceSubset,
    MeshGateway,
    #[serde(rename = "MeshHTTPRoute")]
    MeshHttpRoute,
}

/// Selects the mesh participants a policy (or one of its items) applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("{0} target must name a service")]
    MissingName(TargetKind),

    #[error("can't represent {0} as tags")]
    Unsupported(TargetKind),
}

/// A single selector and configuration taken from a policy resource.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyItem<C> {
    pub target_ref: TargetRef,
    pub conf: C,
    pub origin: ResourceId,
}

/// Whether a policy entry configures traffic arriving from the selected clients or traffic sent to
/// the selected destinations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    From,
    To,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyEntry<C> {
    pub target_ref: TargetRef,
    pub conf: C,
}

/// A policy resource: a top-level selector picking the proxies it is applied to, and lists of
/// entries configuring their inbound (`from`) and outbound (`to`) traffic.
#[derive(Clone, Debug, PartialEq)]
pub struct Policy<C> {
    pub id: ResourceId,
    pub target_ref: TargetRef,
    pub from: Vec<PolicyEntry<C>>,
    pub to: Vec<PolicyEntry<C>>,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl Direction ===

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::From => "from",
            Self::To => "to",
        })
    }
}

// === impl TargetKind ===

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mesh => "Mesh",
            Self::MeshSubset => "MeshSubset",
            Self::MeshService => "MeshService",
            Self::MeshServiceSubset => "MeshServiceSubset",
            Self::MeshGateway => "MeshGateway",
            Self::MeshHttpRoute => "MeshHTTPRoute",
        })
    }
}

// === impl TargetRef ===

impl TargetRef {
    pub fn mesh() -> Self {
        Self {
            kind: TargetKind::Mesh,
            name: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn subset(tags: BTreeMap<String, String>) -> Self {
        Self {
            kind: TargetKind::MeshSubset,
            name: None,
            tags,
        }
    }

    pub fn service(name: impl ToString) -> Self {
        Self {
            kind: TargetKind::MeshService,
            name: Some(name.to_string()),
            tags: BTreeMap::new(),
        }
    }

    pub fn service_subset(name: impl ToString, tags: BTreeMap<String, String>) -> Self {
        Self {
            kind: TargetKind::MeshServiceSubset,
            name: Some(name.to_string()),
            tags,
        }
    }

    /// Expresses the selector as a conjunction of positive tags.
    ///
    /// Tags are emitted in key order, after the service tag for service targets.
    pub fn as_subset(&self) -> Result<Subset, SelectorError> {
        let tags = self.tags.iter().map(|(k, v)| Tag::new(k, v));
        match self.kind {
            TargetKind::Mesh => Ok(Subset::default()),
            TargetKind::MeshSubset => Ok(tags.collect()),
            TargetKind::MeshService | TargetKind::MeshServiceSubset => {
                let name = self
                    .name
                    .as_deref()
                    .ok_or(SelectorError::MissingName(self.kind))?;
                let service = Tag::new(SERVICE_TAG, name);
                if self.kind == TargetKind::MeshService {
                    return Ok(Subset::new(vec![service]));
                }
                Ok(std::iter::once(service).chain(tags).collect())
            }
            kind => Err(SelectorError::Unsupported(kind)),
        }
    }
}

// === impl Policy ===

impl<C: Clone> Policy<C> {
    pub fn entries(&self, direction: Direction) -> &[PolicyEntry<C>] {
        match direction {
            Direction::From => &self.from,
            Direction::To => &self.to,
        }
    }

    /// Flattens the policy's entries for `direction` into items tagged with the policy's id.
    pub fn items(&self, direction: Direction) -> impl Iterator<Item = PolicyItem<C>> + '_ {
        self.entries(direction).iter().map(|entry| PolicyItem {
            target_ref: entry.target_ref.clone(),
            conf: entry.conf.clone(),
            origin: self.id.clone(),
        })
    }
}

/// Orders policies from the least to the most specific top-level selector, breaking ties by
/// resource id.
///
/// Rules are built from items in this order so that configuration from more specific policies is
/// merged over configuration from broader ones.
pub fn sort_by_target_ref<C>(policies: &mut [Policy<C>]) {
    policies.sort_by(|a, b| {
        a.target_ref
            .kind
            .cmp(&b.target_ref.kind)
            .then_with(|| a.id.cmp(&b.id))
    });
}
