use mesh_policy_core::{TargetKind, TargetRef as CoreTargetRef};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Selects the mesh participants a policy or policy entry applies to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TargetRef {
    /// One of `Mesh`, `MeshSubset`, `MeshService`, `MeshServiceSubset`, `MeshGateway` or
    /// `MeshHTTPRoute`.
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown target kind {0:?}")]
pub struct UnknownKind(pub String);

// === impl TargetRef ===

impl TargetRef {
    pub fn mesh() -> Self {
        Self {
            kind: "Mesh".to_string(),
            name: None,
            tags: None,
        }
    }

    pub fn to_core(&self) -> Result<CoreTargetRef, UnknownKind> {
        let kind = match self.kind.as_str() {
            "Mesh" => TargetKind::Mesh,
            "MeshSubset" => TargetKind::MeshSubset,
            "MeshService" => TargetKind::MeshService,
            "MeshServiceSubset" => TargetKind::MeshServiceSubset,
            "MeshGateway" => TargetKind::MeshGateway,
            "MeshHTTPRoute" => TargetKind::MeshHttpRoute,
            kind => return Err(UnknownKind(kind.to_string())),
        };
        Ok(CoreTargetRef {
            kind,
            name: self.name.clone(),
            tags: self.tags.clone().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    #[test]
    fn converts_known_kinds() {
        let tr = TargetRef {
            kind: "MeshServiceSubset".to_string(),
            name: Some("backend".to_string()),
            tags: Some(btreemap! { "version".to_string() => "v1".to_string() }),
        };
        assert_eq!(
            tr.to_core(),
            Ok(CoreTargetRef::service_subset(
                "backend",
                btreemap! { "version".to_string() => "v1".to_string() },
            ))
        );
        assert_eq!(TargetRef::mesh().to_core(), Ok(CoreTargetRef::mesh()));
    }

    #[test]
    fn rejects_unknown_kinds() {
        let tr = TargetRef {
            kind: "Pod".to_string(),
            name: None,
            tags: None,
        };
        assert_eq!(tr.to_core(), Err(UnknownKind("Pod".to_string())));
    }
}
