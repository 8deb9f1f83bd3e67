//! Resource documents for mesh policies and dataplanes.
//!
//! Documents are YAML (or JSON) objects tagged by `kind`. Policy documents carry one of the
//! configuration schemas in [`policy`] and convert into [`mesh_policy_core::Policy`] values.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod dataplane;
pub mod duration;
pub mod policy;
pub mod target_ref;

pub use self::{
    dataplane::DataplaneDoc,
    duration::Duration,
    policy::{PolicyConf, PolicyDoc, PolicyKind},
    target_ref::TargetRef,
};
use self::policy::{AccessLog, HttpRoute, Timeout, TrafficPermission};
use mesh_policy_core::{Policy, ResourceId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};


#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "kind")]
pub enum Document {
    MeshTrafficPermission(PolicyDoc<TrafficPermission>),
    MeshTimeout(PolicyDoc<Timeout>),
    MeshAccessLog(PolicyDoc<AccessLog>),
    #[serde(rename = "MeshHTTPRoute")]
    MeshHttpRoute(PolicyDoc<HttpRoute>),
    Dataplane(DataplaneDoc),
}

/// Loaded documents, converted and grouped by kind in load order.
#[derive(Clone, Debug, Default)]
pub struct Documents {
    pub traffic_permissions: Vec<Policy<TrafficPermission>>,
    pub timeouts: Vec<Policy<Timeout>>,
    pub access_logs: Vec<Policy<AccessLog>>,
    pub http_routes: Vec<Policy<HttpRoute>>,
    pub dataplanes: Vec<(ResourceId, mesh_policy_core::attachment::Dataplane)>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("policy {policy} has an invalid target")]
    TargetRef {
        policy: ResourceId,
        #[source]
        source: target_ref::UnknownKind,
    },

    #[error("dataplane {dataplane} inbound port {port} has no service tag")]
    MissingService { dataplane: ResourceId, port: u16 },
}

/// Parses a stream of `---`-separated YAML documents. JSON documents are accepted as YAML.
pub fn parse_documents(input: &str) -> Result<Vec<Document>, serde_yaml::Error> {
    serde_yaml::Deserializer::from_str(input)
        .map(Document::deserialize)
        .collect()
}

/// The JSON schema of a document.
pub fn schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Document)
}

fn default_namespace() -> String {
    "default".to_string()
}

// === impl Document ===

impl Document {
    pub fn id(&self) -> ResourceId {
        match self {
            Self::MeshTrafficPermission(doc) => doc.id(),
            Self::MeshTimeout(doc) => doc.id(),
            Self::MeshAccessLog(doc) => doc.id(),
            Self::MeshHttpRoute(doc) => doc.id(),
            Self::Dataplane(doc) => doc.id(),
        }
    }
}

// === impl Documents ===

impl Documents {
    pub fn load(docs: impl IntoIterator<Item = Document>) -> Result<Self, ConvertError> {
        let mut loaded = Self::default();
        for doc in docs {
            match doc {
                Document::MeshTrafficPermission(doc) => {
                    loaded.traffic_permissions.push(doc.into_policy()?)
                }
                Document::MeshTimeout(doc) => loaded.timeouts.push(doc.into_policy()?),
                Document::MeshAccessLog(doc) => loaded.access_logs.push(doc.into_policy()?),
                Document::MeshHttpRoute(doc) => loaded.http_routes.push(doc.into_policy()?),
                Document::Dataplane(doc) => loaded.dataplanes.push((doc.id(), doc.to_core()?)),
            }
        }
        Ok(loaded)
    }

    pub fn dataplane(&self, name: &str) -> Option<&mesh_policy_core::attachment::Dataplane> {
        self.dataplanes
            .iter()
            .find(|(id, _)| id.name == name)
            .map(|(_, dataplane)| dataplane)
    }
}
