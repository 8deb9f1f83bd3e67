use super::{PolicyConf, PolicyKind};
use crate::{duration::Duration, Documents};
use mesh_policy_core::{Conf, Policy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Connection and request timeouts. Each timeout set by a later policy overrides the same timeout
/// from an earlier one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Timeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpTimeouts>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpTimeouts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_idle_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stream_duration: Option<Duration>,
}

impl Conf for Timeout {}

impl PolicyConf for Timeout {
    const KIND: PolicyKind = PolicyKind::MeshTimeout;

    fn policies(docs: &Documents) -> &[Policy<Self>] {
        &docs.timeouts
    }
}
