use super::{PolicyConf, PolicyKind};
use crate::Documents;
use mesh_policy_core::{
    merge::{Field, Strategy},
    Conf, Policy,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Access logging. Backends from every matching policy are used, in policy order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_backends: Option<Vec<Backend>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Backend {
    File {
        path: String,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
    Tcp {
        address: String,
    },
}

impl Conf for AccessLog {
    const SCHEMA: &'static [Field] = &[Field {
        path: &["appendBackends"],
        strategy: Strategy::Append,
    }];
}

impl PolicyConf for AccessLog {
    const KIND: PolicyKind = PolicyKind::MeshAccessLog;

    fn policies(docs: &Documents) -> &[Policy<Self>] {
        &docs.access_logs
    }
}
