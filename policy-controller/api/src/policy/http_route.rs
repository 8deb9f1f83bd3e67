use super::{PolicyConf, PolicyKind};
use crate::Documents;
use mesh_policy_core::{
    merge::{Field, Strategy},
    Conf, Policy,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP routing rules.
///
/// Rules from different policies with identical `matches` are merged into one rule, which keeps
/// the position of the last policy that mentioned it. Filters accumulate across policies.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HttpRoute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<RouteRule>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RouteRule {
    pub matches: Vec<RouteMatch>,
    pub default: RouteConf,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RouteMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathMatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PathMatch {
    #[serde(rename = "type")]
    pub kind: PathMatchKind,
    pub value: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum PathMatchKind {
    Exact,
    PathPrefix,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_refs: Option<Vec<BackendRef>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append_filters: Option<Vec<Filter>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct BackendRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(tag = "type")]
pub enum Filter {
    RequestHeaderModifier {
        set: BTreeMap<String, String>,
    },
    ResponseHeaderModifier {
        set: BTreeMap<String, String>,
    },
    RequestMirror {
        backend: String,
    },
}

impl Conf for HttpRoute {
    const SCHEMA: &'static [Field] = &[Field {
        path: &["rules"],
        strategy: Strategy::MergeByKey {
            key: "matches",
            value: "default",
            fields: &[Field {
                path: &["appendFilters"],
                strategy: Strategy::Append,
            }],
        },
    }];
}

impl PolicyConf for HttpRoute {
    const KIND: PolicyKind = PolicyKind::MeshHttpRoute;

    fn policies(docs: &Documents) -> &[Policy<Self>] {
        &docs.http_routes
    }
}
