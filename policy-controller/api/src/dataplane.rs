use crate::ConvertError;
use mesh_policy_core::{
    attachment::{Dataplane, Inbound, Outbound},
    ResourceId, SERVICE_TAG,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declares a proxy's inbound and outbound interfaces.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DataplaneDoc {
    pub name: String,

    #[serde(default = "crate::default_namespace")]
    pub namespace: String,

    pub networking: Networking,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Networking {
    pub address: String,

    #[serde(default)]
    pub inbound: Vec<InboundInterface>,

    #[serde(default)]
    pub outbound: Vec<OutboundInterface>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InboundInterface {
    pub port: u16,

    /// The workload's port. Defaults to `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_port: Option<u16>,

    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct OutboundInterface {
    /// Defaults to the loopback address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    pub port: u16,

    /// Tags of the destination.
    pub tags: BTreeMap<String, String>,
}

// === impl DataplaneDoc ===

impl DataplaneDoc {
    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.namespace, &self.name)
    }

    pub fn to_core(&self) -> Result<Dataplane, ConvertError> {
        let inbounds = self
            .networking
            .inbound
            .iter()
            .map(|inbound| {
                if !inbound.tags.contains_key(SERVICE_TAG) {
                    return Err(ConvertError::MissingService {
                        dataplane: self.id(),
                        port: inbound.port,
                    });
                }
                Ok(Inbound {
                    address: self.networking.address.clone(),
                    port: inbound.port,
                    service_port: inbound.service_port.unwrap_or(inbound.port),
                    tags: inbound.tags.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let outbounds = self
            .networking
            .outbound
            .iter()
            .map(|outbound| Outbound {
                address: outbound
                    .address
                    .clone()
                    .unwrap_or_else(|| "127.0.0.1".to_string()),
                port: outbound.port,
                tags: outbound.tags.clone(),
            })
            .collect();

        Ok(Dataplane {
            inbounds,
            outbounds,
        })
    }
}
