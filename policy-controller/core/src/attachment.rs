//! Groups a dataplane's attachment points by the policy that governs them.
//!
//! This is a read-only view for inspection: inbounds are matched against each policy's top-level
//! selector and outbounds are resolved through the policy type's outbound rules.

use crate::{
    policy::{Policy, ResourceId},
    rules::Rules,
    subset::Element,
    SERVICE_TAG,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The declared networking of a proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataplane {
    #[serde(default)]
    pub inbounds: Vec<Inbound>,

    #[serde(default)]
    pub outbounds: Vec<Outbound>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    pub address: String,
    pub port: u16,
    pub service_port: u16,
    pub tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub address: String,
    pub port: u16,

    /// Tags of the destination.
    pub tags: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttachmentKind {
    Inbound,
    Outbound,
    Service,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub name: String,
    pub service: String,
}

/// The attachment points governed by a single policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAttachments {
    pub policy: ResourceId,
    pub attachments: Vec<Attachment>,
}

/// Groups the dataplane's inbounds, outbounds and destination services by policy, ordered by
/// policy id. Attachment points no policy governs are omitted.
///
/// `policies` must be in the order rules are built from, and `outbound_rules` must have been built
/// from their `to` entries.
pub fn group_by_policy<C>(
    dataplane: &Dataplane,
    policies: &[Policy<C>],
    outbound_rules: &Rules<C>,
) -> Vec<PolicyAttachments> {
    let mut by_policy = BTreeMap::<ResourceId, Vec<Attachment>>::new();

    for inbound in &dataplane.inbounds {
        let tags = Element::from(inbound.tags.clone()).to_subset();
        let governing = policies.iter().rev().find(|policy| {
            policy
                .target_ref
                .as_subset()
                .map(|selector| selector.is_subset(&tags))
                .unwrap_or(false)
        });
        if let Some(policy) = governing {
            by_policy
                .entry(policy.id.clone())
                .or_default()
                .push(Attachment {
                    kind: AttachmentKind::Inbound,
                    name: format!("{}:{}:{}", inbound.address, inbound.port, inbound.service_port),
                    service: service_of(&inbound.tags),
                });
        }
    }

    let mut services = BTreeSet::new();
    for outbound in &dataplane.outbounds {
        let service = service_of(&outbound.tags);
        let element = Element::from(outbound.tags.clone());
        if let Some(origin) = last_origin(outbound_rules, &element) {
            by_policy.entry(origin).or_default().push(Attachment {
                kind: AttachmentKind::Outbound,
                name: format!("{}:{}", outbound.address, outbound.port),
                service: service.clone(),
            });
        }
        if !service.is_empty() {
            services.insert(service);
        }
    }

    for service in services {
        let element = Element::from_iter([(SERVICE_TAG.to_string(), service.clone())]);
        if let Some(origin) = last_origin(outbound_rules, &element) {
            by_policy.entry(origin).or_default().push(Attachment {
                kind: AttachmentKind::Service,
                name: service.clone(),
                service,
            });
        }
    }

    by_policy
        .into_iter()
        .map(|(policy, attachments)| PolicyAttachments {
            policy,
            attachments,
        })
        .collect()
}

/// The policy that contributed last, and so takes precedence, in the matching rule.
fn last_origin<C>(rules: &Rules<C>, element: &Element) -> Option<ResourceId> {
    rules.compute_element(element)?.origin.last().cloned()
}

fn service_of(tags: &BTreeMap<String, String>) -> String {
    tags.get(SERVICE_TAG).cloned().unwrap_or_default()
}
