use mesh_policy_api::{
    policy::{AccessLog, HttpRoute, Timeout, TrafficPermission},
    PolicyConf, PolicyKind,
};

/// An operation that is generic over the configuration type of a policy kind.
pub trait KindVisitor {
    type Output;

    fn visit<C: PolicyConf>(self) -> Self::Output;
}

/// Runs `visitor` with the configuration type of `kind`.
pub fn visit_kind<V: KindVisitor>(kind: PolicyKind, visitor: V) -> V::Output {
    match kind {
        PolicyKind::MeshTrafficPermission => visitor.visit::<TrafficPermission>(),
        PolicyKind::MeshTimeout => visitor.visit::<Timeout>(),
        PolicyKind::MeshAccessLog => visitor.visit::<AccessLog>(),
        PolicyKind::MeshHttpRoute => visitor.visit::<HttpRoute>(),
    }
}
