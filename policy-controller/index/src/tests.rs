use super::*;
use maplit::btreemap;
use mesh_policy_core::{
    merge::{Field, Strategy},
    Element, PolicyEntry, TargetRef,
};
use pretty_assertions::assert_eq;
use prometheus_client::registry::Registry;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
struct TestConf {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    action: Option<String>,

    #[serde(
        default,
        rename = "appendItems",
        skip_serializing_if = "Option::is_none"
    )]
    append_items: Option<serde_json::Value>,
}

impl Conf for TestConf {
    const SCHEMA: &'static [Field] = &[Field {
        path: &["appendItems"],
        strategy: Strategy::Append,
    }];
}

fn action(action: &str) -> TestConf {
    TestConf {
        action: Some(action.to_string()),
        append_items: None,
    }
}

fn policy(
    name: &str,
    target_ref: TargetRef,
    from: Vec<(TargetRef, TestConf)>,
) -> Policy<TestConf> {
    Policy {
        id: ResourceId::new("default", name),
        target_ref,
        from: from
            .into_iter()
            .map(|(target_ref, conf)| PolicyEntry { target_ref, conf })
            .collect(),
        to: vec![],
    }
}

fn mk_index() -> (Index<TestConf>, Registry) {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .try_init()
        .ok();

    let mut prom = Registry::default();
    let metrics = IndexMetrics::register(&mut prom);
    (Index::new("Test", metrics), prom)
}

fn from_action(rules: &PolicyRules<TestConf>, service: &str) -> Option<String> {
    let element = Element::from_iter([(
        mesh_policy_core::SERVICE_TAG.to_string(),
        service.to_string(),
    )]);
    rules
        .from
        .compute_element(&element)
        .and_then(|rule| rule.conf.action.clone())
}

#[tokio::test(flavor = "current_thread")]
async fn publishes_rules_on_apply() {
    let (mut index, _prom) = mk_index();
    let mut rx = index.rules_rx();
    assert_eq!(rx.borrow_and_update().generation, 0);
    assert!(rx.borrow().from.is_empty());

    index
        .apply(policy(
            "allow-all",
            TargetRef::mesh(),
            vec![(TargetRef::mesh(), action("Allow"))],
        ))
        .expect("rules must build");

    assert!(rx.has_changed().unwrap());
    let rules = rx.borrow_and_update().clone();
    assert_eq!(rules.generation, 1);
    assert_eq!(rules.from.len(), 1);
    assert!(rules.to.is_empty());
    assert_eq!(from_action(&rules, "web"), Some("Allow".to_string()));
}

#[tokio::test(flavor = "current_thread")]
async fn unchanged_rules_are_not_republished() {
    let (mut index, _prom) = mk_index();
    let allow = policy(
        "allow-all",
        TargetRef::mesh(),
        vec![(TargetRef::mesh(), action("Allow"))],
    );
    index.apply(allow.clone()).unwrap();

    let mut rx = index.rules_rx();
    rx.borrow_and_update();

    // Reapplying the same resource is a no-op.
    index.apply(allow).unwrap();
    assert!(!rx.has_changed().unwrap());

    // A second policy with an identical configuration changes the origins.
    index
        .apply(policy(
            "allow-all-again",
            TargetRef::mesh(),
            vec![(TargetRef::mesh(), action("Allow"))],
        ))
        .unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().generation, 2);
}

#[test]
fn specific_policies_override_broad_ones() {
    let (mut index, _prom) = mk_index();

    // Named so that resource order and specificity disagree.
    index
        .apply(policy(
            "a-backend",
            TargetRef::service("backend"),
            vec![(TargetRef::service("web"), action("Deny"))],
        ))
        .unwrap();
    index
        .apply(policy(
            "z-mesh",
            TargetRef::mesh(),
            vec![(TargetRef::mesh(), action("Allow"))],
        ))
        .unwrap();

    let ids = index
        .policies()
        .into_iter()
        .map(|p| p.id.name)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["z-mesh", "a-backend"]);

    let rules = index.rules();
    assert_eq!(from_action(&rules, "web"), Some("Deny".to_string()));
    assert_eq!(from_action(&rules, "other"), Some("Allow".to_string()));

    let web = rules
        .from
        .compute_element(&Element::from_iter([(
            mesh_policy_core::SERVICE_TAG.to_string(),
            "web".to_string(),
        )]))
        .unwrap();
    assert_eq!(
        web.origin,
        vec![
            ResourceId::new("default", "z-mesh"),
            ResourceId::new("default", "a-backend"),
        ]
    );
}

#[test]
fn delete_rebuilds() {
    let (mut index, _prom) = mk_index();
    index
        .reset(vec![
            policy(
                "allow-all",
                TargetRef::mesh(),
                vec![(TargetRef::mesh(), action("Allow"))],
            ),
            policy(
                "deny-web",
                TargetRef::mesh(),
                vec![(TargetRef::service("web"), action("Deny"))],
            ),
        ])
        .unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(from_action(&index.rules(), "web"), Some("Deny".to_string()));

    index
        .delete(&ResourceId::new("default", "deny-web"))
        .unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(from_action(&index.rules(), "web"), Some("Allow".to_string()));

    let generation = index.rules().generation;
    index
        .delete(&ResourceId::new("default", "unknown"))
        .unwrap();
    assert_eq!(index.rules().generation, generation);
}

#[test]
fn failed_builds_keep_previous_rules() {
    let (mut index, prom) = mk_index();
    index
        .apply(policy(
            "allow-all",
            TargetRef::mesh(),
            vec![(TargetRef::mesh(), action("Allow"))],
        ))
        .unwrap();
    let before = index.rules();

    let broken = TestConf {
        action: None,
        append_items: Some(serde_json::json!("not-a-list")),
    };
    let err = index
        .apply(policy(
            "broken",
            TargetRef::mesh(),
            vec![(TargetRef::service("web"), broken)],
        ))
        .expect_err("appended fields must be lists");
    assert_eq!(err.direction, Direction::From);
    assert_eq!(err.to_string(), "failed to build from rules");

    assert_eq!(index.rules(), before);
    assert!(index.get(&ResourceId::new("default", "broken")).is_some());

    let mut metrics = String::new();
    prometheus_client::encoding::text::encode(&mut metrics, &prom).unwrap();
    assert!(
        metrics.contains("rules_rebuild_errors_total{kind=\"Test\"} 1"),
        "{metrics}"
    );
}

#[test]
fn failed_builds_keep_previous_metrics() {
    let (mut index, prom) = mk_index();
    index
        .apply(policy(
            "allow-all",
            TargetRef::mesh(),
            vec![(TargetRef::mesh(), action("Allow"))],
        ))
        .unwrap();

    // The `from` rules build, but the `to` rules can't be merged.
    let mut broken = policy(
        "broken",
        TargetRef::mesh(),
        vec![(TargetRef::service("web"), action("Deny"))],
    );
    broken.to = vec![PolicyEntry {
        target_ref: TargetRef::mesh(),
        conf: TestConf {
            action: None,
            append_items: Some(serde_json::json!({ "not": "a-list" })),
        },
    }];
    let err = index.apply(broken).expect_err("appended fields must be lists");
    assert_eq!(err.direction, Direction::To);
    assert_eq!(index.rules().from.len(), 1);

    let mut metrics = String::new();
    prometheus_client::encoding::text::encode(&mut metrics, &prom).unwrap();
    for line in [
        "rules_rebuilds_total{kind=\"Test\"} 2",
        "rules_rebuild_errors_total{kind=\"Test\"} 1",
        "rules{kind=\"Test\",direction=\"from\"} 1",
        "rules{kind=\"Test\",direction=\"to\"} 0",
    ] {
        assert!(metrics.contains(line), "missing {line:?} in\n{metrics}");
    }
}

#[test]
fn metrics_describe_the_index() {
    let (mut index, prom) = mk_index();
    index
        .reset(vec![
            policy(
                "allow-all",
                TargetRef::mesh(),
                vec![(TargetRef::mesh(), action("Allow"))],
            ),
            policy(
                "deny-dev",
                TargetRef::mesh(),
                vec![
                    (
                        TargetRef::subset(btreemap! { "env".to_string() => "dev".to_string() }),
                        action("Deny"),
                    ),
                    (
                        TargetRef::subset(btreemap! { "env".to_string() => "prod".to_string() }),
                        action("Allow"),
                    ),
                ],
            ),
        ])
        .unwrap();

    let mut metrics = String::new();
    prometheus_client::encoding::text::encode(&mut metrics, &prom).unwrap();
    for line in [
        "index_size{kind=\"Test\"} 2",
        "index_resets_total{kind=\"Test\"} 1",
        "rules_rebuilds_total{kind=\"Test\"} 1",
        "rules{kind=\"Test\",direction=\"from\"} 3",
        "rules_contradictions{kind=\"Test\",direction=\"from\"} 1",
        "rules_unmatched_cells{kind=\"Test\",direction=\"from\"} 0",
        "rules{kind=\"Test\",direction=\"to\"} 0",
    ] {
        assert!(metrics.contains(line), "missing {line:?} in\n{metrics}");
    }
}

#[test]
fn readers_observe_published_rules() {
    let (index, _prom) = mk_index();
    let index: SharedIndex<TestConf> = Arc::new(RwLock::new(index));
    let mut rx = index.read().rules_rx();

    let writer = {
        let index = index.clone();
        std::thread::spawn(move || {
            index
                .write()
                .apply(policy(
                    "allow-all",
                    TargetRef::mesh(),
                    vec![(TargetRef::mesh(), action("Allow"))],
                ))
                .unwrap();
        })
    };
    writer.join().unwrap();

    assert!(rx.has_changed().unwrap());
    let rules = rx.borrow_and_update().clone();
    assert_eq!(rules.generation, 1);
    assert_eq!(*rules, *index.read().rules());
}
