use clap::Parser;
use mesh_policy_controller::Args;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const MESH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/mesh.yaml");
const DATAPLANES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/dataplanes.json");

fn run(args: &[&str]) -> anyhow::Result<String> {
    let args = Args::try_parse_from(std::iter::once("mesh-policy").chain(args.iter().copied()))?;
    let mut out = Vec::new();
    args.run(&mut out)?;
    Ok(String::from_utf8(out)?)
}

fn run_json(args: &[&str]) -> Value {
    let out = run(args).expect("command must succeed");
    serde_json::from_str(&out).expect("output must be JSON")
}

fn id(namespace: &str, name: &str) -> Value {
    json!({ "namespace": namespace, "name": name })
}

#[test]
fn rules_for_every_kind() {
    let rules = run_json(&["rules", "-f", MESH]);

    assert_eq!(
        rules["MeshTrafficPermission"],
        json!({
            "generation": 1,
            "from": [
                {
                    "subset": [{ "key": "version", "value": "legacy" }],
                    "conf": { "action": "Deny" },
                    "origin": [id("default", "allow-all"), id("shop", "deny-legacy")],
                },
                {
                    "subset": [{ "key": "version", "value": "legacy", "not": true }],
                    "conf": { "action": "Allow" },
                    "origin": [id("default", "allow-all")],
                },
            ],
            "to": [],
        })
    );

    assert_eq!(
        rules["MeshAccessLog"]["to"][0],
        json!({
            "subset": [{ "key": "mesh.io/service", "value": "db" }],
            "conf": {
                "appendBackends": [
                    { "type": "File", "path": "/var/log/db.log" },
                    { "type": "Tcp", "address": "logs:514" },
                ],
            },
            "origin": [id("default", "audit"), id("default", "tcp-logs")],
        })
    );

    // Kinds without policies are omitted.
    assert!(rules.get("MeshTimeout").is_none());
    assert!(rules.get("MeshHTTPRoute").is_none());
}

#[test]
fn compute_assignments() {
    let compute = |tags: &[&str]| {
        let mut args = vec!["compute", "-f", MESH, "--kind", "MeshTrafficPermission"];
        for tag in tags {
            args.extend(["--tag", *tag]);
        }
        run_json(&args)
    };

    assert_eq!(compute(&["version=legacy"])["conf"], json!({ "action": "Deny" }));
    assert_eq!(compute(&["version=v2"])["conf"], json!({ "action": "Allow" }));
    assert_eq!(compute(&["version!=legacy"])["conf"], json!({ "action": "Allow" }));

    // Keys the assignment doesn't mention satisfy negated tags only.
    assert_eq!(compute(&["zone=east"])["conf"], json!({ "action": "Allow" }));
    assert_eq!(
        compute(&[])["subset"],
        json!([{ "key": "version", "value": "legacy", "not": true }])
    );
}

#[test]
fn compute_elements() {
    let allow = run_json(&[
        "compute",
        "-f",
        MESH,
        "--kind",
        "meshtrafficpermission",
        "--element",
    ]);
    assert_eq!(allow["conf"], json!({ "action": "Allow" }));

    let logs = run_json(&[
        "compute",
        "-f",
        MESH,
        "--kind",
        "MeshAccessLog",
        "--direction",
        "to",
        "--element",
        "--tag",
        "mesh.io/service=redis",
    ]);
    assert_eq!(
        logs["conf"]["appendBackends"],
        json!([{ "type": "Tcp", "address": "logs:514" }])
    );

    let err = run(&[
        "compute",
        "-f",
        MESH,
        "--kind",
        "MeshAccessLog",
        "--element",
        "--tag",
        "version!=v1",
    ])
    .unwrap_err();
    assert_eq!(err.to_string(), "concrete tags can't be negated: version!=v1");
}

#[test]
fn inspect_dataplane() {
    let inbound = json!({ "kind": "Inbound", "name": "10.0.0.1:8080:8080", "service": "web" });

    let permissions = run_json(&["inspect", "-f", MESH, "-f", DATAPLANES, "--dataplane", "web-1"]);
    assert_eq!(
        permissions,
        json!([{ "policy": id("default", "allow-all"), "attachments": [inbound.clone()] }])
    );

    let logs = run_json(&[
        "inspect",
        "-f",
        MESH,
        "-f",
        DATAPLANES,
        "--dataplane",
        "web-1",
        "--kind",
        "MeshAccessLog",
    ]);
    assert_eq!(
        logs,
        json!([{
            "policy": id("default", "tcp-logs"),
            "attachments": [
                inbound,
                { "kind": "Outbound", "name": "127.0.0.1:5432", "service": "db" },
                { "kind": "Outbound", "name": "127.0.0.1:6379", "service": "redis" },
                { "kind": "Service", "name": "db", "service": "db" },
                { "kind": "Service", "name": "redis", "service": "redis" },
            ],
        }])
    );

    let err = run(&["inspect", "-f", DATAPLANES, "--dataplane", "web-2"]).unwrap_err();
    assert_eq!(err.to_string(), "dataplane \"web-2\" not found");
}

#[test]
fn prints_metrics() {
    let out = run(&["rules", "-f", MESH, "--metrics"]).unwrap();
    for line in [
        "mesh_policy_index_size{kind=\"MeshTrafficPermission\"} 2",
        "mesh_policy_index_size{kind=\"MeshAccessLog\"} 2",
        "mesh_policy_rules{kind=\"MeshTrafficPermission\",direction=\"from\"} 2",
        "mesh_policy_rules{kind=\"MeshAccessLog\",direction=\"to\"} 2",
        "mesh_policy_rules_rebuilds_total{kind=\"MeshAccessLog\"} 1",
    ] {
        assert!(out.contains(line), "missing {line:?} in\n{out}");
    }
    assert!(out.trim_end().ends_with("# EOF"));
}

#[test]
fn missing_files_are_reported() {
    let err = run(&["rules", "-f", "/nonexistent/mesh.yaml"]).unwrap_err();
    assert_eq!(err.to_string(), "failed to read /nonexistent/mesh.yaml");
}

#[test]
fn prints_schema() {
    let schema = run(&["schema"]).unwrap();
    for kind in [
        "MeshTrafficPermission",
        "MeshTimeout",
        "MeshAccessLog",
        "MeshHTTPRoute",
        "Dataplane",
    ] {
        assert!(schema.contains(kind), "{kind} missing from schema");
    }
}
