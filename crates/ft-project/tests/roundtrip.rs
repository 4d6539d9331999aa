use std::path::{Path, PathBuf};

use ft_project::schema::*;
use ft_project::{
    ProjectError, apply_grid_route, build_tree, export_tree, load_json, load_yaml, save_json,
    save_yaml, validate_network,
};

fn demo(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos/networks")
        .join(name)
}

fn minimal() -> NetworkDef {
    NetworkDef {
        version: 1,
        name: "Minimal".to_string(),
        purpose: String::new(),
        regions: vec![],
        tolerance: None,
        outlet: OutletDef {
            id: default_outlet_id(),
            position: [0.0, 0.0, 0.0],
            flow: 0.0,
        },
        nodes: vec![],
        connections: vec![],
        grid: None,
    }
}

#[test]
fn roundtrip_yaml_empty_network() {
    let network = minimal();
    validate_network(&network).unwrap();

    let path = std::env::temp_dir().join("ft_project_roundtrip_empty.yaml");
    save_yaml(&path, &network).unwrap();
    let loaded = load_yaml(&path).unwrap();

    assert_eq!(network, loaded);
}

#[test]
fn roundtrip_json_exported_tree() {
    let network = load_yaml(&demo("two_branch.yaml")).unwrap();
    let tree = build_tree(&network).unwrap();
    let exported = export_tree(&tree);

    let path = std::env::temp_dir().join("ft_project_roundtrip_export.json");
    save_json(&path, &exported).unwrap();
    let loaded = load_json(&path).unwrap();

    assert_eq!(exported, loaded);
    assert_eq!(loaded.connections, network.connections);
    assert_eq!(loaded.regions, vec!["zone-2", "zone-10"]);
}

#[test]
fn demo_networks_load_and_build() {
    for name in ["two_branch.yaml", "grid_route.yaml"] {
        let network = load_yaml(&demo(name)).unwrap_or_else(|e| panic!("Failed to load {name}: {e}"));
        build_tree(&network).unwrap_or_else(|e| panic!("Failed to build {name}: {e}"));
    }
}

#[test]
fn two_branch_sections() {
    let network = load_yaml(&demo("two_branch.yaml")).unwrap();
    let mut tree = build_tree(&network).unwrap();

    let sections = tree.sections(false, false).unwrap();
    assert_eq!(sections.len(), 3);
    let root = tree.section_from_key("0").unwrap();
    assert!((root.flow - 0.9).abs() < 1e-12);
    assert_eq!(root.path.vertices.len(), 3);

    assert_eq!(tree.simplify(true, &[]).unwrap(), 1);
    let root = tree.section_from_key("0").unwrap();
    assert_eq!(root.path.vertices.len(), 2);
}

#[test]
fn grid_route_demo_closes_loop() {
    let network = load_yaml(&demo("grid_route.yaml")).unwrap();
    let mut tree = build_tree(&network).unwrap();
    let outcome = apply_grid_route(&mut tree, &network).unwrap().unwrap();

    assert!(outcome.all_connected());
    assert!(tree.has_loops());
    assert_eq!(tree.find_all_connections_of_cycles().len(), 4);
    assert_eq!(tree.section_from_key("0").unwrap().flow, 3.0);
}

#[test]
fn validation_fails_on_missing_node() {
    let mut network = minimal();
    network.nodes.push(NodeDef {
        id: "a".to_string(),
        position: [1.0, 0.0, 0.0],
        kind: NodeKind::Inlet {
            flow: 1.0,
            terminal: None,
        },
    });
    network.connections.push(ConnectionDef {
        from: "a".to_string(),
        to: "n999".to_string(),
        diameter: 0.0,
        is_loop: false,
    });

    assert!(validate_network(&network).is_err());
    assert!(matches!(
        build_tree(&network),
        Err(ProjectError::Validation(_))
    ));
}

#[test]
fn tree_errors_surface_through_build() {
    // Valid by reference, but both ends sit on the same point.
    let mut network = minimal();
    network.nodes.push(NodeDef {
        id: "a".to_string(),
        position: [0.0, 0.0, 0.0],
        kind: NodeKind::Inlet {
            flow: 1.0,
            terminal: None,
        },
    });
    network.connections.push(ConnectionDef {
        from: "a".to_string(),
        to: "outlet".to_string(),
        diameter: 0.0,
        is_loop: false,
    });

    assert!(matches!(build_tree(&network), Err(ProjectError::Tree(_))));
}

#[test]
fn loop_flag_is_read_from_yaml() {
    let text = r#"
version: 1
name: looped
outlet: { position: [0.0, 0.0, 0.0] }
nodes:
  - { id: a, position: [0.0, 5.0, 0.0], kind: { type: Inlet, flow: 1.0 } }
  - { id: b, position: [0.0, 2.0, 0.0], kind: { type: Internal } }
  - { id: c, position: [3.0, 2.0, 0.0], kind: { type: Internal } }
connections:
  - { from: a, to: b }
  - { from: b, to: outlet }
  - { from: b, to: c, loop: true }
  - { from: c, to: outlet }
"#;
    let network: NetworkDef = serde_yaml::from_str(text).unwrap();
    assert_eq!(network.outlet.id, "outlet");
    assert!(network.connections[2].is_loop);

    let tree = build_tree(&network).unwrap();
    assert_eq!(tree.loop_connections().len(), 1);
    assert_eq!(tree.find_all_node_cycles().len(), 1);
}
