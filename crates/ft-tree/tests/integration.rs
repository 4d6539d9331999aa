//! Integration tests for ft-tree.

use std::collections::HashMap;

use ft_core::geom::{almost_equal, angle_deg, vec3};
use ft_core::{ConnId, Vec3};
use ft_tree::{
    ConnectionComparer, GridGraph, NormalizationMode, Tree, TreeError, force_angle_compliance,
    trunk_side_key, PREFERRED_TURN_ANGLES,
};

fn close(a: Vec3, b: Vec3) -> bool {
    almost_equal(&a, &b, 1e-6)
}

fn endpoints(tree: &Tree, conn: ConnId) -> (Vec3, Vec3) {
    let line = tree.line(conn).unwrap();
    (line.start, line.end)
}

/// Outlet at the origin, a trunk running up +Y and two inlets branching off
/// at (0,5,0).
fn branched_tree() -> (Tree, ft_core::NodeId, ft_core::NodeId) {
    let mut tree = Tree::with_details("supply", "air", ["b2", "a10", "a2"], 3.0);
    let left = tree
        .add_inlet(vec3(-5.0, 5.0, 0.0), 1.0, None, None)
        .unwrap();
    let main = tree.outgoing_main(left).unwrap();
    let split = tree
        .split_connection_through_point(main, vec3(0.0, 5.0, 0.0))
        .unwrap();
    let right = tree
        .add_inlet(vec3(5.0, 5.0, 0.0), 2.0, Some(split.node), None)
        .unwrap();
    (tree, left, right)
}

#[test]
fn build_branched_tree() {
    let (mut tree, left, right) = branched_tree();

    assert_eq!(tree.region_references(), ["a2", "a10", "b2"]);
    assert_eq!(tree.network_reference(), "a2,a10,b2");
    assert_eq!(tree.inlets(), [left, right]);
    assert_eq!(tree.node_count(), 4);
    assert_eq!(tree.connection_count(), 3);

    let sections = tree.sections(false, false).unwrap();
    assert_eq!(sections.len(), 3);
    let root = tree.section_from_key("0").unwrap();
    assert_eq!(root.end, tree.outlet());
    assert_eq!(root.flow, 3.0);

    let flows: Vec<f64> = ["0,0", "0,1"]
        .iter()
        .map(|k| tree.flow_of_section_key(k).unwrap())
        .collect();
    let mut sorted = flows.clone();
    sorted.sort_by(f64::total_cmp);
    assert_eq!(sorted, vec![1.0, 2.0]);
}

#[test]
fn flow_and_locator_are_stamped() {
    let (mut tree, left, _) = branched_tree();
    tree.update_sections().unwrap();

    let stub = tree.outgoing_main(left).unwrap();
    let section = tree.section_for_connection(stub).unwrap().unwrap();
    assert_eq!(tree.flow_of_connection(stub).unwrap(), 1.0);

    let locator = tree.connection(stub).unwrap().locator.clone().unwrap();
    assert_eq!(locator.section_key, section.key);
    assert_eq!(locator.network_reference, "a2,a10,b2");
    assert_eq!(locator.purpose, "air");

    let parent = tree.trunk_side_section(&section).unwrap().unwrap();
    assert_eq!(parent.key, "0");
    assert_eq!(trunk_side_key(&section.key), Some("0"));
}

#[test]
fn keys_accept_network_prefix() {
    let (mut tree, _, _) = branched_tree();
    let plain = tree.section_from_key("0,1").unwrap();
    let prefixed = tree.section_from_key("a2,a10,b2:0,1").unwrap();
    assert_eq!(plain, prefixed);
    assert!(matches!(
        tree.section_from_key("x:y:0"),
        Err(TreeError::MalformedKey { .. })
    ));
}

#[test]
fn chamfer_then_simplify_keeps_flow() {
    let mut tree = Tree::new(["r"]);
    tree.set_outlet_position(vec3(0.0, 10.0, 0.0)).unwrap();
    let inlet = tree
        .add_inlet(vec3(-5.0, 0.0, 0.0), 4.0, None, None)
        .unwrap();
    let conn = tree.outgoing_main(inlet).unwrap();
    let corner = tree
        .split_connection_through_point(conn, vec3(0.0, 0.0, 0.0))
        .unwrap();

    let (a, b) = tree.chamfer_at_node(corner.node, 1.0).unwrap();
    assert!(!tree.has_node(corner.node, false));
    let pa = tree.position(a).unwrap();
    let pb = tree.position(b).unwrap();
    let leg = 1.0 / (2.0 * 45f64.to_radians().sin());
    assert!(close(pa, vec3(-leg, 0.0, 0.0)));
    assert!(close(pb, vec3(0.0, leg, 0.0)));

    assert_eq!(tree.simplify(false, &[]).unwrap(), 0);
    let sections = tree.sections(true, false).unwrap();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].flow, 4.0);
    assert_eq!(sections[0].path.vertices.len(), 4);
}

#[test]
fn split_then_simplify_round_trip() {
    let mut tree = Tree::new(["r"]);
    let inlet = tree
        .add_inlet(vec3(10.0, 0.0, 0.0), 1.0, None, None)
        .unwrap();
    let conn = tree.outgoing_main(inlet).unwrap();
    let first = tree
        .split_connection_through_point(conn, vec3(7.0, 0.0, 0.0))
        .unwrap();
    tree.split_connection_through_point(first.downstream, vec3(3.0, 0.0, 0.0))
        .unwrap();
    assert_eq!(tree.connection_count(), 3);

    assert_eq!(tree.simplify(false, &[vec3(3.0, 0.0, 0.0)]).unwrap(), 1);
    assert_eq!(tree.connection_count(), 2);
    assert_eq!(tree.simplify(false, &[]).unwrap(), 1);
    assert_eq!(tree.connection_count(), 1);

    let only = tree.outgoing_main(inlet).unwrap();
    assert_eq!(
        endpoints(&tree, only),
        (vec3(10.0, 0.0, 0.0), vec3(0.0, 0.0, 0.0))
    );
}

#[test]
fn comparator_orders_branches_around_the_trunk() {
    let comparer = ConnectionComparer::new(Some(vec3(0.0, 1.0, 0.0)), false);
    let (east, west, south_east) = (
        vec3(-1.0, 0.0, 0.0),
        vec3(1.0, 0.0, 0.0),
        vec3(-1.0, 1.0, 0.0),
    );
    let mut dirs = vec![east, south_east, west];
    comparer.sort_by_direction(&mut dirs, |d| d).unwrap();
    assert_eq!(dirs, vec![west, south_east, east]);

    let err = ConnectionComparer::new(None, false)
        .compare(&vec3(1.0, 0.0, 0.0), &vec3(2.0, 0.0, 0.0))
        .unwrap_err();
    assert!(matches!(err, TreeError::AmbiguousGeometry { .. }));
}

/// The branched tree with extra nodes a at (-2,5,0) on the left stub and b
/// at (2,5,0) on the right stub, plus a third inlet feeding a.
fn tree_with_loop_ends() -> (Tree, ft_core::NodeId, ft_core::NodeId) {
    let (mut tree, left, right) = branched_tree();
    let left_stub = tree.outgoing_main(left).unwrap();
    let right_stub = tree.outgoing_main(right).unwrap();
    let a = tree
        .split_connection_through_point(left_stub, vec3(-2.0, 5.0, 0.0))
        .unwrap();
    let b = tree
        .split_connection_through_point(right_stub, vec3(2.0, 5.0, 0.0))
        .unwrap();
    tree.add_inlet(vec3(0.0, 9.0, 0.0), 0.5, Some(a.node), None)
        .unwrap();
    (tree, a.node, b.node)
}

#[test]
fn loop_closes_a_cycle() {
    let (mut tree, a, b) = tree_with_loop_ends();
    assert!(tree.find_all_connections_of_cycles().is_empty());

    // Bridge a -> b above the branch point.
    let bend = tree.add_internal_node(vec3(0.0, 7.0, 0.0));
    tree.connect(a, bend, false, Some(true)).unwrap();
    tree.connect(bend, b, false, Some(true)).unwrap();
    assert!(tree.has_loops());
    assert_eq!(tree.find_all_connections_of_cycles().len(), 4);
    assert_eq!(tree.loop_sections().unwrap().len(), 1);
    assert!(tree.validate_overlaps().is_empty());
    tree.check_invariants().unwrap();
}

#[test]
fn straight_loop_through_branch_point_overlaps() {
    let (mut tree, a, b) = tree_with_loop_ends();

    // Runs along the stubs, through (0,5,0), and arrives at b head-on
    // against the right stub.
    tree.connect(a, b, false, Some(true)).unwrap();
    assert_eq!(tree.find_all_connections_of_cycles().len(), 3);

    let issues = tree.validate_overlaps();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].node, b);
    assert!(close(issues[0].position, vec3(2.0, 5.0, 0.0)));
}

#[test]
fn normalize_start_mode() {
    let mut tree = Tree::new(["r"]);
    let inlet = tree
        .add_inlet(vec3(10.0, 3.0, 0.0), 1.0, None, None)
        .unwrap();
    let conn = tree.outgoing_main(inlet).unwrap();

    let created = tree
        .normalize_connection_path(
            conn,
            Vec3::z(),
            vec3(1.0, 0.0, 0.0),
            45.0,
            NormalizationMode::Start,
        )
        .unwrap();
    assert_eq!(created.len(), 2);
    let (s, m) = endpoints(&tree, created[0]);
    let (_, e) = endpoints(&tree, created[1]);
    assert!(close(s, vec3(10.0, 3.0, 0.0)));
    assert!(close(m, vec3(3.0, 3.0, 0.0)));
    assert!(close(e, Vec3::zeros()));
}

#[test]
fn adjust_path_snaps_turns() {
    let mut tree = Tree::new(["r"]);
    let inlet = tree
        .add_inlet(vec3(0.0, 10.0, 2.0), 1.0, None, None)
        .unwrap();
    let conn = tree.outgoing_main(inlet).unwrap();
    tree.split_connection_through_point(conn, vec3(0.0, 5.0, 1.0))
        .unwrap();

    let path = vec![
        vec3(0.0, 10.0, 2.0),
        vec3(0.0, 8.0, 2.0),
        vec3(4.0, 5.0, 2.0),
        vec3(4.0, 2.5, 2.0),
        vec3(1.0, 2.5, 2.0),
        vec3(1.0, 0.0, 2.0),
        vec3(0.0, 0.0, 1.1),
        vec3(0.0, 0.0, 0.0),
    ];
    let section = tree.adjust_path("0", &path).unwrap();
    let v = &section.path.vertices;
    let expected = [
        vec3(0.0, 10.0, 2.0),
        vec3(0.0, 8.5, 2.0),
        vec3(4.0, 4.5, 2.0),
        vec3(4.0, 2.5, 2.0),
        vec3(1.0, 2.5, 2.0),
        vec3(1.0, 0.0, 2.0),
        vec3(0.0, 0.0, 1.0),
        vec3(0.0, 0.0, 0.0),
    ];
    assert_eq!(v.len(), expected.len());
    for (got, want) in v.iter().zip(expected.iter()) {
        assert!(close(*got, *want), "{got:?} != {want:?}");
    }
    for w in v.windows(3) {
        let turn = angle_deg(&(w[1] - w[0]), &(w[2] - w[1]));
        assert!(
            PREFERRED_TURN_ANGLES
                .iter()
                .any(|a| (turn - a).abs() < 1e-6),
            "turn of {turn}"
        );
    }
    assert_eq!(section.hint_path.vertices, path);
}

#[test]
fn compliance_leaves_straight_runs() {
    let points = vec![
        vec3(0.0, 0.0, 0.0),
        vec3(0.0, 5.0, 0.0),
        vec3(0.0, 10.0, 0.0),
    ];
    let out = force_angle_compliance(
        &points,
        &PREFERRED_TURN_ANGLES,
        &vec3(1.0, 0.0, 0.0),
        &tree_tolerance(),
    );
    assert_eq!(out, points);
}

fn tree_tolerance() -> ft_core::GeomTolerance {
    Tree::new(["r"]).tolerance()
}

#[test]
fn grid_route_builds_shared_trunk() {
    let mut grid = GridGraph::new(1e-5);
    for (id, p) in [
        (0, vec3(0.0, 0.0, 0.0)),
        (1, vec3(5.0, 0.0, 0.0)),
        (2, vec3(10.0, 0.0, 0.0)),
        (3, vec3(10.0, 5.0, 0.0)),
        (4, vec3(5.0, 5.0, 0.0)),
    ] {
        grid.add_vertex(id, p);
    }
    let route: HashMap<u64, Option<u64>> =
        [(3, Some(2)), (2, Some(1)), (1, Some(0)), (0, None), (4, Some(1))]
            .into_iter()
            .collect();

    let mut tree = Tree::new(["r"]);
    tree.add_inlet(vec3(10.0, 5.0, 0.0), 1.0, None, None)
        .unwrap();
    tree.add_inlet(vec3(5.0, 5.0, 0.0), 2.0, None, None)
        .unwrap();
    let outcome = tree.connect_by_grid_route(&grid, &route, &[]).unwrap();
    assert!(outcome.all_connected());

    let root = tree.section_from_key("0").unwrap();
    assert_eq!(root.flow, 3.0);
    assert_eq!(
        root.path.vertices,
        vec![vec3(5.0, 0.0, 0.0), vec3(0.0, 0.0, 0.0)]
    );
    assert_eq!(tree.sections(false, false).unwrap().len(), 3);
}

#[test]
fn serde_round_trip_reindexes() {
    let (tree, left, _) = branched_tree();
    let json = serde_json::to_string(&tree).unwrap();
    let mut back: Tree = serde_json::from_str(&json).unwrap();

    assert_eq!(back.id(), tree.id());
    assert_eq!(back.sections(false, false).unwrap().len(), 3);
    let stub = back.outgoing_main(left).unwrap();
    assert_eq!(back.flow_of_connection(stub).unwrap(), 1.0);
}
