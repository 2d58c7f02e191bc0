// End-to-end tests for the planning pipeline.
//
// Each test drives a real `DiscoveryCoordinator` (worker threads included)
// against a synthetic feature locator, feeds its results into a
// `RoadNetwork`, and generates every planned edge:
// discovery → batching → planning → pathfinding → completion.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use waymark_core::config::{GraphAlgorithm, NetworkConfig};
use waymark_core::discovery::{DiscoveryCoordinator, FeatureLocator, TaskResult};
use waymark_core::planner::constraints::segments_cross;
use waymark_core::prng::PlanRng;
use waymark_core::types::{RoadSpan, SpanKind};
use waymark_core::{
    DiscoveryError, EdgeStatus, FlatTerrain, FnTerrain, Point2, RoadNetwork, TerrainClass,
};

const WORLD: &str = "overworld";

/// Features sit on a lattice: villages every 300 blocks, outposts on the same
/// lattice shifted 150 blocks east.
struct LatticeLocator;

impl FeatureLocator for LatticeLocator {
    fn locate_nearest(
        &self,
        filter: &str,
        center: Point2,
        radius: i32,
    ) -> Result<Option<Point2>, DiscoveryError> {
        let shift = match filter {
            "village" => 0,
            "outpost" => 150,
            other => return Err(DiscoveryError::InvalidTargetFilter(other.to_string())),
        };
        let snap = |v: i32, s: i32| ((v - s) as f64 / 300.0).round() as i32 * 300 + s;
        let found = Point2::new(snap(center.x, shift), snap(center.z, 0));
        Ok((found.distance(center) <= radius as f64).then_some(found))
    }
}

fn config() -> NetworkConfig {
    let mut config = NetworkConfig::default();
    config.discovery.worker_count = 3;
    config.discovery.target_filters = vec!["village".into(), "outpost".into()];
    config.discovery.search_radius = 900;
    config.discovery.batch_size = 4;
    config.discovery.tile_size = 128;
    config.discovery.max_generating = 4;
    config
}

fn discover(net: &RoadNetwork, coordinator: &mut DiscoveryCoordinator, seed: u64) -> Vec<TaskResult> {
    let mut rng = PlanRng::new(seed);
    for center in net.unplanned_centers(WORLD, Point2::new(0, 0), 24, &mut rng) {
        assert!(coordinator.submit(center).is_some());
    }
    assert!(coordinator.wait_idle(Duration::from_secs(10)));
    coordinator.take_completed()
}

fn assert_planar(net: &RoadNetwork) {
    let keys: Vec<_> = net.edge_views().iter().map(|v| v.key).collect();
    for (i, a) in keys.iter().enumerate() {
        for b in &keys[i + 1..] {
            assert!(
                !segments_cross(a.lo(), a.hi(), b.lo(), b.hi()),
                "{a} crosses {b}"
            );
        }
    }
}

#[test]
fn discovered_nodes_become_completed_roads() {
    env_logger::try_init().ok();
    // Without component bridging every edge comes from the triangulation.
    let mut config = config();
    config.graph.connect_components = false;
    let net = RoadNetwork::new(config.clone(), Arc::new(FlatTerrain::new(70))).unwrap();
    let mut coordinator = DiscoveryCoordinator::new(Arc::new(LatticeLocator), &config.discovery);
    assert!(!coordinator.is_synchronous());

    let results = discover(&net, &mut coordinator, 42);
    assert!(!results.is_empty());
    let labels: BTreeSet<&str> = results.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, BTreeSet::from(["outpost", "village"]));

    net.absorb_discovery(WORLD, &results, 0);
    net.flush();
    assert_eq!(net.pending_nodes(), 0);
    let found: BTreeSet<Point2> = results.iter().filter_map(|r| r.position).collect();
    assert_eq!(net.graph().node_count(), found.len());
    assert!(net.graph().edge_count() > 0);
    assert_planar(&net);

    let generated = net.generate_all(1);
    assert_eq!(generated.len(), net.graph().edge_count());
    assert_eq!(
        net.graph().count_with_status(EdgeStatus::Completed),
        net.graph().edge_count()
    );
    for view in net.edge_views() {
        let path = net.path(view.key.lo(), view.key.hi()).unwrap();
        assert!(path.complete);
        assert_eq!(path.segments.first().map(|s| s.center), Some(view.key.lo()));
        assert_eq!(path.segments.last().map(|s| s.center), Some(view.key.hi()));
    }

    // A second round over the same area finds nothing new to search.
    let again = discover(&net, &mut coordinator, 42);
    assert!(again.is_empty());
    assert!(coordinator.shutdown(Duration::from_secs(5)));
    assert!(coordinator.submit(Point2::new(0, 0)).is_none());
}

#[test]
fn pipeline_is_deterministic_across_pool_sizes() {
    let run = |workers: usize| {
        let mut config = config();
        config.discovery.worker_count = workers;
        let net = RoadNetwork::new(config.clone(), Arc::new(FlatTerrain::new(70))).unwrap();
        let mut coordinator =
            DiscoveryCoordinator::new(Arc::new(LatticeLocator), &config.discovery);
        let results = discover(&net, &mut coordinator, 7);
        net.absorb_discovery(WORLD, &results, 0);
        net.flush();
        net.generate_all(0);
        coordinator.shutdown(Duration::from_secs(5));
        (net.edge_views(), net.planned_tiles(WORLD))
    };
    assert_eq!(run(0), run(4));
}

#[test]
fn mst_network_grows_incrementally() {
    let mut config = config();
    config.graph.algorithm = GraphAlgorithm::MinimumSpanningTree;
    config.graph.incremental_mst_batch_limit = 8;
    config.discovery.worker_count = 0;
    let net = RoadNetwork::new(config.clone(), Arc::new(FlatTerrain::new(70))).unwrap();
    let mut coordinator = DiscoveryCoordinator::new(Arc::new(LatticeLocator), &config.discovery);
    assert!(coordinator.is_synchronous());

    let results = discover(&net, &mut coordinator, 3);
    net.absorb_discovery(WORLD, &results, 0);
    net.flush();
    let nodes = net.graph().node_count();
    assert!(nodes >= 2);
    // A spanning forest: never more edges than nodes minus one.
    assert!(net.graph().edge_count() < nodes);

    let before = net.graph().edge_count();
    let added = net.ingest_nodes(vec![waymark_core::Node::new(Point2::new(10, 10), "camp", 5)]);
    assert_eq!(added, 1);
    assert!(net.graph().edge_count() <= before + 1);
}

#[test]
fn river_crossing_is_annotated_as_bridge() {
    // A north-south river between x = 100 and x = 130.
    let river = |x: i32| (100..130).contains(&x);
    let terrain = FnTerrain::new(move |x, _| if river(x) { 63 } else { 66 })
        .with_floor(move |x, _| if river(x) { 55 } else { 66 })
        .with_class(move |x, _| {
            if river(x) {
                TerrainClass::River
            } else {
                TerrainClass::Ordinary
            }
        });
    let mut config = config();
    config.pathfinding.water_penalty = 10.0;
    config.pathfinding.water_depth_weight = 1.0;
    config.pathfinding.river_penalty = 10.0;
    config.pathfinding.near_water_penalty = 0.0;
    let net = RoadNetwork::new(config, Arc::new(terrain)).unwrap();

    let (a, b) = (Point2::new(0, 0), Point2::new(240, 0));
    net.add_manual_edge(a, b);
    let generated = net.generate_next(0).unwrap();
    assert_eq!(generated.status, EdgeStatus::Completed);

    let spans: Vec<RoadSpan> = net.spans(a, b);
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].kind, SpanKind::Bridge);
    assert!(spans[0].end - spans[0].start >= 30);
    assert!(net.edge_views()[0].manual);
}
