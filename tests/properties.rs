use std::collections::BTreeSet;

use geoclust::aggregate::{BlobAggregator, BlobParams, CfEntry, CfTree};
use geoclust::cluster::{groups, Clustering, HierarchicalClustering, KMeans, Linkage, PointerStrategy};
use geoclust::hierarchy::HealthCheck;
use geoclust::{Coordinate, DistanceConfig, Error, Metric, NoProgress, PointSet};
use proptest::prelude::*;

const LINKAGES: [Linkage; 5] = [
    Linkage::Single,
    Linkage::Complete,
    Linkage::Average,
    Linkage::Ward,
    Linkage::Centroid,
];

const STRATEGIES: [PointerStrategy; 3] = [
    PointerStrategy::Auto,
    PointerStrategy::LanceWilliams,
    PointerStrategy::Pointer,
];

/// Distinct grid positions, so no two points coincide.
fn grid_points(max: usize) -> impl Strategy<Value = PointSet> {
    proptest::collection::vec((0u16..500, 0u16..500), 1..max).prop_map(|cells| {
        let unique: BTreeSet<(u16, u16)> = cells.into_iter().collect();
        let xy: Vec<[f64; 2]> = unique
            .into_iter()
            .map(|(x, y)| [f64::from(x) * 0.1, f64::from(y) * 0.1])
            .collect();
        PointSet::from_xy(&xy)
    })
}

/// Points with continuous coordinates; pairwise distance ties are unlikely.
fn scattered_points(max: usize) -> impl Strategy<Value = PointSet> {
    proptest::collection::vec((-100.0f64..100.0, -100.0f64..100.0), 2..max)
        .prop_map(|xy| PointSet::from_xy(&xy.into_iter().map(|(x, y)| [x, y]).collect::<Vec<_>>()))
}

fn assert_partition(points: &PointSet, labels: &[usize], k: usize) -> Result<(), TestCaseError> {
    prop_assert_eq!(labels.len(), points.len());
    let used: BTreeSet<usize> = labels.iter().copied().collect();
    prop_assert_eq!(used, (0..k).collect::<BTreeSet<_>>());
    Ok(())
}

fn entry(x: f64, y: f64, z: f64) -> CfEntry {
    CfEntry::from_point(
        &Coordinate::new(x, y).with_z(z),
        &DistanceConfig::planar().with_pz(30.0).feature_space(),
    )
}

proptest! {
    #[test]
    fn hierarchical_output_is_a_partition(
        points in grid_points(40),
        k_seed in 0usize..1000,
        linkage in prop::sample::select(LINKAGES.to_vec()),
        strategy in prop::sample::select(STRATEGIES.to_vec()),
    ) {
        let k = 1 + k_seed % points.len();
        let labels = HierarchicalClustering::new(k)
            .with_linkage(linkage)
            .with_strategy(strategy)
            .fit_predict(&points, &mut NoProgress)
            .unwrap();
        assert_partition(&points, &labels, k)?;
    }

    #[test]
    fn kmeans_output_is_a_partition(
        points in grid_points(40),
        k_seed in 0usize..1000,
        seed in any::<u64>(),
    ) {
        let k = 1 + k_seed % points.len().min(6);
        match KMeans::new(k).with_seed(seed).fit_predict(&points, &mut NoProgress) {
            Ok(labels) => assert_partition(&points, &labels, k)?,
            Err(Error::EmptyCluster { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }

    #[test]
    fn kmeans_is_deterministic(points in grid_points(50), seed in any::<u64>()) {
        let k = points.len().min(3);
        let model = KMeans::new(k).with_seed(seed);
        let first = model.fit_predict(&points, &mut NoProgress);
        let second = model.fit_predict(&points, &mut NoProgress);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn hierarchical_is_deterministic(
        points in grid_points(30),
        linkage in prop::sample::select(LINKAGES.to_vec()),
    ) {
        let model = HierarchicalClustering::new(points.len().min(4)).with_linkage(linkage);
        let first = model.fit_predict(&points, &mut NoProgress).unwrap();
        let second = model.fit_predict(&points, &mut NoProgress).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn zero_pz_ignores_the_scalar_dimension(
        (x1, y1, z1) in (-1e3f64..1e3, -1e3f64..1e3, -1e3f64..1e3),
        (x2, y2, z2) in (-1e3f64..1e3, -1e3f64..1e3, -1e3f64..1e3),
    ) {
        let p = Coordinate::new(x1, y1).with_z(z1);
        let q = Coordinate::new(x2, y2).with_z(z2);
        let planar = Metric::planar(DistanceConfig::planar());
        let manhattan = Metric::planar(DistanceConfig::manhattan());

        prop_assert_eq!(planar.distance(&p, &q), planar.spatial(&p, &q));
        prop_assert_eq!(manhattan.distance(&p, &q), manhattan.spatial(&p, &q));
        prop_assert_eq!(planar.distance(&p, &q), (x1 - x2).hypot(y1 - y2));
    }

    #[test]
    fn cf_addition_is_associative_and_commutative(
        a in (-1e3f64..1e3, -1e3f64..1e3, -10.0f64..10.0),
        b in (-1e3f64..1e3, -1e3f64..1e3, -10.0f64..10.0),
        c in (-1e3f64..1e3, -1e3f64..1e3, -10.0f64..10.0),
    ) {
        let (a, b, c) = (entry(a.0, a.1, a.2), entry(b.0, b.1, b.2), entry(c.0, c.1, c.2));
        let left = &(&a + &b) + &c;
        let right = &a + &(&b + &c);
        let swapped = &a + &(&c + &b);
        prop_assert_eq!(&left, &right);
        prop_assert_eq!(&right, &swapped);
        prop_assert_eq!(left.number_points(), 3);
    }

    #[test]
    fn cf_tree_keeps_its_invariants(
        xy in proptest::collection::vec((-20.0f64..20.0, -20.0f64..20.0), 1..150),
        branch_factor in 2usize..8,
        max_entries in 1usize..8,
        threshold in 0.0f64..3.0,
    ) {
        let mut tree = CfTree::new(branch_factor, max_entries, threshold, Metric::default());
        for &(x, y) in &xy {
            tree.insert_point(&Coordinate::new(x, y));
        }

        for &leaf in tree.leaves() {
            let node = tree.node(leaf).unwrap();
            prop_assert!(node.entries().len() <= max_entries);
        }
        for level in 0..tree.height() {
            for index in tree.level_nodes(level) {
                prop_assert!(tree.node(index).unwrap().children().len() <= branch_factor);
            }
        }
        prop_assert_eq!(tree.leaf_entries().count(), tree.amount_entries());
        prop_assert_eq!(tree.amount_points(), xy.len());
        prop_assert!(tree.is_healthy());
    }

    #[test]
    fn blobs_partition_and_track_means(
        points in grid_points(80),
        radius in 0.0f64..15.0,
    ) {
        let blobs = BlobAggregator::new(BlobParams::default())
            .create_blobs(&points, radius, &mut NoProgress)
            .unwrap();

        let mut seen = BTreeSet::new();
        for blob in &blobs {
            prop_assert_eq!(blob.size, blob.members.len());
            let n = blob.members.len() as f64;
            let (mut sx, mut sy) = (0.0, 0.0);
            for id in &blob.members {
                prop_assert!(seen.insert(*id), "point {} in two blobs", id);
                let c = points.get(*id).unwrap();
                sx += c.x;
                sy += c.y;
            }
            prop_assert!((blob.centroid.x - sx / n).abs() < 1e-9);
            prop_assert!((blob.centroid.y - sy / n).abs() < 1e-9);
        }
        prop_assert_eq!(seen.len(), points.len());
    }

    #[test]
    fn slink_matches_the_generic_driver(points in scattered_points(30), k_seed in 0usize..100) {
        let k = 1 + k_seed % points.len();
        let pointer = HierarchicalClustering::new(k)
            .with_linkage(Linkage::Single)
            .assign(&points, &mut NoProgress)
            .unwrap();
        let generic = HierarchicalClustering::new(k)
            .with_linkage(Linkage::Single)
            .with_strategy(PointerStrategy::LanceWilliams)
            .assign(&points, &mut NoProgress)
            .unwrap();
        prop_assert_eq!(partition(&pointer), partition(&generic));
    }

    #[test]
    fn default_complete_linkage_matches_kodama(
        points in scattered_points(30),
        k_seed in 0usize..100,
    ) {
        let k = 1 + k_seed % points.len();
        let ours = HierarchicalClustering::new(k)
            .with_linkage(Linkage::Complete)
            .assign(&points, &mut NoProgress)
            .unwrap();
        prop_assert_eq!(partition(&ours), kodama_complete(&points, k));
    }
}

fn partition(assignment: &geoclust::cluster::Assignment) -> BTreeSet<Vec<u64>> {
    groups(assignment).into_iter().collect()
}

/// Complete-linkage partition into `k` groups computed by kodama.
fn kodama_complete(points: &PointSet, k: usize) -> BTreeSet<Vec<u64>> {
    let coords = points.coords();
    let n = coords.len();
    let mut condensed = Vec::with_capacity(n * (n - 1) / 2);
    for row in 0..n {
        for col in (row + 1)..n {
            condensed.push((coords[row].x - coords[col].x).hypot(coords[row].y - coords[col].y));
        }
    }
    let dend = kodama::linkage(&mut condensed, n, kodama::Method::Complete);

    // leaves are 0..n, the i-th merge is n + i
    let mut root: Vec<usize> = (0..2 * n).collect();
    fn find(root: &mut [usize], mut x: usize) -> usize {
        while root[x] != x {
            x = root[x];
        }
        x
    }
    for (i, step) in dend.steps().iter().take(n - k).enumerate() {
        let a = find(&mut root, step.cluster1);
        let b = find(&mut root, step.cluster2);
        root[a] = n + i;
        root[b] = n + i;
    }

    let mut by_root = std::collections::BTreeMap::<usize, Vec<u64>>::new();
    for leaf in 0..n {
        let r = find(&mut root, leaf);
        by_root.entry(r).or_default().push(points.ids()[leaf]);
    }
    by_root.into_values().collect()
}
