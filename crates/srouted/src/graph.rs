//! ECMP shortest-path graph.
//!
//! A breadth-first multi-path tree rooted at one switch. Every switch that
//! can be reached is recorded with its hop distance from the root and all
//! of the equal-cost upstream links it was reached through. Concrete paths
//! and the intermediate "via" switches of each path are derived on demand
//! and cached inside the graph, which is otherwise immutable once built.

use once_cell::sync::OnceCell;
use sonic_sr_types::{DeviceId, Link};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::trace;

/// Source of the currently active links of the fabric.
pub trait LinkSource: Send + Sync {
    /// Links whose source is `device`.
    fn egress_links(&self, device: &DeviceId) -> Vec<Link>;
}

/// Decides which links path computation may traverse.
pub trait LinkPolicy: Send + Sync {
    fn avoid(&self, link: &Link) -> bool;

    /// Avoided links that may still be used to reach a switch the regular
    /// traversal left unreachable.
    fn is_fallback(&self, _link: &Link) -> bool {
        false
    }
}

/// Links from a target back to the root, target side first.
pub type Path = Vec<Link>;

/// Intermediate switches of one path, neighbor of the target first. Neither
/// the root nor the target is included.
pub type Via = Vec<DeviceId>;

/// Via sets of every reachable switch, keyed by hop distance.
pub type ViaMap = BTreeMap<u32, BTreeMap<DeviceId, BTreeSet<Via>>>;

#[derive(Debug)]
pub struct EcmpGraph {
    root: DeviceId,
    distance: HashMap<DeviceId, u32>,
    upstream: HashMap<DeviceId, Vec<Link>>,
    paths: HashMap<DeviceId, OnceCell<Vec<Path>>>,
    via: OnceCell<ViaMap>,
}

impl EcmpGraph {
    /// Runs the traversal from `root` over the links of `links` that
    /// `policy` does not avoid.
    pub fn build<L>(root: &DeviceId, links: &L, policy: &dyn LinkPolicy) -> Self
    where
        L: LinkSource + ?Sized,
    {
        let mut distance = HashMap::from([(root.clone(), 0u32)]);
        let mut upstream: HashMap<DeviceId, Vec<Link>> = HashMap::new();
        let mut frontier = VecDeque::from([root.clone()]);
        let mut fallback: Vec<Link> = Vec::new();

        loop {
            while let Some(sw) = frontier.pop_front() {
                let Some(&current) = distance.get(&sw) else {
                    continue;
                };
                for link in links.egress_links(&sw) {
                    if policy.avoid(&link) {
                        if policy.is_fallback(&link) && !fallback.contains(&link) {
                            fallback.push(link);
                        }
                        continue;
                    }
                    let reached = link.dst_device().clone();
                    match distance.get(&reached).copied() {
                        Some(d) if d == current + 1 => {
                            let ups = upstream.entry(reached).or_default();
                            if !ups.contains(&link) {
                                ups.push(link);
                            }
                        }
                        // Not a shortest path.
                        Some(d) if d <= current => {}
                        // First arrival, or a shorter one through a later
                        // fallback seed.
                        _ => {
                            distance.insert(reached.clone(), current + 1);
                            upstream.insert(reached.clone(), vec![link]);
                            frontier.push_back(reached);
                        }
                    }
                }
            }

            // Fallback links only reach switches the ordinary links left
            // unreachable, nearest first; the rest wait for the next round.
            fallback.retain(|l| !distance.contains_key(l.dst_device()));
            let candidate = |l: &Link| distance.get(l.src_device()).map(|d| d + 1);
            let Some(nearest) = fallback.iter().filter_map(candidate).min() else {
                break;
            };
            let mut seeds: BTreeMap<DeviceId, Vec<Link>> = BTreeMap::new();
            fallback.retain(|l| {
                if candidate(l) != Some(nearest) {
                    return true;
                }
                let ups = seeds.entry(l.dst_device().clone()).or_default();
                if !ups.contains(l) {
                    ups.push(l.clone());
                }
                false
            });
            for (sw, ups) in seeds {
                trace!(root = %root, device = %sw, distance = nearest, "Reached through fallback link");
                distance.insert(sw.clone(), nearest);
                upstream.insert(sw.clone(), ups);
                frontier.push_back(sw);
            }
        }

        let paths = distance
            .keys()
            .filter(|d| *d != root)
            .map(|d| (d.clone(), OnceCell::new()))
            .collect();

        EcmpGraph {
            root: root.clone(),
            distance,
            upstream,
            paths,
            via: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &DeviceId {
        &self.root
    }

    /// Hop distance of `device` from the root (0 for the root itself).
    pub fn distance(&self, device: &DeviceId) -> Option<u32> {
        self.distance.get(device).copied()
    }

    /// Every reachable switch other than the root.
    pub fn targets(&self) -> impl Iterator<Item = &DeviceId> + '_ {
        self.paths.keys()
    }

    pub fn contains(&self, device: &DeviceId) -> bool {
        self.distance.contains_key(device)
    }

    /// Reachable switches grouped by hop distance, root excluded.
    pub fn by_distance(&self) -> BTreeMap<u32, BTreeSet<DeviceId>> {
        let mut out: BTreeMap<u32, BTreeSet<DeviceId>> = BTreeMap::new();
        for (device, d) in &self.distance {
            if *device != self.root {
                out.entry(*d).or_default().insert(device.clone());
            }
        }
        out
    }

    /// Equal-cost links `device` was reached through.
    pub fn upstream_links(&self, device: &DeviceId) -> &[Link] {
        self.upstream.get(device).map(Vec::as_slice).unwrap_or_default()
    }

    /// All shortest paths from `target` back to the root.
    pub fn paths(&self, target: &DeviceId) -> &[Path] {
        match self.paths.get(target) {
            Some(cell) => cell.get_or_init(|| self.unwind(target)).as_slice(),
            None => &[],
        }
    }

    /// Hop distance and via set of `target`.
    pub fn vias(&self, target: &DeviceId) -> Option<(u32, &BTreeSet<Via>)> {
        let d = self.distance(target)?;
        self.via_map().get(&d)?.get(target).map(|v| (d, v))
    }

    /// Via sets of every target keyed by distance.
    pub fn via_map(&self) -> &ViaMap {
        self.via.get_or_init(|| {
            let mut map = ViaMap::new();
            for target in self.paths.keys() {
                let Some(d) = self.distance(target) else {
                    continue;
                };
                let vias = self
                    .paths(target)
                    .iter()
                    .map(|path| {
                        path.iter()
                            .map(|link| link.src_device())
                            .filter(|sw| **sw != self.root)
                            .cloned()
                            .collect::<Via>()
                    })
                    .collect();
                map.entry(d).or_default().insert(target.clone(), vias);
            }
            map
        })
    }

    // Worklist walk from the target toward the root along every recorded
    // upstream link. Upstream links always step one hop closer to the root,
    // so the walk terminates.
    fn unwind(&self, target: &DeviceId) -> Vec<Path> {
        let mut complete = Vec::new();
        let mut stack: Vec<(&DeviceId, Path)> = vec![(target, Vec::new())];

        while let Some((sw, partial)) = stack.pop() {
            if *sw == self.root {
                if !partial.is_empty() {
                    complete.push(partial);
                }
                continue;
            }
            for link in self.upstream_links(sw) {
                let mut next = partial.clone();
                next.push(link.clone());
                stack.push((link.src_device(), next));
            }
        }
        complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dev, link, StaticLinks};
    use pretty_assertions::assert_eq;

    struct AvoidNothing;

    impl LinkPolicy for AvoidNothing {
        fn avoid(&self, _link: &Link) -> bool {
            false
        }
    }

    fn diamond() -> StaticLinks {
        StaticLinks::bidirectional(&[
            ("R", 1, "X", 1),
            ("R", 2, "Y", 1),
            ("X", 2, "T", 1),
            ("Y", 2, "T", 2),
        ])
    }

    fn via(ids: &[&str]) -> Via {
        ids.iter().map(|s| dev(s)).collect()
    }

    #[test]
    fn test_diamond_has_two_equal_cost_vias() {
        let g = EcmpGraph::build(&dev("R"), &diamond(), &AvoidNothing);

        assert_eq!(g.distance(&dev("X")), Some(1));
        assert_eq!(g.distance(&dev("Y")), Some(1));
        assert_eq!(g.distance(&dev("T")), Some(2));
        assert_eq!(g.upstream_links(&dev("T")).len(), 2);

        let (d, vias) = g.vias(&dev("T")).unwrap();
        assert_eq!(d, 2);
        assert_eq!(vias, &BTreeSet::from([via(&["X"]), via(&["Y"])]));
    }

    #[test]
    fn test_direct_neighbor_has_empty_via() {
        let g = EcmpGraph::build(&dev("R"), &diamond(), &AvoidNothing);
        let (d, vias) = g.vias(&dev("X")).unwrap();
        assert_eq!(d, 1);
        assert_eq!(vias, &BTreeSet::from([Via::new()]));
    }

    #[test]
    fn test_removing_one_upstream_keeps_distance() {
        let links = StaticLinks::bidirectional(&[
            ("R", 1, "X", 1),
            ("R", 2, "Y", 1),
            ("Y", 2, "T", 2),
        ]);
        let g = EcmpGraph::build(&dev("R"), &links, &AvoidNothing);
        assert_eq!(g.distance(&dev("T")), Some(2));
        assert_eq!(g.upstream_links(&dev("T")).len(), 1);
    }

    #[test]
    fn test_parallel_links_recorded_once_in_frontier() {
        let links = StaticLinks::bidirectional(&[
            ("R", 1, "S", 1),
            ("R", 2, "S", 2),
            ("S", 3, "T", 1),
        ]);
        let g = EcmpGraph::build(&dev("R"), &links, &AvoidNothing);

        assert_eq!(g.upstream_links(&dev("S")).len(), 2);
        assert_eq!(g.distance(&dev("T")), Some(2));
        // Both parallel links yield a path but the via sets collapse.
        assert_eq!(g.paths(&dev("T")).len(), 2);
        let (_, vias) = g.vias(&dev("T")).unwrap();
        assert_eq!(vias, &BTreeSet::from([via(&["S"])]));
    }

    #[test]
    fn test_distances_match_hop_count_in_chain() {
        let links = StaticLinks::bidirectional(&[
            ("A", 1, "B", 1),
            ("B", 2, "C", 1),
            ("C", 2, "D", 1),
            ("A", 2, "D", 2),
        ]);
        let g = EcmpGraph::build(&dev("A"), &links, &AvoidNothing);
        assert_eq!(g.distance(&dev("B")), Some(1));
        assert_eq!(g.distance(&dev("D")), Some(1));
        assert_eq!(g.distance(&dev("C")), Some(2));

        let (_, vias) = g.vias(&dev("C")).unwrap();
        assert_eq!(vias, &BTreeSet::from([via(&["B"]), via(&["D"])]));
    }

    #[test]
    fn test_via_is_ordered_from_target_side() {
        let links = StaticLinks::bidirectional(&[
            ("A", 1, "B", 1),
            ("B", 2, "C", 1),
            ("C", 2, "D", 1),
        ]);
        let g = EcmpGraph::build(&dev("A"), &links, &AvoidNothing);
        let (d, vias) = g.vias(&dev("D")).unwrap();
        assert_eq!(d, 3);
        assert_eq!(vias, &BTreeSet::from([via(&["C", "B"])]));

        let by_distance = g.by_distance();
        assert_eq!(by_distance[&3], BTreeSet::from([dev("D")]));
    }

    #[test]
    fn test_isolated_root_yields_empty_graph() {
        let g = EcmpGraph::build(&dev("Z"), &diamond(), &AvoidNothing);
        assert_eq!(g.targets().count(), 0);
        assert!(g.via_map().is_empty());
        assert_eq!(g.distance(&dev("Z")), Some(0));
    }

    #[test]
    fn test_paths_are_memoized() {
        let g = EcmpGraph::build(&dev("R"), &diamond(), &AvoidNothing);
        let first = g.paths(&dev("T")).as_ptr();
        let second = g.paths(&dev("T")).as_ptr();
        assert_eq!(first, second);
        assert!(g.paths(&dev("unknown")).is_empty());
    }

    struct AvoidPair;

    impl LinkPolicy for AvoidPair {
        fn avoid(&self, l: &Link) -> bool {
            l.connects(&dev("L1"), &dev("L2"))
        }

        fn is_fallback(&self, l: &Link) -> bool {
            self.avoid(l)
        }
    }

    #[test]
    fn test_avoided_links_not_used_for_transit() {
        let links = StaticLinks::bidirectional(&[
            ("L1", 1, "S1", 1),
            ("L2", 1, "S1", 2),
            ("L1", 9, "L2", 9),
        ]);
        let g = EcmpGraph::build(&dev("L1"), &links, &AvoidPair);
        assert_eq!(g.distance(&dev("L2")), Some(2));
        let (_, vias) = g.vias(&dev("L2")).unwrap();
        assert_eq!(vias, &BTreeSet::from([via(&["S1"])]));
    }

    #[test]
    fn test_fallback_link_reaches_isolated_pair() {
        let links = StaticLinks::bidirectional(&[("L1", 1, "S1", 1), ("L1", 9, "L2", 9)]);
        let g = EcmpGraph::build(&dev("L1"), &links, &AvoidPair);
        assert_eq!(g.distance(&dev("L2")), Some(1));
        assert_eq!(g.upstream_links(&dev("L2")), &[link("L1", 9, "L2", 9)]);
    }

    struct AvoidPairs(Vec<(&'static str, &'static str)>);

    impl LinkPolicy for AvoidPairs {
        fn avoid(&self, l: &Link) -> bool {
            self.0.iter().any(|(a, b)| l.connects(&dev(a), &dev(b)))
        }

        fn is_fallback(&self, l: &Link) -> bool {
            self.avoid(l)
        }
    }

    #[test]
    fn test_nearer_fallback_seed_expands_first() {
        // P1 is one hop from the root, P2 three. Both pair links lead to
        // switches that share the neighbor Y.
        let links = StaticLinks::bidirectional(&[
            ("S0", 1, "P1", 1),
            ("S0", 2, "X1", 1),
            ("X1", 2, "X2", 1),
            ("X2", 2, "P2", 1),
            ("P1", 9, "Zq", 9),
            ("P2", 9, "Aq", 9),
            ("Zq", 1, "Y", 1),
            ("Aq", 1, "Y", 2),
        ]);
        let policy = AvoidPairs(vec![("P1", "Zq"), ("P2", "Aq")]);
        let g = EcmpGraph::build(&dev("S0"), &links, &policy);

        assert_eq!(g.distance(&dev("P2")), Some(3));
        assert_eq!(g.distance(&dev("Zq")), Some(2));
        assert_eq!(g.distance(&dev("Y")), Some(3));
        assert_eq!(g.distance(&dev("Aq")), Some(4));
        let (_, vias) = g.vias(&dev("Y")).unwrap();
        assert_eq!(vias, &BTreeSet::from([via(&["Zq", "P1"])]));
        assert_eq!(g.upstream_links(&dev("Aq")), &[link("Y", 2, "Aq", 1)]);
    }

    #[test]
    fn test_distance_never_shrinks_along_upstream_links() {
        let links = StaticLinks::bidirectional(&[
            ("S0", 1, "P1", 1),
            ("S0", 2, "X1", 1),
            ("X1", 2, "P2", 1),
            ("P1", 9, "Zq", 9),
            ("P2", 9, "Aq", 9),
            ("Zq", 1, "W", 1),
            ("W", 2, "Aq", 1),
        ]);
        let policy = AvoidPairs(vec![("P1", "Zq"), ("P2", "Aq")]);
        let g = EcmpGraph::build(&dev("S0"), &links, &policy);

        for target in g.targets() {
            let d = g.distance(target).unwrap();
            for up in g.upstream_links(target) {
                assert_eq!(g.distance(up.src_device()), Some(d - 1), "{target}");
            }
        }
    }
}
