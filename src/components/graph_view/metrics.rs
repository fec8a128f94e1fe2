//! Per-node degree, recomputed in full whenever the element counts change.

use indexmap::IndexMap;

use super::types::{GraphElement, MetricValues};

/// Node id to unweighted degree, in node order.
pub type DegreeMap = IndexMap<String, usize>;

/// Every node appears, isolated ones with degree zero. A self loop counts
/// twice; an edge whose endpoint is not a node only counts for the other end.
pub fn degree_map(elements: &[GraphElement]) -> DegreeMap {
	let mut degrees: DegreeMap = elements
		.iter()
		.filter_map(GraphElement::as_node)
		.map(|node| (node.id.clone(), 0))
		.collect();
	for edge in elements.iter().filter_map(GraphElement::as_edge) {
		for end in [&edge.source, &edge.target] {
			if let Some(degree) = degrees.get_mut(end) {
				*degree += 1;
			}
		}
	}
	degrees
}

/// `histogram[d]` is the number of nodes with degree `d`.
pub fn degree_histogram(degrees: &DegreeMap) -> Vec<usize> {
	let Some(max) = degrees.values().copied().max() else {
		return Vec::new();
	};
	let mut buckets = vec![0; max + 1];
	for &degree in degrees.values() {
		buckets[degree] += 1;
	}
	buckets
}

pub fn metric_values(degrees: &DegreeMap) -> MetricValues {
	degrees
		.iter()
		.map(|(id, &degree)| (id.clone(), degree as f64))
		.collect()
}

/// Caches the degree map and recomputes it only when the node or edge count
/// moves.
#[derive(Clone, Debug, Default)]
pub struct DegreeTracker {
	counts: Option<(usize, usize)>,
	degrees: DegreeMap,
}

impl DegreeTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns `true` when the map was recomputed.
	pub fn update(&mut self, elements: &[GraphElement]) -> bool {
		let nodes = elements.iter().filter(|e| e.is_node()).count();
		let counts = (nodes, elements.len() - nodes);
		if self.counts == Some(counts) {
			return false;
		}
		self.counts = Some(counts);
		self.degrees = degree_map(elements);
		true
	}

	pub fn degrees(&self) -> &DegreeMap {
		&self.degrees
	}
}
