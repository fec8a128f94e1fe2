//! Brings the live engine element set into agreement with the declarative
//! element list using the smallest batch of mutations.

use std::collections::{HashMap, HashSet};

use log::warn;

use super::engine::{Engine, Mutation};
use super::error::GraphViewError;
use super::types::GraphElement;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
	pub added: usize,
	pub removed: usize,
	pub patched: usize,
	pub moved: usize,
	pub rejected: usize,
}

impl ReconcileReport {
	pub fn mutations(&self) -> usize {
		self.added + self.removed + self.patched + self.moved
	}
}

/// Declared elements split into those the engine can hold and the faults
/// that exclude the rest.
struct Admitted<'a> {
	elements: Vec<&'a GraphElement>,
	faults: Vec<GraphViewError>,
}

/// Drops repeated ids (the first occurrence wins) and edges whose endpoints
/// are not declared nodes. Rejected input is never planned, so it cannot
/// turn into a fresh mutation on every pass.
fn admit(declared: &[GraphElement]) -> Admitted<'_> {
	let mut seen = HashSet::new();
	let mut nodes = HashSet::new();
	let mut faults = Vec::new();
	let mut unique = Vec::with_capacity(declared.len());
	for element in declared {
		if !seen.insert(element.id()) {
			faults.push(GraphViewError::DuplicateId(element.id().to_string()));
			continue;
		}
		if element.is_node() {
			nodes.insert(element.id());
		}
		unique.push(element);
	}

	let elements = unique
		.into_iter()
		.filter(|element| {
			let Some(edge) = element.as_edge() else {
				return true;
			};
			let missing = [&edge.source, &edge.target]
				.into_iter()
				.find(|end| !nodes.contains(end.as_str()));
			match missing {
				Some(end) => {
					faults.push(GraphViewError::DanglingEdge {
						edge: edge.id.clone(),
						node: end.clone(),
					});
					false
				}
				None => true,
			}
		})
		.collect();
	Admitted { elements, faults }
}

/// Computes the batch turning `live` into `declared`.
///
/// Edge removals come first, then node removals, node inserts and finally
/// edge inserts, so an edge is only inserted once both endpoints exist.
/// Labels, colours and saved positions are patched when they differ;
/// positions only when the declared position numerically differs from the
/// live one.
pub fn plan(live: &[GraphElement], declared: &[GraphElement]) -> Vec<Mutation> {
	let declared = admit(declared).elements;
	let incoming: HashMap<&str, &GraphElement> = declared.iter().map(|e| (e.id(), *e)).collect();
	let current: HashMap<&str, &GraphElement> = live.iter().map(|e| (e.id(), e)).collect();

	let mut edge_removals = Vec::new();
	let mut node_removals = Vec::new();
	let mut node_adds = Vec::new();
	let mut edge_adds = Vec::new();
	let mut patches = Vec::new();

	for element in live {
		let replaced = match incoming.get(element.id()) {
			None => true,
			Some(next) => needs_replacement(element, next),
		};
		if !replaced {
			continue;
		}
		let remove = Mutation::Remove(element.id().to_string());
		if element.is_node() {
			node_removals.push(remove);
		} else {
			edge_removals.push(remove);
		}
	}

	for element in declared.iter().copied() {
		let existing = current
			.get(element.id())
			.filter(|live| !needs_replacement(live, element));
		let Some(live) = existing else {
			let add = Mutation::Add(element.clone());
			if element.is_node() {
				node_adds.push(add);
			} else {
				edge_adds.push(add);
			}
			continue;
		};

		if live.label() != element.label()
			|| live.color() != element.color()
			|| live.saved_position() != element.saved_position()
		{
			patches.push(Mutation::Patch {
				id: element.id().to_string(),
				label: element.label().to_string(),
				color: element.color().to_string(),
				saved_position: element.saved_position(),
			});
		}
		if let (Some(live), Some(next)) = (live.as_node(), element.as_node()) {
			if let (Some(at), Some(to)) = (live.position, next.position) {
				if at != to {
					patches.push(Mutation::Move {
						id: next.id.clone(),
						position: to,
					});
				}
			}
		}
	}

	edge_removals
		.into_iter()
		.chain(node_removals)
		.chain(node_adds)
		.chain(edge_adds)
		.chain(patches)
		.collect()
}

/// An element whose kind or edge endpoints changed cannot be patched in
/// place; it is removed and inserted again.
fn needs_replacement(live: &GraphElement, next: &GraphElement) -> bool {
	match (live, next) {
		(GraphElement::Node(_), GraphElement::Node(_)) => false,
		(GraphElement::Edge(a), GraphElement::Edge(b)) => a.source != b.source || a.target != b.target,
		_ => true,
	}
}

/// Reconciles the engine against `declared` in one atomic batch. Calling it
/// twice with the same input performs no mutations the second time.
pub fn reconcile<E: Engine>(engine: &mut E, declared: &[GraphElement]) -> ReconcileReport {
	let mut report = ReconcileReport::default();
	for fault in admit(declared).faults {
		warn!("dropped declared element: {fault}");
		report.rejected += 1;
	}

	let batch = plan(&engine.snapshot(), declared);
	if batch.is_empty() {
		return report;
	}
	for mutation in &batch {
		match mutation {
			Mutation::Add(_) => report.added += 1,
			Mutation::Remove(_) => report.removed += 1,
			Mutation::Patch { .. } => report.patched += 1,
			Mutation::Move { .. } => report.moved += 1,
		}
	}
	let rejected = engine.apply(batch);
	for r in &rejected {
		warn!("dropped element `{}`: {}", r.mutation.id(), r.reason);
	}
	report.rejected += rejected.len();
	report
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeSet;

	use super::*;
	use crate::components::graph_view::scene::{EngineConfig, PointerButton, Scene, Selection};
	use crate::components::graph_view::types::{GraphEdge, GraphNode, Position};

	fn scene() -> Scene {
		Scene::new(EngineConfig::default(), (400.0, 300.0))
	}

	fn ids(elements: &[GraphElement]) -> BTreeSet<String> {
		elements.iter().map(|e| e.id().to_string()).collect()
	}

	fn graph() -> Vec<GraphElement> {
		vec![
			GraphNode::new("a", "A").at(0.0, 0.0).into(),
			GraphNode::new("b", "B").at(100.0, 0.0).into(),
			GraphNode::new("c", "C").at(50.0, 80.0).into(),
			GraphEdge::new("ab", "a", "b").into(),
			GraphEdge::new("ac", "a", "c").into(),
		]
	}

	#[test]
	fn second_pass_is_a_no_op() {
		let mut engine = scene();
		let declared = graph();
		let first = reconcile(&mut engine, &declared);
		assert_eq!(first.added, 5);
		assert_eq!(engine.snapshot().len(), declared.len());

		let batches = engine.batches_applied();
		let second = reconcile(&mut engine, &declared);
		assert_eq!(second.mutations(), 0);
		assert_eq!(engine.batches_applied(), batches);
		assert_eq!(engine.snapshot().len(), declared.len());
	}

	#[test]
	fn live_id_set_matches_declared() {
		let mut engine = scene();
		reconcile(&mut engine, &graph());

		let mut next = graph();
		next.retain(|e| e.id() != "c" && e.id() != "ac");
		next.push(GraphNode::new("d", "D").into());
		next.push(GraphEdge::new("bd", "b", "d").into());
		let report = reconcile(&mut engine, &next);

		assert_eq!(ids(&engine.snapshot()), ids(&next));
		assert_eq!(report.removed, 2);
		assert_eq!(report.added, 2);
		assert_eq!(engine.batches_applied(), 2);
	}

	#[test]
	fn unchanged_positions_are_never_rewritten() {
		let mut engine = scene();
		reconcile(&mut engine, &graph());

		let mut next = graph();
		if let GraphElement::Node(node) = &mut next[1] {
			node.label = String::from("Bee");
		}
		let batch = plan(&engine.snapshot(), &next);
		assert_eq!(
			batch,
			vec![Mutation::Patch {
				id: "b".into(),
				label: "Bee".into(),
				color: GraphNode::new("b", "").color,
				saved_position: None,
			}]
		);

		if let GraphElement::Node(node) = &mut next[2] {
			node.position = Some(Position::new(50.0, 81.0));
		}
		let batch = plan(&engine.snapshot(), &next);
		assert!(batch.contains(&Mutation::Move {
			id: "c".into(),
			position: Position::new(50.0, 81.0),
		}));
		assert!(
			batch
				.iter()
				.all(|m| !matches!(m, Mutation::Move { id, .. } if id != "c"))
		);
	}

	#[test]
	fn renderer_selection_survives_sync() {
		let mut engine = scene();
		reconcile(&mut engine, &graph());
		engine.pointer_down(Position::new(100.0, 0.0), PointerButton::Primary);
		engine.pointer_up(Position::new(100.0, 0.0), 0.0);
		assert_eq!(engine.selection(), &Selection::Node("b".into()));

		let mut next = graph();
		next.push(GraphNode::new("d", "D").into());
		reconcile(&mut engine, &next);
		assert_eq!(engine.selection(), &Selection::Node("b".into()));
	}

	#[test]
	fn dangling_edges_are_dropped_not_fatal() {
		let mut engine = scene();
		let mut declared = graph();
		declared.push(GraphEdge::new("az", "a", "z").into());
		let report = reconcile(&mut engine, &declared);
		assert_eq!(report.rejected, 1);
		assert_eq!(engine.snapshot().len(), 5);

		let batches = engine.batches_applied();
		let again = reconcile(&mut engine, &declared);
		assert_eq!(again.mutations(), 0);
		assert_eq!(engine.batches_applied(), batches);
	}

	#[test]
	fn repeated_ids_keep_the_first_declaration() {
		let mut engine = scene();
		let mut declared = graph();
		declared.push(GraphNode::new("a", "Other A").at(300.0, 300.0).into());
		let report = reconcile(&mut engine, &declared);
		assert_eq!(report.rejected, 1);
		assert_eq!(engine.position("a"), Some(Position::new(0.0, 0.0)));

		let batches = engine.batches_applied();
		assert_eq!(reconcile(&mut engine, &declared).mutations(), 0);
		assert_eq!(engine.batches_applied(), batches);
	}

	#[test]
	fn saved_positions_survive_a_drag_read_back() {
		let mut engine = scene();
		reconcile(&mut engine, &graph());

		let saved: Vec<GraphElement> = engine
			.snapshot()
			.into_iter()
			.map(|element| match element {
				GraphElement::Node(mut node) => {
					node.saved_position = node.position;
					GraphElement::Node(node)
				}
				edge => edge,
			})
			.collect();
		let report = reconcile(&mut engine, &saved);
		assert_eq!(report.patched, 3);

		engine.pointer_down(Position::new(0.0, 0.0), PointerButton::Primary);
		engine.pointer_move(Position::new(30.0, 40.0));
		engine.pointer_up(Position::new(30.0, 40.0), 0.0);
		assert_eq!(engine.position("a"), Some(Position::new(30.0, 40.0)));

		let read_back = engine.snapshot();
		let a = read_back.iter().find(|e| e.id() == "a").unwrap();
		assert_eq!(a.saved_position(), Some(Position::new(0.0, 0.0)));
		assert_eq!(reconcile(&mut engine, &read_back).mutations(), 0);
	}

	#[test]
	fn rewired_edge_is_replaced() {
		let mut engine = scene();
		reconcile(&mut engine, &graph());
		let mut next = graph();
		next[3] = GraphEdge::new("ab", "b", "c").into();
		let batch = plan(&engine.snapshot(), &next);
		assert_eq!(batch[0], Mutation::Remove("ab".into()));
		assert!(matches!(&batch[1], Mutation::Add(GraphElement::Edge(e)) if e.source == "b"));

		reconcile(&mut engine, &next);
		let edge = engine
			.snapshot()
			.into_iter()
			.find_map(|e| e.as_edge().cloned().filter(|e| e.id == "ab"))
			.unwrap();
		assert_eq!((edge.source.as_str(), edge.target.as_str()), ("b", "c"));
	}
}
