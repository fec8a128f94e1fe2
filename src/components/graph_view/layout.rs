//! Layout orchestration: at most one asynchronous layout run per engine,
//! with resulting positions committed back to the data store.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use log::debug;

use super::engine::{Engine, EngineHandle, LayoutRequest};
use super::error::GraphViewError;
use super::task::CancelToken;
use super::types::{GraphElement, Position};

pub const DEFAULT_FORCE_ITERATIONS: u32 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutStrategy {
	/// Positions come from each node's saved position, never flow back.
	Preset,
	Force { iterations: u32 },
	Circle,
	Grid,
}

impl LayoutStrategy {
	pub fn name(&self) -> &'static str {
		match self {
			LayoutStrategy::Preset => "preset",
			LayoutStrategy::Force { .. } => "force",
			LayoutStrategy::Circle => "circle",
			LayoutStrategy::Grid => "grid",
		}
	}
}

impl fmt::Display for LayoutStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for LayoutStrategy {
	type Err = GraphViewError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"preset" => Ok(LayoutStrategy::Preset),
			"force" | "cose" => Ok(LayoutStrategy::Force {
				iterations: DEFAULT_FORCE_ITERATIONS,
			}),
			"circle" => Ok(LayoutStrategy::Circle),
			"grid" => Ok(LayoutStrategy::Grid),
			other => Err(GraphViewError::UnknownLayout(other.to_string())),
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutOptions {
	pub strategy: LayoutStrategy,
	pub fit: bool,
	pub padding: f64,
}

impl Default for LayoutOptions {
	fn default() -> Self {
		Self {
			strategy: LayoutStrategy::Force {
				iterations: DEFAULT_FORCE_ITERATIONS,
			},
			fit: true,
			padding: 30.0,
		}
	}
}

impl LayoutOptions {
	pub fn with_strategy(strategy: LayoutStrategy) -> Self {
		Self {
			strategy,
			..Self::default()
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutOutcome {
	/// Positions of this many nodes were committed to the data store.
	Committed(usize),
	/// A `preset` run finished; nothing flows back.
	Restored,
	/// Superseded by a newer run or stopped.
	Cancelled,
	/// The engine was torn down before the commit could happen.
	Abandoned,
}

pub type PositionSink = Rc<dyn Fn(String, Position)>;

#[derive(Default)]
pub struct LayoutOrchestrator {
	active: Option<CancelToken>,
}

impl LayoutOrchestrator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Stops the active run, if any. The superseded run never commits.
	pub fn stop<E: Engine>(&mut self, engine: &mut E) {
		if let Some(token) = self.active.take() {
			token.cancel();
			engine.stop_layout();
		}
	}

	/// Starts a layout run and returns the task that awaits its completion and
	/// commits positions. Returns `None` when there are no nodes to lay out.
	pub fn run<E: Engine + 'static>(
		&mut self,
		handle: &EngineHandle<E>,
		elements: &[GraphElement],
		options: &LayoutOptions,
		commit: Option<PositionSink>,
	) -> Option<LocalBoxFuture<'static, LayoutOutcome>> {
		let mut engine = handle.borrow_mut();
		if engine.node_count() == 0 {
			return None;
		}
		self.stop(&mut *engine);

		let is_preset = options.strategy == LayoutStrategy::Preset;
		let preset = if is_preset {
			saved_positions(elements)
		} else {
			HashMap::new()
		};
		let completion = engine.start_layout(LayoutRequest {
			strategy: options.strategy,
			preset,
			fit: options.fit,
			padding: options.padding,
		});
		drop(engine);

		let token = completion.token();
		self.active = Some(token.clone());
		let weak = Rc::downgrade(handle);
		let strategy = options.strategy;

		Some(
			async move {
				if completion.await.is_none() {
					debug!("layout `{strategy}` stopped before completion");
					return LayoutOutcome::Cancelled;
				}
				if is_preset {
					return LayoutOutcome::Restored;
				}
				let Some(engine) = weak.upgrade() else {
					debug!("layout `{strategy}` finished after teardown; commit skipped");
					return LayoutOutcome::Abandoned;
				};
				if token.is_cancelled() {
					return LayoutOutcome::Cancelled;
				}
				let positions = engine.borrow().node_positions();
				drop(engine);
				let count = positions.len();
				if let Some(commit) = commit {
					for (id, position) in positions {
						commit(id, position);
					}
				}
				debug!("layout `{strategy}` committed {count} positions");
				LayoutOutcome::Committed(count)
			}
			.boxed_local(),
		)
	}
}

/// Saved positions by node id; nodes without one are left where they are.
fn saved_positions(elements: &[GraphElement]) -> HashMap<String, Position> {
	elements
		.iter()
		.filter_map(GraphElement::as_node)
		.filter_map(|node| Some((node.id.clone(), node.saved_position?)))
		.collect()
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;

	use futures::executor::block_on;

	use super::*;
	use crate::components::graph_view::adapter::EngineAdapter;
	use crate::components::graph_view::reconcile::reconcile;
	use crate::components::graph_view::scene::{EngineConfig, MountTarget, PointerButton, Scene};
	use crate::components::graph_view::types::{GraphEdge, GraphNode};

	fn mount(elements: &[GraphElement]) -> (EngineAdapter<Scene>, EngineHandle<Scene>) {
		let mut adapter = EngineAdapter::<Scene>::new();
		let target = MountTarget::Headless {
			width: 600.0,
			height: 400.0,
		};
		let handle = adapter
			.create(Some(&target), elements, &EngineConfig::default())
			.unwrap();
		(adapter, handle)
	}

	fn recorder() -> (PositionSink, Rc<RefCell<Vec<(String, Position)>>>) {
		let log = Rc::new(RefCell::new(Vec::new()));
		let sink_log = log.clone();
		let sink: PositionSink = Rc::new(move |id, p| sink_log.borrow_mut().push((id, p)));
		(sink, log)
	}

	fn sample() -> Vec<GraphElement> {
		vec![
			GraphNode::new("a", "A").at(0.0, 0.0).saved_at(10.0, 20.0).into(),
			GraphNode::new("b", "B").at(5.0, 5.0).saved_at(-30.0, 40.0).into(),
			GraphNode::new("c", "C").at(9.0, 9.0).into(),
			GraphEdge::new("ab", "a", "b").into(),
		]
	}

	fn finish(handle: &EngineHandle<Scene>) {
		for _ in 0..1000 {
			let events = handle.borrow_mut().tick(1.0 / 60.0);
			crate::components::graph_view::engine::dispatch(handle, events);
			if !handle.borrow().layout_running() {
				return;
			}
		}
	}

	#[test]
	fn strategy_names_parse() {
		assert_eq!("preset".parse::<LayoutStrategy>(), Ok(LayoutStrategy::Preset));
		assert_eq!("grid".parse::<LayoutStrategy>(), Ok(LayoutStrategy::Grid));
		assert_eq!(
			"dagre".parse::<LayoutStrategy>(),
			Err(GraphViewError::UnknownLayout("dagre".into()))
		);
	}

	#[test]
	fn empty_graph_starts_nothing() {
		let (_adapter, handle) = mount(&[]);
		let mut orchestrator = LayoutOrchestrator::new();
		assert!(
			orchestrator
				.run(&handle, &[], &LayoutOptions::default(), None)
				.is_none()
		);
	}

	#[test]
	fn preset_restores_saved_positions_without_commit() {
		let elements = sample();
		let (_adapter, handle) = mount(&elements);
		let (sink, log) = recorder();
		let mut orchestrator = LayoutOrchestrator::new();
		let task = orchestrator
			.run(
				&handle,
				&elements,
				&LayoutOptions::with_strategy(LayoutStrategy::Preset),
				Some(sink),
			)
			.unwrap();
		finish(&handle);
		assert_eq!(block_on(task), LayoutOutcome::Restored);
		assert!(log.borrow().is_empty());

		let engine = handle.borrow();
		assert_eq!(engine.position("a"), Some(Position::new(10.0, 20.0)));
		assert_eq!(engine.position("b"), Some(Position::new(-30.0, 40.0)));
		assert_eq!(engine.position("c"), Some(Position::new(9.0, 9.0)));
	}

	#[test]
	fn preset_after_save_and_drag_restores_saved_spot() {
		let elements: Vec<GraphElement> = vec![
			GraphNode::new("a", "A").at(1.0, 2.0).into(),
			GraphNode::new("b", "B").at(200.0, 50.0).into(),
		];
		let (_adapter, handle) = mount(&elements);
		let saved = vec![
			GraphNode::new("a", "A").at(1.0, 2.0).saved_at(1.0, 2.0).into(),
			GraphNode::new("b", "B").at(200.0, 50.0).into(),
		];
		reconcile(&mut *handle.borrow_mut(), &saved);

		{
			let mut scene = handle.borrow_mut();
			scene.pointer_down(Position::new(1.0, 2.0), PointerButton::Primary);
			scene.pointer_move(Position::new(80.0, 90.0));
			scene.pointer_up(Position::new(80.0, 90.0), 0.0);
		}
		let read_back = handle.borrow().snapshot();

		let mut orchestrator = LayoutOrchestrator::new();
		let task = orchestrator
			.run(
				&handle,
				&read_back,
				&LayoutOptions::with_strategy(LayoutStrategy::Preset),
				None,
			)
			.unwrap();
		finish(&handle);
		assert_eq!(block_on(task), LayoutOutcome::Restored);
		assert_eq!(handle.borrow().position("a"), Some(Position::new(1.0, 2.0)));
	}

	#[test]
	fn computed_layout_commits_every_node() {
		let elements = sample();
		let (_adapter, handle) = mount(&elements);
		let (sink, log) = recorder();
		let mut orchestrator = LayoutOrchestrator::new();
		let task = orchestrator
			.run(
				&handle,
				&elements,
				&LayoutOptions::with_strategy(LayoutStrategy::Grid),
				Some(sink),
			)
			.unwrap();
		finish(&handle);
		assert_eq!(block_on(task), LayoutOutcome::Committed(3));

		let engine = handle.borrow();
		for (id, position) in log.borrow().iter() {
			assert_eq!(engine.position(id), Some(*position));
		}
	}

	#[test]
	fn second_run_supersedes_first() {
		let elements = sample();
		let (_adapter, handle) = mount(&elements);
		let (sink, log) = recorder();
		let mut orchestrator = LayoutOrchestrator::new();
		let first = orchestrator
			.run(
				&handle,
				&elements,
				&LayoutOptions::with_strategy(LayoutStrategy::Force { iterations: 40 }),
				Some(sink.clone()),
			)
			.unwrap();
		let second = orchestrator
			.run(
				&handle,
				&elements,
				&LayoutOptions::with_strategy(LayoutStrategy::Circle),
				Some(sink),
			)
			.unwrap();
		finish(&handle);

		assert_eq!(block_on(first), LayoutOutcome::Cancelled);
		assert_eq!(block_on(second), LayoutOutcome::Committed(3));
		assert_eq!(log.borrow().len(), 3);
	}

	#[test]
	fn teardown_mid_run_skips_commit() {
		let elements = sample();
		let (mut adapter, handle) = mount(&elements);
		let (sink, log) = recorder();
		let mut orchestrator = LayoutOrchestrator::new();
		let task = orchestrator
			.run(
				&handle,
				&elements,
				&LayoutOptions::with_strategy(LayoutStrategy::Circle),
				Some(sink),
			)
			.unwrap();
		drop(handle);
		adapter.destroy();

		let outcome = block_on(task);
		assert!(matches!(
			outcome,
			LayoutOutcome::Cancelled | LayoutOutcome::Abandoned
		));
		assert!(log.borrow().is_empty());
	}
}
