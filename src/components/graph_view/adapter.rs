use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use super::engine::{Engine, EngineHandle, ListenerGroup};
use super::error::GraphViewError;
use super::reconcile::reconcile;
use super::scene::EngineConfig;
use super::types::GraphElement;

/// An engine that can be bound to a mount target and released again.
pub trait EngineBackend: Engine + Sized + 'static {
	type Mount;

	fn mount(target: &Self::Mount, config: &EngineConfig) -> Result<Self, GraphViewError>;

	/// Frees the drawing surface. Called once, on destroy.
	fn release(&mut self) {}
}

/// Owns the lifecycle of one engine instance. Other components reach the
/// engine only through the handle returned by [`EngineAdapter::create`].
pub struct EngineAdapter<E: EngineBackend> {
	handle: Option<EngineHandle<E>>,
}

impl<E: EngineBackend> Default for EngineAdapter<E> {
	fn default() -> Self {
		Self { handle: None }
	}
}

impl<E: EngineBackend> EngineAdapter<E> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates the engine and inserts the initial elements. Creating again
	/// while an engine exists returns the existing handle.
	pub fn create(
		&mut self,
		target: Option<&E::Mount>,
		initial: &[GraphElement],
		config: &EngineConfig,
	) -> Result<EngineHandle<E>, GraphViewError> {
		if let Some(handle) = &self.handle {
			return Ok(handle.clone());
		}
		let target = target.ok_or(GraphViewError::MountUnavailable("graph canvas"))?;
		let mut engine = E::mount(target, config)?;
		let report = reconcile(&mut engine, initial);
		info!(
			"graph engine created with {} elements ({} rejected)",
			report.added, report.rejected
		);
		let handle = Rc::new(RefCell::new(engine));
		self.handle = Some(handle.clone());
		Ok(handle)
	}

	pub fn is_live(&self) -> bool {
		self.handle.is_some()
	}

	/// Stops any layout, detaches every listener and releases the surface.
	/// Safe to call any number of times.
	pub fn destroy(&mut self) {
		let Some(handle) = self.handle.take() else {
			return;
		};
		let mut engine = handle.borrow_mut();
		engine.stop_layout();
		engine.unsubscribe(ListenerGroup::Interaction);
		engine.unsubscribe(ListenerGroup::Overlay);
		engine.release();
		info!("graph engine destroyed");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::graph_view::engine::EventKind;
	use crate::components::graph_view::scene::{MountTarget, Scene};
	use crate::components::graph_view::types::{GraphEdge, GraphNode};

	fn target() -> MountTarget {
		MountTarget::Headless {
			width: 320.0,
			height: 240.0,
		}
	}

	#[test]
	fn missing_mount_target_fails_fast() {
		let mut adapter = EngineAdapter::<Scene>::new();
		let err = adapter
			.create(None, &[], &EngineConfig::default())
			.err()
			.unwrap();
		assert_eq!(err, GraphViewError::MountUnavailable("graph canvas"));
		assert!(!adapter.is_live());
	}

	#[test]
	fn create_inserts_initial_elements_once() {
		let mut adapter = EngineAdapter::<Scene>::new();
		let elements: Vec<GraphElement> = vec![
			GraphNode::new("a", "A").into(),
			GraphNode::new("b", "B").into(),
			GraphEdge::new("ab", "a", "b").into(),
		];
		let first = adapter
			.create(Some(&target()), &elements, &EngineConfig::default())
			.unwrap();
		let second = adapter
			.create(Some(&target()), &[], &EngineConfig::default())
			.unwrap();
		assert!(Rc::ptr_eq(&first, &second));
		assert_eq!(first.borrow().snapshot().len(), 3);
	}

	#[test]
	fn destroy_is_idempotent_and_detaches_listeners() {
		let mut adapter = EngineAdapter::<Scene>::new();
		let handle = adapter
			.create(Some(&target()), &[], &EngineConfig::default())
			.unwrap();
		handle.borrow_mut().subscribe(
			ListenerGroup::Overlay,
			EventKind::Zoom,
			Rc::new(|_| {}),
		);
		adapter.destroy();
		adapter.destroy();
		assert!(!adapter.is_live());
		assert!(handle.borrow().listeners(EventKind::Zoom).is_empty());
	}
}
