//! The adapter interface every renderer engine exposes.
//!
//! Reconciliation, layout, interaction and the metric overlay depend only on
//! [`Engine`]; all engine-specific state lives behind it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::error::GraphViewError;
use super::layout::LayoutStrategy;
use super::task::Cancellable;
use super::types::{GraphElement, Position};
use super::viewport::{Extent, Viewport};

/// Shared ownership of a live engine. Collaborators keep a `Weak` to it so a
/// torn-down engine is observable instead of kept alive.
pub type EngineHandle<E> = Rc<RefCell<E>>;

pub type Listener = Rc<dyn Fn(&EngineEvent)>;

/// What a pointer event landed on.
#[derive(Clone, Debug, PartialEq)]
pub enum Target {
	Background,
	Node(String),
	Edge(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
	Tap { target: Target, position: Position },
	DoubleTap { target: Target, position: Position },
	Context { target: Target, position: Position },
	PointerDown { target: Target, position: Position },
	PointerUp { target: Target, position: Position },
	/// A grabbed node was released after being dragged.
	DragFree { id: String, position: Position },
	Pan,
	Zoom,
	Resize,
	LayoutStop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
	Tap,
	DoubleTap,
	Context,
	PointerDown,
	PointerUp,
	DragFree,
	Pan,
	Zoom,
	Resize,
	LayoutStop,
}

impl EngineEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			EngineEvent::Tap { .. } => EventKind::Tap,
			EngineEvent::DoubleTap { .. } => EventKind::DoubleTap,
			EngineEvent::Context { .. } => EventKind::Context,
			EngineEvent::PointerDown { .. } => EventKind::PointerDown,
			EngineEvent::PointerUp { .. } => EventKind::PointerUp,
			EngineEvent::DragFree { .. } => EventKind::DragFree,
			EngineEvent::Pan => EventKind::Pan,
			EngineEvent::Zoom => EventKind::Zoom,
			EngineEvent::Resize => EventKind::Resize,
			EngineEvent::LayoutStop => EventKind::LayoutStop,
		}
	}
}

/// Listeners are registered and removed per group, so one collaborator
/// rebuilding its subscriptions never drops another's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ListenerGroup {
	Interaction,
	Overlay,
}

/// One element-level change inside a reconciliation batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Mutation {
	Add(GraphElement),
	Remove(String),
	/// Data fields. `saved_position` is always `None` for edges.
	Patch {
		id: String,
		label: String,
		color: String,
		saved_position: Option<Position>,
	},
	Move { id: String, position: Position },
}

impl Mutation {
	pub fn id(&self) -> &str {
		match self {
			Mutation::Add(element) => element.id(),
			Mutation::Remove(id) | Mutation::Patch { id, .. } | Mutation::Move { id, .. } => id,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rejected {
	pub mutation: Mutation,
	pub reason: GraphViewError,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrabPolicy {
	pub nodes_grabbable: bool,
	pub auto_ungrabify: bool,
}

impl Default for GrabPolicy {
	fn default() -> Self {
		Self {
			nodes_grabbable: true,
			auto_ungrabify: false,
		}
	}
}

/// A layout run as handed to the engine. `preset` carries the positions the
/// engine should restore; other strategies compute their own.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutRequest {
	pub strategy: LayoutStrategy,
	pub preset: HashMap<String, Position>,
	pub fit: bool,
	pub padding: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExportOptions {
	pub scale: f64,
	/// Falls back to the `--graph-background` CSS variable when absent.
	pub background: Option<String>,
}

impl Default for ExportOptions {
	fn default() -> Self {
		Self {
			scale: 2.0,
			background: None,
		}
	}
}

pub trait Engine {
	/// Live elements in insertion order, nodes carrying their live positions.
	fn snapshot(&self) -> Vec<GraphElement>;
	/// Applies a batch atomically: one redraw for the whole batch. Mutations
	/// the engine cannot honour are returned rather than applied.
	fn apply(&mut self, batch: Vec<Mutation>) -> Vec<Rejected>;
	fn node_count(&self) -> usize;
	fn node_positions(&self) -> Vec<(String, Position)>;
	fn position(&self, id: &str) -> Option<Position>;

	fn viewport(&self) -> Viewport;
	fn set_viewport(&mut self, viewport: Viewport) -> Vec<EngineEvent>;
	/// Container size in CSS pixels.
	fn size(&self) -> (f64, f64);
	/// Bounding box of all nodes in model coordinates.
	fn extent(&self) -> Option<Extent>;

	fn subscribe(&mut self, group: ListenerGroup, kind: EventKind, listener: Listener);
	fn unsubscribe(&mut self, group: ListenerGroup);
	fn listeners(&self, kind: EventKind) -> Vec<Listener>;

	fn set_grab_policy(&mut self, policy: GrabPolicy);

	fn start_layout(&mut self, request: LayoutRequest) -> Cancellable<()>;
	/// Stops the active layout run, if any; its completion resolves to `None`.
	fn stop_layout(&mut self);

	fn export_png(&self, options: &ExportOptions) -> Option<String>;
}

/// Delivers events to the listeners registered for their kind. Listeners are
/// cloned out before any is invoked, so they may borrow the engine again.
pub fn dispatch<E: Engine>(handle: &EngineHandle<E>, events: Vec<EngineEvent>) {
	for event in events {
		let listeners = handle.borrow().listeners(event.kind());
		for listener in listeners {
			listener(&event);
		}
	}
}
