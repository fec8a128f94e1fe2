//! Turns engine-level pointer events into domain callbacks according to the
//! active tool and edit mode.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::engine::{
	Engine, EngineEvent, EngineHandle, EventKind, GrabPolicy, ListenerGroup, Target,
};
use super::types::{GraphElement, Position, ToolMode};

/// Write access to the data store plus notification hooks. Absent handlers
/// turn the corresponding action into a no-op.
#[derive(Clone, Default)]
pub struct GraphCallbacks {
	pub on_graph_update: Option<Rc<dyn Fn(Vec<GraphElement>)>>,
	pub on_node_select: Option<Rc<dyn Fn(Option<String>)>>,
	pub on_edge_select: Option<Rc<dyn Fn(Option<String>)>>,
	pub update_node_position: Option<Rc<dyn Fn(String, Position)>>,
	pub on_canvas_tap: Option<Rc<dyn Fn(Position)>>,
	pub on_node_tap: Option<Rc<dyn Fn(String)>>,
	pub on_edge_tap: Option<Rc<dyn Fn(String)>>,
	pub on_node_double_tap: Option<Rc<dyn Fn(String)>>,
	pub on_edge_double_tap: Option<Rc<dyn Fn(String)>>,
	pub on_node_context: Option<Rc<dyn Fn(String, Position)>>,
	pub on_edge_create: Option<Rc<dyn Fn(String, String)>>,
	pub on_element_delete: Option<Rc<dyn Fn(String)>>,
}

/// A domain action derived from one engine event.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
	CanvasTap(Position),
	NodeTap(String),
	EdgeTap(String),
	SelectNode(Option<String>),
	SelectEdge(Option<String>),
	NodeDoubleTap(String),
	EdgeDoubleTap(String),
	NodeContext(String, Position),
	CreateEdge { source: String, target: String },
	UpdatePosition(String, Position),
	DeleteElement(String),
	/// Re-read the whole element list from the engine.
	ReadBack,
}

impl GraphCallbacks {
	pub fn dispatch<E: Engine>(&self, intent: Intent, engine: &Weak<RefCell<E>>) {
		match intent {
			Intent::CanvasTap(p) => call(&self.on_canvas_tap, |f| f(p)),
			Intent::NodeTap(id) => call(&self.on_node_tap, |f| f(id)),
			Intent::EdgeTap(id) => call(&self.on_edge_tap, |f| f(id)),
			Intent::SelectNode(id) => call(&self.on_node_select, |f| f(id)),
			Intent::SelectEdge(id) => call(&self.on_edge_select, |f| f(id)),
			Intent::NodeDoubleTap(id) => call(&self.on_node_double_tap, |f| f(id)),
			Intent::EdgeDoubleTap(id) => call(&self.on_edge_double_tap, |f| f(id)),
			Intent::NodeContext(id, p) => call(&self.on_node_context, |f| f(id, p)),
			Intent::CreateEdge { source, target } => call(&self.on_edge_create, |f| f(source, target)),
			Intent::UpdatePosition(id, p) => call(&self.update_node_position, |f| f(id, p)),
			Intent::DeleteElement(id) => call(&self.on_element_delete, |f| f(id)),
			Intent::ReadBack => {
				let Some(engine) = engine.upgrade() else {
					return;
				};
				let elements = engine.borrow().snapshot();
				call(&self.on_graph_update, |f| f(elements));
			}
		}
	}
}

fn call<F: ?Sized>(handler: &Option<Rc<F>>, invoke: impl FnOnce(&F)) {
	if let Some(handler) = handler {
		invoke(handler);
	}
}

/// Ephemeral source node captured on pointer-down, cleared on pointer-up.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeCreationGesture {
	source: Option<String>,
}

impl EdgeCreationGesture {
	pub fn source(&self) -> Option<&str> {
		self.source.as_deref()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cursor {
	Default,
	Crosshair,
	Copy,
	Grab,
	Move,
}

impl Cursor {
	pub fn as_str(self) -> &'static str {
		match self {
			Cursor::Default => "default",
			Cursor::Crosshair => "crosshair",
			Cursor::Copy => "copy",
			Cursor::Grab => "grab",
			Cursor::Move => "move",
		}
	}
}

pub fn cursor_for(tool: ToolMode, edit_mode: bool) -> Cursor {
	if !edit_mode {
		return Cursor::Default;
	}
	match tool {
		ToolMode::Select => Cursor::Default,
		ToolMode::Drag => Cursor::Move,
		ToolMode::Pan => Cursor::Grab,
		ToolMode::Edge => Cursor::Copy,
		ToolMode::Delete => Cursor::Crosshair,
	}
}

pub fn grab_policy(tool: ToolMode, edit_mode: bool) -> GrabPolicy {
	GrabPolicy {
		nodes_grabbable: tool == ToolMode::Drag || !edit_mode,
		auto_ungrabify: edit_mode && tool != ToolMode::Drag,
	}
}

#[derive(Clone, Debug, Default)]
pub struct InteractionMachine {
	tool: ToolMode,
	edit_mode: bool,
	gesture: EdgeCreationGesture,
}

impl InteractionMachine {
	pub fn new(tool: ToolMode, edit_mode: bool) -> Self {
		Self {
			tool,
			edit_mode,
			gesture: EdgeCreationGesture::default(),
		}
	}

	pub fn set_mode(&mut self, tool: ToolMode, edit_mode: bool) {
		self.tool = tool;
		self.edit_mode = edit_mode;
	}

	pub fn tool(&self) -> ToolMode {
		self.tool
	}

	pub fn edit_mode(&self) -> bool {
		self.edit_mode
	}

	pub fn gesture(&self) -> &EdgeCreationGesture {
		&self.gesture
	}

	fn deleting(&self) -> bool {
		self.edit_mode && self.tool == ToolMode::Delete
	}

	pub fn interpret(&mut self, event: &EngineEvent) -> Vec<Intent> {
		match event {
			EngineEvent::Tap { target, position } => match target {
				Target::Background => vec![
					Intent::CanvasTap(*position),
					Intent::SelectNode(None),
					Intent::SelectEdge(None),
				],
				Target::Node(id) => {
					let mut intents = vec![Intent::NodeTap(id.clone()), Intent::SelectNode(Some(id.clone()))];
					if self.deleting() {
						intents.push(Intent::DeleteElement(id.clone()));
					}
					intents
				}
				Target::Edge(id) => {
					let mut intents = vec![Intent::EdgeTap(id.clone()), Intent::SelectEdge(Some(id.clone()))];
					if self.deleting() {
						intents.push(Intent::DeleteElement(id.clone()));
					}
					intents
				}
			},
			EngineEvent::DoubleTap { target, .. } => match target {
				Target::Node(id) => vec![Intent::NodeDoubleTap(id.clone())],
				Target::Edge(id) => vec![Intent::EdgeDoubleTap(id.clone())],
				Target::Background => Vec::new(),
			},
			EngineEvent::Context {
				target: Target::Node(id),
				position,
			} => vec![Intent::NodeContext(id.clone(), *position)],
			EngineEvent::PointerDown {
				target: Target::Node(id),
				..
			} => {
				self.gesture.source = Some(id.clone());
				Vec::new()
			}
			EngineEvent::PointerUp { target, .. } => {
				let source = self.gesture.source.take();
				match (source, target) {
					(Some(source), Target::Node(id)) if source != *id => vec![Intent::CreateEdge {
						source,
						target: id.clone(),
					}],
					_ => Vec::new(),
				}
			}
			EngineEvent::DragFree { id, position } => {
				let mut intents = Vec::new();
				if self.tool == ToolMode::Drag || !self.edit_mode {
					intents.push(Intent::UpdatePosition(id.clone(), *position));
				}
				intents.push(Intent::ReadBack);
				intents
			}
			_ => Vec::new(),
		}
	}
}

const INTERACTION_EVENTS: [EventKind; 6] = [
	EventKind::Tap,
	EventKind::DoubleTap,
	EventKind::Context,
	EventKind::PointerDown,
	EventKind::PointerUp,
	EventKind::DragFree,
];

/// Replaces the whole interaction subscription set on the engine and applies
/// the grab policy for the machine's current mode. Call once per change of
/// tool, edit mode or callbacks.
pub fn rebuild_subscriptions<E: Engine + 'static>(
	handle: &EngineHandle<E>,
	machine: &Rc<RefCell<InteractionMachine>>,
	callbacks: &Rc<GraphCallbacks>,
) {
	let (tool, edit_mode) = {
		let m = machine.borrow();
		(m.tool(), m.edit_mode())
	};
	let mut engine = handle.borrow_mut();
	engine.unsubscribe(ListenerGroup::Interaction);
	engine.set_grab_policy(grab_policy(tool, edit_mode));

	for kind in INTERACTION_EVENTS {
		let machine = machine.clone();
		let callbacks = callbacks.clone();
		let weak = Rc::downgrade(handle);
		engine.subscribe(
			ListenerGroup::Interaction,
			kind,
			Rc::new(move |event: &EngineEvent| {
				let intents = machine.borrow_mut().interpret(event);
				for intent in intents {
					callbacks.dispatch(intent, &weak);
				}
			}),
		);
	}
}
