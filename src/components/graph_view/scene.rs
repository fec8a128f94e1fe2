use std::collections::HashMap;
use std::f64::consts::PI;

use force_graph::{EdgeData, ForceGraph, NodeData, SimulationParameters};
use indexmap::IndexMap;
use web_sys::HtmlCanvasElement;

use super::adapter::EngineBackend;
use super::engine::{
	Engine, EngineEvent, EventKind, ExportOptions, GrabPolicy, LayoutRequest, Listener,
	ListenerGroup, Mutation, Rejected, Target,
};
use super::error::GraphViewError;
use super::layout::LayoutStrategy;
use super::render::{self, Surface};
use super::task::{Completer, Cancellable, cancellable};
use super::types::{GraphElement, GraphNode, Position};
use super::viewport::{Extent, Viewport, ViewportConfig, fit_to, zoom_about};

/// Pointer travel (CSS px) below which a press/release pair counts as a tap.
pub const TAP_SLOP: f64 = 4.0;
pub const DOUBLE_TAP_MS: f64 = 300.0;
const FORCE_STEPS_PER_FRAME: u32 = 20;
const FORCE_STEP_DT: f32 = 0.016;

#[derive(Clone, Debug, PartialEq)]
pub struct GraphStyle {
	pub node_radius: f64,
	pub edge_width: f64,
	pub label_font: String,
	pub label_color: String,
	pub selection_color: String,
	pub background: String,
	/// Edge hit distance in CSS px.
	pub edge_hit_tolerance: f64,
}

impl Default for GraphStyle {
	fn default() -> Self {
		Self {
			node_radius: 12.0,
			edge_width: 1.5,
			label_font: String::from("11px sans-serif"),
			label_color: String::from("#1f2933"),
			selection_color: String::from("#f0a202"),
			background: String::from("#ffffff"),
			edge_hit_tolerance: 6.0,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineConfig {
	pub style: GraphStyle,
	pub viewport: ViewportConfig,
}

/// Where a [`Scene`] draws. Headless scenes keep full behaviour but paint
/// nothing.
pub enum MountTarget {
	Canvas(HtmlCanvasElement),
	Headless { width: f64, height: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
	Primary,
	Secondary,
}

impl PointerButton {
	pub fn from_dom(button: i16) -> Self {
		if button == 2 {
			PointerButton::Secondary
		} else {
			PointerButton::Primary
		}
	}
}

/// Renderer-local selection highlight.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Selection {
	#[default]
	None,
	Node(String),
	Edge(String),
}

struct Gesture {
	origin: Position,
	target: Target,
	moved: bool,
	grab: Option<(String, Position)>,
	pan_origin: Option<Position>,
}

struct LastTap {
	target: Target,
	time: f64,
}

enum LayoutProgress {
	Force {
		sim: ForceGraph<String, ()>,
		remaining: u32,
	},
	Targets(HashMap<String, Position>),
}

struct LayoutRun {
	progress: LayoutProgress,
	completer: Completer<()>,
	fit: bool,
	padding: f64,
}

/// The retained-mode renderer: element store, viewport, selection, hit testing
/// and pointer synthesis. Painting lives in `render`.
pub struct Scene {
	config: EngineConfig,
	elements: IndexMap<String, GraphElement>,
	viewport: Viewport,
	size: (f64, f64),
	selection: Selection,
	grab: GrabPolicy,
	listeners: Vec<(ListenerGroup, EventKind, Listener)>,
	layout: Option<LayoutRun>,
	gesture: Option<Gesture>,
	last_tap: Option<LastTap>,
	surface: Option<Surface>,
	revision: u64,
	batches: u64,
}

impl Scene {
	pub fn new(config: EngineConfig, size: (f64, f64)) -> Self {
		let viewport = config.viewport.initial;
		Self {
			config,
			elements: IndexMap::new(),
			viewport,
			size,
			selection: Selection::None,
			grab: GrabPolicy::default(),
			listeners: Vec::new(),
			layout: None,
			gesture: None,
			last_tap: None,
			surface: None,
			revision: 0,
			batches: 0,
		}
	}

	pub fn style(&self) -> &GraphStyle {
		&self.config.style
	}

	pub fn surface(&self) -> Option<&Surface> {
		self.surface.as_ref()
	}

	pub fn selection(&self) -> &Selection {
		&self.selection
	}

	/// Bumped on every visible change; the paint loop skips unchanged frames.
	pub fn revision(&self) -> u64 {
		self.revision
	}

	/// Number of non-empty mutation batches applied so far.
	pub fn batches_applied(&self) -> u64 {
		self.batches
	}

	pub fn layout_running(&self) -> bool {
		self.layout.is_some()
	}

	pub fn grab_policy(&self) -> GrabPolicy {
		self.grab
	}

	pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
		self.elements.values().filter_map(GraphElement::as_node)
	}

	pub fn edges(&self) -> impl Iterator<Item = &super::types::GraphEdge> {
		self.elements.values().filter_map(GraphElement::as_edge)
	}

	fn node_position(&self, id: &str) -> Option<Position> {
		self.elements.get(id)?.as_node()?.position
	}

	fn node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
		match self.elements.get_mut(id)? {
			GraphElement::Node(node) => Some(node),
			GraphElement::Edge(_) => None,
		}
	}

	fn nodes_grabbable(&self) -> bool {
		self.grab.nodes_grabbable && !self.grab.auto_ungrabify
	}

	/// Placement for nodes added without a position: a sunflower spiral
	/// around the model point at the centre of the view.
	fn next_placement(&self) -> Position {
		let i = self.nodes().count() as f64;
		let center = self
			.viewport
			.screen_to_model(Position::new(self.size.0 / 2.0, self.size.1 / 2.0));
		let angle = i * 2.399_963;
		let radius = self.config.style.node_radius * 2.5 * i.sqrt();
		Position::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
	}

	// === Mutations ===

	fn apply_one(&mut self, mutation: &Mutation) -> Result<(), GraphViewError> {
		match mutation {
			Mutation::Add(element) => {
				let id = element.id().to_string();
				if self.elements.contains_key(&id) {
					return Err(GraphViewError::DuplicateId(id));
				}
				let element = match element {
					GraphElement::Node(node) => {
						let mut node = node.clone();
						if node.position.is_none() {
							node.position = Some(self.next_placement());
						}
						GraphElement::Node(node)
					}
					GraphElement::Edge(edge) => {
						for end in [&edge.source, &edge.target] {
							if !self.elements.get(end).is_some_and(GraphElement::is_node) {
								return Err(GraphViewError::DanglingEdge {
									edge: id,
									node: end.clone(),
								});
							}
						}
						GraphElement::Edge(edge.clone())
					}
				};
				self.elements.insert(id, element);
			}
			Mutation::Remove(id) => {
				let Some(removed) = self.elements.shift_remove(id) else {
					return Err(GraphViewError::UnknownElement(id.clone()));
				};
				if removed.is_node() {
					self.elements.retain(|_, element| match element {
						GraphElement::Edge(edge) => edge.source != *id && edge.target != *id,
						GraphElement::Node(_) => true,
					});
				}
				let still_selected = match &self.selection {
					Selection::Node(sel) | Selection::Edge(sel) => self.elements.contains_key(sel),
					Selection::None => true,
				};
				if !still_selected {
					self.selection = Selection::None;
				}
			}
			Mutation::Patch {
				id,
				label,
				color,
				saved_position,
			} => match self.elements.get_mut(id) {
				Some(GraphElement::Node(node)) => {
					node.label.clone_from(label);
					node.color.clone_from(color);
					node.saved_position = *saved_position;
				}
				Some(GraphElement::Edge(edge)) => {
					edge.label.clone_from(label);
					edge.color.clone_from(color);
				}
				None => return Err(GraphViewError::UnknownElement(id.clone())),
			},
			Mutation::Move { id, position } => {
				let Some(node) = self.node_mut(id) else {
					return Err(GraphViewError::UnknownElement(id.clone()));
				};
				node.position = Some(*position);
			}
		}
		Ok(())
	}

	// === Hit testing ===

	pub fn node_at(&self, p: Position) -> Option<String> {
		let r = self.config.style.node_radius;
		self.nodes()
			.filter(|node| {
				node.position.is_some_and(|c| {
					let (dx, dy) = (c.x - p.x, c.y - p.y);
					dx * dx + dy * dy <= r * r
				})
			})
			.last()
			.map(|node| node.id.clone())
	}

	pub fn edge_at(&self, p: Position) -> Option<String> {
		let tolerance = self.config.style.edge_hit_tolerance / self.viewport.zoom;
		self.edges()
			.filter_map(|edge| {
				let a = self.node_position(&edge.source)?;
				let b = self.node_position(&edge.target)?;
				let d = distance_to_segment(p, a, b);
				(d <= tolerance).then(|| (d, edge.id.clone()))
			})
			.min_by(|x, y| x.0.total_cmp(&y.0))
			.map(|(_, id)| id)
	}

	pub fn target_at(&self, screen: Position) -> Target {
		let p = self.viewport.screen_to_model(screen);
		if let Some(id) = self.node_at(p) {
			Target::Node(id)
		} else if let Some(id) = self.edge_at(p) {
			Target::Edge(id)
		} else {
			Target::Background
		}
	}

	// === Pointer synthesis ===

	pub fn pointer_down(&mut self, screen: Position, button: PointerButton) -> Vec<EngineEvent> {
		let target = self.target_at(screen);
		let position = self.viewport.screen_to_model(screen);
		if button == PointerButton::Secondary {
			self.gesture = None;
			return vec![EngineEvent::Context { target, position }];
		}

		let grab = match &target {
			Target::Node(id) if self.nodes_grabbable() => {
				self.node_position(id).map(|start| (id.clone(), start))
			}
			_ => None,
		};
		let pan_origin = (target == Target::Background).then_some(self.viewport.pan);
		self.gesture = Some(Gesture {
			origin: screen,
			target: target.clone(),
			moved: false,
			grab,
			pan_origin,
		});
		vec![EngineEvent::PointerDown { target, position }]
	}

	pub fn pointer_move(&mut self, screen: Position) -> Vec<EngineEvent> {
		let Some(gesture) = self.gesture.as_mut() else {
			return Vec::new();
		};
		let (dx, dy) = (screen.x - gesture.origin.x, screen.y - gesture.origin.y);
		if !gesture.moved && (dx * dx + dy * dy).sqrt() > TAP_SLOP {
			gesture.moved = true;
		}
		if !gesture.moved {
			return Vec::new();
		}

		if let Some((id, start)) = gesture.grab.clone() {
			let k = self.viewport.zoom;
			let to = Position::new(start.x + dx / k, start.y + dy / k);
			if let Some(node) = self.node_mut(&id) {
				node.position = Some(to);
				self.revision += 1;
			}
			Vec::new()
		} else if let Some(pan) = gesture.pan_origin {
			let next = Viewport {
				pan: Position::new(pan.x + dx, pan.y + dy),
				zoom: self.viewport.zoom,
			};
			self.set_viewport(next)
		} else {
			Vec::new()
		}
	}

	pub fn pointer_up(&mut self, screen: Position, time_ms: f64) -> Vec<EngineEvent> {
		let Some(gesture) = self.gesture.take() else {
			return Vec::new();
		};
		let position = self.viewport.screen_to_model(screen);
		let mut events = vec![EngineEvent::PointerUp {
			target: self.target_at(screen),
			position,
		}];

		if gesture.moved {
			if let Some((id, _)) = gesture.grab {
				let position = self.node_position(&id).unwrap_or(position);
				events.push(EngineEvent::DragFree { id, position });
			}
			self.last_tap = None;
			return events;
		}

		let target = gesture.target;
		self.selection = match &target {
			Target::Background => Selection::None,
			Target::Node(id) => Selection::Node(id.clone()),
			Target::Edge(id) => Selection::Edge(id.clone()),
		};
		self.revision += 1;
		events.push(EngineEvent::Tap {
			target: target.clone(),
			position,
		});

		let is_double = self
			.last_tap
			.as_ref()
			.is_some_and(|last| last.target == target && time_ms - last.time <= DOUBLE_TAP_MS);
		if is_double {
			self.last_tap = None;
			events.push(EngineEvent::DoubleTap { target, position });
		} else {
			self.last_tap = Some(LastTap {
				target,
				time: time_ms,
			});
		}
		events
	}

	/// Pointer left the surface. The gesture ends as a release over the
	/// background; a node that was being dragged is released where it is.
	pub fn pointer_cancel(&mut self) -> Vec<EngineEvent> {
		let Some(gesture) = self.gesture.take() else {
			return Vec::new();
		};
		self.last_tap = None;
		let position = self.viewport.screen_to_model(gesture.origin);
		let mut events = vec![EngineEvent::PointerUp {
			target: Target::Background,
			position,
		}];
		if let Some((id, _)) = gesture.grab.filter(|_| gesture.moved) {
			if let Some(position) = self.node_position(&id) {
				events.push(EngineEvent::DragFree { id, position });
			}
		}
		events
	}

	pub fn wheel(&mut self, screen: Position, delta_y: f64) -> Vec<EngineEvent> {
		let factor = if delta_y > 0.0 { 0.9 } else { 1.1 };
		let next = zoom_about(self.viewport, factor, screen, &self.config.viewport);
		self.set_viewport(next)
	}

	pub fn resize(&mut self, width: f64, height: f64) -> Vec<EngineEvent> {
		if self.size == (width, height) {
			return Vec::new();
		}
		self.size = (width, height);
		self.revision += 1;
		vec![EngineEvent::Resize]
	}

	/// Sizes the drawing surface to its container and reports the change.
	pub fn sync_surface_size(&mut self) -> Vec<EngineEvent> {
		let Some(size) = self.surface.as_ref().map(Surface::fit_to_container) else {
			return Vec::new();
		};
		self.resize(size.0, size.1)
	}

	// === Layout ===

	/// Advances the running layout by one frame.
	pub fn tick(&mut self, _dt: f64) -> Vec<EngineEvent> {
		let Some(mut run) = self.layout.take() else {
			return Vec::new();
		};
		let finished = match &mut run.progress {
			LayoutProgress::Force { sim, remaining } => {
				let steps = FORCE_STEPS_PER_FRAME.min(*remaining);
				for _ in 0..steps {
					sim.update(FORCE_STEP_DT);
				}
				*remaining -= steps;
				let mut moved = Vec::new();
				sim.visit_nodes(|node| {
					moved.push((
						node.data.user_data.clone(),
						Position::new(node.x() as f64, node.y() as f64),
					));
				});
				for (id, position) in moved {
					if let Some(node) = self.node_mut(&id) {
						node.position = Some(position);
					}
				}
				*remaining == 0
			}
			LayoutProgress::Targets(targets) => {
				for (id, position) in targets.drain() {
					if let Some(node) = self.node_mut(&id) {
						node.position = Some(position);
					}
				}
				true
			}
		};
		self.revision += 1;

		if !finished {
			self.layout = Some(run);
			return Vec::new();
		}

		let mut events = Vec::new();
		if run.fit {
			if let Some(extent) = self.extent() {
				let next = fit_to(&extent, self.size, run.padding, &self.config.viewport);
				events.extend(self.set_viewport(next));
			}
		}
		run.completer.complete(());
		events.push(EngineEvent::LayoutStop);
		events
	}

	fn force_simulation(&self, iterations: u32) -> LayoutProgress {
		let mut sim = ForceGraph::new(SimulationParameters {
			force_charge: 150.0,
			force_spring: 0.05,
			force_max: 100.0,
			node_speed: 3000.0,
			damping_factor: 0.9,
		});
		let mut index = HashMap::new();
		for node in self.nodes() {
			let p = node.position.unwrap_or_default();
			let idx = sim.add_node(NodeData {
				x: p.x as f32,
				y: p.y as f32,
				mass: 10.0,
				is_anchor: false,
				user_data: node.id.clone(),
			});
			index.insert(node.id.as_str(), idx);
		}
		for edge in self.edges() {
			if let (Some(&src), Some(&tgt)) =
				(index.get(edge.source.as_str()), index.get(edge.target.as_str()))
			{
				sim.add_edge(src, tgt, EdgeData::default());
			}
		}
		LayoutProgress::Force {
			sim,
			remaining: iterations,
		}
	}

	fn circle_targets(&self) -> HashMap<String, Position> {
		let ids: Vec<&str> = self.nodes().map(|node| node.id.as_str()).collect();
		let n = ids.len().max(1) as f64;
		let center = self.extent().map(|e| e.center()).unwrap_or_default();
		let radius = (self.config.style.node_radius * 3.0 * n / (2.0 * PI)).max(80.0);
		ids.into_iter()
			.enumerate()
			.map(|(i, id)| {
				let angle = (i as f64) * 2.0 * PI / n;
				let p = Position::new(center.x + radius * angle.cos(), center.y + radius * angle.sin());
				(id.to_string(), p)
			})
			.collect()
	}

	fn grid_targets(&self) -> HashMap<String, Position> {
		let ids: Vec<&str> = self.nodes().map(|node| node.id.as_str()).collect();
		let cols = (ids.len() as f64).sqrt().ceil().max(1.0) as usize;
		let spacing = self.config.style.node_radius * 6.0;
		ids.into_iter()
			.enumerate()
			.map(|(i, id)| {
				let (row, col) = (i / cols, i % cols);
				(id.to_string(), Position::new(col as f64 * spacing, row as f64 * spacing))
			})
			.collect()
	}
}

fn distance_to_segment(p: Position, a: Position, b: Position) -> f64 {
	let (vx, vy) = (b.x - a.x, b.y - a.y);
	let len2 = vx * vx + vy * vy;
	let t = if len2 <= f64::EPSILON {
		0.0
	} else {
		(((p.x - a.x) * vx + (p.y - a.y) * vy) / len2).clamp(0.0, 1.0)
	};
	let (cx, cy) = (a.x + t * vx, a.y + t * vy);
	((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

impl Engine for Scene {
	fn snapshot(&self) -> Vec<GraphElement> {
		self.elements.values().cloned().collect()
	}

	fn apply(&mut self, batch: Vec<Mutation>) -> Vec<Rejected> {
		if batch.is_empty() {
			return Vec::new();
		}
		let mut rejected = Vec::new();
		for mutation in batch {
			if let Err(reason) = self.apply_one(&mutation) {
				rejected.push(Rejected { mutation, reason });
			}
		}
		self.batches += 1;
		self.revision += 1;
		rejected
	}

	fn node_count(&self) -> usize {
		self.nodes().count()
	}

	fn node_positions(&self) -> Vec<(String, Position)> {
		self.nodes()
			.filter_map(|node| Some((node.id.clone(), node.position?)))
			.collect()
	}

	fn position(&self, id: &str) -> Option<Position> {
		self.node_position(id)
	}

	fn viewport(&self) -> Viewport {
		self.viewport
	}

	fn set_viewport(&mut self, viewport: Viewport) -> Vec<EngineEvent> {
		let next = Viewport {
			pan: viewport.pan,
			zoom: self.config.viewport.clamp_zoom(viewport.zoom),
		};
		let mut events = Vec::new();
		if next.pan != self.viewport.pan {
			events.push(EngineEvent::Pan);
		}
		if next.zoom != self.viewport.zoom {
			events.push(EngineEvent::Zoom);
		}
		if !events.is_empty() {
			self.viewport = next;
			self.revision += 1;
		}
		events
	}

	fn size(&self) -> (f64, f64) {
		self.size
	}

	fn extent(&self) -> Option<Extent> {
		Extent::from_points(self.nodes().filter_map(|node| node.position))
			.map(|e| e.grow(self.config.style.node_radius))
	}

	fn subscribe(&mut self, group: ListenerGroup, kind: EventKind, listener: Listener) {
		self.listeners.push((group, kind, listener));
	}

	fn unsubscribe(&mut self, group: ListenerGroup) {
		self.listeners.retain(|(g, _, _)| *g != group);
	}

	fn listeners(&self, kind: EventKind) -> Vec<Listener> {
		self.listeners
			.iter()
			.filter(|(_, k, _)| *k == kind)
			.map(|(_, _, listener)| listener.clone())
			.collect()
	}

	fn set_grab_policy(&mut self, policy: GrabPolicy) {
		self.grab = policy;
	}

	fn start_layout(&mut self, request: LayoutRequest) -> Cancellable<()> {
		self.stop_layout();
		let (completer, completion) = cancellable();
		let progress = match request.strategy {
			LayoutStrategy::Preset => LayoutProgress::Targets(request.preset),
			LayoutStrategy::Force { iterations } => self.force_simulation(iterations),
			LayoutStrategy::Circle => LayoutProgress::Targets(self.circle_targets()),
			LayoutStrategy::Grid => LayoutProgress::Targets(self.grid_targets()),
		};
		self.layout = Some(LayoutRun {
			progress,
			completer,
			fit: request.fit,
			padding: request.padding,
		});
		completion
	}

	fn stop_layout(&mut self) {
		self.layout = None;
	}

	fn export_png(&self, options: &ExportOptions) -> Option<String> {
		self.surface.as_ref()?;
		render::export_png(self, options)
	}
}

impl EngineBackend for Scene {
	type Mount = MountTarget;

	fn mount(target: &MountTarget, config: &EngineConfig) -> Result<Self, GraphViewError> {
		match target {
			MountTarget::Headless { width, height } => Ok(Scene::new(config.clone(), (*width, *height))),
			MountTarget::Canvas(canvas) => {
				let surface = Surface::acquire(canvas.clone())?;
				let size = surface.fit_to_container();
				let mut scene = Scene::new(config.clone(), size);
				scene.surface = Some(surface);
				Ok(scene)
			}
		}
	}

	fn release(&mut self) {
		if let Some(surface) = self.surface.take() {
			surface.clear();
		}
		self.gesture = None;
	}
}
