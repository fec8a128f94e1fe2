use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::engine::{Engine, EngineHandle, ExportOptions, dispatch};
use super::layout::LayoutOptions;
use super::scene::Scene;
use super::types::Position;

/// Discrete zoom steps used by the host-UI zoom buttons.
pub const ZOOM_IN_STEP: f64 = 1.2;
pub const ZOOM_OUT_STEP: f64 = 0.8;

/// Pan offset in CSS pixels and zoom scalar. Owned by the engine; every other
/// component only reads it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
	pub pan: Position,
	pub zoom: f64,
}

impl Default for Viewport {
	fn default() -> Self {
		Self {
			pan: Position::default(),
			zoom: 1.0,
		}
	}
}

impl Viewport {
	pub fn model_to_screen(&self, p: Position) -> Position {
		Position::new(p.x * self.zoom + self.pan.x, p.y * self.zoom + self.pan.y)
	}

	pub fn screen_to_model(&self, p: Position) -> Position {
		Position::new((p.x - self.pan.x) / self.zoom, (p.y - self.pan.y) / self.zoom)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportConfig {
	pub min_zoom: f64,
	pub max_zoom: f64,
	pub initial: Viewport,
}

impl Default for ViewportConfig {
	fn default() -> Self {
		Self {
			min_zoom: 0.1,
			max_zoom: 10.0,
			initial: Viewport::default(),
		}
	}
}

impl ViewportConfig {
	pub fn clamp_zoom(&self, zoom: f64) -> f64 {
		zoom.clamp(self.min_zoom, self.max_zoom)
	}
}

/// Axis-aligned bounding box in model coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
	pub min_x: f64,
	pub min_y: f64,
	pub max_x: f64,
	pub max_y: f64,
}

impl Extent {
	pub fn from_points(points: impl IntoIterator<Item = Position>) -> Option<Self> {
		points.into_iter().fold(None, |acc, p| {
			Some(match acc {
				None => Extent {
					min_x: p.x,
					min_y: p.y,
					max_x: p.x,
					max_y: p.y,
				},
				Some(e) => Extent {
					min_x: e.min_x.min(p.x),
					min_y: e.min_y.min(p.y),
					max_x: e.max_x.max(p.x),
					max_y: e.max_y.max(p.y),
				},
			})
		})
	}

	pub fn grow(self, by: f64) -> Self {
		Extent {
			min_x: self.min_x - by,
			min_y: self.min_y - by,
			max_x: self.max_x + by,
			max_y: self.max_y + by,
		}
	}

	pub fn width(&self) -> f64 {
		self.max_x - self.min_x
	}

	pub fn height(&self) -> f64 {
		self.max_y - self.min_y
	}

	pub fn center(&self) -> Position {
		Position::new(
			(self.min_x + self.max_x) / 2.0,
			(self.min_y + self.max_y) / 2.0,
		)
	}
}

/// Scales the zoom by `factor` while keeping the model point under `anchor`
/// (screen space) fixed.
pub fn zoom_about(
	viewport: Viewport,
	factor: f64,
	anchor: Position,
	config: &ViewportConfig,
) -> Viewport {
	let zoom = config.clamp_zoom(viewport.zoom * factor);
	let ratio = zoom / viewport.zoom;
	if (ratio - 1.0).abs() < f64::EPSILON {
		return Viewport { zoom, ..viewport };
	}
	Viewport {
		pan: Position::new(
			anchor.x - (anchor.x - viewport.pan.x) * ratio,
			anchor.y - (anchor.y - viewport.pan.y) * ratio,
		),
		zoom,
	}
}

pub fn center_on(extent: &Extent, size: (f64, f64), zoom: f64) -> Viewport {
	let c = extent.center();
	Viewport {
		pan: Position::new(size.0 / 2.0 - c.x * zoom, size.1 / 2.0 - c.y * zoom),
		zoom,
	}
}

pub fn fit_to(
	extent: &Extent,
	size: (f64, f64),
	padding: f64,
	config: &ViewportConfig,
) -> Viewport {
	let (w, h) = (extent.width(), extent.height());
	let zoom = if w <= f64::EPSILON && h <= f64::EPSILON {
		config.clamp_zoom(1.0)
	} else {
		let avail_w = (size.0 - 2.0 * padding).max(1.0);
		let avail_h = (size.1 - 2.0 * padding).max(1.0);
		let kx = if w > f64::EPSILON { avail_w / w } else { f64::INFINITY };
		let ky = if h > f64::EPSILON { avail_h / h } else { f64::INFINITY };
		config.clamp_zoom(kx.min(ky))
	};
	center_on(extent, size, zoom)
}

struct Attached<E> {
	engine: Weak<RefCell<E>>,
	run_layout: Rc<dyn Fn(LayoutOptions)>,
}

/// Host-UI operations on the mounted graph view. Every operation is a no-op
/// while no engine is attached.
pub struct GraphControls<E = Scene> {
	slot: Rc<RefCell<Option<Attached<E>>>>,
}

impl<E> Clone for GraphControls<E> {
	fn clone(&self) -> Self {
		Self {
			slot: self.slot.clone(),
		}
	}
}

impl<E> Default for GraphControls<E> {
	fn default() -> Self {
		Self {
			slot: Rc::new(RefCell::new(None)),
		}
	}
}

impl<E: Engine> GraphControls<E> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn attach(&self, engine: &EngineHandle<E>, run_layout: Rc<dyn Fn(LayoutOptions)>) {
		*self.slot.borrow_mut() = Some(Attached {
			engine: Rc::downgrade(engine),
			run_layout,
		});
	}

	pub fn detach(&self) {
		self.slot.borrow_mut().take();
	}

	pub fn is_attached(&self) -> bool {
		self.engine().is_some()
	}

	fn engine(&self) -> Option<EngineHandle<E>> {
		self.slot.borrow().as_ref().and_then(|a| a.engine.upgrade())
	}

	fn update_viewport(&self, f: impl FnOnce(&E) -> Option<Viewport>) {
		let Some(engine) = self.engine() else {
			return;
		};
		let next = f(&engine.borrow());
		if let Some(viewport) = next {
			let events = engine.borrow_mut().set_viewport(viewport);
			dispatch(&engine, events);
		}
	}

	pub fn fit(&self, padding: f64, config: &ViewportConfig) {
		self.update_viewport(|e| Some(fit_to(&e.extent()?, e.size(), padding, config)));
	}

	pub fn center(&self) {
		self.update_viewport(|e| Some(center_on(&e.extent()?, e.size(), e.viewport().zoom)));
	}

	pub fn zoom_by(&self, factor: f64, config: &ViewportConfig) {
		self.update_viewport(|e| {
			let (w, h) = e.size();
			Some(zoom_about(e.viewport(), factor, Position::new(w / 2.0, h / 2.0), config))
		});
	}

	pub fn zoom_in(&self, config: &ViewportConfig) {
		self.zoom_by(ZOOM_IN_STEP, config);
	}

	pub fn zoom_out(&self, config: &ViewportConfig) {
		self.zoom_by(ZOOM_OUT_STEP, config);
	}

	pub fn export_png(&self, options: &ExportOptions) -> Option<String> {
		self.engine()?.borrow().export_png(options)
	}

	pub fn run_layout(&self, options: LayoutOptions) {
		let run = self.slot.borrow().as_ref().map(|a| a.run_layout.clone());
		if let Some(run) = run {
			run(options);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::graph_view::adapter::EngineAdapter;
	use crate::components::graph_view::scene::{EngineConfig, MountTarget};
	use crate::components::graph_view::types::{GraphElement, GraphNode};

	fn close(a: f64, b: f64) -> bool {
		(a - b).abs() < 1e-9
	}

	#[test]
	fn zoom_about_keeps_anchor_fixed() {
		let config = ViewportConfig::default();
		let vp = Viewport {
			pan: Position::new(30.0, -10.0),
			zoom: 1.5,
		};
		let anchor = Position::new(200.0, 120.0);
		let before = vp.screen_to_model(anchor);
		let next = zoom_about(vp, ZOOM_IN_STEP, anchor, &config);
		let after = next.screen_to_model(anchor);
		assert!(close(next.zoom, 1.8));
		assert!(close(before.x, after.x) && close(before.y, after.y));
	}

	#[test]
	fn zoom_is_clamped_to_bounds() {
		let config = ViewportConfig {
			max_zoom: 2.0,
			..ViewportConfig::default()
		};
		let vp = Viewport {
			zoom: 1.9,
			..Viewport::default()
		};
		let next = zoom_about(vp, ZOOM_IN_STEP, Position::default(), &config);
		assert_eq!(next.zoom, 2.0);
	}

	#[test]
	fn fit_centers_extent_inside_padding() {
		let config = ViewportConfig::default();
		let extent = Extent {
			min_x: 0.0,
			min_y: 0.0,
			max_x: 100.0,
			max_y: 50.0,
		};
		let vp = fit_to(&extent, (240.0, 240.0), 20.0, &config);
		assert!(close(vp.zoom, 2.0));
		let center = vp.model_to_screen(extent.center());
		assert!(close(center.x, 120.0) && close(center.y, 120.0));
	}

	#[test]
	fn controls_no_op_without_engine() {
		let controls: GraphControls = GraphControls::new();
		controls.zoom_in(&ViewportConfig::default());
		controls.fit(10.0, &ViewportConfig::default());
		controls.run_layout(LayoutOptions::default());
		assert!(controls.export_png(&ExportOptions::default()).is_none());
		assert!(!controls.is_attached());
	}

	#[test]
	fn zoom_buttons_scale_about_the_viewport_midpoint() {
		let mut adapter = EngineAdapter::<Scene>::new();
		let target = MountTarget::Headless {
			width: 400.0,
			height: 300.0,
		};
		let elements = vec![GraphElement::from(GraphNode::new("a", "A").at(10.0, 10.0))];
		let handle = adapter
			.create(Some(&target), &elements, &EngineConfig::default())
			.unwrap();
		let controls: GraphControls = GraphControls::new();
		controls.attach(&handle, Rc::new(|_| {}));

		let mid = Position::new(200.0, 150.0);
		let before = handle.borrow().viewport().screen_to_model(mid);
		controls.zoom_in(&ViewportConfig::default());
		let vp = handle.borrow().viewport();
		assert!(close(vp.zoom, 1.2));
		let after = vp.screen_to_model(mid);
		assert!(close(before.x, after.x) && close(before.y, after.y));

		controls.zoom_out(&ViewportConfig::default());
		assert!(close(handle.borrow().viewport().zoom, 0.96));

		drop(handle);
		adapter.destroy();
		controls.zoom_in(&ViewportConfig::default());
		assert!(!controls.is_attached());
	}
}
