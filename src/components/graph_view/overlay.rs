//! Metric halos drawn on a transparent canvas stacked above the scene,
//! kept registered to the scene's viewport transform.

use std::cell::{Cell, RefCell};
use std::f64::consts::PI;
use std::rc::{Rc, Weak};

use log::debug;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::Closure;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use super::engine::{Engine, EngineEvent, EngineHandle, EventKind, ListenerGroup};
use super::error::GraphViewError;
use super::render::{Surface, device_pixel_ratio, set_transform, viewport_transform};
use super::scale::{ColorScale, LinearScale, Rgb};
use super::scene::Scene;
use super::types::{MetricValues, Position};

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayConfig {
	/// Colours at `0`, `0.3 * max` and `max`.
	pub colors: [Rgb; 3],
	pub min_radius: f64,
	pub max_radius: f64,
	/// Opacity of the ring near the halo centre.
	pub ring_alpha: f64,
}

impl Default for OverlayConfig {
	fn default() -> Self {
		Self {
			colors: [
				Rgb::new(0x4f, 0x9d, 0xde),
				Rgb::new(0xf5, 0xc5, 0x42),
				Rgb::new(0xe4, 0x57, 0x2e),
			],
			min_radius: 14.0,
			max_radius: 48.0,
			ring_alpha: 0.45,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct Halo {
	pub id: String,
	pub center: Position,
	pub radius: f64,
	pub color: Rgb,
}

/// Radius and colour scales over `[0, max]`, both clamped.
pub struct HaloScales {
	radius: LinearScale,
	color: ColorScale,
}

impl HaloScales {
	pub fn new(max: f64, config: &OverlayConfig) -> Self {
		Self {
			radius: LinearScale::new((0.0, max), (config.min_radius, config.max_radius)),
			color: ColorScale::for_max(max, config.colors),
		}
	}

	pub fn radius(&self, value: f64) -> f64 {
		self.radius.apply(value)
	}

	pub fn color(&self, value: f64) -> Rgb {
		self.color.apply(value)
	}
}

/// One halo per node with a positive value. Nodes valued zero, or missing
/// from the map, get none.
pub fn plan_halos(
	positions: &[(String, Position)],
	values: &MetricValues,
	config: &OverlayConfig,
) -> Vec<Halo> {
	let max = values.values().copied().fold(0.0, f64::max);
	if max <= 0.0 {
		return Vec::new();
	}
	let scales = HaloScales::new(max, config);
	positions
		.iter()
		.filter_map(|(id, center)| {
			let value = values.get(id).copied().filter(|v| *v > 0.0)?;
			Some(Halo {
				id: id.clone(),
				center: *center,
				radius: scales.radius(value),
				color: scales.color(value),
			})
		})
		.collect()
}

/// Collapses redraw requests so at most one draw is pending per frame.
#[derive(Debug, Default)]
pub struct DrawThrottle {
	pending: Cell<bool>,
}

impl DrawThrottle {
	/// Returns `true` if the caller should schedule a frame.
	pub fn request(&self) -> bool {
		!self.pending.replace(true)
	}

	pub fn finish(&self) {
		self.pending.set(false);
	}

	pub fn is_pending(&self) -> bool {
		self.pending.get()
	}
}

struct OverlayState<E> {
	engine: Weak<RefCell<E>>,
	values: MetricValues,
	active: bool,
}

impl<E> OverlayState<E> {
	fn is_live(&self) -> bool {
		self.active && !self.values.is_empty()
	}
}

/// Browser animation frame bookkeeping for one overlay.
struct AnimationFrames {
	id: Cell<Option<i32>>,
	callback: RefCell<Option<Closure<dyn FnMut()>>>,
}

struct Inner<E> {
	surface: Option<Surface>,
	config: OverlayConfig,
	throttle: DrawThrottle,
	state: RefCell<OverlayState<E>>,
	/// `None` when pending redraws wait until the owner steps them.
	frames: Option<AnimationFrames>,
	draws: Cell<u64>,
}

impl<E> Inner<E> {
	fn clear(&self) {
		if let Some(surface) = &self.surface {
			surface.clear();
		}
	}

	fn cancel_frame(&self) {
		if let Some(frames) = &self.frames {
			if let (Some(id), Some(window)) = (frames.id.take(), web_sys::window()) {
				let _ = window.cancel_animation_frame(id);
			}
		}
		self.throttle.finish();
	}

	fn schedule(&self) {
		if !self.throttle.request() {
			return;
		}
		let Some(frames) = &self.frames else {
			return;
		};
		let requested = web_sys::window().and_then(|window| {
			let callback = frames.callback.borrow();
			window
				.request_animation_frame(callback.as_ref()?.as_ref().unchecked_ref())
				.ok()
		});
		match requested {
			Some(frame) => frames.id.set(Some(frame)),
			None => self.throttle.finish(),
		}
	}
}

impl<E: Engine> Inner<E> {
	fn run_frame(&self) {
		if let Some(frames) = &self.frames {
			frames.id.set(None);
		}
		self.throttle.finish();
		self.draw();
	}

	fn draw(&self) {
		self.draws.set(self.draws.get() + 1);
		let state = self.state.borrow();
		let engine = state.engine.upgrade().filter(|_| state.is_live());
		let Some(engine) = engine else {
			self.clear();
			return;
		};
		let (positions, viewport) = {
			let engine = engine.borrow();
			(engine.node_positions(), engine.viewport())
		};
		let halos = plan_halos(&positions, &state.values, &self.config);
		let Some(surface) = &self.surface else {
			return;
		};
		surface.fit_to_container();
		surface.clear();
		let ctx = surface.context();
		set_transform(ctx, viewport_transform(viewport, device_pixel_ratio()));
		for halo in &halos {
			paint_halo(ctx, halo, self.config.ring_alpha);
		}
	}
}

impl<E> Drop for Inner<E> {
	fn drop(&mut self) {
		self.cancel_frame();
	}
}

fn paint_halo(ctx: &CanvasRenderingContext2d, halo: &Halo, ring_alpha: f64) {
	let Position { x, y } = halo.center;
	let Ok(gradient) = ctx.create_radial_gradient(x, y, 0.0, x, y, halo.radius) else {
		return;
	};
	let _ = gradient.add_color_stop(0.0, &halo.color.rgba(ring_alpha * 0.6));
	let _ = gradient.add_color_stop(0.2, &halo.color.rgba(ring_alpha));
	let _ = gradient.add_color_stop(1.0, &halo.color.rgba(0.0));
	ctx.begin_path();
	let _ = ctx.arc(x, y, halo.radius, 0.0, 2.0 * PI);
	#[allow(deprecated)]
	ctx.set_fill_style(&gradient);
	ctx.fill();
}

/// The overlay canvas plus its subscription to the engine's viewport events.
pub struct MetricOverlay<E: Engine + 'static = Scene> {
	inner: Rc<Inner<E>>,
}

impl<E: Engine + 'static> MetricOverlay<E> {
	fn with_frames(
		surface: Option<Surface>,
		config: OverlayConfig,
		frames: Option<AnimationFrames>,
	) -> Self {
		let inner = Rc::new(Inner {
			surface,
			config,
			throttle: DrawThrottle::default(),
			state: RefCell::new(OverlayState {
				engine: Weak::new(),
				values: MetricValues::new(),
				active: false,
			}),
			frames,
			draws: Cell::new(0),
		});
		Self { inner }
	}

	pub fn attach(
		canvas: Option<HtmlCanvasElement>,
		config: OverlayConfig,
	) -> Result<Self, GraphViewError> {
		let canvas = canvas.ok_or(GraphViewError::MountUnavailable("metric overlay canvas"))?;
		let frames = AnimationFrames {
			id: Cell::new(None),
			callback: RefCell::new(None),
		};
		let overlay = Self::with_frames(Some(Surface::acquire(canvas)?), config, Some(frames));
		if let Some(frames) = &overlay.inner.frames {
			let weak = Rc::downgrade(&overlay.inner);
			*frames.callback.borrow_mut() = Some(Closure::new(move || {
				if let Some(inner) = weak.upgrade() {
					inner.run_frame();
				}
			}));
		}
		Ok(overlay)
	}

	/// An overlay without a canvas whose frames are stepped by hand.
	#[cfg(test)]
	fn headless(config: OverlayConfig) -> Self {
		Self::with_frames(None, config, None)
	}

	/// Runs the pending frame, if any. Returns whether one ran.
	#[cfg(test)]
	fn step(&self) -> bool {
		if !self.inner.throttle.is_pending() {
			return false;
		}
		self.inner.run_frame();
		true
	}

	/// Replaces the value map and activity flag. While live, pan, zoom and
	/// resize events schedule a redraw; otherwise the canvas is cleared and
	/// the overlay's listeners are removed.
	pub fn update(&self, handle: &EngineHandle<E>, values: MetricValues, active: bool) {
		let live = {
			let mut state = self.inner.state.borrow_mut();
			state.engine = Rc::downgrade(handle);
			state.values = values;
			state.active = active;
			state.is_live()
		};
		let mut engine = handle.borrow_mut();
		engine.unsubscribe(ListenerGroup::Overlay);
		if !live {
			drop(engine);
			self.inner.cancel_frame();
			self.inner.clear();
			debug!("metric overlay idle");
			return;
		}
		for kind in [EventKind::Pan, EventKind::Zoom, EventKind::Resize] {
			let weak = Rc::downgrade(&self.inner);
			engine.subscribe(
				ListenerGroup::Overlay,
				kind,
				Rc::new(move |_: &EngineEvent| {
					if let Some(inner) = weak.upgrade() {
						inner.schedule();
					}
				}),
			);
		}
		drop(engine);
		self.inner.schedule();
	}

	/// Schedules a redraw outside of viewport events, e.g. after nodes moved.
	pub fn refresh(&self) {
		if self.inner.state.borrow().is_live() {
			self.inner.schedule();
		}
	}

	/// Clears the canvas, cancels any pending frame and detaches from the
	/// engine if it still exists.
	pub fn detach(&self) {
		self.inner.cancel_frame();
		self.inner.clear();
		let mut state = self.inner.state.borrow_mut();
		state.active = false;
		if let Some(engine) = state.engine.upgrade() {
			if let Ok(mut engine) = engine.try_borrow_mut() {
				engine.unsubscribe(ListenerGroup::Overlay);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::graph_view::engine::dispatch;
	use crate::components::graph_view::reconcile::reconcile;
	use crate::components::graph_view::scene::EngineConfig;
	use crate::components::graph_view::types::{GraphElement, GraphNode};

	fn positions(ids: &[&str]) -> Vec<(String, Position)> {
		ids.iter()
			.enumerate()
			.map(|(i, id)| (id.to_string(), Position::new(i as f64 * 10.0, 0.0)))
			.collect()
	}

	fn values(pairs: &[(&str, f64)]) -> MetricValues {
		pairs.iter().map(|(id, v)| (id.to_string(), *v)).collect()
	}

	#[test]
	fn zero_valued_nodes_get_no_halo() {
		let halos = plan_halos(
			&positions(&["a", "b", "c", "d"]),
			&values(&[("a", 2.0), ("b", 1.0), ("c", 0.0)]),
			&OverlayConfig::default(),
		);
		let ids: Vec<&str> = halos.iter().map(|h| h.id.as_str()).collect();
		assert_eq!(ids, vec!["a", "b"]);
	}

	#[test]
	fn empty_or_all_zero_values_plan_nothing() {
		let config = OverlayConfig::default();
		assert!(plan_halos(&positions(&["a"]), &MetricValues::new(), &config).is_empty());
		assert!(plan_halos(&positions(&["a"]), &values(&[("a", 0.0)]), &config).is_empty());
	}

	#[test]
	fn radius_grows_with_value_then_clamps() {
		let config = OverlayConfig::default();
		let scales = HaloScales::new(4.0, &config);
		let radii: Vec<f64> = (1..=6).map(|v| scales.radius(v as f64)).collect();
		assert!(radii.windows(2).all(|w| w[0] <= w[1]));
		assert!(radii[0] < radii[3]);
		assert_eq!(radii[3], config.max_radius);
		assert_eq!(radii[5], config.max_radius);
		assert_eq!(scales.color(9.0), config.colors[2]);
	}

	#[test]
	fn halo_uses_node_position() {
		let halos = plan_halos(
			&positions(&["a", "b"]),
			&values(&[("b", 3.0)]),
			&OverlayConfig::default(),
		);
		assert_eq!(halos[0].center, Position::new(10.0, 0.0));
		assert_eq!(halos[0].radius, OverlayConfig::default().max_radius);
	}

	fn live_scene() -> EngineHandle<Scene> {
		let mut scene = Scene::new(EngineConfig::default(), (400.0, 300.0));
		let elements: Vec<GraphElement> = vec![
			GraphNode::new("a", "A").at(0.0, 0.0).into(),
			GraphNode::new("b", "B").at(50.0, 0.0).into(),
		];
		reconcile(&mut scene, &elements);
		Rc::new(RefCell::new(scene))
	}

	fn overlay_listeners(handle: &EngineHandle<Scene>) -> usize {
		let engine = handle.borrow();
		[EventKind::Pan, EventKind::Zoom, EventKind::Resize]
			.into_iter()
			.map(|kind| engine.listeners(kind).len())
			.sum()
	}

	#[test]
	fn listens_only_while_active_with_values() {
		let handle = live_scene();
		let overlay = MetricOverlay::<Scene>::headless(OverlayConfig::default());
		assert_eq!(overlay_listeners(&handle), 0);

		overlay.update(&handle, values(&[("a", 2.0)]), true);
		assert_eq!(overlay_listeners(&handle), 3);
		overlay.update(&handle, values(&[("a", 2.0)]), true);
		assert_eq!(overlay_listeners(&handle), 3);

		overlay.update(&handle, values(&[("a", 2.0)]), false);
		assert_eq!(overlay_listeners(&handle), 0);

		overlay.update(&handle, MetricValues::new(), true);
		assert_eq!(overlay_listeners(&handle), 0);
	}

	#[test]
	fn detach_removes_listeners_and_pending_frame() {
		let handle = live_scene();
		let overlay = MetricOverlay::<Scene>::headless(OverlayConfig::default());
		overlay.update(&handle, values(&[("b", 1.0)]), true);
		assert!(overlay.inner.throttle.is_pending());

		overlay.detach();
		assert_eq!(overlay_listeners(&handle), 0);
		assert!(!overlay.step());
		overlay.refresh();
		assert!(!overlay.step());
	}

	#[test]
	fn viewport_bursts_draw_once_per_frame() {
		let handle = live_scene();
		let overlay = MetricOverlay::<Scene>::headless(OverlayConfig::default());
		overlay.update(&handle, values(&[("a", 2.0), ("b", 1.0)]), true);
		assert!(overlay.step());
		assert_eq!(overlay.inner.draws.get(), 1);

		dispatch(
			&handle,
			vec![EngineEvent::Pan, EngineEvent::Zoom, EngineEvent::Pan, EngineEvent::Resize],
		);
		assert!(overlay.step());
		assert!(!overlay.step());
		assert_eq!(overlay.inner.draws.get(), 2);
	}

	#[test]
	fn throttle_collapses_requests_within_a_frame() {
		let throttle = DrawThrottle::default();
		assert!(throttle.request());
		assert!(!throttle.request());
		assert!(!throttle.request());
		assert!(throttle.is_pending());
		throttle.finish();
		assert!(throttle.request());
	}
}
