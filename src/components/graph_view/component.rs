use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use leptos::task::spawn_local;
use log::{debug, error};
use wasm_bindgen::prelude::*;
use web_sys::{MouseEvent, WheelEvent};

use super::adapter::EngineAdapter;
use super::engine::{EngineHandle, dispatch};
use super::interaction::{GraphCallbacks, InteractionMachine, cursor_for, rebuild_subscriptions};
use super::layout::{LayoutOptions, LayoutOrchestrator};
use super::overlay::{MetricOverlay, OverlayConfig};
use super::reconcile::reconcile;
use super::render;
use super::scene::{EngineConfig, MountTarget, PointerButton, Scene};
use super::types::{GraphElement, MetricValues, Position, ToolMode};
use super::viewport::GraphControls;

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

/// Everything that lives between mount and cleanup.
struct Mounted {
	adapter: EngineAdapter<Scene>,
	handle: EngineHandle<Scene>,
	machine: Rc<RefCell<InteractionMachine>>,
	layout: Rc<RefCell<LayoutOrchestrator>>,
	overlay: Option<Rc<MetricOverlay>>,
	frame: FrameCallback,
	frame_id: Rc<Cell<Option<i32>>>,
}

type Runtime = Rc<RefCell<Option<Mounted>>>;

fn engine_of(runtime: &Runtime) -> Option<EngineHandle<Scene>> {
	runtime.borrow().as_ref().map(|m| m.handle.clone())
}

fn layout_runner(
	handle: &EngineHandle<Scene>,
	layout: &Rc<RefCell<LayoutOrchestrator>>,
	elements: Signal<Vec<GraphElement>>,
	callbacks: &GraphCallbacks,
) -> Rc<dyn Fn(LayoutOptions)> {
	let weak = Rc::downgrade(handle);
	let layout = layout.clone();
	let commit = callbacks.update_node_position.clone();
	Rc::new(move |options: LayoutOptions| {
		let Some(handle) = weak.upgrade() else {
			return;
		};
		let declared = elements.get_untracked();
		let task = layout
			.borrow_mut()
			.run(&handle, &declared, &options, commit.clone());
		if let Some(task) = task {
			spawn_local(async move {
				let outcome = task.await;
				debug!("layout `{}` finished: {outcome:?}", options.strategy);
			});
		}
	})
}

/// Starts the per-frame loop: advances layouts, follows container resizes and
/// repaints when the scene changed.
fn start_frames(
	handle: &EngineHandle<Scene>,
	overlay: Option<Rc<MetricOverlay>>,
) -> (FrameCallback, Rc<Cell<Option<i32>>>) {
	let frame: FrameCallback = Rc::new(RefCell::new(None));
	let frame_id = Rc::new(Cell::new(None));
	let weak = Rc::downgrade(handle);
	let (frame_inner, id_inner) = (frame.clone(), frame_id.clone());
	let mut painted: Option<u64> = None;

	*frame.borrow_mut() = Some(Closure::new(move || {
		let Some(handle) = weak.upgrade() else {
			return;
		};
		let events = {
			let mut scene = handle.borrow_mut();
			let mut events = scene.sync_surface_size();
			events.extend(scene.tick(1.0 / 60.0));
			events
		};
		dispatch(&handle, events);

		let revision = handle.borrow().revision();
		if painted != Some(revision) {
			render::paint(&handle.borrow());
			painted = Some(revision);
			if let Some(overlay) = &overlay {
				overlay.refresh();
			}
		}

		if let (Some(cb), Some(window)) = (frame_inner.borrow().as_ref(), web_sys::window()) {
			id_inner.set(window.request_animation_frame(cb.as_ref().unchecked_ref()).ok());
		}
	}));
	if let (Some(cb), Some(window)) = (frame.borrow().as_ref(), web_sys::window()) {
		frame_id.set(window.request_animation_frame(cb.as_ref().unchecked_ref()).ok());
	}
	(frame, frame_id)
}

fn shut_down(runtime: &Runtime, controls: Option<&GraphControls>) {
	let Some(mut mounted) = runtime.borrow_mut().take() else {
		return;
	};
	if let Some(id) = mounted.frame_id.take() {
		if let Some(window) = web_sys::window() {
			let _ = window.cancel_animation_frame(id);
		}
	}
	mounted.frame.borrow_mut().take();
	if let Some(controls) = controls {
		controls.detach();
	}
	if let Some(overlay) = &mounted.overlay {
		overlay.detach();
	}
	mounted.layout.borrow_mut().stop(&mut *mounted.handle.borrow_mut());
	mounted.adapter.destroy();
}

/// Synchronised view of a declarative element list: a scene canvas with a
/// metric overlay stacked above it.
#[component]
pub fn GraphView(
	#[prop(into)] elements: Signal<Vec<GraphElement>>,
	#[prop(into, default = Signal::stored(ToolMode::Select))] tool: Signal<ToolMode>,
	#[prop(into, default = Signal::stored(false))] edit_mode: Signal<bool>,
	#[prop(into, default = Signal::stored(MetricValues::new()))] metric: Signal<MetricValues>,
	#[prop(into, default = Signal::stored(false))] overlay_active: Signal<bool>,
	#[prop(default = GraphCallbacks::default())] callbacks: GraphCallbacks,
	#[prop(optional)] controls: Option<GraphControls>,
	#[prop(default = EngineConfig::default())] config: EngineConfig,
	#[prop(default = OverlayConfig::default())] overlay_config: OverlayConfig,
	/// Run once right after mount.
	#[prop(optional)]
	initial_layout: Option<LayoutOptions>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let overlay_ref = NodeRef::<leptos::html::Canvas>::new();
	let mounted = RwSignal::new(false);
	let runtime: Runtime = Rc::new(RefCell::new(None));
	let callbacks = Rc::new(callbacks);

	let (runtime_init, callbacks_init, controls_init) =
		(runtime.clone(), callbacks.clone(), controls.clone());
	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		if runtime_init.borrow().is_some() {
			return;
		}
		let mut adapter = EngineAdapter::<Scene>::new();
		let target = MountTarget::Canvas(canvas);
		let handle = match adapter.create(Some(&target), &elements.get_untracked(), &config) {
			Ok(handle) => handle,
			Err(e) => {
				error!("graph view not mounted: {e}");
				return;
			}
		};

		let attached =
			MetricOverlay::<Scene>::attach(overlay_ref.get_untracked(), overlay_config.clone());
		let overlay = match attached {
			Ok(overlay) => Some(Rc::new(overlay)),
			Err(e) => {
				error!("metric overlay disabled: {e}");
				None
			}
		};

		let machine = Rc::new(RefCell::new(InteractionMachine::new(
			tool.get_untracked(),
			edit_mode.get_untracked(),
		)));
		let layout = Rc::new(RefCell::new(LayoutOrchestrator::new()));
		let run_layout = layout_runner(&handle, &layout, elements, &callbacks_init);
		if let Some(controls) = &controls_init {
			controls.attach(&handle, run_layout.clone());
		}
		let (frame, frame_id) = start_frames(&handle, overlay.clone());

		*runtime_init.borrow_mut() = Some(Mounted {
			adapter,
			handle,
			machine,
			layout,
			overlay,
			frame,
			frame_id,
		});
		mounted.set(true);

		if let Some(options) = initial_layout.clone() {
			run_layout(options);
		}
	});

	let runtime_sync = runtime.clone();
	Effect::new(move |_| {
		let declared = elements.get();
		if !mounted.get() {
			return;
		}
		if let Some(handle) = engine_of(&runtime_sync) {
			reconcile(&mut *handle.borrow_mut(), &declared);
		}
	});

	let (runtime_modes, callbacks_modes) = (runtime.clone(), callbacks.clone());
	Effect::new(move |_| {
		let (tool, edit_mode) = (tool.get(), edit_mode.get());
		if !mounted.get() {
			return;
		}
		let parts = runtime_modes
			.borrow()
			.as_ref()
			.map(|m| (m.handle.clone(), m.machine.clone()));
		if let Some((handle, machine)) = parts {
			machine.borrow_mut().set_mode(tool, edit_mode);
			rebuild_subscriptions(&handle, &machine, &callbacks_modes);
		}
	});

	let runtime_overlay = runtime.clone();
	Effect::new(move |_| {
		let (values, active) = (metric.get(), overlay_active.get());
		if !mounted.get() {
			return;
		}
		let parts = runtime_overlay
			.borrow()
			.as_ref()
			.and_then(|m| Some((m.handle.clone(), m.overlay.clone()?)));
		if let Some((handle, overlay)) = parts {
			overlay.update(&handle, values, active);
		}
	});

	let teardown = StoredValue::new_local((runtime.clone(), controls));
	on_cleanup(move || {
		teardown.try_with_value(|(runtime, controls)| shut_down(runtime, controls.as_ref()));
	});

	let cursor = Memo::new(move |_| cursor_for(tool.get(), edit_mode.get()).as_str());

	let local = move |ev: &MouseEvent| -> Option<Position> {
		let canvas = canvas_ref.get_untracked()?;
		let rect = canvas.get_bounding_client_rect();
		Some(Position::new(
			ev.client_x() as f64 - rect.left(),
			ev.client_y() as f64 - rect.top(),
		))
	};

	let runtime_md = runtime.clone();
	let on_mousedown = move |ev: MouseEvent| {
		let (Some(handle), Some(at)) = (engine_of(&runtime_md), local(&ev)) else {
			return;
		};
		let events = handle
			.borrow_mut()
			.pointer_down(at, PointerButton::from_dom(ev.button()));
		dispatch(&handle, events);
	};

	let runtime_mm = runtime.clone();
	let on_mousemove = move |ev: MouseEvent| {
		let (Some(handle), Some(at)) = (engine_of(&runtime_mm), local(&ev)) else {
			return;
		};
		let events = handle.borrow_mut().pointer_move(at);
		dispatch(&handle, events);
	};

	let runtime_mu = runtime.clone();
	let on_mouseup = move |ev: MouseEvent| {
		let (Some(handle), Some(at)) = (engine_of(&runtime_mu), local(&ev)) else {
			return;
		};
		let events = handle.borrow_mut().pointer_up(at, ev.time_stamp());
		dispatch(&handle, events);
	};

	let runtime_ml = runtime.clone();
	let on_mouseleave = move |_: MouseEvent| {
		if let Some(handle) = engine_of(&runtime_ml) {
			let events = handle.borrow_mut().pointer_cancel();
			dispatch(&handle, events);
		}
	};

	let runtime_wh = runtime;
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let mouse: &MouseEvent = &ev;
		let (Some(handle), Some(at)) = (engine_of(&runtime_wh), local(mouse)) else {
			return;
		};
		let events = handle.borrow_mut().wheel(at, ev.delta_y());
		dispatch(&handle, events);
	};

	view! {
		<div class="graph-view" style="position: relative; width: 100%; height: 100%;">
			<canvas
				node_ref=canvas_ref
				class="graph-view-canvas"
				on:mousedown=on_mousedown
				on:mousemove=on_mousemove
				on:mouseup=on_mouseup
				on:mouseleave=on_mouseleave
				on:wheel=on_wheel
				on:contextmenu=|ev: MouseEvent| ev.prevent_default()
				style=move || {
					format!(
						"position: absolute; inset: 0; width: 100%; height: 100%; display: block; cursor: {};",
						cursor.get(),
					)
				}
			/>
			<canvas
				node_ref=overlay_ref
				class="graph-view-overlay"
				style="position: absolute; inset: 0; width: 100%; height: 100%; pointer-events: none;"
			/>
		</div>
	}
}
