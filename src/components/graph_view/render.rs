use std::f64::consts::PI;

use log::warn;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use super::engine::{Engine, ExportOptions};
use super::error::GraphViewError;
use super::scene::{GraphStyle, Scene, Selection};
use super::types::Position;
use super::viewport::Viewport;

const EXPORT_MARGIN: f64 = 20.0;
const BACKGROUND_VAR: &str = "--graph-background";
const FALLBACK_BACKGROUND: &str = "#ffffff";

/// A canvas plus its 2d context. The backing store is kept at device-pixel
/// resolution; callers work in CSS pixels.
pub struct Surface {
	canvas: HtmlCanvasElement,
	ctx: CanvasRenderingContext2d,
}

impl Surface {
	pub fn acquire(canvas: HtmlCanvasElement) -> Result<Self, GraphViewError> {
		let ctx = context_2d(&canvas)?;
		Ok(Self { canvas, ctx })
	}

	pub fn context(&self) -> &CanvasRenderingContext2d {
		&self.ctx
	}

	/// Resizes the backing store to the parent's client box times the device
	/// pixel ratio, if it changed. Returns the CSS size.
	pub fn fit_to_container(&self) -> (f64, f64) {
		let (w, h) = self
			.canvas
			.parent_element()
			.map(|p| (p.client_width() as f64, p.client_height() as f64))
			.filter(|(w, h)| *w > 0.0 && *h > 0.0)
			.unwrap_or((800.0, 600.0));
		let dpr = device_pixel_ratio();
		let (bw, bh) = ((w * dpr).round() as u32, (h * dpr).round() as u32);
		if self.canvas.width() != bw {
			self.canvas.set_width(bw);
		}
		if self.canvas.height() != bh {
			self.canvas.set_height(bh);
		}
		(w, h)
	}

	pub fn clear(&self) {
		let _ = self.ctx.set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
		self.ctx.clear_rect(
			0.0,
			0.0,
			self.canvas.width() as f64,
			self.canvas.height() as f64,
		);
	}
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, GraphViewError> {
	canvas
		.get_context("2d")
		.map_err(|e| GraphViewError::Surface(format!("{e:?}")))?
		.ok_or_else(|| GraphViewError::Surface(String::from("2d context unsupported")))?
		.dyn_into()
		.map_err(|_| GraphViewError::Surface(String::from("not a 2d context")))
}

pub fn device_pixel_ratio() -> f64 {
	web_sys::window()
		.map(|w| w.device_pixel_ratio())
		.filter(|r| *r > 0.0)
		.unwrap_or(1.0)
}

/// Canvas transform `[a, b, c, d, e, f]` mapping model coordinates to backing
/// store pixels under the given viewport.
pub fn viewport_transform(viewport: Viewport, dpr: f64) -> [f64; 6] {
	let k = viewport.zoom * dpr;
	[k, 0.0, 0.0, k, viewport.pan.x * dpr, viewport.pan.y * dpr]
}

pub fn set_transform(ctx: &CanvasRenderingContext2d, t: [f64; 6]) {
	let _ = ctx.set_transform(t[0], t[1], t[2], t[3], t[4], t[5]);
}

/// Repaints the scene onto its surface. Headless scenes are skipped.
pub fn paint(scene: &Scene) {
	let Some(surface) = scene.surface() else {
		return;
	};
	let ctx = surface.context();
	let dpr = device_pixel_ratio();
	let (w, h) = scene.size();

	surface.clear();
	set_transform(ctx, [dpr, 0.0, 0.0, dpr, 0.0, 0.0]);
	ctx.set_fill_style_str(&scene.style().background);
	ctx.fill_rect(0.0, 0.0, w, h);

	let viewport = scene.viewport();
	set_transform(ctx, viewport_transform(viewport, dpr));
	draw_edges(scene, ctx, viewport.zoom);
	draw_nodes(scene, ctx, viewport.zoom);
}

fn draw_edges(scene: &Scene, ctx: &CanvasRenderingContext2d, k: f64) {
	let style = scene.style();
	let r = style.node_radius;
	let arrow = 7.0 / k.max(0.5);

	for edge in scene.edges() {
		let ends = (scene.position(&edge.source), scene.position(&edge.target));
		let (Some(a), Some(b)) = ends else {
			continue;
		};
		let selected = matches!(scene.selection(), Selection::Edge(id) if *id == edge.id);
		let color = if selected { &style.selection_color } else { &edge.color };
		ctx.set_stroke_style_str(color);
		ctx.set_fill_style_str(color);
		let width = if selected { style.edge_width * 2.0 } else { style.edge_width };
		ctx.set_line_width(width / k);
		if selected {
			let _ = ctx.set_line_dash(&js_sys::Array::of2(
				&JsValue::from_f64(6.0 / k),
				&JsValue::from_f64(3.0 / k),
			));
		}

		if edge.source == edge.target {
			ctx.begin_path();
			let _ = ctx.arc(a.x, a.y - r * 1.4, r * 0.8, 0.0, 2.0 * PI);
			ctx.stroke();
			let _ = ctx.set_line_dash(&js_sys::Array::new());
			draw_label(ctx, style, &edge.label, Position::new(a.x, a.y - r * 2.4), k);
			continue;
		}

		let (dx, dy) = (b.x - a.x, b.y - a.y);
		let dist = (dx * dx + dy * dy).sqrt();
		if dist < r * 2.0 {
			let _ = ctx.set_line_dash(&js_sys::Array::new());
			continue;
		}
		let (ux, uy) = (dx / dist, dy / dist);
		ctx.begin_path();
		ctx.move_to(a.x + ux * r, a.y + uy * r);
		ctx.line_to(b.x - ux * (r + arrow), b.y - uy * (r + arrow));
		ctx.stroke();
		let _ = ctx.set_line_dash(&js_sys::Array::new());

		let (tip_x, tip_y) = (b.x - ux * r, b.y - uy * r);
		let (back_x, back_y) = (tip_x - ux * arrow, tip_y - uy * arrow);
		let (px, py) = (-uy * arrow * 0.5, ux * arrow * 0.5);
		ctx.begin_path();
		ctx.move_to(tip_x, tip_y);
		ctx.line_to(back_x + px, back_y + py);
		ctx.line_to(back_x - px, back_y - py);
		ctx.close_path();
		ctx.fill();

		let mid = Position::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
		draw_label(ctx, style, &edge.label, mid, k);
	}
}

fn draw_nodes(scene: &Scene, ctx: &CanvasRenderingContext2d, k: f64) {
	let style = scene.style();
	let r = style.node_radius;

	for node in scene.nodes() {
		let Some(p) = node.position else {
			continue;
		};
		let selected = matches!(scene.selection(), Selection::Node(id) if *id == node.id);

		if selected {
			if let Ok(glow) = ctx.create_radial_gradient(p.x, p.y, r * 0.5, p.x, p.y, r * 2.2) {
				let _ = glow.add_color_stop(0.0, &style.selection_color);
				let _ = glow.add_color_stop(1.0, "rgba(255, 255, 255, 0)");
				ctx.begin_path();
				let _ = ctx.arc(p.x, p.y, r * 2.2, 0.0, 2.0 * PI);
				#[allow(deprecated)]
				ctx.set_fill_style(&glow);
				ctx.fill();
			}
		}

		ctx.begin_path();
		let _ = ctx.arc(p.x, p.y, r, 0.0, 2.0 * PI);
		ctx.set_fill_style_str(&node.color);
		ctx.fill();

		if selected {
			ctx.begin_path();
			let _ = ctx.arc(p.x, p.y, r + 2.0 / k, 0.0, 2.0 * PI);
			ctx.set_stroke_style_str(&style.selection_color);
			ctx.set_line_width(2.0 / k);
			ctx.stroke();
		}

		draw_label(ctx, style, &node.label, Position::new(p.x + r + 3.0, p.y + 3.0), k);
	}
}

fn draw_label(
	ctx: &CanvasRenderingContext2d,
	style: &GraphStyle,
	text: &str,
	at: Position,
	k: f64,
) {
	if text.is_empty() || k < 0.35 {
		return;
	}
	ctx.set_fill_style_str(&style.label_color);
	ctx.set_font(&style.label_font);
	let _ = ctx.fill_text(text, at.x, at.y);
}

/// Reads the export background from the document's computed style.
fn css_background() -> Option<String> {
	let window = web_sys::window()?;
	let root = window.document()?.document_element()?;
	let value = window
		.get_computed_style(&root)
		.ok()??
		.get_property_value(BACKGROUND_VAR)
		.ok()?;
	let value = value.trim();
	(!value.is_empty()).then(|| value.to_string())
}

/// Captures the full graph extent onto an offscreen canvas and returns a PNG
/// data URL.
pub fn export_png(scene: &Scene, options: &ExportOptions) -> Option<String> {
	let extent = scene.extent()?.grow(EXPORT_MARGIN);
	let scale = options.scale.max(0.1);
	let document = web_sys::window()?.document()?;
	let canvas: HtmlCanvasElement = document.create_element("canvas").ok()?.dyn_into().ok()?;
	canvas.set_width((extent.width() * scale).ceil().max(1.0) as u32);
	canvas.set_height((extent.height() * scale).ceil().max(1.0) as u32);
	let ctx = match context_2d(&canvas) {
		Ok(ctx) => ctx,
		Err(e) => {
			warn!("export skipped: {e}");
			return None;
		}
	};

	let background = options
		.background
		.clone()
		.or_else(css_background)
		.unwrap_or_else(|| String::from(FALLBACK_BACKGROUND));
	ctx.set_fill_style_str(&background);
	ctx.fill_rect(0.0, 0.0, canvas.width() as f64, canvas.height() as f64);

	set_transform(
		&ctx,
		[scale, 0.0, 0.0, scale, -extent.min_x * scale, -extent.min_y * scale],
	);
	draw_edges(scene, &ctx, 1.0);
	draw_nodes(scene, &ctx, 1.0);
	canvas.to_data_url_with_type("image/png").ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transform_carries_pan_and_zoom_in_device_pixels() {
		let viewport = Viewport {
			pan: Position::new(10.0, -4.0),
			zoom: 1.5,
		};
		assert_eq!(viewport_transform(viewport, 2.0), [3.0, 0.0, 0.0, 3.0, 20.0, -8.0]);
	}

	#[test]
	fn transform_agrees_with_model_to_screen() {
		let viewport = Viewport {
			pan: Position::new(33.0, 12.0),
			zoom: 0.75,
		};
		let [a, _, _, d, e, f] = viewport_transform(viewport, 1.0);
		let p = Position::new(40.0, -20.0);
		let screen = viewport.model_to_screen(p);
		assert_eq!((a * p.x + e, d * p.y + f), (screen.x, screen.y));
	}
}
