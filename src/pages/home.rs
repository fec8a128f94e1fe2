use std::rc::Rc;

use leptos::prelude::*;
use log::info;

use crate::components::graph_view::metrics::{DegreeTracker, degree_histogram, metric_values};
use crate::components::graph_view::{
	ExportOptions, GraphCallbacks, GraphControls, GraphEdge, GraphElement, GraphNode, GraphView,
	LayoutOptions, LayoutStrategy, Position, ToolMode, ViewportConfig,
};

const PALETTE: [&str; 5] = ["#4f7cac", "#3fa796", "#c9753d", "#8e6fb5", "#c0504d"];

/// Sample graph data: a random tree, no positions yet.
fn sample_elements(n: usize) -> Vec<GraphElement> {
	let mut elements: Vec<GraphElement> = (0..n)
		.map(|i| {
			GraphNode::new(format!("n{i}"), format!("Node {i}"))
				.with_color(PALETTE[i % PALETTE.len()])
				.into()
		})
		.collect();
	for i in 1..n {
		let target = (rand_simple(i) * (i as f64)) as usize;
		elements.push(GraphEdge::new(format!("e{i}"), format!("n{i}"), format!("n{target}")).into());
	}
	elements
}

/// Simple pseudo-random number generator (deterministic for consistency).
fn rand_simple(seed: usize) -> f64 {
	let x = ((seed + 1) * 9301 + 49297) % 233280;
	(x as f64) / 233280.0
}

fn unused_id(elements: &[GraphElement], prefix: &str) -> String {
	(elements.len()..)
		.map(|i| format!("{prefix}{i}"))
		.find(|id| elements.iter().all(|e| e.id() != id))
		.unwrap_or_else(|| format!("{prefix}x"))
}

fn set_position(elements: &mut [GraphElement], id: &str, position: Position) {
	for element in elements.iter_mut() {
		if let GraphElement::Node(node) = element {
			if node.id == id {
				node.position = Some(position);
			}
		}
	}
}

fn add_node(elements: &mut Vec<GraphElement>, position: Position) {
	let id = unused_id(elements, "n");
	let node = GraphNode::new(id.clone(), format!("Node {}", &id[1..]));
	elements.push(node.at(position.x, position.y).into());
}

/// Adds `source -> target` unless that edge already exists.
fn add_edge(elements: &mut Vec<GraphElement>, source: &str, target: &str) -> bool {
	let exists = elements
		.iter()
		.filter_map(GraphElement::as_edge)
		.any(|e| e.source == source && e.target == target);
	if exists {
		return false;
	}
	let id = unused_id(elements, "e");
	elements.push(GraphEdge::new(id, source, target).into());
	true
}

/// Removes the element; removing a node also removes its incident edges.
fn remove_element(elements: &mut Vec<GraphElement>, id: &str) {
	elements.retain(|e| match e {
		GraphElement::Node(node) => node.id != id,
		GraphElement::Edge(edge) => edge.id != id && edge.source != id && edge.target != id,
	});
}

fn save_positions(elements: &mut Vec<GraphElement>) {
	for element in elements.iter_mut() {
		if let GraphElement::Node(node) = element {
			node.saved_position = node.position;
		}
	}
}

/// Demo page: owns the element list and the tool state.
#[component]
pub fn Home() -> impl IntoView {
	let elements = RwSignal::new(sample_elements(24));
	let tool = RwSignal::new(ToolMode::Select);
	let edit_mode = RwSignal::new(false);
	let overlay_active = RwSignal::new(true);
	let selected_node = RwSignal::new(None::<String>);
	let selected_edge = RwSignal::new(None::<String>);
	let export_url = RwSignal::new(None::<String>);
	let controls: GraphControls = GraphControls::new();

	let tracker = StoredValue::new(DegreeTracker::new());
	let degrees = Memo::new(move |_| {
		elements.with(|els| {
			tracker.update_value(|t| {
				t.update(els);
			})
		});
		tracker.with_value(|t| t.degrees().clone())
	});
	let metric = Signal::derive(move || metric_values(&degrees.get()));
	let histogram = Memo::new(move |_| degree_histogram(&degrees.get()));

	let callbacks = GraphCallbacks {
		on_graph_update: Some(Rc::new(move |next: Vec<GraphElement>| elements.set(next))),
		on_node_select: Some(Rc::new(move |id: Option<String>| selected_node.set(id))),
		on_edge_select: Some(Rc::new(move |id: Option<String>| selected_edge.set(id))),
		update_node_position: Some(Rc::new(move |id: String, p: Position| {
			elements.update(|els| set_position(els, &id, p))
		})),
		on_canvas_tap: Some(Rc::new(move |p: Position| {
			if edit_mode.get_untracked() && tool.get_untracked() == ToolMode::Select {
				elements.update(|els| add_node(els, p));
			}
		})),
		on_node_double_tap: Some(Rc::new(|id: String| info!("node `{id}` double-tapped"))),
		on_edge_double_tap: Some(Rc::new(|id: String| info!("edge `{id}` double-tapped"))),
		on_node_context: Some(Rc::new(|id: String, p: Position| {
			info!("context menu for `{id}` at ({:.0}, {:.0})", p.x, p.y)
		})),
		on_edge_create: Some(Rc::new(move |source: String, target: String| {
			if edit_mode.get_untracked() && tool.get_untracked() == ToolMode::Edge {
				elements.update(|els| {
					add_edge(els, &source, &target);
				});
			}
		})),
		on_element_delete: Some(Rc::new(move |id: String| {
			elements.update(|els| remove_element(els, &id))
		})),
		..GraphCallbacks::default()
	};

	// Error boundary children must be `Send`.
	let callbacks = StoredValue::new_local(callbacks);
	let controls = StoredValue::new_local(controls);

	let layouts = [
		LayoutOptions::default().strategy,
		LayoutStrategy::Circle,
		LayoutStrategy::Grid,
		LayoutStrategy::Preset,
	];
	let layout_buttons = layouts
		.into_iter()
		.map(|strategy| {
			view! {
				<button on:click=move |_| {
					controls.with_value(|c| c.run_layout(LayoutOptions::with_strategy(strategy)))
				}>{strategy.name()}</button>
			}
		})
		.collect_view();

	view! {
		<ErrorBoundary fallback=|errors| {
			view! {
				<h1>"Uh oh! Something went wrong!"</h1>

				<p>"Errors: "</p>
				<ul>
					{move || {
						errors
							.get()
							.into_iter()
							.map(|(_, e)| view! { <li>{e.to_string()}</li> })
							.collect_view()
					}}
				</ul>
			}
		}>

			<div class="graph-page">
				<aside class="graph-toolbar">
					<fieldset>
						<legend>"Tool"</legend>
						{ToolMode::ALL
							.into_iter()
							.map(|mode| {
								view! {
									<button
										class:active=move || tool.get() == mode
										on:click=move |_| tool.set(mode)
									>
										{mode.as_str()}
									</button>
								}
							})
							.collect_view()}
						<label>
							<input
								type="checkbox"
								prop:checked=move || edit_mode.get()
								on:change=move |ev| edit_mode.set(event_target_checked(&ev))
							/>
							"Edit mode"
						</label>
					</fieldset>

					<fieldset>
						<legend>"Layout"</legend>
						{layout_buttons}
						<button on:click=move |_| elements.update(save_positions)>"Save positions"</button>
					</fieldset>

					<fieldset>
						<legend>"View"</legend>
						<button on:click=move |_| {
							controls.with_value(|c| c.zoom_in(&ViewportConfig::default()))
						}>"+"</button>
						<button on:click=move |_| {
							controls.with_value(|c| c.zoom_out(&ViewportConfig::default()))
						}>"-"</button>
						<button on:click=move |_| {
							controls.with_value(|c| c.fit(30.0, &ViewportConfig::default()))
						}>"Fit"</button>
						<button on:click=move |_| controls.with_value(|c| c.center())>"Center"</button>
						<button on:click=move |_| {
							let url = controls.with_value(|c| c.export_png(&ExportOptions::default()));
							export_url.set(url)
						}>"Export PNG"</button>
						{move || {
							export_url
								.get()
								.map(|url| view! { <a href=url download="graph.png">"Download"</a> })
						}}
					</fieldset>

					<fieldset>
						<legend>"Degree"</legend>
						<label>
							<input
								type="checkbox"
								prop:checked=move || overlay_active.get()
								on:change=move |ev| overlay_active.set(event_target_checked(&ev))
							/>
							"Show halos"
						</label>
						<ul class="degree-histogram">
							{move || {
								histogram
									.get()
									.into_iter()
									.enumerate()
									.map(|(degree, count)| view! { <li>{format!("{degree}: {count}")}</li> })
									.collect_view()
							}}
						</ul>
					</fieldset>

					<p class="selection">
						{move || {
							selected_node
								.get()
								.map(|id| format!("Node {id} selected"))
								.or_else(|| selected_edge.get().map(|id| format!("Edge {id} selected")))
								.unwrap_or_else(|| String::from("Nothing selected"))
						}}
					</p>
				</aside>

				<main class="graph-stage">
					<GraphView
						elements=elements
						tool=tool
						edit_mode=edit_mode
						metric=metric
						overlay_active=overlay_active
						callbacks=callbacks.get_value()
						controls=controls.get_value()
						initial_layout=LayoutOptions::default()
					/>
				</main>
			</div>
		</ErrorBoundary>
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn removing_a_node_takes_its_edges() {
		let mut elements = sample_elements(4);
		let before = elements.len();
		remove_element(&mut elements, "n0");
		assert!(elements.iter().all(|e| match e {
			GraphElement::Node(n) => n.id != "n0",
			GraphElement::Edge(edge) => edge.source != "n0" && edge.target != "n0",
		}));
		assert!(elements.len() < before);
	}

	#[test]
	fn duplicate_edges_are_not_added() {
		let mut elements = sample_elements(3);
		assert!(add_edge(&mut elements, "n0", "n2"));
		assert!(!add_edge(&mut elements, "n0", "n2"));
	}

	#[test]
	fn new_nodes_get_fresh_ids() {
		let mut elements = sample_elements(3);
		add_node(&mut elements, Position::new(5.0, 5.0));
		add_node(&mut elements, Position::new(6.0, 5.0));
		let mut ids: Vec<&str> = elements.iter().map(GraphElement::id).collect();
		let total = ids.len();
		ids.sort();
		ids.dedup();
		assert_eq!(ids.len(), total);
	}
}
