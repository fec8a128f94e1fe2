use std::fmt;
use std::str::FromStr;

use super::error::GraphViewError;

/// A point in model (graph) coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
	pub x: f64,
	pub y: f64,
}

impl Position {
	pub const fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
	pub id: String,
	pub label: String,
	pub color: String,
	/// Authoritative when present; the engine picks a placement otherwise.
	pub position: Option<Position>,
	/// Restored by the `preset` layout.
	pub saved_position: Option<Position>,
}

impl GraphNode {
	pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			label: label.into(),
			color: String::from("#4f7cac"),
			position: None,
			saved_position: None,
		}
	}

	pub fn at(mut self, x: f64, y: f64) -> Self {
		self.position = Some(Position::new(x, y));
		self
	}

	pub fn saved_at(mut self, x: f64, y: f64) -> Self {
		self.saved_position = Some(Position::new(x, y));
		self
	}

	pub fn with_color(mut self, color: impl Into<String>) -> Self {
		self.color = color.into();
		self
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphEdge {
	pub id: String,
	pub source: String,
	pub target: String,
	pub label: String,
	pub color: String,
}

impl GraphEdge {
	pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			source: source.into(),
			target: target.into(),
			label: String::new(),
			color: String::from("#9aa5b1"),
		}
	}

	pub fn with_label(mut self, label: impl Into<String>) -> Self {
		self.label = label.into();
		self
	}
}

/// One entry of the declarative element list.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphElement {
	Node(GraphNode),
	Edge(GraphEdge),
}

impl GraphElement {
	pub fn id(&self) -> &str {
		match self {
			GraphElement::Node(node) => &node.id,
			GraphElement::Edge(edge) => &edge.id,
		}
	}

	pub fn label(&self) -> &str {
		match self {
			GraphElement::Node(node) => &node.label,
			GraphElement::Edge(edge) => &edge.label,
		}
	}

	pub fn color(&self) -> &str {
		match self {
			GraphElement::Node(node) => &node.color,
			GraphElement::Edge(edge) => &edge.color,
		}
	}

	pub fn saved_position(&self) -> Option<Position> {
		self.as_node().and_then(|node| node.saved_position)
	}

	pub fn is_node(&self) -> bool {
		matches!(self, GraphElement::Node(_))
	}

	pub fn as_node(&self) -> Option<&GraphNode> {
		match self {
			GraphElement::Node(node) => Some(node),
			GraphElement::Edge(_) => None,
		}
	}

	pub fn as_edge(&self) -> Option<&GraphEdge> {
		match self {
			GraphElement::Edge(edge) => Some(edge),
			GraphElement::Node(_) => None,
		}
	}
}

impl From<GraphNode> for GraphElement {
	fn from(node: GraphNode) -> Self {
		GraphElement::Node(node)
	}
}

impl From<GraphEdge> for GraphElement {
	fn from(edge: GraphEdge) -> Self {
		GraphElement::Edge(edge)
	}
}

/// The active interaction tool. Exactly one is active at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ToolMode {
	#[default]
	Select,
	Drag,
	Pan,
	Edge,
	Delete,
}

impl ToolMode {
	pub const ALL: [ToolMode; 5] = [
		ToolMode::Select,
		ToolMode::Drag,
		ToolMode::Pan,
		ToolMode::Edge,
		ToolMode::Delete,
	];

	pub fn as_str(self) -> &'static str {
		match self {
			ToolMode::Select => "select",
			ToolMode::Drag => "drag",
			ToolMode::Pan => "pan",
			ToolMode::Edge => "edge",
			ToolMode::Delete => "delete",
		}
	}
}

impl fmt::Display for ToolMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ToolMode {
	type Err = GraphViewError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		ToolMode::ALL
			.into_iter()
			.find(|tool| tool.as_str() == s)
			.ok_or_else(|| GraphViewError::UnknownTool(s.to_string()))
	}
}

/// Per-node numeric values consumed by the metric overlay.
pub type MetricValues = std::collections::HashMap<String, f64>;
