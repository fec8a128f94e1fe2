mod adapter;
mod component;
mod engine;
mod error;
mod interaction;
mod layout;
pub mod metrics;
mod overlay;
mod reconcile;
mod render;
pub mod scale;
mod scene;
mod task;
mod types;
mod viewport;

pub use adapter::{EngineAdapter, EngineBackend};
pub use component::GraphView;
pub use engine::{Engine, EngineEvent, EngineHandle, ExportOptions, Target, dispatch};
pub use error::GraphViewError;
pub use interaction::{
	Cursor, GraphCallbacks, InteractionMachine, cursor_for, rebuild_subscriptions,
};
pub use layout::{LayoutOptions, LayoutOrchestrator, LayoutOutcome, LayoutStrategy};
pub use overlay::{MetricOverlay, OverlayConfig};
pub use reconcile::{ReconcileReport, reconcile};
pub use scene::{EngineConfig, GraphStyle, MountTarget, Scene};
pub use types::{GraphEdge, GraphElement, GraphNode, MetricValues, Position, ToolMode};
pub use viewport::{GraphControls, Viewport, ViewportConfig};
