use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphViewError {
	#[error("mount target for the {0} is not available")]
	MountUnavailable(&'static str),
	#[error("could not acquire a 2d drawing surface: {0}")]
	Surface(String),
	#[error("element `{0}` already exists")]
	DuplicateId(String),
	#[error("edge `{edge}` references missing node `{node}`")]
	DanglingEdge { edge: String, node: String },
	#[error("element `{0}` does not exist")]
	UnknownElement(String),
	#[error("unknown layout strategy `{0}`")]
	UnknownLayout(String),
	#[error("unknown tool mode `{0}`")]
	UnknownTool(String),
}
