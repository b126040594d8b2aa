mod document;
mod edge;
mod node;

pub use document::{DocumentId, GraphContent, GraphDocument};
pub use edge::{Edge, EdgeId};
pub(crate) use node::tagged_data;
pub use node::{AudioData, BuiltinType, CodeData, ImageData, MediaRef, Node, NodeData, NodeId, NodeType, Position, TextData, VideoData};
