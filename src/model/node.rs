//! Graph node definitions.
//!
//! A node carries a type tag and a payload whose shape is fixed by that tag.
//! Built-in tags (text, image, audio, video, code) have typed payloads; any
//! other registered tag stores its payload as raw JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FlowError, Result};

/// node id
pub type NodeId = String;

/// Tag naming the kind of a node. Immutable once the node exists.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeType(String);

impl NodeType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The built-in kind behind this tag, if any.
    pub fn builtin(&self) -> Option<BuiltinType> {
        self.0.parse().ok()
    }
}

impl fmt::Display for NodeType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<BuiltinType> for NodeType {
    fn from(builtin: BuiltinType) -> Self {
        Self::new(builtin.as_ref())
    }
}

/// Node kinds that ship with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinType {
    Text,
    Image,
    Audio,
    Video,
    Code,
}

impl BuiltinType {
    pub fn is_media(self) -> bool {
        matches!(self, BuiltinType::Image | BuiltinType::Audio | BuiltinType::Video)
    }
}

/// Canvas coordinate. Layout only, never semantically load-bearing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(
        x: f64,
        y: f64,
    ) -> Self {
        Self {
            x,
            y,
        }
    }

    pub fn offset(
        self,
        dx: f64,
        dy: f64,
    ) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

fn durable_by_default() -> bool {
    true
}

/// Reference to uploaded media content.
///
/// A reference with `durable == false` is a local fallback (a `data:` URL)
/// produced when the upload gateway failed; it stays valid for editing and is
/// replaced once an upload retry succeeds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRef {
    pub url: String,
    pub mime_type: String,
    #[serde(default = "durable_by_default")]
    pub durable: bool,
    /// upload destination hint, kept so a retry lands in the same folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl MediaRef {
    pub fn durable(
        url: impl Into<String>,
        mime_type: impl Into<String>,
        folder: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
            durable: true,
            folder,
        }
    }

    pub fn fallback(
        url: impl Into<String>,
        mime_type: impl Into<String>,
        folder: Option<String>,
    ) -> Self {
        Self {
            url: url.into(),
            mime_type: mime_type.into(),
            durable: false,
            folder,
        }
    }

    pub fn is_retry_pending(&self) -> bool {
        !self.durable
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TextData {
    /// direct user input, used by the primitive variant
    pub text: String,
    /// prompt applied to upstream input by the transform variant
    pub instructions: String,
    /// last generated output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// when `output` was last generated, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MediaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeData {
    pub language: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Default for CodeData {
    fn default() -> Self {
        Self {
            language: "javascript".to_string(),
            code: String::new(),
            output: None,
        }
    }
}

/// Type-specific node payload, keyed by the node's type tag.
///
/// Serialized without a tag: the owning node's `type` field selects the
/// variant on deserialization (see [`NodeData::from_value`]).
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum NodeData {
    Text(TextData),
    Image(ImageData),
    Audio(AudioData),
    Video(VideoData),
    Code(CodeData),
    /// payload of a registered non-builtin type
    Custom(Value),
}

impl NodeData {
    /// Default payload for a node type. Custom types start from an empty object.
    pub fn default_for(node_type: &NodeType) -> Self {
        match node_type.builtin() {
            Some(BuiltinType::Text) => NodeData::Text(TextData::default()),
            Some(BuiltinType::Image) => NodeData::Image(ImageData::default()),
            Some(BuiltinType::Audio) => NodeData::Audio(AudioData::default()),
            Some(BuiltinType::Video) => NodeData::Video(VideoData::default()),
            Some(BuiltinType::Code) => NodeData::Code(CodeData::default()),
            None => NodeData::Custom(Value::Object(Default::default())),
        }
    }

    /// Parse a raw payload for the given type. `null` yields the default payload.
    pub fn from_value(
        node_type: &NodeType,
        value: Value,
    ) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default_for(node_type));
        }

        let invalid = |e: serde_json::Error| FlowError::InvalidData(format!("{} payload: {}", node_type, e));
        let data = match node_type.builtin() {
            Some(BuiltinType::Text) => NodeData::Text(serde_json::from_value(value).map_err(invalid)?),
            Some(BuiltinType::Image) => NodeData::Image(serde_json::from_value(value).map_err(invalid)?),
            Some(BuiltinType::Audio) => NodeData::Audio(serde_json::from_value(value).map_err(invalid)?),
            Some(BuiltinType::Video) => NodeData::Video(serde_json::from_value(value).map_err(invalid)?),
            Some(BuiltinType::Code) => NodeData::Code(serde_json::from_value(value).map_err(invalid)?),
            None => NodeData::Custom(value),
        };
        Ok(data)
    }

    /// The built-in kind this payload belongs to; `None` for custom payloads.
    pub fn kind(&self) -> Option<BuiltinType> {
        match self {
            NodeData::Text(_) => Some(BuiltinType::Text),
            NodeData::Image(_) => Some(BuiltinType::Image),
            NodeData::Audio(_) => Some(BuiltinType::Audio),
            NodeData::Video(_) => Some(BuiltinType::Video),
            NodeData::Code(_) => Some(BuiltinType::Code),
            NodeData::Custom(_) => None,
        }
    }

    /// Whether this payload variant belongs to `node_type`.
    pub fn matches(
        &self,
        node_type: &NodeType,
    ) -> bool {
        matches!(
            (node_type.builtin(), self),
            (Some(BuiltinType::Text), NodeData::Text(_))
                | (Some(BuiltinType::Image), NodeData::Image(_))
                | (Some(BuiltinType::Audio), NodeData::Audio(_))
                | (Some(BuiltinType::Video), NodeData::Video(_))
                | (Some(BuiltinType::Code), NodeData::Code(_))
                | (None, NodeData::Custom(_))
        )
    }

    pub fn media(&self) -> Option<&MediaRef> {
        match self {
            NodeData::Image(d) => d.source.as_ref(),
            NodeData::Audio(d) => d.source.as_ref(),
            NodeData::Video(d) => d.source.as_ref(),
            _ => None,
        }
    }

    pub fn is_media(&self) -> bool {
        matches!(self, NodeData::Image(_) | NodeData::Audio(_) | NodeData::Video(_))
    }

    /// Replace the media source. Returns false for non-media payloads.
    pub fn set_media(
        &mut self,
        media: MediaRef,
    ) -> bool {
        match self {
            NodeData::Image(d) => d.source = Some(media),
            NodeData::Audio(d) => d.source = Some(media),
            NodeData::Video(d) => d.source = Some(media),
            _ => return false,
        }
        true
    }

    /// The value this node hands to downstream nodes.
    pub fn output_value(&self) -> Option<String> {
        match self {
            NodeData::Text(d) => d.output.clone().or_else(|| (!d.text.is_empty()).then(|| d.text.clone())),
            NodeData::Code(d) => d.output.clone().or_else(|| (!d.code.is_empty()).then(|| d.code.clone())),
            NodeData::Custom(v) => v.get("output").and_then(Value::as_str).map(str::to_string),
            _ => self.media().map(|m| m.url.clone()),
        }
    }

    /// Store a generated output. Returns false for payloads without an output slot.
    pub fn set_output(
        &mut self,
        output: String,
        at: i64,
    ) -> bool {
        match self {
            NodeData::Text(d) => {
                d.output = Some(output);
                d.updated_at = Some(at);
            }
            NodeData::Code(d) => d.output = Some(output),
            _ => return false,
        }
        true
    }
}

/// Self-describing payload form, `{"kind": "text", "value": {...}}`, for
/// payloads stored away from their node (the mutation log).
pub(crate) mod tagged_data {
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error};
    use serde_json::Value;

    use super::{NodeData, NodeType};

    const CUSTOM: &str = "custom";

    #[derive(Serialize)]
    struct TaggedRef<'a> {
        kind: NodeType,
        value: &'a NodeData,
    }

    #[derive(Deserialize)]
    struct Tagged {
        kind: NodeType,
        #[serde(default)]
        value: Value,
    }

    fn tag(data: &NodeData) -> TaggedRef<'_> {
        TaggedRef {
            kind: data.kind().map(NodeType::from).unwrap_or_else(|| NodeType::new(CUSTOM)),
            value: data,
        }
    }

    fn untag<E: Error>(tagged: Tagged) -> Result<NodeData, E> {
        NodeData::from_value(&tagged.kind, tagged.value).map_err(E::custom)
    }

    pub(crate) fn serialize<S: Serializer>(
        data: &NodeData,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        tag(data).serialize(serializer)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeData, D::Error> {
        untag::<D::Error>(Tagged::deserialize(deserializer)?)
    }

    pub(crate) mod option {
        use super::*;

        pub(crate) fn serialize<S: Serializer>(
            data: &Option<NodeData>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            data.as_ref().map(tag).serialize(serializer)
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NodeData>, D::Error> {
            Option::<Tagged>::deserialize(deserializer)?.map(untag::<D::Error>).transpose()
        }
    }
}

/// Wire shape of a node; converted into [`Node`] once the payload is parsed
/// against the type tag.
#[derive(Deserialize)]
struct NodeMetadata {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    data: Value,
}

/// A node instance in a graph document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "NodeMetadata")]
pub struct Node {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    position: Position,
    data: NodeData,
}

impl TryFrom<NodeMetadata> for Node {
    type Error = FlowError;

    fn try_from(raw: NodeMetadata) -> Result<Self> {
        let data = NodeData::from_value(&raw.node_type, raw.data)?;
        Node::new(raw.id, raw.node_type, raw.position, data)
    }
}

impl Node {
    pub fn new(
        id: impl Into<NodeId>,
        node_type: NodeType,
        position: Position,
        data: NodeData,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FlowError::InvalidData("missing id in node".into()));
        }
        if !data.matches(&node_type) {
            return Err(FlowError::InvalidData(format!("payload does not match node type {}", node_type)));
        }
        Ok(Self {
            id,
            node_type,
            position,
            data,
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn node_type(&self) -> &NodeType {
        &self.node_type
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut NodeData {
        &mut self.data
    }

    pub(crate) fn set_position(
        &mut self,
        position: Position,
    ) {
        self.position = position;
    }

    /// Content copy under a new id. The clone owns its payload outright.
    pub(crate) fn duplicate(
        &self,
        id: NodeId,
        position: Position,
    ) -> Self {
        Self {
            id,
            node_type: self.node_type.clone(),
            position,
            data: self.data.clone(),
        }
    }
}
