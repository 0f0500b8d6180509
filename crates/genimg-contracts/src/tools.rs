use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const GENERATE_IMAGE: &str = "generate_image";
pub const TRANSFORM_IMAGE: &str = "transform_image";
pub const TRANSFORM_IMAGE_FROM_ENCODED: &str = "transform_image_from_encoded";
pub const TRANSFORM_IMAGE_FROM_FILE: &str = "transform_image_from_file";
pub const LIST_GENERATED_IMAGES: &str = "list_generated_images";

pub const LIST_LIMIT_MIN: u32 = 10;
pub const LIST_LIMIT_MAX: u32 = 100;

/// One line of the `serve` protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub id: Value,
    pub tool: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolReply {
    #[serde(default)]
    pub id: Value,
    pub tool: String,
    pub content: Value,
    pub is_error: bool,
}

impl ToolReply {
    pub fn text(tool: &str, text: impl Into<String>) -> Self {
        Self {
            id: Value::Null,
            tool: tool.to_string(),
            content: Value::String(text.into()),
            is_error: false,
        }
    }

    pub fn list(tool: &str, items: Vec<String>) -> Self {
        Self {
            id: Value::Null,
            tool: tool.to_string(),
            content: Value::Array(items.into_iter().map(Value::String).collect()),
            is_error: false,
        }
    }

    pub fn error(tool: &str, message: impl Into<String>) -> Self {
        Self {
            id: Value::Null,
            tool: tool.to_string(),
            content: Value::String(message.into()),
            is_error: true,
        }
    }

    pub fn with_id(mut self, id: Value) -> Self {
        self.id = id;
        self
    }

    /// Content as a single string; list replies are joined by newlines.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateImageArgs {
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformImageArgs {
    #[serde(alias = "image_ref", alias = "image_file_path", alias = "encoded_image")]
    pub image: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListImagesArgs {
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: &'static [&'static str],
}

pub const TOOL_CATALOG: &[ToolSpec] = &[
    ToolSpec {
        name: GENERATE_IMAGE,
        description: "Generate an image from a text prompt; returns a URL or a file path.",
        arguments: &["prompt"],
    },
    ToolSpec {
        name: TRANSFORM_IMAGE,
        description: "Edit an image (file path or data:image/...;base64 URL) according to a prompt.",
        arguments: &["image", "prompt"],
    },
    ToolSpec {
        name: TRANSFORM_IMAGE_FROM_ENCODED,
        description: "Edit a base64 data-URL image according to a prompt.",
        arguments: &["encoded_image", "prompt"],
    },
    ToolSpec {
        name: TRANSFORM_IMAGE_FROM_FILE,
        description: "Edit an image file according to a prompt.",
        arguments: &["image_file_path", "prompt"],
    },
    ToolSpec {
        name: LIST_GENERATED_IMAGES,
        description: "List images in the local output directory; limit must be within 10..=100.",
        arguments: &["limit"],
    },
];
