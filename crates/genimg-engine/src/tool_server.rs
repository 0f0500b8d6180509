use anyhow::{Context, Result};
use genimg_contracts::tools::{
    GenerateImageArgs, ListImagesArgs, ToolReply, ToolRequest, TransformImageArgs, GENERATE_IMAGE,
    LIST_GENERATED_IMAGES, TRANSFORM_IMAGE, TRANSFORM_IMAGE_FROM_ENCODED, TRANSFORM_IMAGE_FROM_FILE,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::delivery::Delivered;
use crate::orchestrator::Orchestrator;

/// Tool entry point. Every failure becomes an error reply; nothing escapes.
pub struct ToolServer {
    orchestrator: Orchestrator,
}

impl ToolServer {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn handle(&self, request: ToolRequest) -> ToolReply {
        self.call(&request.tool, request.arguments)
            .with_id(request.id)
    }

    pub fn call(&self, tool: &str, arguments: Map<String, Value>) -> ToolReply {
        let outcome = match tool {
            GENERATE_IMAGE => parse_args::<GenerateImageArgs>(arguments)
                .and_then(|args| self.orchestrator.generate_image(&args.prompt))
                .map(|delivered| reply_for_delivery(tool, delivered)),
            TRANSFORM_IMAGE | TRANSFORM_IMAGE_FROM_ENCODED | TRANSFORM_IMAGE_FROM_FILE => {
                parse_args::<TransformImageArgs>(arguments)
                    .and_then(|args| self.orchestrator.transform_image(&args.image, &args.prompt))
                    .map(|delivered| reply_for_delivery(tool, delivered))
            }
            LIST_GENERATED_IMAGES => parse_args::<ListImagesArgs>(arguments)
                .and_then(|args| self.orchestrator.list_generated_images(args.limit))
                .map(|paths| ToolReply::list(tool, paths)),
            unknown => {
                tracing::warn!(tool = unknown, "unknown tool requested");
                return ToolReply::error(tool, format!("Error: unknown tool '{unknown}'"));
            }
        };

        match outcome {
            Ok(reply) => reply,
            Err(err) => {
                let message = format!("Error {}: {err:#}", operation_label(tool));
                tracing::error!(tool, error = %format!("{err:#}"), "tool call failed");
                ToolReply::error(tool, message)
            }
        }
    }
}

fn reply_for_delivery(tool: &str, delivered: Delivered) -> ToolReply {
    ToolReply::text(tool, delivered.into_reference())
}

fn parse_args<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(arguments)).context("invalid arguments")
}

fn operation_label(tool: &str) -> &'static str {
    match tool {
        GENERATE_IMAGE => "generating image",
        LIST_GENERATED_IMAGES => "listing images",
        _ => "transforming image",
    }
}
