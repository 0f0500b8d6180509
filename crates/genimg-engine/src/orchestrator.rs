use anyhow::{Context, Result};
use genimg_contracts::config::StorageConfig;
use genimg_contracts::naming::{fallback_stem, sanitize_stem};
use genimg_contracts::prompts::{
    filename_prompt, generation_prompt, transformation_prompt, translation_prompt,
};

use crate::backend::GenerativeBackend;
use crate::delivery::{Delivered, DeliveryPolicy};
use crate::local_store::LocalStore;
use crate::payload::SourceImage;

/// Runs one tool request end to end: prompt preparation, backend call,
/// naming and delivery.
pub struct Orchestrator {
    backend: Box<dyn GenerativeBackend>,
    delivery: DeliveryPolicy,
    local: LocalStore,
}

impl Orchestrator {
    pub fn new(backend: Box<dyn GenerativeBackend>, delivery: DeliveryPolicy, local: LocalStore) -> Self {
        Self {
            backend,
            delivery,
            local,
        }
    }

    pub fn from_config(config: &StorageConfig, backend: Box<dyn GenerativeBackend>) -> Result<Self> {
        let delivery = DeliveryPolicy::from_config(config)?;
        Ok(Self::new(backend, delivery, LocalStore::new(config.local.clone())))
    }

    pub fn generate_image(&self, prompt: &str) -> Result<Delivered> {
        tracing::info!(prompt, "generate_image request");
        let translated = self.translate_prompt(prompt);
        let payload = self
            .backend
            .generate_image(&generation_prompt(&translated), None)
            .context("image generation failed")?;
        let stem = self.derive_filename_stem(prompt);
        Ok(self.delivery.deliver(&payload.bytes, &stem)?)
    }

    pub fn transform_image(&self, image_ref: &str, prompt: &str) -> Result<Delivered> {
        tracing::info!(prompt, "transform_image request");
        let source = SourceImage::load(image_ref)?;
        let translated = self.translate_prompt(prompt);
        let payload = self
            .backend
            .generate_image(&transformation_prompt(&translated), Some(&source))
            .context("image transformation failed")?;
        let stem = self.derive_filename_stem(prompt);
        Ok(self.delivery.deliver(&payload.bytes, &stem)?)
    }

    pub fn list_generated_images(&self, limit: Option<u32>) -> Result<Vec<String>> {
        let paths = self.local.list(limit)?;
        Ok(paths
            .into_iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect())
    }

    /// English version of `prompt`, or `prompt` itself if translation fails.
    pub fn translate_prompt(&self, prompt: &str) -> String {
        match self.backend.complete_text(&translation_prompt(prompt)) {
            Ok(translated) if !translated.trim().is_empty() => {
                tracing::debug!(original = prompt, translated = %translated, "prompt translated");
                translated
            }
            Ok(_) => prompt.to_string(),
            Err(err) => {
                tracing::warn!(error = %err, "prompt translation failed; using original prompt");
                prompt.to_string()
            }
        }
    }

    /// Backend-suggested stem, sanitized; falls back to a prompt prefix plus
    /// a random suffix.
    pub fn derive_filename_stem(&self, prompt: &str) -> String {
        match self.backend.complete_text(&filename_prompt(prompt)) {
            Ok(suggested) => {
                let stem = sanitize_stem(&suggested);
                if stem.is_empty() {
                    fallback_stem(prompt)
                } else {
                    tracing::info!(stem = %stem, "generated filename");
                    stem
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "filename generation failed; using fallback");
                fallback_stem(prompt)
            }
        }
    }
}
