use std::path::PathBuf;

/// Failures of the delivery path (local store, remote store, policy).
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upload failed ({status}): {body}")]
    UploadStatus { status: u16, body: String },

    #[error("upload request failed")]
    UploadTransport(#[source] reqwest::Error),

    #[error("upload response had unexpected shape: {0}")]
    UploadShape(String),

    #[error("image data could not be decoded")]
    Decode(#[source] image::ImageError),

    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeliveryError {
    pub fn no_backend() -> Self {
        Self::Configuration(
            "no storage backend available; set IMAGE_UPLOAD_URL and IMAGE_UPLOAD_TOKEN or OUTPUT_IMAGE_PATH"
                .to_string(),
        )
    }

    pub fn is_upload(&self) -> bool {
        matches!(
            self,
            Self::UploadStatus { .. } | Self::UploadTransport(_) | Self::UploadShape(_)
        )
    }
}
