//! Decides where a generated image ends up and what reference the caller gets.
//!
//! Remote upload is preferred when configured. A successful upload is mirrored
//! to the local directory on a best-effort basis; a failed upload falls back
//! to the local directory when one is available, and otherwise surfaces the
//! upload error unchanged.

use genimg_contracts::config::StorageConfig;
use genimg_contracts::naming::filename_for_stem;

use crate::error::DeliveryError;
use crate::local_store::LocalStore;
use crate::remote_store::RemoteStore;

/// A place an image can be written to, yielding a reference string.
pub trait ImageStore: Send + Sync {
    fn name(&self) -> &str;
    fn store(&self, bytes: &[u8], filename: &str) -> Result<String, DeliveryError>;
}

/// Result of a side operation whose failure must never reach the caller.
#[derive(Debug)]
pub enum BestEffort {
    Skipped,
    Done(String),
    Failed(DeliveryError),
}

impl BestEffort {
    fn run(op: impl FnOnce() -> Result<String, DeliveryError>) -> Self {
        match op() {
            Ok(reference) => Self::Done(reference),
            Err(err) => {
                tracing::warn!(error = ?err, "mirrored local save failed; keeping remote result");
                Self::Failed(err)
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Where the authoritative copy lives.
#[derive(Debug)]
pub enum Delivered {
    Remote { url: String, mirror: BestEffort },
    Local { path: String, upload_error: Option<DeliveryError> },
}

impl Delivered {
    /// The single reference returned to the caller.
    pub fn reference(&self) -> &str {
        match self {
            Self::Remote { url, .. } => url,
            Self::Local { path, .. } => path,
        }
    }

    pub fn into_reference(self) -> String {
        match self {
            Self::Remote { url, .. } => url,
            Self::Local { path, .. } => path,
        }
    }
}

pub struct DeliveryPolicy {
    remote: Option<Box<dyn ImageStore>>,
    local: Option<Box<dyn ImageStore>>,
    local_ready: bool,
}

impl DeliveryPolicy {
    /// `local_ready` marks the local store as usable for fallback and
    /// mirroring; a present but unready store is only tried when it is the
    /// sole backend, where it fails fast.
    pub fn new(
        remote: Option<Box<dyn ImageStore>>,
        local: Option<Box<dyn ImageStore>>,
        local_ready: bool,
    ) -> Self {
        Self {
            remote,
            local,
            local_ready,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, DeliveryError> {
        let remote = match &config.remote {
            Some(target) => Some(Box::new(RemoteStore::new(target.clone())?) as Box<dyn ImageStore>),
            None => None,
        };
        let local_store = LocalStore::new(config.local.clone());
        let local_ready = local_store.is_ready();
        let local = if config.local.is_disabled() {
            None
        } else {
            Some(Box::new(local_store) as Box<dyn ImageStore>)
        };
        Ok(Self::new(remote, local, local_ready))
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    fn ready_local(&self) -> Option<&dyn ImageStore> {
        if self.local_ready {
            self.local.as_deref()
        } else {
            None
        }
    }

    pub fn deliver(&self, bytes: &[u8], stem: &str) -> Result<Delivered, DeliveryError> {
        let filename = filename_for_stem(stem);

        let Some(remote) = self.remote.as_deref() else {
            let Some(local) = self.local.as_deref() else {
                return Err(DeliveryError::no_backend());
            };
            let path = local.store(bytes, &filename)?;
            return Ok(Delivered::Local {
                path,
                upload_error: None,
            });
        };

        match remote.store(bytes, &filename) {
            Ok(url) => {
                let mirror = match self.ready_local() {
                    Some(local) => BestEffort::run(|| local.store(bytes, &filename)),
                    None => BestEffort::Skipped,
                };
                Ok(Delivered::Remote { url, mirror })
            }
            Err(upload_error) => {
                let Some(local) = self.ready_local() else {
                    tracing::error!(error = ?upload_error, store = remote.name(), "upload failed; no local fallback");
                    return Err(upload_error);
                };
                tracing::warn!(error = ?upload_error, "upload failed; falling back to local save");
                let path = local.store(bytes, &filename)?;
                Ok(Delivered::Local {
                    path,
                    upload_error: Some(upload_error),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use genimg_contracts::config::{LocalStorage, RemoteTarget};
    use serde_json::json;
    use url::Url;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::payload::sample_png;

    // Localhost mocks must not be routed through a system proxy.
    fn no_proxy_remote(endpoint: Url) -> Box<dyn ImageStore> {
        let http = reqwest::blocking::Client::builder()
            .no_proxy()
            .build()
            .unwrap();
        let target = RemoteTarget {
            endpoint,
            token: "T".to_string(),
        };
        Box::new(RemoteStore::with_http_client(target, http))
    }

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        FailUpload,
        FailIo,
    }

    struct FakeStore {
        name: &'static str,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl FakeStore {
        fn boxed(name: &'static str, behavior: Behavior) -> (Box<dyn ImageStore>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let store = Self {
                name,
                behavior,
                calls: Arc::clone(&calls),
            };
            (Box::new(store), calls)
        }
    }

    impl ImageStore for FakeStore {
        fn name(&self) -> &str {
            self.name
        }

        fn store(&self, _bytes: &[u8], filename: &str) -> Result<String, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Succeed => Ok(format!("{}:{filename}", self.name)),
                Behavior::FailUpload => Err(DeliveryError::UploadStatus {
                    status: 502,
                    body: "bad gateway".to_string(),
                }),
                Behavior::FailIo => Err(DeliveryError::Io {
                    path: PathBuf::from("/readonly").join(filename),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                }),
            }
        }
    }

    #[test]
    fn no_backend_fails_before_any_io() {
        let policy = DeliveryPolicy::new(None, None, false);
        let err = policy.deliver(b"bytes", "boat").err();
        assert!(matches!(err, Some(DeliveryError::Configuration(_))));
    }

    #[test]
    fn disabled_config_yields_configuration_error() -> anyhow::Result<()> {
        let config = StorageConfig::new(None, LocalStorage::Disabled);
        let policy = DeliveryPolicy::from_config(&config)?;
        let err = policy
            .deliver(&sample_png(2, 2), "boat")
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.starts_with("configuration error: no storage backend available"));
        Ok(())
    }

    #[test]
    fn remote_success_returns_url_and_mirrors_locally() -> anyhow::Result<()> {
        let (remote, remote_calls) = FakeStore::boxed("remote", Behavior::Succeed);
        let (local, local_calls) = FakeStore::boxed("local", Behavior::Succeed);
        let policy = DeliveryPolicy::new(Some(remote), Some(local), true);

        let delivered = policy.deliver(b"bytes", "boat")?;
        assert_eq!(delivered.reference(), "remote:boat.png");
        assert!(matches!(
            delivered,
            Delivered::Remote { mirror: BestEffort::Done(ref path), .. } if path == "local:boat.png"
        ));
        assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn failed_mirror_does_not_affect_remote_result() -> anyhow::Result<()> {
        let (remote, _) = FakeStore::boxed("remote", Behavior::Succeed);
        let (local, local_calls) = FakeStore::boxed("local", Behavior::FailIo);
        let policy = DeliveryPolicy::new(Some(remote), Some(local), true);

        let delivered = policy.deliver(b"bytes", "boat")?;
        assert_eq!(delivered.reference(), "remote:boat.png");
        match &delivered {
            Delivered::Remote { mirror, .. } => assert!(mirror.is_failed()),
            other => panic!("expected remote delivery, got {other:?}"),
        }
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn remote_only_skips_mirror() -> anyhow::Result<()> {
        let (remote, _) = FakeStore::boxed("remote", Behavior::Succeed);
        let policy = DeliveryPolicy::new(Some(remote), None, false);
        let delivered = policy.deliver(b"bytes", "boat")?;
        assert!(matches!(
            delivered,
            Delivered::Remote { mirror: BestEffort::Skipped, .. }
        ));
        Ok(())
    }

    #[test]
    fn upload_failure_falls_back_to_local() -> anyhow::Result<()> {
        let (remote, _) = FakeStore::boxed("remote", Behavior::FailUpload);
        let (local, local_calls) = FakeStore::boxed("local", Behavior::Succeed);
        let policy = DeliveryPolicy::new(Some(remote), Some(local), true);

        let delivered = policy.deliver(b"bytes", "boat")?;
        assert_eq!(delivered.reference(), "local:boat.png");
        assert!(matches!(
            delivered,
            Delivered::Local { upload_error: Some(DeliveryError::UploadStatus { status: 502, .. }), .. }
        ));
        assert_eq!(local_calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn upload_failure_without_local_propagates_original_error() {
        let (remote, _) = FakeStore::boxed("remote", Behavior::FailUpload);
        let policy = DeliveryPolicy::new(Some(remote), None, false);
        match policy.deliver(b"bytes", "boat") {
            Err(DeliveryError::UploadStatus { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("expected original upload error, got {other:?}"),
        }
    }

    #[test]
    fn unready_local_is_not_used_as_fallback() {
        let (remote, _) = FakeStore::boxed("remote", Behavior::FailUpload);
        let (local, local_calls) = FakeStore::boxed("local", Behavior::Succeed);
        let policy = DeliveryPolicy::new(Some(remote), Some(local), false);
        let err = policy.deliver(b"bytes", "boat").err();
        assert!(matches!(err, Some(DeliveryError::UploadStatus { .. })));
        assert_eq!(local_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn local_only_propagates_local_errors() {
        let (local, _) = FakeStore::boxed("local", Behavior::FailIo);
        let policy = DeliveryPolicy::new(None, Some(local), true);
        let err = policy.deliver(b"bytes", "boat").err();
        assert!(matches!(err, Some(DeliveryError::Io { .. })));
    }

    #[test]
    fn local_only_round_trips_through_real_store() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = StorageConfig::new(None, LocalStorage::Ready(temp.path().to_path_buf()));
        let policy = DeliveryPolicy::from_config(&config)?;
        let png = sample_png(7, 4);

        let delivered = policy.deliver(&png, "red_fox")?;
        let path = Path::new(delivered.reference());
        assert_eq!(path, temp.path().join("red_fox.png"));
        assert_eq!(
            image::open(path)?.to_rgb8(),
            image::load_from_memory(&png)?.to_rgb8()
        );
        Ok(())
    }

    #[test]
    fn unavailable_local_only_fails_fast() -> anyhow::Result<()> {
        let config = StorageConfig::new(
            None,
            LocalStorage::Unavailable {
                dir: PathBuf::from("/nonexistent/out"),
                reason: "denied".to_string(),
            },
        );
        let policy = DeliveryPolicy::from_config(&config)?;
        let err = policy.deliver(&sample_png(1, 1), "x").err();
        assert!(matches!(err, Some(DeliveryError::Configuration(_))));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_only_config_returns_origin_joined_url() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("authCode", "T"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"src": "/file/abc123.png"}])))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/upload?auth=1", server.uri()))?;
        let reference = tokio::task::spawn_blocking(move || {
            let policy = DeliveryPolicy::new(Some(no_proxy_remote(endpoint)), None, false);
            policy
                .deliver(&sample_png(3, 3), "boat")
                .map(Delivered::into_reference)
        })
        .await??;

        assert_eq!(reference, format!("{}/file/abc123.png", server.uri()));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn real_upload_failure_falls_back_to_real_local_store() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir()?;
        let dir = temp.path().to_path_buf();
        let endpoint = Url::parse(&format!("{}/upload", server.uri()))?;
        let local = LocalStore::new(LocalStorage::Ready(dir.clone()));
        let reference = tokio::task::spawn_blocking(move || {
            let policy = DeliveryPolicy::new(Some(no_proxy_remote(endpoint)), Some(Box::new(local)), true);
            policy
                .deliver(&sample_png(3, 3), "boat")
                .map(Delivered::into_reference)
        })
        .await??;

        assert_eq!(Path::new(&reference), dir.join("boat.png"));
        Ok(())
    }
}
