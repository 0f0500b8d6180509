pub mod backend;
pub mod delivery;
pub mod error;
pub mod local_store;
pub mod orchestrator;
pub mod payload;
pub mod remote_store;
pub mod tool_server;

pub use backend::{GeminiBackend, GenerativeBackend};
pub use delivery::{BestEffort, Delivered, DeliveryPolicy, ImageStore};
pub use error::DeliveryError;
pub use local_store::LocalStore;
pub use orchestrator::Orchestrator;
pub use payload::{ImagePayload, SourceImage};
pub use remote_store::RemoteStore;
pub use tool_server::ToolServer;
