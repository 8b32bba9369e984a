//! Clients for external collaborators: the object store holding document
//! bytes, the LLM inference endpoints, and the conversational agent
//! runtime. All are consumed through narrow interfaces; none of their
//! internals are modeled here.

pub mod agent;
pub mod blob;
pub mod llm;

pub use agent::AgentClient;
pub use blob::BlobStore;
pub use llm::{ChatMessage, LlmClient, SafetyVerdict};
