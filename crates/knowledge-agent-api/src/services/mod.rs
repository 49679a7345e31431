pub mod chat;
pub mod embedding;
pub mod indexer;
pub mod llm;

pub use chat::ChatService;
pub use embedding::{AzureEmbeddingClient, Embedder, Embedding};
pub use indexer::{IndexerScheduler, IndexingPipeline};
pub use llm::{AzureChatClient, ChatModel};
