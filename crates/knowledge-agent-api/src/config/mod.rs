pub mod settings;

pub use settings::{
    ChatConfig, GraphConfig, IndexerConfig, OpenAiConfig, RetrievalConfig, SearchConfig,
    ServerConfig, Settings,
};
