pub mod chunker;
pub mod extractor;
pub mod html;
pub mod parser;

pub use chunker::{chunk_text, ChunkOptions, TextChunk};
pub use extractor::{ContentExtractor, MIN_CONTENT_LEN};
