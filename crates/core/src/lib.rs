pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod stores;
pub mod traits;
pub mod transliteration;

pub use chunking::{
    assemble_document_text, build_chunk_records, chunk_text, clean_text, extract_key_terms,
    split_sentences,
};
pub use embeddings::{
    Embedder, GeminiEmbedder, LexicalEmbedder, DEFAULT_EMBEDDING_MODEL, DEFAULT_GEMINI_DIMENSIONS,
    DEFAULT_LOCAL_DIMENSIONS,
};
pub use error::{EmbeddingError, GenerationError, IngestError, SearchError, SetupError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use generation::{GeminiGenerator, DEFAULT_GENERATION_MODEL};
pub use ingest::{
    chunk_pdf, discover_pdf_files, ingest_folder, ingest_folder_with, IngestionReport,
    SkippedPdf,
};
pub use models::{
    ChunkMetadata, ChunkRecord, ChunkingOptions, CollectionState, CollectionStats,
    CollectionStatus, DocumentType, RetrievalOptions, RetrievedChunk,
};
pub use orchestrator::{
    build_prompt, prepare_context, KnowledgeBaseStatus, RagService, GENERATION_FAILURE_MESSAGE,
    NO_CONTEXT_MESSAGE, PROCESSING_FAILURE_MESSAGE,
};
pub use stores::{InMemoryIndex, QdrantStore};
pub use traits::{Generator, VectorIndex};
pub use transliteration::{is_native_script, translation_score, MappingTable, Transliterator};
