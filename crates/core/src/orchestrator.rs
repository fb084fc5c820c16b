use crate::embeddings::{Embedder, LexicalEmbedder};
use crate::ingest::{ensure_folder, ingest_folder};
use crate::traits::{Generator, VectorIndex};
use crate::transliteration::{MappingTable, Transliterator};
use crate::{
    ChunkRecord, ChunkingOptions, CollectionState, CollectionStats, CollectionStatus,
    EmbeddingError, GenerationError, IngestError, RetrievalOptions, RetrievedChunk, SearchError,
    SetupError,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info, warn};

pub const NO_CONTEXT_MESSAGE: &str =
    "මට ඔබේ ප්‍රශ්නයට අදාළ තොරතුරු සොයා ගැනීමට නොහැකි විය. කරුණාකර වෙනත් ප්‍රශ්නයක් අසන්න.";

pub const GENERATION_FAILURE_MESSAGE: &str =
    "ප්‍රතිචාරය ජනනය කිරීමේදී දෝෂයක් සිදු විය. කරුණාකර නැවත උත්සාහ කරන්න.";

pub const PROCESSING_FAILURE_MESSAGE: &str =
    "ක්‍රමලේඛයේ දෝෂයක් සිදු වී ඇත. කරුණාකර නැවත උත්සාහ කරන්න.";

const STATS_PROBE_TERM: &str = "ගිණුම්කරණ";
const STATS_SAMPLE_SIZE: u64 = 10;

/// Texts per embedding call during indexing; each call gets its own timeout.
const EMBEDDING_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeBaseStatus {
    FolderCreated,
    NoDocuments,
    AlreadyIndexed(u64),
    NothingExtracted { skipped: usize },
    Indexed { records: usize, skipped: usize },
}

/// Answers questions over indexed accounting standards: normalizes the
/// query, retrieves the nearest chunks and hands them to the generator.
pub struct RagService<V, G>
where
    V: VectorIndex,
    G: Generator,
{
    index: V,
    generator: G,
    embedder: Arc<dyn Embedder>,
    transliterator: RwLock<Transliterator>,
    chunking: ChunkingOptions,
    retrieval: RetrievalOptions,
}

impl<V, G> RagService<V, G>
where
    V: VectorIndex + Send + Sync,
    G: Generator + Send + Sync,
{
    pub fn new(index: V, generator: G) -> Self {
        Self {
            index,
            generator,
            embedder: Arc::new(LexicalEmbedder::default()),
            transliterator: RwLock::new(Transliterator::default()),
            chunking: ChunkingOptions::default(),
            retrieval: RetrievalOptions::default(),
        }
    }

    pub fn with_options(mut self, chunking: ChunkingOptions, retrieval: RetrievalOptions) -> Self {
        self.chunking = chunking;
        self.retrieval = retrieval;
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    pub fn normalize_query(&self, query: &str) -> String {
        self.transliterator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .normalize(query)
    }

    pub fn add_mapping(&self, latin: &str, native: &str) {
        self.transliterator
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_mapping(latin, native);
    }

    pub fn suggest(&self, partial: &str) -> Vec<String> {
        self.transliterator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .suggest(partial)
    }

    pub fn common_terms(&self) -> MappingTable {
        self.transliterator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .common_terms()
    }

    /// Indexes the PDFs in `folder` unless the collection already holds records.
    pub async fn ensure_knowledge_base(
        &self,
        folder: &Path,
    ) -> Result<KnowledgeBaseStatus, SetupError> {
        self.setup_knowledge_base(folder, false).await
    }

    /// Re-ingests `folder` and replaces the collection regardless of its state.
    pub async fn rebuild_knowledge_base(
        &self,
        folder: &Path,
    ) -> Result<KnowledgeBaseStatus, SetupError> {
        self.setup_knowledge_base(folder, true).await
    }

    async fn setup_knowledge_base(
        &self,
        folder: &Path,
        force: bool,
    ) -> Result<KnowledgeBaseStatus, SetupError> {
        if !ensure_folder(folder)? {
            warn!(folder = %folder.display(), "created uploads folder; add PDF files to it");
            return Ok(KnowledgeBaseStatus::FolderCreated);
        }

        let pdf_count = crate::ingest::discover_pdf_files(folder).len();
        if pdf_count == 0 {
            warn!(folder = %folder.display(), "no PDF files found");
            return Ok(KnowledgeBaseStatus::NoDocuments);
        }

        if !force {
            if let CollectionState::Populated(count) = self.timed_state().await? {
                info!(count, "collection already populated; skipping ingestion");
                return Ok(KnowledgeBaseStatus::AlreadyIndexed(count));
            }
        }

        info!(files = pdf_count, "processing PDF files");
        let owned: PathBuf = folder.to_path_buf();
        let chunking = self.chunking;
        let report = tokio::task::spawn_blocking(move || ingest_folder(&owned, chunking))
            .await
            .map_err(|error| IngestError::Task(error.to_string()))??;

        let skipped = report.skipped_files.len();
        if report.records.is_empty() {
            error!(skipped, "no documents were processed");
            return Ok(KnowledgeBaseStatus::NothingExtracted { skipped });
        }

        self.index_records(&report.records).await?;
        info!(records = report.records.len(), skipped, "processed text chunks");
        Ok(KnowledgeBaseStatus::Indexed {
            records: report.records.len(),
            skipped,
        })
    }

    pub async fn index_records(&self, records: &[ChunkRecord]) -> Result<(), SearchError> {
        let texts = records
            .iter()
            .map(|record| record.text.clone())
            .collect::<Vec<_>>();
        info!(records = texts.len(), "generating embeddings");

        let limit = self.retrieval.request_timeout;
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            let vectors = tokio::time::timeout(limit, self.embedder.embed_documents(batch))
                .await
                .map_err(|_| SearchError::Timeout(limit))??;
            embeddings.extend(vectors);
        }

        tokio::time::timeout(limit, self.index.replace_collection(records, &embeddings))
            .await
            .map_err(|_| SearchError::Timeout(limit))?
    }

    pub async fn add_record(&self, record: &ChunkRecord) -> Result<(), SearchError> {
        let limit = self.retrieval.request_timeout;
        let texts = std::slice::from_ref(&record.text);
        let mut vectors = tokio::time::timeout(limit, self.embedder.embed_documents(texts))
            .await
            .map_err(|_| SearchError::Timeout(limit))??;
        let embedding = vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })?;

        tokio::time::timeout(limit, self.index.add_record(record, &embedding))
            .await
            .map_err(|_| SearchError::Timeout(limit))?
    }

    /// Top-k chunks for an already normalized query.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, SearchError> {
        self.search_with_limit(query, self.retrieval.top_k).await
    }

    async fn search_with_limit(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let limit = self.retrieval.request_timeout;
        let query_vector = tokio::time::timeout(limit, self.embedder.embed_query(query))
            .await
            .map_err(|_| SearchError::Timeout(limit))??;
        let hits = tokio::time::timeout(limit, self.index.search(&query_vector, k))
            .await
            .map_err(|_| SearchError::Timeout(limit))??;
        info!(hits = hits.len(), "retrieved documents");
        Ok(hits)
    }

    async fn timed_state(&self) -> Result<CollectionState, SearchError> {
        let limit = self.retrieval.request_timeout;
        tokio::time::timeout(limit, self.index.collection_state())
            .await
            .map_err(|_| SearchError::Timeout(limit))?
    }

    /// Always yields text: downstream failures become fixed Sinhala messages.
    pub async fn answer(&self, question: &str) -> String {
        let normalized = self.normalize_query(question);

        let hits = match self.retrieve(&normalized).await {
            Ok(hits) => hits,
            Err(search_error) => {
                error!(error = %search_error, "retrieval failed");
                return PROCESSING_FAILURE_MESSAGE.to_string();
            }
        };

        if hits.is_empty() {
            return NO_CONTEXT_MESSAGE.to_string();
        }

        let prompt = build_prompt(&normalized, &prepare_context(&hits));
        match self.generate(&prompt).await {
            Ok(answer) => answer,
            Err(generation_error) => {
                error!(error = %generation_error, "generation failed");
                GENERATION_FAILURE_MESSAGE.to_string()
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let limit = self.retrieval.request_timeout;
        tokio::time::timeout(limit, self.generator.generate(prompt))
            .await
            .map_err(|_| GenerationError::Timeout(limit))?
    }

    /// Record count plus the sources and document types seen among the
    /// chunks nearest to a generic accounting probe term.
    pub async fn collection_stats(&self) -> CollectionStats {
        match self.sample_stats().await {
            Ok(stats) => stats,
            Err(search_error) => {
                error!(error = %search_error, "failed to read collection stats");
                CollectionStats {
                    count: 0,
                    sources: Vec::new(),
                    document_types: Vec::new(),
                    status: CollectionStatus::Error,
                    error: Some(search_error.to_string()),
                }
            }
        }
    }

    async fn sample_stats(&self) -> Result<CollectionStats, SearchError> {
        let count = match self.timed_state().await? {
            CollectionState::Absent => {
                return Ok(CollectionStats {
                    count: 0,
                    sources: Vec::new(),
                    document_types: Vec::new(),
                    status: CollectionStatus::NotInitialized,
                    error: None,
                })
            }
            state => state.count(),
        };

        let sample = if count == 0 {
            Vec::new()
        } else {
            let k = count.min(STATS_SAMPLE_SIZE) as usize;
            self.search_with_limit(STATS_PROBE_TERM, k).await?
        };

        let sources = sample
            .iter()
            .map(|hit| hit.metadata.source.clone())
            .collect::<BTreeSet<_>>();
        let document_types = sample
            .iter()
            .map(|hit| hit.metadata.document_type.clone())
            .collect::<BTreeSet<_>>();

        Ok(CollectionStats {
            count,
            sources: sources.into_iter().collect(),
            document_types: document_types.into_iter().collect(),
            status: CollectionStatus::Active,
            error: None,
        })
    }
}

/// Labels each retrieved chunk with its source file and document type.
pub fn prepare_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "ප්‍රභවය: {} ({}):\n{}\n",
                hit.metadata.source, hit.metadata.document_type, hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "ඔබ සිංහල ගිණුම්කරණ ප්‍රමිතීන් සහ මූල්‍ය වාර්තාකරණ ප්‍රමිතීන් පිළිබඳ විශේෂඥයෙකි.

පරිශීලක ප්‍රශ්නය: {query}

අදාළ ප්‍රලේඛන තොරතුරු:
{context}

උපදෙස්:

1. සම්පූර්ණයෙන්ම සිංහල භාෂාවෙන් පිළිතුරු දෙන්න
2. ප්‍රලේඛනවල ඇති නිශ්චිත තොරතුරු මත පදනම්ව පිළිතුරු දෙන්න
3. නිවැරදි සහ ගැඹුරු පිළිතුරක් ලබා දෙන්න
4. ගිණුම්කරණ සිද්ධාන්තවල විස්තර සහ උදාහරණ ඇතුළත් කරන්න
5. සම්බන්ධ LKAS/SLFRS අංක සඳහන් කරන්න
6. අවශ්‍ය නම් පියවරෙන් පියවර පැහැදිලි කිරීමක් ලබා දෙන්න
7. ප්‍රශ්නයට සෘජු පිළිතුරක් ලබා දෙන්න
8. සන්දර්භයෙන් පිටත දේවල් ගැන ඇහුවොත්, සන්දර්භය ගැන ප්‍රශ්න අහන්න ආචාරශීලීව කියන්න.

පිළිතුර:
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryIndex;
    use crate::{ChunkMetadata, DocumentType};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeGenerator {
        prompts: Mutex<Vec<String>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.prompts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(prompt.to_string());
            if self.fail {
                Err(GenerationError::EmptyResponse)
            } else {
                Ok("පිළිතුර".to_string())
            }
        }
    }

    struct BrokenIndex;

    #[async_trait]
    impl VectorIndex for BrokenIndex {
        async fn collection_state(&self) -> Result<CollectionState, SearchError> {
            Err(SearchError::Request("offline".to_string()))
        }

        async fn replace_collection(
            &self,
            _records: &[ChunkRecord],
            _embeddings: &[Vec<f32>],
        ) -> Result<(), SearchError> {
            Err(SearchError::Request("offline".to_string()))
        }

        async fn add_record(
            &self,
            _record: &ChunkRecord,
            _embedding: &[f32],
        ) -> Result<(), SearchError> {
            Err(SearchError::Request("offline".to_string()))
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            _k: usize,
        ) -> Result<Vec<RetrievedChunk>, SearchError> {
            Err(SearchError::Request("offline".to_string()))
        }
    }

    struct OfflineEmbedder;

    #[async_trait]
    impl Embedder for OfflineEmbedder {
        fn dimensions(&self) -> usize {
            8
        }

        async fn embed_documents(
            &self,
            _texts: &[String],
        ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::BackendResponse {
                status: 503,
                details: "unavailable".to_string(),
            })
        }

        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Err(EmbeddingError::BackendResponse {
                status: 503,
                details: "unavailable".to_string(),
            })
        }
    }

    fn record(source: &str, chunk_id: u64, text: &str) -> ChunkRecord {
        ChunkRecord {
            text: text.to_string(),
            source: source.to_string(),
            chunk_id,
            document_type: DocumentType::from_file_name(source),
        }
    }

    async fn indexed_service(
        generator: FakeGenerator,
    ) -> Result<RagService<InMemoryIndex, FakeGenerator>, SearchError> {
        let service = RagService::new(InMemoryIndex::new(), generator);
        service
            .index_records(&[
                record("LKAS_2.pdf", 0, "තොග වටිනාකම පිරිවැය සහ ශුද්ධ උපලබ්ධි අගය"),
                record("SLFRS_16.pdf", 0, "කල්බදු භාවිත අයිතිය වත්කම් සහ වගකීම්"),
            ])
            .await?;
        Ok(service)
    }

    #[tokio::test]
    async fn empty_index_answers_with_no_context_message() {
        let service = RagService::new(InMemoryIndex::new(), FakeGenerator::default());
        assert_eq!(service.answer("thoga watinaakama").await, NO_CONTEXT_MESSAGE);
    }

    #[tokio::test]
    async fn answer_uses_normalized_query_and_labelled_context() -> Result<(), SearchError> {
        let service = indexed_service(FakeGenerator::default()).await?;

        let answer = service.answer("thoga watinaakama").await;
        assert_eq!(answer, "පිළිතුර");

        let prompts = service
            .generator
            .prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("පරිශීලක ප්‍රශ්නය: තොග වටිනාකම\n"));
        assert!(prompts[0].contains("ප්‍රභවය: LKAS_2.pdf (ගිණුම්කරණ ප්‍රමිතිය):"));
        Ok(())
    }

    #[tokio::test]
    async fn generation_failure_becomes_fallback_message() -> Result<(), SearchError> {
        let service = indexed_service(FakeGenerator {
            fail: true,
            ..FakeGenerator::default()
        })
        .await?;
        assert_eq!(service.answer("lease").await, GENERATION_FAILURE_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn slow_generation_times_out() -> Result<(), SearchError> {
        let service = indexed_service(FakeGenerator {
            delay: Some(Duration::from_secs(30)),
            ..FakeGenerator::default()
        })
        .await?
        .with_options(
            ChunkingOptions::default(),
            RetrievalOptions {
                top_k: 5,
                request_timeout: Duration::from_millis(20),
            },
        );
        assert_eq!(service.answer("lease").await, GENERATION_FAILURE_MESSAGE);
        Ok(())
    }

    #[tokio::test]
    async fn index_failure_becomes_fallback_message() {
        let service = RagService::new(BrokenIndex, FakeGenerator::default());
        assert_eq!(service.answer("lease").await, PROCESSING_FAILURE_MESSAGE);

        let stats = service.collection_stats().await;
        assert_eq!(stats.status, CollectionStatus::Error);
        assert!(stats.error.is_some());
    }

    #[tokio::test]
    async fn embedding_failure_becomes_fallback_message() {
        let service = RagService::new(InMemoryIndex::new(), FakeGenerator::default())
            .with_embedder(Arc::new(OfflineEmbedder));
        assert_eq!(service.answer("lease").await, PROCESSING_FAILURE_MESSAGE);

        let result = service.index_records(&[record("LKAS_2.pdf", 0, "තොග")]).await;
        assert!(matches!(result, Err(SearchError::Embedding(_))));
        let prompts = service
            .generator
            .prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        assert!(prompts.is_empty());
    }

    #[tokio::test]
    async fn stats_reflect_collection_state() -> Result<(), SearchError> {
        let empty = RagService::new(InMemoryIndex::new(), FakeGenerator::default());
        assert_eq!(
            empty.collection_stats().await.status,
            CollectionStatus::NotInitialized
        );

        let service = indexed_service(FakeGenerator::default()).await?;
        let stats = service.collection_stats().await;
        assert_eq!(stats.status, CollectionStatus::Active);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.sources, vec!["LKAS_2.pdf", "SLFRS_16.pdf"]);
        assert_eq!(stats.document_types.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn knowledge_base_setup_handles_missing_and_empty_folders(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let uploads = dir.path().join("uploads");
        let service = RagService::new(InMemoryIndex::new(), FakeGenerator::default());

        assert_eq!(
            service.ensure_knowledge_base(&uploads).await?,
            KnowledgeBaseStatus::FolderCreated
        );
        assert!(uploads.is_dir());
        assert_eq!(
            service.ensure_knowledge_base(&uploads).await?,
            KnowledgeBaseStatus::NoDocuments
        );

        std::fs::write(uploads.join("LKAS_1.pdf"), b"%PDF-1.4\n%broken")?;
        assert_eq!(
            service.ensure_knowledge_base(&uploads).await?,
            KnowledgeBaseStatus::NothingExtracted { skipped: 1 }
        );
        assert_eq!(
            service.index().collection_state().await?,
            CollectionState::Absent
        );
        Ok(())
    }

    #[tokio::test]
    async fn populated_collection_skips_ingestion() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("LKAS_1.pdf"), b"%PDF-1.4\n%broken")?;
        let service = indexed_service(FakeGenerator::default()).await?;

        assert_eq!(
            service.ensure_knowledge_base(dir.path()).await?,
            KnowledgeBaseStatus::AlreadyIndexed(2)
        );
        assert_eq!(
            service.rebuild_knowledge_base(dir.path()).await?,
            KnowledgeBaseStatus::NothingExtracted { skipped: 1 }
        );
        Ok(())
    }

    #[tokio::test]
    async fn added_record_becomes_searchable() -> Result<(), SearchError> {
        let service = indexed_service(FakeGenerator::default()).await?;
        service
            .add_record(&record("notes.pdf", 0, "අසම්භාව්‍ය වගකීම් පිළිබඳ සටහන"))
            .await?;
        assert_eq!(
            service.index().collection_state().await?,
            CollectionState::Populated(3)
        );

        let hits = service.retrieve("අසම්භාව්‍ය වගකීම් පිළිබඳ සටහන").await?;
        assert_eq!(hits[0].metadata.source, "notes.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn custom_mappings_reach_the_shared_dictionary() {
        let service = RagService::new(InMemoryIndex::new(), FakeGenerator::default());
        service.add_mapping("custom", "විශේෂ");
        assert_eq!(service.normalize_query("custom term"), "විශේෂ term");
        assert_eq!(service.common_terms().get("custom"), Some("විශේෂ"));
        assert!(service.suggest("custo").contains(&"විශේෂ".to_string()));
    }

    #[test]
    fn context_labels_every_chunk() {
        let hits = vec![
            RetrievedChunk {
                text: "පළමු".to_string(),
                metadata: ChunkMetadata {
                    source: "a.pdf".to_string(),
                    chunk_id: 0,
                    document_type: "ප්‍රමිතිය".to_string(),
                },
                distance: 0.1,
            },
            RetrievedChunk {
                text: "දෙවන".to_string(),
                metadata: ChunkMetadata {
                    source: "b.pdf".to_string(),
                    chunk_id: 4,
                    document_type: "ප්‍රමිතිය".to_string(),
                },
                distance: 0.2,
            },
        ];

        assert_eq!(
            prepare_context(&hits),
            "ප්‍රභවය: a.pdf (ප්‍රමිතිය):\nපළමු\n\nප්‍රභවය: b.pdf (ප්‍රමිතිය):\nදෙවන\n"
        );
        assert!(build_prompt("q", "ctx").contains("පරිශීලක ප්‍රශ්නය: q\n"));
    }
}
