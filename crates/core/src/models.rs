use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DocumentType {
    AccountingStandard,
    FinancialReportingStandard,
    Standard,
}

impl DocumentType {
    /// Classifies a source document by the standard family named in its file name.
    pub fn from_file_name(file_name: &str) -> Self {
        if file_name.contains("LKAS") {
            Self::AccountingStandard
        } else if file_name.contains("SLFRS") {
            Self::FinancialReportingStandard
        } else {
            Self::Standard
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AccountingStandard => "ගිණුම්කරණ ප්‍රමිතිය",
            Self::FinancialReportingStandard => "මූල්‍ය වාර්තාකරණ ප්‍රමිතිය",
            Self::Standard => "ප්‍රමිතිය",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_id: u64,
    pub document_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    pub text: String,
    pub source: String,
    pub chunk_id: u64,
    pub document_type: DocumentType,
}

impl ChunkRecord {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            chunk_id: self.chunk_id,
            document_type: self.document_type.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f64,
}

/// Whether the backing collection has been created and holds any records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    Absent,
    Empty,
    Populated(u64),
}

impl CollectionState {
    pub fn is_populated(&self) -> bool {
        matches!(self, Self::Populated(_))
    }

    pub fn count(&self) -> u64 {
        match self {
            Self::Populated(count) => *count,
            Self::Absent | Self::Empty => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    NotInitialized,
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    pub count: u64,
    pub sources: Vec<String>,
    pub document_types: Vec<String>,
    pub status: CollectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            min_chunk_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub request_timeout: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            request_timeout: Duration::from_secs(60),
        }
    }
}
