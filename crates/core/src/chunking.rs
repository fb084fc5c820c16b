use crate::extractor::PageText;
use crate::models::{ChunkRecord, ChunkingOptions, DocumentType};
use regex::Regex;
use std::sync::OnceLock;

const PAGE_LABEL: &str = "පිටුව";

/// Sentence terminators: ASCII period, bang and question mark plus the
/// ideographic and Khmer full stops that show up in converted documents.
const SENTENCE_DELIMITERS: [char; 5] = ['.', '!', '?', '。', '។'];

const KEY_TERMS: [&str; 34] = [
    "ගිණුම්කරණ",
    "ප්‍රමිතිය",
    "මූල්‍ය",
    "ප්‍රකාශන",
    "වත්කම්",
    "වගකීම්",
    "හිමිකම",
    "ආදායම්",
    "වියදම්",
    "ලාභ",
    "අලාභ",
    "තොග",
    "ක්ෂය",
    "ප්‍රතිපාදන",
    "මුදල්",
    "ප්‍රවාහ",
    "කල්බදු",
    "අයභාරය",
    "ගනුදෙනුකරු",
    "ධාරණ",
    "වටිනාකම",
    "පිරිවැය",
    "සාධාරණ",
    "අගය",
    "ගිවිසුම්",
    "කාර්යසාධන",
    "බැඳීම්",
    "ප්‍රතයාගණන",
    "භාවිත",
    "අයිතිය",
    "දේපළ",
    "පිරියත",
    "උපකරණ",
    "අසම්භාව්‍ය",
];

struct CleaningPatterns {
    whitespace: Regex,
    disallowed: Regex,
    page_marker: Regex,
    page_footer: Regex,
}

fn cleaning_patterns() -> &'static CleaningPatterns {
    static PATTERNS: OnceLock<CleaningPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CleaningPatterns {
        whitespace: Regex::new(r"\s+").expect("whitespace pattern is valid"),
        disallowed: Regex::new(r"[^\x{0D80}-\x{0DFF}\x{0020}-\x{007E}\n\r\t]")
            .expect("character filter pattern is valid"),
        page_marker: Regex::new(&format!(r"--- {PAGE_LABEL} \d+ ---"))
            .expect("page marker pattern is valid"),
        page_footer: Regex::new(&format!(r"{PAGE_LABEL} \d+")).expect("footer pattern is valid"),
    })
}

/// Joins extracted pages into one document body, each non-empty page
/// preceded by a `--- පිටුව N ---` boundary marker.
pub fn assemble_document_text(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        if page.text.trim().is_empty() {
            continue;
        }
        text.push_str(&format!("\n--- {PAGE_LABEL} {} ---\n", page.number));
        text.push_str(&page.text);
    }
    text
}

/// Normalizes extracted text: whitespace runs become one space, characters
/// outside printable ASCII and the Sinhala block are dropped, page markers
/// collapse to a newline and stray page footers are removed.
///
/// Markers are collapsed before footers are stripped. Stripping footers
/// first would cut the `පිටුව N` label out of every marker and leave a
/// `---  ---` residue in the text; this function never emits that residue.
pub fn clean_text(text: &str) -> String {
    let patterns = cleaning_patterns();
    let text = patterns.whitespace.replace_all(text, " ");
    let text = patterns.disallowed.replace_all(&text, "");
    let text = patterns.page_marker.replace_all(&text, "\n");
    let text = patterns.page_footer.replace_all(&text, "");
    text.trim().to_string()
}

pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split(SENTENCE_DELIMITERS.as_slice())
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

/// Greedily packs sentences into chunks of at most `chunk_size` characters.
///
/// A sentence is never split: one longer than the bound becomes a chunk of its
/// own. Each chunk after the first is seeded with the last
/// `chunk_overlap / 10` words of its predecessor. Chunks of
/// `min_chunk_chars` characters or fewer are dropped.
pub fn chunk_text(cleaned: &str, options: ChunkingOptions) -> Vec<String> {
    if cleaned.is_empty() {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(cleaned) {
        let sentence_len = char_len(sentence);

        if current_len + sentence_len > options.chunk_size {
            if current.is_empty() {
                current = sentence.to_string();
                current_len = sentence_len;
                continue;
            }

            chunks.push(current.trim().to_string());

            let overlap = overlap_words(&current, options.chunk_overlap);
            current = if overlap.is_empty() {
                sentence.to_string()
            } else {
                format!("{overlap} {sentence}")
            };
            current_len = char_len(&current);
        } else if current.is_empty() {
            current = sentence.to_string();
            current_len = sentence_len;
        } else {
            current.push(' ');
            current.push_str(sentence);
            current_len += sentence_len + 1;
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks.retain(|chunk| char_len(chunk) > options.min_chunk_chars);
    chunks
}

fn overlap_words(previous: &str, chunk_overlap: usize) -> String {
    let words = previous.split_whitespace().collect::<Vec<_>>();
    let keep = (chunk_overlap / 10).min(words.len());
    words[words.len() - keep..].join(" ")
}

/// Cleans and chunks one document, attaching its source metadata.
pub fn build_chunk_records(
    source: &str,
    raw_text: &str,
    options: ChunkingOptions,
) -> Vec<ChunkRecord> {
    let document_type = DocumentType::from_file_name(source);
    let cleaned = clean_text(raw_text);

    chunk_text(&cleaned, options)
        .into_iter()
        .enumerate()
        .map(|(index, text)| ChunkRecord {
            text,
            source: source.to_string(),
            chunk_id: index as u64,
            document_type,
        })
        .collect()
}

pub fn extract_key_terms(text: &str) -> Vec<&'static str> {
    KEY_TERMS
        .iter()
        .copied()
        .filter(|term| text.contains(term))
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
