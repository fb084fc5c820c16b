//! Latin-script transliteration of Sinhala queries into native script.
//!
//! Users without a Sinhala input method type queries such as
//! `ginumkaranaya kohomada`. [`Transliterator::normalize`] rewrites those
//! into native script through phrase and word tables so that retrieval runs
//! against the same script the indexed documents use. Text that is already
//! mostly Sinhala passes through untouched.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::info;

const SINHALA_BLOCK: std::ops::RangeInclusive<char> = '\u{0D80}'..='\u{0DFF}';

/// Minimum share of Sinhala characters for text to count as native script.
const NATIVE_SCRIPT_RATIO: f64 = 0.5;

/// Minimum share of Sinhala characters a rewrite needs before it replaces the query.
const ACCEPT_THRESHOLD: f64 = 0.3;

/// Tokens this short never fall back to partial matching.
const PARTIAL_MATCH_MIN_CHARS: usize = 3;

const MAX_SUGGESTIONS: usize = 5;

const WORD_MAPPINGS: [(&str, &str); 81] = [
    ("accounting", "ගිණුම්කරණ"),
    ("ginumkarana", "ගිණුම්කරණ"),
    ("ginumkaranaya", "ගිණුම්කරණය"),
    ("standard", "ප්‍රමිතිය"),
    ("pramiithiya", "ප්‍රමිතිය"),
    ("financial", "මූල්‍ය"),
    ("moolya", "මූල්‍ය"),
    ("statement", "ප්‍රකාශනය"),
    ("prakashana", "ප්‍රකාශන"),
    ("prakashanaya", "ප්‍රකාශනය"),
    ("assets", "වත්කම්"),
    ("wathkam", "වත්කම්"),
    ("liabilities", "වගකීම්"),
    ("wagakeem", "වගකීම්"),
    ("equity", "හිමිකම"),
    ("himikam", "හිමිකම"),
    ("revenue", "ආදායම්"),
    ("aadayam", "ආදායම්"),
    ("income", "ආදායම්"),
    ("expenses", "වියදම්"),
    ("wiyadam", "වියදම්"),
    ("profit", "ලාභ"),
    ("labha", "ලාභ"),
    ("loss", "අලාභ"),
    ("alabha", "අලාභ"),
    ("inventory", "තොග"),
    ("thoga", "තොග"),
    ("depreciation", "ක්ෂය"),
    ("kshaya", "ක්ෂය"),
    ("provision", "ප්‍රතිපාදන"),
    ("prathipaadana", "ප්‍රතිපාදන"),
    ("cash", "මුදල්"),
    ("mudal", "මුදල්"),
    ("flow", "ප්‍රවාහ"),
    ("prawaha", "ප්‍රවාහ"),
    ("lease", "කල්බදු"),
    ("kalbadu", "කල්බදු"),
    ("customer", "ගනුදෙනුකරු"),
    ("ganudenukaraya", "ගනුදෙනුකරු"),
    ("carrying", "ධාරණ"),
    ("dharana", "ධාරණ"),
    ("value", "වටිනාකම"),
    ("watinaakama", "වටිනාකම"),
    ("cost", "පිරිවැය"),
    ("piriwaya", "පිරිවැය"),
    ("fair", "සාධාරණ"),
    ("saadarana", "සාධාරණ"),
    ("contract", "ගිවිසුම්"),
    ("giwisuma", "ගිවිසුම්"),
    ("performance", "කාර්යසාධන"),
    ("kaaryasadhana", "කාර්යසාධන"),
    ("obligation", "බැඳීම්"),
    ("baendeem", "බැඳීම්"),
    ("revaluation", "ප්‍රතයාගණන"),
    ("prathyaagana", "ප්‍රතයාගණන"),
    ("right", "අයිතිය"),
    ("ayithiya", "අයිතිය"),
    ("use", "භාවිත"),
    ("bhaawitha", "භාවිත"),
    ("property", "දේපළ"),
    ("depala", "දේපළ"),
    ("plant", "පිරියත"),
    ("piriyatha", "පිරියත"),
    ("equipment", "උපකරණ"),
    ("upakarana", "උපකරණ"),
    ("contingent", "අසම්භාව්‍ය"),
    ("asambhaawya", "අසම්භාව්‍ය"),
    ("what", "මොකක්ද"),
    ("mokakda", "මොකක්ද"),
    ("how", "කොහොමද"),
    ("kohomada", "කොහොමද"),
    ("when", "කවදාද"),
    ("kawadaada", "කවදාද"),
    ("where", "කොහේද"),
    ("koheda", "කොහේද"),
    ("why", "ඇයි"),
    ("ayee", "ඇයි"),
    ("which", "කුමන"),
    ("kumana", "කුමන"),
    ("lkas", "ශ්‍රී ලංකා ගිණුම්කරණ ප්‍රමිතිය"),
    ("slfrs", "ශ්‍රී ලංකා මූල්‍ය වාර්තාකරණ ප්‍රමිතිය"),
];

const PHRASE_MAPPINGS: [(&str, &str); 10] = [
    ("ginumkaranaya kohomada", "ගිණුම්කරණය කොහොමද"),
    ("moolya prakashana", "මූල්‍ය ප්‍රකාශන"),
    ("wathkam saha wagakeem", "වත්කම් සහ වගකීම්"),
    ("labha alaba prakashana", "ලාභ අලාභ ප්‍රකාශන"),
    ("mudal prawaha", "මුදල් ප්‍රවාහ"),
    ("himikam wenas weema", "හිමිකම වෙනස් වීම"),
    ("thoga watinaakama", "තොග වටිනාකම"),
    ("depala piriyatha upakarana", "දේපළ පිරියත උපකරණ"),
    ("kshaya kireema", "ක්ෂය කිරීම"),
    ("prathipaadana haduna gaaneema", "ප්‍රතිපාදන හඳුනා ගැනීම"),
];

/// Letters, digits and underscore. Vowel signs, viramas and joiners are
/// left out, so a conjunct-heavy word counts only its base letters.
fn letter_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\p{L}\p{N}_]").expect("letter pattern is valid"))
}

fn non_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w]").expect("non-word pattern is valid"))
}

/// Insertion-ordered key/value table. Lookups are by exact key; iteration
/// follows insertion order, which decides partial-match precedence.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
}

impl MappingTable {
    /// Inserts or overwrites. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.positions.get(&key) {
            Some(&position) => self.entries[position].1 = value,
            None => {
                self.positions.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.positions
            .get(key)
            .map(|&position| self.entries[position].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MappingTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::default();
        for (key, value) in iter {
            table.insert(key, value);
        }
        table
    }
}

#[derive(Debug, Clone)]
pub struct Transliterator {
    words: MappingTable,
    phrases: MappingTable,
}

impl Default for Transliterator {
    fn default() -> Self {
        Self::with_tables(
            WORD_MAPPINGS.iter().copied().collect(),
            PHRASE_MAPPINGS.iter().copied().collect(),
        )
    }
}

impl Transliterator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(words: MappingTable, phrases: MappingTable) -> Self {
        Self { words, phrases }
    }

    /// Rewrites a Latin-typed query into native script.
    ///
    /// Phrases are substituted first, then every whitespace token is looked up
    /// in the word table (punctuation stripped), falling back to the first
    /// table entry that contains the token or is contained in it. The rewrite
    /// is returned only when more than 30% of its characters are Sinhala;
    /// otherwise the query comes back verbatim.
    pub fn normalize(&self, query: &str) -> String {
        if query.is_empty() || is_native_script(query) {
            return query.to_string();
        }

        let mut lowered = query.to_lowercase();
        for (latin, native) in self.phrases.iter() {
            if lowered.contains(latin) {
                lowered = lowered.replace(latin, native);
            }
        }

        let translated = lowered
            .split_whitespace()
            .map(|token| self.translate_token(token))
            .collect::<Vec<_>>()
            .join(" ");

        if translation_score(query, &translated) > ACCEPT_THRESHOLD {
            info!(original = %query, translated = %translated, "normalized query");
            translated
        } else {
            query.to_string()
        }
    }

    fn translate_token(&self, token: &str) -> String {
        let cleaned = non_word_pattern().replace_all(token, "");

        if let Some(native) = self.words.get(&cleaned) {
            return native.to_string();
        }

        if let Some(native) = self.partial_match(&cleaned) {
            return native.to_string();
        }

        if cleaned.is_empty() {
            token.to_string()
        } else {
            cleaned.into_owned()
        }
    }

    fn partial_match(&self, token: &str) -> Option<&str> {
        if token.chars().count() <= PARTIAL_MATCH_MIN_CHARS {
            return None;
        }

        self.words
            .iter()
            .find(|(latin, _)| latin.contains(token) || token.contains(latin))
            .map(|(_, native)| native)
    }

    /// Adds or replaces a word mapping for the lifetime of this instance.
    pub fn add_mapping(&mut self, latin: &str, native: &str) {
        self.words.insert(latin.to_lowercase(), native);
        info!(latin = %latin, native = %native, "added custom mapping");
    }

    /// Native terms whose Latin key contains or starts with `partial`, at most five.
    pub fn suggest(&self, partial: &str) -> Vec<String> {
        let partial = partial.to_lowercase();
        self.words
            .iter()
            .filter(|(latin, _)| latin.contains(partial.as_str()) || latin.starts_with(&partial))
            .take(MAX_SUGGESTIONS)
            .map(|(_, native)| native.to_string())
            .collect()
    }

    pub fn common_terms(&self) -> MappingTable {
        self.words.clone()
    }
}

/// True when the Sinhala code points in `text` outnumber half of its
/// letters, digits and underscores. Combining signs count toward the Sinhala
/// side only, so mixed queries such as `ගිණුම් kohomada` read as native.
pub fn is_native_script(text: &str) -> bool {
    let total = letter_pattern().find_iter(text).count();
    if total == 0 {
        return false;
    }

    sinhala_char_count(text) as f64 / total as f64 > NATIVE_SCRIPT_RATIO
}

/// Share of Sinhala characters in `translated`; zero when nothing changed.
pub fn translation_score(original: &str, translated: &str) -> f64 {
    if original == translated {
        return 0.0;
    }

    let total = translated.chars().count();
    if total == 0 {
        return 0.0;
    }

    sinhala_char_count(translated) as f64 / total as f64
}

fn sinhala_char_count(text: &str) -> usize {
    text.chars().filter(|c| SINHALA_BLOCK.contains(c)).count()
}
