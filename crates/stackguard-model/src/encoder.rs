//! TF-IDF feature encoder.
//!
//! Maps raw text to a fixed-dimension [`SparseVector`] using a vocabulary and
//! inverse-document-frequency weights learned at training time. The transform
//! mirrors the vectorizer the ensemble was trained against:
//!
//! - optional lowercasing
//! - tokens are runs of two or more word characters (`\b\w\w+\b`)
//! - raw term counts (or `1 + ln(tf)` with `sublinear_tf`)
//! - smoothed idf: `ln((1 + n) / (1 + df)) + 1`
//! - L2 row normalisation
//!
//! Unknown tokens contribute nothing.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use stackguard_core::{Result, StackGuardError};

use crate::artifact::{self, FORMAT_VERSION};
use crate::sparse::SparseVector;

/// Token pattern shared by fitting and encoding.
const TOKEN_PATTERN: &str = r"\b\w\w+\b";

/// Options used when learning a vocabulary.
#[derive(Debug, Clone)]
pub struct TfidfConfig {
    /// Lowercase text before tokenizing.
    pub lowercase: bool,
    /// Replace raw counts with `1 + ln(tf)`.
    pub sublinear_tf: bool,
    /// Minimum number of documents a term must appear in.
    pub min_df: usize,
    /// Terms appearing in more than this fraction of documents are dropped.
    pub max_df_ratio: f64,
    /// Keep only the most frequent terms across the corpus.
    pub max_features: Option<usize>,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            lowercase: true,
            sublinear_tf: false,
            min_df: 1,
            max_df_ratio: 1.0,
            max_features: None,
        }
    }
}

/// Serialized form of a trained encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncoderArtifact {
    format_version: u32,
    lowercase: bool,
    #[serde(default)]
    sublinear_tf: bool,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f32>,
}

/// Trained, immutable TF-IDF encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EncoderArtifact", into = "EncoderArtifact")]
pub struct TfidfEncoder {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    lowercase: bool,
    sublinear_tf: bool,
    token_regex: Regex,
}

fn token_regex() -> Result<Regex> {
    Regex::new(TOKEN_PATTERN)
        .map_err(|e| StackGuardError::Config(format!("Failed to compile token pattern: {e}")))
}

impl TfidfEncoder {
    /// Build an encoder from an explicit vocabulary and idf table.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::MalformedModel`] if the idf table does not
    /// cover the vocabulary or column indices are duplicated / out of range.
    pub fn from_parts(
        vocabulary: HashMap<String, usize>,
        idf: Vec<f32>,
        lowercase: bool,
        sublinear_tf: bool,
    ) -> Result<Self> {
        if vocabulary.len() != idf.len() {
            return Err(StackGuardError::MalformedModel(format!(
                "encoder vocabulary has {} terms but idf has {} weights",
                vocabulary.len(),
                idf.len()
            )));
        }
        let mut seen = vec![false; idf.len()];
        for (term, &index) in &vocabulary {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(StackGuardError::MalformedModel(format!(
                        "encoder column {index} assigned twice (term '{term}')"
                    )))
                }
                None => {
                    return Err(StackGuardError::MalformedModel(format!(
                        "encoder column {index} for term '{term}' exceeds dimension {}",
                        idf.len()
                    )))
                }
            }
        }
        Ok(Self {
            vocabulary,
            idf,
            lowercase,
            sublinear_tf,
            token_regex: token_regex()?,
        })
    }

    /// Learn a vocabulary and idf weights from a corpus.
    ///
    /// Column indices are assigned in alphabetical term order.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::InvalidInput`] for an empty corpus or when
    /// no term survives the document-frequency filters.
    pub fn fit<S: AsRef<str>>(corpus: &[S], config: &TfidfConfig) -> Result<Self> {
        if corpus.is_empty() {
            return Err(StackGuardError::InvalidInput(
                "cannot fit encoder on an empty corpus".to_string(),
            ));
        }
        let regex = token_regex()?;

        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        let mut term_freq: BTreeMap<String, usize> = BTreeMap::new();
        for doc in corpus {
            let text = normalise_case(doc.as_ref(), config.lowercase);
            let mut seen_in_doc: BTreeSet<&str> = BTreeSet::new();
            for token in regex.find_iter(&text).map(|m| m.as_str()) {
                *term_freq.entry(token.to_string()).or_insert(0) += 1;
                if seen_in_doc.insert(token) {
                    *doc_freq.entry(token.to_string()).or_insert(0) += 1;
                }
            }
        }

        let n_docs = corpus.len();
        let mut terms: Vec<(String, usize)> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= config.min_df)
            .filter(|(_, df)| (*df as f64 / n_docs as f64) <= config.max_df_ratio)
            .collect();

        if let Some(limit) = config.max_features {
            terms.sort_by(|(a, _), (b, _)| {
                let fa = term_freq.get(a).copied().unwrap_or(0);
                let fb = term_freq.get(b).copied().unwrap_or(0);
                fb.cmp(&fa).then_with(|| a.cmp(b))
            });
            terms.truncate(limit);
            terms.sort_by(|(a, _), (b, _)| a.cmp(b));
        }

        if terms.is_empty() {
            return Err(StackGuardError::InvalidInput(
                "no terms remain after document-frequency filtering".to_string(),
            ));
        }

        let n = n_docs as f64;
        let mut vocabulary = HashMap::with_capacity(terms.len());
        let mut idf = Vec::with_capacity(terms.len());
        for (index, (term, df)) in terms.into_iter().enumerate() {
            idf.push((((1.0 + n) / (1.0 + df as f64)).ln() + 1.0) as f32);
            vocabulary.insert(term, index);
        }

        tracing::debug!(
            documents = n_docs,
            vocabulary_size = idf.len(),
            "Fitted TF-IDF encoder"
        );

        Ok(Self {
            vocabulary,
            idf,
            lowercase: config.lowercase,
            sublinear_tf: config.sublinear_tf,
            token_regex: regex,
        })
    }

    /// Load an encoder artifact from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StackGuardError::ArtifactLoad`] for unreadable or invalid
    /// files.
    pub fn load(path: &Path) -> Result<Self> {
        let encoder: Self = artifact::load_json(path)?;
        tracing::info!(
            path = %path.display(),
            vocabulary_size = encoder.dimension(),
            "Loaded feature encoder"
        );
        Ok(encoder)
    }

    /// Write the encoder artifact to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        artifact::save_json(self, path)
    }

    /// Encode `text` into a normalised sparse vector of [`Self::dimension`].
    pub fn encode(&self, text: &str) -> SparseVector {
        let text = normalise_case(text, self.lowercase);

        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for token in self.token_regex.find_iter(&text) {
            if let Some(&index) = self.vocabulary.get(token.as_str()) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(usize, f32)> = counts
            .into_iter()
            .map(|(index, tf)| {
                let tf = if self.sublinear_tf { 1.0 + tf.ln() } else { tf };
                (index, tf * self.idf[index])
            })
            .collect();

        let norm = entries.iter().map(|(_, v)| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut entries {
                *v /= norm;
            }
        }

        // BTreeMap keys: unique, ascending, and below `dimension()` by
        // construction of the vocabulary.
        SparseVector::from_sorted(self.dimension(), entries)
    }

    /// Encode a batch of texts.
    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<SparseVector> {
        texts.iter().map(|t| self.encode(t.as_ref())).collect()
    }

    /// Width of every encoded vector.
    pub fn dimension(&self) -> usize {
        self.idf.len()
    }

    /// Column index of `term`, if it is in the vocabulary.
    pub fn column(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    /// Learned idf weight for a column.
    pub fn idf(&self, column: usize) -> Option<f32> {
        self.idf.get(column).copied()
    }
}

fn normalise_case(text: &str, lowercase: bool) -> std::borrow::Cow<'_, str> {
    if lowercase {
        std::borrow::Cow::Owned(text.to_lowercase())
    } else {
        std::borrow::Cow::Borrowed(text)
    }
}

impl TryFrom<EncoderArtifact> for TfidfEncoder {
    type Error = StackGuardError;

    fn try_from(artifact: EncoderArtifact) -> Result<Self> {
        if artifact.format_version != FORMAT_VERSION {
            return Err(StackGuardError::MalformedModel(format!(
                "unsupported encoder format version {} (expected {FORMAT_VERSION})",
                artifact.format_version
            )));
        }
        Self::from_parts(
            artifact.vocabulary.into_iter().collect(),
            artifact.idf,
            artifact.lowercase,
            artifact.sublinear_tf,
        )
    }
}

impl From<TfidfEncoder> for EncoderArtifact {
    fn from(encoder: TfidfEncoder) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            lowercase: encoder.lowercase,
            sublinear_tf: encoder.sublinear_tf,
            vocabulary: encoder.vocabulary.into_iter().collect(),
            idf: encoder.idf,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
