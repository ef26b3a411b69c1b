use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------
// Evidence references: addressable pointers into external stores
// ---------------------------------------------------------------------

/// Category of an evidence unit. Stores use this to route the lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Chunk,
    Frame,
    Timestamp,
    Request,
    Row,
    Other(String),
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceKind::Chunk => write!(f, "chunk"),
            EvidenceKind::Frame => write!(f, "frame"),
            EvidenceKind::Timestamp => write!(f, "timestamp"),
            EvidenceKind::Request => write!(f, "request"),
            EvidenceKind::Row => write!(f, "row"),
            EvidenceKind::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Optional position inside an addressed unit. The schema depends on the kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Locator {
    ByteSpan { start: u64, end: u64 },
    BoundingBox { x: f32, y: f32, width: f32, height: f32 },
    RowRange { first: u64, last: u64 },
    TimePosition { offset_ms: u64 },
}

/// Pointer into an external evidence store.
///
/// `(kind, store, id)` must resolve to exactly one unit in `store`.
/// When `content_hash` is present the store's current hash must match it
/// byte for byte; when absent, the current version is trusted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub kind: EvidenceKind,
    pub store: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<Locator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<Vec<u8>>,
}

impl EvidenceRef {
    pub fn new(kind: EvidenceKind, store: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            store: store.into(),
            id: id.into(),
            locator: None,
            content_hash: None,
        }
    }

    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn with_hash(mut self, hash: impl Into<Vec<u8>>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Verification identity. The locator is not part of it: two refs into
    /// different spans of the same unit verify identically.
    pub fn key(&self) -> EvidenceKey {
        EvidenceKey {
            kind: self.kind.clone(),
            store: self.store.clone(),
            id: self.id.clone(),
            content_hash: self.content_hash.clone(),
        }
    }
}

impl fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.store, self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvidenceKey {
    pub kind: EvidenceKind,
    pub store: String,
    pub id: String,
    pub content_hash: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------

/// A vector in a named embedding space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRef {
    pub model_id: String,
    pub vector: Vec<f32>,
}

impl EmbeddingRef {
    pub fn new(model_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            model_id: model_id.into(),
            vector,
        }
    }

    /// Embeddings from different models (or of different length) are not comparable.
    pub fn is_comparable(&self, other: &EmbeddingRef) -> bool {
        self.model_id == other.model_id && self.vector.len() == other.vector.len()
    }

    /// Cosine similarity in [-1, 1], or `None` when not comparable or either
    /// vector has zero norm.
    pub fn cosine_similarity(&self, other: &EmbeddingRef) -> Option<f32> {
        if !self.is_comparable(other) || self.vector.is_empty() {
            return None;
        }

        let mut dot = 0.0_f32;
        let mut na = 0.0_f32;
        let mut nb = 0.0_f32;
        for (a, b) in self.vector.iter().zip(&other.vector) {
            dot += a * b;
            na += a * a;
            nb += b * b;
        }

        let denom = na.sqrt() * nb.sqrt();
        if denom == 0.0 || !denom.is_finite() {
            return None;
        }
        Some((dot / denom).clamp(-1.0, 1.0))
    }
}
