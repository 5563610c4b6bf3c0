//! Word, slot and intent vocabularies built from the training split.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SluError};

/// Padding token, always id 0 in input vocabularies.
pub const PAD: &str = "_PAD";
/// Out-of-vocabulary token.
pub const UNK: &str = "_UNK";

/// How lines of the source file are split into vocabulary entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VocabKind {
    /// Whitespace-separated tokens; reserves `_PAD` and `_UNK`.
    Sequence,
    /// One label per line; reserves `_UNK` only.
    Label,
}

impl VocabKind {
    fn reserved(self) -> &'static [&'static str] {
        match self {
            VocabKind::Sequence => &[PAD, UNK],
            VocabKind::Label => &[UNK],
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VocabFile {
    kind: VocabKind,
    tokens: Vec<String>,
}

/// Ordered token → id mapping. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VocabFile", into = "VocabFile")]
pub struct Vocabulary {
    kind: VocabKind,
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl TryFrom<VocabFile> for Vocabulary {
    type Error = String;

    fn try_from(file: VocabFile) -> std::result::Result<Self, Self::Error> {
        for (id, reserved) in file.kind.reserved().iter().enumerate() {
            match file.tokens.get(id) {
                Some(token) if token == reserved => {}
                Some(token) => return Err(format!("expected {reserved} at id {id}, found {token:?}")),
                None => return Err(format!("missing reserved token {reserved}")),
            }
        }
        Ok(Self::from_tokens(file.kind, file.tokens))
    }
}

impl From<Vocabulary> for VocabFile {
    fn from(vocab: Vocabulary) -> Self {
        VocabFile {
            kind: vocab.kind,
            tokens: vocab.tokens,
        }
    }
}

impl Vocabulary {
    /// Build from an explicit token list. Reserved tokens must already be in place.
    fn from_tokens(kind: VocabKind, tokens: Vec<String>) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self {
            kind,
            tokens,
            index,
        }
    }

    /// Count entries in `path` and keep at most `cutoff` of the most frequent.
    ///
    /// Ties are broken by first appearance, so ids are deterministic for a
    /// given file. Reserved tokens come first and do not count against
    /// `cutoff`.
    pub fn build<P: AsRef<Path>>(path: P, kind: VocabKind, cutoff: Option<usize>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SluError::io(path, e))?;
        let reader = BufReader::new(file);

        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut seen = 0usize;
        for line in reader.lines() {
            let line = line.map_err(|e| SluError::io(path, e))?;
            let entries: Vec<&str> = match kind {
                VocabKind::Sequence => line.split_whitespace().collect(),
                VocabKind::Label => {
                    let label = line.trim();
                    if label.is_empty() { vec![] } else { vec![label] }
                }
            };
            for entry in entries {
                let slot = counts.entry(entry.to_string()).or_insert((0, seen));
                slot.0 += 1;
                seen += 1;
            }
        }

        if counts.is_empty() {
            return Err(SluError::EmptyVocabulary(path.to_path_buf()));
        }

        let mut ranked: Vec<(String, (usize, usize))> = counts
            .into_iter()
            .filter(|(token, _)| !kind.reserved().contains(&token.as_str()))
            .collect();
        ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
        if let Some(cutoff) = cutoff {
            ranked.truncate(cutoff);
        }

        let tokens = kind
            .reserved()
            .iter()
            .map(|t| t.to_string())
            .chain(ranked.into_iter().map(|(t, _)| t))
            .collect();
        Ok(Self::from_tokens(kind, tokens))
    }

    /// Load a cached vocabulary, or build it from `source` and cache it.
    pub fn load_or_build<P: AsRef<Path>, Q: AsRef<Path>>(
        cache: P,
        source: Q,
        kind: VocabKind,
        cutoff: Option<usize>,
    ) -> Result<Self> {
        let cache = cache.as_ref();
        if cache.exists() {
            let vocab = Self::load(cache)?;
            tracing::debug!(path = %cache.display(), size = vocab.len(), "loaded cached vocabulary");
            return Ok(vocab);
        }

        let vocab = Self::build(source, kind, cutoff)?;
        vocab.save(cache)?;
        tracing::debug!(path = %cache.display(), size = vocab.len(), "built vocabulary");
        Ok(vocab)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SluError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| SluError::io(path, e))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SluError::io(path, e))?;
        let file: VocabFile = serde_json::from_str(&content)?;
        Self::try_from(file).map_err(|detail| SluError::InvalidVocabulary {
            path: path.to_path_buf(),
            detail,
        })
    }

    pub fn kind(&self) -> VocabKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Id used for tokens missing from the vocabulary.
    /// Reserved tokens sit at fixed ids, checked whenever a vocabulary is loaded.
    pub fn unk_id(&self) -> u32 {
        match self.kind {
            VocabKind::Sequence => 1,
            VocabKind::Label => 0,
        }
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.index.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn encode(&self, token: &str) -> u32 {
        self.id(token).unwrap_or_else(|| self.unk_id())
    }
}
