//! Streaming batch source over the three aligned files of a data split.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::iter::Peekable;
use std::path::{Path, PathBuf};

use crate::error::{Result, SluError};
use crate::vocab::{VocabKind, Vocabulary};

/// Input, slot and intent vocabularies of one dataset.
#[derive(Debug, Clone)]
pub struct Vocabularies {
    pub input: Vocabulary,
    pub slot: Vocabulary,
    pub intent: Vocabulary,
}

impl Vocabularies {
    /// Build (or load from `cache_dir`) all three vocabularies from a training split.
    ///
    /// Only the input vocabulary honours `cutoff`.
    pub fn load_or_build(
        cache_dir: &Path,
        dataset: &str,
        train: &SplitPaths,
        cutoff: usize,
    ) -> Result<Self> {
        let input = Vocabulary::load_or_build(
            cache_dir.join(format!("{}-data-{}.json", dataset, cutoff)),
            &train.input,
            VocabKind::Sequence,
            Some(cutoff),
        )?;
        let slot = Vocabulary::load_or_build(
            cache_dir.join(format!("{}-slot.json", dataset)),
            &train.slot,
            VocabKind::Sequence,
            None,
        )?;
        let intent = Vocabulary::load_or_build(
            cache_dir.join(format!("{}-intent.json", dataset)),
            &train.intent,
            VocabKind::Label,
            None,
        )?;
        Ok(Self {
            input,
            slot,
            intent,
        })
    }
}

/// Paths of the token, slot and intent files of one split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPaths {
    pub input: PathBuf,
    pub slot: PathBuf,
    pub intent: PathBuf,
}

impl SplitPaths {
    pub fn new(dir: impl AsRef<Path>, input_file: &str, slot_file: &str, intent_file: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            input: dir.join(input_file),
            slot: dir.join(slot_file),
            intent: dir.join(intent_file),
        }
    }
}

/// A single encoded utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub token_ids: Vec<u32>,
    pub slot_ids: Vec<u32>,
    pub intent: u32,
}

impl Example {
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// A group of examples drawn from one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    pub examples: Vec<Example>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.examples.iter().map(Example::len).collect()
    }

    pub fn max_len(&self) -> usize {
        self.examples.iter().map(Example::len).max().unwrap_or(0)
    }

    pub fn intents(&self) -> Vec<u32> {
        self.examples.iter().map(|e| e.intent).collect()
    }

    /// Token ids right-padded with `pad_id`, row-major `[batch, max_len]`.
    pub fn padded_ids(&self, pad_id: u32) -> (Vec<u32>, usize) {
        let max_len = self.max_len();
        let mut ids = Vec::with_capacity(self.len() * max_len);
        for example in &self.examples {
            ids.extend_from_slice(&example.token_ids);
            ids.extend(std::iter::repeat_n(pad_id, max_len - example.len()));
        }
        (ids, max_len)
    }
}

type LineIter = Peekable<Lines<BufReader<File>>>;

fn open_lines(path: &Path) -> Result<LineIter> {
    let file = File::open(path).map_err(|e| SluError::io(path, e))?;
    Ok(BufReader::new(file).lines().peekable())
}

/// Reads aligned `seq.in` / `seq.out` / `label` files one batch at a time.
///
/// `is_end` turns true on the batch that consumed the last example, so a
/// file of N lines read with batch size B yields `ceil(N / B)` batches.
/// Dropping the processor closes the files.
pub struct DataProcessor<'v> {
    paths: SplitPaths,
    inputs: LineIter,
    slots: LineIter,
    intents: LineIter,
    vocabs: &'v Vocabularies,
    line: usize,
    end: bool,
}

impl<'v> DataProcessor<'v> {
    pub fn open(paths: &SplitPaths, vocabs: &'v Vocabularies) -> Result<Self> {
        let inputs = open_lines(&paths.input)?;
        let slots = open_lines(&paths.slot)?;
        let intents = open_lines(&paths.intent)?;
        let end = false;
        let mut processor = Self {
            paths: paths.clone(),
            inputs,
            slots,
            intents,
            vocabs,
            line: 0,
            end,
        };
        processor.end = processor.inputs.peek().is_none();
        Ok(processor)
    }

    /// True once every example of the split has been handed out.
    pub fn is_end(&self) -> bool {
        self.end
    }

    /// Explicitly release the underlying file handles.
    pub fn close(self) {}

    /// Fetch up to `batch_size` examples.
    pub fn get_batch(&mut self, batch_size: usize) -> Result<Batch> {
        let mut batch = Batch {
            examples: Vec::with_capacity(batch_size),
        };
        while batch.len() < batch_size {
            match self.next_example()? {
                Some(example) => batch.examples.push(example),
                None => break,
            }
        }
        self.end = self.inputs.peek().is_none();
        if self.end && (self.slots.peek().is_some() || self.intents.peek().is_some()) {
            return Err(SluError::Misaligned {
                line: self.line + 1,
                detail: format!("{} ended before its slot or intent file", self.paths.input.display()),
            });
        }
        Ok(batch)
    }

    fn next_example(&mut self) -> Result<Option<Example>> {
        let Some(input) = self.inputs.next() else {
            return Ok(None);
        };
        self.line += 1;
        let input = input.map_err(|e| SluError::io(&self.paths.input, e))?;

        let slot = match self.slots.next() {
            Some(line) => line.map_err(|e| SluError::io(&self.paths.slot, e))?,
            None => return Err(self.misaligned(&self.paths.slot)),
        };
        let intent = match self.intents.next() {
            Some(line) => line.map_err(|e| SluError::io(&self.paths.intent, e))?,
            None => return Err(self.misaligned(&self.paths.intent)),
        };

        let mut token_ids: Vec<u32> = input
            .split_whitespace()
            .map(|t| self.vocabs.input.encode(t))
            .collect();
        // An empty utterance is kept as one padding position.
        if token_ids.is_empty() {
            token_ids.push(self.vocabs.input.id(crate::vocab::PAD).unwrap_or(0));
        }
        let slot_ids = slot
            .split_whitespace()
            .map(|t| self.vocabs.slot.encode(t))
            .collect();
        let intent = self.vocabs.intent.encode(intent.trim());

        Ok(Some(Example {
            token_ids,
            slot_ids,
            intent,
        }))
    }

    fn misaligned(&self, path: &Path) -> SluError {
        SluError::Misaligned {
            line: self.line,
            detail: format!("{} ended early", path.display()),
        }
    }
}
