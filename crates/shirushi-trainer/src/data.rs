//! CoNLL-style data loading and prediction output.
//!
//! One token per line, whitespace-separated columns with the word first and
//! the gold tag second (extra columns are ignored); a blank line terminates
//! each sentence. Predictions are written in the same shape with the
//! predicted tag appended, so the files score with the usual tooling.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;

/// A single sentence: words and their gold tags.
#[derive(Debug, Clone)]
pub struct Sentence {
    pub words: Vec<String>,
    pub tags: Vec<String>,
}

impl Sentence {
    pub fn new(words: Vec<String>, tags: Vec<String>) -> Self {
        Self { words, tags }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Load a CoNLL-style file. A line with fewer than two columns is a fatal
/// data error; the engine has no partial-result semantics.
pub fn load_conll<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<Sentence>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut sentences = Vec::new();
    let mut current_words = Vec::new();
    let mut current_tags = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            if !current_words.is_empty() {
                sentences.push(Sentence::new(
                    std::mem::take(&mut current_words),
                    std::mem::take(&mut current_tags),
                ));
            }
            continue;
        }

        let mut fields = line.split_whitespace();
        let word = fields.next();
        let tag = fields.next();
        match (word, tag) {
            (Some(word), Some(tag)) => {
                current_words.push(word.to_string());
                current_tags.push(tag.to_string());
            }
            _ => anyhow::bail!(
                "malformed line {} in {}: expected at least word and tag columns",
                line_no + 1,
                path.display()
            ),
        }
    }

    // Don't forget the last sentence
    if !current_words.is_empty() {
        sentences.push(Sentence::new(current_words, current_tags));
    }

    Ok(sentences)
}

/// Write `<word> <gold-tag> <predicted-tag>` lines, blank line between
/// sentences. `predictions[i]` must align with `sentences[i]`.
pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    sentences: &[Sentence],
    predictions: &[Vec<String>],
) -> anyhow::Result<()> {
    let path = path.as_ref();
    anyhow::ensure!(
        sentences.len() == predictions.len(),
        "{} sentences but {} prediction sequences",
        sentences.len(),
        predictions.len()
    );

    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for (sentence, predicted) in sentences.iter().zip(predictions) {
        anyhow::ensure!(
            sentence.len() == predicted.len(),
            "sentence of {} tokens got {} predictions",
            sentence.len(),
            predicted.len()
        );
        for ((word, gold), pred) in sentence.words.iter().zip(&sentence.tags).zip(predicted) {
            writeln!(writer, "{word} {gold} {pred}")?;
        }
        writeln!(writer)?;
    }

    Ok(())
}
