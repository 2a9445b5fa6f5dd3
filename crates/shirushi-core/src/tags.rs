//! # Tag Dictionaries
//!
//! Maps tag strings to dense indices for one labeling task. Every dictionary
//! carries two reserved pseudo-tags, START and STOP, which never appear in
//! gold data but always participate in transition scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShirushiError};

/// Bidirectional tag/index mapping for one task, frozen after construction.
///
/// Real tags occupy indices `0..real_tag_count()` in first-seen order; the
/// START and STOP pseudo-tags take the next two indices. The transition
/// matrix of the owning CRF head is sized by [`TagDictionary::tag_count`],
/// which includes both pseudo-tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagDictionary {
    tags: Vec<String>,
    index: HashMap<String, usize>,
}

impl TagDictionary {
    /// Build a dictionary from gold tags, deduplicating in first-seen order.
    ///
    /// Fails with [`ShirushiError::EmptyTagSet`] when no tags are supplied:
    /// an empty dictionary only arises from empty training data and is an
    /// internal consistency failure, not a condition to recover from.
    pub fn from_tags<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dict = Self {
            tags: Vec::new(),
            index: HashMap::new(),
        };
        for tag in tags {
            let tag = tag.into();
            if !dict.index.contains_key(&tag) {
                dict.index.insert(tag.clone(), dict.tags.len());
                dict.tags.push(tag);
            }
        }
        if dict.tags.is_empty() {
            return Err(ShirushiError::EmptyTagSet);
        }
        Ok(dict)
    }

    /// Index of a real tag string.
    pub fn tag_to_index(&self, tag: &str) -> Result<usize> {
        self.index
            .get(tag)
            .copied()
            .ok_or_else(|| ShirushiError::UnknownTag { tag: tag.into() })
    }

    /// Tag string for a real tag index. START/STOP have no string form.
    pub fn index_to_tag(&self, index: usize) -> Option<&str> {
        self.tags.get(index).map(String::as_str)
    }

    /// Number of real tags, excluding START/STOP.
    pub fn real_tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Total tag count including the START and STOP pseudo-tags. This is the
    /// dimension of the owning head's transition matrix.
    pub fn tag_count(&self) -> usize {
        self.tags.len() + 2
    }

    /// Index of the START pseudo-tag.
    pub fn start_index(&self) -> usize {
        self.tags.len()
    }

    /// Index of the STOP pseudo-tag.
    pub fn stop_index(&self) -> usize {
        self.tags.len() + 1
    }

    /// Dense array of all real tag strings, indexed by tag index.
    pub fn tag_strings(&self) -> &[String] {
        &self.tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip() {
        let dict = TagDictionary::from_tags(["O", "B-PER", "I-PER", "B-LOC"]).unwrap();
        for tag in ["O", "B-PER", "I-PER", "B-LOC"] {
            let idx = dict.tag_to_index(tag).unwrap();
            assert_eq!(dict.index_to_tag(idx), Some(tag));
        }
    }

    #[test]
    fn dense_tag_strings() {
        let dict = TagDictionary::from_tags(["NOUN", "VERB", "ADJ"]).unwrap();
        let strings = dict.tag_strings();
        assert_eq!(strings.len(), dict.real_tag_count());
        for (i, tag) in strings.iter().enumerate() {
            assert_eq!(dict.tag_to_index(tag).unwrap(), i);
        }
    }

    #[test]
    fn duplicates_keep_first_seen_order() {
        let dict = TagDictionary::from_tags(["O", "B-PER", "O", "B-PER", "I-PER"]).unwrap();
        assert_eq!(dict.real_tag_count(), 3);
        assert_eq!(dict.tag_to_index("O").unwrap(), 0);
        assert_eq!(dict.tag_to_index("B-PER").unwrap(), 1);
        assert_eq!(dict.tag_to_index("I-PER").unwrap(), 2);
    }

    #[test]
    fn start_stop_are_distinct_and_reserved() {
        let dict = TagDictionary::from_tags(["O", "X"]).unwrap();
        assert_eq!(dict.start_index(), 2);
        assert_eq!(dict.stop_index(), 3);
        assert_eq!(dict.tag_count(), 4);
        assert_ne!(dict.start_index(), dict.stop_index());
        assert!(dict.index_to_tag(dict.start_index()).is_none());
        assert!(dict.index_to_tag(dict.stop_index()).is_none());
    }

    #[test]
    fn empty_tag_set_is_rejected() {
        let tags: [&str; 0] = [];
        assert!(TagDictionary::from_tags(tags).is_err());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let dict = TagDictionary::from_tags(["O"]).unwrap();
        assert!(dict.tag_to_index("B-ORG").is_err());
    }
}
