//! Topic-exchange routing patterns.
//!
//! Routing keys are dot-separated words. In a binding pattern `*` matches
//! exactly one word and `#` matches zero or more words.

use crate::error::{BusError, BusResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Word(String),
    One,
    Any,
}

/// Parsed binding pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> BusResult<Self> {
        if pattern.is_empty() {
            return Err(BusError::InvalidPattern(pattern.to_string()));
        }

        let segments = pattern
            .split('.')
            .map(|word| match word {
                "*" => Segment::One,
                "#" => Segment::Any,
                w => Segment::Word(w.to_string()),
            })
            .collect();

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, routing_key: &str) -> bool {
        let words: Vec<&str> = routing_key.split('.').collect();
        match_from(&self.segments, &words)
    }
}

fn match_from(segments: &[Segment], words: &[&str]) -> bool {
    match segments.split_first() {
        None => words.is_empty(),
        Some((Segment::Any, rest)) => {
            (0..=words.len()).any(|skip| match_from(rest, &words[skip..]))
        }
        Some((Segment::One, rest)) => !words.is_empty() && match_from(rest, &words[1..]),
        Some((Segment::Word(w), rest)) => {
            words.first().is_some_and(|first| first == w) && match_from(rest, &words[1..])
        }
    }
}
