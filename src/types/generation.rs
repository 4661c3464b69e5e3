//! Generation outputs produced by text models.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use uuid::Uuid;

/// A single text generation for one prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    /// Provider-specific details (finish reason, logprobs, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_info: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Generation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generation_info: None,
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.generation_info
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }
}

/// An incremental piece of a generation, emitted while streaming.
///
/// Chunks concatenate with `+`; the text is appended and the info maps merged,
/// later keys winning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationChunk {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_info: Option<serde_json::Map<String, serde_json::Value>>,
}

impl GenerationChunk {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            generation_info: None,
        }
    }

    pub fn with_info(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.generation_info
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.into(), value);
        self
    }

    /// Concatenate an ordered sequence of chunks into one.
    pub fn concat<I: IntoIterator<Item = GenerationChunk>>(chunks: I) -> Option<GenerationChunk> {
        chunks.into_iter().reduce(|acc, c| acc + c)
    }
}

impl AddAssign for GenerationChunk {
    fn add_assign(&mut self, rhs: GenerationChunk) {
        self.text.push_str(&rhs.text);
        if let Some(theirs) = rhs.generation_info {
            self.generation_info
                .get_or_insert_with(serde_json::Map::new)
                .extend(theirs);
        }
    }
}

impl Add for GenerationChunk {
    type Output = GenerationChunk;

    fn add(mut self, rhs: GenerationChunk) -> GenerationChunk {
        self += rhs;
        self
    }
}

impl From<GenerationChunk> for Generation {
    fn from(chunk: GenerationChunk) -> Self {
        Generation {
            text: chunk.text,
            generation_info: chunk.generation_info,
        }
    }
}

impl From<Generation> for GenerationChunk {
    fn from(g: Generation) -> Self {
        GenerationChunk {
            text: g.text,
            generation_info: g.generation_info,
        }
    }
}

/// Identifies the run created for one prompt of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
}

/// The result of a batch generation.
///
/// `generations[i]` holds the candidates produced for prompt `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmResult {
    pub generations: Vec<Vec<Generation>>,
    /// Model-level output such as token usage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_output: Option<serde_json::Value>,
    /// One entry per prompt, filled in by the dispatcher.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run: Vec<RunInfo>,
}

impl LlmResult {
    pub fn new(generations: Vec<Vec<Generation>>) -> Self {
        Self {
            generations,
            llm_output: None,
            run: Vec::new(),
        }
    }

    /// One single-candidate generation per text, in order.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .map(|t| vec![Generation::new(t)])
                .collect(),
        )
    }

    pub fn with_llm_output(mut self, output: serde_json::Value) -> Self {
        self.llm_output = Some(output);
        self
    }

    /// The first candidate's text for every prompt.
    pub fn first_texts(&self) -> Vec<String> {
        self.generations
            .iter()
            .map(|g| g.first().map(|x| x.text.clone()).unwrap_or_default())
            .collect()
    }

    /// Split into one result per prompt, each carrying the shared `llm_output`.
    pub fn flatten(&self) -> Vec<LlmResult> {
        self.generations
            .iter()
            .map(|g| LlmResult {
                generations: vec![g.clone()],
                llm_output: self.llm_output.clone(),
                run: Vec::new(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_concat_joins_text_in_order() {
        let chunks = vec![
            GenerationChunk::new("a"),
            GenerationChunk::new("b"),
            GenerationChunk::new("c"),
        ];
        let joined = GenerationChunk::concat(chunks).unwrap();
        assert_eq!(joined.text, "abc");
        assert!(GenerationChunk::concat(Vec::new()).is_none());
    }

    #[test]
    fn test_chunk_info_merges_later_wins() {
        let a = GenerationChunk::new("x").with_info("finish_reason", json!(null));
        let b = GenerationChunk::new("y").with_info("finish_reason", json!("stop"));
        let merged = a + b;
        let info = merged.generation_info.unwrap();
        assert_eq!(info["finish_reason"], json!("stop"));
    }

    #[test]
    fn test_first_texts_and_flatten() {
        let result = LlmResult::from_texts(["foo", "bar"]).with_llm_output(json!({"tokens": 2}));
        assert_eq!(result.first_texts(), vec!["foo", "bar"]);
        let flat = result.flatten();
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[1].generations[0][0].text, "bar");
        assert_eq!(flat[1].llm_output, Some(json!({"tokens": 2})));
    }
}
