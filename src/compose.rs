//! Answer composition: fold retrieved chunks through the generator.
//!
//! Uses a refine strategy: the first chunk produces a draft answer and
//! each further chunk gets one generation call that may extend or correct
//! the draft. Presenting one chunk per call keeps each prompt small at the
//! cost of one generation round trip per chunk, which lets the evidence
//! exceed what fits in a single context window.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::ServiceError;
use crate::index::ScoredChunk;
use crate::llm::Generator;

/// Answer returned when retrieval produced no evidence. Absence of
/// evidence is not an error condition.
pub const NO_EVIDENCE_ANSWER: &str = "No relevant information was found for this question.";

/// The composed answer plus provenance: the deduplicated source ids and
/// the verbatim chunk contents the generator saw.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub answer: String,
    pub sources: Vec<String>,
    pub source_documents: Vec<String>,
}

pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    /// Compose an answer from ranked retrieval results.
    ///
    /// The refine loop exits early once a round returns the same draft as
    /// the previous one. Generator errors propagate as
    /// `GenerationFailure`; an empty retrieval yields a well-formed
    /// low-confidence record instead.
    pub async fn compose(
        &self,
        query: &str,
        retrieval: &[ScoredChunk],
    ) -> Result<AnswerRecord, ServiceError> {
        if retrieval.is_empty() {
            return Ok(AnswerRecord {
                answer: NO_EVIDENCE_ANSWER.to_string(),
                sources: Vec::new(),
                source_documents: Vec::new(),
            });
        }

        let mut draft = String::new();
        for (round, scored) in retrieval.iter().enumerate() {
            let prompt = if round == 0 {
                initial_prompt(query, &scored.chunk.content)
            } else {
                refine_prompt(query, &draft, &scored.chunk.content)
            };

            let next = self.generator.complete(&prompt).await?.trim().to_string();
            if round > 0 && next == draft {
                tracing::debug!("draft unchanged after round {}, stopping refine loop", round);
                break;
            }
            if !next.is_empty() {
                draft = next;
            }
        }

        let mut sources = Vec::new();
        for scored in retrieval {
            if !sources.contains(&scored.chunk.source_id) {
                sources.push(scored.chunk.source_id.clone());
            }
        }
        let source_documents = retrieval
            .iter()
            .map(|scored| scored.chunk.content.clone())
            .collect();

        // A generator that produced nothing useful in any round leaves the
        // draft empty; report low confidence rather than a blank answer.
        let answer = if draft.is_empty() {
            NO_EVIDENCE_ANSWER.to_string()
        } else {
            draft
        };

        Ok(AnswerRecord {
            answer,
            sources,
            source_documents,
        })
    }
}

fn initial_prompt(query: &str, context: &str) -> String {
    format!(
        "Context:\n{context}\n\nQuestion: {query}\n\n\
         Answer the question using only the context above. \
         If the context does not contain the answer, say so.\nAnswer:"
    )
}

fn refine_prompt(query: &str, draft: &str, context: &str) -> String {
    format!(
        "Existing answer:\n{draft}\n\nAdditional context:\n{context}\n\n\
         Question: {query}\n\n\
         Refine the existing answer using the additional context. \
         Return the existing answer unchanged if the context adds nothing.\nAnswer:"
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::chunking::Chunk;

    /// Returns scripted responses in order and counts calls.
    struct ScriptedGenerator {
        responses: Mutex<Vec<String>>,
        calls: Mutex<usize>,
    }

    impl ScriptedGenerator {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: Mutex::new(responses.iter().rev().map(|s| s.to_string()).collect()),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ServiceError::generation("script exhausted"))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn complete(&self, _prompt: &str) -> Result<String, ServiceError> {
            Err(ServiceError::generation("model unavailable"))
        }
    }

    fn scored(source: &str, seq: usize, content: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                content: content.to_string(),
                source_id: source.to_string(),
                sequence_index: seq,
            },
            score: 0.9,
        }
    }

    #[tokio::test]
    async fn empty_retrieval_yields_low_confidence_record() {
        let composer = AnswerComposer::new(Arc::new(ScriptedGenerator::new(&[])));
        let record = composer.compose("anything?", &[]).await.unwrap();

        assert_eq!(record.answer, NO_EVIDENCE_ANSWER);
        assert!(record.sources.is_empty());
        assert!(record.source_documents.is_empty());
    }

    #[tokio::test]
    async fn refine_folds_every_chunk() {
        let generator = Arc::new(ScriptedGenerator::new(&["draft one", "draft two"]));
        let composer = AnswerComposer::new(generator.clone());

        let retrieval = vec![
            scored("https://a.example", 0, "first evidence"),
            scored("https://b.example", 0, "second evidence"),
        ];
        let record = composer.compose("what?", &retrieval).await.unwrap();

        assert_eq!(record.answer, "draft two");
        assert_eq!(generator.call_count(), 2);
        assert_eq!(
            record.sources,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(
            record.source_documents,
            vec!["first evidence".to_string(), "second evidence".to_string()]
        );
    }

    #[tokio::test]
    async fn unchanged_draft_stops_the_loop_early() {
        let generator = Arc::new(ScriptedGenerator::new(&["answer", "answer", "never used"]));
        let composer = AnswerComposer::new(generator.clone());

        let retrieval = vec![
            scored("a", 0, "one"),
            scored("a", 1, "two"),
            scored("a", 2, "three"),
        ];
        let record = composer.compose("q", &retrieval).await.unwrap();

        assert_eq!(record.answer, "answer");
        assert_eq!(generator.call_count(), 2);
        // Provenance still reports everything that was retrieved.
        assert_eq!(record.source_documents.len(), 3);
    }

    #[tokio::test]
    async fn sources_are_deduplicated_in_order() {
        let generator = Arc::new(ScriptedGenerator::new(&["a", "b", "c"]));
        let composer = AnswerComposer::new(generator);

        let retrieval = vec![
            scored("https://same.example", 0, "one"),
            scored("https://same.example", 3, "two"),
            scored("https://other.example", 1, "three"),
        ];
        let record = composer.compose("q", &retrieval).await.unwrap();

        assert_eq!(
            record.sources,
            vec![
                "https://same.example".to_string(),
                "https://other.example".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn all_blank_drafts_fall_back_to_low_confidence() {
        let generator = Arc::new(ScriptedGenerator::new(&["", "   "]));
        let composer = AnswerComposer::new(generator);

        let retrieval = vec![
            scored("https://a.example", 0, "one"),
            scored("https://a.example", 1, "two"),
        ];
        let record = composer.compose("q", &retrieval).await.unwrap();

        assert_eq!(record.answer, NO_EVIDENCE_ANSWER);
        // Provenance still reflects what the generator was shown.
        assert_eq!(record.sources, vec!["https://a.example".to_string()]);
        assert_eq!(record.source_documents.len(), 2);
    }

    #[tokio::test]
    async fn generator_failure_propagates() {
        let composer = AnswerComposer::new(Arc::new(FailingGenerator));
        let err = composer
            .compose("q", &[scored("a", 0, "evidence")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::GenerationFailure(_)));
    }
}
