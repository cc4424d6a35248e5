//! Report generation from a transcript
//!
//! Long transcripts don't fit a prompt whole, so the generator segments the
//! transcript into paragraphs, embeds them, ranks the segments against a
//! small set of clinical queries by cosine similarity, and composes a prompt
//! from the top-ranked excerpts for the chat collaborator.

use std::sync::Arc;

use super::{ChatClient, EmbeddingClient, ServiceError};

const SYMPTOMS_QUERY: &str = "patient symptoms and complaints";
const TREATMENT_QUERY: &str = "treatment plan";
const SYMPTOMS_SEGMENTS: usize = 3;
const TREATMENT_SEGMENTS: usize = 2;

const SYSTEM_PROMPT: &str = "You are a medical assistant analyzing a doctor-patient conversation.\n\
Your task is to create a comprehensive medical report based on the transcript provided.\n\
Be thorough, specific, and medical in your analysis.";

/// Composes reports from transcripts via embedding-ranked excerpts
pub struct ReportGenerator {
    embeddings: Arc<dyn EmbeddingClient>,
    chat: Arc<dyn ChatClient>,
}

impl ReportGenerator {
    pub fn new(embeddings: Arc<dyn EmbeddingClient>, chat: Arc<dyn ChatClient>) -> Self {
        Self { embeddings, chat }
    }

    /// Generate a report for `transcript`
    pub async fn generate(&self, transcript: &str) -> Result<String, ServiceError> {
        let paragraphs = split_paragraphs(transcript);
        if paragraphs.is_empty() {
            return Err(ServiceError::EmptyInput(
                "transcript has no content to report on".to_string(),
            ));
        }

        tracing::debug!(paragraphs = paragraphs.len(), "Embedding transcript segments");
        let embeddings = self.embeddings.embed(&paragraphs).await?;

        let symptoms = self
            .top_segments(&paragraphs, &embeddings, SYMPTOMS_QUERY, SYMPTOMS_SEGMENTS)
            .await?;
        let treatment = self
            .top_segments(&paragraphs, &embeddings, TREATMENT_QUERY, TREATMENT_SEGMENTS)
            .await?;

        let user_prompt = compose_user_prompt(&symptoms, &treatment);
        let report = self.chat.complete(SYSTEM_PROMPT, &user_prompt).await?;

        tracing::info!(chars = report.len(), "Generated report");
        Ok(report)
    }

    /// Rank paragraphs against `query` and return the `count` most similar
    async fn top_segments(
        &self,
        paragraphs: &[String],
        embeddings: &[Vec<f32>],
        query: &str,
        count: usize,
    ) -> Result<Vec<String>, ServiceError> {
        let query_embedding = self
            .embeddings
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Parse("query embedding missing".to_string()))?;

        let mut ranked: Vec<(usize, f32)> = embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(&query_embedding, e)))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(ranked
            .into_iter()
            .take(count)
            .map(|(i, _)| paragraphs[i].clone())
            .collect())
    }
}

/// Split a transcript on blank-line boundaries, dropping empty segments
pub fn split_paragraphs(transcript: &str) -> Vec<String> {
    transcript
        .split("\n\n")
        .flat_map(|block| {
            // Tolerate whitespace-only separator lines
            block.split("\r\n\r\n")
        })
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cosine similarity of two equal-length vectors; 0.0 for degenerate input
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    dot / denom
}

fn compose_user_prompt(symptoms: &[String], treatment: &[String]) -> String {
    let quote = |segments: &[String]| {
        segments
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        "Please analyze this patient transcript and create a detailed medical report.\n\
Here are the most relevant parts of the transcript:\n\n\
PATIENT SYMPTOMS:\n{}\n\n\
TREATMENT PLAN:\n{}\n\n\
Your report should include:\n\
1. Key complaints from the patient\n\
2. Possible diagnosis, with clear reasoning\n\
3. Recommended tests, if applicable\n\
4. Treatment suggestions\n\
5. Any notable items for follow-up",
        quote(symptoms),
        quote(treatment)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn split_paragraphs_drops_blank_segments() {
        let text = "First paragraph.\n\n\n\nSecond one.\n\n   \n\nThird.";
        let paragraphs = split_paragraphs(text);
        assert_eq!(paragraphs, vec!["First paragraph.", "Second one.", "Third."]);
    }

    #[test]
    fn split_paragraphs_of_empty_text_is_empty() {
        assert!(split_paragraphs("").is_empty());
        assert!(split_paragraphs("  \n \n ").is_empty());
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    /// Embedding fake: each text maps to a fixed axis-aligned vector so
    /// ranking is deterministic.
    struct FakeEmbeddings;

    #[async_trait]
    impl EmbeddingClient for FakeEmbeddings {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("symptom") || t.contains(SYMPTOMS_QUERY) {
                        vec![1.0, 0.0, 0.0]
                    } else if t.contains("treatment") || t.contains(TREATMENT_QUERY) {
                        vec![0.0, 1.0, 0.0]
                    } else {
                        vec![0.0, 0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    struct CapturingChat {
        prompts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatClient for CapturingChat {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
        ) -> Result<String, ServiceError> {
            self.prompts
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            Ok("REPORT".to_string())
        }
    }

    #[tokio::test]
    async fn generate_ranks_relevant_segments_into_the_prompt() {
        let chat = Arc::new(CapturingChat { prompts: Mutex::new(Vec::new()) });
        let generator = ReportGenerator::new(Arc::new(FakeEmbeddings), chat.clone());

        let transcript = "The patient reports symptom of chest pain.\n\n\
Smalltalk about the weather.\n\n\
We agreed on a treatment with rest and fluids.";

        let report = generator.generate(transcript).await.unwrap();
        assert_eq!(report, "REPORT");

        let prompts = chat.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        let (system, user) = &prompts[0];
        assert!(system.contains("medical assistant"));
        // Most-similar segment leads each excerpt block
        assert!(user.contains("PATIENT SYMPTOMS:\n\"The patient reports symptom of chest pain.\""));
        assert!(user.contains("TREATMENT PLAN:\n\"We agreed on a treatment with rest and fluids.\""));
    }

    #[tokio::test]
    async fn generate_rejects_empty_transcript() {
        let chat = Arc::new(CapturingChat { prompts: Mutex::new(Vec::new()) });
        let generator = ReportGenerator::new(Arc::new(FakeEmbeddings), chat);

        let err = generator.generate("   \n ").await.unwrap_err();
        assert!(matches!(err, ServiceError::EmptyInput(_)));
    }
}
