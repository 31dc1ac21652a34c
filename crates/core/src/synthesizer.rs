use crate::config::GenerationOptions;
use crate::error::SearchError;
use crate::generation::Generator;
use crate::models::ScoredChunk;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

pub const NO_DOCUMENTS_MESSAGE: &str =
    "[WARN] No hay documentos cargados. Por favor, sube PDFs primero.";

const SOURCES_HEADER: &str = "\n\n---\n**Fuentes consultadas:**\n";

const PROMPT_RULES: &str = "Eres un asistente experto. Responde la pregunta del usuario basándote en la información de los documentos.

IMPORTANTE:
- Usa SOLO la información del contexto proporcionado
- Si el contexto está en inglés, traduce la información relevante al español
- Sé específico y detallado
- Si no encuentras la respuesta en el contexto, dilo claramente";

pub fn build_prompt(question: &str, retrieved: &[ScoredChunk]) -> String {
    let context = retrieved
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{PROMPT_RULES}\n\nCONTEXTO DE LOS DOCUMENTOS:\n{context}\n\nPREGUNTA: {question}\n\nRESPUESTA:")
}

/// One line per distinct `(file, page)`, sorted so the footer doesn't
/// depend on retrieval order.
pub fn format_citations(retrieved: &[ScoredChunk]) -> String {
    retrieved
        .iter()
        .map(|hit| {
            format!(
                "- {} (Página {})",
                basename(&hit.chunk.source_filename),
                hit.chunk.page_index
            )
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn topic_not_found_message(topic: &str, available: &[String]) -> String {
    if available.is_empty() {
        format!("[WARN] El tema '{topic}' no existe.")
    } else {
        format!(
            "[WARN] El tema '{topic}' no existe. Temas disponibles: {}",
            available.join(", ")
        )
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Grounds the generator on retrieved chunks and appends the sources.
pub struct AnswerSynthesizer {
    generator: Arc<dyn Generator>,
    options: GenerationOptions,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn Generator>, options: GenerationOptions) -> Self {
        Self { generator, options }
    }

    pub async fn synthesize(
        &self,
        question: &str,
        retrieved: &[ScoredChunk],
    ) -> Result<String, SearchError> {
        if retrieved.is_empty() {
            return Ok(NO_DOCUMENTS_MESSAGE.to_string());
        }

        let prompt = build_prompt(question, retrieved);
        let answer = self.generator.complete(&prompt, &self.options).await?;
        info!(
            context_chunks = retrieved.len(),
            answer_chars = answer.chars().count(),
            "answer generated"
        );

        Ok(format!("{answer}{SOURCES_HEADER}{}", format_citations(retrieved)))
    }
}
