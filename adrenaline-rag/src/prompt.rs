//! Answer prompts built from retrieval context, and parsing of the model's reply.
//!
//! The model is asked for a JSON object with an `answer` and a `reasoning`
//! key. [`AnswerPrompt`] picks the patient or general template from the
//! [`AnswerMode`] of the context; [`parse_answer`] reads the reply back.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::context::{AnswerContext, AnswerMode};
use crate::error::{RagError, Result};

const SERVICE: &str = "llm";

/// Output-format instructions embedded in both templates.
pub const FORMAT_INSTRUCTIONS: &str = r#"{"answer": "<answer to the query>", "reasoning": "<reasoning for the answer>"}"#;

/// Builds the prompt sent to the answering model.
///
/// # Example
///
/// ```rust,ignore
/// let context = ContextBuilder::new().build(&result);
/// let prompt = AnswerPrompt::new().render("What was given for chest pain?", &context);
/// ```
#[derive(Debug, Clone)]
pub struct AnswerPrompt {
    format_instructions: String,
}

impl Default for AnswerPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerPrompt {
    /// Create a prompt builder with the default JSON format instructions.
    pub fn new() -> Self {
        Self { format_instructions: FORMAT_INSTRUCTIONS.to_string() }
    }

    /// Replace the format instructions.
    pub fn with_format_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.format_instructions = instructions.into();
        self
    }

    /// Render the prompt for `query`.
    ///
    /// Patient mode embeds the context notes; general mode omits them.
    pub fn render(&self, query: &str, context: &AnswerContext) -> String {
        match context.mode {
            AnswerMode::Patient => self.patient(query, &context.text),
            AnswerMode::General => self.general(query),
        }
    }

    fn general(&self, query: &str) -> String {
        format!(
            r#"You are an AI assistant for doctors and clinical researchers.
Your task is to answer complex medical queries including summarization, biomarkers extraction, medical question answering, deidentification, etc.
You will be provided with the input query.

H: {query}

Provide your response as a JSON object with an 'answer' and 'reasoning' key containing the answer to the query and the reasoning for the answer. Use the following format:
{format}

Your response MUST be a valid JSON object with an 'answer' and 'reasoning' key containing the answer to the query and the reasoning for the answer. Do not include any other text or formatting.

Your response (in JSON format):
"#,
            format = self.format_instructions
        )
    }

    fn patient(&self, query: &str, notes: &str) -> String {
        format!(
            r#"You are an AI assistant for doctors and clinical researchers.
Your task is to answer complex medical queries about a specific patient.
You will be provided with the input query, and patient notes as context.
You must answer the query based on the provided context.

Patient Notes:
{notes}

H: {query}

Provide your response as a JSON object with an 'answer' and 'reasoning' key containing the answer to the query and the reasoning for the answer. Do not include any other text or formatting. Use the following format:
{format}

Your response MUST be a valid JSON object with an 'answer' and 'reasoning' key containing the answer to the query and the reasoning for the answer.

Your response (in JSON format):
"#,
            format = self.format_instructions
        )
    }
}

/// The model's parsed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmAnswer {
    /// The answer to the query.
    pub answer: String,
    /// Why the model answered that way. Empty when the reply omitted it.
    #[serde(default)]
    pub reasoning: String,
}

/// Parse the model's JSON reply.
///
/// # Errors
///
/// Returns [`RagError::InvalidResponse`] when the reply is not a JSON object
/// with a string `answer`.
pub fn parse_answer(output: &str) -> Result<LlmAnswer> {
    serde_json::from_str(output.trim()).map_err(|e| {
        error!(error = %e, "model reply is not a valid answer object");
        RagError::invalid_response(SERVICE, format!("failed to parse model reply: {e}"))
    })
}
