//! Prompts for retrieval-augmented answering.
//!
//! Every prompt lives here so tests can inspect them without a live LLM.
//! Callers can override the system prompt via
//! [`crate::config::AnalysisConfig::system_prompt`].

/// Default system prompt for answering a query over retrieved PDF excerpts.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert document analyst. You answer questions about a PDF document using only the excerpts provided to you.

Follow these rules precisely:

1. GROUNDING
   - Base every statement on the provided excerpts
   - You may reason over the excerpts, but do not add facts from outside them
   - If the excerpts do not contain the answer, say so plainly

2. CITATIONS
   - Excerpts are labelled with their page number, e.g. [page 3]
   - Mention the page when you rely on a specific excerpt

3. OUTPUT FORMAT
   - Answer in Markdown
   - Do NOT wrap the answer in ```markdown fences
   - Do NOT repeat the question
   - Start directly with the answer"#;

/// Format one retrieved chunk as a labelled excerpt.
pub fn excerpt(page: usize, text: &str) -> String {
    format!("[page {}]\n{}", page, text)
}

/// Build the user prompt for one group of context excerpts.
pub fn answer_prompt(context: &str, query: &str) -> String {
    format!(
        "Context information from the document is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {query}\n\
         Answer: "
    )
}

/// Build the user prompt that merges partial answers into one.
///
/// Used when the retrieved context does not fit into a single call.
pub fn combine_prompt(partials: &[String], query: &str) -> String {
    let joined = partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("Partial answer {}:\n{}", i + 1, p))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Several partial answers to the same query were produced from different parts \
         of the document.\n\
         ---------------------\n\
         {joined}\n\
         ---------------------\n\
         Combine them into a single, consistent answer. Keep page references.\n\
         Query: {query}\n\
         Answer: "
    )
}
