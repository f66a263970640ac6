//! Prompt templates for the answer chain.
//!
//! Every prompt the hosted model sees is built here, so the exact wording of
//! the map, reduce and condense steps can be inspected and tested without a
//! live model.
//!
//! | Step     | Calls per question | Input |
//! |----------|--------------------|-------|
//! | condense | 0 or 1             | history + follow-up question |
//! | map      | one per chunk      | one retrieved chunk + history + question |
//! | reduce   | 1                  | all map outputs + history + question |

/// System message sent with every call.
pub const SYSTEM_PROMPT: &str = "You are DocuBot, an assistant that answers questions about a single \
uploaded document. Ground every statement in the document excerpts you are given. \
If the excerpts do not contain the answer, say that you don't know.";

/// Reply the map step uses when a chunk is irrelevant.
pub const NO_RELEVANT_TEXT: &str = "NO RELEVANT TEXT";

/// Placeholder rendered when there is no prior conversation.
const EMPTY_HISTORY: &str = "(no previous conversation)";

/// Map step: extract what one chunk says about the question.
pub fn map_prompt(chunk: &str, history: &str, question: &str) -> String {
    format!(
        "Use the following portion of a long document to see if any of the text is \
relevant to answer the question. Return any relevant text verbatim. \
If nothing is relevant, reply exactly \"{NO_RELEVANT_TEXT}\".\n\n\
Conversation so far:\n{history}\n\n\
Document portion:\n\"\"\"\n{chunk}\n\"\"\"\n\n\
Question: {question}\n\
Relevant text, if any:",
        history = history_or_placeholder(history),
    )
}

/// Reduce step: combine the map outputs into one final answer.
///
/// `partials` are numbered in retrieval order; partials equal to
/// [`NO_RELEVANT_TEXT`] are kept so the model sees how little matched.
pub fn reduce_prompt(partials: &[String], history: &str, question: &str) -> String {
    let summaries = partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] {}", i + 1, p.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Given the following extracted parts of a long document, the conversation so far \
and a question, create a final answer. If you don't know the answer, just say that you \
don't know. Don't try to make up an answer.\n\n\
Conversation so far:\n{history}\n\n\
QUESTION: {question}\n\
=========\n\
{summaries}\n\
=========\n\
FINAL ANSWER:",
        history = history_or_placeholder(history),
    )
}

/// Condense step: rewrite a follow-up as a standalone question.
pub fn condense_prompt(history: &str, question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
question to be a standalone question, in its original language.\n\n\
Chat History:\n{history}\n\
Follow Up Input: {question}\n\
Standalone question:",
        history = history_or_placeholder(history),
    )
}

fn history_or_placeholder(history: &str) -> &str {
    if history.trim().is_empty() {
        EMPTY_HISTORY
    } else {
        history
    }
}
