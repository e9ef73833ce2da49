//! Prompt assembly.
//!
//! Builds the generation context from the user's message, the recent
//! conversation history, and any retrieved document passages. Precedence:
//! document context wins over history-derived framing, and a bare question
//! gets the direct template.

use crate::llm::{ChatTurn, GenerationContext, Role};
use crate::retrieval::RetrievedPassage;
use crate::store::StoredMessage;

const BASE_SYSTEM_PROMPT: &str = "You are an assistant for project and document management. \
You help users track their tasks and deadlines and answer questions grounded in their \
document library. Answer concisely and in the user's language.";

/// Build the full generation context for one user message.
pub fn build_context(
    user_message: &str,
    history: &[StoredMessage],
    passages: &[RetrievedPassage],
) -> GenerationContext {
    let system_prompt = if !passages.is_empty() {
        with_document_context(user_message, passages)
    } else if !history.is_empty() {
        with_history(user_message, history)
    } else {
        direct(user_message)
    };

    let mut messages: Vec<ChatTurn> = history
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant))
        .map(|m| ChatTurn::new(m.role, m.content.clone()))
        .collect();
    messages.push(ChatTurn::new(Role::User, user_message.to_string()));

    GenerationContext {
        system_prompt: Some(system_prompt),
        messages,
    }
}

/// System prompt citing retrieved document passages.
fn with_document_context(user_message: &str, passages: &[RetrievedPassage]) -> String {
    let mut context = String::new();
    for passage in passages {
        context.push_str(&format!("[Document: {}]\n", passage.source));
        context.push_str(&passage.text);
        context.push_str("\n---\n");
    }

    format!(
        "{base}\n\nUse the following document excerpts to answer. When you rely on an \
excerpt, name its document.\n\n{context}\nQuestion: {question}",
        base = BASE_SYSTEM_PROMPT,
        context = context,
        question = user_message,
    )
}

/// System prompt framing the running conversation.
fn with_history(user_message: &str, history: &[StoredMessage]) -> String {
    let mut transcript = String::new();
    for message in history {
        let speaker = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => continue,
        };
        transcript.push_str(&format!("{}: {}\n", speaker, message.content));
    }

    format!(
        "{base}\n\nConversation so far:\n{transcript}\nQuestion: {question}",
        base = BASE_SYSTEM_PROMPT,
        transcript = transcript,
        question = user_message,
    )
}

/// System prompt for a standalone question.
fn direct(user_message: &str) -> String {
    format!(
        "{base}\n\nQuestion: {question}",
        base = BASE_SYSTEM_PROMPT,
        question = user_message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(role: Role, content: &str) -> StoredMessage {
        StoredMessage {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }

    fn passage(source: &str, text: &str) -> RetrievedPassage {
        RetrievedPassage {
            text: text.to_string(),
            source: source.to_string(),
            score: 0.9,
        }
    }

    #[test]
    fn document_context_wins_over_history() {
        let history = vec![message(Role::User, "earlier question")];
        let passages = vec![passage("handbook.pdf", "Reports are due Fridays.")];

        let context = build_context("When are reports due?", &history, &passages);
        let system = context.system_prompt.unwrap();
        assert!(system.contains("[Document: handbook.pdf]"));
        assert!(system.contains("Reports are due Fridays."));
    }

    #[test]
    fn history_prompt_lists_turns() {
        let history = vec![
            message(Role::User, "hello"),
            message(Role::Assistant, "hi there"),
        ];

        let context = build_context("what next?", &history, &[]);
        let system = context.system_prompt.unwrap();
        assert!(system.contains("User: hello"));
        assert!(system.contains("Assistant: hi there"));
        // History turns plus the current user message.
        assert_eq!(context.messages.len(), 3);
        assert_eq!(context.messages[2].content, "what next?");
    }

    #[test]
    fn system_rows_are_excluded_from_turns() {
        let history = vec![
            message(Role::System, "task metadata"),
            message(Role::User, "hello"),
        ];

        let context = build_context("next", &history, &[]);
        assert_eq!(context.messages.len(), 2);
        assert!(context
            .messages
            .iter()
            .all(|t| !matches!(t.role, Role::System)));
    }

    #[test]
    fn bare_question_uses_direct_prompt() {
        let context = build_context("what is overdue?", &[], &[]);
        let system = context.system_prompt.unwrap();
        assert!(system.contains("Question: what is overdue?"));
        assert_eq!(context.messages.len(), 1);
    }
}
