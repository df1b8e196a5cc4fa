//! Supervisor: asks the model which specialist should answer.

use crate::llm::{ChatMessage, LlmBackend};
use crate::prompts::Prompts;
use crate::routing::Route;

/// Classify `query`. Any model failure routes to the default agent.
pub async fn classify(llm: &dyn LlmBackend, prompts: &Prompts, query: &str) -> Route {
    let messages = vec![
        ChatMessage::system(prompts.supervisor.clone()),
        ChatMessage::user(query),
    ];
    match llm.chat(messages, None).await {
        Ok(res) => {
            let route = Route::from_label(res.content());
            log::info!("supervisor: routed to {}", route.tag());
            route
        }
        Err(e) => {
            log::warn!("supervisor: classification failed ({}), using default route", e);
            Route::default()
        }
    }
}
