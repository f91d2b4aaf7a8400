//! The education consultant: prompt composition over an [`LLMProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use eligraph_storage::EligibilityMatch;

use crate::llm::{
    CompletionRequest, LLMProvider, Message, ResponseGenerator, ServiceUnavailableError,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI education consultant for CBSE high schoolers. \
Your role is to provide helpful and relevant information about colleges, subjects, and admission processes. \
Use the provided eligibility results to inform your response, but also use your general knowledge to answer broader questions. \
Keep your responses encouraging and informative.";

/// Shown to the student when the model cannot be reached.
pub const SERVICE_APOLOGY: &str = "Sorry, I'm having trouble connecting to the AI service right now.";

pub const DEFAULT_MAX_TOKENS: usize = 500;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Bullet list of matches, or `None` when there are none.
///
/// Each line reads `- <conclusion> (Rule: <rule_id>: <description>)`.
pub fn eligibility_text(eligibility: &[EligibilityMatch]) -> Option<String> {
    if eligibility.is_empty() {
        return None;
    }
    let mut text = String::from(
        "\nBased on the information provided, the student appears to be eligible for the following:\n",
    );
    for m in eligibility {
        text.push_str(&format!(
            "- {} (Rule: {}: {})\n",
            m.conclusion, m.rule_id, m.description
        ));
    }
    Some(text)
}

/// System and user messages for one query.
///
/// The eligibility block is appended to both, the system copy behind a short
/// instruction to take it into account.
pub fn compose_messages(
    system_prompt: &str,
    user_query: &str,
    eligibility: &[EligibilityMatch],
) -> Vec<Message> {
    let mut system = system_prompt.to_string();
    let mut user = format!("Student query: {user_query}");
    if let Some(block) = eligibility_text(eligibility) {
        user.push_str(&block);
        system.push_str(
            "\nConsider the following eligibility results when formulating your response:",
        );
        system.push_str(&block);
    }
    vec![Message::system(system), Message::user(user)]
}

/// [`ResponseGenerator`] backed by a chat-completion provider.
#[derive(Clone)]
pub struct LlmConsultant {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    max_tokens: usize,
    temperature: f32,
}

impl LlmConsultant {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answer a query, rendering any service failure as [`SERVICE_APOLOGY`].
    pub async fn advise(&self, user_query: &str, eligibility: &[EligibilityMatch]) -> String {
        match self
            .generate_response(&self.system_prompt, user_query, eligibility)
            .await
        {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    model = %self.provider.model_info().name,
                    "consultant unavailable"
                );
                SERVICE_APOLOGY.to_string()
            }
        }
    }
}

#[async_trait]
impl ResponseGenerator for LlmConsultant {
    async fn generate_response(
        &self,
        system_prompt: &str,
        user_query: &str,
        eligibility: &[EligibilityMatch],
    ) -> Result<String, ServiceUnavailableError> {
        let request = CompletionRequest {
            messages: compose_messages(system_prompt, user_query, eligibility),
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
        };
        let response = self.provider.complete(request).await?;
        tracing::debug!(
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "consultant answered"
        );
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    fn sample() -> Vec<EligibilityMatch> {
        vec![EligibilityMatch {
            rule_id: "SS_001".to_string(),
            description: "Engineering (India)".to_string(),
            conclusion: "eligible_for_engineering_india".to_string(),
        }]
    }

    #[test]
    fn formats_eligibility_lines() {
        let text = eligibility_text(&sample()).unwrap();
        assert!(text.ends_with(
            "- eligible_for_engineering_india (Rule: SS_001: Engineering (India))\n"
        ));
        assert_eq!(eligibility_text(&[]), None);
    }

    #[test]
    fn eligibility_goes_to_both_messages() {
        let messages = compose_messages("SYS", "Which colleges?", &sample());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("SYS\nConsider the following eligibility results"));
        assert!(messages[0].content.contains("Rule: SS_001"));
        assert!(messages[1].content.starts_with("Student query: Which colleges?"));
        assert!(messages[1].content.contains("Rule: SS_001"));
    }

    #[test]
    fn no_eligibility_keeps_prompts_plain() {
        let messages = compose_messages("SYS", "Hi", &[]);
        assert_eq!(messages[0].content, "SYS");
        assert_eq!(messages[1].content, "Student query: Hi");
    }
}
