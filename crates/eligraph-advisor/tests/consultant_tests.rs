//! Consultant and chat-turn tests against a scripted provider

use std::sync::Arc;

use async_trait::async_trait;
use eligraph_advisor::conversation::GREETING;
use eligraph_advisor::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LLMError, LLMProvider, ModelInfo, Role,
    Usage,
};
use eligraph_advisor::{
    populate_rules, Advisor, ConversationState, EligibilityEvaluator, LlmConsultant,
    ResponseGenerator, SERVICE_APOLOGY,
};
use eligraph_rules::{Facts, RuleSet, Scalar};
use eligraph_storage::{EligibilityMatch, RuleGraphStore};
use parking_lot::Mutex;

/// Replies with a fixed answer (or a fixed error) and records every request.
struct ScriptedProvider {
    reply: Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn answering(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(reply.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(reason.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests.lock().last().cloned().unwrap()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LLMError> {
        self.requests.lock().push(request);
        match &self.reply {
            Ok(content) => Ok(CompletionResponse {
                content: content.clone(),
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
                model: "scripted".to_string(),
            }),
            Err(reason) => Err(LLMError::Network(reason.clone())),
        }
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "scripted".to_string(),
            max_tokens: 1024,
        }
    }
}

const RULES: &str = r#"{
    "engineering": [
        {"rule_id": "SS_001", "description": "Eligibility for Engineering (India)",
         "conclusion": "eligible_for_engineering_india",
         "conditions": {"type": "AND", "rules": [
            {"fact": "stream", "operator": "=", "value": "science"},
            {"fact": "aggregate_percentage", "operator": ">=", "value": 75}]}}
    ]
}"#;

fn science_student() -> Facts {
    [
        ("stream".to_string(), Scalar::from("science")),
        ("aggregate_percentage".to_string(), Scalar::from(82)),
    ]
    .into_iter()
    .collect()
}

fn engineering_match() -> EligibilityMatch {
    EligibilityMatch {
        rule_id: "SS_001".to_string(),
        description: "Eligibility for Engineering (India)".to_string(),
        conclusion: "eligible_for_engineering_india".to_string(),
    }
}

#[tokio::test]
async fn test_generate_response_sends_eligibility_and_settings() {
    let provider = ScriptedProvider::answering("Consider IIT Bombay.");
    let consultant = LlmConsultant::new(provider.clone());

    let answer = consultant
        .generate_response("SYSTEM", "Which colleges?", &[engineering_match()])
        .await
        .unwrap();
    assert_eq!(answer, "Consider IIT Bombay.");

    let request = provider.last_request();
    assert_eq!(request.max_tokens, Some(500));
    assert_eq!(request.temperature, Some(0.7));
    assert_eq!(request.messages[0].role, Role::System);
    assert_eq!(request.messages[1].role, Role::User);
    let line = "- eligible_for_engineering_india (Rule: SS_001: Eligibility for Engineering (India))";
    assert!(request.messages[0].content.contains(line));
    assert!(request.messages[1].content.contains(line));
}

#[tokio::test]
async fn test_service_failure_is_an_error_then_an_apology() {
    let provider = ScriptedProvider::failing("connection refused");
    let consultant = LlmConsultant::new(provider);

    let err = consultant
        .generate_response("SYSTEM", "Hi", &[])
        .await
        .unwrap_err();
    assert!(err.reason.contains("connection refused"));

    assert_eq!(consultant.advise("Hi", &[]).await, SERVICE_APOLOGY);
}

#[tokio::test]
async fn test_turn_uses_stored_eligibility() {
    let store = RuleGraphStore::in_memory();
    populate_rules(&store, &RuleSet::from_json_str(RULES).unwrap()).unwrap();

    let provider = ScriptedProvider::answering("Great options ahead!");
    let advisor = Advisor::new(
        EligibilityEvaluator::new(store),
        LlmConsultant::new(provider.clone()),
    );

    let (state, reply) = advisor
        .process_turn(ConversationState::new(), "What can I study?", &science_student())
        .await;
    assert_eq!(reply, "Great options ahead!");
    assert_eq!(state.len(), 3);
    assert_eq!(state.messages()[0].content, GREETING);
    assert_eq!(state.messages()[1].content, "What can I study?");
    assert_eq!(state.last_reply(), Some("Great options ahead!"));

    let request = provider.last_request();
    assert!(request.messages[1].content.contains("Rule: SS_001"));
}

#[tokio::test]
async fn test_turn_survives_unavailable_store() {
    let store = RuleGraphStore::in_memory();
    populate_rules(&store, &RuleSet::from_json_str(RULES).unwrap()).unwrap();
    store.close();

    let provider = ScriptedProvider::answering("General advice.");
    let advisor = Advisor::new(
        EligibilityEvaluator::new(store),
        LlmConsultant::new(provider.clone()),
    );

    let (state, reply) = advisor
        .process_turn(ConversationState::new(), "Any tips?", &science_student())
        .await;
    assert_eq!(reply, "General advice.");
    assert_eq!(state.len(), 3);
    assert_eq!(provider.last_request().messages[1].content, "Student query: Any tips?");
}

#[tokio::test]
async fn test_turn_with_unreachable_model_apologizes() {
    let advisor = Advisor::new(
        EligibilityEvaluator::new(RuleGraphStore::in_memory()),
        LlmConsultant::new(ScriptedProvider::failing("timeout")),
    );
    let (state, reply) = advisor
        .process_turn(ConversationState::new(), "Hello?", &Facts::new())
        .await;
    assert_eq!(reply, SERVICE_APOLOGY);
    assert_eq!(state.last_reply(), Some(SERVICE_APOLOGY));
}
