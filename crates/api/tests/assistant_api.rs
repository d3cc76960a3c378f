//! Integration tests for the agent chat assistant, driven with a scripted
//! model.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Response, StatusCode};
use common::{body_json, create_profile, get_auth, post_json_auth, token_for};
use serde_json::{json, Value};
use sqlx::PgPool;

use autocrm_api::state::AppState;
use autocrm_api::triage::{
    Embedder, LanguageModel, ModelReply, ToolPrompt, TriageError, TriageService,
};
use autocrm_core::roles::Role;
use autocrm_db::models::profile::Profile;

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Gives the same answer to every prompt and keeps the prompts it saw.
struct ScriptedAssistant {
    content: Option<String>,
    arguments: Option<String>,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LanguageModel for ScriptedAssistant {
    async fn invoke_tool(&self, prompt: &ToolPrompt) -> Result<Option<String>, TriageError> {
        Ok(self.chat(prompt).await?.tool_arguments)
    }

    async fn chat(&self, prompt: &ToolPrompt) -> Result<ModelReply, TriageError> {
        assert_eq!(prompt.tool_name, "updateTicket");
        self.prompts.lock().unwrap().push(prompt.user.clone());
        Ok(ModelReply {
            content: self.content.clone(),
            tool_arguments: self.arguments.clone(),
        })
    }
}

struct NoEmbedder;

#[async_trait]
impl Embedder for NoEmbedder {
    async fn embed(&self, _input: &str) -> Result<Vec<f32>, TriageError> {
        Err(TriageError::MalformedResponse("not used".into()))
    }
}

fn service(state: &AppState, model: Arc<ScriptedAssistant>) -> Arc<TriageService> {
    Arc::new(TriageService::new(
        state.pool.clone(),
        Arc::clone(&state.event_bus),
        model,
        Arc::new(NoEmbedder),
        state.config.triage.clone(),
    ))
}

fn scripted(content: Option<&str>, arguments: Option<Value>) -> Arc<ScriptedAssistant> {
    Arc::new(ScriptedAssistant {
        content: content.map(str::to_string),
        arguments: arguments.map(|a| a.to_string()),
        prompts: Mutex::new(Vec::new()),
    })
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Fixture {
    agent: Profile,
    customer: Profile,
    ticket_id: i64,
    status_field: i64,
}

impl Fixture {
    fn agent_token(&self) -> String {
        token_for(self.agent.id, Role::Agent)
    }
}

/// An agent, a customer and one customer ticket on a minimal template.
async fn setup(pool: &PgPool) -> Fixture {
    let agent = create_profile(pool, "Agent", Role::Agent).await;
    let customer = create_profile(pool, "Customer", Role::Customer).await;
    let agent_token = token_for(agent.id, Role::Agent);

    let app = common::build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/templates",
        json!({
            "name": "Default",
            "fields": [{ "name": "Order Number", "type": "text", "rank": 0 }]
        }),
        &agent_token,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let template_id = body_json(response).await["data"]["id"].as_i64().unwrap();

    let app = common::build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/tickets",
        json!({
            "template_id": template_id,
            "title": "Charged twice",
            "description": "My card was billed two times for one order"
        }),
        &token_for(customer.id, Role::Customer),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let ticket = body_json(response).await["data"].clone();
    let ticket_id = ticket["id"].as_i64().unwrap();

    let ticket = fetch(pool, &format!("/api/v1/tickets/{ticket_id}"), &agent_token).await;
    let status_field = ticket["fields"]
        .as_array()
        .and_then(|fields| fields.iter().find(|f| f["name"] == "Status"))
        .and_then(|f| f["id"].as_i64())
        .unwrap();

    Fixture {
        agent,
        customer,
        ticket_id,
        status_field,
    }
}

async fn ask(app: axum::Router, fx: &Fixture, token: &str, message: &str) -> Response<Body> {
    post_json_auth(
        app,
        &format!("/api/v1/tickets/{}/assistant", fx.ticket_id),
        json!({ "message": message }),
        token,
    )
    .await
}

async fn fetch(pool: &PgPool, uri: &str, token: &str) -> Value {
    let app = common::build_test_app(pool.clone());
    let response = get_auth(app, uri, token).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["data"].clone()
}

async fn updates(pool: &PgPool, fx: &Fixture, token: &str) -> Vec<Value> {
    fetch(pool, &format!("/api/v1/tickets/{}/updates", fx.ticket_id), token)
        .await
        .as_array()
        .unwrap()
        .clone()
}

// ---------------------------------------------------------------------------
// Test: Tool calls go through the audited update path as the agent
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn tool_call_is_applied_as_an_internal_update_by_the_agent(pool: PgPool) {
    let fx = setup(&pool).await;
    let state = common::test_state(pool.clone());
    let model = scripted(
        Some("Moved it to In Progress."),
        Some(json!({
            "ticketId": fx.ticket_id.to_string(),
            "fields": [{ "id": fx.status_field.to_string(), "newValue": "In Progress" }],
            "comment": "Escalated by assistant",
            "tags": ["billing"]
        })),
    );

    let triage = service(&state, Arc::clone(&model));
    let app = common::build_test_app_with_triage(state.clone(), triage);
    let response = ask(app, &fx, &fx.agent_token(), "Please start working on this").await;

    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["reply"], "Moved it to In Progress.");
    assert_eq!(data["update"]["created_by"], fx.agent.id);
    assert_eq!(data["update"]["internal"], true);
    assert_eq!(data["update"]["comment"], "Escalated by assistant");
    assert_eq!(data["update"]["new_tags"], json!(["billing"]));
    assert_eq!(data["update"]["updates"][0]["old_value"], "New");
    assert_eq!(data["update"]["updates"][0]["new_value"], "In Progress");

    let ticket = fetch(
        &pool,
        &format!("/api/v1/tickets/{}", fx.ticket_id),
        &fx.agent_token(),
    )
    .await;
    assert_eq!(ticket["tags"], json!(["billing"]));

    // Internal by default, so the customer sees no entry.
    let customer_token = token_for(fx.customer.id, Role::Customer);
    assert!(updates(&pool, &fx, &customer_token).await.is_empty());

    let prompts = model.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 1);
    let prompt = &prompts[0];
    assert!(prompt.contains("Title: Charged twice"));
    assert!(prompt.contains(&format!("Status (field id: {})", fx.status_field)));
    assert!(prompt.contains("Allowed values: New, In Progress, Waiting For Customer, Resolved"));
    assert!(prompt.contains(&format!("- Agent (id: {})", fx.agent.id)));
    assert!(prompt.contains("No updates yet."));
    assert!(prompt.ends_with("Please start working on this"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn history_is_included_in_the_next_prompt(pool: PgPool) {
    let fx = setup(&pool).await;
    let state = common::test_state(pool.clone());

    let app = common::build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        &format!("/api/v1/tickets/{}/updates", fx.ticket_id),
        json!({ "comment": "Refund requested from finance", "internal": true }),
        &fx.agent_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let model = scripted(Some("Finance was asked for a refund."), None);
    let triage = service(&state, Arc::clone(&model));
    let app = common::build_test_app_with_triage(state.clone(), triage);
    let response = ask(app, &fx, &fx.agent_token(), "What happened so far?").await;
    assert_eq!(response.status(), StatusCode::OK);

    let prompt = model.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("By: Agent"));
    assert!(prompt.contains("Comment: Refund requested from finance"));
    assert!(prompt.contains("Internal: true"));
}

// ---------------------------------------------------------------------------
// Test: Answers that change nothing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn prose_answer_writes_nothing(pool: PgPool) {
    let fx = setup(&pool).await;
    let state = common::test_state(pool.clone());
    let model = scripted(Some("The customer was charged twice."), None);

    let app = common::build_test_app_with_triage(state.clone(), service(&state, model));
    let response = ask(app, &fx, &fx.agent_token(), "Summarize this ticket").await;

    assert_eq!(response.status(), StatusCode::OK);
    let data = body_json(response).await["data"].clone();
    assert_eq!(data["reply"], "The customer was charged twice.");
    assert!(data["update"].is_null());
    assert!(updates(&pool, &fx, &fx.agent_token()).await.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_choice_from_the_model_is_rejected(pool: PgPool) {
    let fx = setup(&pool).await;
    let state = common::test_state(pool.clone());
    let model = scripted(
        None,
        Some(json!({
            "ticketId": fx.ticket_id.to_string(),
            "fields": [{ "id": fx.status_field.to_string(), "newValue": "Escalated" }]
        })),
    );

    let app = common::build_test_app_with_triage(state.clone(), service(&state, model));
    let response = ask(app, &fx, &fx.agent_token(), "Escalate this").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    assert!(updates(&pool, &fx, &fx.agent_token()).await.is_empty());
}

// ---------------------------------------------------------------------------
// Test: Access and configuration
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn customers_cannot_use_the_assistant(pool: PgPool) {
    let fx = setup(&pool).await;
    let state = common::test_state(pool.clone());
    let model = scripted(Some("hello"), None);

    let triage = service(&state, Arc::clone(&model));
    let app = common::build_test_app_with_triage(state.clone(), triage);
    let token = token_for(fx.customer.id, Role::Customer);
    let response = ask(app, &fx, &token, "Close my ticket").await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(model.prompts.lock().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn assistant_without_model_is_bad_gateway(pool: PgPool) {
    let fx = setup(&pool).await;

    let app = common::build_test_app(pool);
    let response = ask(app, &fx, &fx.agent_token(), "Anything new?").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "EXTERNAL_SERVICE_ERROR");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn blank_message_is_rejected(pool: PgPool) {
    let fx = setup(&pool).await;
    let state = common::test_state(pool.clone());
    let model = scripted(Some("hello"), None);

    let triage = service(&state, Arc::clone(&model));
    let app = common::build_test_app_with_triage(state.clone(), triage);
    let response = ask(app, &fx, &fx.agent_token(), "   ").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(model.prompts.lock().unwrap().is_empty());
}
