//! Model-call pipeline tests: tool dispatch, transfer, hooks, streaming,
//! the runner's commit path, and live mode.

use std::sync::Arc;

use async_trait::async_trait;
use canopy_agents::testing::{
    drain, drain_results, function_call_response, test_runner, texts,
};
use canopy_agents::{Agent, CallbackContext, LiveRequestQueue, Runner};
use canopy_core::{Content, Error, Part, RunConfig, StreamingMode, ToolError};
use canopy_models::{FunctionDeclaration, LlmResponse, ScriptedModel};
use canopy_tools::{Tool, ToolContext, TransferToAgentTool};

/// Records an order id in session state and confirms it.
struct PlaceOrderTool;

#[async_trait]
impl Tool for PlaceOrderTool {
    fn name(&self) -> &str {
        "place_order"
    }

    fn description(&self) -> &str {
        "Places an order and returns its id"
    }

    fn declaration(&self) -> Option<FunctionDeclaration> {
        Some(FunctionDeclaration {
            name: self.name().into(),
            description: self.description().into(),
            parameters: Some(serde_json::json!({
                "type": "object",
                "properties": {
                    "item": { "type": "string" }
                },
                "required": ["item"]
            })),
        })
    }

    async fn run(
        &self,
        args: serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        let item = args
            .get("item")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'item'".into()))?;
        ctx.set_state("last_order", serde_json::json!(item));
        Ok(serde_json::json!({ "order_id": "ord_1", "item": item }))
    }
}

/// Always fails.
struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn declaration(&self) -> Option<FunctionDeclaration> {
        Some(FunctionDeclaration {
            name: self.name().into(),
            description: self.description().into(),
            parameters: None,
        })
    }

    async fn run(
        &self,
        _args: serde_json::Map<String, serde_json::Value>,
        _ctx: &mut ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "backend unavailable".into(),
        })
    }
}

/// Long-running: the result arrives out-of-band.
struct StartExportTool;

#[async_trait]
impl Tool for StartExportTool {
    fn name(&self) -> &str {
        "start_export"
    }

    fn description(&self) -> &str {
        "Kicks off a long-running export job"
    }

    fn is_long_running(&self) -> bool {
        true
    }

    fn declaration(&self) -> Option<FunctionDeclaration> {
        Some(FunctionDeclaration {
            name: self.name().into(),
            description: self.description().into(),
            parameters: None,
        })
    }

    async fn run(
        &self,
        _args: serde_json::Map<String, serde_json::Value>,
        _ctx: &mut ToolContext,
    ) -> Result<serde_json::Value, ToolError> {
        Ok(serde_json::json!({ "status": "started" }))
    }
}

async fn run_turn(runner: &Runner, message: &str, config: RunConfig) -> Vec<canopy_core::Event> {
    drain(runner.run("test_user", "test_session", Content::user_text(message), config)).await
}

#[tokio::test]
async fn tool_dispatch_loops_until_final_response() {
    let model = Arc::new(ScriptedModel::new(
        "mock-model",
        vec![
            vec![function_call_response(
                "place_order",
                serde_json::json!({ "item": "coffee" }),
            )],
            vec![LlmResponse::text("Your coffee order is placed.")],
        ],
    ));
    let agent = Agent::llm("barista")
        .with_model_instance(Arc::clone(&model) as _)
        .with_tool(Arc::new(PlaceOrderTool) as Arc<dyn Tool>)
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let events = run_turn(&runner, "One coffee please", RunConfig::default()).await;

    // Function-call event, function-response event, final text.
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].function_calls().len(), 1);
    assert_eq!(events[1].function_responses().len(), 1);
    assert!(events[2].is_final_response());
    assert_eq!(texts(&events), vec!["Your coffee order is placed."]);

    // The second request saw the function response in its history.
    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let has_function_response = requests[1]
        .contents
        .iter()
        .any(|content| !content.function_responses().is_empty());
    assert!(has_function_response);

    // The tool's state delta rode the function-response event.
    assert_eq!(
        events[1].actions.state_delta.get("last_order"),
        Some(&serde_json::json!("coffee"))
    );
}

#[tokio::test]
async fn failing_tool_does_not_abort_sibling_calls() {
    let calls = Content::new(
        "model",
        vec![
            Part::function_call(canopy_core::FunctionCall {
                id: None,
                name: "broken".into(),
                args: serde_json::Map::new(),
            }),
            Part::function_call(canopy_core::FunctionCall {
                id: None,
                name: "place_order".into(),
                args: {
                    let mut args = serde_json::Map::new();
                    args.insert("item".into(), serde_json::json!("tea"));
                    args
                },
            }),
        ],
    );
    let model = Arc::new(ScriptedModel::new(
        "mock-model",
        vec![
            vec![LlmResponse::with_content(calls)],
            vec![LlmResponse::text("One of the tools failed.")],
        ],
    ));
    let agent = Agent::llm("barista")
        .with_model_instance(Arc::clone(&model) as _)
        .with_tool(Arc::new(BrokenTool) as Arc<dyn Tool>)
        .with_tool(Arc::new(PlaceOrderTool) as Arc<dyn Tool>)
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let events = run_turn(&runner, "Do both", RunConfig::default()).await;

    let responses = events[1].function_responses();
    assert_eq!(responses.len(), 2);
    let broken = responses.iter().find(|r| r.name == "broken").unwrap();
    assert!(broken.response.get("error").is_some());
    let ok = responses.iter().find(|r| r.name == "place_order").unwrap();
    assert_eq!(ok.response.get("order_id"), Some(&serde_json::json!("ord_1")));
}

#[tokio::test]
async fn long_running_tool_is_flagged_not_awaited() {
    let model = Arc::new(ScriptedModel::new(
        "mock-model",
        vec![vec![function_call_response("start_export", serde_json::json!({}))]],
    ));
    let agent = Agent::llm("exporter")
        .with_model_instance(Arc::clone(&model) as _)
        .with_tool(Arc::new(StartExportTool) as Arc<dyn Tool>)
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let events = run_turn(&runner, "Export my data", RunConfig::default()).await;

    // One event: the function call, flagged long-running and final.
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.function_calls().len(), 1);
    assert!(event
        .long_running_tool_ids
        .as_ref()
        .is_some_and(|ids| !ids.is_empty()));
    assert!(event.is_final_response());
    assert_eq!(model.calls_made(), 1);
}

#[tokio::test]
async fn transfer_hands_invocation_to_target() {
    let specialist = Agent::llm("specialist")
        .with_model_instance(
            Arc::new(ScriptedModel::single_text("mock-model", "Specialist answer")) as _,
        )
        .build()
        .unwrap();
    let front_model = Arc::new(ScriptedModel::new(
        "mock-model",
        vec![vec![function_call_response(
            "transfer_to_agent",
            serde_json::json!({ "agent_name": "specialist" }),
        )]],
    ));
    let front = Agent::llm("front_desk")
        .with_model_instance(Arc::clone(&front_model) as _)
        .with_tool(Arc::new(TransferToAgentTool) as Arc<dyn Tool>)
        .with_child(specialist)
        .build()
        .unwrap();

    let runner = test_runner(front).await;
    let events = run_turn(&runner, "I need an expert", RunConfig::default()).await;

    assert_eq!(events.len(), 3);
    assert_eq!(
        events[1].actions.transfer_to_agent.as_deref(),
        Some("specialist")
    );
    let last = events.last().unwrap();
    assert_eq!(last.author, "specialist");
    assert_eq!(
        last.content.as_ref().unwrap().first_text(),
        Some("Specialist answer")
    );
}

#[tokio::test]
async fn unresolved_transfer_target_is_fatal() {
    let front = Agent::llm("front_desk")
        .with_model_instance(Arc::new(ScriptedModel::new(
            "mock-model",
            vec![vec![function_call_response(
                "transfer_to_agent",
                serde_json::json!({ "agent_name": "ghost" }),
            )]],
        )) as _)
        .with_tool(Arc::new(TransferToAgentTool) as Arc<dyn Tool>)
        .build()
        .unwrap();

    let runner = test_runner(front).await;
    let items = drain_results(runner.run(
        "test_user",
        "test_session",
        Content::user_text("go"),
        RunConfig::default(),
    ))
    .await;

    let last = items.last().unwrap();
    assert!(matches!(last, Err(Error::Config { .. })));
}

#[tokio::test]
async fn before_model_hook_skips_the_network_call() {
    let model = Arc::new(ScriptedModel::single_text("mock-model", "never sent"));
    let agent = Agent::llm("cached")
        .with_model_instance(Arc::clone(&model) as _)
        .with_before_model(Arc::new(|_ctx: &mut CallbackContext, _request| {
            Some(LlmResponse::text("canned reply"))
        }))
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let events = run_turn(&runner, "Anyone home?", RunConfig::default()).await;

    assert_eq!(texts(&events), vec!["canned reply"]);
    assert_eq!(model.calls_made(), 0);
}

#[tokio::test]
async fn after_model_hook_substitutes_chunks() {
    let agent = Agent::llm("redacted")
        .with_model_instance(Arc::new(ScriptedModel::single_text(
            "mock-model",
            "raw secret output",
        )) as _)
        .with_after_model(Arc::new(|_ctx: &mut CallbackContext, chunk| {
            chunk
                .content
                .as_ref()
                .and_then(|c| c.first_text())
                .map(|_| LlmResponse::text("[redacted]"))
        }))
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let events = run_turn(&runner, "Tell me everything", RunConfig::default()).await;

    assert_eq!(texts(&events), vec!["[redacted]"]);
}

#[tokio::test]
async fn sse_streaming_yields_partials_and_persists_only_final() {
    let agent = Agent::llm("streamer")
        .with_model_instance(Arc::new(ScriptedModel::new(
            "mock-model",
            vec![vec![
                LlmResponse::partial_text("Hel"),
                LlmResponse::partial_text("lo"),
                LlmResponse::text("Hello there"),
            ]],
        )) as _)
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let config = RunConfig {
        streaming_mode: StreamingMode::Sse,
        ..Default::default()
    };
    let events = run_turn(&runner, "Say hello", config).await;

    assert_eq!(events.len(), 3);
    assert!(events[0].partial);
    assert!(events[1].partial);
    assert!(!events[2].partial);
    assert_eq!(texts(&events), vec!["Hel", "lo", "Hello there"]);
}

#[tokio::test]
async fn llm_call_ceiling_stops_runaway_pipelines() {
    // The model keeps requesting the same tool; the ceiling cuts it off.
    let scripts = (0..10)
        .map(|_| vec![function_call_response("place_order", serde_json::json!({ "item": "x" }))])
        .collect();
    let agent = Agent::llm("runaway")
        .with_model_instance(Arc::new(ScriptedModel::new("mock-model", scripts)) as _)
        .with_tool(Arc::new(PlaceOrderTool) as Arc<dyn Tool>)
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let config = RunConfig {
        max_llm_calls: 3,
        ..Default::default()
    };
    let items = drain_results(runner.run(
        "test_user",
        "test_session",
        Content::user_text("go"),
        config,
    ))
    .await;

    let last = items.last().unwrap();
    assert!(matches!(last, Err(Error::LlmCallsLimitExceeded { limit: 3 })));
}

#[tokio::test]
async fn unknown_session_is_an_error() {
    let agent = Agent::llm("helper")
        .with_model_instance(Arc::new(ScriptedModel::single_text("mock-model", "hi")) as _)
        .build()
        .unwrap();
    let runner = test_runner(agent).await;

    let items = drain_results(runner.run(
        "test_user",
        "no_such_session",
        Content::user_text("hello"),
        RunConfig::default(),
    ))
    .await;

    assert_eq!(items.len(), 1);
    assert!(matches!(
        items[0],
        Err(Error::Session(canopy_core::SessionError::NotFound(_)))
    ));
}

#[tokio::test]
async fn live_mode_converts_chunks_and_forwards_sends() {
    let model = Arc::new(
        ScriptedModel::new("mock-model", vec![]).with_live_incoming(vec![
            LlmResponse::partial_text("Hi"),
            LlmResponse::text("Hi there"),
            LlmResponse {
                turn_complete: true,
                ..Default::default()
            },
        ]),
    );
    let agent = Agent::llm("voice")
        .with_model_instance(Arc::clone(&model) as _)
        .build()
        .unwrap();

    let runner = test_runner(agent).await;
    let queue = LiveRequestQueue::new();
    queue.send_content(Content::user_text("hello"));
    queue.close();

    let events = drain(runner.run_live(
        "test_user",
        "test_session",
        queue,
        RunConfig::default(),
    ))
    .await;

    assert_eq!(events.len(), 3);
    assert!(events[0].partial);
    assert!(!events[1].partial);
    assert!(events[2].actions.turn_complete);
    // The flushed transcription carries the finalized model text.
    let transcript = events[2].content.as_ref().unwrap().first_text().unwrap();
    assert!(transcript.contains("Hi there"));

    // The queued user turn reached the connection before close.
    let sent = model.live_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].first_text(), Some("hello"));
}
