use std::sync::Arc;

use serde_json::json;

use screenflow::config::{AppConfig, TimingConfig, VerificationMode};
use screenflow::device::recording::RecordingBackend;
use screenflow::device::types::{actions, PageInfo};
use screenflow::graph::document::ConfigDocument;
use screenflow::state::Variables;
use screenflow::ScreenFlow;

const CHAT_APP: &str = r#"{
    "appName": "Chatter",
    "packageName": "com.example.chat",
    "nodes": [
        {"name": "Home", "description": "Main screen", "activityName": ".MainActivity", "nodeType": "HOME"},
        {"name": "Chat", "description": "Conversation", "activityName": ".ChatActivity", "nodeType": "DETAIL"},
        {"name": "Contact", "description": "Contact page", "activityName": ".ContactActivity"}
    ],
    "edges": [
        {"from": "Home", "to": "Chat",
         "operation": {"type": "Click", "selector": {"type": "ByText", "value": "Chats"}}},
        {"from": "Chat", "to": "Contact",
         "operations": [
            {"type": "Click", "selector": {"type": "ByText", "value": "{{contact}}"}},
            {"type": "Bogus"}
         ]},
        {"from": "Home", "to": "Contact",
         "operation": {"type": "Teleport"}}
    ],
    "functions": [
        {"name": "OpenChat", "description": "Type a message",
         "targetNodeName": "Chat",
         "operation": {"type": "Input", "selector": {"type": "ByResourceId", "value": "msgBox"},
                       "textVariableKey": "text"}},
        {"name": "MessageContact", "description": "Write to a contact",
         "targetNodeName": "Contact",
         "operation": {"type": "Input", "selector": {"type": "ByText", "value": "{{contact}}"},
                       "textVariableKey": "message"}}
    ]
}"#;

fn values(pairs: &[(&str, serde_json::Value)]) -> Variables {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn home_page() -> PageInfo {
    PageInfo::new("com.example.chat", Some(".MainActivity"))
}

fn chat_page() -> PageInfo {
    PageInfo::new("com.example.chat", Some(".ChatActivity"))
}

fn flow_with(backend: Arc<RecordingBackend>, timing: TimingConfig) -> ScreenFlow {
    let config = AppConfig {
        timing,
        ..AppConfig::default()
    };
    let flow = ScreenFlow::new(backend, &config);
    let doc = ConfigDocument::from_json(CHAT_APP).unwrap();
    let report = flow.load_document(&doc, false);
    assert_eq!(report.nodes_added, 3);
    // the Teleport edge has no usable operation
    assert_eq!(report.edges_added, 2);
    assert!(!report.warnings.is_empty());
    flow
}

#[tokio::test]
async fn open_chat_clicks_then_types() {
    let backend = Arc::new(
        RecordingBackend::new(home_page()).with_transition(actions::CLICK_ELEMENT, chat_page()),
    );
    let flow = flow_with(backend.clone(), TimingConfig::without_delays());

    let plan = flow.plan("OpenChat", None, &Variables::new()).await.unwrap();
    let keys: Vec<&str> = plan.parameters().iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["text"]);

    let result = flow.execute(&plan, values(&[("text", json!("hi"))])).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_state.as_ref().unwrap().node_id(), "Chat");
    assert!(result.warnings.is_empty());

    let calls = backend.dispatched().await;
    let sequence: Vec<&str> = calls.iter().map(|c| c.action.as_str()).collect();
    assert_eq!(
        sequence,
        vec![actions::CLICK_ELEMENT, actions::CLICK_ELEMENT, actions::SET_INPUT_TEXT]
    );
    assert_eq!(calls[0].params["text"], json!("Chats"));
    assert_eq!(calls[1].params["resource_id"], json!("msgBox"));
    assert_eq!(calls[2].params["text"], json!("hi"));
}

#[tokio::test]
async fn missing_parameter_dispatches_nothing() {
    let backend = Arc::new(RecordingBackend::new(home_page()));
    let flow = flow_with(backend.clone(), TimingConfig::without_delays());

    let plan = flow.plan("OpenChat", None, &Variables::new()).await.unwrap();
    let reads_after_planning = backend.calls().await.len();

    let result = flow.execute(&plan, Variables::new()).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("text"));
    assert!(backend.dispatched().await.is_empty());
    assert_eq!(backend.calls().await.len(), reads_after_planning);
}

#[tokio::test]
async fn contact_template_is_declared_and_filled() {
    let backend = Arc::new(
        RecordingBackend::new(home_page())
            .with_transition(actions::CLICK_ELEMENT, chat_page())
            .with_transition(
                actions::CLICK_ELEMENT,
                PageInfo::new("com.example.chat", Some(".ContactActivity")),
            ),
    );
    let timing = TimingConfig {
        verification: VerificationMode::Expected,
        ..TimingConfig::without_delays()
    };
    let flow = flow_with(backend.clone(), timing);

    let plan = flow.plan("MessageContact", None, &Variables::new()).await.unwrap();
    let keys: Vec<&str> = plan.parameters().iter().map(|p| p.key.as_str()).collect();
    assert_eq!(keys, vec!["contact", "message"]);
    assert_eq!(plan.path().edges.len(), 3);

    let result = flow
        .execute(
            &plan,
            values(&[("contact", json!("Alice")), ("message", json!("lunch?"))]),
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.final_state.unwrap().node_id(), "Contact");

    let calls = backend.dispatched().await;
    assert_eq!(calls[1].params["text"], json!("Alice"));
    let typed = calls
        .iter()
        .find(|c| c.action == actions::SET_INPUT_TEXT)
        .unwrap();
    assert_eq!(typed.params["text"], json!("lunch?"));
}

#[tokio::test]
async fn rejected_click_fails_with_last_state() {
    let backend = Arc::new(RecordingBackend::new(home_page()).failing(actions::CLICK_ELEMENT));
    let flow = flow_with(backend.clone(), TimingConfig::without_delays());

    let result = flow
        .run("OpenChat", None, values(&[("text", json!("hi"))]))
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.final_state.unwrap().node_id(), "Home");
    assert_eq!(backend.count(actions::SET_INPUT_TEXT).await, 0);
}

#[tokio::test]
async fn unknown_function_has_no_plan() {
    let backend = Arc::new(RecordingBackend::new(home_page()));
    let flow = flow_with(backend, TimingConfig::without_delays());
    assert!(flow.plan("DeleteEverything", None, &Variables::new()).await.is_err());
}
