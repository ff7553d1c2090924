//! ReAct loop: concurrent fan-out and partial-failure behavior.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use ai_llm_service::types::ToolCallFunction;
use ai_llm_service::{ChatMessage, ChatOutcome, LlmClient, ScriptedService, ToolCall};
use contract_model::StructureParser;
use review_graph::react::react_agent_loop;
use skill_dispatch::{SkillDeps, SkillDispatcher, generic_skills};

fn structure() -> contract_model::DocumentStructure {
    StructureParser::generic().parse(
        "14.2 Advance payment of 10% shall be repaid within 30 days.\n17.6 Liability cap.\n",
        "doc-1",
    )
}

fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        call_type: "function".to_string(),
        function: ToolCallFunction {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("review the clause"),
        ChatMessage::user("clause 14.2"),
    ]
}

// P5: N tool calls whose handlers each wait T settle in ~T, not N·T. The
// two skills below both consult the (delayed) skill-side LLM; under paused
// time, serial execution would advance the clock twice as far.
#[tokio::test(start_paused = true)]
async fn tool_fan_out_runs_concurrently() {
    let delay = Duration::from_millis(120);
    let skill_llm = Arc::new(
        ScriptedService::texts(&["not json", "not json either"]).with_delay(delay),
    );
    let mut dispatcher = SkillDispatcher::new(SkillDeps {
        llm: Some(Arc::new(LlmClient::Scripted(skill_llm))),
        workflow: None,
    });
    dispatcher.register_batch(generic_skills()).unwrap();

    let loop_llm = Arc::new(ScriptedService::new(vec![
        ChatOutcome {
            content: String::new(),
            tool_calls: vec![
                tool_call(
                    "call_0",
                    "compare_with_baseline",
                    r#"{"clause_id":"14.2","baseline_text":"completely different baseline wording"}"#,
                ),
                tool_call("call_1", "assess_deviation", r#"{"clause_id":"14.2"}"#),
            ],
        },
        ChatOutcome {
            content: "[]".to_string(),
            tool_calls: Vec::new(),
        },
    ]));

    let snapshot = json!({
        "our_party": "Contractor",
        "language": "en",
        "domain_id": "",
        "criteria_data": [{"criterion_id": "c1", "clause_ref": "14.2", "review_point": "advance", "risk_level": "high"}],
        "criteria_file_path": "",
        "reference_structures": [],
    });

    let started = tokio::time::Instant::now();
    let outcome = react_agent_loop(
        &LlmClient::Scripted(loop_llm),
        &dispatcher,
        messages(),
        "14.2",
        &structure(),
        &snapshot,
        None,
        5,
        0.1,
    )
    .await;
    let elapsed = started.elapsed();

    assert!(outcome.skill_context.contains_key("compare_with_baseline"));
    assert!(outcome.skill_context.contains_key("assess_deviation"));
    // Parallel: one delay window, not two.
    assert!(
        elapsed < delay * 2,
        "expected concurrent fan-out, elapsed {elapsed:?}"
    );
    assert!(elapsed >= delay, "handlers did wait, elapsed {elapsed:?}");
}

// P6: one failing call out of two leaves the sibling's result in the
// context and emits exactly one error tool message.
#[tokio::test]
async fn partial_failure_keeps_siblings() {
    let dispatcher = {
        let mut d = SkillDispatcher::new(SkillDeps::default());
        d.register_batch(generic_skills()).unwrap();
        d
    };
    let loop_llm = Arc::new(ScriptedService::new(vec![
        ChatOutcome {
            content: String::new(),
            tool_calls: vec![
                tool_call("call_0", "get_clause_context", r#"{"clause_id":"14.2"}"#),
                tool_call("call_1", "no_such_skill", "{}"),
            ],
        },
        ChatOutcome {
            content: "[]".to_string(),
            tool_calls: Vec::new(),
        },
    ]));

    let outcome = react_agent_loop(
        &LlmClient::Scripted(loop_llm),
        &dispatcher,
        messages(),
        "14.2",
        &structure(),
        &json!({}),
        None,
        5,
        0.1,
    )
    .await;

    assert!(outcome.skill_context.contains_key("get_clause_context"));
    assert!(!outcome.skill_context.contains_key("no_such_skill"));
    let error_messages: Vec<_> = outcome
        .messages
        .iter()
        .filter(|m| m.role == "tool" && m.content.as_deref().unwrap_or("").contains("error"))
        .collect();
    assert_eq!(error_messages.len(), 1);
}

// Budget exhaustion: the loop force-ends with empty risks but keeps the
// gathered context.
#[tokio::test]
async fn iteration_budget_forces_end() {
    let dispatcher = {
        let mut d = SkillDispatcher::new(SkillDeps::default());
        d.register_batch(generic_skills()).unwrap();
        d
    };
    // Every round asks for another tool; the model never concludes.
    let rounds: Vec<ChatOutcome> = (0..3)
        .map(|i| ChatOutcome {
            content: String::new(),
            tool_calls: vec![tool_call(
                &format!("call_{i}"),
                "get_clause_context",
                r#"{"clause_id":"14.2"}"#,
            )],
        })
        .collect();
    let loop_llm = Arc::new(ScriptedService::new(rounds));

    let outcome = react_agent_loop(
        &LlmClient::Scripted(loop_llm.clone()),
        &dispatcher,
        messages(),
        "14.2",
        &structure(),
        &json!({}),
        None,
        3,
        0.1,
    )
    .await;

    assert!(outcome.raw_risks.is_empty());
    assert!(outcome.skill_context.contains_key("get_clause_context"));
    assert_eq!(loop_llm.call_count(), 3);
}

// An LLM transport failure mid-loop returns what was accumulated so far.
#[tokio::test]
async fn llm_failure_breaks_loop_gracefully() {
    let dispatcher = {
        let mut d = SkillDispatcher::new(SkillDeps::default());
        d.register_batch(generic_skills()).unwrap();
        d
    };
    let loop_llm = Arc::new(ScriptedService::new(vec![ChatOutcome {
        content: String::new(),
        tool_calls: vec![tool_call(
            "call_0",
            "get_clause_context",
            r#"{"clause_id":"14.2"}"#,
        )],
    }]));
    // Second round has no scripted response and errors.
    let outcome = react_agent_loop(
        &LlmClient::Scripted(loop_llm),
        &dispatcher,
        messages(),
        "14.2",
        &structure(),
        &json!({}),
        None,
        5,
        0.1,
    )
    .await;
    assert!(outcome.raw_risks.is_empty());
    assert!(outcome.skill_context.contains_key("get_clause_context"));
}
