//! Base and moderated requests meeting through the rendezvous store.

use std::sync::Arc;
use std::time::Duration;
use taleward_core::{AdventureConfig, FinalUsed, JudgeStepSpec, Message};
use taleward_runtime::testing::ScriptedInvoker;
use taleward_runtime::{
    EngineError, MemoryAuditSink, RendezvousStore, Speaker, TurnOrchestrator, TurnRequest,
};

const TURN_FOUR: &str = "Turn 4 of 10\n\nA rope bridge sways over the gorge.\n\n1) Cross it\n2) Look for another way\n\nInventory: rope, lantern";

fn adventure() -> AdventureConfig {
    let mut adv = AdventureConfig::new("Gorge", "You are the storyteller.", "story");

    let mut pacing = JudgeStepSpec::new("pacing", "judge-a", "Is the pacing right?");
    pacing.order = 1;
    let mut danger = JudgeStepSpec::new("danger", "judge-b", "Is there real danger?");
    danger.order = 2;
    let mut unused = JudgeStepSpec::new("unused", "judge-c", "Never asked");
    unused.order = 3;
    unused.enabled = false;

    adv.judge_steps = vec![danger, unused, pacing];
    adv
}

/// Conversation `C` at turn 4: three choices made.
fn conversation_at_turn_four() -> Vec<Message> {
    vec![
        Message::user("Begin: the lost gorge"),
        Message::assistant("Turn 1 of 10 ..."),
        Message::user("1"),
        Message::assistant("Turn 2 of 10 ..."),
        Message::user("2"),
        Message::assistant("Turn 3 of 10 ..."),
        Message::user("1"),
    ]
}

fn engine(invoker: Arc<ScriptedInvoker>, sink: Arc<MemoryAuditSink>) -> Arc<TurnOrchestrator> {
    Arc::new(
        TurnOrchestrator::builder(invoker, adventure())
            .store(Arc::new(RendezvousStore::new(Duration::from_secs(30))))
            .wait_timeout(Duration::from_secs(30))
            .poll_interval(Duration::from_millis(500))
            .audit_sink(sink)
            .build(),
    )
}

#[tokio::test(start_paused = true)]
async fn moderated_within_ttl_judges_the_base_turn() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply("story", TURN_FOUR)
            .reply("judge-a", "YES")
            .reply("judge-b", "YES, the bridge is dangerous"),
    );
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = engine(invoker.clone(), sink.clone());

    let base = engine
        .handle(TurnRequest::new("cyoa-base", conversation_at_turn_four()))
        .await
        .unwrap();
    assert_eq!(base.speaker, Speaker::Base);
    assert_eq!(base.content, TURN_FOUR);

    tokio::time::sleep(Duration::from_secs(29)).await;

    let moderated = engine
        .handle(TurnRequest::new("cyoa-moderated", conversation_at_turn_four()))
        .await
        .unwrap();

    assert_eq!(moderated.speaker, Speaker::Moderated);
    assert_eq!(moderated.content, TURN_FOUR);

    let pipeline = moderated.pipeline.unwrap();
    assert_eq!(pipeline.steps.len(), 2);
    let ids: Vec<&str> = pipeline.steps.iter().map(|s| s.step_id.as_str()).collect();
    assert_eq!(ids, vec!["pacing", "danger"]);
    assert!(pipeline.steps.iter().all(|s| s.final_used == FinalUsed::Original));

    assert_eq!(invoker.calls_to("judge-a").await[0].messages[0].content, TURN_FOUR);
    assert_eq!(invoker.calls_to("story").await.len(), 1);
    assert!(invoker.calls_to("judge-c").await.is_empty());
    assert_eq!(sink.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_moderated_request_needs_a_new_base_turn() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply("story", TURN_FOUR)
            .reply("judge-a", "YES")
            .reply("judge-b", "YES"),
    );
    let sink = Arc::new(MemoryAuditSink::new());
    let engine = engine(invoker.clone(), sink.clone());

    engine
        .handle(TurnRequest::new("cyoa-base", conversation_at_turn_four()))
        .await
        .unwrap();
    let first = engine
        .handle(TurnRequest::new("cyoa-moderated", conversation_at_turn_four()))
        .await
        .unwrap();
    assert_eq!(first.content, TURN_FOUR);
    assert!(engine.store().is_empty());

    let err = engine
        .handle(TurnRequest::new("cyoa-moderated", conversation_at_turn_four()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CacheTimeout { .. }));

    assert_eq!(sink.len(), 1);
    assert_eq!(invoker.calls_to("judge-a").await.len(), 1);
    assert_eq!(invoker.calls_to("judge-b").await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn moderated_arriving_first_waits_for_base() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .reply("story", TURN_FOUR)
            .reply("judge-a", "YES")
            .reply("judge-b", "YES"),
    );
    let engine = engine(invoker.clone(), Arc::new(MemoryAuditSink::new()));

    let waiting = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .handle(TurnRequest::new("cyoa-moderated", conversation_at_turn_four()))
                .await
        })
    };

    tokio::time::sleep(Duration::from_secs(3)).await;
    engine
        .handle(TurnRequest::new("cyoa-base", conversation_at_turn_four()))
        .await
        .unwrap();

    let moderated = waiting.await.unwrap().unwrap();
    assert_eq!(moderated.content, TURN_FOUR);
    assert_eq!(moderated.pipeline.unwrap().steps.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn moderated_after_ttl_reports_cache_timeout() {
    let invoker = Arc::new(ScriptedInvoker::new().reply("story", TURN_FOUR));
    let engine = engine(invoker.clone(), Arc::new(MemoryAuditSink::new()));

    engine
        .handle(TurnRequest::new("cyoa-base", conversation_at_turn_four()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;

    let err = engine
        .handle(TurnRequest::new("cyoa-moderated", conversation_at_turn_four()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CacheTimeout { .. }));
    assert_eq!(err.status_code(), 408);
    assert!(invoker.calls_to("judge-a").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn different_turn_does_not_pick_up_another_turns_entry() {
    let invoker = Arc::new(ScriptedInvoker::new().reply("story", TURN_FOUR));
    let engine = engine(invoker, Arc::new(MemoryAuditSink::new()));

    engine
        .handle(TurnRequest::new("cyoa-base", conversation_at_turn_four()))
        .await
        .unwrap();

    let mut later = conversation_at_turn_four();
    later.push(Message::assistant(TURN_FOUR));
    later.push(Message::user("2"));

    let err = engine
        .handle(TurnRequest::new("cyoa-moderated", later))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CacheTimeout { .. }));
}
