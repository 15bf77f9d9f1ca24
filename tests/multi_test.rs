use std::sync::Arc;
use std::time::Duration;

use herald::commands::kill::Kill;
use herald::commands::mock::{MockCommand, Probe};
use herald::engine::file_polling::{FilePollingEngine, PollingOptions};
use herald::engine::manual_feed::ManualFeedEngine;
use herald::engine::multi::MultiEngine;
use herald::engine::{EngineSettings, EngineState, ScriptingEngine};
use herald::error::Error;
use herald::policy::mock::{Outcome, RecordingHandler};

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn recording(recorder: &Arc<RecordingHandler>) -> EngineSettings {
    EngineSettings {
        request_handler: recorder.clone(),
        response_handler: recorder.clone(),
        ..EngineSettings::default()
    }
}

/// A feed engine preloaded with `name` followed by a kill.
async fn one_shot(recorder: &Arc<RecordingHandler>, name: &str) -> Arc<ManualFeedEngine> {
    let engine = ManualFeedEngine::new(recording(recorder));
    engine
        .add_command(Box::new(MockCommand::request(name, &Probe::new())))
        .await
        .unwrap();
    engine.add_command(Box::new(Kill::new())).await.unwrap();
    engine
}

fn succeeded(name: &str) -> Outcome {
    Outcome::RequestSuccessful(name.to_string())
}

#[tokio::test]
async fn children_run_one_after_another() {
    let recorder = Arc::new(RecordingHandler::new());
    let first = one_shot(&recorder, "first").await;
    let second = one_shot(&recorder, "second").await;
    let children: Vec<Arc<dyn ScriptingEngine>> = vec![first.clone(), second.clone()];
    let multi = MultiEngine::new(children);

    tokio::time::timeout(Duration::from_secs(3), multi.execute())
        .await
        .expect("both children should finish")
        .unwrap();

    assert_eq!(
        recorder.outcomes(),
        vec![
            succeeded("first"),
            succeeded("kill"),
            succeeded("second"),
            succeeded("kill"),
        ]
    );
    assert!(first.is_stopped());
    assert!(second.is_stopped());
    assert_eq!(multi.state(), EngineState::Stopped);
}

#[tokio::test]
async fn removing_the_running_child_moves_on_to_the_next() {
    let recorder = Arc::new(RecordingHandler::new());
    let first = ManualFeedEngine::with_max_commands(recording(&recorder), 7).unwrap();
    let second = one_shot(&recorder, "second").await;
    let third = one_shot(&recorder, "third").await;
    let children: Vec<Arc<dyn ScriptingEngine>> =
        vec![first.clone(), second.clone(), third.clone()];
    let multi = MultiEngine::new(children);
    let runner = {
        let multi = Arc::clone(&multi);
        tokio::spawn(async move { multi.execute().await })
    };
    eventually("first child running", || first.state() == EngineState::Running).await;

    assert!(multi.remove_engine(&first.configuration()).await);
    tokio::time::timeout(Duration::from_secs(3), runner)
        .await
        .expect("composite should finish")
        .unwrap()
        .unwrap();

    assert_eq!(
        recorder.outcomes(),
        vec![
            succeeded("second"),
            succeeded("kill"),
            succeeded("third"),
            succeeded("kill"),
        ]
    );
    assert!(second.is_stopped());
    assert!(third.is_stopped());
    assert_eq!(multi.engines().len(), 2);
}

#[tokio::test]
async fn failing_child_is_reported_and_the_rest_still_run() {
    let root = tempfile::tempdir().unwrap();
    let broken =
        FilePollingEngine::new(EngineSettings::default(), PollingOptions::under(root.path()));
    let recorder = Arc::new(RecordingHandler::new());
    let healthy = one_shot(&recorder, "after").await;
    let children: Vec<Arc<dyn ScriptingEngine>> = vec![broken, healthy.clone()];
    let multi = MultiEngine::new(children);

    let err = tokio::time::timeout(Duration::from_secs(3), multi.execute())
        .await
        .expect("composite should finish")
        .unwrap_err();

    let Error::Multiple(errors) = &err else {
        panic!("expected collected errors, got {err:?}");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("engine #0: incoming directory does not exist"));
    assert_eq!(recorder.outcomes(), vec![succeeded("after"), succeeded("kill")]);
    assert!(healthy.is_stopped());
}

#[tokio::test]
async fn engine_added_while_running_is_run_later() {
    let recorder = Arc::new(RecordingHandler::new());
    let first = ManualFeedEngine::new(recording(&recorder));
    let children: Vec<Arc<dyn ScriptingEngine>> = vec![first.clone()];
    let multi = MultiEngine::new(children);
    let runner = {
        let multi = Arc::clone(&multi);
        tokio::spawn(async move { multi.execute().await })
    };
    eventually("first child running", || first.state() == EngineState::Running).await;

    let late = one_shot(&recorder, "late").await;
    multi.add_engine(late.clone());
    first.add_command(Box::new(Kill::new())).await.unwrap();

    tokio::time::timeout(Duration::from_secs(3), runner)
        .await
        .expect("composite should finish")
        .unwrap()
        .unwrap();
    assert_eq!(
        recorder.outcomes(),
        vec![succeeded("kill"), succeeded("late"), succeeded("kill")]
    );
}

#[tokio::test]
async fn stop_ends_the_current_child_and_skips_the_rest() {
    let recorder = Arc::new(RecordingHandler::new());
    let first = ManualFeedEngine::new(recording(&recorder));
    let second = one_shot(&recorder, "never").await;
    let children: Vec<Arc<dyn ScriptingEngine>> = vec![first.clone(), second.clone()];
    let multi = MultiEngine::new(children);
    let runner = {
        let multi = Arc::clone(&multi);
        tokio::spawn(async move { multi.execute().await })
    };
    eventually("first child running", || first.state() == EngineState::Running).await;

    multi.stop_execution().await;
    tokio::time::timeout(Duration::from_secs(3), runner)
        .await
        .expect("composite should finish")
        .unwrap()
        .unwrap();

    assert!(multi.is_stopped());
    assert!(second.is_stopped());
    assert!(recorder.is_empty());
}
