use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use herald::commands::mock::{MockCommand, Probe};
use herald::engine::manual_feed::ManualFeedEngine;
use herald::engine::{EngineSettings, EngineState, ScriptingEngine};
use herald::error::Error;
use herald::job::Job;
use tokio::sync::Notify;

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn feed(max_concurrent_jobs: usize) -> Arc<ManualFeedEngine> {
    ManualFeedEngine::new(EngineSettings {
        max_concurrent_jobs,
        ..EngineSettings::default()
    })
}

fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
    let counter = Arc::clone(counter);
    Job::new("count", async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn pause_lets_submitted_jobs_finish() {
    let engine = feed(2);
    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.execute().await })
    };
    eventually("engine running", || engine.state() == EngineState::Running).await;

    let counter = Arc::new(AtomicUsize::new(0));
    for _ in 0..4 {
        engine.queue_job(counting_job(&counter)).await.unwrap();
    }
    engine.pause_execution();
    assert!(engine.is_paused());

    eventually("all jobs done", || counter.load(Ordering::SeqCst) == 4).await;
    assert!(engine.is_paused());

    engine.stop_execution().await;
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn paused_engine_takes_no_new_commands() {
    let engine = feed(1);
    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.execute().await })
    };
    eventually("engine running", || engine.state() == EngineState::Running).await;

    engine.pause_execution();
    let probe = Probe::new();
    engine
        .add_command(Box::new(MockCommand::request("later", &probe)))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(probe.requests(), 0);

    engine.resume_execution();
    eventually("command handled after resume", || probe.requests() == 1).await;

    engine.stop_execution().await;
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_drops_queued_jobs() {
    let engine = feed(1);
    let gate = Arc::new(Notify::new());
    let counter = Arc::new(AtomicUsize::new(0));

    let held = {
        let gate = Arc::clone(&gate);
        let counter = Arc::clone(&counter);
        Job::new("held", async move {
            gate.notified().await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };
    engine.queue_job(held).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    engine.queue_job(counting_job(&counter)).await.unwrap();

    engine.stop_execution().await;
    gate.notify_one();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // the running job finishes, the queued one never starts
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(matches!(
        engine.queue_job(counting_job(&counter)).await,
        Err(Error::Stopped)
    ));
}

#[tokio::test]
async fn stopped_engine_cannot_run_again() {
    let engine = feed(1);
    engine.stop_execution().await;
    assert_eq!(engine.state(), EngineState::Stopped);
    assert!(matches!(engine.execute().await, Err(Error::Stopped)));

    engine.pause_execution();
    engine.resume_execution();
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn resizing_the_pool_keeps_accepting_jobs() {
    let engine = feed(1);
    let counter = Arc::new(AtomicUsize::new(0));
    engine.queue_job(counting_job(&counter)).await.unwrap();

    engine.core().set_max_concurrent_jobs(3).unwrap();
    for _ in 0..3 {
        engine.queue_job(counting_job(&counter)).await.unwrap();
    }
    eventually("jobs from both pools", || counter.load(Ordering::SeqCst) == 4).await;
}
