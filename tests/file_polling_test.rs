use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use herald::command::{CommandProcessor, RemoteCommand};
use herald::commands::CommandRegistry;
use herald::commands::kill::Kill;
use herald::commands::ping::Ping;
use herald::consts::NOT_PERMITTED;
use herald::engine::file_polling::{FilePollingEngine, PollingOptions};
use herald::engine::{EngineSettings, ScriptingEngine};
use herald::error::Error;
use herald::policy::mock::{Outcome, RecordingHandler};
use herald::policy::{DenyAll, PermissionHandler};

fn layout() -> (tempfile::TempDir, PollingOptions) {
    let root = tempfile::tempdir().unwrap();
    let mut options = PollingOptions::under(root.path());
    for dir in [
        &options.incoming,
        &options.processing,
        &options.processed,
        &options.failed,
    ] {
        std::fs::create_dir(dir).unwrap();
    }
    options.settle_time = Duration::ZERO;
    options.poll_interval = Duration::from_millis(50);
    (root, options)
}

fn recording(recorder: &Arc<RecordingHandler>) -> EngineSettings {
    EngineSettings {
        request_handler: recorder.clone(),
        response_handler: recorder.clone(),
        ..EngineSettings::default()
    }
}

fn drop_command(dir: &Path, name: &str, command: &dyn RemoteCommand) {
    let data = CommandRegistry::new().format(command).unwrap();
    std::fs::write(dir.join(name), data).unwrap();
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn empty_incoming_does_nothing() {
    let (_root, options) = layout();
    let engine = FilePollingEngine::new(EngineSettings::default(), options.clone());

    assert_eq!(engine.scan().await.unwrap(), 0);
    for dir in [&options.processing, &options.processed, &options.failed] {
        assert!(names(dir).is_empty());
    }
}

#[tokio::test]
async fn ping_file_ends_up_processed() {
    let (_root, options) = layout();
    let recorder = Arc::new(RecordingHandler::new());
    let engine = FilePollingEngine::new(recording(&recorder), options.clone());
    drop_command(&options.incoming, "001-ping.json", &Ping::request());

    assert_eq!(engine.scan().await.unwrap(), 1);
    assert!(names(&options.incoming).is_empty());
    assert!(names(&options.processing).is_empty());
    assert_eq!(names(&options.processed), vec!["001-ping.json"]);
    assert_eq!(
        recorder.outcomes(),
        vec![Outcome::RequestSuccessful("ping".to_string())]
    );
}

#[tokio::test]
async fn unreadable_command_ends_up_failed() {
    let (_root, options) = layout();
    let recorder = Arc::new(RecordingHandler::new());
    let engine = FilePollingEngine::new(recording(&recorder), options.clone());
    std::fs::write(options.incoming.join("garbage.txt"), b"{ not json").unwrap();
    std::fs::write(
        options.incoming.join("unknown.json"),
        br#"{"command":"nope","request":true}"#,
    )
    .unwrap();

    assert_eq!(engine.scan().await.unwrap(), 2);
    assert_eq!(names(&options.failed), vec!["garbage.txt", "unknown.json"]);
    assert!(names(&options.processed).is_empty());
    assert!(recorder.is_empty());
}

#[tokio::test]
async fn rejected_command_ends_up_failed() {
    let (_root, options) = layout();
    let recorder = Arc::new(RecordingHandler::new());
    let engine = FilePollingEngine::new(
        EngineSettings {
            permission_handler: Arc::new(DenyAll),
            ..recording(&recorder)
        },
        options.clone(),
    );
    drop_command(&options.incoming, "ping.json", &Ping::request());

    engine.scan().await.unwrap();
    assert_eq!(names(&options.failed), vec!["ping.json"]);
    assert_eq!(
        recorder.outcomes(),
        vec![Outcome::RequestRejected(
            "ping".to_string(),
            NOT_PERMITTED.to_string()
        )]
    );
}

/// Notes which directories hold the file at the moment permission is asked.
struct Observer {
    options: PollingOptions,
    file: &'static str,
    seen: Mutex<Vec<&'static str>>,
}

impl PermissionHandler for Observer {
    fn permitted(&self, _command: &dyn RemoteCommand) -> bool {
        let dirs = [
            ("incoming", &self.options.incoming),
            ("processing", &self.options.processing),
            ("processed", &self.options.processed),
            ("failed", &self.options.failed),
        ];
        let mut seen = self.seen.lock();
        for (label, dir) in dirs {
            if dir.join(self.file).exists() {
                seen.push(label);
            }
        }
        true
    }
}

#[tokio::test]
async fn file_is_only_in_processing_while_it_runs() {
    let (_root, options) = layout();
    let observer = Arc::new(Observer {
        options: options.clone(),
        file: "ping.json",
        seen: Mutex::new(Vec::new()),
    });
    let engine = FilePollingEngine::new(
        EngineSettings {
            permission_handler: observer.clone(),
            ..EngineSettings::default()
        },
        options.clone(),
    );
    drop_command(&options.incoming, "ping.json", &Ping::request());

    engine.scan().await.unwrap();
    assert_eq!(*observer.seen.lock(), vec!["processing"]);
    assert_eq!(names(&options.processed), vec!["ping.json"]);
}

#[tokio::test]
async fn copy_moves_when_rename_is_disabled() {
    let (_root, mut options) = layout();
    options.atomic_move = false;
    let engine = FilePollingEngine::new(EngineSettings::default(), options.clone());
    drop_command(&options.incoming, "a.json", &Ping::request());
    drop_command(&options.incoming, "b.json", &Ping::request());

    assert_eq!(engine.scan().await.unwrap(), 2);
    assert_eq!(names(&options.processed), vec!["a.json", "b.json"]);
    assert!(names(&options.incoming).is_empty());
}

#[tokio::test]
async fn running_engine_picks_up_new_files_until_killed() {
    let (_root, options) = layout();
    let recorder = Arc::new(RecordingHandler::new());
    let engine = FilePollingEngine::new(recording(&recorder), options.clone());
    let runner = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.execute().await })
    };

    drop_command(&options.incoming, "1-ping.json", &Ping::request());
    eventually("ping processed", || recorder.len() == 1).await;

    drop_command(&options.incoming, "2-kill.json", &Kill::new());
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("engine should stop")
        .unwrap()
        .unwrap();

    assert!(engine.is_stopped());
    assert_eq!(names(&options.processed), vec!["1-ping.json", "2-kill.json"]);
    assert_eq!(
        recorder.outcomes(),
        vec![
            Outcome::RequestSuccessful("ping".to_string()),
            Outcome::RequestSuccessful("kill".to_string()),
        ]
    );
}

#[tokio::test]
async fn missing_incoming_stops_startup() {
    let (_root, options) = layout();
    std::fs::remove_dir(&options.incoming).unwrap();
    let engine = FilePollingEngine::new(EngineSettings::default(), options);

    let err = engine.execute().await.unwrap_err();
    assert!(matches!(err, Error::MissingDirectory { label: "incoming", .. }));
    assert!(err.to_string().contains("incoming"));
}
