//! Directory work queue.
//!
//! Each file dropped into `incoming` holds one command and moves through
//! `incoming -> processing -> processed | failed`. Files are picked up in
//! name order, one at a time, on the engine loop.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::command_handler::dispatch;
use super::{EngineCore, EngineSettings, ScriptingEngine, bound};
use crate::command::CommandProcessor;
use crate::commands::CommandRegistry;
use crate::consts::{DEFAULT_POLL_INTERVAL, DEFAULT_SETTLE_TIME};
use crate::error::{Error, Result};

/// Where the engine looks for work and how it moves files.
#[derive(Debug, Clone)]
pub struct PollingOptions {
    pub incoming: PathBuf,
    pub processing: PathBuf,
    pub processed: PathBuf,
    pub failed: PathBuf,
    /// Rename between directories, falling back to copy and delete when
    /// rename fails. When off, files are always copied and deleted.
    pub atomic_move: bool,
    pub poll_interval: Duration,
    /// A file modified more recently than this is assumed to still be
    /// written and is left for the next scan.
    pub settle_time: Duration,
}

impl PollingOptions {
    pub fn new(
        incoming: impl Into<PathBuf>,
        processing: impl Into<PathBuf>,
        processed: impl Into<PathBuf>,
        failed: impl Into<PathBuf>,
    ) -> Self {
        Self {
            incoming: incoming.into(),
            processing: processing.into(),
            processed: processed.into(),
            failed: failed.into(),
            atomic_move: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_time: DEFAULT_SETTLE_TIME,
        }
    }

    /// The four directories as subdirectories of `root`.
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("incoming"),
            root.join("processing"),
            root.join("processed"),
            root.join("failed"),
        )
    }

    fn directories(&self) -> [(&'static str, &Path); 4] {
        [
            ("incoming", &self.incoming),
            ("processing", &self.processing),
            ("processed", &self.processed),
            ("failed", &self.failed),
        ]
    }
}

pub struct FilePollingEngine {
    core: EngineCore,
    options: PollingOptions,
    processor: Arc<dyn CommandProcessor>,
}

impl FilePollingEngine {
    pub fn new(settings: EngineSettings, options: PollingOptions) -> Arc<Self> {
        Self::with_processor(settings, options, Arc::new(CommandRegistry::new()))
    }

    pub fn with_processor(
        settings: EngineSettings,
        options: PollingOptions,
        processor: Arc<dyn CommandProcessor>,
    ) -> Arc<Self> {
        bound(Arc::new(Self {
            core: EngineCore::new(settings),
            options,
            processor,
        }))
    }

    pub fn options(&self) -> &PollingOptions {
        &self.options
    }

    /// Fail unless all four directories exist.
    pub async fn check_directories(&self) -> Result<()> {
        for (label, path) in self.options.directories() {
            let metadata = match tokio::fs::metadata(path).await {
                Ok(metadata) => metadata,
                Err(_) => {
                    return Err(Error::MissingDirectory {
                        label,
                        path: path.to_path_buf(),
                    });
                }
            };
            if !metadata.is_dir() {
                return Err(Error::NotADirectory {
                    label,
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    /// Plain files directly under `incoming`, in name order.
    async fn list_incoming(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.options.incoming).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn is_settled(&self, path: &Path) -> bool {
        let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return true,
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age >= self.options.settle_time)
            .unwrap_or(self.options.settle_time.is_zero())
    }

    async fn move_file(&self, from: &Path, to_dir: &Path) -> Result<PathBuf> {
        let name = from
            .file_name()
            .ok_or_else(|| Error::Handler(format!("not a file: {}", from.display())))?;
        let to = to_dir.join(name);
        if self.options.atomic_move {
            match tokio::fs::rename(from, &to).await {
                Ok(()) => return Ok(to),
                Err(e) => {
                    warn!(path = %from.display(), "rename failed, copying instead: {e}");
                }
            }
        }
        tokio::fs::copy(from, &to).await?;
        if let Err(e) = tokio::fs::remove_file(from).await {
            // the file must stay in exactly one directory
            if let Err(undo) = tokio::fs::remove_file(&to).await {
                error!(path = %to.display(), "failed to remove copy: {undo}");
            }
            return Err(e.into());
        }
        Ok(to)
    }

    /// Run the command stored in `path`. Returns whether it succeeded.
    async fn process(&self, path: &Path) -> bool {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                error!(path = %path.display(), "failed to read command file: {e}");
                return false;
            }
        };
        let command = match self.processor.parse(&data) {
            Ok(command) => command,
            Err(e) => {
                error!(path = %path.display(), "{e}");
                return false;
            }
        };
        if !self.core.admit(command.as_ref()) {
            return false;
        }

        if let Some(handler) = self.core.installed_command_handler() {
            let name = command.name().to_string();
            return match handler.handle(command).await {
                Ok(()) => true,
                Err(e) => {
                    error!(command = %name, path = %path.display(), "failed to handle command: {e}");
                    false
                }
            };
        }

        match self.core.engine() {
            Some(owner) => dispatch(owner.as_ref(), command).await,
            None => dispatch(self, command).await,
        }
        true
    }

    /// Take one file through its whole cycle. Returns `false` if it was
    /// left where it was.
    async fn handle_file(&self, file: &Path) -> bool {
        if !self.is_settled(file).await {
            debug!(path = %file.display(), "file still being written, retrying later");
            return false;
        }

        let processing = match self.move_file(file, &self.options.processing).await {
            Ok(processing) => processing,
            Err(e) => {
                error!(path = %file.display(), "failed to move file to processing: {e}");
                return false;
            }
        };

        let success = self.process(&processing).await;
        let target = if success {
            &self.options.processed
        } else {
            &self.options.failed
        };
        match self.move_file(&processing, target).await {
            Ok(done) => {
                info!(path = %done.display(), success, "command file handled");
            }
            Err(e) => {
                error!(path = %processing.display(), "failed to move processed file: {e}");
            }
        }
        true
    }

    /// One pass over `incoming`. Returns how many files were handled.
    pub async fn scan(&self) -> Result<usize> {
        let files = self.list_incoming().await?;
        let mut handled = 0;
        for file in files {
            if !self.core.wait_while_paused().await {
                break;
            }
            if self.handle_file(&file).await {
                handled += 1;
            }
        }
        Ok(handled)
    }
}

#[async_trait]
impl ScriptingEngine for FilePollingEngine {
    fn core(&self) -> &EngineCore {
        &self.core
    }

    fn configuration(&self) -> String {
        let options = &self.options;
        format!(
            "file-polling --incoming {} --processing {} --processed {} --failed {} --atomic-move {} --max-concurrent-jobs {}",
            options.incoming.display(),
            options.processing.display(),
            options.processed.display(),
            options.failed.display(),
            options.atomic_move,
            self.core.max_concurrent_jobs()
        )
    }

    async fn execute(&self) -> Result<()> {
        self.check_directories().await?;
        self.core.start()?;
        self.core.start_pool();
        info!(incoming = %self.options.incoming.display(), "file polling engine running");

        loop {
            if !self.core.wait_while_paused().await {
                break;
            }
            match self.scan().await {
                Ok(0) => {}
                Ok(handled) => debug!(handled, "scan finished"),
                Err(e) => error!(incoming = %self.options.incoming.display(), "scan failed: {e}"),
            }
            tokio::select! {
                _ = self.core.wait_stopped() => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }

        self.core.shutdown_pool().await;
        info!("file polling engine finished");
        Ok(())
    }
}
