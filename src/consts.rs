//! Project-wide constants.

use std::path::PathBuf;
use std::time::Duration;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Default port the socket engine listens on.
pub const DEFAULT_PORT: u16 = 12345;

/// Default bind address of the socket engine.
pub const DEFAULT_ADDRESS: &str = "0.0.0.0";

/// Default capacity of the manual-feed command queue.
pub const DEFAULT_MAX_COMMANDS: usize = 100;

/// Default number of jobs an engine runs at the same time.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 1;

/// How long the manual-feed loop waits on its queue before looking again.
pub const QUEUE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause between two scans of the incoming directory.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Files modified more recently than this are considered still being written.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(100);

/// Reported when a response command cannot handle responses.
pub const RESPONSE_UNSUPPORTED: &str = "Command does not support response handling!";

/// Reported to the request handler when the permission handler says no.
pub const NOT_PERMITTED: &str = "Not permitted!";

/// Default configuration path: `~/.herald/engine.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".herald").join("engine.toml"))
}
