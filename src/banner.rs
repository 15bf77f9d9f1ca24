//! Startup banner display.

use crate::consts::{AUTHOR, HOMEPAGE, REPO};

/// What the process is about to run, for display in the startup banner.
pub struct BannerInfo<'a> {
    /// Configuration string of the top-level engine.
    pub engine: &'a str,
    /// Where the configuration came from.
    pub source: &'a str,
}

/// Print the startup banner with engine info.
pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║             H E R A L D               ║
   ║    commands in, handlers out          ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   config    {}
   engine    {}
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.source,
        info.engine,
    );
}

/// Print the farewell line once the engine has finished.
pub fn print_goodbye() {
    println!("engine finished. goodbye.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_banner_does_not_panic() {
        let info = BannerInfo {
            engine: "socket --address 0.0.0.0 --port 12345 --max-concurrent-jobs 1",
            source: "/tmp/engine.toml",
        };
        // Just verify it doesn't panic
        print_banner(&info);
    }

    #[test]
    fn print_goodbye_does_not_panic() {
        print_goodbye();
    }
}
