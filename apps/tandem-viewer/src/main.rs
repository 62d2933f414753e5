//! Tandem demo viewer
//!
//! Clears the window to a slowly pulsing colour. Every frame uploads a small
//! block of frame data through a scratch buffer that is released by the
//! frame slot's deletion queue once the GPU has consumed it.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p tandem-viewer -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--no-vsync`: Present without waiting for vertical blank
//! - `--frames-in-flight <N>`: Number of frame slots (default: 2)
//! - `--fence-timeout-ms <N>`: Bound on a single fence wait (default: 1000)
//! - `--validation`: Force Vulkan validation layers on
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;

use std::time::Duration;

use tandem_app::{run_app, AppConfig, FrameConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// Command line options.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewerParams {
    vsync: bool,
    frames_in_flight: usize,
    fence_timeout_ms: u64,
    validation: bool,
}

impl Default for ViewerParams {
    fn default() -> Self {
        Self {
            vsync: true,
            frames_in_flight: tandem_core::constants::FRAME_OVERLAP,
            fence_timeout_ms: 1000,
            validation: cfg!(debug_assertions),
        }
    }
}

impl ViewerParams {
    /// Parse options, ignoring anything unknown or malformed.
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Self {
        let mut params = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--no-vsync" => params.vsync = false,
                "--validation" => params.validation = true,
                "--frames-in-flight" => {
                    if let Some(n) = args.next().and_then(|v| v.parse().ok()) {
                        params.frames_in_flight = n;
                    }
                }
                "--fence-timeout-ms" => {
                    if let Some(ms) = args.next().and_then(|v| v.parse().ok()) {
                        params.fence_timeout_ms = ms;
                    }
                }
                _ => {}
            }
        }

        params
    }

    fn app_config(&self) -> AppConfig {
        let frame = FrameConfig::default()
            .with_frame_overlap(self.frames_in_flight)
            .with_fence_timeout(Duration::from_millis(self.fence_timeout_ms));

        AppConfig::new("Tandem Viewer")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(self.vsync)
            .with_validation(self.validation)
            .with_frame_config(frame)
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let params = ViewerParams::parse(std::env::args().skip(1));
    run_app::<Viewer>(params.app_config())
}

fn print_help() {
    eprintln!(
        "Tandem demo viewer

USAGE:
    cargo run -p tandem-viewer -- [OPTIONS]

OPTIONS:
    --no-vsync                Present without waiting for vertical blank
    --frames-in-flight <N>    Number of frame slots (default: 2)
    --fence-timeout-ms <N>    Bound on a single fence wait (default: 1000)
    --validation              Force Vulkan validation layers on
    -h, --help                Print this help message

CONTROLS:
    Escape                    Quit

ENVIRONMENT VARIABLES:
    RUST_LOG                  Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ViewerParams {
        ViewerParams::parse(args.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]), ViewerParams::default());
    }

    #[test]
    fn parses_known_options() {
        let params = parse(&["--no-vsync", "--frames-in-flight", "3", "--fence-timeout-ms", "250"]);
        assert!(!params.vsync);
        assert_eq!(params.frames_in_flight, 3);
        assert_eq!(params.fence_timeout_ms, 250);

        let config = params.app_config();
        assert_eq!(config.frame.frame_overlap, 3);
        assert_eq!(config.frame.fence_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_keep_defaults() {
        let params = parse(&["--frames-in-flight", "many", "--unknown"]);
        assert_eq!(params.frames_in_flight, ViewerParams::default().frames_in_flight);
    }
}
