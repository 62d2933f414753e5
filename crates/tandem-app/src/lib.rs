//! Application framework for the Tandem frame pacer.
//!
//! This crate provides a trait-based application framework that handles:
//! - Window creation and management
//! - GPU context initialization
//! - Swapchain creation and recreation
//! - Frame pacing through [`tandem_frame::FrameCycle`]
//! - Event loop handling, including pausing while minimized
//!
//! # Example
//!
//! ```no_run
//! use tandem_app::{run_app, AppConfig, AppContext, FrameContext, TandemApp, VulkanFrameCycle};
//!
//! struct MyApp;
//!
//! impl TandemApp for MyApp {
//!     fn init(ctx: &mut AppContext, frames: &mut VulkanFrameCycle) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//!
//!     fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::new("My App"))
//! }
//! ```

mod app;
mod context;
mod frame;
mod instance;
mod runner;

pub use app::TandemApp;
pub use context::{AppContext, VulkanFrameCycle};
pub use frame::FrameContext;
pub use instance::{EngineInstance, InstanceError};
pub use runner::{init_logging, run_app, AppConfig};

// Re-export commonly used types for convenience
pub use tandem_core::FrameConfig;
pub use tandem_gpu::{GpuContext, GpuContextBuilder};
pub use winit::event::WindowEvent;
