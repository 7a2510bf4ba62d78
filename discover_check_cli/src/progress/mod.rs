//! Progress reporting for the CLI
//!
//! The core reports through [`ProgressProvider`](discover_check_core::ProgressProvider);
//! the provider here forwards updates over a channel to a renderer task.

pub mod provider;
pub mod renderer;
pub mod utils;

pub use provider::{ChannelProvider, create_progress_infrastructure};
pub use renderer::{ProgressRenderer, finish_rendering, render_progress};
pub use utils::{format_bytes, format_duration, format_file_count, format_throughput};
