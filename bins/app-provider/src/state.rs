//! Application state

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use vcd_launcher::AppLauncher;

/// Shared by every request; nothing in here is mutated per request
pub struct AppState {
    pub launcher: AppLauncher,
    /// Bounds the number of launches talking to the runtime at once
    pub launch_slots: Arc<Semaphore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(launcher: AppLauncher, max_concurrent_launches: usize) -> Self {
        Self {
            launcher,
            launch_slots: Arc::new(Semaphore::new(max_concurrent_launches.max(1))),
            started_at: Instant::now(),
        }
    }
}
