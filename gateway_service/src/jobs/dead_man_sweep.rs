use std::sync::Arc;
use tracing::debug;

use crate::use_cases::dead_man_monitor::DeadManMonitor;

/// Job en segundo plano que corre el barrido del dead-man switch.
///
/// El intervalo (~10 s) lo fija el scheduler en `main.rs`; el job solo
/// delega en el monitor, que a su vez nunca sostiene un lock a través de
/// I/O.
pub struct DeadManSweepJob {
    monitor: Arc<DeadManMonitor>,
}

impl DeadManSweepJob {
    pub fn new(monitor: Arc<DeadManMonitor>) -> Self {
        Self { monitor }
    }

    pub async fn run(&self) {
        debug!("Running dead-man sweep");
        self.monitor.sweep().await;
    }
}
