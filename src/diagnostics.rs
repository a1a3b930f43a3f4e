use serde::Serialize;

use crate::{core::unix_now_secs, poll::PollCoordinator};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct RuntimeDiagnostics {
    pub connection_state: String,
    pub polling: bool,
    pub poll_interval_secs: Option<u64>,
    pub last_seen_id: i64,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub last_poll_at: Option<u64>,
    pub seconds_since_poll: Option<u64>,
    pub poll_in_flight: bool,
    pub open_alerts: usize,
}

pub fn snapshot(coordinator: &PollCoordinator, open_alerts: usize) -> RuntimeDiagnostics {
    let state = coordinator.state();
    let now = unix_now_secs();
    RuntimeDiagnostics {
        connection_state: state.connection.as_str().to_string(),
        polling: coordinator.is_polling(),
        poll_interval_secs: coordinator
            .is_polling()
            .then_some(coordinator.interval_secs()),
        last_seen_id: state.last_seen_id,
        consecutive_errors: state.consecutive_errors,
        last_error: coordinator.last_error().map(str::to_string),
        last_poll_at: coordinator.last_poll_at(),
        seconds_since_poll: coordinator
            .last_poll_at()
            .map(|last| now.saturating_sub(last)),
        poll_in_flight: coordinator.is_busy(),
        open_alerts,
    }
}

impl RuntimeDiagnostics {
    /// Multi-line human readable form.
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("connection:         {}", self.connection_state),
            format!(
                "polling:            {}",
                match self.poll_interval_secs {
                    Some(secs) => format!("every {secs}s"),
                    None => "stopped".to_string(),
                }
            ),
            format!("last seen id:       {}", self.last_seen_id),
            format!("consecutive errors: {}", self.consecutive_errors),
            format!("open alerts:        {}", self.open_alerts),
        ];
        if let Some(ago) = self.seconds_since_poll {
            lines.push(format!("last poll:          {ago}s ago"));
        }
        if self.poll_in_flight {
            lines.push("poll in flight:     yes".to_string());
        }
        if let Some(error) = &self.last_error {
            lines.push(format!("last error:         {error}"));
        }
        lines.join("\n")
    }
}
