//! Seams to the host shell: the overlay surfaces alerts are drawn on and the
//! status affordance with its menu.

use std::{fmt, time::Duration};

use tokio::sync::mpsc;

use crate::settings::SettingKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an alert surface shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertContent {
    pub title: String,
    /// Body already wrapped, lines separated by `\n`.
    pub body: String,
    pub visible_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertLayout {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("Failed to mount alert surface: {0}")]
    Mount(String),
}

/// Connected to an alert's close affordance. Firing it asks the alert manager to
/// close that alert on its next turn.
#[derive(Debug, Clone)]
pub struct CloseHandler {
    id: AlertId,
    tx: mpsc::UnboundedSender<AlertId>,
}

impl CloseHandler {
    pub fn new(id: AlertId, tx: mpsc::UnboundedSender<AlertId>) -> Self {
        Self { id, tx }
    }

    pub fn fire(&self) -> bool {
        self.tx.send(self.id).is_ok()
    }
}

/// An overlay surface owned by exactly one alert.
pub trait AlertSurface {
    fn set_position(&mut self, x: i32, y: i32);
    fn fade_in(&mut self, duration: Duration);
    fn fade_out(&mut self, duration: Duration);
    /// Drops the close handler passed to [`AlertHost::mount`]. Must be idempotent.
    fn disconnect_close(&mut self);
    /// Releases the surface. Must be idempotent.
    fn destroy(&mut self);
}

pub trait AlertHost {
    type Surface: AlertSurface;

    fn monitor_width(&self) -> u32;

    fn mount(
        &mut self,
        id: AlertId,
        content: &AlertContent,
        layout: AlertLayout,
        on_close: CloseHandler,
    ) -> Result<Self::Surface, ShellError>;

    /// Presses the close affordance of a mounted alert on behalf of the user.
    /// Hosts that deliver clicks themselves keep the default.
    fn press_close(&mut self, _id: AlertId) -> bool {
        false
    }
}

/// The persistent status-area affordance.
pub trait StatusIndicator {
    fn set_connected(&mut self, connected: bool);
    fn show_settings(&mut self, snapshot: &[(SettingKey, String)]);
    fn show_report(&mut self, report: &str);
    fn destroy(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    TestAlert,
    ToggleConnection,
    OpenSettings,
    ClearAll,
}

/// Input delivered from the host to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Menu(MenuAction),
    /// The user pressed the close affordance of an alert.
    ClickClose(AlertId),
    SetSetting { key: SettingKey, value: String },
    ShowDiagnostics,
    Shutdown,
}
