//! Host shell for the binary: alerts and the status line are printed to the
//! terminal, the menu is driven by commands typed on stdin.

use std::{
    cell::RefCell,
    collections::HashMap,
    io::{self, Write},
    rc::Rc,
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt as _, BufReader},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    settings::SettingKey,
    shell::{
        AlertContent, AlertHost, AlertId, AlertLayout, AlertSurface, CloseHandler, MenuAction,
        ShellCommand, ShellError, StatusIndicator,
    },
};

pub const HELP_TEXT: &str = "\
commands:
  test              show a test alert
  toggle            connect or disconnect
  settings          show current settings
  set <key> <value> change a setting (value may be empty)
  close <n>         close alert #n
  clear             close every alert
  status            show runtime diagnostics
  help              show this text
  quit              shut down";

/// Shared line-oriented output so every surface writes to the same place.
#[derive(Clone)]
pub struct Console {
    out: Rc<RefCell<Box<dyn Write>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write>) -> Self {
        Self {
            out: Rc::new(RefCell::new(out)),
        }
    }

    fn line(&self, text: &str) {
        let mut out = self.out.borrow_mut();
        if let Err(error) = writeln!(out, "{text}").and_then(|()| out.flush()) {
            warn!("failed to write to terminal: {error}");
        }
    }
}

type Handlers = Rc<RefCell<HashMap<AlertId, CloseHandler>>>;

pub struct TerminalAlertHost {
    console: Console,
    monitor_width: u32,
    handlers: Handlers,
}

impl TerminalAlertHost {
    pub fn new(console: Console, monitor_width: u32) -> Self {
        Self {
            console,
            monitor_width,
            handlers: Rc::default(),
        }
    }
}

impl AlertHost for TerminalAlertHost {
    type Surface = TerminalSurface;

    fn monitor_width(&self) -> u32 {
        self.monitor_width
    }

    fn mount(
        &mut self,
        id: AlertId,
        content: &AlertContent,
        layout: AlertLayout,
        on_close: CloseHandler,
    ) -> Result<Self::Surface, ShellError> {
        let mut text = format!("┌ #{id} {}", content.title);
        for line in content.body.split('\n').take(content.visible_lines.max(1)) {
            text.push_str("\n│ ");
            text.push_str(line);
        }
        text.push_str(&format!("\n└ `close {id}` to dismiss"));
        self.console.line(&text);
        debug!(
            "terminal alert #{id} at ({}, {}) {}x{}",
            layout.x, layout.y, layout.width, layout.height
        );

        self.handlers.borrow_mut().insert(id, on_close);
        Ok(TerminalSurface {
            id,
            console: self.console.clone(),
            handlers: Rc::clone(&self.handlers),
            destroyed: false,
        })
    }

    fn press_close(&mut self, id: AlertId) -> bool {
        let handler = self.handlers.borrow().get(&id).cloned();
        handler.is_some_and(|handler| handler.fire())
    }
}

pub struct TerminalSurface {
    id: AlertId,
    console: Console,
    handlers: Handlers,
    destroyed: bool,
}

impl AlertSurface for TerminalSurface {
    fn set_position(&mut self, x: i32, y: i32) {
        debug!("terminal alert #{} moved to ({x}, {y})", self.id);
    }

    fn fade_in(&mut self, _duration: Duration) {}

    fn fade_out(&mut self, duration: Duration) {
        debug!("terminal alert #{} fading out over {duration:?}", self.id);
    }

    fn disconnect_close(&mut self) {
        self.handlers.borrow_mut().remove(&self.id);
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.disconnect_close();
        self.console.line(&format!("  (alert #{} closed)", self.id));
    }
}

pub struct TerminalStatus {
    console: Console,
    connected: Option<bool>,
    destroyed: bool,
}

impl TerminalStatus {
    pub fn new(console: Console) -> Self {
        Self {
            console,
            connected: None,
            destroyed: false,
        }
    }
}

impl StatusIndicator for TerminalStatus {
    fn set_connected(&mut self, connected: bool) {
        if self.destroyed || self.connected == Some(connected) {
            return;
        }
        self.connected = Some(connected);
        self.console.line(if connected {
            "● gotify: connected"
        } else {
            "○ gotify: disconnected"
        });
    }

    fn show_settings(&mut self, snapshot: &[(SettingKey, String)]) {
        let width = snapshot
            .iter()
            .map(|(key, _)| key.as_str().len())
            .max()
            .unwrap_or(0);
        let text = snapshot
            .iter()
            .map(|(key, value)| format!("  {:width$}  {value}", key.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
        self.console.line(&format!("settings:\n{text}"));
    }

    fn show_report(&mut self, report: &str) {
        self.console.line(report);
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.console.line("gotify-poller stopped");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(ShellCommand),
    Help,
    Blank,
}

pub fn parse_command(line: &str) -> Result<ConsoleInput, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "" => return Ok(ConsoleInput::Blank),
        "help" | "?" => return Ok(ConsoleInput::Help),
        "test" => ShellCommand::Menu(MenuAction::TestAlert),
        "toggle" => ShellCommand::Menu(MenuAction::ToggleConnection),
        "settings" => ShellCommand::Menu(MenuAction::OpenSettings),
        "clear" => ShellCommand::Menu(MenuAction::ClearAll),
        "status" => ShellCommand::ShowDiagnostics,
        "quit" | "exit" => ShellCommand::Shutdown,
        "close" => {
            let id = rest
                .parse::<u64>()
                .map_err(|_| format!("usage: close <n> (got {rest:?})"))?;
            ShellCommand::ClickClose(AlertId(id))
        }
        "set" => {
            let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if key.is_empty() {
                return Err("usage: set <key> <value>".to_string());
            }
            let key = key.parse::<SettingKey>().map_err(|error| error.to_string())?;
            ShellCommand::SetSetting {
                key,
                value: value.trim().to_string(),
            }
        }
        other => return Err(format!("unknown command {other:?}, try `help`")),
    };
    Ok(ConsoleInput::Command(command))
}

/// Reads commands from stdin until EOF or `quit`. EOF is delivered as
/// [`ShellCommand::Shutdown`].
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<ShellCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(error) => {
                    warn!("failed to read stdin: {error}");
                    break;
                }
            };
            match parse_command(&line) {
                Ok(ConsoleInput::Command(command)) => {
                    let shutdown = command == ShellCommand::Shutdown;
                    if tx.send(command).is_err() || shutdown {
                        return;
                    }
                }
                Ok(ConsoleInput::Help) => println!("{HELP_TEXT}"),
                Ok(ConsoleInput::Blank) => {}
                Err(error) => println!("{error}"),
            }
        }
        let _ = tx.send(ShellCommand::Shutdown);
    })
}
