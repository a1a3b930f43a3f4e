use std::{
    future::poll_fn,
    time::{Duration, Instant},
};

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio_util::time::{delay_queue, DelayQueue};
use tracing::{debug, warn};

use crate::{
    consts::{
        ALERT_CENTER_OFFSET, ALERT_WIDTH, BASE_ALERT_HEIGHT, DEFAULT_ALERT_TITLE, FADE_IN_MS,
        FADE_OUT_MS, LINE_HEIGHT, MAX_VISIBLE_LINES, STACK_GAP, STACK_TOP_MARGIN, WRAP_WIDTH,
    },
    core::truncate_message,
    shell::{AlertContent, AlertHost, AlertId, AlertLayout, AlertSurface, CloseHandler, ShellError},
};

/// Greedy word wrap on single spaces.
///
/// A word longer than `width` is hard-split at the width boundary. Runs of spaces
/// are preserved, so joining the result with `" "` restores the input unless a
/// hard split happened.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current: Option<String> = None;

    for word in text.split(' ') {
        let word_len = word.chars().count();
        match current.as_mut() {
            Some(line) if line.chars().count() + 1 + word_len <= width => {
                line.push(' ');
                line.push_str(word);
            }
            _ => {
                if let Some(line) = current.take() {
                    lines.push(line);
                }
                let mut rest = word;
                while rest.chars().count() > width {
                    let split = rest
                        .char_indices()
                        .nth(width)
                        .map_or(rest.len(), |(index, _)| index);
                    lines.push(rest[..split].to_string());
                    rest = &rest[split..];
                }
                current = Some(rest.to_string());
            }
        }
    }

    if let Some(line) = current {
        lines.push(line);
    }
    lines
}

pub fn alert_height(visible_lines: usize) -> u32 {
    BASE_ALERT_HEIGHT + LINE_HEIGHT * visible_lines.min(MAX_VISIBLE_LINES) as u32
}

/// Vertical offset of the alert at stacking `index`.
pub fn stack_offset(index: usize, height: u32) -> i32 {
    STACK_TOP_MARGIN + index as i32 * (height as i32 + STACK_GAP)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPhase {
    Visible,
    /// Fade-out running; still occupies its stacking slot.
    Closing,
}

/// Timers owned by the manager's delay queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTimer {
    AutoClose(AlertId),
    FadeOutDone(AlertId),
}

struct Alert<S> {
    id: AlertId,
    title: String,
    body: String,
    created_at: DateTime<Local>,
    height: u32,
    position: usize,
    phase: AlertPhase,
    timer: Option<delay_queue::Key>,
    surface: S,
}

/// Read-only view of a live alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertInfo {
    pub id: AlertId,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Local>,
    pub position: usize,
    pub phase: AlertPhase,
}

/// Owns every live alert from `show_alert` until its surface is destroyed.
///
/// The order of `alerts` is the stacking order. Auto-close and fade-out timers
/// live in one keyed delay queue, so cancelling one is synchronous and a timer
/// can never fire for an alert that has already been discarded.
pub struct AlertManager<H: AlertHost> {
    host: H,
    alerts: Vec<Alert<H::Surface>>,
    timers: DelayQueue<AlertTimer>,
    close_tx: mpsc::UnboundedSender<AlertId>,
    next_id: u64,
}

impl<H: AlertHost> AlertManager<H> {
    /// Close affordances report through `close_tx`; feed what arrives on the
    /// matching receiver back into [`AlertManager::close_alert`].
    pub fn new(host: H, close_tx: mpsc::UnboundedSender<AlertId>) -> Self {
        Self {
            host,
            alerts: Vec::new(),
            timers: DelayQueue::new(),
            close_tx,
            next_id: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    pub fn alerts(&self) -> Vec<AlertInfo> {
        self.alerts
            .iter()
            .map(|alert| AlertInfo {
                id: alert.id,
                title: alert.title.clone(),
                body: alert.body.clone(),
                created_at: alert.created_at,
                position: alert.position,
                phase: alert.phase,
            })
            .collect()
    }

    pub fn show_alert(
        &mut self,
        title: &str,
        body: &str,
        auto_close: Option<Duration>,
    ) -> Result<AlertId, ShellError> {
        self.next_id = self.next_id.wrapping_add(1);
        let id = AlertId(self.next_id);

        let title = if title.trim().is_empty() {
            DEFAULT_ALERT_TITLE.to_string()
        } else {
            title.to_string()
        };
        let wrapped = wrap_text(body, WRAP_WIDTH).join("\n");
        let visible_lines = wrapped.split('\n').count().min(MAX_VISIBLE_LINES);
        let height = alert_height(visible_lines);
        let position = self.alerts.len();
        let layout = AlertLayout {
            x: self.column_x(),
            y: stack_offset(position, height),
            width: ALERT_WIDTH,
            height,
        };
        let content = AlertContent {
            title: title.clone(),
            body: wrapped.clone(),
            visible_lines,
        };

        let mut surface = self.host.mount(
            id,
            &content,
            layout,
            CloseHandler::new(id, self.close_tx.clone()),
        )?;
        surface.fade_in(Duration::from_millis(FADE_IN_MS));

        let timer = auto_close.map(|after| self.timers.insert(AlertTimer::AutoClose(id), after));
        debug!(
            "alert shown id={id} position={position} lines={visible_lines} auto_close={auto_close:?} title={}",
            truncate_message(&title, 60)
        );

        self.alerts.push(Alert {
            id,
            title,
            body: wrapped,
            created_at: Local::now(),
            height,
            position,
            phase: AlertPhase::Visible,
            timer,
            surface,
        });
        Ok(id)
    }

    /// Starts closing `id`. Unknown, already closed and already closing alerts are
    /// a no-op; returns whether this call started the close.
    pub fn close_alert(&mut self, id: AlertId) -> bool {
        let Some(alert) = self
            .alerts
            .iter_mut()
            .find(|alert| alert.id == id && alert.phase == AlertPhase::Visible)
        else {
            debug!("close_alert: id={id} not open, ignoring");
            return false;
        };

        if let Some(key) = alert.timer.take() {
            self.timers.try_remove(&key);
        }
        alert.surface.disconnect_close();
        alert.surface.fade_out(Duration::from_millis(FADE_OUT_MS));
        alert.phase = AlertPhase::Closing;
        alert.timer = Some(self.timers.insert(
            AlertTimer::FadeOutDone(id),
            Duration::from_millis(FADE_OUT_MS),
        ));
        debug!("alert closing id={id}");
        true
    }

    /// Waits for the next due timer. Resolves to `None` at once when no timer is
    /// pending.
    pub async fn next_timer(&mut self) -> Option<AlertTimer> {
        poll_fn(|cx| self.timers.poll_expired(cx))
            .await
            .map(|expired| expired.into_inner())
    }

    pub fn handle_timer(&mut self, timer: AlertTimer) {
        match timer {
            AlertTimer::AutoClose(id) => {
                if let Some(alert) = self.alerts.iter_mut().find(|alert| alert.id == id) {
                    if alert.phase == AlertPhase::Visible {
                        alert.timer = None;
                        debug!("alert auto-close id={id}");
                        self.close_alert(id);
                    }
                }
            }
            AlertTimer::FadeOutDone(id) => self.finish_close(id),
        }
    }

    /// Closes every visible alert with its fade-out.
    pub fn clear_all(&mut self) {
        let ids: Vec<AlertId> = self.alerts.iter().map(|alert| alert.id).collect();
        debug!("clearing {} alerts with animation", ids.len());
        for id in ids {
            self.close_alert(id);
        }
    }

    /// Tears everything down without animation. Used on shutdown: afterwards no
    /// timer, close handler or surface is left behind.
    pub fn clear_all_immediate(&mut self) {
        let started = Instant::now();
        let count = self.alerts.len();
        self.timers.clear();
        for mut alert in self.alerts.drain(..) {
            alert.timer = None;
            alert.surface.disconnect_close();
            alert.surface.destroy();
        }
        debug!(
            "cleared {count} alerts immediately in {:?}",
            started.elapsed()
        );
    }

    fn finish_close(&mut self, id: AlertId) {
        let Some(index) = self.alerts.iter().position(|alert| alert.id == id) else {
            warn!("fade-out finished for unknown alert id={id}");
            return;
        };
        let mut alert = self.alerts.remove(index);
        alert.timer = None;
        alert.surface.destroy();
        debug!("alert removed id={id} remaining={}", self.alerts.len());
        self.reposition();
    }

    fn reposition(&mut self) {
        let x = self.column_x();
        for (index, alert) in self.alerts.iter_mut().enumerate() {
            alert.position = index;
            alert
                .surface
                .set_position(x, stack_offset(index, alert.height));
        }
    }

    fn column_x(&self) -> i32 {
        (self.host.monitor_width() as i32 - ALERT_CENTER_OFFSET as i32) / 2
    }
}
