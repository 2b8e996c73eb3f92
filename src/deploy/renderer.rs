//! Terminal progress renderer
//!
//! Consumes [`RenderEvent`]s concurrently with step execution and owns the
//! terminal for the duration of a run. Step state shown here is
//! reconstructed purely from received events; the renderer never touches
//! the worker's `Step` values. A one-second tick keeps elapsed-time
//! displays live between events.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;
use url::Url;

use super::diagnose::Diagnostic;
use super::events::{
    Completion, LogEvent, LogLevel, ProgressEvent, RenderEvent, StepSpec, StepStatus,
};

/// How many trailing log lines the URL heuristic inspects
const URL_SCAN_WINDOW: usize = 10;

/// Maximum log lines retained in the scroll buffer
const LOG_CAPACITY: usize = 500;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Why the render loop exited
#[derive(Debug)]
pub enum RendererOutcome {
    /// Completion signal received and rendered
    Completed {
        completion: Completion,
        dashboard_url: Option<String>,
    },
    /// User quit the UI before the run finished
    Interrupted,
}

/// Append-only, bounded scroll view over the run's log
///
/// While following, the view sticks to the tail as new entries arrive.
/// Scrolling up detaches the view; scrolling back past the bottom
/// re-attaches it, so no tail entries are lost on return.
#[derive(Debug, Default)]
pub struct LogPane {
    entries: VecDeque<LogEvent>,
    /// Lines scrolled up from the tail; 0 means following
    scroll_offset: usize,
}

impl LogPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: LogEvent) {
        if self.entries.len() == LOG_CAPACITY {
            self.entries.pop_front();
            // Keep the viewport anchored to the same entries when scrolled
            if self.scroll_offset > 0 {
                self.scroll_offset = (self.scroll_offset + 1).min(self.entries.len());
            }
        }
        self.entries.push_back(event);
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(self.entries.len());
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn is_following(&self) -> bool {
        self.scroll_offset == 0
    }

    /// The `height` entries ending at the current scroll position
    pub fn visible(&self, height: usize) -> Vec<&LogEvent> {
        let end = self.entries.len().saturating_sub(self.scroll_offset);
        let start = end.saturating_sub(height);
        self.entries.range(start..end).collect()
    }

    pub fn tail(&self, count: usize) -> Vec<&LogEvent> {
        let start = self.entries.len().saturating_sub(count);
        self.entries.range(start..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Renderer-local view of one step, rebuilt from events
struct StepView {
    spec: StepSpec,
    status: StepStatus,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    fraction_complete: f64,
    detail: Option<String>,
}

pub struct ProgressRenderer {
    multi: MultiProgress,
    bars: Vec<ProgressBar>,
    steps: Vec<StepView>,
    log_pane: LogPane,
}

impl ProgressRenderer {
    pub fn new(specs: &[StepSpec]) -> Self {
        Self::with_draw_target(specs, ProgressDrawTarget::stderr())
    }

    /// Renderer with no terminal output, for tests and `--output json`
    pub fn hidden(specs: &[StepSpec]) -> Self {
        Self::with_draw_target(specs, ProgressDrawTarget::hidden())
    }

    fn with_draw_target(specs: &[StepSpec], target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let mut bars = Vec::with_capacity(specs.len());
        let mut steps = Vec::with_capacity(specs.len());

        for spec in specs {
            let bar = multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap(),
            );
            bar.set_message(format!("○ {}", spec.name));
            bars.push(bar);
            steps.push(StepView {
                spec: spec.clone(),
                status: StepStatus::Pending,
                started_at: None,
                finished_at: None,
                fraction_complete: 0.0,
                detail: None,
            });
        }

        Self {
            multi,
            bars,
            steps,
            log_pane: LogPane::new(),
        }
    }

    /// Run the render loop until completion or interrupt
    ///
    /// `interrupt` resolves when the user asks to quit (Ctrl-C in
    /// production; tests inject their own trigger).
    pub async fn run<I>(
        mut self,
        mut rx: mpsc::UnboundedReceiver<RenderEvent>,
        interrupt: I,
    ) -> RendererOutcome
    where
        I: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tokio::pin!(interrupt);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(RenderEvent::Progress(event)) => self.apply_progress(event),
                    Some(RenderEvent::Log(event)) => self.apply_log(event),
                    Some(RenderEvent::Done(completion)) => {
                        return self.finish(completion);
                    }
                    // Input closed without a completion signal: the
                    // orchestrator is gone, nothing left to render
                    None => return RendererOutcome::Interrupted,
                },
                _ = ticker.tick() => self.refresh_elapsed(),
                _ = &mut interrupt => {
                    self.multi.clear().ok();
                    return RendererOutcome::Interrupted;
                }
            }
        }
    }

    fn apply_progress(&mut self, event: ProgressEvent) {
        let Some(step) = self.steps.get_mut(event.step_index) else {
            tracing::warn!(index = event.step_index, "progress event for unknown step");
            return;
        };

        if step.status == StepStatus::Pending {
            step.status = StepStatus::Running;
            step.started_at = Some(Instant::now());
        }
        // Terminal states are monotonic: late progress cannot revive a step
        if step.status != StepStatus::Running {
            return;
        }

        step.fraction_complete = step.fraction_complete.max(event.fraction_complete);
        if let Some(message) = event.message {
            step.detail = Some(message);
        }
        // Full progress counts as completion even without an explicit signal
        if step.fraction_complete >= 1.0 {
            step.status = StepStatus::Complete;
            step.finished_at = Some(Instant::now());
        }
        self.redraw_step(event.step_index);
    }

    fn apply_log(&mut self, event: LogEvent) {
        self.multi.suspend(|| {
            println!("{}", format_log_line(&event));
        });
        self.log_pane.push(event);
    }

    fn refresh_elapsed(&mut self) {
        for index in 0..self.steps.len() {
            if self.steps[index].status == StepStatus::Running {
                self.redraw_step(index);
                self.bars[index].tick();
            }
        }
    }

    fn redraw_step(&mut self, index: usize) {
        let step = &self.steps[index];
        let bar = &self.bars[index];
        match step.status {
            StepStatus::Pending => bar.set_message(format!("○ {}", step.spec.name)),
            StepStatus::Running => {
                let elapsed = step
                    .started_at
                    .map(|s| format_duration(s.elapsed()))
                    .unwrap_or_default();
                let mut msg = format!("{} ({})", step.spec.name, elapsed);
                if step.fraction_complete > 0.0 && step.fraction_complete < 1.0 {
                    msg.push_str(&format!(" [{:.0}%]", step.fraction_complete * 100.0));
                }
                if let Some(detail) = &step.detail {
                    msg.push_str(&format!(" - {}", detail));
                }
                bar.set_message(msg);
            }
            StepStatus::Complete => {
                let duration = match (step.started_at, step.finished_at) {
                    (Some(start), Some(end)) => {
                        format!(" ({})", format_duration(end.duration_since(start)))
                    }
                    _ => String::new(),
                };
                bar.finish_with_message(format!("✅ {}{}", step.spec.name, duration));
            }
            StepStatus::Failed => {
                bar.finish_with_message(format!("❌ {}", step.spec.name));
            }
            StepStatus::Skipped => {
                bar.finish_with_message(format!("− {} (not run)", step.spec.name));
            }
        }
    }

    fn finish(mut self, completion: Completion) -> RendererOutcome {
        let dashboard_url = match &completion {
            Completion::Success { .. } => extract_dashboard_url(&self.log_pane),
            Completion::Failure { .. } => None,
        };

        match &completion {
            Completion::Success { message } => {
                for index in 0..self.steps.len() {
                    self.redraw_step(index);
                }
                self.multi.suspend(|| {
                    println!("\n✅ {}", message);
                    if let Some(url) = &dashboard_url {
                        println!("🌐 Dashboard: {}", url);
                    }
                });
            }
            Completion::Failure { diagnostic } => {
                // Mark whichever step was running as failed, and the rest
                // of the tail as never run
                for index in 0..self.steps.len() {
                    if self.steps[index].status == StepStatus::Running {
                        self.steps[index].status = StepStatus::Failed;
                    }
                    self.redraw_step(index);
                }
                self.render_failure(diagnostic);
            }
        }
        self.multi.clear().ok();

        RendererOutcome::Completed {
            completion,
            dashboard_url,
        }
    }

    fn render_failure(&self, diagnostic: &Diagnostic) {
        self.multi.suspend(|| {
            eprintln!("\n❌ {}", diagnostic.message);
            if let Some(suggestion) = &diagnostic.suggestion {
                eprintln!("💡 {}", suggestion);
            }
        });
    }

    #[cfg(test)]
    fn step_status(&self, index: usize) -> StepStatus {
        self.steps[index].status
    }
}

fn format_log_line(event: &LogEvent) -> String {
    let icon = match event.level {
        LogLevel::Info => "ℹ️ ",
        LogLevel::Success => "✅",
        LogLevel::Warning => "⚠️ ",
        LogLevel::Error => "❌",
        LogLevel::Debug => "  ",
    };
    format!(
        "{} {} {}",
        event.timestamp.format("%H:%M:%S"),
        icon,
        event.message
    )
}

/// Scan the trailing log entries for an http(s) URL
///
/// Best-effort heuristic over the last few lines, not a contract: the
/// final installation step typically logs the dashboard address it
/// configured.
pub fn extract_dashboard_url(pane: &LogPane) -> Option<String> {
    for event in pane.tail(URL_SCAN_WINDOW).into_iter().rev() {
        for token in event.message.split_whitespace() {
            let token = token.trim_end_matches(['.', ',', ')', ']', ';']);
            if token.starts_with("http://") || token.starts_with("https://") {
                if Url::parse(token).is_ok() {
                    return Some(token.to_string());
                }
            }
        }
    }
    None
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::events::EventSink;

    fn specs(names: &[&str]) -> Vec<StepSpec> {
        names.iter().map(|n| StepSpec::new(*n, *n)).collect()
    }

    #[test]
    fn test_log_pane_bounded() {
        let mut pane = LogPane::new();
        for i in 0..(LOG_CAPACITY + 50) {
            pane.push(LogEvent::info(format!("line {i}")));
        }
        assert_eq!(pane.len(), LOG_CAPACITY);
        assert_eq!(pane.tail(1)[0].message, format!("line {}", LOG_CAPACITY + 49));
    }

    #[test]
    fn test_log_pane_scroll_and_follow() {
        let mut pane = LogPane::new();
        for i in 0..20 {
            pane.push(LogEvent::info(format!("line {i}")));
        }
        assert!(pane.is_following());

        pane.scroll_up(5);
        assert!(!pane.is_following());
        let visible = pane.visible(3);
        assert_eq!(visible.last().unwrap().message, "line 14");

        // New entries arrive while scrolled; returning to the bottom must
        // show them
        pane.push(LogEvent::info("line 20"));
        pane.scroll_down(10);
        assert!(pane.is_following());
        assert_eq!(pane.visible(1)[0].message, "line 20");
    }

    #[test]
    fn test_log_pane_scroll_clamped() {
        let mut pane = LogPane::new();
        pane.push(LogEvent::info("only"));
        pane.scroll_up(100);
        assert_eq!(pane.visible(5).len(), 0);
        pane.scroll_down(100);
        assert!(pane.is_following());
    }

    #[test]
    fn test_extract_url_from_tail() {
        let mut pane = LogPane::new();
        pane.push(LogEvent::info("platform started"));
        pane.push(LogEvent::success("Dashboard available at https://10.0.0.5."));
        assert_eq!(
            extract_dashboard_url(&pane).as_deref(),
            Some("https://10.0.0.5")
        );
    }

    #[test]
    fn test_extract_url_prefers_latest() {
        let mut pane = LogPane::new();
        pane.push(LogEvent::info("old http://old.example.com"));
        pane.push(LogEvent::info("new https://new.example.com"));
        assert_eq!(
            extract_dashboard_url(&pane).as_deref(),
            Some("https://new.example.com")
        );
    }

    #[test]
    fn test_extract_url_ignores_distant_history() {
        let mut pane = LogPane::new();
        pane.push(LogEvent::info("buried http://buried.example.com"));
        for i in 0..URL_SCAN_WINDOW {
            pane.push(LogEvent::info(format!("filler {i}")));
        }
        assert_eq!(extract_dashboard_url(&pane), None);
    }

    #[test]
    fn test_extract_url_none_without_urls() {
        let mut pane = LogPane::new();
        pane.push(LogEvent::info("nothing to see"));
        assert_eq!(extract_dashboard_url(&pane), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3700)), "1h 1m 40s");
    }

    #[tokio::test]
    async fn test_renderer_completes_on_done() {
        let renderer = ProgressRenderer::hidden(&specs(&["a", "b"]));
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(RenderEvent::Log(LogEvent::success(
            "Dashboard available at https://10.0.0.5",
        )))
        .unwrap();
        tx.send(RenderEvent::Done(Completion::Success {
            message: "done".to_string(),
        }))
        .unwrap();

        let outcome = renderer.run(rx, std::future::pending()).await;
        match outcome {
            RendererOutcome::Completed { dashboard_url, .. } => {
                assert_eq!(dashboard_url.as_deref(), Some("https://10.0.0.5"));
            }
            RendererOutcome::Interrupted => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn test_renderer_interrupt_exits_loop() {
        let renderer = ProgressRenderer::hidden(&specs(&["a"]));
        let (tx, rx) = mpsc::unbounded_channel();
        // Keep the sender alive so the loop cannot exit via channel close
        let _tx = tx;

        let outcome = renderer.run(rx, std::future::ready(())).await;
        assert!(matches!(outcome, RendererOutcome::Interrupted));
    }

    #[tokio::test]
    async fn test_full_progress_implies_completion() {
        let mut renderer = ProgressRenderer::hidden(&specs(&["a"]));
        renderer.apply_progress(ProgressEvent {
            step_index: 0,
            fraction_complete: 0.5,
            message: None,
        });
        assert_eq!(renderer.step_status(0), StepStatus::Running);

        renderer.apply_progress(ProgressEvent {
            step_index: 0,
            fraction_complete: 1.0,
            message: None,
        });
        assert_eq!(renderer.step_status(0), StepStatus::Complete);

        // Late progress must not revert the terminal state
        renderer.apply_progress(ProgressEvent {
            step_index: 0,
            fraction_complete: 0.2,
            message: None,
        });
        assert_eq!(renderer.step_status(0), StepStatus::Complete);
    }

    #[tokio::test]
    async fn test_progress_for_unknown_step_is_ignored() {
        let mut renderer = ProgressRenderer::hidden(&specs(&["a"]));
        renderer.apply_progress(ProgressEvent {
            step_index: 7,
            fraction_complete: 0.5,
            message: None,
        });
        assert_eq!(renderer.step_status(0), StepStatus::Pending);
    }

    #[tokio::test]
    async fn test_log_events_rendered_in_emission_order() {
        let (sink, _progress_rx, mut log_rx) = EventSink::channel();
        sink.log_info("e1");
        sink.log_info("e2");
        sink.log_info("e3");
        drop(sink);

        let mut renderer = ProgressRenderer::hidden(&specs(&["a"]));
        while let Some(event) = log_rx.recv().await {
            renderer.apply_log(event);
        }
        let messages: Vec<_> = renderer
            .log_pane
            .tail(3)
            .iter()
            .map(|e| e.message.clone())
            .collect();
        assert_eq!(messages, vec!["e1", "e2", "e3"]);
    }
}
