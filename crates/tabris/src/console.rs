//! Interactive remote console.
//!
//! Forwards lines typed on stdin to the connected device and prints what
//! the device reports back. After a command was sent, the next line is
//! read once the device answered it.

use std::io;
use std::sync::Arc;

use console::{Key, Style, Term};
use serde_json::Value;
use tabris_session::{CLOSE_OUTDATED, CommandSender, DisconnectReason, SessionEvent};
use tabris_watch::ReloadNotice;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

use crate::history::History;
use crate::output::Output;

const PROMPT: &str = ">> ";

/// What a typed line asks for.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Input {
    /// Nothing to send.
    Empty,
    /// Leave the console.
    Exit,
    /// Code to evaluate on the device.
    Command(String),
}

impl Input {
    pub(crate) fn parse(line: &str) -> Self {
        let command = line.trim().trim_end_matches(';');
        match command {
            "" => Self::Empty,
            "exit" => Self::Exit,
            _ => Self::Command(command.to_owned()),
        }
    }
}

/// Why the console stopped reading.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ConsoleExit {
    /// The user typed `exit`.
    Quit,
    /// Input was closed.
    EndOfInput,
}

pub(crate) struct RemoteConsole {
    sender: Arc<dyn CommandSender>,
    output: Output,
    /// Session events; when set, the prompt waits for the device to answer.
    responses: Option<broadcast::Receiver<SessionEvent>>,
}

impl RemoteConsole {
    pub(crate) fn new(sender: Arc<dyn CommandSender>, output: Output) -> Self {
        Self {
            sender,
            output,
            responses: None,
        }
    }

    /// Hold the next prompt until the device answered a sent command.
    #[must_use]
    pub(crate) fn with_responses(mut self, events: broadcast::Receiver<SessionEvent>) -> Self {
        self.responses = Some(events);
        self
    }

    /// Read lines until `exit` or end of input.
    pub(crate) async fn run<R>(&mut self, input: R) -> io::Result<ConsoleExit>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if self.handle(&line).await == Submitted::Exit {
                return Ok(ConsoleExit::Quit);
            }
        }
        Ok(ConsoleExit::EndOfInput)
    }

    /// Read lines from the terminal with history navigation.
    ///
    /// Keys are read on a dedicated thread; the next prompt is shown once
    /// the previous line was handled.
    pub(crate) async fn run_interactive(
        &mut self,
        term: Term,
        history: History,
    ) -> io::Result<ConsoleExit> {
        let (lines_tx, mut lines) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || edit_lines(&term, history, &lines_tx, &ready_rx));

        while let Some(line) = lines.recv().await {
            if self.handle(&line?).await == Submitted::Exit {
                return Ok(ConsoleExit::Quit);
            }
            if ready_tx.send(()).is_err() {
                break;
            }
        }
        Ok(ConsoleExit::EndOfInput)
    }

    async fn handle(&mut self, line: &str) -> Submitted {
        let submitted = self.submit(line);
        if submitted == Submitted::Sent
            && let Some(events) = self.responses.as_mut()
        {
            await_response(events).await;
        }
        submitted
    }

    fn submit(&self, line: &str) -> Submitted {
        match Input::parse(line) {
            Input::Empty => Submitted::Ignored,
            Input::Exit => Submitted::Exit,
            Input::Command(command) => {
                if self.sender.send(&command) {
                    Submitted::Sent
                } else {
                    self.output
                        .error("Command could not be sent: no device connected!");
                    Submitted::NotSent
                }
            }
        }
    }
}

/// Wait until the device answers or goes away.
async fn await_response(events: &mut broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::ActionResponse { .. } | SessionEvent::Disconnected { .. })
            | Err(RecvError::Closed) => return,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
}

fn edit_lines(
    term: &Term,
    mut history: History,
    lines: &mpsc::UnboundedSender<io::Result<String>>,
    ready: &std::sync::mpsc::Receiver<()>,
) {
    loop {
        let line = read_line(term, &mut history);
        let failed = line.is_err();
        if lines.send(line).is_err() || failed || ready.recv().is_err() {
            return;
        }
    }
}

fn read_line(term: &Term, history: &mut History) -> io::Result<String> {
    let prompt = Style::new().blue().apply_to(PROMPT).to_string();
    let mut line = String::new();
    term.write_str(&prompt)?;
    loop {
        match term.read_key()? {
            Key::Enter => {
                term.write_line("")?;
                match Input::parse(&line) {
                    Input::Command(command) => history.add(&command),
                    Input::Empty | Input::Exit => history.reset(),
                }
                return Ok(line);
            }
            Key::CtrlC => {
                term.write_line("")?;
                return Ok("exit".to_owned());
            }
            Key::Backspace => {
                if line.pop().is_some() {
                    term.clear_chars(1)?;
                }
            }
            Key::ArrowUp => {
                if let Some(entry) = history.older() {
                    line = entry.to_owned();
                    redraw(term, &prompt, &line)?;
                }
            }
            Key::ArrowDown => {
                line = history.newer().unwrap_or_default().to_owned();
                redraw(term, &prompt, &line)?;
            }
            Key::Char(c) if !c.is_control() => {
                line.push(c);
                term.write_str(c.encode_utf8(&mut [0; 4]))?;
            }
            _ => {}
        }
    }
}

fn redraw(term: &Term, prompt: &str, line: &str) -> io::Result<()> {
    term.clear_line()?;
    term.write_str(prompt)?;
    term.write_str(line)
}

#[derive(Debug, PartialEq, Eq)]
enum Submitted {
    Ignored,
    Exit,
    Sent,
    NotSent,
}

/// Print session events and reload notices until both channels close.
pub(crate) async fn print_events(
    output: Output,
    mut events: broadcast::Receiver<SessionEvent>,
    mut notices: Option<broadcast::Receiver<ReloadNotice>>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&output, &event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Console lagged behind session events");
                }
                Err(RecvError::Closed) => return,
            },
            notice = recv_notice(notices.as_mut()) => match notice {
                Ok(notice) => output.info(&notice.to_string()),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => notices = None,
            },
        }
    }
}

async fn recv_notice(
    notices: Option<&mut broadcast::Receiver<ReloadNotice>>,
) -> Result<ReloadNotice, RecvError> {
    match notices {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn print_event(output: &Output, event: &SessionEvent) {
    match event {
        SessionEvent::Connected { device, .. } => {
            output.success(&format!(
                "Connected to {} device {}",
                device.platform, device.model
            ));
        }
        SessionEvent::Log { record, .. } => {
            let (level, message) = log_line(record);
            match level {
                "error" => output.error(&message),
                "warn" => output.warning(&message),
                _ => output.info(&message),
            }
        }
        SessionEvent::ActionResponse { result, .. } => {
            output.highlight(&format!("<< {}", display_value(result)));
        }
        SessionEvent::Disconnected { reason, .. } => {
            output.warning(disconnect_message(*reason));
        }
    }
}

/// Level and text of a device log record.
fn log_line(record: &Value) -> (&str, String) {
    let level = record.get("level").and_then(Value::as_str).unwrap_or("log");
    let message = record
        .get("message")
        .map_or_else(|| display_value(record), display_value);
    (level, message)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn disconnect_message(reason: DisconnectReason) -> &'static str {
    match reason {
        DisconnectReason::Closed(CLOSE_OUTDATED) => "Session replaced by a newer connection",
        DisconnectReason::Closed(_) => "Session closed",
        DisconnectReason::HeartbeatTimeout => "Device stopped responding",
        DisconnectReason::PeerClosed => "Device disconnected",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    struct Recorder {
        connected: bool,
        sent: Mutex<Vec<String>>,
    }

    impl CommandSender for Recorder {
        fn send(&self, command: &str) -> bool {
            self.sent.lock().unwrap().push(command.to_owned());
            self.connected
        }
    }

    fn console(connected: bool) -> (RemoteConsole, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            connected,
            sent: Mutex::new(Vec::new()),
        });
        let sender: Arc<dyn CommandSender> = Arc::clone(&recorder) as Arc<dyn CommandSender>;
        (RemoteConsole::new(sender, Output::new()), recorder)
    }

    #[test]
    fn test_parse_strips_trailing_semicolons() {
        assert_eq!(
            Input::parse("tabris.app.reload();;"),
            Input::Command("tabris.app.reload()".to_owned())
        );
    }

    #[test]
    fn test_parse_exit_and_empty() {
        assert_eq!(Input::parse("exit"), Input::Exit);
        assert_eq!(Input::parse("exit;"), Input::Exit);
        assert_eq!(Input::parse(""), Input::Empty);
        assert_eq!(Input::parse(" ; "), Input::Empty);
    }

    #[test]
    fn test_submit_reports_failed_send() {
        let (console, recorder) = console(false);
        assert_eq!(console.submit("1 + 1"), Submitted::NotSent);
        assert_eq!(*recorder.sent.lock().unwrap(), vec!["1 + 1".to_owned()]);
    }

    #[test]
    fn test_submit_skips_empty_lines() {
        let (console, recorder) = console(true);
        assert_eq!(console.submit(";"), Submitted::Ignored);
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_forwards_lines_until_exit() {
        let (mut console, recorder) = console(true);
        let input: &[u8] = b"a();\n\nb()\nexit\nc()\n";

        let exit = console.run(input).await.unwrap();

        assert_eq!(exit, ConsoleExit::Quit);
        assert_eq!(
            *recorder.sent.lock().unwrap(),
            vec!["a()".to_owned(), "b()".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_run_ends_with_input() {
        let (mut console, _) = console(true);
        let input: &[u8] = b"a()\n";
        assert_eq!(console.run(input).await.unwrap(), ConsoleExit::EndOfInput);
    }

    fn response(session_id: u64) -> SessionEvent {
        SessionEvent::ActionResponse {
            session_id,
            result: json!(2),
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_run_holds_next_line_until_response() {
        let (tx, rx) = broadcast::channel(8);
        let (console, recorder) = console(true);
        let mut console = console.with_responses(rx);
        let input: &'static [u8] = b"a()\nb()\n";
        let task = tokio::spawn(async move { console.run(input).await.unwrap() });

        settle().await;
        assert_eq!(*recorder.sent.lock().unwrap(), vec!["a()".to_owned()]);

        tx.send(SessionEvent::Log {
            session_id: 1,
            record: json!({"level": "log", "message": "hi"}),
        })
        .unwrap();
        settle().await;
        assert_eq!(*recorder.sent.lock().unwrap(), vec!["a()".to_owned()]);

        tx.send(response(1)).unwrap();
        settle().await;
        assert_eq!(
            *recorder.sent.lock().unwrap(),
            vec!["a()".to_owned(), "b()".to_owned()]
        );

        tx.send(response(1)).unwrap();
        assert_eq!(task.await.unwrap(), ConsoleExit::EndOfInput);
    }

    #[tokio::test]
    async fn test_run_does_not_wait_for_unsent_commands() {
        let (_tx, rx) = broadcast::channel(8);
        let (console, recorder) = console(false);
        let mut console = console.with_responses(rx);
        let input: &[u8] = b"a()\n\nexit\n";

        assert_eq!(console.run(input).await.unwrap(), ConsoleExit::Quit);
        assert_eq!(*recorder.sent.lock().unwrap(), vec!["a()".to_owned()]);
    }

    #[tokio::test]
    async fn test_await_response_released_by_disconnect() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(SessionEvent::Disconnected {
            session_id: 1,
            reason: DisconnectReason::PeerClosed,
        })
        .unwrap();
        await_response(&mut rx).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_await_response_released_by_closed_channel() {
        let (tx, mut rx) = broadcast::channel::<SessionEvent>(8);
        drop(tx);
        await_response(&mut rx).await;
    }

    #[test]
    fn test_log_line_uses_level_and_message() {
        assert_eq!(
            log_line(&json!({"level": "warn", "message": "careful"})),
            ("warn", "careful".to_owned())
        );
        assert_eq!(log_line(&json!(42)), ("log", "42".to_owned()));
    }

    #[test]
    fn test_disconnect_message_for_superseded_session() {
        assert_eq!(
            disconnect_message(DisconnectReason::Closed(CLOSE_OUTDATED)),
            "Session replaced by a newer connection"
        );
    }
}
