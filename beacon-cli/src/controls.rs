//! Keyboard control of a running check.
//!
//! `p` pauses, `r` resumes, `c` or Esc cancels and Ctrl+C force-exits. When
//! stdin is not a terminal, Ctrl+C arrives as a signal and interrupts the run.

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon_core::bulk::{RunControl, RunSignal};
use beacon_core::colors::CatppuccinExt;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use indicatif::ProgressBar;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Pause,
    Resume,
    Cancel,
    ForceExit,
}

fn action_for(code: KeyCode, modifiers: KeyModifiers) -> Option<KeyAction> {
    match code {
        KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::ForceExit)
        }
        KeyCode::Char('p') | KeyCode::Char('P') => Some(KeyAction::Pause),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::Resume),
        KeyCode::Char('c') | KeyCode::Char('C') | KeyCode::Esc => Some(KeyAction::Cancel),
        _ => None,
    }
}

pub struct KeyListener {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    raw_mode: bool,
}

impl KeyListener {
    pub fn spawn(control: RunControl, bar: ProgressBar) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let raw_mode = std::io::stdin().is_terminal() && terminal::enable_raw_mode().is_ok();

        let handle = if raw_mode {
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || listen_keys(control, bar, stop))
        } else {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    control.interrupt();
                }
            })
        };

        Self {
            handle,
            stop,
            raw_mode,
        }
    }

    pub fn raw_mode(&self) -> bool {
        self.raw_mode
    }

    /// Stops listening and restores the terminal.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.handle.abort();
        let _ = self.handle.await;
        if self.raw_mode {
            let _ = terminal::disable_raw_mode();
        }
    }
}

fn listen_keys(control: RunControl, bar: ProgressBar, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::SeqCst) && control.signal() != RunSignal::Stopped {
        if !event::poll(Duration::from_millis(100)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        })) = event::read()
        else {
            continue;
        };
        if kind == KeyEventKind::Release {
            continue;
        }

        match action_for(code, modifiers) {
            Some(KeyAction::Pause) => {
                if control.pause() {
                    bar.set_message(format!("{}", "paused, press r to resume".peach()));
                }
            }
            Some(KeyAction::Resume) => {
                if control.resume() {
                    bar.set_message("");
                }
            }
            Some(KeyAction::Cancel) => {
                control.cancel();
                break;
            }
            Some(KeyAction::ForceExit) => {
                control.force_exit();
                break;
            }
            None => {}
        }
    }
    debug!("Key listener exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        let none = KeyModifiers::NONE;
        assert_eq!(action_for(KeyCode::Char('p'), none), Some(KeyAction::Pause));
        assert_eq!(action_for(KeyCode::Char('r'), none), Some(KeyAction::Resume));
        assert_eq!(action_for(KeyCode::Char('c'), none), Some(KeyAction::Cancel));
        assert_eq!(action_for(KeyCode::Esc, none), Some(KeyAction::Cancel));
        assert_eq!(
            action_for(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Some(KeyAction::ForceExit)
        );
        assert_eq!(action_for(KeyCode::Char('x'), none), None);
    }
}
