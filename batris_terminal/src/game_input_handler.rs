use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::Sender,
        Arc,
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};

use batris_engine::Button;

/// `None` is the pause/interrupt signal (Escape).
pub type ButtonSignal = Option<(Instant, Button, bool)>;

/// Background thread translating terminal key events into button signals.
#[derive(Debug)]
pub struct CrosstermHandler {
    handles: Option<(JoinHandle<()>, Arc<AtomicBool>)>,
}

impl Drop for CrosstermHandler {
    fn drop(&mut self) {
        if let Some((_handle, running_flag)) = self.handles.take() {
            running_flag.store(false, Ordering::Release);
        }
    }
}

impl CrosstermHandler {
    pub fn new(
        sender: &Sender<ButtonSignal>,
        keybinds: &HashMap<KeyCode, Button>,
        kitty_enabled: bool,
    ) -> Self {
        let spawn = if kitty_enabled {
            Self::spawn_kitty
        } else {
            Self::spawn_standard
        };
        let flag = Arc::new(AtomicBool::new(true));
        let handle = spawn(sender.clone(), flag.clone(), keybinds.clone());
        CrosstermHandler {
            handles: Some((handle, flag)),
        }
    }

    /// Plain terminals report no key releases; a press is forwarded as an
    /// immediate press/release pair and held movement rides on autorepeat.
    fn spawn_standard(
        sender: Sender<ButtonSignal>,
        flag: Arc<AtomicBool>,
        keybinds: HashMap<KeyCode, Button>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            loop {
                let running = flag.load(Ordering::Acquire);
                if !running {
                    break;
                }
                let event = match event::read() {
                    Ok(event) => event,
                    // Spurious io::Error: ignore.
                    Err(_) => continue,
                };
                let instant = Instant::now();
                let button_signals = match event {
                    Event::Key(KeyEvent {
                        code: KeyCode::Esc,
                        kind: KeyEventKind::Press,
                        ..
                    }) => vec![None],
                    Event::Key(KeyEvent {
                        code: key,
                        kind: KeyEventKind::Press,
                        ..
                    }) => match keybinds.get(&key) {
                        Some(&button) => vec![
                            Some((instant, button, true)),
                            Some((instant, button, false)),
                        ],
                        None => continue,
                    },
                    _ => continue,
                };
                for button_signal in button_signals {
                    let _ = sender.send(button_signal);
                }
            }
        })
    }

    /// Kitty-protocol terminals report presses and releases separately, which
    /// gives real held-state for movement and soft drop.
    fn spawn_kitty(
        sender: Sender<ButtonSignal>,
        flag: Arc<AtomicBool>,
        keybinds: HashMap<KeyCode, Button>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            loop {
                let running = flag.load(Ordering::Acquire);
                if !running {
                    break;
                }
                let (instant, event) = match event::read() {
                    Err(_) => continue,
                    Ok(event) => (Instant::now(), event),
                };
                let button_signal = match event {
                    Event::Key(KeyEvent {
                        code: KeyCode::Esc,
                        kind: KeyEventKind::Press,
                        ..
                    }) => None,
                    // TTY simulated press repeat: ignore.
                    Event::Key(KeyEvent {
                        kind: KeyEventKind::Repeat,
                        ..
                    }) => continue,
                    Event::Key(KeyEvent { code, kind, .. }) => match keybinds.get(&code) {
                        None => continue,
                        Some(&button) => Some((instant, button, kind == KeyEventKind::Press)),
                    },
                    _ => continue,
                };
                let _ = sender.send(button_signal);
            }
        })
    }
}
