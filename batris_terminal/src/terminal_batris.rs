use std::{
    collections::HashMap,
    io::{self, Write},
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::{self, Print},
    terminal, ExecutableCommand, QueueableCommand,
};
use serde_json::{json, Value};
use serde_with::serde_as;

use batris_engine::{Battle, Button, ButtonsPressed};

use crate::campaign::{self, Opponent};
use crate::game_input_handler::CrosstermHandler;
use crate::game_renderer::BattleRenderer;
use crate::storage::Store;

/// Player-tunable frontend settings, persisted through the store.
#[serde_as]
#[derive(PartialEq, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Settings {
    pub game_fps: f64,
    /// Key codes are not valid JSON map keys, hence the list encoding.
    #[serde_as(as = "Vec<(_, _)>")]
    pub keybinds: HashMap<KeyCode, Button>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            game_fps: 30.0,
            keybinds: default_keybinds(),
        }
    }
}

/// Arrow keys, as in the original game.
pub fn default_keybinds() -> HashMap<KeyCode, Button> {
    HashMap::from([
        (KeyCode::Left, Button::MoveLeft),
        (KeyCode::Right, Button::MoveRight),
        (KeyCode::Up, Button::Rotate),
        (KeyCode::Down, Button::SoftDrop),
    ])
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
enum BattleExit {
    Victory,
    Defeat,
    Paused,
    Quit,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
enum PauseChoice {
    Resume,
    Forfeit,
    Quit,
}

#[derive(Debug)]
pub struct App<T: Write> {
    pub term: T,
    pub settings: Settings,
    store: Store,
    kitty_enabled: bool,
    seed: Option<u64>,
    start_at: Option<String>,
}

impl<T: Write> Drop for App<T> {
    fn drop(&mut self) {
        // Best-effort persistence and console epilogue.
        if let Ok(value) = serde_json::to_value(&self.settings) {
            self.store.set("settings", value);
        }
        let _ = self.store.save();
        if self.kitty_enabled {
            let _ = self.term.execute(event::PopKeyboardEnhancementFlags);
        }
        let _ = terminal::disable_raw_mode();
        let _ = self.term.execute(style::ResetColor);
        let _ = self.term.execute(cursor::Show);
    }
}

impl<T: Write> App<T> {
    pub const SAVE_FILE: &'static str = "./batris_save.json";

    pub fn new(
        mut terminal: T,
        fps: Option<u32>,
        seed: Option<u64>,
        start_at: Option<String>,
    ) -> Self {
        // Console prologue: initialization.
        let _ = terminal.execute(terminal::EnterAlternateScreen);
        let _ = terminal.execute(terminal::SetTitle("Batris"));
        let _ = terminal.execute(cursor::Hide);
        let _ = terminal::enable_raw_mode();
        let kitty_enabled = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if kitty_enabled {
            let _ = terminal.execute(event::PushKeyboardEnhancementFlags(
                event::KeyboardEnhancementFlags::all(),
            ));
        }
        let store = Store::open(Self::SAVE_FILE);
        let mut settings: Settings = store
            .get("settings")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();
        if let Some(fps) = fps {
            settings.game_fps = fps.into();
        }
        App {
            term: terminal,
            settings,
            store,
            kitty_enabled,
            seed,
            start_at,
        }
    }

    pub fn run(&mut self) -> io::Result<String> {
        let roster = match &self.start_at {
            Some(name) => match campaign::by_name(name) {
                Some(opponent) => vec![opponent],
                None => {
                    let _ = self.term.execute(terminal::LeaveAlternateScreen);
                    return Ok(format!("no such opponent: {name}"));
                }
            },
            None => campaign::roster(),
        };
        let mut lifetime_total = self
            .store
            .get("total_score")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let mut battles_won = self
            .store
            .get("battles_won")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        for (index, opponent) in roster.iter().enumerate() {
            if !self.intro_screen(opponent)? {
                let _ = self.term.execute(terminal::LeaveAlternateScreen);
                return Ok(String::from("left before the fight"));
            }
            let mut battle = match self.seed {
                Some(seed) => {
                    Battle::with_seed(opponent.rules.clone(), seed.wrapping_add(index as u64))
                }
                None => Battle::new(opponent.rules.clone()),
            };
            let mut renderer = BattleRenderer::new();
            'battle: loop {
                match self.battle_loop(&mut battle, &mut renderer, opponent)? {
                    BattleExit::Victory => {
                        lifetime_total += u64::from(battle.state().score);
                        battles_won += 1;
                        self.save_progress(lifetime_total, battles_won)?;
                        self.message_screen(
                            &format!("{} goes down!", opponent.name),
                            "press any key",
                        )?;
                        break 'battle;
                    }
                    BattleExit::Defeat => {
                        if self.retry_screen(opponent)? {
                            battle.reset();
                            renderer.reset();
                            continue 'battle;
                        }
                        let _ = self.term.execute(terminal::LeaveAlternateScreen);
                        return Ok(String::from("fell in battle"));
                    }
                    BattleExit::Paused => match self.pause_screen()? {
                        PauseChoice::Resume => continue 'battle,
                        PauseChoice::Forfeit => {
                            battle.forfeit();
                            continue 'battle;
                        }
                        PauseChoice::Quit => {
                            let _ = self.term.execute(terminal::LeaveAlternateScreen);
                            return Ok(String::from("left the campaign"));
                        }
                    },
                    BattleExit::Quit => {
                        let _ = self.term.execute(terminal::LeaveAlternateScreen);
                        return Ok(String::from("left the campaign"));
                    }
                }
            }
        }
        let _ = self.term.execute(terminal::LeaveAlternateScreen);
        Ok(format!("campaign complete, total score {lifetime_total}"))
    }

    /// Runs frames against one battle until it ends or the player interrupts.
    ///
    /// The engine clock continues from wherever the battle already was, so a
    /// pause/resume cycle never runs time backwards.
    fn battle_loop(
        &mut self,
        battle: &mut Battle,
        renderer: &mut BattleRenderer,
        opponent: &Opponent,
    ) -> io::Result<BattleExit> {
        let (sender, receiver) = mpsc::channel();
        let _input_handler =
            CrosstermHandler::new(&sender, &self.settings.keybinds, self.kitty_enabled);
        let frame = Duration::from_secs_f64(1.0 / self.settings.game_fps.max(1.0));
        let clock_base = battle.state().time;
        let resumed = Instant::now();
        let mut held = ButtonsPressed::default();
        loop {
            let frame_started = Instant::now();
            // Presses inside one frame are latched so a quick tap still
            // reaches the engine as an edge.
            let mut tapped = ButtonsPressed::default();
            loop {
                match receiver.try_recv() {
                    Ok(None) => return Ok(BattleExit::Paused),
                    Ok(Some((_, button, pressed))) => {
                        held[button] = pressed;
                        if pressed {
                            tapped[button] = true;
                        }
                    }
                    Err(mpsc::TryRecvError::Empty) => break,
                    Err(mpsc::TryRecvError::Disconnected) => return Ok(BattleExit::Quit),
                }
            }
            let buttons: ButtonsPressed = std::array::from_fn(|i| held[i] || tapped[i]);
            let now = clock_base + resumed.elapsed();
            let events = battle.update(Some(buttons), now).unwrap_or_default();
            renderer.absorb(&events);
            renderer.render(&mut self.term, battle, opponent.name)?;
            if let Some(end) = battle.state().end {
                return Ok(match end {
                    Ok(()) => BattleExit::Victory,
                    Err(_) => BattleExit::Defeat,
                });
            }
            let spent = frame_started.elapsed();
            if spent < frame {
                thread::sleep(frame - spent);
            }
        }
    }

    fn save_progress(&mut self, total: u64, battles_won: u64) -> io::Result<()> {
        self.store.set("total_score", json!(total));
        self.store.set("battles_won", json!(battles_won));
        self.store.set(
            "saved_at",
            json!(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        self.store.save()
    }

    /// `false` means the player walked away instead.
    fn intro_screen(&mut self, opponent: &Opponent) -> io::Result<bool> {
        self.draw_lines(&[
            &format!("vs. {}", opponent.name.to_ascii_uppercase()),
            "",
            opponent.intro,
            "",
            "press any key to fight, [q] to leave",
        ])?;
        let key = Self::read_key()?;
        Ok(!is_quit(&key))
    }

    fn retry_screen(&mut self, opponent: &Opponent) -> io::Result<bool> {
        self.draw_lines(&[
            "DEFEAT",
            "",
            &format!("{} still stands.", opponent.name),
            "",
            "[enter] rematch    [q] give up",
        ])?;
        loop {
            let key = Self::read_key()?;
            if is_quit(&key) || key.code == KeyCode::Esc {
                return Ok(false);
            }
            if key.code == KeyCode::Enter {
                return Ok(true);
            }
        }
    }

    fn pause_screen(&mut self) -> io::Result<PauseChoice> {
        self.draw_lines(&[
            "[ PAUSED ]",
            "",
            "[enter] resume    [f] forfeit    [q] quit",
        ])?;
        loop {
            let key = Self::read_key()?;
            if is_quit(&key) {
                return Ok(PauseChoice::Quit);
            }
            match key.code {
                KeyCode::Enter | KeyCode::Esc => return Ok(PauseChoice::Resume),
                KeyCode::Char('f') | KeyCode::Char('F') => return Ok(PauseChoice::Forfeit),
                _ => {}
            }
        }
    }

    fn message_screen(&mut self, title: &str, subtitle: &str) -> io::Result<()> {
        self.draw_lines(&[title, "", subtitle])?;
        Self::read_key()?;
        Ok(())
    }

    fn draw_lines(&mut self, lines: &[&str]) -> io::Result<()> {
        self.term
            .queue(cursor::MoveTo(0, 0))?
            .queue(terminal::Clear(terminal::ClearType::All))?;
        for (i, line) in lines.iter().enumerate() {
            self.term
                .queue(cursor::MoveTo(4, 3 + i as u16))?
                .queue(Print(line))?;
        }
        self.term.flush()
    }

    fn read_key() -> io::Result<KeyEvent> {
        loop {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(key);
                }
            }
        }
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q'))
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_as_json() {
        let settings = Settings::default();
        let value = serde_json::to_value(&settings).unwrap();
        let back: Settings = serde_json::from_value(value).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn default_keybinds_cover_all_buttons() {
        let keybinds = default_keybinds();
        for button in [
            Button::MoveLeft,
            Button::MoveRight,
            Button::Rotate,
            Button::SoftDrop,
        ] {
            assert!(keybinds.values().any(|&b| b == button), "{button:?}");
        }
    }
}
