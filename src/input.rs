use crate::calc::Key;
use crate::model::Scene;
use crate::render::Layout;
use crate::sim::PlayerAction;
use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InputEvent {
    Key { key: KeyCode, mods: KeyModifiers },
    Click { column: u16, row: u16 },
}

pub(crate) fn collect_input_nonblocking(max_frame_time: Duration) -> anyhow::Result<Vec<InputEvent>> {
    let mut out = Vec::new();

    // poll with a tiny timeout so we stay responsive
    let timeout = std::cmp::min(Duration::from_millis(1), max_frame_time);
    while event::poll(timeout)? {
        match event::read()? {
            Event::Key(k) => {
                if k.kind == KeyEventKind::Press || k.kind == KeyEventKind::Repeat {
                    out.push(InputEvent::Key {
                        key: k.code,
                        mods: k.modifiers,
                    });
                }
            }
            Event::Mouse(m) => {
                if m.kind == MouseEventKind::Down(MouseButton::Left) {
                    out.push(InputEvent::Click {
                        column: m.column,
                        row: m.row,
                    });
                }
            }
            _ => {}
        }
        if out.len() >= 32 {
            break;
        }
    }
    Ok(out)
}

/// Keyboard stand-ins for the keypad buttons.
pub(crate) fn keypad_key(code: KeyCode) -> Option<Key> {
    match code {
        KeyCode::Enter => Some(Key::Equals),
        KeyCode::Backspace => Some(Key::Backspace),
        KeyCode::Delete => Some(Key::Clear),
        KeyCode::Char(ch) => Key::from_char(ch),
        _ => None,
    }
}

pub(crate) fn map_event_to_action(
    scene: Scene,
    ev: InputEvent,
    layout: &Layout,
) -> Option<PlayerAction> {
    match ev {
        InputEvent::Key { key, mods } => {
            // raw mode swallows SIGINT
            if mods.contains(KeyModifiers::CONTROL)
                && matches!(key, KeyCode::Char('c') | KeyCode::Char('C'))
            {
                return Some(PlayerAction::Quit);
            }
            match key {
                KeyCode::Char('q') | KeyCode::Char('Q') => return Some(PlayerAction::Quit),
                KeyCode::Char('h') | KeyCode::Char('H') | KeyCode::F(1) => {
                    return Some(PlayerAction::HelpToggle)
                }
                KeyCode::Esc => {
                    return Some(match scene {
                        Scene::Help => PlayerAction::Back,
                        Scene::Main => PlayerAction::Quit,
                    })
                }
                _ => {}
            }
            match scene {
                Scene::Main => keypad_key(key).map(PlayerAction::Press),
                Scene::Help => None,
            }
        }
        InputEvent::Click { column, row } => match scene {
            Scene::Main => layout.button_at(column, row).map(PlayerAction::Press),
            Scene::Help => Some(PlayerAction::Back),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Operator;

    fn key(code: KeyCode) -> InputEvent {
        InputEvent::Key {
            key: code,
            mods: KeyModifiers::NONE,
        }
    }

    #[test]
    fn keyboard_stand_ins() {
        assert_eq!(keypad_key(KeyCode::Char('7')), Some(Key::Digit(7)));
        assert_eq!(keypad_key(KeyCode::Char('*')), Some(Key::Op(Operator::Multiply)));
        assert_eq!(keypad_key(KeyCode::Char('/')), Some(Key::Op(Operator::Divide)));
        assert_eq!(keypad_key(KeyCode::Enter), Some(Key::Equals));
        assert_eq!(keypad_key(KeyCode::Backspace), Some(Key::Backspace));
        assert_eq!(keypad_key(KeyCode::Delete), Some(Key::Clear));
        assert_eq!(keypad_key(KeyCode::Char('c')), Some(Key::Clear));
        assert_eq!(keypad_key(KeyCode::Tab), None);
        assert_eq!(keypad_key(KeyCode::Char('z')), None);
    }

    #[test]
    fn quit_and_help_keys() {
        let l = Layout::new(80, 40);
        assert_eq!(
            map_event_to_action(Scene::Main, key(KeyCode::Char('q')), &l),
            Some(PlayerAction::Quit)
        );
        assert_eq!(
            map_event_to_action(Scene::Main, key(KeyCode::Esc), &l),
            Some(PlayerAction::Quit)
        );
        assert_eq!(
            map_event_to_action(Scene::Help, key(KeyCode::Esc), &l),
            Some(PlayerAction::Back)
        );
        assert_eq!(
            map_event_to_action(Scene::Main, key(KeyCode::Char('h')), &l),
            Some(PlayerAction::HelpToggle)
        );
        let ctrl_c = InputEvent::Key {
            key: KeyCode::Char('c'),
            mods: KeyModifiers::CONTROL,
        };
        assert_eq!(
            map_event_to_action(Scene::Main, ctrl_c, &l),
            Some(PlayerAction::Quit)
        );
    }

    #[test]
    fn help_screen_swallows_keypad() {
        let l = Layout::new(80, 40);
        assert_eq!(map_event_to_action(Scene::Help, key(KeyCode::Char('5')), &l), None);
        let click = InputEvent::Click { column: 5, row: 31 };
        assert_eq!(
            map_event_to_action(Scene::Help, click, &l),
            Some(PlayerAction::Back)
        );
    }

    #[test]
    fn clicks_press_buttons() {
        let l = Layout::new(80, 40);
        let click = InputEvent::Click { column: 5, row: 31 };
        assert_eq!(
            map_event_to_action(Scene::Main, click, &l),
            Some(PlayerAction::Press(Key::Clear))
        );
        let miss = InputEvent::Click { column: 5, row: 2 };
        assert_eq!(map_event_to_action(Scene::Main, miss, &l), None);
    }
}
