//! Scripted input for the demo session, one `--event` per host action.

use std::str::FromStr;

use thiserror::Error;

use archie_kbd::machine::archie::ArchieKeyboard;
use archie_kbd::machine::generic::link::Transport;
use archie_kbd::machine::generic::timer::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEvent {
    KeyDown(u16),
    KeyUp(u16),
    /// Press then release
    Key(u16),
    Mouse { dx: i8, dy: i8 },
    Buttons(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("expected <kind>:<value>, got {0:?}")]
    Syntax(String),
    #[error("unknown event kind {0:?}")]
    UnknownKind(String),
    #[error("bad value {value:?} for {kind}")]
    BadValue { kind: &'static str, value: String },
}

fn parse_key(value: &str) -> Result<u16, ScriptError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u16::from_str_radix(digits, 16)
        .ok()
        .filter(|&id| id <= 0xff)
        .ok_or_else(|| ScriptError::BadValue {
            kind: "key",
            value: value.to_owned(),
        })
}

impl FromStr for ScriptEvent {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, value)) = s.split_once(':') else {
            return Err(ScriptError::Syntax(s.to_owned()));
        };
        match kind {
            "down" => Ok(ScriptEvent::KeyDown(parse_key(value)?)),
            "up" => Ok(ScriptEvent::KeyUp(parse_key(value)?)),
            "key" => Ok(ScriptEvent::Key(parse_key(value)?)),
            "mouse" => {
                let bad = || ScriptError::BadValue {
                    kind: "mouse",
                    value: value.to_owned(),
                };
                let (dx, dy) = value.split_once(',').ok_or_else(bad)?;
                let dx = dx.trim().parse().map_err(|_| bad())?;
                let dy = dy.trim().parse().map_err(|_| bad())?;
                Ok(ScriptEvent::Mouse { dx, dy })
            }
            "buttons" => value
                .parse()
                .ok()
                .filter(|&mask: &u8| mask <= 0b111)
                .map(ScriptEvent::Buttons)
                .ok_or_else(|| ScriptError::BadValue {
                    kind: "buttons",
                    value: value.to_owned(),
                }),
            _ => Err(ScriptError::UnknownKind(kind.to_owned())),
        }
    }
}

impl ScriptEvent {
    /// Feed this event to the keyboard. `buttons` tracks the mask across
    /// mouse events so motion doesn't release held buttons.
    pub fn apply<T: Transport, C: Clock>(self, kbd: &mut ArchieKeyboard<T, C>, buttons: &mut u8) {
        match self {
            ScriptEvent::KeyDown(id) => kbd.submit_key(id, true),
            ScriptEvent::KeyUp(id) => kbd.submit_key(id, false),
            ScriptEvent::Key(id) => {
                kbd.submit_key(id, true);
                kbd.submit_key(id, false);
            }
            ScriptEvent::Mouse { dx, dy } => kbd.submit_mouse(*buttons, dx, dy),
            ScriptEvent::Buttons(mask) => {
                *buttons = mask;
                kbd.submit_mouse(mask, 0, 0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("down:12", ScriptEvent::KeyDown(0x12))]
    #[case("up:0x5a", ScriptEvent::KeyUp(0x5a))]
    #[case("key:7", ScriptEvent::Key(0x07))]
    #[case("mouse:5,-3", ScriptEvent::Mouse { dx: 5, dy: -3 })]
    #[case("mouse: -128 , 127", ScriptEvent::Mouse { dx: -128, dy: 127 })]
    #[case("buttons:5", ScriptEvent::Buttons(5))]
    fn test_parse(#[case] input: &str, #[case] expected: ScriptEvent) {
        assert_eq!(input.parse::<ScriptEvent>(), Ok(expected));
    }

    #[rstest]
    #[case("down", ScriptError::Syntax("down".into()))]
    #[case("tap:12", ScriptError::UnknownKind("tap".into()))]
    #[case("down:zz", ScriptError::BadValue { kind: "key", value: "zz".into() })]
    #[case("key:100", ScriptError::BadValue { kind: "key", value: "100".into() })]
    #[case("mouse:5", ScriptError::BadValue { kind: "mouse", value: "5".into() })]
    #[case("mouse:200,0", ScriptError::BadValue { kind: "mouse", value: "200,0".into() })]
    #[case("buttons:8", ScriptError::BadValue { kind: "buttons", value: "8".into() })]
    fn test_parse_errors(#[case] input: &str, #[case] expected: ScriptError) {
        assert_eq!(input.parse::<ScriptEvent>(), Err(expected));
    }
}
