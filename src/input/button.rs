//! Buttons and the command frame sent to the emulator
//!
//! Frame layout: `[QEMU_COMMAND_OPCODE, BUTTON_PROTOCOL, mask]`. The mask is
//! the complete set of held buttons, so `0` releases everything.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::common::Error;

/// Opcode for a command forwarded to the emulator
pub const QEMU_COMMAND_OPCODE: u8 = 0x0B;

/// Emulator protocol id for button state
pub const BUTTON_PROTOCOL: u8 = 0x08;

/// Length of every button frame
pub const FRAME_LEN: usize = 3;

/// Physical watch buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum Button {
    Back,
    Up,
    Select,
    Down,
}

impl Button {
    pub const ALL: [Button; 4] = [Button::Back, Button::Up, Button::Select, Button::Down];

    /// Bit for this button in the state mask
    pub fn mask(self) -> u8 {
        match self {
            Button::Back => 1,
            Button::Up => 2,
            Button::Select => 4,
            Button::Down => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Button::Back => "BACK",
            Button::Up => "UP",
            Button::Select => "SELECT",
            Button::Down => "DOWN",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownButton(s.to_string()))
    }
}

impl TryFrom<String> for Button {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A single button state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonCommand {
    /// Assert one button
    Press(Button),
    /// Clear every button bit
    ReleaseAll,
}

impl ButtonCommand {
    pub fn mask(self) -> u8 {
        match self {
            ButtonCommand::Press(button) => button.mask(),
            ButtonCommand::ReleaseAll => 0,
        }
    }

    pub fn to_frame(self) -> [u8; FRAME_LEN] {
        [QEMU_COMMAND_OPCODE, BUTTON_PROTOCOL, self.mask()]
    }
}

impl fmt::Display for ButtonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonCommand::Press(button) => write!(f, "{}", button),
            ButtonCommand::ReleaseAll => f.write_str("all buttons"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_bit_exact() {
        assert_eq!(ButtonCommand::Press(Button::Back).to_frame(), [0x0B, 0x08, 1]);
        assert_eq!(ButtonCommand::Press(Button::Up).to_frame(), [0x0B, 0x08, 2]);
        assert_eq!(ButtonCommand::Press(Button::Select).to_frame(), [0x0B, 0x08, 4]);
        assert_eq!(ButtonCommand::Press(Button::Down).to_frame(), [0x0B, 0x08, 8]);
        assert_eq!(ButtonCommand::ReleaseAll.to_frame(), [0x0B, 0x08, 0]);
    }

    #[test]
    fn test_parse_button_names() {
        assert_eq!("up".parse::<Button>().unwrap(), Button::Up);
        assert_eq!("SELECT".parse::<Button>().unwrap(), Button::Select);
        assert_eq!(" Down ".parse::<Button>().unwrap(), Button::Down);
        assert!(matches!(
            "left".parse::<Button>(),
            Err(Error::UnknownButton(name)) if name == "left"
        ));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let buttons: Vec<Button> = serde_yaml::from_str("[back, Up, SELECT]").unwrap();
        assert_eq!(buttons, vec![Button::Back, Button::Up, Button::Select]);
        assert!(serde_yaml::from_str::<Button>("middle").is_err());
    }
}
