use crate::relay::RelayOutput;
use crate::Transport;

use std::{collections::VecDeque, io};

/// Transport double replaying a fixed script of response lines.
///
/// Each `read_line` pops the next scripted line; an exhausted script behaves
/// like a silent sensor and fails with `TimedOut`. Written frames are
/// recorded for assertion.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: VecDeque<Vec<u8>>,
    pub sent: Vec<Vec<u8>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Vec<u8>>) -> Self {
        Self {
            responses: responses.into(),
            sent: Vec::new(),
        }
    }

    pub fn push_response(&mut self, line: &[u8]) {
        self.responses.push_back(line.to_vec());
    }

    pub fn remaining_responses(&self) -> usize {
        self.responses.len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.sent.push(frame.to_vec());
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        self.responses.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::TimedOut, "no response before timeout")
        })
    }
}

/// Relay double recording every level transition.
#[derive(Debug, Default)]
pub struct MockRelay {
    /// Levels in the order they were driven; `true` is HIGH.
    pub levels: Vec<bool>,
}

impl MockRelay {
    pub fn is_energized(&self) -> bool {
        self.levels.last() == Some(&true)
    }

    pub fn was_energized(&self) -> bool {
        self.levels.contains(&true)
    }
}

impl RelayOutput for MockRelay {
    fn set_high(&mut self) -> io::Result<()> {
        self.levels.push(true);
        Ok(())
    }

    fn set_low(&mut self) -> io::Result<()> {
        self.levels.push(false);
        Ok(())
    }
}
