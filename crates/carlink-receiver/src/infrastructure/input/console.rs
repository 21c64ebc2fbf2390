//! Console input source.
//!
//! Reads one command per line from standard input and feeds the key and
//! touch queues.  Useful on a bench without a touchscreen.
//!
//! # Line format
//!
//! ```text
//!   200            numeric key code
//!   home           named key (see KeyCode::from_name)
//!   down 400 240   touch event: <down|move|up> X Y in device coordinates
//! ```
//!
//! A bare `down` is the DOWN key; `down X Y` is a touch.

use std::io::{self, BufRead};
use std::thread;

use carlink_core::{KeyCode, RawTouchEvent};
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::key_forwarder::KeyIngress;
use crate::application::touch_forwarder::TouchIngress;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Key(KeyCode),
    Touch(RawTouchEvent),
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,
    #[error("unknown key or command `{0}`")]
    Unknown(String),
    #[error("expected `<down|move|up> X Y`, got `{0}`")]
    BadTouch(String),
}

const TOUCH_TAGS: [&str; 3] = ["down", "move", "up"];

/// Parses one console line.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((head, rest)) = tokens.split_first() else {
        return Err(ParseError::Empty);
    };
    let tag = head.to_ascii_lowercase();

    if TOUCH_TAGS.contains(&tag.as_str()) && !rest.is_empty() {
        return match rest {
            [x, y] => {
                let bad = || ParseError::BadTouch(line.trim().to_string());
                let x: f64 = x.parse().map_err(|_| bad())?;
                let y: f64 = y.parse().map_err(|_| bad())?;
                Ok(ConsoleCommand::Touch(RawTouchEvent::new(x, y, tag)))
            }
            _ => Err(ParseError::BadTouch(line.trim().to_string())),
        };
    }

    if !rest.is_empty() {
        return Err(ParseError::Unknown(line.trim().to_string()));
    }
    if let Ok(code) = head.parse::<u32>() {
        return Ok(ConsoleCommand::Key(KeyCode(code)));
    }
    KeyCode::from_name(head)
        .map(ConsoleCommand::Key)
        .ok_or_else(|| ParseError::Unknown(head.to_string()))
}

/// Feeds every line of `reader` into the queues until EOF or until a queue
/// closes.  Returns the number of commands queued.
pub fn run_console<R: BufRead>(reader: R, keys: &KeyIngress, touches: &TouchIngress) -> usize {
    let mut queued = 0;
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "console read failed");
                break;
            }
        };
        let accepted = match parse_line(&line) {
            Ok(ConsoleCommand::Key(code)) => keys.push(code),
            Ok(ConsoleCommand::Touch(event)) => touches.push(event.x, event.y, &event.tag),
            Err(ParseError::Empty) => continue,
            Err(e) => {
                warn!(error = %e, "ignoring console line");
                continue;
            }
        };
        if !accepted {
            break;
        }
        queued += 1;
    }
    queued
}

/// Runs [`run_console`] over stdin on a dedicated thread.
///
/// Blocking stdin reads would stall a runtime worker, so the console gets its
/// own OS thread.  The thread is not joined; it ends with the process.
pub fn spawn_console(
    keys: KeyIngress,
    touches: TouchIngress,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let queued = run_console(stdin.lock(), &keys, &touches);
            debug!(queued, "console input closed");
        })
}
