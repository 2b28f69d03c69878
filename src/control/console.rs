// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{io, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{info, span, warn, Level};

use super::{AudioTarget, ControlError, Controller};
use crate::color::Rgb;
use crate::config::PerformanceMode;

const HELP: &str = "\
status | effects | effect <key> | param <name> <json> | state | params <key>
setups | setup <name> | brightness <0..1> | performance <low|normal|high>
calibrate | highlight <index> | canvas | paint <json colors>
sandbox | open <file> | sandbox-state | shows
load <visualiser|lightshow> <file> | play|pause|stop <engine> | seek <engine> <seconds>
transport <play|pause|stop|status> | transport seek <seconds> | help | quit";

/// Why a console line could not be run.
#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error("unrecognized command '{0}', try 'help'")]
    Unrecognized(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid argument '{value}': {reason}")]
    Argument { value: String, reason: String },

    #[error(transparent)]
    Control(#[from] ControlError),
}

fn argument(value: &str, reason: impl ToString) -> CommandError {
    CommandError::Argument {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, CommandError> {
    serde_json::to_value(value).map_err(|e| argument("response", e))
}

fn seconds(value: &str) -> Result<Duration, CommandError> {
    value
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| argument(value, "expected a non-negative number of seconds"))
}

/// Whether the console should keep reading.
#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Drives a controller with line commands. Every command answers with one line of
/// JSON: `{"ok": ...}` or `{"error": "..."}`.
pub struct Console {
    controller: Arc<Controller>,
}

impl Console {
    pub fn new(controller: Arc<Controller>) -> Console {
        Console { controller }
    }

    /// Reads commands until the input ends or `quit` is entered.
    pub fn run<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        loop {
            write!(writer, "> ")?;
            writer.flush()?;
            let mut input = String::default();
            if reader.read_line(&mut input)? == 0 {
                info!("Console input closed.");
                return Ok(());
            }
            let input = input.trim();
            if input.is_empty() {
                continue;
            }

            let (flow, response) = match self.execute(input) {
                Ok((flow, value)) => (flow, json!({ "ok": value })),
                Err(e) => {
                    warn!(input, err = %e, "Command failed");
                    (Flow::Continue, json!({ "error": e.to_string() }))
                }
            };
            writeln!(writer, "{}", response)?;
            if flow == Flow::Quit {
                return Ok(());
            }
        }
    }

    /// Runs the console against stdin and stdout on a blocking task.
    pub fn spawn(self) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "console driver");
            let _enter = span.enter();
            info!("Console driver started.");
            self.run(io::stdin().lock(), io::stdout())
        })
    }

    fn execute(&self, input: &str) -> Result<(Flow, Value), CommandError> {
        let (command, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();
        let controller = &self.controller;

        let value = match (command.to_lowercase().as_str(), args.as_slice()) {
            ("quit" | "exit", _) => return Ok((Flow::Quit, Value::Null)),
            ("help", _) => Value::String(HELP.to_string()),
            ("status", _) => to_json(controller.status())?,

            ("effects", _) => to_json(controller.list_effects()?)?,
            ("effect", [key]) => {
                controller.set_effect(key)?;
                Value::Null
            }
            ("effect", _) => return Err(CommandError::Usage("effect <key>")),
            ("param", [name, ..]) => {
                // The value is everything after the name, so names cannot contain spaces
                // but JSON values can.
                let raw = rest[name.len()..].trim();
                let value: Value =
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
                controller.set_parameter(name, value)?;
                Value::Null
            }
            ("param", _) => return Err(CommandError::Usage("param <name> <json>")),
            ("state", _) => to_json(controller.get_state()?)?,
            ("params", [key]) => to_json(controller.get_parameters(key)?)?,
            ("params", _) => return Err(CommandError::Usage("params <key>")),

            ("setups", _) => to_json(controller.list_setups()?)?,
            ("setup", [name]) => {
                controller.change_setup(name)?;
                Value::Null
            }
            ("setup", _) => return Err(CommandError::Usage("setup <name>")),
            ("brightness", [value]) => {
                let brightness = value.parse::<f64>().map_err(|e| argument(value, e))?;
                controller.set_brightness(brightness)?;
                Value::Null
            }
            ("brightness", _) => return Err(CommandError::Usage("brightness <0..1>")),
            ("performance", [mode]) => {
                let mode = mode
                    .parse::<PerformanceMode>()
                    .map_err(|e| argument(mode, e))?;
                controller.set_performance_mode(mode)?;
                Value::Null
            }
            ("performance", _) => {
                return Err(CommandError::Usage("performance <low|normal|high>"))
            }

            ("calibrate", _) => {
                controller.start_calibration()?;
                Value::Null
            }
            ("highlight", [index]) => {
                let index = index.parse::<usize>().map_err(|e| argument(index, e))?;
                controller.highlight(index)?;
                Value::Null
            }
            ("highlight", _) => return Err(CommandError::Usage("highlight <index>")),
            ("canvas", _) => to_json(controller.get_pixels()?)?,
            ("paint", [_, ..]) => {
                let pixels: Vec<Rgb> = serde_json::from_str(rest).map_err(|e| argument(rest, e))?;
                controller.set_pixels(pixels)?;
                Value::Null
            }
            ("paint", _) => return Err(CommandError::Usage("paint [[r,g,b], ...]")),

            ("sandbox", _) => to_json(controller.list_sandbox_files()?)?,
            ("open", [file]) => {
                controller.set_sandbox_file(file)?;
                Value::Null
            }
            ("open", _) => return Err(CommandError::Usage("open <file>")),
            ("sandbox-state", _) => to_json(controller.sandbox_status()?)?,
            ("shows", _) => to_json(controller.list_lightshows()?)?,

            ("load", [target, file]) => {
                controller.load_audio(target.parse::<AudioTarget>()?, file)?;
                Value::Null
            }
            ("load", _) => return Err(CommandError::Usage("load <engine> <file>")),
            ("play", [target]) => {
                controller.play(target.parse()?)?;
                Value::Null
            }
            ("pause", [target]) => {
                controller.pause(target.parse()?)?;
                Value::Null
            }
            ("stop", [target]) => {
                controller.stop(target.parse()?)?;
                Value::Null
            }
            ("seek", [target, position]) => {
                controller.seek(target.parse()?, seconds(position)?)?;
                Value::Null
            }
            ("play" | "pause" | "stop", _) => return Err(CommandError::Usage("<play|pause|stop> <engine>")),
            ("seek", _) => return Err(CommandError::Usage("seek <engine> <seconds>")),

            ("transport", ["play"]) => {
                controller.transport_play()?;
                Value::Null
            }
            ("transport", ["pause"]) => {
                controller.transport_pause()?;
                Value::Null
            }
            ("transport", ["stop"]) => {
                controller.transport_stop()?;
                Value::Null
            }
            ("transport", ["seek", position]) => {
                controller.transport_seek(seconds(position)?)?;
                Value::Null
            }
            ("transport", ["status"]) => to_json(controller.transport_status()?)?,
            ("transport", _) => {
                return Err(CommandError::Usage("transport <play|pause|stop|status|seek <seconds>>"))
            }

            _ => return Err(CommandError::Unrecognized(command.to_string())),
        };
        Ok((Flow::Continue, value))
    }
}
