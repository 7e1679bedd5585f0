//! Maps RESP commands onto the storage contract

use std::sync::Arc;

use kvcache::SharedStorage;
use tracing::debug;

use crate::error::CommandError;
use crate::resp::Frame;

/// How `SET` treats an existing key
enum SetMode {
    /// Insert or replace
    Any,
    /// `NX`: only insert
    Absent,
    /// `XX`: only replace
    Present,
}

pub struct CommandHandler {
    storage: Arc<dyn SharedStorage>,
}

impl CommandHandler {
    pub fn new(storage: Arc<dyn SharedStorage>) -> Self {
        Self { storage }
    }

    /// Execute one request and build its reply; failures become RESP errors
    pub fn handle(&self, request: Frame) -> Frame {
        match self.dispatch(request) {
            Ok(reply) => reply,
            Err(e) => Frame::Error(e.to_string()),
        }
    }

    fn dispatch(&self, request: Frame) -> Result<Frame, CommandError> {
        let parts = into_args(request)?;
        let (name, args) = parts.split_first().ok_or(CommandError::InvalidFormat)?;
        let command = String::from_utf8_lossy(name).to_uppercase();
        debug!(command = %command, args = args.len(), "dispatching");

        match command.as_str() {
            "PING" => self.handle_ping(args),
            "ECHO" => self.handle_echo(args),
            "GET" => self.handle_get(args),
            "SET" => self.handle_set(args),
            "SETNX" => self.handle_setnx(args),
            "DEL" => self.handle_del(args),
            // redis-cli asks for the command table on connect
            "COMMAND" => Ok(Frame::Array(vec![])),
            _ => Err(CommandError::UnknownCommand(command)),
        }
    }

    fn handle_ping(&self, args: &[Vec<u8>]) -> Result<Frame, CommandError> {
        match args {
            [] => Ok(Frame::Simple("PONG".to_string())),
            [msg] => Ok(Frame::Bulk(msg.clone())),
            _ => Err(CommandError::WrongArity("ping")),
        }
    }

    fn handle_echo(&self, args: &[Vec<u8>]) -> Result<Frame, CommandError> {
        match args {
            [msg] => Ok(Frame::Bulk(msg.clone())),
            _ => Err(CommandError::WrongArity("echo")),
        }
    }

    fn handle_get(&self, args: &[Vec<u8>]) -> Result<Frame, CommandError> {
        let key = match args {
            [key] => key,
            _ => return Err(CommandError::WrongArity("get")),
        };

        Ok(match self.storage.get(key) {
            Some(value) => Frame::Bulk(value),
            None => Frame::Null,
        })
    }

    fn handle_set(&self, args: &[Vec<u8>]) -> Result<Frame, CommandError> {
        let (key, value, mode) = match args {
            [key, value] => (key, value, SetMode::Any),
            [key, value, option] => {
                let mode = match option.to_ascii_uppercase().as_slice() {
                    b"NX" => SetMode::Absent,
                    b"XX" => SetMode::Present,
                    _ => return Err(CommandError::Syntax),
                };
                (key, value, mode)
            }
            [_] | [] => return Err(CommandError::WrongArity("set")),
            _ => return Err(CommandError::Syntax),
        };

        match mode {
            SetMode::Any => {
                if self.storage.put(key, value) {
                    Ok(Frame::ok())
                } else {
                    Err(CommandError::TooLarge)
                }
            }
            SetMode::Absent => Ok(ok_or_null(self.storage.put_if_absent(key, value))),
            SetMode::Present => Ok(ok_or_null(self.storage.set(key, value))),
        }
    }

    fn handle_setnx(&self, args: &[Vec<u8>]) -> Result<Frame, CommandError> {
        match args {
            [key, value] => Ok(Frame::Integer(self.storage.put_if_absent(key, value) as i64)),
            _ => Err(CommandError::WrongArity("setnx")),
        }
    }

    fn handle_del(&self, args: &[Vec<u8>]) -> Result<Frame, CommandError> {
        if args.is_empty() {
            return Err(CommandError::WrongArity("del"));
        }

        let deleted = args.iter().filter(|key| self.storage.delete(key)).count();
        Ok(Frame::Integer(deleted as i64))
    }
}

fn ok_or_null(done: bool) -> Frame {
    if done {
        Frame::ok()
    } else {
        Frame::Null
    }
}

/// A request must be a non-empty array of bulk strings
fn into_args(request: Frame) -> Result<Vec<Vec<u8>>, CommandError> {
    let items = match request {
        Frame::Array(items) if !items.is_empty() => items,
        _ => return Err(CommandError::InvalidFormat),
    };

    items
        .into_iter()
        .map(|item| match item {
            Frame::Bulk(bytes) => Ok(bytes),
            _ => Err(CommandError::InvalidFormat),
        })
        .collect()
}
