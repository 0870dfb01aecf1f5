use std::{
  error::Error,
  fmt::{Debug, Display},
};

use flexi_logger::FlexiLoggerError;
use nix::errno::Errno;

pub type Result<T> = std::result::Result<T, JudgeBoxError>;

pub enum JudgeBoxError {
  Fork(String),
  Exec(String),
  Nix(Errno),
  Fs(String),
  Config(String),
  Queue(redis::RedisError),
  Store(postgres::Error),
  Logger(FlexiLoggerError),
}

impl JudgeBoxError {
  pub fn fork<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Fork(msg.into())
  }

  pub fn exec<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Exec(msg.into())
  }

  pub fn config<MS: Into<String>>(msg: MS) -> JudgeBoxError {
    JudgeBoxError::Config(msg.into())
  }
}

impl Debug for JudgeBoxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for JudgeBoxError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      JudgeBoxError::Fork(msg) => f.write_fmt(format_args!("JudgeBox Fork Error: {}", msg)),
      JudgeBoxError::Exec(msg) => f.write_fmt(format_args!("JudgeBox Exec Error: {}", msg)),
      JudgeBoxError::Nix(errno) => f.write_fmt(format_args!("JudgeBox Nix Error: {}", errno)),
      JudgeBoxError::Fs(msg) => f.write_fmt(format_args!("JudgeBox File System Error: {}", msg)),
      JudgeBoxError::Config(msg) => f.write_fmt(format_args!("JudgeBox Config Error: {}", msg)),
      JudgeBoxError::Queue(err) => f.write_fmt(format_args!("JudgeBox Queue Error: {}", err)),
      JudgeBoxError::Store(err) => f.write_fmt(format_args!("JudgeBox Store Error: {}", err)),
      JudgeBoxError::Logger(err) => f.write_fmt(format_args!("JudgeBox Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for JudgeBoxError {
  fn from(errno: Errno) -> Self {
    JudgeBoxError::Nix(errno)
  }
}

impl From<std::io::Error> for JudgeBoxError {
  fn from(err: std::io::Error) -> Self {
    JudgeBoxError::Fs(err.to_string())
  }
}

impl From<redis::RedisError> for JudgeBoxError {
  fn from(err: redis::RedisError) -> Self {
    JudgeBoxError::Queue(err)
  }
}

impl From<postgres::Error> for JudgeBoxError {
  fn from(err: postgres::Error) -> Self {
    JudgeBoxError::Store(err)
  }
}

impl From<FlexiLoggerError> for JudgeBoxError {
  fn from(err: FlexiLoggerError) -> Self {
    JudgeBoxError::Logger(err)
  }
}

impl Error for JudgeBoxError {}
