use std::fmt::{self, Display};

use crate::sandbox::SandboxResult;

/// Final classification of a submission, rendered to the literal strings
/// the store expects via `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
  Accepted,
  WrongAnswer,
  CompilationError,
  TimeLimitExceeded,
  MemoryLimitExceeded,
  RuntimeError,
  JudgeError(String),
}

impl Verdict {
  pub fn judge_error<MS: Into<String>>(detail: MS) -> Verdict {
    Verdict::JudgeError(detail.into())
  }

  pub fn is_accepted(&self) -> bool {
    matches!(self, Verdict::Accepted)
  }
}

impl Display for Verdict {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Verdict::Accepted => f.write_str("Accepted"),
      Verdict::WrongAnswer => f.write_str("Wrong Answer"),
      Verdict::CompilationError => f.write_str("Compilation Error"),
      Verdict::TimeLimitExceeded => f.write_str("Time Limit Exceeded"),
      Verdict::MemoryLimitExceeded => f.write_str("Memory Limit Exceeded"),
      Verdict::RuntimeError => f.write_str("Runtime Error"),
      Verdict::JudgeError(detail) => f.write_fmt(format_args!("Judge Error: {}", detail)),
    }
  }
}

/// Map one sandbox run against the expected output.
///
/// Precedence mirrors the severity order: a timed-out run is a TLE even if
/// it also crashed, and a memory kill outranks a generic runtime error.
pub fn classify(result: &SandboxResult, expected: &str) -> Verdict {
  if result.timeout {
    return Verdict::TimeLimitExceeded;
  }
  if result.memory_exceeded {
    return Verdict::MemoryLimitExceeded;
  }
  if result.signal_killed || result.exit_code.map_or(false, |code| code != 0) {
    return Verdict::RuntimeError;
  }
  if rtrim(&result.stdout) == rtrim(expected) {
    Verdict::Accepted
  } else {
    Verdict::WrongAnswer
  }
}

/// Strip trailing ASCII whitespace only. Interior lines are compared as-is.
fn rtrim(text: &str) -> &str {
  text.trim_end_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exited(code: i32, stdout: &str) -> SandboxResult {
    SandboxResult {
      exit_code: Some(code),
      stdout: stdout.to_string(),
      ..SandboxResult::default()
    }
  }

  #[test]
  fn classify_accepted() {
    assert_eq!(classify(&exited(0, "15\n"), "15\n"), Verdict::Accepted);
  }

  #[test]
  fn classify_trailing_whitespace_is_insignificant() {
    assert_eq!(classify(&exited(0, "15"), "15 \t\r\n"), Verdict::Accepted);
    assert_eq!(classify(&exited(0, "15\n\n"), "15"), Verdict::Accepted);
  }

  #[test]
  fn classify_interior_whitespace_is_significant() {
    assert_eq!(classify(&exited(0, "1 \n2"), "1\n2"), Verdict::WrongAnswer);
    assert_eq!(classify(&exited(0, " 15"), "15"), Verdict::WrongAnswer);
  }

  #[test]
  fn classify_wrong_answer() {
    assert_eq!(classify(&exited(0, "-5\n"), "15\n"), Verdict::WrongAnswer);
  }

  #[test]
  fn classify_nonzero_exit_is_runtime_error() {
    assert_eq!(classify(&exited(42, "15\n"), "15\n"), Verdict::RuntimeError);
  }

  #[test]
  fn classify_signal_is_runtime_error() {
    let result = SandboxResult {
      signal: Some(11),
      signal_killed: true,
      ..SandboxResult::default()
    };
    assert_eq!(classify(&result, ""), Verdict::RuntimeError);
  }

  #[test]
  fn classify_timeout_outranks_signal() {
    let result = SandboxResult {
      signal: Some(24),
      signal_killed: true,
      timeout: true,
      ..SandboxResult::default()
    };
    assert_eq!(classify(&result, ""), Verdict::TimeLimitExceeded);
  }

  #[test]
  fn classify_memory_outranks_runtime_error() {
    let result = SandboxResult {
      signal: Some(6),
      signal_killed: true,
      memory_exceeded: true,
      ..SandboxResult::default()
    };
    assert_eq!(classify(&result, ""), Verdict::MemoryLimitExceeded);
  }

  #[test]
  fn verdict_store_strings() {
    assert_eq!(Verdict::Accepted.to_string(), "Accepted");
    assert_eq!(Verdict::WrongAnswer.to_string(), "Wrong Answer");
    assert_eq!(Verdict::CompilationError.to_string(), "Compilation Error");
    assert_eq!(Verdict::TimeLimitExceeded.to_string(), "Time Limit Exceeded");
    assert_eq!(Verdict::MemoryLimitExceeded.to_string(), "Memory Limit Exceeded");
    assert_eq!(Verdict::RuntimeError.to_string(), "Runtime Error");
    assert_eq!(
      Verdict::judge_error("No test cases").to_string(),
      "Judge Error: No test cases"
    );
  }
}
