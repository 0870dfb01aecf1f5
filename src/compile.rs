use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use lazy_static::lazy_static;
use log::info;
use nix::sys::resource::{setrlimit, Resource};

use crate::error::Result;

/// CPU cap for the compiler itself. The compiler is trusted code, but
/// adversarial source can make it grind; the cap is generous rather than a
/// judging limit.
const COMPILE_CPU_SECONDS: u64 = 10;

struct CompileCommand {
  program: &'static str,
  arguments: Vec<&'static str>,
}

lazy_static! {
  static ref GPP_COMMAND: CompileCommand = CompileCommand {
    program: "g++",
    arguments: vec![
      "${source}",
      "-o",
      "${executable}",
      "-std=c++17",
      "-O2",
      "-fdiagnostics-color=never",
      "-DONLINE_JUDGE",
    ],
  };
}

/// Invoke the system C++ toolchain on `source`, producing `executable`.
///
/// Returns `Ok(true)` iff the compiler exited with status zero. Failing to
/// start the compiler at all is an error, not a compile failure.
pub fn compile(source: &Path, executable: &Path) -> Result<bool> {
  let source = source.to_string_lossy();
  let executable = executable.to_string_lossy();

  let mut command = Command::new(GPP_COMMAND.program);
  for argument in &GPP_COMMAND.arguments {
    match *argument {
      "${source}" => command.arg(source.as_ref()),
      "${executable}" => command.arg(executable.as_ref()),
      argument => command.arg(argument),
    };
  }
  command
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::piped());
  unsafe {
    command.pre_exec(|| {
      setrlimit(Resource::RLIMIT_CPU, COMPILE_CPU_SECONDS, COMPILE_CPU_SECONDS)
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
    });
  }

  let mut child = command.spawn()?;
  let mut diagnostics = String::new();
  if let Some(stderr) = child.stderr.as_mut() {
    stderr.read_to_string(&mut diagnostics)?;
  }
  let status = child.wait()?;

  if status.success() {
    Ok(true)
  } else {
    info!("Compile {} fails: {}", source, diagnostics.trim_end());
    Ok(false)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;

  fn has_gpp() -> bool {
    Command::new("g++")
      .arg("--version")
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()
      .map_or(false, |status| status.success())
  }

  #[test]
  fn compile_ok() -> Result<()> {
    if !has_gpp() {
      return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("ok.cpp");
    let executable = dir.path().join("ok");
    fs::write(&source, "#include <iostream>\nint main(){std::cout<<\"hi\\n\";}\n")?;
    assert!(compile(&source, &executable)?);
    assert!(executable.exists());
    Ok(())
  }

  #[test]
  fn compile_error() -> Result<()> {
    if !has_gpp() {
      return Ok(());
    }
    let dir = tempfile::tempdir()?;
    let source = dir.path().join("bad.cpp");
    let executable = dir.path().join("bad");
    fs::write(&source, "int main(){ syntax error\n")?;
    assert!(!compile(&source, &executable)?);
    Ok(())
  }
}
