use std::mem::ManuallyDrop;
use std::os::unix::prelude::RawFd;

use nix::{
  errno::Errno,
  fcntl::OFlag,
  unistd::{self, close, pipe2},
};

use crate::error::Result;

/// One pipe of the sandbox stdio plumbing.
///
/// Both ends start close-on-exec; the child re-attaches the end it needs
/// with `dup2` before `execve`, so the judged program only ever sees the
/// three standard descriptors. Every wrapper closes what it owns on drop,
/// construction-failure paths included.
pub(crate) struct SandboxPipe(RawFd, RawFd);

pub(crate) struct PipeReader(RawFd);

pub(crate) struct PipeWriter(RawFd);

impl SandboxPipe {
  pub fn new() -> Result<Self> {
    let result = pipe2(OFlag::O_CLOEXEC)?;
    Ok(SandboxPipe(result.0, result.1))
  }

  pub fn read_fd(&self) -> RawFd {
    self.0
  }

  pub fn write_fd(&self) -> RawFd {
    self.1
  }

  /// Keep the read end (parent side of stdout / stderr).
  pub fn into_reader(self) -> Result<PipeReader> {
    let pipe = ManuallyDrop::new(self);
    close(pipe.1)?;
    Ok(PipeReader(pipe.0))
  }

  /// Keep the write end (parent side of stdin).
  pub fn into_writer(self) -> Result<PipeWriter> {
    let pipe = ManuallyDrop::new(self);
    close(pipe.0)?;
    Ok(PipeWriter(pipe.1))
  }
}

impl Drop for SandboxPipe {
  fn drop(&mut self) {
    let _ = close(self.0);
    let _ = close(self.1);
  }
}

impl PipeReader {
  /// Read until EOF. EOF arrives once every write end is closed, which is
  /// exactly when the child has exited and the parent has dropped its copy.
  pub fn drain(&self) -> Result<Vec<u8>> {
    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
      match unistd::read(self.0, &mut buf) {
        Ok(0) => break,
        Ok(count) => collected.extend_from_slice(&buf[..count]),
        Err(Errno::EINTR) => continue,
        Err(errno) => return Err(errno.into()),
      }
    }
    Ok(collected)
  }
}

impl Drop for PipeReader {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl PipeWriter {
  /// Write the whole buffer. A child that dies before consuming its input
  /// surfaces as EPIPE; the remaining bytes are undeliverable and dropped.
  pub fn write_all(&self, mut bytes: &[u8]) -> Result<()> {
    while !bytes.is_empty() {
      match unistd::write(self.0, bytes) {
        Ok(count) => bytes = &bytes[count..],
        Err(Errno::EINTR) => continue,
        Err(Errno::EPIPE) => break,
        Err(errno) => return Err(errno.into()),
      }
    }
    Ok(())
  }
}

impl Drop for PipeWriter {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}
