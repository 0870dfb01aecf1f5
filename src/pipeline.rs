use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::compile;
use crate::error::Result;
use crate::sandbox::{Sandbox, SandboxConfig};
use crate::store::Store;
use crate::verdict::{classify, Verdict};

/// Per-submission files under the work directory. Removal is tied to scope
/// exit, so no verdict path (including panics) can leave them behind.
pub struct WorkPaths {
  source: PathBuf,
  executable: PathBuf,
}

impl WorkPaths {
  pub fn new(workdir: &Path, submission_id: i32) -> Self {
    WorkPaths {
      source: workdir.join(format!("{}.cpp", submission_id)),
      executable: workdir.join(submission_id.to_string()),
    }
  }

  pub fn source(&self) -> &Path {
    &self.source
  }

  pub fn executable(&self) -> &Path {
    &self.executable
  }
}

impl Drop for WorkPaths {
  fn drop(&mut self) {
    for path in [&self.source, &self.executable] {
      match fs::remove_file(path) {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Fails removing {}: {}", path.display(), err),
      }
    }
  }
}

/// Drives one submission through fetch, compile, judge and persist.
pub struct Pipeline {
  workdir: PathBuf,
  sandbox: Sandbox,
}

impl Pipeline {
  pub fn new(workdir: PathBuf, config: SandboxConfig) -> Self {
    Pipeline {
      workdir,
      sandbox: Sandbox::new(config),
    }
  }

  /// Judge `submission_id` and persist exactly one verdict.
  ///
  /// Every step short-circuits into a persisted verdict; only store
  /// transport failures propagate as errors, in which case the submission's
  /// verdict row is left untouched for the supervisor to retry.
  pub fn process(&self, store: &mut Store, submission_id: i32) -> Result<Verdict> {
    if fs::create_dir_all(&self.workdir).is_err() {
      return self.finish(store, submission_id, Verdict::judge_error("Storage unavailable"));
    }

    let paths = WorkPaths::new(&self.workdir, submission_id);

    let source = match store.fetch_source(submission_id)? {
      Some(source) => source,
      None => return self.finish(store, submission_id, Verdict::judge_error("Source not found")),
    };
    if fs::write(paths.source(), source).is_err() {
      return self.finish(store, submission_id, Verdict::judge_error("Write failure"));
    }

    match compile::compile(paths.source(), paths.executable()) {
      Ok(true) => {}
      Ok(false) => return self.finish(store, submission_id, Verdict::CompilationError),
      Err(err) => {
        warn!("Compiler unavailable: {}", err);
        return self.finish(store, submission_id, Verdict::judge_error("Compiler unavailable"));
      }
    }

    let problem_id = match store.fetch_problem_id(submission_id)? {
      Some(problem_id) => problem_id,
      None => return self.finish(store, submission_id, Verdict::judge_error("Problem not found")),
    };

    let test_cases = store.fetch_test_cases(problem_id)?;
    if test_cases.is_empty() {
      return self.finish(store, submission_id, Verdict::judge_error("No test cases"));
    }

    let mut verdict = Verdict::Accepted;
    for test_case in &test_cases {
      let result = self.sandbox.execute(paths.executable(), &test_case.input);
      if result.is_construction_failure() {
        verdict = Verdict::judge_error("Sandbox failure");
        break;
      }
      let case_verdict = classify(&result, &test_case.expected);
      if !case_verdict.is_accepted() {
        verdict = case_verdict;
        break;
      }
    }

    self.finish(store, submission_id, verdict)
  }

  fn finish(&self, store: &mut Store, submission_id: i32, verdict: Verdict) -> Result<Verdict> {
    store.update_verdict(submission_id, &verdict)?;
    info!("Verdict for {}: {}", submission_id, verdict);
    Ok(verdict)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn work_paths_follow_submission_id() {
    let paths = WorkPaths::new(Path::new("/work"), 42);
    assert_eq!(paths.source(), Path::new("/work/42.cpp"));
    assert_eq!(paths.executable(), Path::new("/work/42"));
  }

  #[test]
  fn work_paths_are_removed_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let paths = WorkPaths::new(dir.path(), 7);
    fs::write(paths.source(), "int main(){}").unwrap();
    fs::write(paths.executable(), "\x7fELF").unwrap();

    let source = paths.source().to_path_buf();
    let executable = paths.executable().to_path_buf();
    drop(paths);

    assert!(!source.exists());
    assert!(!executable.exists());
  }

  #[test]
  fn work_paths_drop_tolerates_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let paths = WorkPaths::new(dir.path(), 9);
    drop(paths);
  }
}
