use judgebox::{classify, Sandbox, Verdict};
use tempfile::tempdir;

mod common;

const SUM_SOURCE: &str = r#"
#include <iostream>
int main() { int a, b; std::cin >> a >> b; std::cout << a + b << "\n"; }
"#;

const DIFFERENCE_SOURCE: &str = r#"
#include <iostream>
int main() { int a, b; std::cin >> a >> b; std::cout << a - b << "\n"; }
"#;

#[test]
fn sum_program_is_accepted_on_every_case() {
  common::setup();
  if !common::sandbox_available() {
    eprintln!("skipping: sandbox not available in this environment");
    return;
  }

  let dir = tempdir().unwrap();
  let executable = common::compile_fixture(dir.path(), "sum", SUM_SOURCE);
  let sandbox = Sandbox::new(common::restricted_config());

  for (input, expected) in [("5 10\n", "15\n"), ("1 2", "3")] {
    let result = sandbox.execute(&executable, input);
    assert_eq!(classify(&result, expected), Verdict::Accepted);
  }
}

#[test]
fn difference_program_is_wrong_answer_on_the_first_case() {
  common::setup();
  if !common::sandbox_available() {
    eprintln!("skipping: sandbox not available in this environment");
    return;
  }

  let dir = tempdir().unwrap();
  let executable = common::compile_fixture(dir.path(), "diff", DIFFERENCE_SOURCE);
  let sandbox = Sandbox::new(common::restricted_config());

  let result = sandbox.execute(&executable, "5 10\n");
  assert_eq!(result.stdout, "-5\n");
  assert_eq!(classify(&result, "15\n"), Verdict::WrongAnswer);
}

#[test]
fn spinning_program_is_time_limit_exceeded() {
  common::setup();
  if !common::sandbox_available() {
    eprintln!("skipping: sandbox not available in this environment");
    return;
  }

  let dir = tempdir().unwrap();
  let executable = common::compile_fixture(dir.path(), "spin", "int main() { for (;;) {} }\n");

  let mut config = common::restricted_config();
  config.time_limit(1);
  let sandbox = Sandbox::new(config);

  let result = sandbox.execute(&executable, "");
  assert_eq!(classify(&result, ""), Verdict::TimeLimitExceeded);
}

#[test]
fn allocating_program_is_memory_limit_exceeded() {
  common::setup();
  if !common::sandbox_available() {
    eprintln!("skipping: sandbox not available in this environment");
    return;
  }

  let dir = tempdir().unwrap();
  let executable = common::compile_fixture(
    dir.path(),
    "alloc",
    r#"
#include <cstring>
#include <vector>
int main() {
  std::vector<char *> blocks;
  for (;;) {
    char *block = new char[64 * 1024 * 1024];
    memset(block, 1, 64 * 1024 * 1024);
    blocks.push_back(block);
  }
}
"#,
  );

  let sandbox = Sandbox::new(common::restricted_config());
  let result = sandbox.execute(&executable, "");
  assert_eq!(classify(&result, ""), Verdict::MemoryLimitExceeded);
}
