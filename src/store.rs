use log::info;
use postgres::{Client, NoTls};

use crate::error::Result;
use crate::verdict::Verdict;

/// One problem input paired with its expected output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
  pub input: String,
  pub expected: String,
}

/// Long-lived connection to the relational store. The worker owns exactly
/// one for its lifetime; subsystems borrow it and never release it.
pub struct Store {
  client: Client,
}

impl Store {
  pub fn connect(database_url: &str) -> Result<Store> {
    let client = Client::connect(database_url, NoTls)?;
    info!("Connected to the submission store");
    Ok(Store { client })
  }

  /// Source text of a submission, or `None` when the row is missing.
  pub fn fetch_source(&mut self, submission_id: i32) -> Result<Option<String>> {
    let row = self.client.query_opt(
      "SELECT source_code FROM submissions WHERE id = $1",
      &[&submission_id],
    )?;
    Ok(row.map(|row| row.get(0)))
  }

  pub fn fetch_problem_id(&mut self, submission_id: i32) -> Result<Option<i32>> {
    let row = self.client.query_opt(
      "SELECT problem_id FROM submissions WHERE id = $1",
      &[&submission_id],
    )?;
    Ok(row.map(|row| row.get(0)))
  }

  /// All test cases of a problem, in insertion order (numeric id breaks
  /// ties). Fetched up front; judging never re-queries mid-run.
  pub fn fetch_test_cases(&mut self, problem_id: i32) -> Result<Vec<TestCase>> {
    let rows = self.client.query(
      "SELECT input, output FROM test_cases WHERE problem_id = $1 ORDER BY id",
      &[&problem_id],
    )?;
    Ok(
      rows
        .into_iter()
        .map(|row| TestCase {
          input: row.get(0),
          expected: row.get(1),
        })
        .collect(),
    )
  }

  pub fn update_verdict(&mut self, submission_id: i32, verdict: &Verdict) -> Result<()> {
    self.client.execute(
      "UPDATE submissions SET verdict = $1, judged_at = NOW() WHERE id = $2",
      &[&verdict.to_string(), &submission_id],
    )?;
    Ok(())
  }
}
