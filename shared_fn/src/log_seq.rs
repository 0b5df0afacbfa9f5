/// Checks that every entry of `seq` is contained in some line of `lines`,
/// in that order. Lines may appear in between.
///
/// On failure the error names the first entry that could not be found.
pub fn log_contains_seq<S: AsRef<str>>(lines: &[S], seq: &[&str]) -> Result<(), String> {
  let mut remaining = lines.iter();
  for want in seq {
    if !remaining.any(|line| line.as_ref().contains(want)) {
      return Err(format!(
        "log does not contain '{}' in the expected order; full log:\n{}",
        want,
        lines.iter().map(|l| l.as_ref()).collect::<Vec<_>>().join("\n"),
      ));
    }
  }
  Ok(())
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn subsequence_in_order() {
    let lines = ["a one", "noise", "b two", "c three"];
    assert!(log_contains_seq(&lines, &["one", "three"]).is_ok());
    assert!(log_contains_seq(&lines, &[]).is_ok());
  }

  #[test]
  fn wrong_order_or_missing() {
    let lines = ["a one", "b two"];
    let err = log_contains_seq(&lines, &["two", "one"]).unwrap_err();
    assert!(err.starts_with("log does not contain 'one'"));
    assert!(log_contains_seq(&lines, &["zero"]).is_err());
  }
}
