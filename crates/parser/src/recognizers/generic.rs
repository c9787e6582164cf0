use aires_core::domain::{CompilerError, ErrorLocation};

use super::{looks_like_error_code, normalize_severity};
use crate::ErrorParser;

/// `file:line:col: severity: message`, with no error code of its own — the
/// fallback recognizer when nothing more specific matches. The code is
/// synthesized from the severity since `CompilerError::code` is non-optional.
pub struct GenericRecognizer;

impl ErrorParser for GenericRecognizer {
  fn name(&self) -> &str {
    "generic"
  }

  fn parse(&self, content: &str) -> Vec<CompilerError> {
    content.lines().filter_map(parse_line).collect()
  }
}

fn parse_line(line: &str) -> Option<CompilerError> {
  let mut parts = line.splitn(4, ':');
  let file_path = parts.next()?.trim();
  if file_path.is_empty() || file_path.len() == 1 {
    // guards against "C:\path..." being split on the drive-letter colon
    return None;
  }
  let line_no: u32 = parts.next()?.trim().parse().ok()?;

  let rest = parts.next()?;
  let (column, severity_and_message) = if let Ok(col) = rest.trim().parse::<u32>() {
    (Some(col), parts.next()?)
  } else {
    (None, rest)
  };

  let mut sev_split = severity_and_message.trim().splitn(2, ' ');
  let severity_token = sev_split.next()?.trim_end_matches(':');
  let severity = normalize_severity(severity_token)?;
  let rest = sev_split.next().unwrap_or("").trim();
  if rest.is_empty() {
    return None;
  }

  // `CODE: message`, e.g. "CS0246: 'Foo' not found" — a code token has no
  // spaces and at least one digit, distinguishing it from plain prose.
  let (code, message) = match rest.split_once(':') {
    Some((candidate, remainder)) if looks_like_error_code(candidate.trim()) => {
      (candidate.trim().to_string(), remainder.trim().to_string())
    }
    _ => (format!("GENERIC_{}", severity.as_str().to_uppercase()), rest.to_string()),
  };
  if message.is_empty() {
    return None;
  }

  Some(CompilerError {
    code,
    message,
    severity,
    location: ErrorLocation { file_path: file_path.to_string(), line: line_no, column },
    raw_line: line.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_file_line_col_severity_message() {
    let errors = GenericRecognizer.parse("main.c:10:5: error: something broke");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].location.line, 10);
    assert_eq!(errors[0].location.column, Some(5));
  }

  #[test]
  fn parses_embedded_error_code() {
    let errors = GenericRecognizer.parse("main.c:10:5: error: CS0246: 'Foo' not found");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "CS0246");
    assert_eq!(errors[0].message, "'Foo' not found");
  }

  #[test]
  fn ignores_unrelated_lines() {
    let errors = GenericRecognizer.parse("Compiling foo v0.1.0\nBuild finished");
    assert!(errors.is_empty());
  }
}
