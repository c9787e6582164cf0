use aires_core::domain::{CompilerError, ErrorLocation};

use super::{looks_like_error_code, normalize_severity};
use crate::ErrorParser;

/// GCC/Clang-style diagnostics: `file:line:col: severity: message [-Wflag]`.
/// Distinct from `GenericRecognizer` in that it recognizes and strips a
/// trailing `[-Wflag]` tag, folding it into the error code rather than
/// leaving it attached to the message text. Falls back to the same
/// embedded-error-code sniffing `GenericRecognizer` does (e.g. a compiler
/// that reports another tool's code, `"error: CS0246: 'Foo' not found"`)
/// before synthesizing a code from the severity.
pub struct GccRecognizer;

impl ErrorParser for GccRecognizer {
  fn name(&self) -> &str {
    "gcc"
  }

  fn parse(&self, content: &str) -> Vec<CompilerError> {
    content.lines().filter_map(parse_line).collect()
  }
}

fn parse_line(line: &str) -> Option<CompilerError> {
  let mut parts = line.splitn(4, ':');
  let file_path = parts.next()?.trim();
  if file_path.is_empty() || file_path.len() == 1 {
    return None;
  }
  let line_no: u32 = parts.next()?.trim().parse().ok()?;
  let column: u32 = parts.next()?.trim().parse().ok()?;

  let rest = parts.next()?.trim();
  let mut sev_split = rest.splitn(2, ' ');
  let severity_token = sev_split.next()?.trim_end_matches(':');
  let severity = normalize_severity(severity_token)?;
  let rest = sev_split.next().unwrap_or("").trim();
  if rest.is_empty() {
    return None;
  }

  let (rest, flag) = match rest.rfind("[-W") {
    Some(start) if rest.ends_with(']') => (rest[..start].trim(), Some(rest[start + 1..rest.len() - 1].to_string())),
    _ => (rest, None),
  };

  let (code, message) = match flag {
    Some(flag) => (flag, rest.to_string()),
    None => match rest.split_once(':') {
      Some((candidate, remainder)) if looks_like_error_code(candidate.trim()) => {
        (candidate.trim().to_string(), remainder.trim().to_string())
      }
      _ => (format!("GCC_{}", severity.as_str().to_uppercase()), rest.to_string()),
    },
  };
  if message.is_empty() {
    return None;
  }

  Some(CompilerError {
    code,
    message,
    severity,
    location: ErrorLocation { file_path: file_path.to_string(), line: line_no, column: Some(column) },
    raw_line: line.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_warning_flag_as_code() {
    let errors = GccRecognizer.parse("foo.c:12:3: warning: unused variable 'x' [-Wunused-variable]");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "-Wunused-variable");
    assert_eq!(errors[0].message, "unused variable 'x'");
  }

  #[test]
  fn parses_error_without_flag() {
    let errors = GccRecognizer.parse("foo.c:12:3: error: expected ';' before '}' token");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "GCC_ERROR");
  }

  #[test]
  fn parses_embedded_error_code_before_synthesizing_one() {
    let errors = GccRecognizer.parse("main.c:10:5: error: CS0246: 'Foo' not found");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "CS0246");
    assert_eq!(errors[0].message, "'Foo' not found");
  }
}
