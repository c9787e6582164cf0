use aires_core::domain::{CompilerError, ErrorLocation, Severity};

use crate::ErrorParser;

/// rustc-style two-line diagnostics:
///
/// ```text
/// error[E0308]: mismatched types
///   --> src/main.rs:10:5
/// ```
///
/// The code is optional (`error: message` with no `[CODE]` is still
/// recognized, using the literal string `error`/`warning` as the code).
pub struct RustcRecognizer;

impl ErrorParser for RustcRecognizer {
  fn name(&self) -> &str {
    "rustc"
  }

  fn parse(&self, content: &str) -> Vec<CompilerError> {
    let lines: Vec<&str> = content.lines().collect();
    let mut errors = Vec::new();

    let mut i = 0;
    while i < lines.len() {
      if let Some((severity, code, message)) = parse_header(lines[i]) {
        if let Some(location) = lines.get(i + 1).and_then(|l| parse_location(l)) {
          errors.push(CompilerError {
            code,
            message,
            severity,
            location,
            raw_line: format!("{}\n{}", lines[i], lines[i + 1]),
          });
          i += 2;
          continue;
        }
      }
      i += 1;
    }
    errors
  }
}

fn parse_header(line: &str) -> Option<(Severity, String, String)> {
  let trimmed = line.trim_start();
  let (severity, rest) = if let Some(rest) = trimmed.strip_prefix("error") {
    (Severity::Error, rest)
  } else if let Some(rest) = trimmed.strip_prefix("warning") {
    (Severity::Warning, rest)
  } else {
    return None;
  };

  let (code, rest) = if let Some(bracketed) = rest.strip_prefix('[') {
    let (code, rest) = bracketed.split_once(']')?;
    (code.to_string(), rest)
  } else {
    (severity.as_str().to_string(), rest)
  };

  let message = rest.strip_prefix(": ")?.trim().to_string();
  if message.is_empty() {
    return None;
  }
  Some((severity, code, message))
}

fn parse_location(line: &str) -> Option<ErrorLocation> {
  let trimmed = line.trim_start().strip_prefix("-->")?.trim();
  let mut parts = trimmed.rsplitn(3, ':');
  let column: Option<u32> = parts.next().and_then(|s| s.parse().ok());
  let line_no: u32 = parts.next()?.parse().ok()?;
  let file_path = parts.next()?.to_string();
  Some(ErrorLocation { file_path, line: line_no, column })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_coded_header_and_location() {
    let content = "error[E0308]: mismatched types\n  --> src/main.rs:10:5\n";
    let errors = RustcRecognizer.parse(content);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "E0308");
    assert_eq!(errors[0].location.line, 10);
    assert_eq!(errors[0].location.column, Some(5));
  }

  #[test]
  fn requires_a_location_line_to_match() {
    let errors = RustcRecognizer.parse("error[E0308]: mismatched types\nnote: expected `i32`\n");
    assert!(errors.is_empty());
  }
}
