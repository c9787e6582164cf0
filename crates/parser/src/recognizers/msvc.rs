use aires_core::domain::{CompilerError, ErrorLocation};

use super::normalize_severity;
use crate::ErrorParser;

/// MSVC/MSBuild-style diagnostics: `file(line,col): error CODE: message` or
/// `file(line): error CODE: message` without a column.
pub struct MsvcRecognizer;

impl ErrorParser for MsvcRecognizer {
  fn name(&self) -> &str {
    "msvc"
  }

  fn parse(&self, content: &str) -> Vec<CompilerError> {
    content.lines().filter_map(parse_line).collect()
  }
}

fn parse_line(line: &str) -> Option<CompilerError> {
  let open = line.find('(')?;
  let close = line[open..].find(')').map(|p| p + open)?;
  let file_path = line[..open].trim();
  if file_path.is_empty() {
    return None;
  }

  let location_text = &line[open + 1..close];
  let (line_no, column) = match location_text.split_once(',') {
    Some((l, c)) => (l.trim().parse().ok()?, c.trim().parse().ok()),
    None => (location_text.trim().parse().ok()?, None),
  };

  let rest = line[close + 1..].trim().strip_prefix(':')?.trim();
  let mut tokens = rest.splitn(3, ' ');
  let severity = normalize_severity(tokens.next()?)?;
  let code = tokens.next()?.trim_end_matches(':').to_string();
  let message = tokens.next().unwrap_or("").trim().to_string();
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
  fn parses_msvc_style_with_column() {
    let errors = MsvcRecognizer.parse("main.cpp(42,10): error C2065: 'foo': undeclared identifier");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "C2065");
    assert_eq!(errors[0].location.line, 42);
    assert_eq!(errors[0].location.column, Some(10));
  }

  #[test]
  fn parses_msvc_style_without_column() {
    let errors = MsvcRecognizer.parse("main.cpp(42): warning C4101: unreferenced local variable");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].location.column, None);
  }
}
