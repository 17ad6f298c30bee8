//! Program preparation

/// One sendable line of a program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLine {
    /// 1-based line number in the source text
    pub number: usize,
    /// Trimmed command text
    pub text: String,
}

/// Split program text into sendable lines
///
/// Blank lines and lines that start with a comment are dropped; everything
/// else is trimmed and kept in order.
pub fn prepare_program(text: &str) -> Vec<ProgramLine> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('(') || line == "%" {
                return None;
            }
            Some(ProgramLine {
                number: index + 1,
                text: line.to_string(),
            })
        })
        .collect()
}
