//! Line protocol for `faceid session`: one command per stdin line.

use faceid_core::controller::Command;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("unknown command '{0}' (expected r, s, v, d or q)")]
    Unknown(String),
    #[error("'{0}' needs an image path")]
    MissingImage(String),
}

/// A parsed session line.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionLine {
    Cycle { command: Command, image: PathBuf },
    Quit,
    /// Blank line or `#` comment.
    Skip,
}

pub fn parse_line(line: &str) -> Result<SessionLine, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(SessionLine::Skip);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "r" | "register" => Command::Register,
        "s" | "search" => Command::Search,
        "v" | "verify" => Command::Verify,
        "d" | "detect" => Command::None,
        "q" | "quit" => return Ok(SessionLine::Quit),
        _ => return Err(ParseError::Unknown(word.to_string())),
    };

    if rest.is_empty() {
        return Err(ParseError::MissingImage(word.to_string()));
    }
    Ok(SessionLine::Cycle {
        command,
        image: PathBuf::from(rest),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(command: Command, image: &str) -> SessionLine {
        SessionLine::Cycle { command, image: PathBuf::from(image) }
    }

    #[test]
    fn test_short_and_long_forms() {
        assert_eq!(parse_line("r a.png"), Ok(cycle(Command::Register, "a.png")));
        assert_eq!(parse_line("register a.png"), Ok(cycle(Command::Register, "a.png")));
        assert_eq!(parse_line("s b.jpg"), Ok(cycle(Command::Search, "b.jpg")));
        assert_eq!(parse_line("VERIFY c.jpg"), Ok(cycle(Command::Verify, "c.jpg")));
        assert_eq!(parse_line("d frame.png"), Ok(cycle(Command::None, "frame.png")));
        assert_eq!(parse_line("q"), Ok(SessionLine::Quit));
        assert_eq!(parse_line("quit"), Ok(SessionLine::Quit));
    }

    #[test]
    fn test_path_with_spaces() {
        assert_eq!(
            parse_line("  s   my photos/face 1.png  "),
            Ok(cycle(Command::Search, "my photos/face 1.png"))
        );
    }

    #[test]
    fn test_skip_and_errors() {
        assert_eq!(parse_line(""), Ok(SessionLine::Skip));
        assert_eq!(parse_line("# comment"), Ok(SessionLine::Skip));
        assert_eq!(parse_line("x a.png"), Err(ParseError::Unknown("x".into())));
        assert_eq!(parse_line("r"), Err(ParseError::MissingImage("r".into())));
    }
}
