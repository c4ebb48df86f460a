//! GRBL Protocol Utilities
//!
//! Outbound line preparation and inbound message splitting.

/// Remove `;` trailing comments and `( ... )` inline comments
pub fn strip_comments(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut depth = 0usize;
    for ch in line.chars() {
        match ch {
            ';' if depth == 0 => break,
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Blank lines, comment-only lines and `%` program markers carry nothing to transmit
pub fn is_comment_or_blank(line: &str) -> bool {
    line.trim() == "%" || strip_comments(line).is_empty()
}

/// The text to put on the wire for a program line, or `None` to skip it
pub fn prepare_line(line: &str) -> Option<String> {
    if line.trim() == "%" {
        return None;
    }
    let stripped = strip_comments(line);
    if stripped.is_empty() {
        None
    } else {
        Some(stripped)
    }
}

/// Split an inbound message into its non-empty lines
pub fn split_lines(message: &str) -> impl Iterator<Item = &str> {
    message
        .split('\n')
        .map(|line| line.trim_end_matches('\r').trim())
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("G1 X10 ; move"), "G1 X10");
        assert_eq!(strip_comments("G0 (rapid) X5 Y5"), "G0  X5 Y5");
        assert_eq!(strip_comments("(Dip #1 at X0 Y0)"), "");
        assert_eq!(strip_comments("  M3  "), "M3");
    }

    #[test]
    fn test_comment_or_blank() {
        assert!(is_comment_or_blank(""));
        assert!(is_comment_or_blank("%"));
        assert!(is_comment_or_blank("; note"));
        assert!(is_comment_or_blank("(Tool 2)"));
        assert!(!is_comment_or_blank("G21"));
    }

    #[test]
    fn test_prepare_line() {
        assert_eq!(prepare_line("G1 X1 (draw)"), Some("G1 X1".to_string()));
        assert_eq!(prepare_line(" % "), None);
        assert_eq!(prepare_line("   "), None);
    }

    #[test]
    fn test_split_lines() {
        let lines: Vec<&str> = split_lines("ok\r\n<Idle|MPos:0,0,0>\n\nok").collect();
        assert_eq!(lines, vec!["ok", "<Idle|MPos:0,0,0>", "ok"]);
    }
}
