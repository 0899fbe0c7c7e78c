/// Compare produced lines with expected output.
///
/// Trailing whitespace is trimmed from each line and trailing empty lines are
/// ignored. Line order matters.
pub fn compare_lines<'a>(actual: impl IntoIterator<Item = &'a str>, expected: &str) -> bool {
    let actual_lines = trim_trailing(actual.into_iter().map(|line| line.trim_end()).collect());
    let expected_lines = trim_trailing(expected.lines().map(|line| line.trim_end()).collect());

    actual_lines == expected_lines
}

/// Compare program output with expected output
pub fn compare_output(actual: &str, expected: &str) -> bool {
    compare_lines(actual.lines(), expected)
}

fn trim_trailing(mut lines: Vec<&str>) -> Vec<&str> {
    while lines.last().map(|s| s.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_output_ignores_trailing_whitespace() {
        assert!(compare_output("8  \n0\n\n", "8\n0"));
        assert!(compare_output("8\r\n0\r\n", "8\n0\n"));
    }

    #[test]
    fn test_compare_output_is_order_sensitive() {
        assert!(!compare_output("0\n8", "8\n0"));
    }

    #[test]
    fn test_compare_output_keeps_leading_whitespace() {
        assert!(!compare_output(" 8", "8"));
    }

    #[test]
    fn test_compare_lines() {
        let rows = vec!["8".to_string(), "0".to_string()];
        assert!(compare_lines(rows.iter().map(String::as_str), "8\n0"));
        assert!(!compare_lines(rows.iter().map(String::as_str), "8\n1"));
        assert!(!compare_lines(rows.iter().map(String::as_str), "8"));
    }
}
