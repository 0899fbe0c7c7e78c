//! Statement splitting for SQL scripts
//!
//! Semicolons inside quoted text, quoted identifiers and comments do not end a
//! statement. Comments are dropped from the returned statements.

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    /// Inside a quote, waiting for the closing char
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Split a script into trimmed, non-empty statements without their terminators
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = State::Code;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                ';' => push_statement(&mut statements, &mut current),
                '\'' | '"' | '`' => {
                    state = State::Quoted(c);
                    current.push(c);
                }
                '[' => {
                    state = State::Quoted(']');
                    current.push(c);
                }
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                _ => current.push(c),
            },
            // doubled quotes ('it''s') close and reopen, which keeps them intact
            State::Quoted(close) => {
                current.push(c);
                if c == close {
                    state = State::Code;
                }
            }
            State::LineComment => {
                if c == '\n' {
                    current.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    current.push(' ');
                    state = State::Code;
                }
            }
        }
    }
    push_statement(&mut statements, &mut current);

    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Whether the first statement of `script` starts with `keyword` (case-insensitive)
pub fn starts_with_keyword(script: &str, keyword: &str) -> bool {
    let statements = split_statements(script);
    let Some(first) = statements.first() else {
        return false;
    };

    let word: String = first
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    word.eq_ignore_ascii_case(keyword)
}
