//! Entry type detection for compiled sources
//!
//! The compiled language requires the file to be named after its public top-level
//! class. Only declarations outside every brace count, and text inside comments,
//! string literals, text blocks and char literals is skipped.

/// Modifiers that may sit between `public` and `class` (`non-sealed` scans as two words)
const MODIFIERS: &[&str] = &["final", "abstract", "static", "strictfp", "sealed", "non"];

/// Names of public top-level classes, distinct, in order of appearance
pub fn public_top_level_classes(source: &str) -> Vec<String> {
    let words = top_level_words(source);
    let mut names: Vec<String> = Vec::new();
    let mut i = 0;

    while i < words.len() {
        if words[i] == "public" {
            let mut j = i + 1;
            while j < words.len() && MODIFIERS.contains(&words[j].as_str()) {
                j += 1;
            }
            if j + 1 < words.len() && words[j] == "class" {
                let name = &words[j + 1];
                if !names.contains(name) {
                    names.push(name.clone());
                }
                i = j + 2;
                continue;
            }
        }
        i += 1;
    }

    names
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Identifier-like words found at brace depth zero
fn top_level_words(source: &str) -> Vec<String> {
    let chars: Vec<char> = source.chars().collect();
    let mut words = Vec::new();
    let mut depth: usize = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
            }
            '"' if next == Some('"') && chars.get(i + 2) == Some(&'"') => {
                i = skip_text_block(&chars, i + 3);
            }
            '"' | '\'' => {
                i = skip_literal(&chars, i + 1, c);
            }
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            c if is_word_start(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                if depth == 0 {
                    words.push(chars[start..i].iter().collect());
                }
            }
            c if c.is_ascii_digit() => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    words
}

/// Index just past the closing quote of a string or char literal
fn skip_literal(chars: &[char], mut i: usize, quote: char) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '\n' => return i + 1,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    i
}

/// Index just past the closing `"""`
fn skip_text_block(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 2;
        } else if chars[i] == '"' && chars.get(i + 1) == Some(&'"') && chars.get(i + 2) == Some(&'"')
        {
            return i + 3;
        } else {
            i += 1;
        }
    }
    i
}
