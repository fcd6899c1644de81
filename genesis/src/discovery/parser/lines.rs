//! Physical source -> indented logical lines -> statement blocks.
//!
//! Handles the parts of the layout the grammar cannot: comments, backslash and
//! bracket continuation, string literals spanning lines, semicolon-separated
//! statements, inline suites (`class A(B): pass`) and indentation.

use super::SyntaxError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Indentation width (tabs advance to the next multiple of 8)
    pub indent: usize,
    pub text: String,
    /// 1-based line where the statement starts
    pub line: usize,
}

/// A statement together with its indented suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub text: String,
    pub line: usize,
    pub children: Vec<Block>,
}

#[derive(Clone, Copy)]
struct StringState {
    quote: char,
    triple: bool,
    start_line: usize,
}

/// Split source text into logical lines. Blank and comment-only lines are dropped.
pub fn logical_lines(source: &str) -> Result<Vec<LogicalLine>, SyntaxError> {
    let chars: Vec<char> = source.chars().collect();
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_indent = 0usize;
    let mut current_start = 1usize;
    let mut at_line_start = true;
    let mut line_no = 1usize;
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut string: Option<StringState> = None;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];

        if at_line_start && string.is_none() && brackets.is_empty() {
            let mut width = 0usize;
            while i < chars.len() && matches!(chars[i], ' ' | '\t' | '\x0C') {
                width = if chars[i] == '\t' { (width / 8 + 1) * 8 } else { width + 1 };
                i += 1;
            }
            current_indent = width;
            current_start = line_no;
            at_line_start = false;
            continue;
        }

        if let Some(state) = string {
            match c {
                '\\' => {
                    current.push(c);
                    if let Some(&next) = chars.get(i + 1) {
                        current.push(next);
                        if next == '\n' {
                            line_no += 1;
                        }
                    }
                    i += 2;
                    continue;
                }
                '\n' if !state.triple => {
                    return Err(SyntaxError::new(
                        state.start_line,
                        "unterminated string literal",
                    ));
                }
                '\n' => {
                    current.push(c);
                    line_no += 1;
                }
                q if q == state.quote => {
                    if state.triple {
                        if chars.get(i + 1) == Some(&q) && chars.get(i + 2) == Some(&q) {
                            current.push_str(&q.to_string().repeat(3));
                            string = None;
                            i += 3;
                            continue;
                        }
                        current.push(c);
                    } else {
                        current.push(c);
                        string = None;
                    }
                }
                _ => current.push(c),
            }
            i += 1;
            continue;
        }

        match c {
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '\\' if chars.get(i + 1) == Some(&'\n') => {
                current.push(' ');
                line_no += 1;
                i += 2;
                continue;
            }
            '\\' if chars.get(i + 1) == Some(&'\r') && chars.get(i + 2) == Some(&'\n') => {
                current.push(' ');
                line_no += 1;
                i += 3;
                continue;
            }
            '"' | '\'' => {
                let triple = chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c);
                string = Some(StringState {
                    quote: c,
                    triple,
                    start_line: line_no,
                });
                if triple {
                    current.push_str(&c.to_string().repeat(3));
                    i += 3;
                    continue;
                }
                current.push(c);
            }
            '(' | '[' | '{' => {
                brackets.push((c, line_no));
                current.push(c);
            }
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match brackets.pop() {
                    Some((open, _)) if open == expected => current.push(c),
                    Some((open, open_line)) => {
                        return Err(SyntaxError::new(
                            line_no,
                            format!(
                                "closing '{}' does not match '{}' opened on line {}",
                                c, open, open_line
                            ),
                        ));
                    }
                    None => {
                        return Err(SyntaxError::new(line_no, format!("unmatched '{}'", c)));
                    }
                }
            }
            '\n' => {
                line_no += 1;
                if brackets.is_empty() {
                    flush(&mut lines, &mut current, current_indent, current_start);
                    at_line_start = true;
                } else {
                    current.push('\n');
                }
            }
            '\r' => {}
            _ => current.push(c),
        }
        i += 1;
    }

    if let Some(state) = string {
        return Err(SyntaxError::new(
            state.start_line,
            "unterminated string literal",
        ));
    }
    if let Some((open, open_line)) = brackets.last() {
        return Err(SyntaxError::new(
            *open_line,
            format!("'{}' was never closed", open),
        ));
    }
    flush(&mut lines, &mut current, current_indent, current_start);
    Ok(lines)
}

fn flush(lines: &mut Vec<LogicalLine>, current: &mut String, indent: usize, line: usize) {
    let text = current.trim();
    if !text.is_empty() {
        lines.push(LogicalLine {
            indent,
            text: text.to_string(),
            line,
        });
    }
    current.clear();
}

/// Byte offsets and characters that sit outside strings and brackets.
pub fn top_level_chars(text: &str) -> Vec<(usize, char)> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<(char, bool)> = None;
    let mut iter = text.char_indices().peekable();

    while let Some((idx, c)) = iter.next() {
        if let Some((q, triple)) = quote {
            if c == '\\' {
                iter.next();
            } else if c == q {
                if triple {
                    if text[idx..].starts_with(&q.to_string().repeat(3)) {
                        iter.next();
                        iter.next();
                        quote = None;
                    }
                } else {
                    quote = None;
                }
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                let triple = text[idx..].starts_with(&c.to_string().repeat(3));
                if triple {
                    iter.next();
                    iter.next();
                }
                quote = Some((c, triple));
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push((idx, c)),
            _ => {}
        }
    }
    out
}

/// Split at every top-level occurrence of `sep`.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0usize;
    for (idx, c) in top_level_chars(text) {
        if c == sep {
            parts.push(&text[start..idx]);
            start = idx + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Offsets of top-level `=` that are plain assignment (not `==`, `+=`, `:=` ...).
pub fn assignment_offsets(text: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    top_level_chars(text)
        .into_iter()
        .filter(|(idx, c)| {
            if *c != '=' {
                return false;
            }
            let prev = if *idx > 0 { bytes[idx - 1] } else { b' ' };
            let next = bytes.get(idx + 1).copied().unwrap_or(b' ');
            !b"=<>!+-*/%&|^@:~".contains(&prev) && next != b'='
        })
        .map(|(idx, _)| idx)
        .collect()
}

const COMPOUND_KEYWORDS: &[&str] = &[
    "class", "def", "async", "if", "elif", "else", "for", "while", "try", "except", "finally",
    "with",
];

pub fn first_word(text: &str) -> &str {
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

fn is_compound(text: &str) -> bool {
    let word = first_word(text);
    if COMPOUND_KEYWORDS.contains(&word) {
        return true;
    }
    // `match`/`case` are soft keywords; only treat them as headers when no
    // assignment is involved.
    (word == "match" || word == "case")
        && text.len() > word.len()
        && assignment_offsets(text).is_empty()
        && top_level_chars(text).iter().any(|(_, c)| *c == ':')
}

/// Split a compound header at its terminating colon.
fn split_header(text: &str, line: usize) -> Result<(String, Option<String>), SyntaxError> {
    let colon = top_level_chars(text)
        .into_iter()
        .find(|(_, c)| *c == ':')
        .map(|(idx, _)| idx);
    match colon {
        Some(idx) => {
            let head = text[..idx].trim().to_string();
            let rest = text[idx + 1..].trim();
            Ok((head, (!rest.is_empty()).then(|| rest.to_string())))
        }
        None => Err(SyntaxError::new(
            line,
            format!("expected ':' after '{}' header", first_word(text)),
        )),
    }
}

/// Build the statement tree from logical lines.
pub fn build_blocks(lines: &[LogicalLine]) -> Result<Vec<Block>, SyntaxError> {
    let mut pos = 0usize;
    let base = lines.first().map(|l| l.indent).unwrap_or(0);
    if base != 0 {
        return Err(SyntaxError::new(lines[0].line, "unexpected indent"));
    }
    let blocks = parse_suite(lines, &mut pos, 0)?;
    if pos < lines.len() {
        return Err(SyntaxError::new(
            lines[pos].line,
            "unindent does not match any outer indentation level",
        ));
    }
    Ok(blocks)
}

fn parse_suite(
    lines: &[LogicalLine],
    pos: &mut usize,
    indent: usize,
) -> Result<Vec<Block>, SyntaxError> {
    let mut blocks = Vec::new();
    while *pos < lines.len() {
        let current = &lines[*pos];
        if current.indent < indent {
            break;
        }
        if current.indent > indent {
            let dedent_mismatch = *pos > 0 && lines[*pos - 1].indent > current.indent;
            let message = if dedent_mismatch {
                "unindent does not match any outer indentation level"
            } else {
                "unexpected indent"
            };
            return Err(SyntaxError::new(current.line, message));
        }
        *pos += 1;

        for statement in split_top_level(&current.text, ';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            if is_compound(statement) {
                let (head, inline) = split_header(statement, current.line)?;
                let children = match inline {
                    Some(body) => split_top_level(&body, ';')
                        .into_iter()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| Block {
                            text: s.to_string(),
                            line: current.line,
                            children: Vec::new(),
                        })
                        .collect(),
                    None => match lines.get(*pos) {
                        Some(next) if next.indent > indent => {
                            parse_suite(lines, pos, next.indent)?
                        }
                        _ => {
                            return Err(SyntaxError::new(
                                current.line,
                                format!(
                                    "expected an indented block after '{}'",
                                    first_word(&head)
                                ),
                            ));
                        }
                    },
                };
                blocks.push(Block {
                    text: head,
                    line: current.line,
                    children,
                });
            } else {
                blocks.push(Block {
                    text: statement.to_string(),
                    line: current.line,
                    children: Vec::new(),
                });
            }
        }
    }
    Ok(blocks)
}
