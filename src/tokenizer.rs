//! Command line tokenizer
//!
//! Lexes the command currently being composed into [`CommandToken`]s with
//! shell-like quoting, escaping and flag rules. Only the trailing segment
//! after the last `;`, `&&`, `||` or `|` is tokenized.

use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthStr;

use crate::shell::ShellType;

/// One lexical unit of a command line
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandToken {
    /// Unescaped token content
    pub text: String,
    /// Terminal columns the token occupies in the typed text
    pub display_width: usize,
    /// Whether whitespace follows the token, i.e. the user finished typing it
    pub complete: bool,
    /// Token started with a dash
    pub is_option: bool,
    /// Token matched a persistent option
    #[serde(default)]
    pub is_persistent: bool,
    /// Token started with a quote character
    #[serde(default)]
    pub is_quoted: bool,
    /// Quoted token with more content after the closing quote (`"a"b`)
    #[serde(default)]
    pub is_quote_continued: bool,
    /// Token names an existing path
    #[serde(default)]
    pub is_path: bool,
    /// Path token ends in the path separator
    #[serde(default)]
    pub is_path_complete: bool,
}

impl CommandToken {
    pub fn new(text: impl Into<String>, complete: bool) -> Self {
        let text = text.into();
        Self {
            display_width: text.width(),
            is_option: text.starts_with('-'),
            text,
            complete,
            ..Default::default()
        }
    }

    pub fn with_persistent(&self, is_persistent: bool) -> Self {
        Self {
            is_persistent,
            ..self.clone()
        }
    }

    pub fn with_path(&self, is_path_complete: bool) -> Self {
        Self {
            is_path: true,
            is_path_complete,
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Quoted(char),
    QuoteContinued,
    Flag,
    Word,
}

/// Tokenize the command under composition in `command`
pub fn parse_command(command: &str, shell: ShellType) -> Vec<CommandToken> {
    let segment = last_segment(command, shell.whitespace_escape_char()).trim_start();
    if segment.is_empty() {
        return vec![];
    }
    lex(segment, shell.whitespace_escape_char())
        .into_iter()
        .map(|token| sanitize(token, shell))
        .collect()
}

/// Text after the last unescaped, unquoted command separator
fn last_segment(command: &str, escape: char) -> &str {
    let chars: Vec<(usize, char)> = command.char_indices().collect();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut idx = 0;
    while idx < chars.len() {
        let (pos, c) = chars[idx];
        let escaped = idx > 0 && (chars[idx - 1].1 == '\\' || chars[idx - 1].1 == escape);
        match quote {
            Some(q) => {
                if c == q && !escaped {
                    quote = None;
                }
            }
            None if escaped => {}
            None if matches!(c, '\'' | '"' | '`') => quote = Some(c),
            None if c == ';' => start = pos + 1,
            None if (c == '&' || c == '|')
                && chars.get(idx + 1).map(|(_, n)| *n) == Some(c) =>
            {
                start = chars[idx + 1].0 + 1;
                idx += 1;
            }
            None if c == '|' => start = pos + 1,
            None => {}
        }
        idx += 1;
    }
    &command[start..]
}

fn lex(command: &str, escape: char) -> Vec<CommandToken> {
    let chars: Vec<char> = command.chars().collect();
    let mut tokens = vec![];
    let mut mode = Mode::Idle;
    let mut start = 0;

    let slice = |from: usize, to: usize| chars[from..to].iter().collect::<String>();
    let is_space = |idx: usize| chars.get(idx).is_some_and(|c| c.is_whitespace());
    let escaped = |idx: usize| idx > 0 && chars[idx - 1] == escape;

    for (idx, &c) in chars.iter().enumerate() {
        match mode {
            Mode::Idle => {
                start = idx;
                mode = match c {
                    '\'' | '"' | '`' => Mode::Quoted(c),
                    '-' => Mode::Flag,
                    c if c.is_whitespace() => Mode::Idle,
                    _ => Mode::Word,
                };
            }
            Mode::Quoted(q) if c == q && !escaped(idx) => {
                if idx + 1 < chars.len() && !is_space(idx + 1) {
                    mode = Mode::QuoteContinued;
                } else {
                    let text = slice(start + 1, idx);
                    tokens.push(CommandToken {
                        display_width: text.width() + 2,
                        text,
                        complete: is_space(idx + 1),
                        is_quoted: true,
                        ..Default::default()
                    });
                    mode = Mode::Idle;
                }
            }
            Mode::QuoteContinued if c.is_whitespace() && !escaped(idx) => {
                let text = slice(start, idx);
                tokens.push(CommandToken {
                    display_width: text.width(),
                    text,
                    complete: true,
                    is_quoted: true,
                    is_quote_continued: true,
                    ..Default::default()
                });
                mode = Mode::Idle;
            }
            Mode::Flag if c.is_whitespace() || c == '=' => {
                let text = slice(start, idx);
                tokens.push(CommandToken {
                    display_width: text.width(),
                    text,
                    complete: true,
                    is_option: true,
                    ..Default::default()
                });
                mode = Mode::Idle;
            }
            Mode::Word if c.is_whitespace() && !escaped(idx) => {
                let text = slice(start, idx);
                tokens.push(CommandToken {
                    display_width: text.width(),
                    text,
                    complete: true,
                    ..Default::default()
                });
                mode = Mode::Idle;
            }
            _ => {}
        }
    }

    match mode {
        Mode::Idle => {}
        Mode::Quoted(_) => {
            let text = slice(start + 1, chars.len());
            tokens.push(CommandToken {
                display_width: text.width() + 1,
                text,
                is_quoted: true,
                ..Default::default()
            });
        }
        Mode::QuoteContinued => {
            let text = slice(start, chars.len());
            tokens.push(CommandToken {
                display_width: text.width(),
                text,
                is_quoted: true,
                is_quote_continued: true,
                ..Default::default()
            });
        }
        Mode::Flag | Mode::Word => {
            let text = slice(start, chars.len());
            tokens.push(CommandToken {
                display_width: text.width(),
                is_option: mode == Mode::Flag,
                text,
                ..Default::default()
            });
        }
    }

    tokens
}

fn sanitize(mut token: CommandToken, shell: ShellType) -> CommandToken {
    let escape = shell.whitespace_escape_char();
    if !token.is_quoted {
        let escaped_space = format!("{escape} ");
        if token.text.contains(&escaped_space) {
            token.text = token.text.replace(&escaped_space, " ");
        }
    } else if token.is_quote_continued {
        token.text = unwrap_quotes(&token.text, escape);
    }
    token
}

/// Drop the quote characters of a quote-continued token, keeping escaped ones
fn unwrap_quotes(text: &str, escape: char) -> String {
    let Some(quote) = text.chars().next() else {
        return String::new();
    };
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == escape && chars.peek() == Some(&quote) {
            out.push(c);
            out.extend(chars.next());
        } else if c != quote {
            out.push(c);
        }
    }
    out
}
