//! Tokenizer for the script language.

use crate::errors::ScriptError;

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal, escapes already resolved.
    Str(String),
    /// Identifier, lower-cased.
    Ident(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `let`
    Let,
    /// `if`
    If,
    /// `else`
    Else,
    /// `return`
    Return,
    /// `&&` or `and`
    And,
    /// `||` or `or`
    Or,
    /// `!` or `not`
    Not,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `;`
    Semi,
    /// `.`
    Dot,
    /// End of input.
    Eof,
}

/// A token with the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// Splits script source into tokens. The result always ends with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let start_line = line;
        let token = if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float = chars.get(i) == Some(&'.')
                && chars.get(i + 1).is_some_and(char::is_ascii_digit);
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let token = if is_float {
                text.parse().map(Token::Float).ok()
            } else {
                text.parse().map(Token::Int).ok()
            };
            token.ok_or_else(|| {
                ScriptError::compile(format!("line {line}: invalid number '{text}'"))
            })?
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect::<String>().to_lowercase();
            keyword(&word).unwrap_or(Token::Ident(word))
        } else if c == '"' || c == '\'' {
            let (text, next, newlines) = read_string(&chars, i, line)?;
            i = next;
            line += newlines;
            Token::Str(text)
        } else {
            let next = chars.get(i + 1).copied();
            let (token, width) = match (c, next) {
                ('=', Some('=')) => (Token::EqEq, 2),
                ('!', Some('=')) => (Token::NotEq, 2),
                ('<', Some('=')) => (Token::LtEq, 2),
                ('>', Some('=')) => (Token::GtEq, 2),
                ('&', Some('&')) => (Token::And, 2),
                ('|', Some('|')) => (Token::Or, 2),
                ('=', _) => (Token::Assign, 1),
                ('!', _) => (Token::Not, 1),
                ('<', _) => (Token::Lt, 1),
                ('>', _) => (Token::Gt, 1),
                ('+', _) => (Token::Plus, 1),
                ('-', _) => (Token::Minus, 1),
                ('*', _) => (Token::Star, 1),
                ('/', _) => (Token::Slash, 1),
                ('%', _) => (Token::Percent, 1),
                ('(', _) => (Token::LParen, 1),
                (')', _) => (Token::RParen, 1),
                ('{', _) => (Token::LBrace, 1),
                ('}', _) => (Token::RBrace, 1),
                ('[', _) => (Token::LBracket, 1),
                (']', _) => (Token::RBracket, 1),
                (',', _) => (Token::Comma, 1),
                (';', _) => (Token::Semi, 1),
                ('.', _) => (Token::Dot, 1),
                _ => {
                    return Err(ScriptError::compile(format!(
                        "line {line}: unexpected character '{c}'"
                    )))
                }
            };
            i += width;
            token
        };

        tokens.push(Spanned {
            token,
            line: start_line,
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
    });
    Ok(tokens)
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        "let" => Token::Let,
        "if" => Token::If,
        "else" => Token::Else,
        "return" => Token::Return,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => return None,
    })
}

/// Reads a quoted string starting at `start`; returns the text, the index
/// after the closing quote and the number of newlines consumed.
fn read_string(
    chars: &[char],
    start: usize,
    line: usize,
) -> Result<(String, usize, usize), ScriptError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut newlines = 0;
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1, newlines)),
            '\\' => {
                let escaped = chars.get(i + 1).copied().ok_or_else(|| {
                    ScriptError::compile(format!("line {line}: unterminated string"))
                })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                i += 2;
            }
            c => {
                if c == '\n' {
                    newlines += 1;
                }
                text.push(c);
                i += 1;
            }
        }
    }
    Err(ScriptError::compile(format!(
        "line {line}: unterminated string"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_identifiers_and_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("Input.Total AND NOT True"),
            vec![
                Token::Ident("input".into()),
                Token::Dot,
                Token::Ident("total".into()),
                Token::And,
                Token::Not,
                Token::True,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_and_member_dots() {
        assert_eq!(
            kinds("1.5 + rows.0"),
            vec![
                Token::Float(1.5),
                Token::Plus,
                Token::Ident("rows".into()),
                Token::Dot,
                Token::Int(0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_comments() {
        let tokens = tokenize("// note\nlet s = 'it\\'s';\n").unwrap();
        assert_eq!(tokens[0].token, Token::Let);
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[3].token, Token::Str("it's".into()));
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("a <= b != c || d"),
            vec![
                Token::Ident("a".into()),
                Token::LtEq,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
                Token::Or,
                Token::Ident("d".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(tokenize("\"abc").is_err());
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("a # b").unwrap_err();
        assert!(err.message.contains("unexpected character"));
    }
}
