use crate::core::error::AppError;
use signalbox_types::ErrorCategory;

/// Token produced by the expression lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    // keywords
    And,
    Or,
    Not,
    If,
    Else,
    True,
    False,
    // operators
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LParen,
    RParen,
    Comma,
}

fn syntax_error(message: String) -> AppError {
    AppError::new(ErrorCategory::ExpressionError, message).with_code("RTR-EXPR-001")
}

/// Tokenize an expression string.
pub fn tokenize(input: &str) -> Result<Vec<Token>, AppError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push(Token::DoubleStar);
                    i += 2;
                } else {
                    tokens.push(Token::Star);
                    i += 1;
                }
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DoubleSlash);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    return Err(syntax_error(format!(
                        "assignment is not allowed in expressions (position {})",
                        i
                    )));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ne);
                    i += 2;
                } else {
                    return Err(syntax_error(format!("unexpected '!' at position {}", i)));
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                        None => return Err(syntax_error("unterminated string literal".to_string())),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '0'..='9' | '.' => {
                let start = i;
                let mut seen_dot = false;
                while i < chars.len() {
                    match chars[i] {
                        '0'..='9' => i += 1,
                        '.' if !seen_dot => {
                            seen_dot = true;
                            i += 1;
                        }
                        _ => break,
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse::<f64>().map_err(|_| {
                    syntax_error(format!("invalid numeric literal '{}'", text))
                })?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "if" => Token::If,
                    "else" => Token::Else,
                    "True" | "true" => Token::True,
                    "False" | "false" => Token::False,
                    "lambda" | "import" | "for" | "while" | "def" => {
                        return Err(
                            AppError::new(
                                ErrorCategory::ExpressionError,
                                format!("'{}' is not allowed in expressions", word),
                            )
                            .with_code("RTR-EXPR-005"),
                        )
                    }
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            '[' | ']' => {
                return Err(AppError::new(
                    ErrorCategory::ExpressionError,
                    "subscription is not allowed in expressions",
                )
                .with_code("RTR-EXPR-005"))
            }
            other => {
                return Err(syntax_error(format!(
                    "unexpected character '{}' at position {}",
                    other, i
                )))
            }
        }
    }

    Ok(tokens)
}
