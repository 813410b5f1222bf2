//! Tokenizer for condition expressions.
//!
//! Multi-character operators are tried before their single-character prefixes so
//! `<=` never lexes as `<` followed by `=`.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, one_of},
    combinator::{map, map_res, opt, recognize, value},
    error::{Error as NomError, ErrorKind},
    multi::many0_count,
    sequence::{pair, tuple},
    IResult,
};

use super::error::ConditionError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Double(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    EqEq,
    NotEq,
    Le,
    Ge,
    Lt,
    Gt,
    AndAnd,
    OrOr,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Token::Int(value) => return write!(f, "{value}"),
            Token::Double(value) => return write!(f, "{value}"),
            Token::Str(value) => return write!(f, "'{value}'"),
            Token::Ident(name) => return f.write_str(name),
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            Token::In => "in",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Colon => ":",
            Token::Question => "?",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
        };
        f.write_str(symbol)
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ConditionError> {
    let mut tokens = Vec::new();
    let mut rest = source;

    loop {
        if let Ok((after, _)) = multispace0::<&str, NomError<&str>>(rest) {
            rest = after;
        }
        if rest.is_empty() {
            return Ok(tokens);
        }

        let offset = source.len() - rest.len();
        match token(rest) {
            Ok((remaining, token)) => {
                tokens.push(Spanned { token, offset });
                rest = remaining;
            }
            Err(_) => {
                let message = match rest.chars().next() {
                    Some('\'') | Some('"') => "unterminated string literal".to_string(),
                    Some(other) => format!("unexpected character '{other}'"),
                    None => "unexpected end of input".to_string(),
                };
                return Err(ConditionError::syntax(offset, message));
            }
        }
    }
}

fn token(input: &str) -> IResult<&str, Token> {
    alt((number, string_literal, identifier, symbol))(input)
}

fn exponent(input: &str) -> IResult<&str, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn number(input: &str) -> IResult<&str, Token> {
    alt((
        map_res(
            recognize(tuple((digit1, char('.'), digit1, opt(exponent)))),
            |text: &str| text.parse::<f64>().map(Token::Double),
        ),
        map_res(recognize(pair(digit1, exponent)), |text: &str| {
            text.parse::<f64>().map(Token::Double)
        }),
        map_res(digit1, |text: &str| text.parse::<i64>().map(Token::Int)),
    ))(input)
}

fn string_literal(input: &str) -> IResult<&str, Token> {
    let fail = || nom::Err::Error(NomError::new(input, ErrorKind::Char));
    let quote = match input.chars().next() {
        Some(quote @ ('\'' | '"')) => quote,
        _ => return Err(fail()),
    };

    let mut text = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((index, ch)) = chars.next() {
        if ch == quote {
            return Ok((&input[index + ch.len_utf8()..], Token::Str(text)));
        }
        if ch != '\\' {
            text.push(ch);
            continue;
        }
        match chars.next() {
            Some((_, 'n')) => text.push('\n'),
            Some((_, 't')) => text.push('\t'),
            Some((_, 'r')) => text.push('\r'),
            Some((_, escaped @ ('\\' | '\'' | '"'))) => text.push(escaped),
            // keep regex escapes such as \d intact
            Some((_, other)) => {
                text.push('\\');
                text.push(other);
            }
            None => break,
        }
    }
    Err(fail())
}

fn identifier(input: &str) -> IResult<&str, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0_count(alt((alphanumeric1, tag("_")))),
        )),
        |word: &str| match word {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            other => Token::Ident(other.to_string()),
        },
    )(input)
}

fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        alt((
            value(Token::EqEq, tag("==")),
            value(Token::NotEq, tag("!=")),
            value(Token::Le, tag("<=")),
            value(Token::Ge, tag(">=")),
            value(Token::AndAnd, tag("&&")),
            value(Token::OrOr, tag("||")),
        )),
        alt((
            value(Token::Lt, char('<')),
            value(Token::Gt, char('>')),
            value(Token::Bang, char('!')),
            value(Token::Plus, char('+')),
            value(Token::Minus, char('-')),
            value(Token::Star, char('*')),
            value(Token::Slash, char('/')),
            value(Token::Percent, char('%')),
            value(Token::LParen, char('(')),
            value(Token::RParen, char(')')),
            value(Token::LBracket, char('[')),
            value(Token::RBracket, char(']')),
            value(Token::LBrace, char('{')),
            value(Token::RBrace, char('}')),
            value(Token::Dot, char('.')),
            value(Token::Comma, char(',')),
            value(Token::Colon, char(':')),
            value(Token::Question, char('?')),
        )),
    ))(input)
}
