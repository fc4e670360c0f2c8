//! Query-string parsing into infix boolean tokens and free-text terms.
//!
//! Bare words are implicitly OR-joined, `AND`/`OR` are explicit operators,
//! double-quoted text is a phrase and parentheses group. The infix stream is
//! repaired so it is always well formed: dangling operators and empty groups
//! are dropped and unmatched parentheses are removed or closed.

use crate::index::DocId;
use crate::tokenizer::Normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
}

impl Op {
    pub fn precedence(self) -> u8 {
        match self {
            Op::And => 2,
            Op::Or => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::And => "AND",
            Op::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryToken {
    Term(String),
    Phrase(Vec<String>),
    Operator(Op),
    /// An already resolved operand.
    DocList(Vec<DocId>),
    LeftParen,
    RightParen,
}

impl QueryToken {
    pub fn is_operand(&self) -> bool {
        matches!(self, QueryToken::Term(_) | QueryToken::Phrase(_) | QueryToken::DocList(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    Word(String),
    Quoted(String),
    And,
    Or,
    LeftParen,
    RightParen,
}

fn lex(query: &str) -> Vec<Lexeme> {
    let mut out = Vec::new();
    let mut chars = query.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                out.push(Lexeme::LeftParen);
            }
            ')' => {
                chars.next();
                out.push(Lexeme::RightParen);
            }
            '"' => {
                chars.next();
                // an unterminated quote runs to the end of the query
                let text: String = chars.by_ref().take_while(|&c| c != '"').collect();
                out.push(Lexeme::Quoted(text));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '"') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                out.push(match word.as_str() {
                    "AND" => Lexeme::And,
                    "OR" => Lexeme::Or,
                    _ => Lexeme::Word(word),
                });
            }
        }
    }
    out
}

fn expects_operator(out: &[QueryToken]) -> bool {
    out.last().is_some_and(|t| t.is_operand() || *t == QueryToken::RightParen)
}

fn push_operand(out: &mut Vec<QueryToken>, token: QueryToken) {
    if expects_operator(out) {
        out.push(QueryToken::Operator(Op::Or));
    }
    out.push(token);
}

/// Operators with no left operand are dropped.
fn push_operator(out: &mut Vec<QueryToken>, op: Op) {
    if expects_operator(out) {
        out.push(QueryToken::Operator(op));
    }
}

/// Parsed form of one query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    /// Well-formed infix tokens for boolean evaluation.
    pub boolean: Vec<QueryToken>,
    /// Every normalized term, operators and grouping stripped.
    pub free_text: Vec<String>,
}

pub fn parse_query<N: Normalizer + ?Sized>(query: &str, normalizer: &N) -> ParsedQuery {
    let mut boolean = Vec::new();
    let mut free_text = Vec::new();
    let mut depth = 0usize;

    for lexeme in lex(query) {
        match lexeme {
            Lexeme::Word(word) => {
                for term in normalizer.normalize(&word) {
                    free_text.push(term.clone());
                    push_operand(&mut boolean, QueryToken::Term(term));
                }
            }
            Lexeme::Quoted(text) => {
                let mut terms = normalizer.normalize(&text);
                free_text.extend(terms.iter().cloned());
                match terms.len() {
                    0 => {}
                    1 => push_operand(&mut boolean, QueryToken::Term(terms.remove(0))),
                    _ => push_operand(&mut boolean, QueryToken::Phrase(terms)),
                }
            }
            Lexeme::And => push_operator(&mut boolean, Op::And),
            Lexeme::Or => push_operator(&mut boolean, Op::Or),
            Lexeme::LeftParen => {
                if expects_operator(&boolean) {
                    boolean.push(QueryToken::Operator(Op::Or));
                }
                boolean.push(QueryToken::LeftParen);
                depth += 1;
            }
            Lexeme::RightParen => {
                if depth == 0 {
                    continue;
                }
                if matches!(boolean.last(), Some(QueryToken::Operator(_))) {
                    boolean.pop();
                }
                if boolean.last() == Some(&QueryToken::LeftParen) {
                    boolean.pop();
                } else {
                    boolean.push(QueryToken::RightParen);
                }
                depth -= 1;
            }
        }
    }

    loop {
        match boolean.last() {
            Some(QueryToken::Operator(_)) => {
                boolean.pop();
            }
            Some(QueryToken::LeftParen) => {
                boolean.pop();
                depth -= 1;
            }
            _ => break,
        }
    }
    boolean.extend(std::iter::repeat(QueryToken::RightParen).take(depth));

    ParsedQuery { boolean, free_text }
}
