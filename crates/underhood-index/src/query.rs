//! Query language accepted by the backend.
//!
//! A query is a whitespace-separated conjunction of atoms:
//!
//! | Atom | Meaning |
//! |------|---------|
//! | `foo`, `c:foo`, `content:foo` | content regex (literal when it has no metacharacters) |
//! | `f:^src/.*$`, `file:` | file name regex |
//! | `r:name`, `repo:` | repository name **substring** |
//! | `b:main`, `branch:` | branch name substring |
//! | `case:yes|no|auto` | case sensitivity for every pattern in the query |
//! | `"a b"` | quoted literal |
//! | `-atom` | negation |
//! | `a or b`, `( .. )` | alternation and grouping |
//!
//! A backslash makes the following punctuation character literal, so
//! `a\.b\(c\)` is the literal text `a.b(c)`. A backslash before a letter or
//! digit is passed to the regex engine untouched (`\b`, `\w`, `\d`).

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Q {
    And(Vec<Q>),
    Or(Vec<Q>),
    Not(Box<Q>),
    Repo(String),
    Branch(String),
    File(Pattern),
    Content(Pattern),
    Const(bool),
}

impl Q {
    /// Call `visit` for every leaf of the query tree.
    pub fn visit_atoms(&self, visit: &mut impl FnMut(&Q)) {
        match self {
            Q::And(children) | Q::Or(children) => {
                for child in children {
                    child.visit_atoms(visit);
                }
            }
            Q::Not(inner) => inner.visit_atoms(visit),
            atom => visit(atom),
        }
    }

    /// True when every atom restricts repositories only.
    pub fn is_repo_only(&self) -> bool {
        let mut repo_only = true;
        self.visit_atoms(&mut |atom| {
            repo_only = repo_only && matches!(atom, Q::Repo(_));
        });
        repo_only
    }
}

impl fmt::Display for Q {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Q::And(children) => write_list(f, "and", children),
            Q::Or(children) => write_list(f, "or", children),
            Q::Not(inner) => write!(f, "(not {inner})"),
            Q::Repo(name) => write!(f, "repo:{name:?}"),
            Q::Branch(name) => write!(f, "branch:{name:?}"),
            Q::File(pattern) => write!(f, "file:{pattern}"),
            Q::Content(pattern) => write!(f, "content:{pattern}"),
            Q::Const(value) => write!(f, "{value}"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, op: &str, children: &[Q]) -> fmt::Result {
    write!(f, "({op}")?;
    for child in children {
        write!(f, " {child}")?;
    }
    write!(f, ")")
}

/// A compiled-ready text pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    /// Regex source handed to the matcher.
    pub regex: String,
    /// The unescaped text when the pattern contains no regex operators.
    pub literal: Option<String>,
    pub case_sensitive: bool,
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.literal {
            Some(text) => write!(f, "{text:?}")?,
            None => write!(f, "/{}/", self.regex)?,
        }
        if !self.case_sensitive {
            write!(f, "i")?;
        }
        Ok(())
    }
}

/// Value of the `case:` atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMode {
    Yes,
    No,
    /// Case sensitive only when the pattern contains an uppercase letter.
    #[default]
    Auto,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("empty query")]
    Empty,
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("unterminated quoted string starting at byte {0}")]
    UnterminatedQuote(usize),
    #[error("dangling backslash at end of query")]
    DanglingEscape,
    #[error("unbalanced parenthesis at byte {0}")]
    UnbalancedParen(usize),
    #[error("invalid case value `{0}`, expected yes, no or auto")]
    InvalidCase(String),
    #[error("`or` is missing an operand")]
    DanglingOr,
    #[error("content pattern must not be empty")]
    EmptyPattern,
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
}

const REGEX_META: &[char] = &['.', '*', '?', '^', '$', '+', '{', '}', '[', ']', '|'];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(char),
    Meta(String),
}

#[derive(Debug)]
enum Token {
    Open(usize),
    Close(usize),
    Or,
    Atom {
        negated: bool,
        field: Option<String>,
        pieces: Vec<Piece>,
    },
}

/// Parse a query string into a query tree.
pub fn parse(input: &str) -> Result<Q, QueryError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(QueryError::Empty);
    }

    let mut case = CaseMode::default();
    let mut remaining = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Atom {
                field: Some(field),
                pieces,
                ..
            } if field == "case" => {
                case = match piece_text(&pieces).as_str() {
                    "yes" => CaseMode::Yes,
                    "no" => CaseMode::No,
                    "auto" => CaseMode::Auto,
                    other => return Err(QueryError::InvalidCase(other.to_string())),
                };
            }
            other => remaining.push(other),
        }
    }

    let mut parser = Parser {
        tokens: remaining,
        pos: 0,
        case,
    };
    let q = parser.parse_or()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(q),
        Some(Token::Close(pos)) | Some(Token::Open(pos)) => Err(QueryError::UnbalancedParen(*pos)),
        Some(_) => Err(QueryError::DanglingOr),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    case: CaseMode,
}

impl Parser {
    fn parse_or(&mut self) -> Result<Q, QueryError> {
        let first = self.parse_and()?;
        if !matches!(self.tokens.get(self.pos), Some(Token::Or)) {
            return Ok(first.unwrap_or(Q::Const(true)));
        }

        let mut alternatives = vec![first.ok_or(QueryError::DanglingOr)?];
        while matches!(self.tokens.get(self.pos), Some(Token::Or)) {
            self.pos += 1;
            alternatives.push(self.parse_and()?.ok_or(QueryError::DanglingOr)?);
        }
        Ok(Q::Or(alternatives))
    }

    /// Returns `None` when no operand was consumed.
    fn parse_and(&mut self) -> Result<Option<Q>, QueryError> {
        let mut children = Vec::new();
        loop {
            match self.tokens.get(self.pos) {
                None | Some(Token::Or) | Some(Token::Close(_)) => break,
                Some(Token::Open(open)) => {
                    let open = *open;
                    self.pos += 1;
                    let inner = self.parse_or()?;
                    match self.tokens.get(self.pos) {
                        Some(Token::Close(_)) => self.pos += 1,
                        _ => return Err(QueryError::UnbalancedParen(open)),
                    }
                    children.push(inner);
                }
                Some(Token::Atom {
                    negated,
                    field,
                    pieces,
                }) => {
                    let q = atom(*negated, field.as_deref(), pieces, self.case)?;
                    self.pos += 1;
                    children.push(q);
                }
            }
        }

        Ok(match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(Q::And(children)),
        })
    }
}

fn atom(negated: bool, field: Option<&str>, pieces: &[Piece], case: CaseMode) -> Result<Q, QueryError> {
    let q = match field {
        None | Some("c") | Some("content") => {
            if pieces.is_empty() {
                return Err(QueryError::EmptyPattern);
            }
            Q::Content(pattern(pieces, case)?)
        }
        Some("f") | Some("file") => Q::File(pattern(pieces, case)?),
        Some("r") | Some("repo") => Q::Repo(piece_text(pieces)),
        Some("b") | Some("branch") => Q::Branch(piece_text(pieces)),
        Some(other) => return Err(QueryError::UnknownField(other.to_string())),
    };
    Ok(if negated { Q::Not(Box::new(q)) } else { q })
}

fn pattern(pieces: &[Piece], case: CaseMode) -> Result<Pattern, QueryError> {
    let literal = pieces
        .iter()
        .map(|piece| match piece {
            Piece::Literal(c) => Some(*c),
            Piece::Meta(_) => None,
        })
        .collect::<Option<String>>();

    let mut buf = [0u8; 4];
    let regex: String = pieces
        .iter()
        .map(|piece| match piece {
            Piece::Literal(c) => regex::escape(c.encode_utf8(&mut buf)),
            Piece::Meta(raw) => raw.clone(),
        })
        .collect();
    regex::Regex::new(&regex).map_err(|err| QueryError::InvalidRegex(err.to_string()))?;

    let case_sensitive = match case {
        CaseMode::Yes => true,
        CaseMode::No => false,
        CaseMode::Auto => pieces
            .iter()
            .any(|piece| matches!(piece, Piece::Literal(c) if c.is_uppercase())),
    };

    Ok(Pattern {
        regex,
        literal,
        case_sensitive,
    })
}

fn piece_text(pieces: &[Piece]) -> String {
    pieces
        .iter()
        .map(|piece| match piece {
            Piece::Literal(c) => c.to_string(),
            Piece::Meta(raw) => raw.clone(),
        })
        .collect()
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open(pos));
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close(pos));
                i += 1;
            }
            _ => {
                let (token, next) = lex_word(&chars, i)?;
                tokens.push(token);
                i = next;
            }
        }
    }
    Ok(tokens)
}

fn lex_word(chars: &[(usize, char)], start: usize) -> Result<(Token, usize), QueryError> {
    let mut i = start;
    let mut negated = false;
    if chars[i].1 == '-' && chars.get(i + 1).is_some_and(|(_, c)| !c.is_whitespace()) {
        negated = true;
        i += 1;
    }

    let mut field: Option<String> = None;
    let mut pieces = Vec::new();
    // Only unescaped plain characters so far, so the word may still be a field name.
    let mut plain = true;
    let mut depth = 0usize;

    while i < chars.len() {
        let c = chars[i].1;
        match c {
            c if c.is_whitespace() => break,
            ')' if depth == 0 => break,
            '"' if pieces.is_empty() => {
                let (quoted, next) = lex_quoted(chars, i)?;
                pieces.extend(quoted);
                plain = false;
                i = next;
                continue;
            }
            '\\' => {
                let (_, escaped) = chars.get(i + 1).copied().ok_or(QueryError::DanglingEscape)?;
                if escaped.is_ascii_alphanumeric() {
                    pieces.push(Piece::Meta(format!("\\{escaped}")));
                } else {
                    pieces.push(Piece::Literal(escaped));
                }
                plain = false;
                i += 2;
                continue;
            }
            ':' if field.is_none() && plain && !pieces.is_empty() => {
                field = Some(piece_text(&pieces));
                pieces.clear();
                plain = false;
            }
            '(' => {
                depth += 1;
                pieces.push(Piece::Meta("(".to_string()));
                plain = false;
            }
            ')' => {
                depth -= 1;
                pieces.push(Piece::Meta(")".to_string()));
                plain = false;
            }
            c if REGEX_META.contains(&c) => {
                pieces.push(Piece::Meta(c.to_string()));
                plain = false;
            }
            c => pieces.push(Piece::Literal(c)),
        }
        i += 1;
    }

    let is_or = !negated && plain && field.is_none() && piece_text(&pieces) == "or";
    let token = if is_or {
        Token::Or
    } else {
        Token::Atom {
            negated,
            field,
            pieces,
        }
    };
    Ok((token, i))
}

fn lex_quoted(chars: &[(usize, char)], start: usize) -> Result<(Vec<Piece>, usize), QueryError> {
    let mut pieces = Vec::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            '"' => return Ok((pieces, i + 1)),
            '\\' => {
                let (_, escaped) = chars.get(i + 1).copied().ok_or(QueryError::DanglingEscape)?;
                pieces.push(Piece::Literal(escaped));
                i += 2;
            }
            c => {
                pieces.push(Piece::Literal(c));
                i += 1;
            }
        }
    }
    Err(QueryError::UnterminatedQuote(chars[start].0))
}
