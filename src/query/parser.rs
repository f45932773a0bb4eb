//! Compilation of the S-expression pattern language.
//!
//! Source text is tokenized, parsed by recursive descent (bounded by the
//! configured pattern depth) and checked against the grammar vocabulary.

use std::sync::Arc;

use regex::Regex;

use super::pattern::{
    CapturePoint, NodeMatcher, Operand, Pattern, PatternNode, Predicate, Quantifier,
};
use crate::error::{AnalysisError, Result};
use crate::grammar::Grammar;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    Bang,
    Question,
    Star,
    Plus,
    Capture(String),
    Predicate(String),
    Str(String),
    Ident(String),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Colon => "':'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::Question => "'?'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Capture(name) => format!("capture @{}", name),
            Token::Predicate(name) => format!("predicate #{}", name),
            Token::Str(s) => format!("string {:?}", s),
            Token::Ident(s) => format!("identifier {:?}", s),
            Token::Eof => "end of query".to_string(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_capture_char(c: char) -> bool {
    is_ident_char(c) || c == '.'
}

fn is_predicate_char(c: char) -> bool {
    is_ident_char(c) || c == '?' || c == '!'
}

/// Split pattern text into tokens paired with their byte offsets.
fn tokenize(grammar: &str, src: &str) -> Result<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();

    let take_while = |chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
                      pred: fn(char) -> bool| {
        let mut out = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            chars.next();
        }
        out
    };

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ';' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' | ')' | '[' | ']' | ':' | '!' | '?' | '*' | '+' => {
                chars.next();
                let token = match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    ':' => Token::Colon,
                    '!' => Token::Bang,
                    '?' => Token::Question,
                    '*' => Token::Star,
                    _ => Token::Plus,
                };
                tokens.push((token, offset));
            }
            '@' => {
                chars.next();
                let name = take_while(&mut chars, is_capture_char);
                if name.is_empty() {
                    return Err(AnalysisError::invalid_query(
                        grammar,
                        offset,
                        "expected a capture name after '@'",
                    ));
                }
                tokens.push((Token::Capture(name), offset));
            }
            '#' => {
                chars.next();
                let name = take_while(&mut chars, is_predicate_char);
                if name.is_empty() {
                    return Err(AnalysisError::invalid_query(
                        grammar,
                        offset,
                        "expected a predicate name after '#'",
                    ));
                }
                tokens.push((Token::Predicate(name), offset));
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, 'n')) => value.push('\n'),
                            Some((_, 't')) => value.push('\t'),
                            Some((_, 'r')) => value.push('\r'),
                            Some((_, '0')) => value.push('\0'),
                            Some((_, other)) => value.push(other),
                            None => break,
                        },
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(AnalysisError::invalid_query(
                        grammar,
                        offset,
                        "unterminated string literal",
                    ));
                }
                tokens.push((Token::Str(value), offset));
            }
            c if is_ident_char(c) => {
                let ident = take_while(&mut chars, is_ident_char);
                tokens.push((Token::Ident(ident), offset));
            }
            '.' => {
                return Err(AnalysisError::invalid_query(
                    grammar,
                    offset,
                    "anchor operator '.' is not supported",
                ));
            }
            other => {
                return Err(AnalysisError::invalid_query(
                    grammar,
                    offset,
                    format!("unexpected character {:?}", other),
                ));
            }
        }
    }
    tokens.push((Token::Eof, src.len()));
    Ok(tokens)
}

/// Output of a successful compilation.
pub(crate) struct Compiled {
    pub(crate) patterns: Vec<Pattern>,
    pub(crate) capture_names: Vec<Arc<str>>,
}

struct PatternParser<'g> {
    grammar: &'g Grammar,
    tokens: Vec<(Token, usize)>,
    pos: usize,
    max_depth: usize,
    capture_names: Vec<Arc<str>>,
    next_seq: usize,
    /// Captures defined so far in the pattern being parsed.
    pattern_captures: Vec<usize>,
}

/// Compile `src` against `grammar`.
pub(crate) fn compile(grammar: &Grammar, src: &str, max_depth: usize) -> Result<Compiled> {
    let tokens = tokenize(grammar.name(), src)?;
    let mut parser = PatternParser {
        grammar,
        tokens,
        pos: 0,
        max_depth,
        capture_names: Vec::new(),
        next_seq: 0,
        pattern_captures: Vec::new(),
    };

    let mut patterns = Vec::new();
    while parser.peek() != &Token::Eof {
        patterns.push(parser.parse_top_level()?);
    }
    if patterns.is_empty() {
        return Err(AnalysisError::invalid_query(
            grammar.name(),
            0,
            "query contains no patterns",
        ));
    }

    Ok(Compiled {
        patterns,
        capture_names: parser.capture_names,
    })
}

impl<'g> PatternParser<'g> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].0.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> AnalysisError {
        AnalysisError::invalid_query(self.grammar.name(), offset, message)
    }

    fn unexpected(&self, expected: &str) -> AnalysisError {
        self.error(
            self.offset(),
            format!("expected {}, found {}", expected, self.peek().describe()),
        )
    }

    fn expect(&mut self, token: Token, expected: &str) -> Result<()> {
        if self.peek() == &token {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn check_field(&self, field: &str, offset: usize) -> Result<()> {
        if self.grammar.has_field(field) {
            Ok(())
        } else {
            Err(self.error(offset, format!("unknown field {:?}", field)))
        }
    }

    fn parse_top_level(&mut self) -> Result<Pattern> {
        let start_byte = self.offset();
        self.pattern_captures.clear();
        let mut predicates = Vec::new();

        let is_group = self.peek() == &Token::LParen
            && matches!(
                self.peek_at(1),
                Token::LParen | Token::LBracket | Token::Str(_)
            )
            && !matches!(self.peek_at(2), Token::Predicate(_));

        let root = if is_group {
            self.advance();
            let root = self.parse_pattern(1, &mut predicates)?;
            loop {
                match (self.peek(), self.peek_at(1)) {
                    (Token::RParen, _) => {
                        self.advance();
                        break;
                    }
                    (Token::LParen, Token::Predicate(_)) => {
                        let predicate = self.parse_predicate()?;
                        predicates.push(predicate);
                    }
                    (Token::Eof, _) => return Err(self.unexpected("')'")),
                    _ => {
                        return Err(self.error(
                            self.offset(),
                            "sibling sequences are not supported; only predicates may follow a grouped pattern",
                        ))
                    }
                }
            }
            root
        } else {
            self.parse_pattern(1, &mut predicates)?
        };

        if root.field.is_some() {
            return Err(self.error(start_byte, "top-level patterns cannot carry a field"));
        }
        if root.quantifier != Quantifier::One {
            return Err(self.error(start_byte, "top-level patterns cannot be quantified"));
        }

        Ok(Pattern {
            root,
            predicates,
            start_byte,
        })
    }

    fn parse_pattern(&mut self, depth: usize, predicates: &mut Vec<Predicate>) -> Result<PatternNode> {
        if depth > self.max_depth {
            return Err(AnalysisError::depth_exceeded(self.max_depth, "query pattern"));
        }

        let mut field = None;
        if let (Token::Ident(name), Token::Colon) = (self.peek(), self.peek_at(1)) {
            let name = name.clone();
            self.check_field(&name, self.offset())?;
            self.advance();
            self.advance();
            field = Some(name);
        }

        let offset = self.offset();
        let mut node = match self.advance() {
            Token::LParen => self.parse_node_body(depth, offset, predicates)?,
            Token::LBracket => {
                let mut alternatives = Vec::new();
                while self.peek() != &Token::RBracket {
                    if self.peek() == &Token::Eof {
                        return Err(self.unexpected("']'"));
                    }
                    let alt_offset = self.offset();
                    let alt = self.parse_pattern(depth + 1, predicates)?;
                    if alt.field.is_some() || alt.quantifier != Quantifier::One {
                        return Err(self.error(
                            alt_offset,
                            "alternatives cannot carry fields or quantifiers",
                        ));
                    }
                    alternatives.push(alt);
                }
                self.advance();
                if alternatives.is_empty() {
                    return Err(self.error(offset, "empty alternation"));
                }
                PatternNode::new(NodeMatcher::Alternation(alternatives))
            }
            Token::Str(literal) => {
                if !self.grammar.has_anonymous_kind(&literal) {
                    return Err(self.error(offset, format!("unknown anonymous node {:?}", literal)));
                }
                PatternNode::new(NodeMatcher::Literal(literal))
            }
            Token::Ident(ident) if ident == "_" => PatternNode::new(NodeMatcher::Any),
            Token::Ident(ident) => {
                return Err(self.error(
                    offset,
                    format!("expected '(' before node kind {:?}", ident),
                ))
            }
            other => {
                return Err(self.error(
                    offset,
                    format!("expected a pattern, found {}", other.describe()),
                ))
            }
        };
        node.field = field;

        node.quantifier = match self.peek() {
            Token::Question => Quantifier::ZeroOrOne,
            Token::Star => Quantifier::ZeroOrMore,
            Token::Plus => Quantifier::OneOrMore,
            _ => Quantifier::One,
        };
        if node.quantifier != Quantifier::One {
            self.advance();
        }

        while let Token::Capture(name) = self.peek() {
            let name = name.clone();
            self.advance();
            let index = self.capture_index(&name);
            node.captures.push(CapturePoint {
                seq: self.next_seq,
                index,
            });
            self.next_seq += 1;
            if !self.pattern_captures.contains(&index) {
                self.pattern_captures.push(index);
            }
        }

        Ok(node)
    }

    /// Parse what follows '(' up to and including the matching ')'.
    fn parse_node_body(
        &mut self,
        depth: usize,
        open_offset: usize,
        predicates: &mut Vec<Predicate>,
    ) -> Result<PatternNode> {
        let kind_offset = self.offset();
        let matcher = match self.advance() {
            Token::Ident(kind) if kind == "_" => NodeMatcher::AnyNamed,
            Token::Ident(kind) => {
                if !self.grammar.has_named_kind(&kind) {
                    return Err(self.error(kind_offset, format!("unknown node kind {:?}", kind)));
                }
                NodeMatcher::Kind(kind)
            }
            Token::Predicate(name) => {
                return Err(self.error(
                    kind_offset,
                    format!("predicate #{} must follow a pattern", name),
                ))
            }
            _ => {
                return Err(self.error(open_offset, "expected a node kind after '('"));
            }
        };
        let mut node = PatternNode::new(matcher);

        loop {
            match (self.peek(), self.peek_at(1)) {
                (Token::RParen, _) => {
                    self.advance();
                    break;
                }
                (Token::Eof, _) => return Err(self.unexpected("')'")),
                (Token::LParen, Token::Predicate(_)) => {
                    let predicate = self.parse_predicate()?;
                    predicates.push(predicate);
                }
                (Token::Bang, _) => {
                    self.advance();
                    let offset = self.offset();
                    match self.advance() {
                        Token::Ident(field) => {
                            self.check_field(&field, offset)?;
                            node.negated_fields.push(field);
                        }
                        _ => return Err(self.error(offset, "expected a field name after '!'")),
                    }
                }
                _ => {
                    let child = self.parse_pattern(depth + 1, predicates)?;
                    node.children.push(child);
                }
            }
        }
        Ok(node)
    }

    fn capture_index(&mut self, name: &str) -> usize {
        if let Some(index) = self.capture_names.iter().position(|n| &**n == name) {
            return index;
        }
        self.capture_names.push(Arc::from(name));
        self.capture_names.len() - 1
    }

    fn known_capture(&self, name: &str, offset: usize) -> Result<usize> {
        self.capture_names
            .iter()
            .position(|n| &**n == name)
            .filter(|index| self.pattern_captures.contains(index))
            .ok_or_else(|| {
                self.error(
                    offset,
                    format!("predicate refers to undefined capture @{}", name),
                )
            })
    }

    fn parse_predicate(&mut self) -> Result<Predicate> {
        self.expect(Token::LParen, "'('")?;
        let offset = self.offset();
        let name = match self.advance() {
            Token::Predicate(name) => name,
            _ => return Err(self.error(offset, "expected a predicate name")),
        };

        let mut args = Vec::new();
        loop {
            let arg_offset = self.offset();
            match self.advance() {
                Token::RParen => break,
                Token::Capture(capture) => {
                    args.push((Operand::Capture(self.known_capture(&capture, arg_offset)?), arg_offset))
                }
                Token::Str(value) => args.push((Operand::Literal(value), arg_offset)),
                Token::Eof => return Err(self.error(arg_offset, "unterminated predicate")),
                other => {
                    return Err(self.error(
                        arg_offset,
                        format!("unexpected {} in predicate #{}", other.describe(), name),
                    ))
                }
            }
        }

        let (negate, base) = match name.strip_prefix("not-") {
            Some(base) => (true, base),
            None => (false, name.as_str()),
        };

        let first_capture = |args: &[(Operand, usize)]| -> Result<usize> {
            match args.first() {
                Some((Operand::Capture(index), _)) => Ok(*index),
                _ => Err(self.error(
                    offset,
                    format!("#{} expects a capture as its first argument", name),
                )),
            }
        };

        match base {
            "eq?" => {
                let capture = first_capture(&args)?;
                if args.len() != 2 {
                    return Err(self.error(offset, format!("#{} expects exactly two arguments", name)));
                }
                let operand = args.swap_remove(1).0;
                Ok(Predicate::Eq {
                    capture,
                    operand,
                    negate,
                })
            }
            "match?" => {
                let capture = first_capture(&args)?;
                match args.get(1) {
                    Some((Operand::Literal(pattern), pattern_offset)) if args.len() == 2 => {
                        let regex = Regex::new(pattern).map_err(|e| {
                            self.error(*pattern_offset, format!("invalid regex in #{}: {}", name, e))
                        })?;
                        Ok(Predicate::Match {
                            capture,
                            regex,
                            negate,
                        })
                    }
                    _ => Err(self.error(
                        offset,
                        format!("#{} expects a capture and a regex string", name),
                    )),
                }
            }
            "any-of?" => {
                let capture = first_capture(&args)?;
                let mut values = Vec::new();
                for (operand, arg_offset) in args.into_iter().skip(1) {
                    match operand {
                        Operand::Literal(value) => values.push(value),
                        Operand::Capture(_) => {
                            return Err(self.error(
                                arg_offset,
                                format!("#{} only accepts string values", name),
                            ))
                        }
                    }
                }
                if values.is_empty() {
                    return Err(self.error(offset, format!("#{} expects at least one value", name)));
                }
                Ok(Predicate::AnyOf {
                    capture,
                    values,
                    negate,
                })
            }
            _ => Err(self.error(offset, format!("unknown predicate #{}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_grammar() -> Grammar {
        Grammar::new("toy", "toy")
            .with_kinds(
                true,
                ["program", "class_declaration", "identifier", "class_body", "method"],
            )
            .with_kinds(false, ["class", "{", "}"])
            .with_fields(["name", "body"])
    }

    fn compile_err(src: &str) -> String {
        match compile(&toy_grammar(), src, 8) {
            Ok(_) => panic!("expected {:?} to fail", src),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn test_tokenize_skips_comments() {
        let tokens = tokenize("toy", "; leading comment\n(program) @p").unwrap();
        let kinds: Vec<_> = tokens.into_iter().map(|(t, _)| t).collect();
        assert_eq!(
            kinds,
            vec![
                Token::LParen,
                Token::Ident("program".to_string()),
                Token::RParen,
                Token::Capture("p".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_compile_fields_captures_and_alternatives() {
        let compiled = compile(
            &toy_grammar(),
            r#"
            (class_declaration name: (identifier) @name body: (class_body)) @class
            [(method) (identifier)] @any
            "#,
            8,
        )
        .unwrap();
        assert_eq!(compiled.patterns.len(), 2);
        let names: Vec<&str> = compiled.capture_names.iter().map(|n| &**n).collect();
        assert_eq!(names, vec!["name", "class", "any"]);

        let root = &compiled.patterns[0].root;
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].field.as_deref(), Some("name"));
        assert_eq!(root.children[0].captures[0].seq, 0);
        assert_eq!(root.captures[0].seq, 1);
    }

    #[test]
    fn test_capture_names_are_shared_across_patterns() {
        let compiled = compile(&toy_grammar(), "(identifier) @n (method) @n", 8).unwrap();
        assert_eq!(compiled.capture_names.len(), 1);
    }

    #[test]
    fn test_unknown_kind_is_named() {
        let msg = compile_err("(klass_declaration)");
        assert!(msg.contains("unknown node kind \"klass_declaration\""), "{}", msg);
        assert!(msg.contains("offset 1"), "{}", msg);
    }

    #[test]
    fn test_unknown_field_and_literal() {
        assert!(compile_err("(class_declaration title: (identifier))").contains("unknown field \"title\""));
        assert!(compile_err("(class_declaration \"interface\")").contains("unknown anonymous node"));
        assert!(compile_err("(class_declaration !title)").contains("unknown field \"title\""));
    }

    #[test]
    fn test_malformed_patterns() {
        assert!(compile_err("(class_declaration").contains("expected ')'"));
        assert!(compile_err("class_declaration").contains("expected '(' before node kind"));
        assert!(compile_err("").contains("no patterns"));
        assert!(compile_err("(identifier) @").contains("capture name"));
        assert!(compile_err("(program \"class)").contains("unterminated"));
        assert!(compile_err("(program . (identifier))").contains("anchor"));
        assert!(compile_err("[]").contains("empty alternation"));
    }

    #[test]
    fn test_top_level_restrictions() {
        assert!(compile_err("(identifier)*").contains("cannot be quantified"));
        assert!(compile_err("name: (identifier)").contains("cannot carry a field"));
        assert!(compile_err("((identifier) (method))").contains("sibling sequences"));
    }

    #[test]
    fn test_predicates() {
        let compiled = compile(
            &toy_grammar(),
            r#"((identifier) @id (#match? @id "^[A-Z]") (#not-eq? @id "Foo"))"#,
            8,
        )
        .unwrap();
        assert_eq!(compiled.patterns[0].predicates.len(), 2);

        let compiled = compile(
            &toy_grammar(),
            r#"(class_declaration name: (identifier) @n (#any-of? @n "A" "B"))"#,
            8,
        )
        .unwrap();
        assert_eq!(compiled.patterns[0].predicates.len(), 1);
    }

    #[test]
    fn test_bad_predicates() {
        assert!(compile_err(r#"((identifier) @id (#frobnicate? @id))"#).contains("unknown predicate #frobnicate?"));
        assert!(compile_err(r#"((identifier) @id (#eq? @other "x"))"#).contains("undefined capture @other"));
        assert!(compile_err(r#"((identifier) @id (#match? @id "(unclosed"))"#).contains("invalid regex"));
        assert!(compile_err(r#"((identifier) @id (#eq? "x" @id))"#).contains("first argument"));
        assert!(compile_err(r#"((identifier) @id (#any-of? @id))"#).contains("at least one value"));
    }

    #[test]
    fn test_pattern_depth_bound() {
        let src = "(program (class_declaration (class_body (method (identifier)))))";
        assert!(compile(&toy_grammar(), src, 5).is_ok());
        let err = compile(&toy_grammar(), src, 4).err().unwrap();
        assert_eq!(
            err,
            AnalysisError::DepthExceeded {
                limit: 4,
                context: "query pattern".to_string()
            }
        );
    }
}
