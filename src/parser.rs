use std::{ops::Range, sync::Arc};

use logos::Logos;

use crate::{
    error::{ErrorKind, LootError, Location},
    expression::{Expr, SymbolTable},
    number::parse_number,
};


#[derive(Debug, Clone, Copy, PartialEq, Logos)]
#[logos(skip r"([ \t\r\n\f]+|;[^\n]*)")]
enum Token<'a> {
    #[token("(")]
    LeftParen,

    #[token(")")]
    RightParen,

    #[token("'")]
    Quote,

    #[token("`")]
    Quasiquote,

    #[token(",")]
    Unquote,

    #[token(",@")]
    UnquoteSplicing,

    #[regex(r#""[^"]*""#, |lex| { let slice = lex.slice(); &slice[1..slice.len() - 1] })]
    String(&'a str),

    #[regex(r#""[^"]*"#)]
    UnterminatedString,

    #[regex(r#"#\\[^\n][^ \t\r\n\f()';"]*"#, |lex| &lex.slice()[2..])]
    Character(&'a str),

    #[regex(r#"#[^ \t\r\n\f()';"\\][^ \t\r\n\f()';"]*"#, |lex| lex.slice())]
    Hash(&'a str),

    #[regex(r##"[^ \t\r\n\f()';`,"#][^ \t\r\n\f()';"]*"##, |lex| lex.slice())]
    Literal(&'a str),
}

/// A token, or the lexer's refusal, together with its byte span.
type Lexed<'a> = (Result<Token<'a>, ()>, Range<usize>);

type ParseResult<O> = Result<O, LootError>;


fn lexer(input: &str) -> Vec<Lexed<'_>> {
    Token::lexer(input).spanned().collect()
}

fn eof() -> LootError {
    LootError::eof("unexpected end of input")
}

fn parse_character(name: &str) -> ParseResult<Expr> {
    match name {
        "newline" => Ok(Expr::Char(b'\n')),
        "space" => Ok(Expr::Char(b' ')),
        single if single.len() == 1 => Ok(Expr::Char(single.as_bytes()[0])),
        other => Err(LootError::read(format!("bad character constant #\\{}", other))),
    }
}

fn parse_atom(literal: &str, symbols: &SymbolTable) -> ParseResult<Expr> {
    let literal = literal.to_lowercase();
    match parse_number(&literal)? {
        Some(number) => Ok(number),
        None => Ok(Expr::Atom(symbols.intern(&literal))),
    }
}

fn parse_prefixed<'a, 'b: 'a>(tokens: &'a [Lexed<'b>], keyword: &str, symbols: &SymbolTable) -> ParseResult<(&'a [Lexed<'b>], Expr)> {
    let (tokens, quoted) = parse_sexp(tokens, symbols)?;
    Ok((tokens, Expr::list([Expr::Atom(symbols.intern(keyword)), quoted])))
}

/// Parse the elements of a list whose opening parenthesis is already consumed.
fn parse_list<'a, 'b: 'a>(mut tokens: &'a [Lexed<'b>], symbols: &SymbolTable) -> ParseResult<(&'a [Lexed<'b>], Expr)> {
    let mut items = vec![];

    loop {
        match tokens.first() {
            None => return Err(LootError::eof("unexpected end of input inside a list")),
            Some((Ok(Token::RightParen), _)) => return Ok((&tokens[1..], Expr::list(items))),
            Some((Ok(Token::Literal(".")), _)) => {
                if items.is_empty() { return Err(LootError::read("illegal use of .")); }

                let (rest, tail) = parse_sexp(&tokens[1..], symbols)?;
                return match rest.first() {
                    Some((Ok(Token::RightParen), _)) => Ok((&rest[1..], Expr::list_with_tail(items, tail))),
                    Some(_) => Err(LootError::read("illegal use of .")),
                    None => Err(LootError::eof("unexpected end of input inside a list")),
                };
            }
            Some(_) => {
                let (rest, item) = parse_sexp(tokens, symbols)?;
                items.push(item);
                tokens = rest;
            }
        }
    }
}

fn parse_sexp<'a, 'b: 'a>(tokens: &'a [Lexed<'b>], symbols: &SymbolTable) -> ParseResult<(&'a [Lexed<'b>], Expr)> {
    let ((token, span), tokens) = tokens.split_first().ok_or_else(eof)?;
    let token = (*token).map_err(|_| LootError::read(format!("unexpected character at byte {}", span.start)))?;

    match token {
        Token::LeftParen => parse_list(tokens, symbols),
        Token::RightParen => Err(LootError::read("unexpected )")),
        Token::Quote => parse_prefixed(tokens, "quote", symbols),
        Token::Quasiquote => parse_prefixed(tokens, "quasiquote", symbols),
        Token::Unquote => parse_prefixed(tokens, "unquote", symbols),
        Token::UnquoteSplicing => parse_prefixed(tokens, "unquote-splicing", symbols),
        Token::String(text) => Ok((tokens, Expr::string(text))),
        Token::UnterminatedString => Err(LootError::eof("unmatched quote")),
        Token::Character(name) => Ok((tokens, parse_character(name)?)),
        Token::Hash("#t" | "#T") => Ok((tokens, Expr::Boolean(true))),
        Token::Hash("#f" | "#F") => Ok((tokens, Expr::Boolean(false))),
        Token::Hash(other) => Err(LootError::read(format!("bad syntax {}", other))),
        Token::Literal(".") => Err(LootError::read("illegal use of .")),
        Token::Literal(literal) => Ok((tokens, parse_atom(literal, symbols)?)),
    }
}

/// Reads top-level forms from one source text, one at a time, tagging each
/// with the location where it starts.
pub struct Reader<'a> {
    name: Arc<str>,
    tokens: Vec<Lexed<'a>>,
    line_starts: Vec<usize>,
    first_line: usize,
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(name: &str, source: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(index, _)| index + 1))
            .collect();

        Self { name: Arc::from(name), tokens: lexer(source), line_starts, first_line: 1, position: 0 }
    }

    /// Number lines from `line` instead of 1, for text that continues an
    /// earlier chunk of the same input.
    pub fn starting_at_line(mut self, line: usize) -> Self {
        self.first_line = line.max(1);
        self
    }

    fn location(&self, offset: usize) -> Location {
        let line = self.line_starts.partition_point(|start| *start <= offset);
        let col = offset - self.line_starts[line - 1] + 1;
        Location::new(self.name.clone(), line + self.first_line - 1, col)
    }

    fn end_offset(&self) -> usize {
        self.tokens.last().map_or(0, |(_, span)| span.end)
    }

    /// The next top-level form, or `None` at the end of input. A malformed
    /// form ends the input: the reader does not resynchronise.
    pub fn next_form(&mut self, symbols: &SymbolTable) -> ParseResult<Option<(Expr, Location)>> {
        let Some((_, span)) = self.tokens.get(self.position) else { return Ok(None) };
        let location = self.location(span.start);

        let remaining = &self.tokens[self.position..];
        match parse_sexp(remaining, symbols) {
            Ok((rest, form)) => {
                self.position = self.tokens.len() - rest.len();
                Ok(Some((form, location)))
            }
            Err(error) => {
                let failure = match &error.kind {
                    ErrorKind::Eof => self.location(self.end_offset()),
                    _ => location,
                };
                self.position = self.tokens.len();
                Err(error.at(&failure))
            }
        }
    }
}

/// Parse every form in `input`.
pub fn parse(input: &str, symbols: &SymbolTable) -> ParseResult<Vec<Expr>> {
    let mut reader = Reader::new("<string>", input);
    let mut forms = vec![];
    while let Some((form, _)) = reader.next_form(symbols)? {
        forms.push(form);
    }
    Ok(forms)
}


#[cfg(test)]
mod tests {
    use anyhow::bail;

    use crate::test_utils::{all_testcases, load_test_pair};

    use super::*;

    fn read(input: &str) -> ParseResult<Vec<String>> {
        let symbols = SymbolTable::new();
        Ok(parse(input, &symbols)?.iter().map(|form| form.to_string()).collect())
    }

    fn read_error(input: &str) -> LootError {
        match read(input) {
            Err(error) => error,
            Ok(forms) => panic!("{:?} read as {:?}", input, forms),
        }
    }

    #[test]
    fn reads_atoms_and_lists() -> anyhow::Result<()> {
        assert_eq!(read("42 -7 1/2 6/4 2.5 foo \"Hi There\"")?,
            ["42", "-7", "1/2", "3/2", "2.500000e+00", "foo", "\"Hi There\""]);
        assert_eq!(read("(a (b c) () . d)")?, ["(a (b c) () . d)"]);
        assert_eq!(read("(1 . (2 . (3 . ())))")?, ["(1 2 3)"]);
        assert_eq!(read("#t #f #\\a #\\space #\\newline")?, ["#t", "#f", "#\\a", "#\\space", "#\\newline"]);
        Ok(())
    }

    #[test]
    fn atoms_are_lowercased() -> anyhow::Result<()> {
        let symbols = SymbolTable::new();
        let forms = parse("LAMBDA Lambda lambda \"KEEP\"", &symbols)?;
        assert!(forms[..3].iter().all(|form| form.as_symbol() == Some(&symbols.intern("lambda"))));
        assert_eq!(forms[3].to_string(), "\"KEEP\"");
        Ok(())
    }

    #[test]
    fn quote_prefixes_expand() -> anyhow::Result<()> {
        assert_eq!(read("'a `(b ,c ,@d)")?, ["(quote a)", "(quasiquote (b (unquote c) (unquote-splicing d)))"]);
        Ok(())
    }

    #[test]
    fn comments_and_whitespace_are_skipped() -> anyhow::Result<()> {
        assert_eq!(read("; a comment\n  (+ 1 ; inline\n 2)\n")?, ["(+ 1 2)"]);
        assert!(read("   ; nothing here")?.is_empty());
        Ok(())
    }

    #[test]
    fn read_errors() {
        for (input, kind) in [
            (")", ErrorKind::Read),
            ("(. a)", ErrorKind::Read),
            ("(a . b c)", ErrorKind::Read),
            (".", ErrorKind::Read),
            ("#x", ErrorKind::Read),
            ("#\\abc", ErrorKind::Read),
            ("99999999999999999999", ErrorKind::Read),
            ("(a b", ErrorKind::Eof),
            ("'", ErrorKind::Eof),
            ("\"open", ErrorKind::Eof),
            ("(a .", ErrorKind::Eof),
        ] {
            assert_eq!(read_error(input).kind, kind, "reading {:?}", input);
        }
    }

    #[test]
    fn forms_carry_their_location() -> anyhow::Result<()> {
        let symbols = SymbolTable::new();
        let mut reader = Reader::new("demo.scm", "(define x 1)\n\n  (car\n   x)");

        let (_, first) = reader.next_form(&symbols)?.expect("first form");
        assert_eq!(first, Location::new("demo.scm", 1, 1));
        let (_, second) = reader.next_form(&symbols)?.expect("second form");
        assert_eq!(second, Location::new("demo.scm", 3, 3));
        assert!(reader.next_form(&symbols)?.is_none());
        Ok(())
    }

    #[test]
    fn read_errors_are_located() {
        let symbols = SymbolTable::new();
        let mut reader = Reader::new("bad.scm", "1\n  )");
        assert!(matches!(reader.next_form(&symbols), Ok(Some(_))));

        let error = reader.next_form(&symbols).unwrap_err();
        assert_eq!(error.location, Some(Location::new("bad.scm", 2, 3)));
        assert!(matches!(reader.next_form(&symbols), Ok(None)));
    }

    #[test]
    fn parse_testcases() -> anyhow::Result<()> {
        for testcase in all_testcases() {
            println!("Running testcase {}", testcase);
            for (lineno, (input, expected)) in load_test_pair(testcase)?.into_iter().enumerate() {
                let expected: Result<_, _> = expected.into();
                match (read(&input), expected) {
                    (Ok(_), Err(kind @ (ErrorKind::Read | ErrorKind::Eof)))
                        => bail!("Testcase {}:{} - expected a {} error reading {}", testcase, lineno, kind, input),
                    (Err(error), Ok(_)) | (Err(error), Err(ErrorKind::Syntax | ErrorKind::Eval))
                        => bail!("Testcase {}:{} - {} while reading {}", testcase, lineno, error, input),
                    (Err(error), Err(kind)) if error.kind != kind
                        => bail!("Testcase {}:{} - expected {} but got {}", testcase, lineno, kind, error),
                    _ => (),
                }
            }
        }

        Ok(())
    }
}
