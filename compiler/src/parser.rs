// Parser for the textual formula notation.
//
// Parses a token stream (from the lexer) into an AST. Uses chumsky
// combinators. Grammar, loosest binding first:
//
//   expr    := product (('+' | '-') product)*
//   product := unary (('*' | '/') unary)*
//   unary   := '-'* power
//   power   := atom ('^' '-'? INT)?
//   atom    := INT | IDENT '(' args ')' | IDENT | '(' expr '|' expr ')' | '(' expr ')'
//   alias   := IDENT '=' expr
//
// Preconditions: none.
// Postconditions: returns an AST plus any lex and parse errors.
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::{Alias, BinaryOp, Expr, ExprKind, Ident};
use crate::lexer::{LexError, Token};

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult<T> {
    pub output: Option<T>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a formula expression. Lexes then parses.
pub fn parse(source: &str) -> ParseResult<Expr> {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, parse_errors) = expr_parser(source).parse(stream).into_output_errors();
    let mut errors = lex_errors(lex_result.errors);
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));
    ParseResult { output, errors }
}

/// Parse an alias declaration `name = Vi(...)`.
pub fn parse_alias(source: &str) -> ParseResult<Alias> {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, parse_errors) = alias_parser(source).parse(stream).into_output_errors();
    let mut errors = lex_errors(lex_result.errors);
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));
    ParseResult { output, errors }
}

fn lex_errors(errors: Vec<LexError>) -> Vec<Rich<'static, Token, SimpleSpan>> {
    errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect()
}

fn join(a: SimpleSpan, b: SimpleSpan) -> SimpleSpan {
    (a.start()..b.end()).into()
}

// ── Grammar ──

fn ident_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Ident, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    })
}

fn alias_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Alias, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    ident_parser(source)
        .then_ignore(just(Token::Equals))
        .then(expr_parser(source))
        .map_with(|(name, value), e| Alias {
            name,
            value,
            span: e.span(),
        })
}

fn expr_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(move |expr| {
        let ident = ident_parser(source);
        let int = select! { Token::Int(n) => n };

        // ── Atoms ──

        let literal = int.map_with(|n, e| Expr {
            kind: ExprKind::Int(n),
            span: e.span(),
        });

        let call = ident
            .clone()
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(name, args), e| Expr {
                kind: ExprKind::Call { name, args },
                span: e.span(),
            });

        let name = ident.map(|id| Expr {
            span: id.span,
            kind: ExprKind::Ident(id.name),
        });

        let scalprod = expr
            .clone()
            .then_ignore(just(Token::Pipe))
            .then(expr.clone())
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map_with(|(a, b), e| Expr {
                kind: ExprKind::Scalprod(Box::new(a), Box::new(b)),
                span: e.span(),
            });

        let group = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((literal, call, name, scalprod, group));

        // ── Power: atom ('^' '-'? INT)? ──

        let exponent = just(Token::Caret)
            .ignore_then(just(Token::Minus).or_not())
            .then(int)
            .map(|(neg, n)| if neg.is_some() { -n } else { n });

        let power = atom.then(exponent.or_not()).map_with(|(base, exp), e| match exp {
            Some(m) => Expr {
                kind: ExprKind::Power(Box::new(base), m),
                span: e.span(),
            },
            None => base,
        });

        // ── Unary minus ──

        let unary = just(Token::Minus)
            .map_with(|_, e| -> SimpleSpan { e.span() })
            .repeated()
            .collect::<Vec<_>>()
            .then(power)
            .map(|(minus_spans, operand)| {
                minus_spans.into_iter().rev().fold(operand, |acc, s| Expr {
                    span: join(s, acc.span),
                    kind: ExprKind::Neg(Box::new(acc)),
                })
            });

        // ── Binary levels (left-associative) ──

        let fold_binary = |(first, rest): (Expr, Vec<(BinaryOp, Expr)>)| {
            rest.into_iter().fold(first, |lhs, (op, rhs)| Expr {
                span: join(lhs.span, rhs.span),
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            })
        };

        let mul_op = just(Token::Star)
            .to(BinaryOp::Mul)
            .or(just(Token::Slash).to(BinaryOp::Div));
        let product = unary
            .clone()
            .then(mul_op.then(unary).repeated().collect::<Vec<_>>())
            .map(fold_binary);

        let add_op = just(Token::Plus)
            .to(BinaryOp::Add)
            .or(just(Token::Minus).to(BinaryOp::Sub));
        product
            .clone()
            .then(add_op.then(product).repeated().collect::<Vec<_>>())
            .map(fold_binary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        let result = parse(source);
        assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
        result.output.expect("no output")
    }

    /// Compact s-expression rendering for structural assertions.
    fn sexp(e: &Expr) -> String {
        match &e.kind {
            ExprKind::Int(n) => n.to_string(),
            ExprKind::Ident(name) => name.clone(),
            ExprKind::Neg(x) => format!("(neg {})", sexp(x)),
            ExprKind::Binary { op, lhs, rhs } => {
                let op = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div => "/",
                };
                format!("({} {} {})", op, sexp(lhs), sexp(rhs))
            }
            ExprKind::Power(x, m) => format!("(^ {} {})", sexp(x), m),
            ExprKind::Scalprod(a, b) => format!("(| {} {})", sexp(a), sexp(b)),
            ExprKind::Call { name, args } => {
                let args: Vec<String> = args.iter().map(sexp).collect();
                format!("({} {})", name.name, args.join(" "))
            }
        }
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(sexp(&parse_ok("a + b * c")), "(+ a (* b c))");
        assert_eq!(sexp(&parse_ok("a - b - c")), "(- (- a b) c)");
        assert_eq!(sexp(&parse_ok("(a + b) / c")), "(/ (+ a b) c)");
    }

    #[test]
    fn unary_minus_binds_looser_than_power() {
        assert_eq!(sexp(&parse_ok("-x^2")), "(neg (^ x 2))");
        assert_eq!(sexp(&parse_ok("x^-1")), "(^ x -1)");
        assert_eq!(sexp(&parse_ok("--x")), "(neg (neg x))");
    }

    #[test]
    fn calls_and_scalar_products() {
        assert_eq!(
            sexp(&parse_ok("Exp(-SqDist(x, y)) * b")),
            "(* (Exp (neg (SqDist x y))) b)"
        );
        assert_eq!(sexp(&parse_ok("(x | y)")), "(| x y)");
        assert_eq!(sexp(&parse_ok("Extract(x, 1, 2)")), "(Extract x 1 2)");
    }

    #[test]
    fn spans_cover_constructs() {
        let e = parse_ok("a + bb");
        assert_eq!((e.span.start(), e.span.end()), (0, 6));
    }

    #[test]
    fn alias_declaration() {
        let result = parse_alias("x = Vi(0, 3)");
        assert!(result.errors.is_empty());
        let alias = result.output.unwrap();
        assert_eq!(alias.name.name, "x");
        assert_eq!(sexp(&alias.value), "(Vi 0 3)");
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(!parse("x +").errors.is_empty());
        assert!(!parse("Exp(x").errors.is_empty());
        assert!(!parse("x y").errors.is_empty());
    }

    #[test]
    fn lex_errors_are_merged() {
        let result = parse("x $ y");
        assert!(!result.errors.is_empty());
    }
}
