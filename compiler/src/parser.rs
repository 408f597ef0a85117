// Parser for the textual form of symbolic dimensions and shapes.
//
// Grammar (left-associative, usual precedence):
//   shape   := '[' (sum (',' sum)* ','?)? ']'
//   sum     := product (('+' | '-') product)*
//   product := atom (('*' | '//' | '%') atom)*
//   atom    := '-'? INT | IDENT | '(' sum ')'
//
// Uses chumsky combinators over the token stream from `lexer::lex()`.
// Operators build raw `PrimExpr` nodes so printed text parses back to the
// same tree.
//
// Preconditions: none.
// Postconditions: returns the parsed value or every lex and parse error.
// Failure modes: syntax errors produce `Rich` diagnostics, folded into a
//   `DimParseError`.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::dim::{DimParseError, PrimExpr};
use crate::lexer::{LexError, Token};

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    FloorMod,
}

impl BinOp {
    fn build(self, lhs: PrimExpr, rhs: PrimExpr) -> PrimExpr {
        let (l, r) = (Box::new(lhs), Box::new(rhs));
        match self {
            BinOp::Add => PrimExpr::Add(l, r),
            BinOp::Sub => PrimExpr::Sub(l, r),
            BinOp::Mul => PrimExpr::Mul(l, r),
            BinOp::FloorDiv => PrimExpr::FloorDiv(l, r),
            BinOp::FloorMod => PrimExpr::FloorMod(l, r),
        }
    }
}

// ── Grammar ─────────────────────────────────────────────────────────────────

fn dim_parser<'tokens, I>(
) -> impl Parser<'tokens, I, PrimExpr, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(|sum| {
        let int = just(Token::Minus)
            .or_not()
            .then(select! { Token::Int(v) => v })
            .map(|(neg, v)| PrimExpr::Int(if neg.is_some() { -v } else { v }));

        let var = select! { Token::Ident(name) => PrimExpr::Var(name) };

        let atom = int
            .or(var)
            .or(sum.delimited_by(just(Token::LParen), just(Token::RParen)));

        let mul_op = choice((
            just(Token::Star).to(BinOp::Mul),
            just(Token::SlashSlash).to(BinOp::FloorDiv),
            just(Token::Percent).to(BinOp::FloorMod),
        ));

        let product = atom
            .clone()
            .foldl(mul_op.then(atom).repeated(), |lhs, (op, rhs)| {
                op.build(lhs, rhs)
            });

        let add_op = choice((
            just(Token::Plus).to(BinOp::Add),
            just(Token::Minus).to(BinOp::Sub),
        ));

        product
            .clone()
            .foldl(add_op.then(product).repeated(), |lhs, (op, rhs)| {
                op.build(lhs, rhs)
            })
    })
}

fn shape_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Vec<PrimExpr>, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    dim_parser()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
}

// ── Public API ──────────────────────────────────────────────────────────────

/// Parse a single dimension expression, e.g. `n * 2 + 1`.
pub fn parse_dim(source: &str) -> Result<PrimExpr, DimParseError> {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(lex_result.tokens).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, parse_errors) = dim_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    finish(source, output, lex_result.errors, parse_errors)
}

/// Parse a bracketed shape, e.g. `[n, 4]`. `[]` is the rank-0 shape.
pub fn parse_shape(source: &str) -> Result<Vec<PrimExpr>, DimParseError> {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(lex_result.tokens).map(eoi, |(t, s): (_, _)| (t, s));

    let (output, parse_errors) = shape_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();
    finish(source, output, lex_result.errors, parse_errors)
}

/// Merge lex errors + parse errors; succeed only when both are empty.
fn finish<T>(
    source: &str,
    output: Option<T>,
    lex_errors: Vec<LexError>,
    parse_errors: Vec<Rich<'_, Token, SimpleSpan>>,
) -> Result<T, DimParseError> {
    let mut messages: Vec<String> = lex_errors.into_iter().map(|e| e.message).collect();
    messages.extend(parse_errors.into_iter().map(|e| e.to_string()));

    match output {
        Some(value) if messages.is_empty() => Ok(value),
        _ => Err(DimParseError {
            input: source.to_string(),
            messages,
        }),
    }
}
