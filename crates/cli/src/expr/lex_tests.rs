// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn kinds(source: &str) -> Vec<TokKind> {
    lex(source)
        .unwrap()
        .into_iter()
        .map(|token| token.kind)
        .collect()
}

#[test]
fn arithmetic_and_arrows() {
    assert_eq!(
        kinds("1 + 2"),
        vec![TokKind::Number(1.0), TokKind::Plus, TokKind::Number(2.0)]
    );
    assert_eq!(
        kinds("(p) => p"),
        vec![
            TokKind::LParen,
            TokKind::Ident("p".into()),
            TokKind::RParen,
            TokKind::Arrow,
            TokKind::Ident("p".into()),
        ]
    );
}

#[test]
fn keywords_are_distinguished() {
    assert_eq!(
        kinds("async await return"),
        vec![TokKind::KwAsync, TokKind::KwAwait, TokKind::KwReturn]
    );
    assert_eq!(kinds("asyncish"), vec![TokKind::Ident("asyncish".into())]);
}

#[test]
fn strings_support_both_quotes_and_escapes() {
    assert_eq!(kinds("'a\\'b'"), vec![TokKind::Str("a'b".into())]);
    assert_eq!(kinds("\"x\\ny\""), vec![TokKind::Str("x\ny".into())]);
}

#[test]
fn equality_tokens() {
    assert_eq!(
        kinds("a === b !== c == d != e"),
        vec![
            TokKind::Ident("a".into()),
            TokKind::EqEqEq,
            TokKind::Ident("b".into()),
            TokKind::NotEqEq,
            TokKind::Ident("c".into()),
            TokKind::EqEq,
            TokKind::Ident("d".into()),
            TokKind::NotEq,
            TokKind::Ident("e".into()),
        ]
    );
}

#[test]
fn numbers_with_fractions_and_exponents() {
    assert_eq!(kinds("1.5"), vec![TokKind::Number(1.5)]);
    assert_eq!(kinds("2e3"), vec![TokKind::Number(2000.0)]);
    assert_eq!(kinds("1.5e-2"), vec![TokKind::Number(0.015)]);
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        kinds("1 // trailing\n+ 2 /* block */ + 3"),
        vec![
            TokKind::Number(1.0),
            TokKind::Plus,
            TokKind::Number(2.0),
            TokKind::Plus,
            TokKind::Number(3.0),
        ]
    );
}

#[test]
fn spans_cover_the_source() {
    let tokens = lex("ab + cd").unwrap();
    assert_eq!(tokens[0].start, 0);
    assert_eq!(tokens[0].end, 2);
    assert_eq!(tokens[2].start, 5);
    assert_eq!(tokens[2].end, 7);
}

#[test]
fn unterminated_string_is_an_error() {
    assert!(lex("'oops").is_err());
}
