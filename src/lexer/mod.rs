pub mod token;

use logos::Logos;

use crate::diagnostics::CheckError;
use crate::span::{Span, Spanned};
use token::Token;

/// Tokenize a signature source string.
pub fn lex(source: &str) -> Result<Vec<Spanned<Token>>, CheckError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = Span::new(lexer.span().start, lexer.span().end);
        match result {
            Ok(tok) => tokens.push(Spanned::new(tok, span)),
            Err(()) => {
                return Err(CheckError::syntax(
                    format!("unexpected character '{}'", &source[lexer.span()]),
                    span,
                ));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_a_class_header() {
        let toks = lex("class Array[out T] < Object").unwrap();
        let kinds: Vec<Token> = toks.into_iter().map(|t| t.node).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Class,
                Token::UpperName("Array".to_string()),
                Token::LBracket,
                Token::Out,
                Token::UpperName("T".to_string()),
                Token::RBracket,
                Token::Lt,
                Token::UpperName("Object".to_string()),
            ]
        );
    }

    #[test]
    fn skips_comments() {
        let toks = lex("# heading\nend # trailing").unwrap();
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].node, Token::End);
    }

    #[test]
    fn interface_names_keep_the_underscore() {
        let toks = lex("_Each").unwrap();
        assert_eq!(toks[0].node, Token::InterfaceName("_Each".to_string()));
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(lex("class @Foo").is_err());
    }

    #[test]
    fn lexes_code_statements() {
        let toks = lex("let total = counter.add(1, 2.5, \"hi\", true, nil)").unwrap();
        let kinds: Vec<Token> = toks.into_iter().map(|t| t.node).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Let,
                Token::LowerName("total".to_string()),
                Token::Eq,
                Token::LowerName("counter".to_string()),
                Token::Dot,
                Token::LowerName("add".to_string()),
                Token::LParen,
                Token::Int(1),
                Token::Comma,
                Token::Float(2.5),
                Token::Comma,
                Token::Str("hi".to_string()),
                Token::Comma,
                Token::True,
                Token::Comma,
                Token::Nil,
                Token::RParen,
            ]
        );
    }
}
