use logos::Logos;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // Keywords
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("type")]
    Type,
    #[token("def")]
    Def,
    #[token("include")]
    Include,
    #[token("end")]
    End,
    #[token("singleton")]
    Singleton,
    #[token("top")]
    Top,
    #[token("bot")]
    Bot,
    #[token("any")]
    Any,
    #[token("in")]
    In,
    #[token("out")]
    Out,

    // Code-file keywords
    #[token("let")]
    Let,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("nil")]
    Nil,

    // Literals
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse().ok())]
    Float(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse().ok())]
    Int(i64),
    #[regex(r#""[^"\n]*""#, |lex| lex.slice().trim_matches('"').to_string())]
    Str(String),

    // Names. Interface names carry a leading underscore; alias names are
    // lowercase; everything else (classes, type variables) is uppercase.
    #[regex("_[A-Z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    InterfaceName(String),
    #[regex("[A-Z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    UpperName(String),
    #[regex("[a-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    LowerName(String),

    // Punctuation
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("<")]
    Lt,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("|")]
    Pipe,
    #[token("&")]
    Amp,
    #[token("^")]
    Caret,
    #[token("->")]
    Arrow,
    #[token("=")]
    Eq,
    #[token(".")]
    Dot,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Class => write!(f, "class"),
            Token::Interface => write!(f, "interface"),
            Token::Type => write!(f, "type"),
            Token::Def => write!(f, "def"),
            Token::Include => write!(f, "include"),
            Token::End => write!(f, "end"),
            Token::Singleton => write!(f, "singleton"),
            Token::Top => write!(f, "top"),
            Token::Bot => write!(f, "bot"),
            Token::Any => write!(f, "any"),
            Token::In => write!(f, "in"),
            Token::Out => write!(f, "out"),
            Token::Let => write!(f, "let"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Nil => write!(f, "nil"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::InterfaceName(s) | Token::UpperName(s) | Token::LowerName(s) => {
                write!(f, "{s}")
            }
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Lt => write!(f, "<"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Pipe => write!(f, "|"),
            Token::Amp => write!(f, "&"),
            Token::Caret => write!(f, "^"),
            Token::Arrow => write!(f, "->"),
            Token::Eq => write!(f, "="),
            Token::Dot => write!(f, "."),
        }
    }
}
