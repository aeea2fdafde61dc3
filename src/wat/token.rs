//! WebAssembly text format lexemes
//!
//! Raw fragments for the lexical atoms of the format. Identifiers and
//! keywords share one character set (`idchar`), so keyword recognition is
//! bounded by that set rather than by `\b`: `$func`, `funcs` and `my.func`
//! never contain the keyword `func`.

use crate::textmate::pattern::{
    alternative, last_whole_word, one_or_more, sequence, whole_word, Fragment,
};

pub const LEFT_PARENTHESIS: Fragment = Fragment::raw(r"\(");
pub const RIGHT_PARENTHESIS: Fragment = Fragment::raw(r"\)");
pub const QUOTE: Fragment = Fragment::raw("\"");
pub const DOT: Fragment = Fragment::raw(r"\.");
pub const AT: Fragment = Fragment::raw("@");
pub const LINE_COMMENT: Fragment = Fragment::raw(";;");
pub const BLOCK_COMMENT_START: Fragment = Fragment::raw(r"\(;");
pub const BLOCK_COMMENT_END: Fragment = Fragment::raw(r";\)");
/// A single-line block comment, skipped between `(` and a clause keyword.
pub const BLOCK_COMMENT: Fragment = Fragment::raw(r"\(;.*?;\)");
pub const WHITESPACE: Fragment = Fragment::raw(r"[ \t]");
pub const LINE_END: Fragment = Fragment::raw("$");

pub const IDCHAR: Fragment = Fragment::raw(r"[0-9A-Za-z!#$%&'*+\-./:<=>?@\\^_`|~]");

/// `\t \n \r \" \' \\`, two hex digits, or `\u{hex+}`.
pub const ESCAPE: Fragment = Fragment::raw(r#"\\(?:[0-9a-fA-F]{2}|u\{[0-9a-fA-F]+\}|[tnr"'\\])"#);

pub const HEX_NUM: Fragment = Fragment::raw("0x[0-9a-fA-F](?:_?[0-9a-fA-F])*");
pub const NUM: Fragment = Fragment::raw("[0-9](?:_?[0-9])*");

// Keywords
pub const MODULE: &str = "module";
pub const TYPE: &str = "type";
pub const FUNC: &str = "func";
pub const PARAM: &str = "param";
pub const RESULT: &str = "result";
pub const IMPORT: &str = "import";
pub const EXPORT: &str = "export";
pub const TABLE: &str = "table";
pub const MEMORY: &str = "memory";
pub const GLOBAL: &str = "global";
pub const MUT: &str = "mut";
pub const START: &str = "start";
pub const ELEM: &str = "elem";
pub const DATA: &str = "data";
pub const FUNCREF: &str = "funcref";
pub const CONST: &str = "const";

pub const VALUE_TYPES: [&str; 4] = ["i32", "i64", "f32", "f64"];

/// `word` as a keyword: not adjacent to any identifier character.
pub fn keyword(word: impl Into<Fragment>) -> Fragment {
    whole_word(word, &IDCHAR)
}

/// Zero-width anchor right after the last keyword `word` already consumed.
pub fn last_keyword(word: impl Into<Fragment>) -> Fragment {
    last_whole_word(word, &IDCHAR)
}

/// `$name`
pub fn identifier() -> Fragment {
    sequence([Fragment::raw(r"\$"), one_or_more(IDCHAR)])
}

/// Unsigned integer, hexadecimal before decimal so `0x..` is not cut at `0`.
pub fn unsigned_integer() -> Fragment {
    keyword(alternative([HEX_NUM, NUM]))
}

/// A numeric index or a symbolic identifier.
pub fn index() -> Fragment {
    alternative([unsigned_integer(), identifier()])
}

pub fn value_type() -> Fragment {
    keyword(alternative(VALUE_TYPES))
}
