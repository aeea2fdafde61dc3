//! WebAssembly text format rule graph
//!
//! The graph is a recursive descent over balanced parentheses written as
//! named regions. Every parenthesized construct is a *clause*: a region
//! opened by `(` plus its keyword and closed by the matching `)`. A clause
//! lists its own sub-clauses as children and, last of all, the generic
//! balanced [`SEXPR`] rule, so a nested form the grammar does not describe
//! still keeps the enclosing region balanced.
//!
//! Module fields are reached through an explicit dispatcher, [`MODULE_FIELD`],
//! which lists every field kind as a flat table. Dispatch lists are ordered
//! specific before general:
//!
//! 1. `extra` (comments and annotations) first, at every nesting level
//! 2. keyword clauses and typed atoms
//! 3. generic identifiers and the generic [`SEXPR`] last
//!
//! Constructs whose patterns are not yet described are registered as
//! placeholders (see [`PLACEHOLDERS`]) so every site that will hold them is
//! already wired.

use super::token::{self, keyword, last_keyword};
use crate::textmate::error::GrammarError;
use crate::textmate::pattern::{
    alternative, capture, look_ahead, look_behind, one_or_more, optional, sequence, set,
    zero_or_more, Fragment,
};
use crate::textmate::repository::RepositoryBuilder;
use crate::textmate::rule::{include, MatchRule, Pattern, RegionRule, Rule};

/// Root dispatcher the entry pattern list includes.
pub const ROOT: &str = "PARSE";
pub const MODULE_FIELD: &str = "moduleField";
pub const SEXPR: &str = "sexpr";

/// Field keyword and the rule the dispatcher selects for it, in dispatch order.
pub const MODULE_FIELDS: [(&str, &str); 10] = [
    (token::DATA, "moduleFieldData"),
    (token::ELEM, "moduleFieldElem"),
    (token::EXPORT, "moduleFieldExport"),
    (token::FUNC, "moduleFieldFunc"),
    (token::GLOBAL, "moduleFieldGlobal"),
    (token::IMPORT, "moduleFieldImport"),
    (token::MEMORY, "moduleFieldMemory"),
    (token::START, "moduleFieldStart"),
    (token::TABLE, "moduleFieldTable"),
    (token::TYPE, "moduleFieldType"),
];

/// Declared constructs without patterns yet.
pub const PLACEHOLDERS: [&str; 8] = [
    "expr",
    "funcLocals",
    "importDesc",
    "instrList",
    "literal",
    "literalNAN",
    "tableFieldsElem",
    "typeUse",
];

const BRACE: &str = "meta.brace.round.wasm";

/// Entry patterns of the grammar.
pub fn entry() -> Vec<Pattern> {
    vec![include(ROOT)]
}

/// Register the complete rule graph.
pub fn register(builder: &mut RepositoryBuilder) -> Result<(), GrammarError> {
    builder
        .register(
            ROOT,
            Rule::any_of([
                include("extra"),
                include("module"),
                include(MODULE_FIELD),
                include(SEXPR),
                include("unexpectedParen"),
            ]),
        )?
        .register(
            "unexpectedParen",
            MatchRule::new(token::RIGHT_PARENTHESIS).scope("invalid.illegal.unexpected-paren.wasm"),
        )?;

    register_lexical(builder)?;
    register_types(builder)?;
    register_module(builder)?;
    register_fields(builder)?;
    register_clauses(builder)?;

    for name in PLACEHOLDERS {
        builder.register(name, Rule::placeholder())?;
    }
    Ok(())
}

/// `(` and `keyword`, possibly separated by blanks and block comments.
///
/// Captures: 1 the parenthesis, 2 the keyword.
fn clause_begin(word: impl Into<Fragment>) -> Fragment {
    sequence([
        capture(token::LEFT_PARENTHESIS),
        zero_or_more(alternative([token::WHITESPACE, token::BLOCK_COMMENT])),
        capture(keyword(word)),
    ])
}

/// A parenthesized clause introduced by `word`.
fn clause(word: impl Into<Fragment>, keyword_scope: &str) -> RegionRule {
    RegionRule::new(clause_begin(word), token::RIGHT_PARENTHESIS)
        .begin_capture(1, BRACE)
        .begin_capture(2, keyword_scope)
        .end_capture(0, BRACE)
}

/// The identifier written right after the last `word` keyword.
fn name_after(word: &'static str, scope: &str) -> MatchRule {
    MatchRule::new(sequence([
        last_keyword(word),
        zero_or_more(token::WHITESPACE),
        capture(token::identifier()),
    ]))
    .capture(1, scope)
}

/// A double-quoted literal tagged `scope`, closed at the end of the line.
fn quoted(scope: &str) -> RegionRule {
    RegionRule::new(token::QUOTE, string_end())
        .scope(scope)
        .begin_capture(0, "punctuation.definition.string.begin.wasm")
        .end_capture(1, "punctuation.definition.string.end.wasm")
        .end_capture(2, "invalid.illegal.newline.wasm")
        .patterns([include("stringCharacterEscape")])
}

/// The closing quote, or for an unterminated string the last character of
/// the line, falling back to the line's newline when nothing follows.
fn string_end() -> Fragment {
    alternative([
        capture(token::QUOTE),
        capture(alternative([
            sequence([set([r"^\n"]), token::LINE_END]),
            Fragment::raw(r"\n"),
        ])),
    ])
}

/// The module name of an import, anchored right after the keyword when a
/// quote follows. An unterminated module name ends at `)`.
fn import_module_name() -> RegionRule {
    let blank = alternative([token::WHITESPACE, token::BLOCK_COMMENT]);
    RegionRule::new(
        sequence([
            last_keyword(token::IMPORT),
            look_ahead(sequence([zero_or_more(blank), token::QUOTE])),
        ]),
        alternative([
            look_behind(token::QUOTE),
            look_ahead(token::RIGHT_PARENTHESIS),
        ]),
    )
    .patterns([
        include("extra"),
        Pattern::from(quoted("entity.name.type.module.wasm")),
    ])
}

fn register_lexical(builder: &mut RepositoryBuilder) -> Result<(), GrammarError> {
    builder
        .register(
            "extra",
            Rule::any_of([include("comment"), include("annotation")]),
        )?
        .register(
            "comment",
            Rule::any_of([include("lineComment"), include("blockComment")]),
        )?
        .register(
            "lineComment",
            RegionRule::new(
                sequence([
                    optional(capture(sequence([
                        Fragment::raw("^"),
                        one_or_more(token::WHITESPACE),
                    ]))),
                    capture(capture(token::LINE_COMMENT)),
                ]),
                look_ahead(token::LINE_END),
            )
            .scope("meta.comment.line.wasm")
            .content_scope("comment.line.double-semicolon.wasm")
            .begin_capture(1, "punctuation.whitespace.comment.leading.wasm")
            .begin_capture(2, "comment.line.double-semicolon.wasm")
            .begin_capture(3, "punctuation.definition.comment.wasm"),
        )?
        // Block comments nest
        .register(
            "blockComment",
            RegionRule::new(
                capture(token::BLOCK_COMMENT_START),
                capture(token::BLOCK_COMMENT_END),
            )
            .scope("meta.comment.block.wasm comment.block.wasm")
            .delimiter_capture(1, "punctuation.definition.comment.wasm")
            .patterns([include("blockComment")]),
        )?
        .register(
            "annotation",
            RegionRule::new(
                sequence([token::LEFT_PARENTHESIS, look_ahead(token::AT)]),
                token::RIGHT_PARENTHESIS,
            )
            .scope("meta.annotation.wasm")
            .content_scope("comment.wasm")
            .delimiter_capture(
                0,
                "meta.brace.round.annotation.wasm punctuation.definition.tag",
            )
            .patterns([
                Pattern::from(
                    MatchRule::new(sequence([
                        look_behind(token::LEFT_PARENTHESIS),
                        capture(token::AT),
                        capture(one_or_more(token::IDCHAR)),
                    ]))
                    .capture(
                        1,
                        "meta.annotation.name.wasm punctuation.definition.tag.wasm",
                    )
                    .capture(2, "entity.name.tag.annotation.wasm"),
                ),
                include("annotationPart"),
            ]),
        )?
        .register(
            "annotationPart",
            Rule::any_of([
                include("comment"),
                include("annotationParens"),
                include("string"),
            ]),
        )?
        .register(
            "annotationParens",
            RegionRule::new(token::LEFT_PARENTHESIS, token::RIGHT_PARENTHESIS)
                .delimiter_capture(0, "meta.brace.round.annotation.wasm")
                .patterns([include("annotationPart")]),
        )?
        .register("string", quoted("string.quoted.double.wasm"))?
        .register(
            "stringCharacterEscape",
            MatchRule::new(token::ESCAPE).scope("constant.character.escape.wasm"),
        )?;
    Ok(())
}

fn register_types(builder: &mut RepositoryBuilder) -> Result<(), GrammarError> {
    builder
        .register(
            "valueType",
            MatchRule::new(token::value_type()).scope("storage.type.wasm"),
        )?
        .register(
            "elemType",
            MatchRule::new(keyword(token::FUNCREF)).scope("storage.type.wasm"),
        )?
        .register(
            "limits",
            MatchRule::new(token::unsigned_integer()).scope("constant.numeric.integer.wasm"),
        )?
        .register(
            "tableType",
            Rule::any_of([include("limits"), include("elemType")]),
        )?
        .register(
            "globalType",
            Rule::any_of([include("globalTypeMut"), include("globalTypeImm")]),
        )?
        .register("globalTypeImm", Rule::any_of([include("valueType")]))?
        .register(
            "globalTypeMut",
            clause(token::MUT, "storage.modifier.wasm")
                .patterns([include("extra"), include("valueType"), include(SEXPR)]),
        )?
        .register(
            "funcType",
            Rule::any_of([include("funcTypeParams"), include("funcTypeResults")]),
        )?
        .register(
            "funcTypeParams",
            clause(token::PARAM, "keyword.control.param.wasm").patterns([
                include("extra"),
                MatchRule::new(token::identifier())
                    .scope("entity.name.type.alias.wasm")
                    .into(),
                include("valueType"),
                include(SEXPR),
            ]),
        )?
        .register(
            "funcTypeResults",
            clause(token::RESULT, "keyword.control.param.wasm").patterns([
                include("extra"),
                include("valueType"),
                include(SEXPR),
            ]),
        )?;
    Ok(())
}

fn register_module(builder: &mut RepositoryBuilder) -> Result<(), GrammarError> {
    builder
        .register(
            "module",
            clause(token::MODULE, "storage.type.module.wasm")
                .scope("meta.module.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::MODULE, "entity.name.type.module.wasm").into(),
                    include(MODULE_FIELD),
                    include(SEXPR),
                ]),
        )?
        .register(
            MODULE_FIELD,
            Rule::any_of(
                std::iter::once(include("extra"))
                    .chain(MODULE_FIELDS.iter().map(|(_, rule)| include(*rule))),
            ),
        )?;
    Ok(())
}

fn register_fields(builder: &mut RepositoryBuilder) -> Result<(), GrammarError> {
    builder
        .register(
            "moduleFieldData",
            clause(token::DATA, "storage.type.data.wasm")
                .scope("meta.data.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::DATA, "variable.other.constant entity.name.data.wasm").into(),
                    include("string"),
                    include("expr"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldElem",
            clause(token::ELEM, "storage.type.elem.wasm")
                .scope("meta.elem.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::ELEM, "variable.other.constant entity.name.elem.wasm").into(),
                    MatchRule::new(token::index())
                        .scope("entity.name.function.wasm")
                        .into(),
                    include("expr"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldExport",
            clause(token::EXPORT, "keyword.control.export.wasm")
                .scope("meta.export.wasm")
                .patterns([
                    include("extra"),
                    include("exportName"),
                    include("exportDesc"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldFunc",
            clause(token::FUNC, "storage.type.function.wasm")
                .scope("meta.func.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::FUNC, "entity.name.function.wasm").into(),
                    include("inlineExport"),
                    include("inlineImport"),
                    include("typeUse"),
                    include("funcType"),
                    include("funcLocals"),
                    include("expr"),
                    include("instrList"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldGlobal",
            clause(token::GLOBAL, "storage.type.global.wasm")
                .scope("meta.global.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::GLOBAL, "variable.other.global.wasm").into(),
                    include("inlineExport"),
                    include("inlineImport"),
                    include("globalType"),
                    include("expr"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldImport",
            clause(token::IMPORT, "keyword.control.import.wasm")
                .scope("meta.import.wasm")
                .patterns([
                    include("extra"),
                    include("inlineImportNames"),
                    include("importDesc"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldMemory",
            clause(token::MEMORY, "storage.type.memory.wasm")
                .scope("meta.memory.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::MEMORY, "variable.other.memory.wasm").into(),
                    include("inlineExport"),
                    include("inlineImport"),
                    include("limits"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldStart",
            clause(token::START, "keyword.control.start.wasm")
                .scope("meta.start.wasm")
                .patterns([
                    include("extra"),
                    MatchRule::new(token::index())
                        .scope("entity.name.function.wasm")
                        .into(),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldTable",
            clause(token::TABLE, "storage.type.table.wasm")
                .scope("meta.table.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::TABLE, "variable.other.table.wasm").into(),
                    include("inlineExport"),
                    include("inlineImport"),
                    include("tableFieldsElem"),
                    include("tableType"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "moduleFieldType",
            clause(token::TYPE, "storage.type.type.wasm")
                .scope("meta.type.wasm")
                .patterns([
                    include("extra"),
                    name_after(token::TYPE, "entity.name.type.alias.wasm").into(),
                    include("typeField"),
                    include(SEXPR),
                ]),
        )?;
    Ok(())
}

fn register_clauses(builder: &mut RepositoryBuilder) -> Result<(), GrammarError> {
    builder
        .register(
            "typeField",
            clause(token::FUNC, "storage.type.function.wasm")
                .patterns([include("extra"), include("funcType"), include(SEXPR)]),
        )?
        .register(
            "inlineExport",
            clause(token::EXPORT, "keyword.control.export.wasm")
                .scope("meta.export.wasm")
                .patterns([include("extra"), include("exportName"), include(SEXPR)]),
        )?
        .register("exportName", quoted("variable.other.readwrite.alias.wasm"))?
        .register(
            "exportDesc",
            clause(
                alternative([token::FUNC, token::TABLE, token::MEMORY, token::GLOBAL]),
                "storage.type.wasm",
            )
            .patterns([
                include("extra"),
                MatchRule::new(token::index())
                    .scope("variable.other.index.wasm")
                    .into(),
                include(SEXPR),
            ]),
        )?
        .register(
            "inlineImport",
            clause(token::IMPORT, "keyword.control.import.wasm")
                .scope("meta.import.wasm")
                .patterns([
                    include("extra"),
                    include("inlineImportNames"),
                    include(SEXPR),
                ]),
        )?
        .register(
            "inlineImportNames",
            Rule::any_of([Pattern::from(import_module_name()), include("exportName")]),
        )?
        .register(
            "identifier",
            MatchRule::new(token::identifier()).scope("variable.other.wasm"),
        )?
        .register(
            "instrPlainConst",
            MatchRule::new(keyword(sequence([
                capture(alternative([
                    capture(sequence([Fragment::raw("i"), alternative(["32", "64"])])),
                    capture(sequence([Fragment::raw("f"), alternative(["32", "64"])])),
                ])),
                capture(token::DOT),
                capture(token::CONST),
            ])))
            .capture(2, "storage.type.int.wasm")
            .capture(3, "storage.type.float.wasm")
            .capture(4, "punctuation.accessor.wasm")
            .capture(5, "keyword.control.const.wasm"),
        )?
        .register(
            SEXPR,
            RegionRule::new(token::LEFT_PARENTHESIS, token::RIGHT_PARENTHESIS)
                .delimiter_capture(0, BRACE)
                .patterns([
                    include("extra"),
                    include("string"),
                    include("instrPlainConst"),
                    include("literal"),
                    include("literalNAN"),
                    include("identifier"),
                    include(SEXPR),
                ]),
        )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textmate::repository::Repository;
    use crate::wat::metadata;
    use fancy_regex::Regex;

    fn repository() -> Repository {
        let mut builder = RepositoryBuilder::new(metadata());
        register(&mut builder).unwrap();
        builder.build(entry()).unwrap()
    }

    fn begin_of(repo: &Repository, name: &str) -> Regex {
        match repo.get(name) {
            Some(Rule::Region(region)) => Regex::new(region.begin.as_str()).unwrap(),
            other => panic!("{} is not a region: {:?}", name, other),
        }
    }

    #[test]
    fn test_clause_begin_captures_paren_and_keyword() {
        let repo = repository();
        let regex = begin_of(&repo, "moduleFieldFunc");
        let caps = regex.captures("( (;x;) func $f").unwrap().unwrap();
        assert_eq!(caps.get(1).map(|m| m.as_str()), Some("("));
        assert_eq!(caps.get(2).map(|m| m.as_str()), Some("func"));
        assert!(!regex.is_match("(funcs").unwrap());
        assert!(!regex.is_match("($func").unwrap());
    }

    #[test]
    fn test_string_end_alternatives() {
        let end = Regex::new(string_end().as_str()).unwrap();
        let caps = end.captures("abc\"").unwrap().unwrap();
        assert_eq!(caps.get(1).map(|m| m.start()), Some(3));

        let end = Regex::new(&format!("(?m){}", string_end())).unwrap();
        let caps = end.captures("abc\n").unwrap().unwrap();
        assert!(caps.get(1).is_none());
        assert_eq!(caps.get(2).map(|m| m.as_str()), Some("c"));

        let caps = end.captures("abc\\\n").unwrap().unwrap();
        assert_eq!(caps.get(2).map(|m| m.as_str()), Some("\\"));

        let caps = end.captures("\n").unwrap().unwrap();
        assert_eq!(caps.get(2).map(|m| m.as_str()), Some("\n"));
    }

    #[test]
    fn test_instr_plain_const_groups() {
        let repo = repository();
        let Some(Rule::Match(rule)) = repo.get("instrPlainConst") else {
            panic!("instrPlainConst is not a match rule");
        };
        let regex = Regex::new(rule.pattern.as_str()).unwrap();
        let caps = regex.captures("(f64.const 1)").unwrap().unwrap();
        assert!(caps.get(2).is_none());
        assert_eq!(caps.get(3).map(|m| m.as_str()), Some("f64"));
        assert_eq!(caps.get(4).map(|m| m.as_str()), Some("."));
        assert_eq!(caps.get(5).map(|m| m.as_str()), Some("const"));
        assert!(!regex.is_match("i32.constant").unwrap());
    }

    #[test]
    fn test_dispatcher_lists_extra_then_every_field() {
        let repo = repository();
        let Some(dispatcher) = repo.get(MODULE_FIELD) else {
            panic!("{} is not registered", MODULE_FIELD);
        };
        let children: Vec<_> = dispatcher
            .children()
            .iter()
            .filter_map(Pattern::reference)
            .collect();
        assert_eq!(children.len(), MODULE_FIELDS.len() + 1);
        assert_eq!(children[0], "extra");
        for (_, rule) in MODULE_FIELDS {
            assert!(children.contains(&rule), "dispatcher misses {}", rule);
        }
    }

    #[test]
    fn test_sexpr_is_last_in_every_clause() {
        let repo = repository();
        for (name, rule) in repo.rules() {
            if let Rule::Region(region) = rule {
                if region.begin.as_str().starts_with(r"(\()") {
                    let last = region.patterns.last().and_then(Pattern::reference);
                    assert_eq!(last, Some(SEXPR), "{} does not end with sexpr", name);
                }
            }
        }
    }
}
