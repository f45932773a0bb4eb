//! Per-language catalogs of extraction queries.
//!
//! Every fact query captures its value under a fixed name: `@name` for
//! declarations, `@path` for imports and packages, `@literal` for string
//! literals. Java imports also capture the whole declaration as `@import`
//! so wildcard imports can be recognised.

use std::collections::HashMap;

use super::FactKind;
use crate::error::Result;
use crate::grammar::Grammar;
use crate::language::Language;
use crate::query::Query;

const JAVA: &[(FactKind, &str)] = &[
    (
        FactKind::Classes,
        r#"
(class_declaration
  name: (identifier) @name)
"#,
    ),
    (
        FactKind::Methods,
        r#"
(method_declaration
  name: (identifier) @name)

(constructor_declaration
  name: (identifier) @name)
"#,
    ),
    (
        FactKind::Fields,
        r#"
; int a, b = 1;
(field_declaration
  declarator: (variable_declarator
    name: (identifier) @name)+)
"#,
    ),
    (
        FactKind::Imports,
        r#"
; import a.b.C; import static a.b.C.m; import a.b.*;
(import_declaration
  [(scoped_identifier) (identifier)] @path) @import
"#,
    ),
    (
        FactKind::Package,
        r#"
(package_declaration
  [(scoped_identifier) (identifier)] @path)
"#,
    ),
    (FactKind::StringLiterals, "(string_literal) @literal"),
];

const PYTHON: &[(FactKind, &str)] = &[
    (FactKind::Classes, "(class_definition name: (identifier) @name)"),
    (FactKind::Methods, "(function_definition name: (identifier) @name)"),
    (
        FactKind::Imports,
        r#"
; import a.b, c
(import_statement
  name: (dotted_name)+ @path)

; from a.b import c
(import_from_statement
  module_name: (dotted_name) @path)
"#,
    ),
    (FactKind::StringLiterals, "(string) @literal"),
];

const GO: &[(FactKind, &str)] = &[
    (FactKind::Classes, "(type_spec name: (type_identifier) @name)"),
    (
        FactKind::Methods,
        r#"
(function_declaration
  name: (identifier) @name)

(method_declaration
  name: (field_identifier) @name)
"#,
    ),
    (FactKind::Fields, "(field_declaration name: (field_identifier)+ @name)"),
    (
        FactKind::Imports,
        "(import_spec path: (interpreted_string_literal) @path)",
    ),
    (FactKind::Package, "(package_clause (package_identifier) @path)"),
    (
        FactKind::StringLiterals,
        "[(interpreted_string_literal) (raw_string_literal)] @literal",
    ),
];

const RUST: &[(FactKind, &str)] = &[
    (
        FactKind::Classes,
        r#"
(struct_item name: (type_identifier) @name)
(enum_item name: (type_identifier) @name)
(trait_item name: (type_identifier) @name)
"#,
    ),
    (FactKind::Methods, "(function_item name: (identifier) @name)"),
    (FactKind::Fields, "(field_declaration name: (field_identifier) @name)"),
    (FactKind::Imports, "(use_declaration argument: (_) @path)"),
    (
        FactKind::StringLiterals,
        "[(string_literal) (raw_string_literal)] @literal",
    ),
];

const JAVASCRIPT: &[(FactKind, &str)] = &[
    (FactKind::Classes, "(class_declaration name: (identifier) @name)"),
    (
        FactKind::Methods,
        r#"
(function_declaration
  name: (identifier) @name)

(method_definition
  name: (property_identifier) @name)
"#,
    ),
    (FactKind::Imports, "(import_statement source: (string) @path)"),
    (FactKind::StringLiterals, "(string) @literal"),
];

const TYPESCRIPT: &[(FactKind, &str)] = &[
    (
        FactKind::Classes,
        "(class_declaration name: (type_identifier) @name)",
    ),
    (
        FactKind::Methods,
        r#"
(function_declaration
  name: (identifier) @name)

(method_definition
  name: (property_identifier) @name)
"#,
    ),
    (FactKind::Imports, "(import_statement source: (string) @path)"),
    (FactKind::StringLiterals, "(string) @literal"),
];

const C: &[(FactKind, &str)] = &[
    (FactKind::Classes, "(struct_specifier name: (type_identifier) @name)"),
    (
        FactKind::Methods,
        r#"
(function_definition
  declarator: (function_declarator
    declarator: (identifier) @name))
"#,
    ),
    (
        FactKind::Fields,
        "(field_declaration declarator: (field_identifier)+ @name)",
    ),
    (FactKind::Imports, "(preproc_include path: (_) @path)"),
    (FactKind::StringLiterals, "(string_literal) @literal"),
];

const CPP: &[(FactKind, &str)] = &[
    (
        FactKind::Classes,
        r#"
(class_specifier name: (type_identifier) @name)
(struct_specifier name: (type_identifier) @name)
"#,
    ),
    (
        FactKind::Methods,
        r#"
(function_definition
  declarator: (function_declarator
    declarator: (identifier) @name))

; Foo::bar() defined out of line
(function_definition
  declarator: (function_declarator
    declarator: (qualified_identifier
      name: (identifier) @name)))
"#,
    ),
    (
        FactKind::Fields,
        "(field_declaration declarator: (field_identifier)+ @name)",
    ),
    (FactKind::Imports, "(preproc_include path: (_) @path)"),
    (FactKind::StringLiterals, "(string_literal) @literal"),
];

const SCALA: &[(FactKind, &str)] = &[
    (
        FactKind::Classes,
        r#"
(class_definition name: (identifier) @name)
(object_definition name: (identifier) @name)
(trait_definition name: (identifier) @name)
"#,
    ),
    (FactKind::Methods, "(function_definition name: (identifier) @name)"),
];

const SWIFT: &[(FactKind, &str)] = &[
    (
        FactKind::Classes,
        "(class_declaration name: (type_identifier) @name)",
    ),
    (
        FactKind::Methods,
        "(function_declaration name: (simple_identifier) @name)",
    ),
    (FactKind::Imports, "(import_declaration (identifier) @path)"),
];

/// Query sources for `language`; empty when no catalog exists.
pub(crate) fn sources(language: Language) -> &'static [(FactKind, &'static str)] {
    match language {
        Language::Java => JAVA,
        Language::Python => PYTHON,
        Language::Go => GO,
        Language::Rust => RUST,
        Language::JavaScript => JAVASCRIPT,
        Language::TypeScript => TYPESCRIPT,
        Language::C => C,
        Language::Cpp => CPP,
        Language::Scala => SCALA,
        Language::Swift => SWIFT,
        Language::Kotlin
        | Language::CSharp
        | Language::Ruby
        | Language::Php
        | Language::Lua
        | Language::Bash => &[],
    }
}

/// A catalog compiled against one grammar.
#[derive(Debug)]
pub(crate) struct CompiledCatalog {
    language: Language,
    queries: HashMap<FactKind, Query>,
}

impl CompiledCatalog {
    pub(crate) fn compile(language: Language, grammar: &Grammar, max_pattern_depth: usize) -> Result<Self> {
        let mut queries = HashMap::new();
        for (kind, source) in sources(language) {
            let query = Query::with_max_depth(grammar, source, max_pattern_depth)?;
            queries.insert(*kind, query);
        }
        tracing::debug!(
            language = %language,
            grammar = grammar.name(),
            queries = queries.len(),
            "compiled extraction catalog"
        );
        Ok(Self { language, queries })
    }

    pub(crate) fn language(&self) -> Language {
        self.language
    }

    pub(crate) fn query(&self, kind: FactKind) -> Option<&Query> {
        self.queries.get(&kind)
    }
}
