//! Language registry: identifiers, grammar ids and grammar locators.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Programming languages known to the registry.
///
/// Not every language has a grammar linked into every build; asking the
/// engine for one that is missing yields `GrammarLoadFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Kotlin,
    JavaScript,
    TypeScript,
    Python,
    Rust,
    Go,
    C,
    Cpp,
    #[serde(rename = "c_sharp")]
    CSharp,
    Ruby,
    Php,
    Swift,
    Scala,
    Lua,
    Bash,
}

/// Number of variants in [`Language`].
pub const LANGUAGE_COUNT: usize = 16;

static ALL: [Language; LANGUAGE_COUNT] = [
    Language::Java,
    Language::Kotlin,
    Language::JavaScript,
    Language::TypeScript,
    Language::Python,
    Language::Rust,
    Language::Go,
    Language::C,
    Language::Cpp,
    Language::CSharp,
    Language::Ruby,
    Language::Php,
    Language::Swift,
    Language::Scala,
    Language::Lua,
    Language::Bash,
];

/// File extension (without dot) to language.
static EXTENSIONS: phf::Map<&'static str, Language> = phf::phf_map! {
    "java" => Language::Java,
    "kt" => Language::Kotlin,
    "kts" => Language::Kotlin,
    "js" => Language::JavaScript,
    "jsx" => Language::JavaScript,
    "mjs" => Language::JavaScript,
    "cjs" => Language::JavaScript,
    "ts" => Language::TypeScript,
    "mts" => Language::TypeScript,
    "cts" => Language::TypeScript,
    "py" => Language::Python,
    "pyi" => Language::Python,
    "rs" => Language::Rust,
    "go" => Language::Go,
    "c" => Language::C,
    "h" => Language::C,
    "cpp" => Language::Cpp,
    "cc" => Language::Cpp,
    "cxx" => Language::Cpp,
    "hpp" => Language::Cpp,
    "hh" => Language::Cpp,
    "cs" => Language::CSharp,
    "rb" => Language::Ruby,
    "php" => Language::Php,
    "swift" => Language::Swift,
    "scala" => Language::Scala,
    "sc" => Language::Scala,
    "lua" => Language::Lua,
    "sh" => Language::Bash,
    "bash" => Language::Bash,
};

impl Language {
    /// All registered languages, in declaration order.
    pub fn all() -> &'static [Language] {
        &ALL
    }

    /// Position of the variant in [`Language::all`]; used to index
    /// per-language caches.
    pub(crate) fn ordinal(self) -> usize {
        self as usize
    }

    /// The variant name, e.g. `"CSharp"`.
    pub fn name(self) -> &'static str {
        match self {
            Language::Java => "Java",
            Language::Kotlin => "Kotlin",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Python => "Python",
            Language::Rust => "Rust",
            Language::Go => "Go",
            Language::C => "C",
            Language::Cpp => "Cpp",
            Language::CSharp => "CSharp",
            Language::Ruby => "Ruby",
            Language::Php => "Php",
            Language::Swift => "Swift",
            Language::Scala => "Scala",
            Language::Lua => "Lua",
            Language::Bash => "Bash",
        }
    }

    /// Grammar identifier used in resource names.
    ///
    /// This is the lowercased variant name, except for:
    /// - `CSharp` -> `c_sharp`
    /// - `Cpp` -> `cpp`
    pub fn language_id(self) -> &'static str {
        match self {
            Language::CSharp => "c_sharp",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Kotlin => "kotlin",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::C => "c",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Scala => "scala",
            Language::Lua => "lua",
            Language::Bash => "bash",
        }
    }

    /// Locator handed to the grammar engine, e.g. `tree-sitter-c_sharp`.
    pub fn grammar_locator(self) -> String {
        format!("tree-sitter-{}", self.language_id())
    }

    /// Detect the language from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSIONS.get(ext.to_ascii_lowercase().as_str()).copied()
    }

    /// Detect the language from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// File extensions registered for this language.
    pub fn extensions(self) -> Vec<&'static str> {
        let mut exts: Vec<&'static str> = EXTENSIONS
            .entries()
            .filter(|(_, lang)| **lang == self)
            .map(|(ext, _)| *ext)
            .collect();
        exts.sort_unstable();
        exts
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.language_id())
    }
}

impl FromStr for Language {
    type Err = AnalysisError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_lowercase();
        let alias = match normalized.as_str() {
            "c#" | "csharp" | "cs" => Some(Language::CSharp),
            "c++" | "cplusplus" => Some(Language::Cpp),
            "js" => Some(Language::JavaScript),
            "ts" => Some(Language::TypeScript),
            "py" => Some(Language::Python),
            "rs" => Some(Language::Rust),
            "golang" => Some(Language::Go),
            "kt" => Some(Language::Kotlin),
            "sh" => Some(Language::Bash),
            "rb" => Some(Language::Ruby),
            _ => None,
        };
        if let Some(lang) = alias {
            return Ok(lang);
        }

        ALL.iter()
            .copied()
            .find(|lang| {
                lang.language_id() == normalized || lang.name().eq_ignore_ascii_case(&normalized)
            })
            .ok_or(AnalysisError::UnsupportedLanguage {
                name: input.trim().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_ids_are_lowercased_names_except_exceptions() {
        for lang in Language::all() {
            match lang {
                Language::CSharp => assert_eq!(lang.language_id(), "c_sharp"),
                Language::Cpp => assert_eq!(lang.language_id(), "cpp"),
                _ => assert_eq!(lang.language_id(), lang.name().to_lowercase()),
            }
        }
    }

    #[test]
    fn test_ordinals_match_all() {
        assert_eq!(Language::all().len(), LANGUAGE_COUNT);
        for (i, lang) in Language::all().iter().enumerate() {
            assert_eq!(lang.ordinal(), i);
        }
    }

    #[test]
    fn test_grammar_locator() {
        assert_eq!(Language::Java.grammar_locator(), "tree-sitter-java");
        assert_eq!(Language::CSharp.grammar_locator(), "tree-sitter-c_sharp");
    }

    #[test]
    fn test_from_str_accepts_names_ids_and_aliases() {
        assert_eq!("java".parse::<Language>().unwrap(), Language::Java);
        assert_eq!("JavaScript".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("C#".parse::<Language>().unwrap(), Language::CSharp);
        assert_eq!("c_sharp".parse::<Language>().unwrap(), Language::CSharp);
        assert_eq!(" c++ ".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("golang".parse::<Language>().unwrap(), Language::Go);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        let err = "cobol".parse::<Language>().unwrap_err();
        assert_eq!(
            err,
            AnalysisError::UnsupportedLanguage {
                name: "cobol".to_string()
            }
        );
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path(Path::new("src/Main.java")), Some(Language::Java));
        assert_eq!(Language::from_path(Path::new("lib.RS")), Some(Language::Rust));
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
        assert_eq!(Language::from_path(Path::new("notes.md")), None);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(Language::Java.extensions(), vec!["java"]);
        assert!(Language::Cpp.extensions().contains(&"hpp"));
    }

    #[test]
    fn test_serde_uses_language_id() {
        let json = serde_json::to_string(&Language::CSharp).unwrap();
        assert_eq!(json, "\"c_sharp\"");
        let lang: Language = serde_json::from_str("\"javascript\"").unwrap();
        assert_eq!(lang, Language::JavaScript);
    }
}
