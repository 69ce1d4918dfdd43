//! Language analyzer registry.
//!
//! Central registration point for all language analyzers. The registry
//! is initialized once at startup and provides thread-safe access to
//! language-specific analyzers for the 8 languages in the "Code" family.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::Language;
use super::LanguageAnalyzer;

/// Global registry instance.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the global language analyzer registry.
pub fn global_registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Registry of language analyzers.
pub struct Registry {
    analyzers: HashMap<Language, Box<dyn LanguageAnalyzer>>,
}

impl Registry {
    /// Create a new registry with all supported languages registered.
    fn new() -> Self {
        let mut analyzers: HashMap<Language, Box<dyn LanguageAnalyzer>> = HashMap::new();

        analyzers.insert(Language::Python, Box::new(super::languages::python::PythonAnalyzer));
        analyzers.insert(Language::Rust, Box::new(super::languages::rust::RustAnalyzer));
        analyzers.insert(Language::TypeScript, Box::new(super::languages::typescript::TypeScriptAnalyzer));
        analyzers.insert(Language::JavaScript, Box::new(super::languages::javascript::JavaScriptAnalyzer));
        analyzers.insert(Language::Go, Box::new(super::languages::go::GoAnalyzer));
        analyzers.insert(Language::C, Box::new(super::languages::c::CAnalyzer));
        analyzers.insert(Language::Cpp, Box::new(super::languages::cpp::CppAnalyzer));
        analyzers.insert(Language::CSharp, Box::new(super::languages::csharp::CSharpAnalyzer));

        Self { analyzers }
    }

    /// Get the analyzer for a given language.
    pub fn get(&self, language: Language) -> Option<&dyn LanguageAnalyzer> {
        self.analyzers.get(&language).map(std::convert::AsRef::as_ref)
    }

    /// List all registered languages.
    pub fn languages(&self) -> Vec<Language> {
        self.analyzers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_code_family_languages() {
        let reg = global_registry();
        for lang in [
            Language::Python,
            Language::Rust,
            Language::TypeScript,
            Language::JavaScript,
            Language::Go,
            Language::C,
            Language::Cpp,
            Language::CSharp,
        ] {
            assert!(reg.get(lang).is_some(), "{lang} should be registered");
        }
    }

    #[test]
    fn registry_returns_none_for_unknown() {
        let reg = global_registry();
        assert!(reg.get(Language::Unknown).is_none());
        assert!(reg.get(Language::Markdown).is_none());
    }
}
