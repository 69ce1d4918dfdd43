//! AST parsing subsystem using tree-sitter.
//!
//! Provides language-agnostic AST parsing with per-language structural
//! extractors. Each supported language registers an analyzer that maps
//! tree-sitter AST nodes to `StructuralElement`s, which the `chunker`
//! turns into `Chunk`s.
//!
//! ```text
//! Source File -> Language Detection -> tree-sitter Grammar
//!            -> Parse -> CST
//!            -> Structural Extraction -> Vec<StructuralElement>
//! ```
//!
//! The parser is stateless and safe to invoke from multiple threads.

pub mod registry;
pub mod languages;

use std::path::Path;

use crate::error::{ConexusError, ConexusResult};
use crate::types::{ChunkKind, Language};

/// A structural element extracted from an AST: a function, type
/// declaration, or other top-level construct the chunker treats as an
/// atomic unit.
#[derive(Debug, Clone)]
pub struct StructuralElement {
    /// Fully qualified name of this element (module-prefixed).
    pub symbol_path: String,
    /// Short name (last component of `symbol_path`).
    pub name: String,
    /// What kind of chunk this element should become.
    pub kind: ChunkKind,
    /// Starting line (1-indexed).
    pub line_start: u32,
    /// Ending line (1-indexed, inclusive).
    pub line_end: u32,
    /// Raw source code of this element.
    pub content: String,
    /// Extracted doc comment, if present.
    pub doc_comment: Option<String>,
}

/// Trait that each language analyzer must implement.
pub trait LanguageAnalyzer: Send + Sync {
    /// Returns the language identifier (e.g., "python", "rust").
    fn language_id(&self) -> &str;

    /// Returns the tree-sitter `Language` for this analyzer.
    fn tree_sitter_language(&self) -> tree_sitter::Language;

    /// Extract structural elements from a parsed tree.
    fn extract_structure(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> Vec<StructuralElement>;
}

/// Derive a module name from a file path: stem only, `/`-joined for
/// nested paths relative to the repository root.
pub fn build_module_name_from_path(file_path: &Path) -> String {
    file_path
        .with_extension("")
        .to_string_lossy()
        .replace('\\', "/")
}

/// Parse a source file and extract its structural elements.
///
/// 1. Looks up the registered analyzer for `language`.
/// 2. Parses `source` with that analyzer's tree-sitter grammar.
/// 3. Extracts structural elements from the resulting tree.
pub fn parse_file(
    file_path: &Path,
    source: &[u8],
    language: Language,
) -> ConexusResult<Vec<StructuralElement>> {
    let registry = registry::global_registry();

    let analyzer = registry.get(language).ok_or_else(|| ConexusError::InvalidParams {
        message: format!("no analyzer registered for language: {language}"),
    })?;

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&analyzer.tree_sitter_language())
        .map_err(|e| ConexusError::internal(format!("failed to set tree-sitter language: {e}")))?;

    let tree = parser.parse(source, None).ok_or_else(|| {
        ConexusError::internal(format!(
            "tree-sitter returned no tree for {} (parse timeout or cancellation)",
            file_path.display()
        ))
    })?;

    Ok(analyzer.extract_structure(&tree, source, file_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_file_unknown_language_returns_error() {
        let result = parse_file(Path::new("test.xyz"), b"hello world", Language::Unknown);
        assert!(result.is_err());
    }
}
