//! Rust structural extractor.
//!
//! Extracts functions, structs, enums, traits, impls, constants, type
//! aliases, and modules from Rust source using tree-sitter. Per
//! `spec.md` §4.3, the Code family splits on top-level declarations with
//! each chunk carrying its full signature through the closing delimiter;
//! the language-specific node kinds below all collapse onto the two Code
//! chunk kinds the store understands: `Function` for callables, `Struct`
//! for every other top-level declaration (types, traits, impls, consts,
//! modules).
//!
//! ## Rust AST node kinds (tree-sitter-rust)
//!
//! - `function_item` -> Function
//! - `struct_item` / `enum_item` / `trait_item` / `type_item` -> Struct
//! - `impl_item` -> Struct
//! - `const_item` / `static_item` -> Struct
//! - `mod_item` -> Struct (body recursed into with the module as scope)

use std::path::Path;

use crate::parser::{LanguageAnalyzer, StructuralElement};
use crate::types::ChunkKind;

/// Analyzer for Rust source files.
pub struct RustAnalyzer;

impl LanguageAnalyzer for RustAnalyzer {
    fn language_id(&self) -> &str {
        "rust"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_rust::LANGUAGE.into()
    }

    fn extract_structure(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> Vec<StructuralElement> {
        let mut elements = Vec::new();
        let module_name = file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("mod");

        let root = tree.root_node();
        self.walk_node(root, source, module_name, &[], &mut elements);
        elements
    }
}

impl RustAnalyzer {
    /// Recursively walk the AST and extract structural elements.
    fn walk_node(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
        elements: &mut Vec<StructuralElement>,
    ) {
        let mut cursor = node.walk();

        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_item" => {
                    if let Some(elem) = self.extract_function(child, source, module_name, scope_path) {
                        elements.push(elem);
                    }
                }
                "struct_item" | "enum_item" | "trait_item" | "type_item" => {
                    if let Some(elem) = self.extract_type_def(child, source, module_name, scope_path) {
                        let mut inner_scope = scope_path.to_vec();
                        inner_scope.push(elem.name.clone());
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_node(body, source, module_name, &inner_scope, elements);
                        }
                        elements.push(elem);
                    }
                }
                "impl_item" => {
                    if let Some(elem) = self.extract_impl(child, source, module_name, scope_path) {
                        let mut inner_scope = scope_path.to_vec();
                        inner_scope.push(elem.name.clone());
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_node(body, source, module_name, &inner_scope, elements);
                        }
                        elements.push(elem);
                    }
                }
                "const_item" | "static_item" => {
                    if let Some(elem) = self.extract_const(child, source, module_name, scope_path) {
                        elements.push(elem);
                    }
                }
                "mod_item" => {
                    self.handle_mod_item(child, source, module_name, scope_path, elements);
                }
                "attribute_item" => {
                    // Standalone attributes are read contextually, not emitted.
                }
                _ => {
                    if child.child_count() > 0 && child.kind() != "string_literal" {
                        self.walk_node(child, source, module_name, scope_path, elements);
                    }
                }
            }
        }
    }

    /// Extract a function or method definition.
    fn extract_function(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
    ) -> Option<StructuralElement> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(name_node, source).to_string();
        let symbol_path = build_symbol_path(module_name, scope_path, &name);
        let doc_comment = extract_rust_doc_comment(node, source);

        Some(StructuralElement {
            symbol_path,
            name,
            kind: ChunkKind::Function,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            content: node_text(node, source).to_string(),
            doc_comment,
        })
    }

    /// Extract a struct, enum, trait, or type alias definition.
    fn extract_type_def(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
    ) -> Option<StructuralElement> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(name_node, source).to_string();
        let symbol_path = build_symbol_path(module_name, scope_path, &name);
        let doc_comment = extract_rust_doc_comment(node, source);

        Some(StructuralElement {
            symbol_path,
            name,
            kind: ChunkKind::Struct,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            content: node_text(node, source).to_string(),
            doc_comment,
        })
    }

    /// Extract an `impl` block.
    fn extract_impl(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
    ) -> Option<StructuralElement> {
        let type_node = node.child_by_field_name("type")?;
        let type_name = node_text(type_node, source).to_string();

        let name = if let Some(trait_node) = node.child_by_field_name("trait") {
            let trait_name = node_text(trait_node, source);
            format!("impl {trait_name} for {type_name}")
        } else {
            format!("impl {type_name}")
        };

        let symbol_path = build_symbol_path(module_name, scope_path, &name);

        Some(StructuralElement {
            symbol_path,
            name,
            kind: ChunkKind::Struct,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            content: node_text(node, source).to_string(),
            doc_comment: None,
        })
    }

    /// Extract a const/static item.
    fn extract_const(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
    ) -> Option<StructuralElement> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(name_node, source).to_string();
        let symbol_path = build_symbol_path(module_name, scope_path, &name);
        let doc_comment = extract_rust_doc_comment(node, source);

        Some(StructuralElement {
            symbol_path,
            name,
            kind: ChunkKind::Struct,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            content: node_text(node, source).to_string(),
            doc_comment,
        })
    }

    /// Handle a `mod` item -- might be inline (`mod x { ... }`) or external (`mod x;`).
    fn handle_mod_item(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
        elements: &mut Vec<StructuralElement>,
    ) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return;
        };
        let name = node_text(name_node, source).to_string();
        let symbol_path = build_symbol_path(module_name, scope_path, &name);

        elements.push(StructuralElement {
            symbol_path,
            name: name.clone(),
            kind: ChunkKind::Struct,
            line_start: node.start_position().row as u32 + 1,
            line_end: node.end_position().row as u32 + 1,
            content: node_text(node, source).to_string(),
            doc_comment: extract_rust_doc_comment(node, source),
        });

        if let Some(body) = node.child_by_field_name("body") {
            let mut inner_scope = scope_path.to_vec();
            inner_scope.push(name);
            self.walk_node(body, source, module_name, &inner_scope, elements);
        }
    }
}

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Get the text content of a tree-sitter node.
fn node_text<'a>(node: tree_sitter::Node<'_>, source: &'a [u8]) -> &'a str {
    let start = node.start_byte();
    let end = node.end_byte();
    std::str::from_utf8(&source[start..end]).unwrap_or("")
}

/// Build a fully-qualified symbol path.
fn build_symbol_path(module_name: &str, scope_path: &[String], name: &str) -> String {
    let mut parts = vec![module_name.to_string()];
    parts.extend_from_slice(scope_path);
    parts.push(name.to_string());
    parts.join("::")
}

/// Extract doc comments (`///` and `//!`) preceding a node.
fn extract_rust_doc_comment(node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
    let mut doc_lines = Vec::new();
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        let text = node_text(sibling, source).trim();

        if let Some(line) = text.strip_prefix("///") {
            doc_lines.push(line.trim().to_string());
            current = sibling.prev_sibling();
        } else if let Some(line) = text.strip_prefix("//!") {
            doc_lines.push(line.trim().to_string());
            current = sibling.prev_sibling();
        } else if sibling.kind() == "attribute_item" {
            current = sibling.prev_sibling();
        } else {
            break;
        }
    }

    if doc_lines.is_empty() {
        return None;
    }

    doc_lines.reverse();
    Some(doc_lines.join("\n"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file;
    use crate::types::Language;
    use std::path::Path;

    fn parse_rust(source: &str) -> Vec<StructuralElement> {
        parse_file(Path::new("test.rs"), source.as_bytes(), Language::Rust)
            .expect("parse should succeed")
    }

    #[test]
    fn test_simple_function() {
        let src = r#"
fn hello(name: &str) -> String {
    format!("Hello, {}!", name)
}
"#;
        let elements = parse_rust(src);
        let func = elements.iter().find(|e| e.name == "hello").expect("hello");
        assert_eq!(func.kind, ChunkKind::Function);
    }

    #[test]
    fn test_struct() {
        let src = r#"
/// A configuration object.
pub struct Config {
    pub name: String,
    port: u16,
}
"#;
        let elements = parse_rust(src);
        let s = elements.iter().find(|e| e.name == "Config").expect("Config");
        assert_eq!(s.kind, ChunkKind::Struct);
        assert_eq!(s.doc_comment.as_deref(), Some("A configuration object."));
    }

    #[test]
    fn test_enum() {
        let src = r#"
pub enum Color {
    Red,
    Green,
    Blue,
}
"#;
        let elements = parse_rust(src);
        let e = elements.iter().find(|e| e.name == "Color").expect("Color");
        assert_eq!(e.kind, ChunkKind::Struct);
    }

    #[test]
    fn test_trait() {
        let src = r#"
pub trait Drawable {
    fn draw(&self);
    fn area(&self) -> f64;
}
"#;
        let elements = parse_rust(src);
        let t = elements.iter().find(|e| e.name == "Drawable").expect("Drawable");
        assert_eq!(t.kind, ChunkKind::Struct);
    }

    #[test]
    fn test_impl_block() {
        let src = r#"
impl Config {
    pub fn new() -> Self {
        Config { name: String::new(), port: 8080 }
    }

    fn validate(&self) -> bool {
        true
    }
}
"#;
        let elements = parse_rust(src);

        let imp = elements.iter().find(|e| e.name == "impl Config").expect("impl Config");
        assert_eq!(imp.kind, ChunkKind::Struct);

        assert!(elements.iter().any(|e| e.name == "new" && e.kind == ChunkKind::Function));
        assert!(elements.iter().any(|e| e.name == "validate" && e.kind == ChunkKind::Function));
    }

    #[test]
    fn test_trait_impl() {
        let src = r#"
impl Display for Config {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
"#;
        let elements = parse_rust(src);
        let imp = elements
            .iter()
            .find(|e| e.name.contains("Display") && e.name.contains("Config"));
        assert!(imp.is_some());
        assert_eq!(imp.expect("impl Display for Config").kind, ChunkKind::Struct);
    }

    #[test]
    fn test_const_and_static() {
        let src = r#"
pub const MAX_SIZE: usize = 1024;
static COUNTER: u64 = 0;
"#;
        let elements = parse_rust(src);

        let c = elements.iter().find(|e| e.name == "MAX_SIZE").expect("MAX_SIZE");
        assert_eq!(c.kind, ChunkKind::Struct);

        assert!(elements.iter().any(|e| e.name == "COUNTER"));
    }

    #[test]
    fn test_type_alias() {
        let src = r#"
pub type MyResult<T> = std::result::Result<T, std::io::Error>;
"#;
        let elements = parse_rust(src);
        let t = elements.iter().find(|e| e.name == "MyResult").expect("MyResult");
        assert_eq!(t.kind, ChunkKind::Struct);
    }

    #[test]
    fn test_module() {
        let src = r#"
mod tests {
    fn helper() {}
}
"#;
        let elements = parse_rust(src);
        let m = elements.iter().find(|e| e.name == "tests").expect("tests");
        assert_eq!(m.kind, ChunkKind::Struct);

        let h = elements.iter().find(|e| e.name == "helper").expect("helper");
        assert!(h.symbol_path.contains("tests::helper"));
    }

    #[test]
    fn test_multiline_doc_comment() {
        let src = r#"
/// Perform the computation.
///
/// This function does amazing things.
/// It takes a value and doubles it.
pub fn compute(x: i32) -> i32 {
    x * 2
}
"#;
        let elements = parse_rust(src);
        let func = elements.iter().find(|e| e.name == "compute").expect("compute");
        let doc_text = func.doc_comment.as_ref().expect("doc");
        assert!(doc_text.contains("Perform the computation"));
        assert!(doc_text.contains("doubles it"));
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_rust("").is_empty());
    }

    #[test]
    fn test_symbol_path_uses_double_colon() {
        let src = r#"
impl Config {
    pub fn new() -> Self {
        Config {}
    }
}
"#;
        let elements = parse_rust(src);
        let new_fn = elements.iter().find(|e| e.name == "new").expect("new");
        assert!(new_fn.symbol_path.contains("::"), "path should use '::' separator");
    }
}
