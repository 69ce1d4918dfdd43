//! Python structural extractor.
//!
//! Extracts functions, classes, methods, decorators, and docstrings from
//! Python source using tree-sitter. All top-level (and nested) `def`s
//! become `Function` chunks; `class` bodies become `Struct` chunks whose
//! methods are extracted as separate, nested `Function` chunks.
//!
//! ## Python AST node kinds (tree-sitter-python)
//!
//! - `function_definition` -> Function
//! - `class_definition` -> Struct
//! - `decorated_definition` -> wraps a function/class with decorators;
//!   the decorator source is folded into the wrapped element's span.

use std::path::Path;

use crate::parser::{LanguageAnalyzer, StructuralElement};
use crate::types::ChunkKind;

/// Analyzer for Python source files.
pub struct PythonAnalyzer;

impl LanguageAnalyzer for PythonAnalyzer {
    fn language_id(&self) -> &str {
        "python"
    }

    fn tree_sitter_language(&self) -> tree_sitter::Language {
        tree_sitter_python::LANGUAGE.into()
    }

    fn extract_structure(
        &self,
        tree: &tree_sitter::Tree,
        source: &[u8],
        file_path: &Path,
    ) -> Vec<StructuralElement> {
        let mut elements = Vec::new();
        let module_name_str = crate::parser::build_module_name_from_path(file_path).replace('/', ".");

        let root = tree.root_node();
        self.walk_node(root, source, &module_name_str, &[], &mut elements);
        elements
    }
}

impl PythonAnalyzer {
    /// Recursively walk the AST and extract structural elements.
    ///
    /// `scope_path` tracks the current nesting (e.g., `["ClassName"]`) so
    /// we can build fully qualified symbol paths.
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
                "function_definition" => {
                    if let Some(elem) = self.extract_function(child, source, module_name, scope_path) {
                        let mut inner_scope = scope_path.to_vec();
                        inner_scope.push(elem.name.clone());
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_node(body, source, module_name, &inner_scope, elements);
                        }
                        elements.push(elem);
                    }
                }
                "class_definition" => {
                    if let Some(elem) = self.extract_class(child, source, module_name, scope_path) {
                        let mut inner_scope = scope_path.to_vec();
                        inner_scope.push(elem.name.clone());
                        if let Some(body) = child.child_by_field_name("body") {
                            self.walk_node(body, source, module_name, &inner_scope, elements);
                        }
                        elements.push(elem);
                    }
                }
                "decorated_definition" => {
                    let mut inner_cursor = child.walk();
                    for inner_child in child.children(&mut inner_cursor) {
                        match inner_child.kind() {
                            "function_definition" => {
                                if let Some(mut elem) =
                                    self.extract_function(inner_child, source, module_name, scope_path)
                                {
                                    let mut inner_scope = scope_path.to_vec();
                                    inner_scope.push(elem.name.clone());
                                    if let Some(body) = inner_child.child_by_field_name("body") {
                                        self.walk_node(body, source, module_name, &inner_scope, elements);
                                    }
                                    elem.line_start = child.start_position().row as u32 + 1;
                                    elem.content = node_text(child, source).to_string();
                                    elements.push(elem);
                                }
                            }
                            "class_definition" => {
                                if let Some(mut elem) =
                                    self.extract_class(inner_child, source, module_name, scope_path)
                                {
                                    let mut inner_scope = scope_path.to_vec();
                                    inner_scope.push(elem.name.clone());
                                    if let Some(body) = inner_child.child_by_field_name("body") {
                                        self.walk_node(body, source, module_name, &inner_scope, elements);
                                    }
                                    elem.line_start = child.start_position().row as u32 + 1;
                                    elem.content = node_text(child, source).to_string();
                                    elements.push(elem);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                "import_statement" | "import_from_statement" => {}
                _ => {
                    if child.child_count() > 0 {
                        self.walk_node(child, source, module_name, scope_path, elements);
                    }
                }
            }
        }
    }

    /// Extract a function/method definition.
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
        let doc_comment = self.extract_docstring(node, source);

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

    /// Extract a class definition.
    fn extract_class(
        &self,
        node: tree_sitter::Node<'_>,
        source: &[u8],
        module_name: &str,
        scope_path: &[String],
    ) -> Option<StructuralElement> {
        let name_node = node.child_by_field_name("name")?;
        let name = node_text(name_node, source).to_string();
        let symbol_path = build_symbol_path(module_name, scope_path, &name);
        let doc_comment = self.extract_docstring(node, source);

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

    /// Extract docstring from the first statement in a function/class body.
    ///
    /// Python docstrings are the first `expression_statement` containing
    /// a string literal in the body block.
    fn extract_docstring(&self, node: tree_sitter::Node<'_>, source: &[u8]) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first_stmt = body.child(0)?;

        if first_stmt.kind() != "expression_statement" {
            return None;
        }

        let expr = first_stmt.child(0)?;
        if expr.kind() != "string" && expr.kind() != "concatenated_string" {
            return None;
        }

        let raw = node_text(expr, source);
        Some(clean_docstring(raw))
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
    parts.join(".")
}

/// Clean a Python docstring by stripping triple quotes and normalizing whitespace.
fn clean_docstring(raw: &str) -> String {
    let stripped = raw
        .trim()
        .strip_prefix("\"\"\"")
        .or_else(|| raw.trim().strip_prefix("'''"))
        .unwrap_or(raw);

    let stripped = stripped
        .strip_suffix("\"\"\"")
        .or_else(|| stripped.strip_suffix("'''"))
        .unwrap_or(stripped);

    stripped.trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
