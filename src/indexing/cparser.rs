//! tree-sitter-based stand-in for the external clang-style indexer
//! (spec.md §1, §4.4).
//!
//! Plays the same *role* libclang's indexer API plays for the original
//! system: it walks a parsed translation unit and emits declaration,
//! reference and include events. It does not attempt full semantic type
//! resolution (spec.md §4 Non-goals) — name-based reference matching
//! within one translation unit is the approximation this adapter makes,
//! grounded on the teacher's per-language `LanguageParser` trait shape
//! (`parsing/parser.rs`) generalized from "extract symbols for one
//! language" to "emit indexer callbacks".

use crate::types::{CursorKind, Range};
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CLanguage {
    C,
    Cpp,
}

pub fn language_for_path(path: &std::path::Path) -> CLanguage {
    match path.extension().and_then(|e| e.to_str()) {
        Some("cpp") | Some("cc") | Some("cxx") | Some("hpp") | Some("hh") => CLanguage::Cpp,
        _ => CLanguage::C,
    }
}

#[derive(Debug, Clone)]
pub enum RawEvent {
    Declaration {
        qualified_name: String,
        kind: CursorKind,
        range: Range,
        is_definition: bool,
        /// Qualified name of the enclosing class/struct, for a
        /// constructor/destructor/method cursor (spec.md §4.4 ctor/dtor
        /// and `CXXMethod` rules).
        parent_name: Option<String>,
        /// Qualified name of the base-class method this one overrides,
        /// if any (spec.md §4.4 `CXXMethod` "recurse into overridden
        /// methods" rule).
        overridden_name: Option<String>,
    },
    Reference {
        name: String,
        range: Range,
    },
    Include {
        path: String,
    },
}

/// A tree-sitter `MISSING` node: the parser recovered from an error by
/// assuming a token was supposed to be there. Distinct from an `is_error`
/// diagnostic, which just marks a span it couldn't make sense of at all.
#[derive(Debug, Clone)]
pub struct RawFixIt {
    pub range: Range,
    pub replacement: String,
}

/// One class/struct scope on the walk's nesting stack, tracking enough to
/// classify member functions (spec.md §4.4 ctor/dtor/`CXXMethod` rules).
struct ClassScope {
    name: String,
    qualified_name: String,
    base_name: Option<String>,
}

#[derive(Debug)]
pub struct ParseOutcome {
    pub events: Vec<RawEvent>,
    /// Formatted parser diagnostics (tree-sitter ERROR nodes), matching
    /// the per-file diagnostics list spec.md §4.4 phase 2 describes.
    pub diagnostics: Vec<String>,
    /// Missing-token recovery sites tree-sitter identified while parsing.
    pub fix_its: Vec<RawFixIt>,
}

/// Parse `source` as C or C++ and emit the declaration/reference/include
/// events a clang-style indexer would. Returns `None` if tree-sitter
/// cannot produce any tree at all (distinct from a tree containing error
/// nodes, which is still walked).
pub fn parse(source: &str, language: CLanguage) -> Option<ParseOutcome> {
    let mut parser = Parser::new();
    let grammar = match language {
        CLanguage::C => tree_sitter_c::LANGUAGE,
        CLanguage::Cpp => tree_sitter_cpp::LANGUAGE,
    };
    parser.set_language(&grammar.into()).ok()?;
    let tree = parser.parse(source, None)?;

    let mut events = Vec::new();
    let mut diagnostics = Vec::new();
    let mut fix_its = Vec::new();
    let mut scope: Vec<String> = Vec::new();
    let mut class_stack: Vec<ClassScope> = Vec::new();
    walk(
        tree.root_node(),
        source,
        &mut scope,
        &mut class_stack,
        &mut events,
        &mut diagnostics,
        &mut fix_its,
    );

    Some(ParseOutcome { events, diagnostics, fix_its })
}

fn node_range(node: Node) -> Range {
    let start = node.start_position();
    let end = node.end_position();
    Range::new(
        start.row as u32,
        start.column as u16,
        end.row as u32,
        end.column as u16,
    )
}

fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

fn qualify(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", scope.join("::"), name)
    }
}

fn walk(
    node: Node,
    source: &str,
    scope: &mut Vec<String>,
    class_stack: &mut Vec<ClassScope>,
    events: &mut Vec<RawEvent>,
    diagnostics: &mut Vec<String>,
    fix_its: &mut Vec<RawFixIt>,
) {
    if node.is_error() {
        let pos = node.start_position();
        diagnostics.push(format!(
            "{}:{}: syntax error near '{}'",
            pos.row + 1,
            pos.column + 1,
            node_text(node, source).chars().take(40).collect::<String>()
        ));
    }
    if node.is_missing() {
        fix_its.push(RawFixIt {
            range: node_range(node),
            replacement: format!("<missing {}>", node.kind()),
        });
    }

    let mut pushed_scope = false;

    match node.kind() {
        "function_definition" => {
            if let Some(name_node) = find_declarator_name(node) {
                let name = node_text(name_node, source).to_string();
                let is_destructor = node
                    .child_by_field_name("declarator")
                    .map(|d| node_text(d, source).trim_start().starts_with('~'))
                    .unwrap_or(false);
                let (kind, parent_name, overridden_name) = classify_method(class_stack, &name, is_destructor);
                events.push(RawEvent::Declaration {
                    qualified_name: qualify(scope, &name),
                    kind,
                    range: node_range(name_node),
                    is_definition: true,
                    parent_name,
                    overridden_name,
                });
            }
        }
        "declaration" => {
            if let Some(name_node) = find_declarator_name(node) {
                let name = node_text(name_node, source).to_string();
                let kind = if node.child_by_field_name("type").is_some() {
                    CursorKind::VarDecl
                } else {
                    CursorKind::FunctionDecl
                };
                events.push(RawEvent::Declaration {
                    qualified_name: qualify(scope, &name),
                    kind,
                    range: node_range(name_node),
                    is_definition: false,
                    parent_name: None,
                    overridden_name: None,
                });
            }
        }
        "struct_specifier" | "union_specifier" | "class_specifier" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                let kind = match node.kind() {
                    "union_specifier" => CursorKind::UnionDecl,
                    _ => CursorKind::StructDecl,
                };
                let is_def = node.child_by_field_name("body").is_some();
                let parent_name = class_stack.last().map(|c| c.qualified_name.clone());
                events.push(RawEvent::Declaration {
                    qualified_name: qualify(scope, &name),
                    kind,
                    range: node_range(name_node),
                    is_definition: is_def,
                    parent_name,
                    overridden_name: None,
                });
                let qualified_name = qualify(scope, &name);
                let base_name = find_base_class_name(node, source);
                scope.push(name.clone());
                class_stack.push(ClassScope {
                    name,
                    qualified_name,
                    base_name,
                });
                pushed_scope = true;
            }
        }
        "enum_specifier" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                let parent_name = class_stack.last().map(|c| c.qualified_name.clone());
                events.push(RawEvent::Declaration {
                    qualified_name: qualify(scope, &name),
                    kind: CursorKind::EnumDecl,
                    range: node_range(name_node),
                    is_definition: node.child_by_field_name("body").is_some(),
                    parent_name,
                    overridden_name: None,
                });
            }
        }
        "type_definition" => {
            if let Some(name_node) = find_declarator_name(node) {
                let name = node_text(name_node, source).to_string();
                events.push(RawEvent::Declaration {
                    qualified_name: qualify(scope, &name),
                    kind: CursorKind::TypedefDecl,
                    range: node_range(name_node),
                    is_definition: true,
                    parent_name: None,
                    overridden_name: None,
                });
            }
        }
        "field_declaration" => {
            if let Some(name_node) = find_declarator_name(node) {
                let name = node_text(name_node, source).to_string();
                let declarator = node.child_by_field_name("declarator");
                let is_method = declarator.map(declarator_is_function).unwrap_or(false);
                if is_method {
                    let is_destructor = declarator
                        .map(|d| node_text(d, source).trim_start().starts_with('~'))
                        .unwrap_or(false);
                    let (kind, parent_name, overridden_name) =
                        classify_method(class_stack, &name, is_destructor);
                    events.push(RawEvent::Declaration {
                        qualified_name: qualify(scope, &name),
                        kind,
                        range: node_range(name_node),
                        is_definition: false,
                        parent_name,
                        overridden_name,
                    });
                } else {
                    let parent_name = class_stack.last().map(|c| c.qualified_name.clone());
                    events.push(RawEvent::Declaration {
                        qualified_name: qualify(scope, &name),
                        kind: CursorKind::FieldDecl,
                        range: node_range(name_node),
                        is_definition: true,
                        parent_name,
                        overridden_name: None,
                    });
                }
            }
        }
        "preproc_def" | "preproc_function_def" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                let name = node_text(name_node, source).to_string();
                events.push(RawEvent::Declaration {
                    qualified_name: name,
                    kind: CursorKind::MacroDefinition,
                    range: node_range(name_node),
                    is_definition: true,
                    parent_name: None,
                    overridden_name: None,
                });
            }
        }
        "preproc_include" => {
            if let Some(path_node) = node.named_child(0) {
                let raw = node_text(path_node, source);
                let trimmed = raw.trim_matches(|c| c == '"' || c == '<' || c == '>');
                events.push(RawEvent::Include {
                    path: trimmed.to_string(),
                });
            }
        }
        "call_expression" => {
            if let Some(fn_node) = node.child_by_field_name("function") {
                let name = node_text(fn_node, source).to_string();
                events.push(RawEvent::Reference {
                    name,
                    range: node_range(fn_node),
                });
            }
        }
        "identifier" if is_bare_reference_context(node) => {
            events.push(RawEvent::Reference {
                name: node_text(node, source).to_string(),
                range: node_range(node),
            });
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, scope, class_stack, events, diagnostics, fix_its);
    }

    if pushed_scope {
        scope.pop();
        class_stack.pop();
    }
}

/// Classify a member function found inside `class_stack`'s innermost scope
/// per spec.md §4.4: same name as the class is a constructor, a leading
/// `~` is a destructor, anything else is a plain method — cross-linked to
/// the base class's method of the same name when the class has one.
fn classify_method(
    class_stack: &[ClassScope],
    name: &str,
    is_destructor: bool,
) -> (CursorKind, Option<String>, Option<String>) {
    let Some(class) = class_stack.last() else {
        return (CursorKind::FunctionDecl, None, None);
    };
    if is_destructor {
        return (CursorKind::Destructor, Some(class.qualified_name.clone()), None);
    }
    if name == class.name {
        return (CursorKind::Constructor, Some(class.qualified_name.clone()), None);
    }
    let overridden_name = class
        .base_name
        .as_ref()
        .map(|base| format!("{}::{}", base, name));
    (CursorKind::CxxMethod, Some(class.qualified_name.clone()), overridden_name)
}

/// First base named in a `struct`/`class`'s `base_class_clause`, if any
/// (spec.md §4.4 `CXXMethod` override rule — single inheritance only).
fn find_base_class_name(node: Node, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "base_class_clause" {
            let mut inner = child.walk();
            for grandchild in child.children(&mut inner) {
                if matches!(grandchild.kind(), "type_identifier" | "qualified_identifier") {
                    return Some(node_text(grandchild, source).to_string());
                }
            }
        }
    }
    None
}

/// Whether a declarator (possibly wrapped in pointer/reference layers)
/// ultimately names a function, distinguishing member method prototypes
/// from plain field declarations inside a `field_declaration` node.
fn declarator_is_function(node: Node) -> bool {
    if node.kind() == "function_declarator" {
        return true;
    }
    node.child_by_field_name("declarator")
        .map(declarator_is_function)
        .unwrap_or(false)
}

/// Heuristic: a bare identifier used as an expression statement or
/// initializer value, not itself part of a declaration/call already
/// handled above.
fn is_bare_reference_context(node: Node) -> bool {
    matches!(
        node.parent().map(|p| p.kind()),
        Some("return_statement") | Some("init_declarator") | Some("assignment_expression")
    )
}

fn find_declarator_name(node: Node) -> Option<Node> {
    let declarator = node.child_by_field_name("declarator")?;
    descend_to_identifier(declarator)
}

fn descend_to_identifier(node: Node) -> Option<Node> {
    if node.kind() == "identifier" || node.kind() == "field_identifier" {
        return Some(node);
    }
    for field in ["declarator", "name"] {
        if let Some(child) = node.child_by_field_name(field) {
            if let Some(found) = descend_to_identifier(child) {
                return Some(found);
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "identifier" || child.kind() == "field_identifier" {
            return Some(child);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_function_definition() {
        let outcome = parse("int add(int x){return x+1;}", CLanguage::C).unwrap();
        let found = outcome.events.iter().any(|e| matches!(
            e,
            RawEvent::Declaration { qualified_name, kind: CursorKind::FunctionDecl, is_definition: true, .. }
                if qualified_name == "add"
        ));
        assert!(found, "expected a function definition event for `add`, got {:?}", outcome.events);
    }

    #[test]
    fn parses_function_declaration_without_body() {
        let outcome = parse("int f();", CLanguage::C).unwrap();
        let found = outcome.events.iter().any(|e| matches!(
            e,
            RawEvent::Declaration { qualified_name, is_definition: false, .. } if qualified_name == "f"
        ));
        assert!(found);
    }

    #[test]
    fn parses_include_directive() {
        let outcome = parse("#include \"a.h\"\nint main(){return 0;}", CLanguage::Cpp).unwrap();
        let found = outcome
            .events
            .iter()
            .any(|e| matches!(e, RawEvent::Include { path } if path == "a.h"));
        assert!(found);
    }

    #[test]
    fn parses_call_expression_as_reference() {
        let outcome = parse("int f(); int main(){return f();}", CLanguage::C).unwrap();
        let found = outcome
            .events
            .iter()
            .any(|e| matches!(e, RawEvent::Reference { name, .. } if name == "f"));
        assert!(found);
    }

    #[test]
    fn struct_declarations_qualify_nested_fields() {
        let outcome = parse("struct S { int x; };", CLanguage::C).unwrap();
        let found = outcome.events.iter().any(|e| matches!(
            e,
            RawEvent::Declaration { qualified_name, kind: CursorKind::FieldDecl, .. }
                if qualified_name == "S::x"
        ));
        assert!(found, "{:?}", outcome.events);
    }

    #[test]
    fn syntax_error_is_recorded_as_diagnostic() {
        let outcome = parse("int main( {", CLanguage::C).unwrap();
        assert!(!outcome.diagnostics.is_empty());
    }

    #[test]
    fn constructor_and_destructor_are_classified_and_linked_to_class() {
        let outcome = parse(
            "class Foo { public: Foo(); ~Foo(); };",
            CLanguage::Cpp,
        )
        .unwrap();
        let ctor = outcome.events.iter().any(|e| matches!(
            e,
            RawEvent::Declaration { qualified_name, kind: CursorKind::Constructor, parent_name: Some(p), .. }
                if qualified_name == "Foo::Foo" && p == "Foo"
        ));
        assert!(ctor, "{:?}", outcome.events);
        let dtor = outcome.events.iter().any(|e| matches!(
            e,
            RawEvent::Declaration { qualified_name, kind: CursorKind::Destructor, parent_name: Some(p), .. }
                if qualified_name == "Foo::~Foo" && p == "Foo"
        ));
        assert!(dtor, "{:?}", outcome.events);
    }

    #[test]
    fn overriding_method_is_cross_linked_to_base_method_name() {
        let outcome = parse(
            "class Base { public: void run(); };\nclass Derived : Base { public: void run(); };",
            CLanguage::Cpp,
        )
        .unwrap();
        let found = outcome.events.iter().any(|e| matches!(
            e,
            RawEvent::Declaration { qualified_name, kind: CursorKind::CxxMethod, overridden_name: Some(o), .. }
                if qualified_name == "Derived::run" && o == "Base::run"
        ));
        assert!(found, "{:?}", outcome.events);
    }

    #[test]
    fn missing_token_is_recorded_as_fix_it() {
        let outcome = parse("int main(", CLanguage::C).unwrap();
        assert!(!outcome.fix_its.is_empty());
    }
}
