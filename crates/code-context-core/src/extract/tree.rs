//! tree-sitter walk for JavaScript, TypeScript and TSX.

use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use once_cell::sync::Lazy;
use serde_json::json;
use tree_sitter::{Node, Parser};

use super::{ExtractedEntity, ExtractedRelationship, Extraction, RelationTarget, Strategy};
use crate::language::Language;
use crate::models::{EntityType, RelationshipType};

const ANONYMOUS: &str = "anonymous";

fn load(language: tree_sitter::Language, name: &str) -> Mutex<Parser> {
    let mut parser = Parser::new();
    if let Err(err) = parser.set_language(&language) {
        panic!("failed to load {name} grammar: {err}");
    }
    Mutex::new(parser)
}

static JAVASCRIPT: Lazy<Mutex<Parser>> =
    Lazy::new(|| load(tree_sitter_javascript::LANGUAGE.into(), "JavaScript"));
static TYPESCRIPT: Lazy<Mutex<Parser>> =
    Lazy::new(|| load(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(), "TypeScript"));
static TSX: Lazy<Mutex<Parser>> =
    Lazy::new(|| load(tree_sitter_typescript::LANGUAGE_TSX.into(), "TSX"));

pub(super) fn extract(content: &str, language: Language) -> Result<Extraction> {
    let cached = match language {
        Language::JavaScript => &JAVASCRIPT,
        Language::TypeScript => &TYPESCRIPT,
        Language::Tsx => &TSX,
        other => bail!("no grammar linked for {}", other.name()),
    };
    let tree = {
        let mut parser = cached
            .lock()
            .map_err(|_| anyhow!("failed to lock {} parser", language.name()))?;
        parser
            .parse(content, None)
            .ok_or_else(|| anyhow!("failed to parse {} source", language.name()))?
    };

    let root = tree.root_node();
    if root.has_error() {
        bail!("syntax errors in {} source", language.name());
    }

    let mut walker = Walker {
        source: content,
        entities: Vec::new(),
        relationships: Vec::new(),
    };
    walker.visit_children(root, WalkContext::default());

    Ok(Extraction {
        entities: walker.entities,
        relationships: walker.relationships,
        strategy: Strategy::SyntaxTree,
    })
}

/// Position in the entity tree, passed by value down the recursion.
#[derive(Debug, Clone, Copy, Default)]
struct WalkContext {
    /// Entity new entities nest under.
    parent: Option<usize>,
    /// Nearest function or class; the source of call edges.
    scope: Option<usize>,
}

impl WalkContext {
    fn nested(self, idx: usize) -> Self {
        Self {
            parent: Some(idx),
            scope: Some(idx),
        }
    }

    fn under(self, idx: usize) -> Self {
        Self {
            parent: Some(idx),
            ..self
        }
    }
}

fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "arrow_function"
            | "generator_function"
    )
}

fn is_class_like(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration" | "abstract_class_declaration" | "class"
    )
}

/// `React.Component<Props>` → `Component`.
fn symbol_name(text: &str) -> String {
    let base = text.split('<').next().unwrap_or(text);
    base.rsplit('.').next().unwrap_or(base).trim().to_string()
}

fn strip_quotes(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

struct Walker<'a> {
    source: &'a str,
    entities: Vec<ExtractedEntity>,
    relationships: Vec<ExtractedRelationship>,
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    fn field_text(&self, node: Node, field: &str) -> Option<&'a str> {
        node.child_by_field_name(field).map(|n| self.text(n))
    }

    fn push(
        &mut self,
        node: Node,
        entity_type: EntityType,
        name: String,
        ctx: WalkContext,
        metadata: serde_json::Value,
    ) -> usize {
        self.entities.push(ExtractedEntity {
            entity_type,
            name,
            start_line: node.start_position().row as i64 + 1,
            end_line: node.end_position().row as i64 + 1,
            raw_content: self.text(node).to_string(),
            parent: ctx.parent,
            metadata,
        });
        self.entities.len() - 1
    }

    fn relate(
        &mut self,
        source: Option<usize>,
        target: RelationTarget,
        relationship_type: RelationshipType,
        metadata: serde_json::Value,
    ) {
        self.relationships.push(ExtractedRelationship {
            source,
            target,
            relationship_type,
            metadata,
        });
    }

    fn symbol(name: impl Into<String>, entity_type: Option<EntityType>) -> RelationTarget {
        RelationTarget::Symbol {
            name: name.into(),
            entity_type,
        }
    }

    fn visit_children(&mut self, node: Node, ctx: WalkContext) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, ctx);
        }
    }

    fn visit(&mut self, node: Node, ctx: WalkContext) {
        match node.kind() {
            kind if is_function_like(kind) => self.visit_function(node, ctx),
            kind if is_class_like(kind) => self.visit_class(node, ctx),
            "method_definition" | "method_signature" | "abstract_method_signature" => {
                self.visit_method(node, ctx)
            }
            "interface_declaration" => self.visit_interface(node, ctx),
            "type_alias_declaration" => {
                let name = self.field_text(node, "name").unwrap_or(ANONYMOUS).to_string();
                self.push(
                    node,
                    EntityType::TypeAlias,
                    name,
                    ctx,
                    json!({ "node_kind": node.kind() }),
                );
            }
            "enum_declaration" => {
                let name = self.field_text(node, "name").unwrap_or(ANONYMOUS).to_string();
                let members = node
                    .child_by_field_name("body")
                    .map(|b| b.named_child_count())
                    .unwrap_or(0);
                self.push(
                    node,
                    EntityType::Enum,
                    name,
                    ctx,
                    json!({ "node_kind": node.kind(), "member_count": members }),
                );
            }
            "lexical_declaration" | "variable_declaration" => self.visit_declaration(node, ctx),
            "import_statement" => self.visit_import(node, ctx),
            "export_statement" => self.visit_export(node, ctx),
            "comment" => self.visit_comment(node, ctx),
            "call_expression" => self.visit_call(node, ctx),
            "new_expression" => self.visit_new(node, ctx),
            _ => self.visit_children(node, ctx),
        }
    }

    fn callable_metadata(&self, node: Node) -> serde_json::Value {
        let param_count = node
            .child_by_field_name("parameters")
            .map(|p| p.named_child_count())
            .or_else(|| node.child_by_field_name("parameter").map(|_| 1))
            .unwrap_or(0);
        let mut is_async = false;
        let mut is_generator = node.kind().contains("generator");
        let mut is_static = false;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "async" => is_async = true,
                "*" => is_generator = true,
                "static" => is_static = true,
                _ => {}
            }
        }
        json!({
            "node_kind": node.kind(),
            "param_count": param_count,
            "is_async": is_async,
            "is_generator": is_generator,
            "is_static": is_static,
        })
    }

    fn visit_function(&mut self, node: Node, ctx: WalkContext) {
        let name = match self.field_text(node, "name") {
            Some(name) => name.to_string(),
            None => self.infer_name(node),
        };
        let anonymous = name == ANONYMOUS;
        let metadata = self.callable_metadata(node);
        let idx = self.push(node, EntityType::Function, name, ctx, metadata);
        // Calls inside callbacks belong to the nearest named scope.
        let inner = if anonymous { ctx.under(idx) } else { ctx.nested(idx) };
        self.visit_children(node, inner);
    }

    fn visit_method(&mut self, node: Node, ctx: WalkContext) {
        let name = self.field_text(node, "name").unwrap_or(ANONYMOUS).to_string();
        let entity_type = if name == "constructor" {
            EntityType::Constructor
        } else {
            EntityType::Method
        };
        let metadata = self.callable_metadata(node);
        let idx = self.push(node, entity_type, name, ctx, metadata);
        self.visit_children(node, ctx.nested(idx));
    }

    fn visit_class(&mut self, node: Node, ctx: WalkContext) {
        let name = match self.field_text(node, "name") {
            Some(name) => name.to_string(),
            None => self.infer_name(node),
        };
        let (extends, implements) = self.heritage(node);
        let metadata = json!({
            "node_kind": node.kind(),
            "extends": extends,
            "implements": implements,
        });
        let idx = self.push(node, EntityType::Class, name, ctx, metadata);
        for base in extends {
            self.relate(
                Some(idx),
                Self::symbol(base, Some(EntityType::Class)),
                RelationshipType::Extends,
                json!({}),
            );
        }
        for iface in implements {
            self.relate(
                Some(idx),
                Self::symbol(iface, Some(EntityType::Interface)),
                RelationshipType::Implements,
                json!({}),
            );
        }
        self.visit_children(node, ctx.nested(idx));
    }

    fn heritage(&self, class: Node) -> (Vec<String>, Vec<String>) {
        let mut extends = Vec::new();
        let mut implements = Vec::new();
        let mut cursor = class.walk();
        for child in class.named_children(&mut cursor) {
            if child.kind() != "class_heritage" {
                continue;
            }
            let mut inner = child.walk();
            for clause in child.named_children(&mut inner) {
                match clause.kind() {
                    "extends_clause" => extends.extend(self.type_names(clause)),
                    "implements_clause" => implements.extend(self.type_names(clause)),
                    "comment" => {}
                    _ => extends.push(symbol_name(self.text(clause))),
                }
            }
        }
        (extends, implements)
    }

    fn type_names(&self, clause: Node) -> Vec<String> {
        let mut cursor = clause.walk();
        clause
            .named_children(&mut cursor)
            .filter(|n| !matches!(n.kind(), "type_arguments" | "comment"))
            .map(|n| symbol_name(self.text(n)))
            .filter(|n| !n.is_empty())
            .collect()
    }

    fn visit_interface(&mut self, node: Node, ctx: WalkContext) {
        let name = self.field_text(node, "name").unwrap_or(ANONYMOUS).to_string();
        let mut extends = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "extends_type_clause" {
                extends.extend(self.type_names(child));
            }
        }
        let metadata = json!({ "node_kind": node.kind(), "extends": extends });
        let idx = self.push(node, EntityType::Interface, name, ctx, metadata);
        for base in extends {
            self.relate(
                Some(idx),
                Self::symbol(base, Some(EntityType::Interface)),
                RelationshipType::Extends,
                json!({}),
            );
        }
        self.visit_children(node, ctx.nested(idx));
    }

    fn visit_declaration(&mut self, node: Node, ctx: WalkContext) {
        let in_callable = ctx
            .scope
            .is_some_and(|s| self.entities[s].entity_type.is_callable());
        let keyword = self.field_text(node, "kind").unwrap_or("var");

        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "variable_declarator")
            .collect();
        let single = declarators.len() == 1;

        for decl in declarators {
            let name = self.field_text(decl, "name").unwrap_or(ANONYMOUS).to_string();
            let span = if single { node } else { decl };
            match decl.child_by_field_name("value") {
                Some(value) if is_function_like(value.kind()) || is_class_like(value.kind()) => {
                    self.visit(value, ctx);
                }
                Some(value) if value.kind() == "object" && !in_callable => {
                    let metadata = json!({
                        "node_kind": value.kind(),
                        "declaration": keyword,
                        "property_count": value.named_child_count(),
                    });
                    let idx = self.push(span, EntityType::Object, name, ctx, metadata);
                    self.visit_children(value, ctx.under(idx));
                }
                value => {
                    if !in_callable {
                        let metadata = json!({ "node_kind": decl.kind(), "declaration": keyword });
                        self.push(span, EntityType::Variable, name, ctx, metadata);
                    }
                    if let Some(value) = value {
                        self.visit(value, ctx);
                    }
                }
            }
        }
    }

    fn collect_identifiers(&self, node: Node, out: &mut Vec<String>) {
        if node.kind() == "identifier" {
            out.push(self.text(node).to_string());
            return;
        }
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.collect_identifiers(child, out);
        }
    }

    fn visit_import(&mut self, node: Node, ctx: WalkContext) {
        let source = self.field_text(node, "source").map(strip_quotes).unwrap_or_default();
        let mut specifiers = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "import_clause" {
                self.collect_identifiers(child, &mut specifiers);
            }
        }
        let line = node.start_position().row + 1;
        self.push(
            node,
            EntityType::Import,
            source.clone(),
            ctx,
            json!({ "node_kind": node.kind(), "source": source, "specifiers": specifiers }),
        );
        self.relate(
            None,
            Self::symbol(source, Some(EntityType::File)),
            RelationshipType::Imports,
            json!({ "specifiers": specifiers, "line": line }),
        );
    }

    fn export_new_entities(&mut self, first: usize, ctx: WalkContext, is_default: bool) {
        let exported: Vec<usize> = (first..self.entities.len())
            .filter(|&i| self.entities[i].parent == ctx.parent)
            .collect();
        for idx in exported {
            self.relate(
                None,
                RelationTarget::Local(idx),
                RelationshipType::Exports,
                json!({ "default": is_default }),
            );
        }
    }

    fn visit_export(&mut self, node: Node, ctx: WalkContext) {
        let first = self.entities.len();
        let mut cursor = node.walk();
        let is_default = node.children(&mut cursor).any(|c| c.kind() == "default");

        if let Some(declaration) = node.child_by_field_name("declaration") {
            self.visit(declaration, ctx);
            self.export_new_entities(first, ctx, is_default);
            return;
        }

        if let Some(value) = node.child_by_field_name("value") {
            if value.kind() == "identifier" {
                let name = self.text(value).to_string();
                self.push(
                    node,
                    EntityType::Export,
                    "default".to_string(),
                    ctx,
                    json!({ "node_kind": node.kind(), "specifiers": [name.clone()] }),
                );
                self.relate(
                    None,
                    Self::symbol(name, None),
                    RelationshipType::Exports,
                    json!({ "default": true }),
                );
            } else {
                self.visit(value, ctx);
                self.export_new_entities(first, ctx, is_default);
            }
            return;
        }

        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() != "export_clause" {
                continue;
            }
            let mut inner = child.walk();
            for spec in child.named_children(&mut inner) {
                if let Some(name) = self.field_text(spec, "name") {
                    names.push(name.to_string());
                }
            }
        }
        let source = self.field_text(node, "source").map(strip_quotes);
        let name = if names.is_empty() {
            source.clone().unwrap_or_else(|| "*".to_string())
        } else {
            names.join(", ")
        };
        self.push(
            node,
            EntityType::Export,
            name,
            ctx,
            json!({ "node_kind": node.kind(), "specifiers": names, "source": source }),
        );
        match source {
            Some(module) => self.relate(
                None,
                Self::symbol(module, Some(EntityType::File)),
                RelationshipType::Imports,
                json!({ "reexport": true }),
            ),
            None => {
                for name in names {
                    self.relate(
                        None,
                        Self::symbol(name, None),
                        RelationshipType::Exports,
                        json!({ "default": false }),
                    );
                }
            }
        }
    }

    /// Name declared by a statement, looking through `export` and
    /// variable declarations.
    fn declared_name(&self, node: Node) -> Option<&'a str> {
        if let Some(name) = self.field_text(node, "name") {
            return Some(name);
        }
        if let Some(declaration) = node.child_by_field_name("declaration") {
            return self.declared_name(declaration);
        }
        let mut cursor = node.walk();
        let first = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "variable_declarator");
        first.and_then(|d| self.field_text(d, "name"))
    }

    fn visit_comment(&mut self, node: Node, ctx: WalkContext) {
        let text = self.text(node);
        if !text.starts_with("/**") {
            return;
        }
        let documents = node.next_named_sibling().and_then(|s| self.declared_name(s));
        let name = documents.unwrap_or("comment").to_string();
        self.push(
            node,
            EntityType::CommentBlock,
            name,
            ctx,
            json!({ "node_kind": "jsdoc", "documents": documents }),
        );
    }

    fn callee_name(&self, callee: Node) -> Option<&'a str> {
        match callee.kind() {
            "identifier" => Some(self.text(callee)),
            "member_expression" => self.field_text(callee, "property"),
            _ => None,
        }
    }

    fn visit_call(&mut self, node: Node, ctx: WalkContext) {
        let line = node.start_position().row + 1;
        if let Some(name) = node
            .child_by_field_name("function")
            .and_then(|callee| self.callee_name(callee))
        {
            if name == "require" {
                let module = node
                    .child_by_field_name("arguments")
                    .and_then(|args| args.named_child(0))
                    .filter(|arg| arg.kind() == "string")
                    .map(|arg| strip_quotes(self.text(arg)));
                if let Some(module) = module {
                    self.relate(
                        None,
                        Self::symbol(module, Some(EntityType::File)),
                        RelationshipType::Imports,
                        json!({ "line": line, "require": true }),
                    );
                }
            } else {
                self.relate(
                    ctx.scope,
                    Self::symbol(name, None),
                    RelationshipType::Calls,
                    json!({ "line": line }),
                );
            }
        }
        self.visit_children(node, ctx);
    }

    fn visit_new(&mut self, node: Node, ctx: WalkContext) {
        if let Some(name) = node
            .child_by_field_name("constructor")
            .and_then(|c| self.callee_name(c))
        {
            let line = node.start_position().row + 1;
            self.relate(
                ctx.scope,
                Self::symbol(name, Some(EntityType::Class)),
                RelationshipType::References,
                json!({ "line": line, "instantiates": true }),
            );
        }
        self.visit_children(node, ctx);
    }

    /// Name for an unnamed function or class, taken from where it is bound.
    fn infer_name(&self, node: Node) -> String {
        let Some(parent) = node.parent() else {
            return ANONYMOUS.to_string();
        };
        let name = match parent.kind() {
            "variable_declarator" => self.field_text(parent, "name"),
            "assignment_expression" => parent.child_by_field_name("left").and_then(|left| {
                match left.kind() {
                    "member_expression" => self.field_text(left, "property"),
                    _ => Some(self.text(left)),
                }
            }),
            "pair" => self.field_text(parent, "key"),
            "public_field_definition" | "field_definition" => self
                .field_text(parent, "name")
                .or_else(|| self.field_text(parent, "property")),
            "export_statement" => Some("default"),
            _ => None,
        };
        match name {
            Some(name) if !name.trim().is_empty() => strip_quotes(name.trim()),
            _ => ANONYMOUS.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(src: &str, language: Language) -> Extraction {
        extract(src, language).unwrap()
    }

    fn find(ex: &Extraction, name: &str, entity_type: EntityType) -> usize {
        ex.entities
            .iter()
            .position(|e| e.name == name && e.entity_type == entity_type)
            .unwrap_or_else(|| panic!("no {entity_type} named {name}: {:#?}", ex.entities))
    }

    fn has_rel(
        ex: &Extraction,
        source: Option<usize>,
        target: &str,
        relationship_type: RelationshipType,
    ) -> bool {
        ex.relationships.iter().any(|r| {
            r.source == source
                && r.relationship_type == relationship_type
                && matches!(&r.target, RelationTarget::Symbol { name, .. } if name == target)
        })
    }

    const SERVICE: &str = r#"import { a, b as c } from './util';

/** Loads users. */
class UserService extends BaseService {
  constructor(db) {
    super();
    this.db = db;
  }

  async loadUser(id) {
    return this.db.find(id);
  }
}

const handler = () => new UserService(connect());

export default function () {}
"#;

    #[test]
    fn test_class_members_nest_under_class() {
        let ex = run(SERVICE, Language::JavaScript);
        let class = find(&ex, "UserService", EntityType::Class);
        let ctor = find(&ex, "constructor", EntityType::Constructor);
        let load = find(&ex, "loadUser", EntityType::Method);
        assert_eq!(ex.entities[ctor].parent, Some(class));
        assert_eq!(ex.entities[load].parent, Some(class));
        assert_eq!(ex.entities[class].start_line, 4);
        assert_eq!(ex.entities[class].end_line, 13);
        assert_eq!(ex.entities[load].metadata["is_async"], true);
        assert_eq!(ex.entities[load].metadata["param_count"], 1);
    }

    #[test]
    fn test_heritage_calls_and_instantiation() {
        let ex = run(SERVICE, Language::JavaScript);
        let class = find(&ex, "UserService", EntityType::Class);
        let load = find(&ex, "loadUser", EntityType::Method);
        let handler = find(&ex, "handler", EntityType::Function);
        assert!(has_rel(&ex, Some(class), "BaseService", RelationshipType::Extends));
        assert!(has_rel(&ex, Some(load), "find", RelationshipType::Calls));
        assert!(has_rel(&ex, Some(handler), "connect", RelationshipType::Calls));
        assert!(has_rel(&ex, Some(handler), "UserService", RelationshipType::References));
    }

    #[test]
    fn test_calls_in_callbacks_belong_to_named_function() {
        let src = "function outer(items) {
  items.forEach(function (x) { helper(x); });
  items.map((y) => other(y));
}
[1, 2].forEach(() => boot());
";
        let ex = run(src, Language::JavaScript);
        let outer = find(&ex, "outer", EntityType::Function);
        assert!(has_rel(&ex, Some(outer), "helper", RelationshipType::Calls));
        assert!(has_rel(&ex, Some(outer), "other", RelationshipType::Calls));
        assert!(has_rel(&ex, None, "boot", RelationshipType::Calls));

        let callbacks: Vec<_> = ex
            .entities
            .iter()
            .filter(|e| e.name == ANONYMOUS)
            .collect();
        assert_eq!(callbacks.len(), 3);
        assert!(callbacks[..2].iter().all(|e| e.parent == Some(outer)));
        assert!(!ex
            .relationships
            .iter()
            .any(|r| r.source.is_some_and(|s| ex.entities[s].name == ANONYMOUS)));
    }

    #[test]
    fn test_imports_docs_and_default_export() {
        let ex = run(SERVICE, Language::JavaScript);
        let import = find(&ex, "./util", EntityType::Import);
        assert_eq!(
            ex.entities[import].metadata["specifiers"],
            json!(["a", "b", "c"])
        );
        assert!(has_rel(&ex, None, "./util", RelationshipType::Imports));
        find(&ex, "UserService", EntityType::CommentBlock);
        let default = find(&ex, "default", EntityType::Function);
        assert!(ex.relationships.iter().any(|r| r.source.is_none()
            && r.target == RelationTarget::Local(default)
            && r.relationship_type == RelationshipType::Exports));
    }

    #[test]
    fn test_typescript_declarations() {
        let src = r#"interface Repo<T> extends Base {
  find(id: string): T;
}
type Id = string;
enum Color { Red, Green }
class SqlRepo implements Repo<User> {
  find(id: string) {
    return query(id);
  }
}
export const LIMIT = 10;
"#;
        let ex = run(src, Language::TypeScript);
        let repo = find(&ex, "Repo", EntityType::Interface);
        let sig = ex
            .entities
            .iter()
            .position(|e| e.name == "find" && e.parent == Some(repo))
            .unwrap();
        assert_eq!(ex.entities[sig].entity_type, EntityType::Method);
        assert!(has_rel(&ex, Some(repo), "Base", RelationshipType::Extends));
        find(&ex, "Id", EntityType::TypeAlias);
        find(&ex, "Color", EntityType::Enum);
        let sql = find(&ex, "SqlRepo", EntityType::Class);
        assert!(has_rel(&ex, Some(sql), "Repo", RelationshipType::Implements));
        let limit = find(&ex, "LIMIT", EntityType::Variable);
        assert!(ex
            .relationships
            .iter()
            .any(|r| r.target == RelationTarget::Local(limit)
                && r.relationship_type == RelationshipType::Exports));
    }

    #[test]
    fn test_object_literal_members_and_inferred_names() {
        let src = "const api = {\n  get(url) { return fetch(url); },\n  post: async (url) => send(url),\n};\n";
        let ex = run(src, Language::JavaScript);
        let api = find(&ex, "api", EntityType::Object);
        let get = find(&ex, "get", EntityType::Method);
        let post = find(&ex, "post", EntityType::Function);
        assert_eq!(ex.entities[get].parent, Some(api));
        assert_eq!(ex.entities[post].parent, Some(api));
        assert_eq!(ex.entities[post].metadata["is_async"], true);
        assert!(has_rel(&ex, Some(get), "fetch", RelationshipType::Calls));
        assert!(has_rel(&ex, Some(post), "send", RelationshipType::Calls));
    }

    #[test]
    fn test_locals_inside_functions_are_not_entities() {
        let ex = run("function f() {\n  const x = 1;\n  return x;\n}\n", Language::JavaScript);
        assert_eq!(ex.entities.len(), 1);
        assert_eq!(ex.entities[0].name, "f");
    }

    #[test]
    fn test_require_is_an_import() {
        let ex = run("const fs = require('fs');\n", Language::JavaScript);
        find(&ex, "fs", EntityType::Variable);
        assert!(has_rel(&ex, None, "fs", RelationshipType::Imports));
        assert!(!ex
            .relationships
            .iter()
            .any(|r| r.relationship_type == RelationshipType::Calls));
    }

    #[test]
    fn test_syntax_errors_are_rejected() {
        assert!(extract("function (", Language::JavaScript).is_err());
        assert!(extract("def f(): pass", Language::Python).is_err());
    }
}
