//! The symbol tree.
//!
//! All scopes and declarations live in one tree used to resolve identifiers
//! and types. Nodes are stored in an index arena and addressed by
//! [`NodeId`]; children hold strong ids downward and each node records its
//! parent id upward, which keeps the parent/child cycle out of the ownership
//! graph entirely.
//!
//! Two roots exist side by side: the reserved scope, which holds the
//! primitive types and is searched first so its names can never be
//! shadowed, and the user root scope.
//!
//! ## Name search
//!
//! [`SymbolTree::search_name`] works in two phases. Upward: walk from the
//! current scope toward the root until a scope's children contain the first
//! part of the name. Downward: from that match, follow the remaining parts
//! through child scopes. If the downward walk fails, the upward walk
//! resumes at the next ancestor.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{BlockKind, Expr, Name};
use crate::error::ErrorCode;
use crate::token::Token;
use crate::types::Type;

/// Index of a node in the symbol tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// A declared variable, parameter, or struct field.
#[derive(Debug, Clone)]
pub struct Field {
    pub token: Rc<Token>,
    pub ty: Type,
    pub mutable: bool,
}

/// One parameter of a function signature.
#[derive(Debug, Clone)]
pub struct SigParam {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    /// The checked default-value expression, when the parameter has one.
    pub default: Option<Expr>,
}

/// One overload of a function declaration.
#[derive(Debug, Clone)]
pub struct Signature {
    pub params: Vec<SigParam>,
    pub ret: Type,
    /// False until the local checker has resolved the annotation types.
    pub resolved: bool,
}

impl Signature {
    /// How many arguments a call may omit thanks to defaults.
    pub fn min_arity(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }
}

#[derive(Debug)]
pub enum NodeKind {
    /// The root of the user scope tree.
    Root,
    /// The root of the reserved names; never shadowable.
    Reserved,
    Namespace {
        name: String,
    },
    StructDef {
        name: String,
        is_class: bool,
    },
    /// A function body, block, or loop scope. Anonymous: not registered in
    /// its parent's children.
    LocalScope {
        kind: BlockKind,
    },
    FieldEntry {
        field: Field,
        /// Whether the statement declaring this entry has already executed
        /// at the current point of checking.
        declared: bool,
    },
    PrimitiveType {
        name: String,
        ty: Type,
    },
    FunctionDecl {
        name: String,
        signatures: Vec<Signature>,
    },
}

impl NodeKind {
    /// Scopes can contain children reachable by downward search.
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            NodeKind::Root
                | NodeKind::Reserved
                | NodeKind::Namespace { .. }
                | NodeKind::StructDef { .. }
                | NodeKind::LocalScope { .. }
        )
    }
}

#[derive(Debug)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub children: HashMap<String, NodeId>,
    /// Children in declaration order; field offsets depend on it.
    pub order: Vec<NodeId>,
}

#[derive(Debug)]
pub struct SymbolTree {
    nodes: Vec<Node>,
    root: NodeId,
    reserved: NodeId,
    current: NodeId,
    /// Bumped on every mutation so downstream stages can detect staleness
    /// between REPL submissions.
    modified: bool,
    sizing_stack: RefCell<Vec<NodeId>>,
}

impl Default for SymbolTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTree {
    pub fn new() -> Self {
        let mut tree = SymbolTree {
            nodes: Vec::new(),
            root: NodeId(0),
            reserved: NodeId(0),
            current: NodeId(0),
            modified: false,
            sizing_stack: RefCell::new(Vec::new()),
        };
        tree.reset();
        tree
    }

    /// Resets the tree to its initial state: a fresh root, a fresh reserved
    /// scope, and the primitive types reinstalled.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.root = self.push_node(None, NodeKind::Root);
        self.reserved = self.push_node(None, NodeKind::Reserved);
        self.current = self.root;
        self.install_primitive_types();
        self.modified = true;
    }

    fn push_node(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent,
            kind,
            children: HashMap::new(),
            order: Vec::new(),
        });
        id
    }

    fn register_child(&mut self, parent: NodeId, lexeme: String, child: NodeId) {
        let node = &mut self.nodes[parent.0 as usize];
        node.children.insert(lexeme, child);
        node.order.push(child);
    }

    fn install_primitive_types(&mut self) {
        let primitives: &[(&str, Type)] = &[
            ("i8", Type::Int { signed: true, width: 8 }),
            ("i16", Type::Int { signed: true, width: 16 }),
            ("i32", Type::Int { signed: true, width: 32 }),
            ("i64", Type::Int { signed: true, width: 64 }),
            ("u8", Type::Int { signed: false, width: 8 }),
            ("u16", Type::Int { signed: false, width: 16 }),
            ("u32", Type::Int { signed: false, width: 32 }),
            ("u64", Type::Int { signed: false, width: 64 }),
            ("f32", Type::Float { width: 32 }),
            ("f64", Type::Float { width: 64 }),
            ("bool", Type::Bool),
            ("str", Type::Str),
        ];
        for (name, ty) in primitives {
            let id = self.push_node(
                Some(self.reserved),
                NodeKind::PrimitiveType {
                    name: name.to_string(),
                    ty: ty.clone(),
                },
            );
            self.register_child(self.reserved, name.to_string(), id);
        }
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.modified = true;
        &mut self.nodes[id.0 as usize]
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    /// Re-enters a previously created scope.
    pub fn enter(&mut self, id: NodeId) {
        if !self.node(id).kind.is_scope() {
            panic!("SymbolTree::enter: node is not a scope");
        }
        self.current = id;
        self.modified = true;
    }

    /// Whether the tree has been mutated since the flag was last taken.
    pub fn take_modified(&mut self) -> bool {
        std::mem::replace(&mut self.modified, false)
    }

    fn reserved_child(&self, lexeme: &str) -> Option<NodeId> {
        self.node(self.reserved).children.get(lexeme).copied()
    }

    /// Adds a namespace in the current scope and enters it. Namespaces are
    /// open: adding a name that already names a namespace re-enters it.
    pub fn add_namespace(&mut self, token: &Rc<Token>) -> Result<NodeId, ErrorCode> {
        match &self.node(self.current).kind {
            NodeKind::LocalScope { .. } => return Err(ErrorCode::NamespaceInLocalScope),
            NodeKind::StructDef { .. } => return Err(ErrorCode::NamespaceInStructDef),
            _ => {}
        }
        let lexeme = token.lexeme().to_string();
        if self.reserved_child(&lexeme).is_some() {
            return Err(ErrorCode::NameIsReserved);
        }
        if let Some(&existing) = self.node(self.current).children.get(&lexeme) {
            return if matches!(self.node(existing).kind, NodeKind::Namespace { .. }) {
                self.current = existing;
                self.modified = true;
                Ok(existing)
            } else {
                Err(ErrorCode::NameAlreadyExists)
            };
        }
        let id = self.push_node(
            Some(self.current),
            NodeKind::Namespace {
                name: lexeme.clone(),
            },
        );
        self.register_child(self.current, lexeme, id);
        self.current = id;
        self.modified = true;
        Ok(id)
    }

    /// Adds a struct or class definition in the current scope and enters it.
    pub fn add_struct_def(&mut self, token: &Rc<Token>, is_class: bool) -> Result<NodeId, ErrorCode> {
        if matches!(self.node(self.current).kind, NodeKind::LocalScope { .. }) {
            return Err(ErrorCode::StructInLocalScope);
        }
        let lexeme = token.lexeme().to_string();
        if self.reserved_child(&lexeme).is_some() {
            return Err(ErrorCode::NameIsReserved);
        }
        if self.node(self.current).children.contains_key(&lexeme) {
            return Err(ErrorCode::NameAlreadyExists);
        }
        let id = self.push_node(
            Some(self.current),
            NodeKind::StructDef {
                name: lexeme.clone(),
                is_class,
            },
        );
        self.register_child(self.current, lexeme, id);
        self.current = id;
        self.modified = true;
        Ok(id)
    }

    /// Adds an anonymous local scope and enters it.
    pub fn add_local_scope(&mut self, kind: BlockKind) -> NodeId {
        if matches!(self.node(self.current).kind, NodeKind::StructDef { .. }) {
            panic!("SymbolTree::add_local_scope: local scopes cannot open inside a struct body");
        }
        let id = self.push_node(Some(self.current), NodeKind::LocalScope { kind });
        self.current = id;
        self.modified = true;
        id
    }

    /// Exits the current scope, returning the new current scope. Returns
    /// `None` at the root. Leaving a local scope clears its set of declared
    /// variables.
    pub fn exit_scope(&mut self) -> Option<NodeId> {
        let parent = self.node(self.current).parent?;
        if matches!(self.node(self.current).kind, NodeKind::LocalScope { .. }) {
            let child_ids: Vec<NodeId> =
                self.node(self.current).children.values().copied().collect();
            for child in child_ids {
                if let NodeKind::FieldEntry { declared, .. } = &mut self.nodes[child.0 as usize].kind
                {
                    *declared = false;
                }
            }
        }
        self.current = parent;
        self.modified = true;
        Some(parent)
    }

    /// Adds a field entry in the current scope. The field's type must
    /// already be resolved (or be an explicit placeholder).
    pub fn add_field_entry(&mut self, field: Field) -> Result<NodeId, ErrorCode> {
        let lexeme = field.token.lexeme().to_string();
        if self.reserved_child(&lexeme).is_some() {
            return Err(ErrorCode::NameIsReserved);
        }
        if self.node(self.current).children.contains_key(&lexeme) {
            return Err(ErrorCode::NameAlreadyExists);
        }
        let id = self.push_node(
            Some(self.current),
            NodeKind::FieldEntry {
                field,
                declared: false,
            },
        );
        self.register_child(self.current, lexeme, id);
        self.modified = true;
        Ok(id)
    }

    /// Adds a function signature in the current scope, creating the
    /// declaration node on first sight and extending the overload set
    /// otherwise. Returns the declaration node and the signature's index.
    pub fn add_function_signature(
        &mut self,
        token: &Rc<Token>,
        signature: Signature,
    ) -> Result<(NodeId, usize), ErrorCode> {
        let lexeme = token.lexeme().to_string();
        if self.reserved_child(&lexeme).is_some() {
            return Err(ErrorCode::NameIsReserved);
        }
        if let Some(&existing) = self.node(self.current).children.get(&lexeme) {
            return match &mut self.nodes[existing.0 as usize].kind {
                NodeKind::FunctionDecl { signatures, .. } => {
                    signatures.push(signature);
                    self.modified = true;
                    Ok((existing, signatures.len() - 1))
                }
                _ => Err(ErrorCode::NameAlreadyExists),
            };
        }
        let id = self.push_node(
            Some(self.current),
            NodeKind::FunctionDecl {
                name: lexeme.clone(),
                signatures: vec![signature],
            },
        );
        self.register_child(self.current, lexeme, id);
        self.modified = true;
        Ok((id, 0))
    }

    /// Whether the signature at `index` duplicates an earlier overload
    /// (same arity, same parameter types). Only meaningful once both
    /// signatures are resolved.
    pub fn signature_conflicts(&self, decl: NodeId, index: usize) -> bool {
        let NodeKind::FunctionDecl { signatures, .. } = &self.node(decl).kind else {
            return false;
        };
        let candidate = &signatures[index];
        signatures[..index].iter().any(|sig| {
            sig.resolved
                && sig.params.len() == candidate.params.len()
                && sig
                    .params
                    .iter()
                    .zip(&candidate.params)
                    .all(|(a, b)| a.ty.same(&b.ty))
        })
    }

    /// Resolves a multi-part name. The reserved scope is searched first as
    /// a sibling root; its hits win over any user-defined name.
    pub fn search_name(&self, name: &Name) -> Option<NodeId> {
        if let Some(found) = self.search_down(self.reserved, name) {
            return Some(found);
        }
        self.search_from(self.current, name)
    }

    /// Resolves a name starting the upward walk at `scope`.
    pub fn search_from(&self, scope: NodeId, name: &Name) -> Option<NodeId> {
        let mut scope = Some(scope);
        while let Some(anchor) = scope {
            if let Some(found) = self.search_down(anchor, name) {
                return Some(found);
            }
            scope = self.node(anchor).parent;
        }
        None
    }

    fn search_down(&self, scope: NodeId, name: &Name) -> Option<NodeId> {
        let mut node = *self
            .node(scope)
            .children
            .get(name.parts[0].token.lexeme())?;
        for part in &name.parts[1..] {
            if !self.node(node).kind.is_scope() {
                return None;
            }
            node = *self.node(node).children.get(part.token.lexeme())?;
        }
        Some(node)
    }

    /// Looks up the field entry for `member` within a struct definition.
    pub fn struct_field(&self, def: NodeId, member: &str) -> Option<NodeId> {
        let id = *self.node(def).children.get(member)?;
        matches!(self.node(id).kind, NodeKind::FieldEntry { .. }).then_some(id)
    }

    /// The packed byte size of a struct definition: the sum of its field
    /// sizes in declaration order. Recursive struct membership contributes
    /// zero rather than recursing forever.
    pub fn struct_byte_size(&self, def: NodeId) -> usize {
        if self.sizing_stack.borrow().contains(&def) {
            return 0;
        }
        self.sizing_stack.borrow_mut().push(def);
        let size = self
            .node(def)
            .order
            .iter()
            .filter_map(|&child| match &self.node(child).kind {
                NodeKind::FieldEntry { field, .. } => Some(field.ty.byte_size(self)),
                _ => None,
            })
            .sum();
        self.sizing_stack.borrow_mut().pop();
        size
    }

    /// The packed byte offset and type of a struct field, by declaration
    /// order.
    pub fn struct_field_offset(&self, def: NodeId, member: &str) -> Option<(usize, Type)> {
        let mut offset = 0;
        for &child in &self.node(def).order {
            if let NodeKind::FieldEntry { field, .. } = &self.node(child).kind {
                if field.token.lexeme() == member {
                    return Some((offset, field.ty.clone()));
                }
                offset += field.ty.byte_size(self);
            }
        }
        None
    }

    /// Convenience accessor for a field entry's data.
    pub fn field(&self, id: NodeId) -> Option<&Field> {
        match &self.node(id).kind {
            NodeKind::FieldEntry { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, id: NodeId) -> Option<&mut Field> {
        self.modified = true;
        match &mut self.nodes[id.0 as usize].kind {
            NodeKind::FieldEntry { field, .. } => Some(field),
            _ => None,
        }
    }

    pub fn is_declared(&self, id: NodeId) -> bool {
        match &self.node(id).kind {
            NodeKind::FieldEntry { declared, .. } => *declared,
            _ => false,
        }
    }

    pub fn mark_declared(&mut self, id: NodeId) {
        self.modified = true;
        if let NodeKind::FieldEntry { declared, .. } = &mut self.nodes[id.0 as usize].kind {
            *declared = true;
        }
    }

    /// Whether `scope` sits inside (or is) a local scope; field entries in
    /// such scopes obey declared-before-use.
    pub fn in_local_scope(&self, mut scope: NodeId) -> bool {
        loop {
            match &self.node(scope).kind {
                NodeKind::LocalScope { .. } => return true,
                _ => match self.node(scope).parent {
                    Some(parent) => scope = parent,
                    None => return false,
                },
            }
        }
    }
}
