use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileId(pub u16);

#[derive(Clone, Debug)]
pub struct SourceFile {
    pub name: String,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub file: FileId,
    pub line: u32,
    pub col: u32,
    pub len: u32,
}

impl Token {
    pub fn none() -> Token {
        Token {
            file: FileId(0),
            line: 0,
            col: 0,
            len: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Bool,
    Char,
    Int,
    Long,
    Float,
    Double,
    String,
    Pointer,
    Void,
    Class,
    VarArgs,
}

pub fn builtin_from_name(name: &str) -> Option<BuiltinType> {
    Some(match name {
        "Bool" => BuiltinType::Bool,
        "Char" => BuiltinType::Char,
        "Int" => BuiltinType::Int,
        "Long" => BuiltinType::Long,
        "Float" => BuiltinType::Float,
        "Double" => BuiltinType::Double,
        "String" => BuiltinType::String,
        "Pointer" => BuiltinType::Pointer,
        "Void" => BuiltinType::Void,
        "Class" => BuiltinType::Class,
        "VarArgs" => BuiltinType::VarArgs,
        _ => return None,
    })
}

/// What a named type resolved to. `Generic` points at the declaration that
/// introduced the type parameter (a class or a function).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Decl(NodeId),
    Interface(NodeId),
    Generic(NodeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SugarKind {
    Pointer,
    Reference,
    Array,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Builtin(BuiltinType),
    Base {
        name: String,
        args: Vec<Type>,
        ref_: Option<TypeRef>,
    },
    Sugar {
        kind: SugarKind,
        inner: Box<Type>,
    },
    Func {
        params: Vec<Type>,
        ret: Option<Box<Type>>,
    },
    List(Vec<Type>),
    AnonStruct {
        types: Vec<Type>,
    },
}

impl Type {
    pub fn base(name: impl Into<String>) -> Type {
        Type::Base {
            name: name.into(),
            args: Vec::new(),
            ref_: None,
        }
    }

    pub fn pointer(inner: Type) -> Type {
        Type::Sugar {
            kind: SugarKind::Pointer,
            inner: Box::new(inner),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Builtin(BuiltinType::Void))
    }

    /// Strips all sugar wrappers, returning the bare type and how many were
    /// removed.
    pub fn strip_sugar(&self) -> (&Type, usize) {
        let mut cur = self;
        let mut depth = 0;
        while let Type::Sugar { inner, .. } = cur {
            cur = inner.as_ref();
            depth += 1;
        }
        (cur, depth)
    }

    /// Removes exactly `count` sugar wrappers, or reports how short it fell.
    pub fn strip_sugar_exact(&self, count: usize) -> Option<&Type> {
        let mut cur = self;
        for _ in 0..count {
            match cur {
                Type::Sugar { inner, .. } => cur = inner.as_ref(),
                _ => return None,
            }
        }
        Some(cur)
    }

    pub fn pretty(&self) -> TypePretty<'_> {
        TypePretty(self)
    }
}

pub struct TypePretty<'a>(&'a Type);

impl fmt::Display for TypePretty<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Type::Builtin(b) => {
                let name = match b {
                    BuiltinType::Bool => "Bool",
                    BuiltinType::Char => "Char",
                    BuiltinType::Int => "Int",
                    BuiltinType::Long => "Long",
                    BuiltinType::Float => "Float",
                    BuiltinType::Double => "Double",
                    BuiltinType::String => "String",
                    BuiltinType::Pointer => "Pointer",
                    BuiltinType::Void => "Void",
                    BuiltinType::Class => "Class",
                    BuiltinType::VarArgs => "VarArgs",
                };
                f.write_str(name)
            }
            Type::Base { name, args, .. } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", a.pretty())?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Type::Sugar { kind, inner } => {
                write!(f, "{}", inner.pretty())?;
                f.write_str(match kind {
                    SugarKind::Pointer => "*",
                    SugarKind::Reference => "@",
                    SugarKind::Array => "[]",
                })
            }
            Type::Func { params, ret } => {
                f.write_str("Func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p.pretty())?;
                }
                f.write_str(")")?;
                if let Some(r) = ret {
                    write!(f, " -> {}", r.pretty())?;
                }
                Ok(())
            }
            Type::List(items) => {
                f.write_str("(")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t.pretty())?;
                }
                f.write_str(")")
            }
            Type::AnonStruct { types } => {
                f.write_str("struct<")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t.pretty())?;
                }
                f.write_str(">")
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Module {
    pub token: Token,
    pub name: String,
    pub file: FileId,
    pub body: Vec<NodeId>,
    pub import_names: Vec<String>,
    pub imports: Vec<NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Local,
    Arg,
    VarArg,
    Field,
    Global,
}

#[derive(Clone, Debug)]
pub struct VariableDecl {
    pub token: Token,
    pub name: String,
    pub kind: VarKind,
    pub ty: Option<Type>,
    pub expr: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub token: Token,
    pub name: String,
    pub suffix: Option<String>,
    pub args: Vec<NodeId>,
    pub type_params: Vec<String>,
    pub constraints: Vec<(String, Type)>,
    pub return_type: Option<Type>,
    pub body: Option<NodeId>,
    pub owner: Option<NodeId>,
    pub is_extern: bool,
    pub is_static: bool,
    pub is_anon: bool,
    pub is_this_ref: bool,
    pub do_inline: bool,
    pub extern_variadic: bool,
    pub inline_copy: Option<NodeId>,
    pub inferred_return_type: Option<Type>,
}

impl FunctionDecl {
    pub fn new(token: Token, name: impl Into<String>) -> FunctionDecl {
        FunctionDecl {
            token,
            name: name.into(),
            suffix: None,
            args: Vec::new(),
            type_params: Vec::new(),
            constraints: Vec::new(),
            return_type: None,
            body: None,
            owner: None,
            is_extern: false,
            is_static: false,
            is_anon: false,
            is_this_ref: false,
            do_inline: false,
            extern_variadic: false,
            inline_copy: None,
            inferred_return_type: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub token: Token,
    pub name: String,
    pub type_params: Vec<String>,
    pub super_name: Option<String>,
    pub super_ref: Option<NodeId>,
    pub interface_names: Vec<String>,
    pub interface_refs: Vec<NodeId>,
    pub fields: Vec<NodeId>,
    pub functions: Vec<NodeId>,
    pub implicit_convs: Vec<NodeId>,
    pub meta: Option<NodeId>,
    pub non_meta: Option<NodeId>,
    pub this_decl: Option<NodeId>,
    pub is_meta: bool,
}

impl TypeDecl {
    pub fn new(token: Token, name: impl Into<String>) -> TypeDecl {
        TypeDecl {
            token,
            name: name.into(),
            type_params: Vec::new(),
            super_name: None,
            super_ref: None,
            interface_names: Vec::new(),
            interface_refs: Vec::new(),
            fields: Vec::new(),
            functions: Vec::new(),
            implicit_convs: Vec::new(),
            meta: None,
            non_meta: None,
            this_decl: None,
            is_meta: false,
        }
    }

    /// The instance form of this class as a type, generic parameters applied
    /// as themselves.
    pub fn instance_type(&self, self_id: NodeId) -> Type {
        Type::Base {
            name: self.name.clone(),
            args: self
                .type_params
                .iter()
                .map(|p| Type::Base {
                    name: p.clone(),
                    args: Vec::new(),
                    ref_: Some(TypeRef::Generic(self_id)),
                })
                .collect(),
            ref_: Some(TypeRef::Decl(self_id)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct InterfaceDecl {
    pub token: Token,
    pub name: String,
    pub functions: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct NamespaceDecl {
    pub token: Token,
    pub name: String,
    pub body: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct VariableAccess {
    pub token: Token,
    pub expr: Option<NodeId>,
    pub name: String,
    pub ref_: Option<NodeId>,
}

impl VariableAccess {
    pub fn to(token: Token, target: NodeId, name: impl Into<String>) -> VariableAccess {
        VariableAccess {
            token,
            expr: None,
            name: name.into(),
            ref_: Some(target),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FunctionCall {
    pub token: Token,
    pub expr: Option<NodeId>,
    pub name: String,
    pub suffix: Option<String>,
    pub args: Vec<NodeId>,
    pub type_args: Vec<Type>,
    pub return_args: Vec<Option<NodeId>>,
    pub return_type: Option<Type>,
    pub ref_: Option<NodeId>,
    pub ref_score: i64,
    pub virtual_: bool,
    pub args_before_conversion: Option<HashMap<usize, NodeId>>,
    pub candidate_uses_as: bool,
}

impl FunctionCall {
    pub fn new(token: Token, name: impl Into<String>) -> FunctionCall {
        FunctionCall {
            token,
            expr: None,
            name: name.into(),
            suffix: None,
            args: Vec::new(),
            type_args: Vec::new(),
            return_args: Vec::new(),
            return_type: None,
            ref_: None,
            ref_score: i64::MIN,
            virtual_: false,
            args_before_conversion: None,
            candidate_uses_as: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AddressOf {
    pub token: Token,
    pub inner: NodeId,
    pub for_generics: bool,
}

#[derive(Clone, Debug)]
pub struct Cast {
    pub token: Token,
    pub inner: NodeId,
    pub target: Type,
    /// Conversion function backing an implicit `as` cast, when there is one.
    pub conv: Option<NodeId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Assign,
    Eq,
}

#[derive(Clone, Debug)]
pub struct BinaryOp {
    pub token: Token,
    pub op: BinOpKind,
    pub left: NodeId,
    pub right: NodeId,
}

#[derive(Clone, Debug)]
pub struct CommaSequence {
    pub token: Token,
    pub items: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct StructLiteral {
    pub token: Token,
    pub ty: Type,
    pub values: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct TypeAccess {
    pub token: Token,
    pub inner: Type,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub token: Token,
    pub body: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct InlineContext {
    pub token: Token,
    pub body: Vec<NodeId>,
    pub return_args: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct Return {
    pub token: Token,
    pub expr: Option<NodeId>,
}

#[derive(Clone, Debug)]
pub enum Node {
    Module(Module),
    FunctionDecl(FunctionDecl),
    TypeDecl(TypeDecl),
    InterfaceDecl(InterfaceDecl),
    NamespaceDecl(NamespaceDecl),
    VariableDecl(VariableDecl),
    VariableAccess(VariableAccess),
    FunctionCall(FunctionCall),
    AddressOf(AddressOf),
    Cast(Cast),
    BinaryOp(BinaryOp),
    CommaSequence(CommaSequence),
    StructLiteral(StructLiteral),
    TypeAccess(TypeAccess),
    IntLiteral { token: Token, value: i64 },
    FloatLiteral { token: Token, value: f64 },
    StringLiteral { token: Token, value: String },
    BoolLiteral { token: Token, value: bool },
    NullLiteral { token: Token },
    Block(Block),
    InlineContext(InlineContext),
    Return(Return),
}

impl Node {
    pub fn token(&self) -> Token {
        match self {
            Node::Module(n) => n.token,
            Node::FunctionDecl(n) => n.token,
            Node::TypeDecl(n) => n.token,
            Node::InterfaceDecl(n) => n.token,
            Node::NamespaceDecl(n) => n.token,
            Node::VariableDecl(n) => n.token,
            Node::VariableAccess(n) => n.token,
            Node::FunctionCall(n) => n.token,
            Node::AddressOf(n) => n.token,
            Node::Cast(n) => n.token,
            Node::BinaryOp(n) => n.token,
            Node::CommaSequence(n) => n.token,
            Node::StructLiteral(n) => n.token,
            Node::TypeAccess(n) => n.token,
            Node::IntLiteral { token, .. }
            | Node::FloatLiteral { token, .. }
            | Node::StringLiteral { token, .. }
            | Node::BoolLiteral { token, .. }
            | Node::NullLiteral { token } => *token,
            Node::Block(n) => n.token,
            Node::InlineContext(n) => n.token,
            Node::Return(n) => n.token,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Module(_) => "Module",
            Node::FunctionDecl(_) => "FunctionDecl",
            Node::TypeDecl(_) => "TypeDecl",
            Node::InterfaceDecl(_) => "InterfaceDecl",
            Node::NamespaceDecl(_) => "NamespaceDecl",
            Node::VariableDecl(_) => "VariableDecl",
            Node::VariableAccess(_) => "VariableAccess",
            Node::FunctionCall(_) => "FunctionCall",
            Node::AddressOf(_) => "AddressOf",
            Node::Cast(_) => "Cast",
            Node::BinaryOp(_) => "BinaryOp",
            Node::CommaSequence(_) => "CommaSequence",
            Node::StructLiteral(_) => "StructLiteral",
            Node::TypeAccess(_) => "TypeAccess",
            Node::IntLiteral { .. } => "IntLiteral",
            Node::FloatLiteral { .. } => "FloatLiteral",
            Node::StringLiteral { .. } => "StringLiteral",
            Node::BoolLiteral { .. } => "BoolLiteral",
            Node::NullLiteral { .. } => "NullLiteral",
            Node::Block(_) => "Block",
            Node::InlineContext(_) => "InlineContext",
            Node::Return(_) => "Return",
        }
    }

    /// Forward-owned children, in source order. Back references (`ref_`,
    /// `owner`, `super_ref`, `inline_copy`) are not children.
    pub fn child_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        match self {
            Node::Module(n) => out.extend(n.body.iter().copied()),
            Node::FunctionDecl(n) => {
                out.extend(n.args.iter().copied());
                out.extend(n.body);
            }
            Node::TypeDecl(n) => {
                out.extend(n.this_decl);
                out.extend(n.fields.iter().copied());
                out.extend(n.functions.iter().copied());
                out.extend(n.meta);
            }
            Node::InterfaceDecl(n) => out.extend(n.functions.iter().copied()),
            Node::NamespaceDecl(n) => out.extend(n.body.iter().copied()),
            Node::VariableDecl(n) => out.extend(n.expr),
            Node::VariableAccess(n) => out.extend(n.expr),
            Node::FunctionCall(n) => {
                out.extend(n.expr);
                out.extend(n.args.iter().copied());
            }
            Node::AddressOf(n) => out.push(n.inner),
            Node::Cast(n) => out.push(n.inner),
            Node::BinaryOp(n) => {
                out.push(n.left);
                out.push(n.right);
            }
            Node::CommaSequence(n) => out.extend(n.items.iter().copied()),
            Node::StructLiteral(n) => out.extend(n.values.iter().copied()),
            Node::TypeAccess(_) => {}
            Node::IntLiteral { .. }
            | Node::FloatLiteral { .. }
            | Node::StringLiteral { .. }
            | Node::BoolLiteral { .. }
            | Node::NullLiteral { .. } => {}
            Node::Block(n) => out.extend(n.body.iter().copied()),
            Node::InlineContext(n) => out.extend(n.body.iter().copied()),
            Node::Return(n) => out.extend(n.expr),
        }
        out
    }

    /// Substitutes exactly one child pointer. Returns whether a slot matched.
    pub fn replace_child(&mut self, old: NodeId, new: NodeId) -> bool {
        fn swap_opt(slot: &mut Option<NodeId>, old: NodeId, new: NodeId) -> bool {
            if *slot == Some(old) {
                *slot = Some(new);
                return true;
            }
            false
        }
        fn swap_vec(slots: &mut [NodeId], old: NodeId, new: NodeId) -> bool {
            for slot in slots {
                if *slot == old {
                    *slot = new;
                    return true;
                }
            }
            false
        }
        match self {
            Node::Module(n) => swap_vec(&mut n.body, old, new),
            Node::FunctionDecl(n) => {
                swap_vec(&mut n.args, old, new) || swap_opt(&mut n.body, old, new)
            }
            Node::TypeDecl(n) => {
                swap_vec(&mut n.fields, old, new) || swap_vec(&mut n.functions, old, new)
            }
            Node::InterfaceDecl(n) => swap_vec(&mut n.functions, old, new),
            Node::NamespaceDecl(n) => swap_vec(&mut n.body, old, new),
            Node::VariableDecl(n) => swap_opt(&mut n.expr, old, new),
            Node::VariableAccess(n) => swap_opt(&mut n.expr, old, new),
            Node::FunctionCall(n) => {
                swap_opt(&mut n.expr, old, new) || swap_vec(&mut n.args, old, new)
            }
            Node::AddressOf(n) => {
                if n.inner == old {
                    n.inner = new;
                    return true;
                }
                false
            }
            Node::Cast(n) => {
                if n.inner == old {
                    n.inner = new;
                    return true;
                }
                false
            }
            Node::BinaryOp(n) => {
                if n.left == old {
                    n.left = new;
                    return true;
                }
                if n.right == old {
                    n.right = new;
                    return true;
                }
                false
            }
            Node::CommaSequence(n) => swap_vec(&mut n.items, old, new),
            Node::StructLiteral(n) => swap_vec(&mut n.values, old, new),
            Node::TypeAccess(_) => false,
            Node::IntLiteral { .. }
            | Node::FloatLiteral { .. }
            | Node::StringLiteral { .. }
            | Node::BoolLiteral { .. }
            | Node::NullLiteral { .. } => false,
            Node::Block(n) => swap_vec(&mut n.body, old, new),
            Node::InlineContext(n) => swap_vec(&mut n.body, old, new),
            Node::Return(n) => swap_opt(&mut n.expr, old, new),
        }
    }
}

#[derive(Default)]
pub struct Pool {
    nodes: Vec<Node>,
    pub files: Vec<SourceFile>,
}

impl Pool {
    pub fn new() -> Pool {
        Pool::default()
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn add_file(&mut self, name: impl Into<String>, text: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u16);
        self.files.push(SourceFile {
            name: name.into(),
            text: text.into(),
        });
        id
    }

    pub fn file_name(&self, id: FileId) -> &str {
        self.files
            .get(id.0 as usize)
            .map(|f| f.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn set(&mut self, id: NodeId, node: Node) {
        self.nodes[id.0 as usize] = node;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn token(&self, id: NodeId) -> Token {
        self.get(id).token()
    }

    pub fn kind_name(&self, id: NodeId) -> &'static str {
        self.get(id).kind_name()
    }

    pub fn as_call(&self, id: NodeId) -> Option<&FunctionCall> {
        match self.get(id) {
            Node::FunctionCall(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_func(&self, id: NodeId) -> Option<&FunctionDecl> {
        match self.get(id) {
            Node::FunctionDecl(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_type_decl(&self, id: NodeId) -> Option<&TypeDecl> {
        match self.get(id) {
            Node::TypeDecl(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_var(&self, id: NodeId) -> Option<&VariableDecl> {
        match self.get(id) {
            Node::VariableDecl(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_access(&self, id: NodeId) -> Option<&VariableAccess> {
        match self.get(id) {
            Node::VariableAccess(a) => Some(a),
            _ => None,
        }
    }

    pub fn call(&self, id: NodeId) -> &FunctionCall {
        match self.get(id) {
            Node::FunctionCall(c) => c,
            other => unreachable_kind("FunctionCall", other),
        }
    }

    pub fn call_mut(&mut self, id: NodeId) -> &mut FunctionCall {
        match self.get_mut(id) {
            Node::FunctionCall(c) => c,
            other => unreachable_kind("FunctionCall", other),
        }
    }

    pub fn func(&self, id: NodeId) -> &FunctionDecl {
        match self.get(id) {
            Node::FunctionDecl(f) => f,
            other => unreachable_kind("FunctionDecl", other),
        }
    }

    pub fn func_mut(&mut self, id: NodeId) -> &mut FunctionDecl {
        match self.get_mut(id) {
            Node::FunctionDecl(f) => f,
            other => unreachable_kind("FunctionDecl", other),
        }
    }

    pub fn type_decl(&self, id: NodeId) -> &TypeDecl {
        match self.get(id) {
            Node::TypeDecl(t) => t,
            other => unreachable_kind("TypeDecl", other),
        }
    }

    pub fn type_decl_mut(&mut self, id: NodeId) -> &mut TypeDecl {
        match self.get_mut(id) {
            Node::TypeDecl(t) => t,
            other => unreachable_kind("TypeDecl", other),
        }
    }

    pub fn var(&self, id: NodeId) -> &VariableDecl {
        match self.get(id) {
            Node::VariableDecl(v) => v,
            other => unreachable_kind("VariableDecl", other),
        }
    }

    pub fn var_mut(&mut self, id: NodeId) -> &mut VariableDecl {
        match self.get_mut(id) {
            Node::VariableDecl(v) => v,
            other => unreachable_kind("VariableDecl", other),
        }
    }

    pub fn module(&self, id: NodeId) -> &Module {
        match self.get(id) {
            Node::Module(m) => m,
            other => unreachable_kind("Module", other),
        }
    }

    pub fn module_mut(&mut self, id: NodeId) -> &mut Module {
        match self.get_mut(id) {
            Node::Module(m) => m,
            other => unreachable_kind("Module", other),
        }
    }

    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> bool {
        self.get_mut(parent).replace_child(old, new)
    }

    /// All nodes of a subtree in pre-order, following forward-owned links.
    pub fn collect_subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let mut kids = self.get(id).child_ids();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Deep clone of a subtree. Child links and intra-subtree back
    /// references are remapped to the fresh nodes; resolution state on
    /// cloned calls and accesses is dropped so the clone re-resolves in
    /// whatever context it lands in.
    pub fn clone_subtree(&mut self, root: NodeId) -> NodeId {
        let order = self.collect_subtree(root);
        let mut map: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
        for &old in &order {
            let node = self.get(old).clone();
            let new = self.add(node);
            map.insert(old, new);
        }
        for &old in &order {
            let new = map[&old];
            let mut node = self.get(new).clone();
            remap_node(&mut node, &map);
            self.set(new, node);
        }
        map[&root]
    }
}

fn unreachable_kind(wanted: &str, got: &Node) -> ! {
    panic!("expected {} node, pool holds {}", wanted, got.kind_name())
}

fn remap(id: &mut NodeId, map: &HashMap<NodeId, NodeId>) {
    if let Some(new) = map.get(id) {
        *id = *new;
    }
}

fn remap_opt(id: &mut Option<NodeId>, map: &HashMap<NodeId, NodeId>) {
    if let Some(inner) = id {
        remap(inner, map);
    }
}

fn remap_vec(ids: &mut [NodeId], map: &HashMap<NodeId, NodeId>) {
    for id in ids {
        remap(id, map);
    }
}

fn remap_node(node: &mut Node, map: &HashMap<NodeId, NodeId>) {
    match node {
        Node::Module(n) => {
            remap_vec(&mut n.body, map);
            remap_vec(&mut n.imports, map);
        }
        Node::FunctionDecl(n) => {
            remap_vec(&mut n.args, map);
            remap_opt(&mut n.body, map);
            remap_opt(&mut n.owner, map);
            // A clone never shares the original's inline body.
            n.inline_copy = None;
        }
        Node::TypeDecl(n) => {
            remap_vec(&mut n.fields, map);
            remap_vec(&mut n.functions, map);
            remap_vec(&mut n.implicit_convs, map);
            remap_opt(&mut n.super_ref, map);
            remap_vec(&mut n.interface_refs, map);
            remap_opt(&mut n.meta, map);
            remap_opt(&mut n.non_meta, map);
            remap_opt(&mut n.this_decl, map);
        }
        Node::InterfaceDecl(n) => remap_vec(&mut n.functions, map),
        Node::NamespaceDecl(n) => remap_vec(&mut n.body, map),
        Node::VariableDecl(n) => remap_opt(&mut n.expr, map),
        Node::VariableAccess(n) => {
            remap_opt(&mut n.expr, map);
            // Keep the binding only when the target was cloned along; an
            // external target must be looked up again at the new site.
            match n.ref_ {
                Some(old) if map.contains_key(&old) => n.ref_ = Some(map[&old]),
                Some(_) => n.ref_ = None,
                None => {}
            }
        }
        Node::FunctionCall(n) => {
            remap_opt(&mut n.expr, map);
            remap_vec(&mut n.args, map);
            n.type_args.clear();
            n.return_args.clear();
            n.return_type = None;
            n.ref_ = None;
            n.ref_score = i64::MIN;
            n.virtual_ = false;
            n.args_before_conversion = None;
            n.candidate_uses_as = false;
        }
        Node::AddressOf(n) => remap(&mut n.inner, map),
        Node::Cast(n) => {
            remap(&mut n.inner, map);
            remap_opt(&mut n.conv, map);
        }
        Node::BinaryOp(n) => {
            remap(&mut n.left, map);
            remap(&mut n.right, map);
        }
        Node::CommaSequence(n) => remap_vec(&mut n.items, map),
        Node::StructLiteral(n) => remap_vec(&mut n.values, map),
        Node::TypeAccess(_) => {}
        Node::IntLiteral { .. }
        | Node::FloatLiteral { .. }
        | Node::StringLiteral { .. }
        | Node::BoolLiteral { .. }
        | Node::NullLiteral { .. } => {}
        Node::Block(n) => remap_vec(&mut n.body, map),
        Node::InlineContext(n) => {
            remap_vec(&mut n.body, map);
            remap_vec(&mut n.return_args, map);
        }
        Node::Return(n) => remap_opt(&mut n.expr, map),
    }
}

pub fn dump(pool: &Pool, root: NodeId) -> String {
    let mut out = String::new();
    dump_node(pool, root, 0, &mut out);
    out
}

fn push_line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(text);
    out.push('\n');
}

fn dump_node(pool: &Pool, id: NodeId, depth: usize, out: &mut String) {
    match pool.get(id) {
        Node::Module(m) => {
            push_line(out, depth, &format!("module {}", m.name));
            for &d in &m.body {
                dump_node(pool, d, depth + 1, out);
            }
        }
        Node::FunctionDecl(f) => {
            let mut head = String::from("func ");
            head.push_str(&f.name);
            if let Some(s) = &f.suffix {
                head.push('~');
                head.push_str(s);
            }
            if let Some(rt) = &f.return_type {
                head.push_str(&format!(" -> {}", rt.pretty()));
            }
            push_line(out, depth, &head);
            for &a in &f.args {
                dump_node(pool, a, depth + 1, out);
            }
            if let Some(b) = f.body {
                dump_node(pool, b, depth + 1, out);
            }
        }
        Node::TypeDecl(t) => {
            push_line(
                out,
                depth,
                &format!("{} {}", if t.is_meta { "meta" } else { "class" }, t.name),
            );
            for &f in &t.fields {
                dump_node(pool, f, depth + 1, out);
            }
            for &f in &t.functions {
                dump_node(pool, f, depth + 1, out);
            }
            if let Some(meta) = t.meta {
                dump_node(pool, meta, depth + 1, out);
            }
        }
        Node::InterfaceDecl(i) => {
            push_line(out, depth, &format!("interface {}", i.name));
            for &f in &i.functions {
                dump_node(pool, f, depth + 1, out);
            }
        }
        Node::NamespaceDecl(n) => {
            push_line(out, depth, &format!("namespace {}", n.name));
            for &d in &n.body {
                dump_node(pool, d, depth + 1, out);
            }
        }
        Node::VariableDecl(v) => {
            let ty = v
                .ty
                .as_ref()
                .map(|t| format!(": {}", t.pretty()))
                .unwrap_or_default();
            push_line(out, depth, &format!("var {}{}", v.name, ty));
            if let Some(e) = v.expr {
                dump_node(pool, e, depth + 1, out);
            }
        }
        Node::VariableAccess(a) => {
            push_line(out, depth, &format!("access {}", a.name));
            if let Some(e) = a.expr {
                dump_node(pool, e, depth + 1, out);
            }
        }
        Node::FunctionCall(c) => {
            let mut head = format!("call {}", c.name);
            if let Some(s) = &c.suffix {
                head.push('~');
                head.push_str(s);
            }
            if let Some(rt) = &c.return_type {
                head.push_str(&format!(" -> {}", rt.pretty()));
            }
            if c.ref_.is_some() {
                head.push_str(&format!(" [score {}]", c.ref_score));
            }
            push_line(out, depth, &head);
            if let Some(e) = c.expr {
                dump_node(pool, e, depth + 1, out);
            }
            for &a in &c.args {
                dump_node(pool, a, depth + 1, out);
            }
        }
        Node::AddressOf(a) => {
            push_line(
                out,
                depth,
                if a.for_generics {
                    "addressof (generic)"
                } else {
                    "addressof"
                },
            );
            dump_node(pool, a.inner, depth + 1, out);
        }
        Node::Cast(c) => {
            push_line(out, depth, &format!("cast -> {}", c.target.pretty()));
            dump_node(pool, c.inner, depth + 1, out);
        }
        Node::BinaryOp(b) => {
            let op = match b.op {
                BinOpKind::Add => "+",
                BinOpKind::Sub => "-",
                BinOpKind::Mul => "*",
                BinOpKind::Div => "/",
                BinOpKind::Assign => "=",
                BinOpKind::Eq => "==",
            };
            push_line(out, depth, &format!("binop {}", op));
            dump_node(pool, b.left, depth + 1, out);
            dump_node(pool, b.right, depth + 1, out);
        }
        Node::CommaSequence(c) => {
            push_line(out, depth, "comma");
            for &i in &c.items {
                dump_node(pool, i, depth + 1, out);
            }
        }
        Node::StructLiteral(s) => {
            push_line(out, depth, &format!("structlit {}", s.ty.pretty()));
            for &v in &s.values {
                dump_node(pool, v, depth + 1, out);
            }
        }
        Node::TypeAccess(t) => {
            push_line(out, depth, &format!("typeaccess {}", t.inner.pretty()));
        }
        Node::IntLiteral { value, .. } => push_line(out, depth, &format!("int {}", value)),
        Node::FloatLiteral { value, .. } => push_line(out, depth, &format!("float {}", value)),
        Node::StringLiteral { value, .. } => {
            push_line(out, depth, &format!("string {:?}", value))
        }
        Node::BoolLiteral { value, .. } => push_line(out, depth, &format!("bool {}", value)),
        Node::NullLiteral { .. } => push_line(out, depth, "null"),
        Node::Block(b) => {
            push_line(out, depth, "block");
            for &s in &b.body {
                dump_node(pool, s, depth + 1, out);
            }
        }
        Node::InlineContext(i) => {
            push_line(out, depth, "inline");
            for &s in &i.body {
                dump_node(pool, s, depth + 1, out);
            }
        }
        Node::Return(r) => {
            push_line(out, depth, "return");
            if let Some(e) = r.expr {
                dump_node(pool, e, depth + 1, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(pool: &mut Pool, v: i64) -> NodeId {
        pool.add(Node::IntLiteral {
            token: Token::none(),
            value: v,
        })
    }

    #[test]
    fn replace_child_swaps_exactly_one_slot() {
        let mut pool = Pool::new();
        let a = lit(&mut pool, 1);
        let b = lit(&mut pool, 2);
        let c = lit(&mut pool, 3);
        let mut call = FunctionCall::new(Token::none(), "f");
        call.args = vec![a, b];
        let call = pool.add(Node::FunctionCall(call));

        assert!(pool.replace_child(call, a, c));
        assert_eq!(pool.call(call).args, vec![c, b]);
        assert!(!pool.replace_child(call, a, c));
    }

    #[test]
    fn clone_subtree_remaps_internal_links_and_drops_resolution() {
        let mut pool = Pool::new();
        let init = lit(&mut pool, 7);
        let decl = pool.add(Node::VariableDecl(VariableDecl {
            token: Token::none(),
            name: "x".into(),
            kind: VarKind::Local,
            ty: Some(Type::Builtin(BuiltinType::Int)),
            expr: Some(init),
        }));
        let access = pool.add(Node::VariableAccess(VariableAccess {
            token: Token::none(),
            expr: None,
            name: "x".into(),
            ref_: Some(decl),
        }));
        let block = pool.add(Node::Block(Block {
            token: Token::none(),
            body: vec![decl, access],
        }));

        let copy = pool.clone_subtree(block);
        assert_ne!(copy, block);
        let (new_decl, new_access) = match pool.get(copy) {
            Node::Block(b) => (b.body[0], b.body[1]),
            other => panic!("unexpected clone root {}", other.kind_name()),
        };
        assert_ne!(new_decl, decl);
        // The access follows the cloned decl, not the original.
        match pool.get(new_access) {
            Node::VariableAccess(a) => assert_eq!(a.ref_, Some(new_decl)),
            other => panic!("unexpected node {}", other.kind_name()),
        }
    }

    #[test]
    fn clone_drops_external_bindings() {
        let mut pool = Pool::new();
        let outside = pool.add(Node::VariableDecl(VariableDecl {
            token: Token::none(),
            name: "g".into(),
            kind: VarKind::Global,
            ty: Some(Type::Builtin(BuiltinType::Int)),
            expr: None,
        }));
        let access = pool.add(Node::VariableAccess(VariableAccess {
            token: Token::none(),
            expr: None,
            name: "g".into(),
            ref_: Some(outside),
        }));
        let copy = pool.clone_subtree(access);
        match pool.get(copy) {
            Node::VariableAccess(a) => assert_eq!(a.ref_, None),
            other => panic!("unexpected node {}", other.kind_name()),
        }
    }
}
