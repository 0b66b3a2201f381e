// Purpose: Fixed-point resolver driver and per-node resolution over the AST pool.
// Inputs/Outputs: Mutates the pool in place until a pass makes no progress signal.
// Invariants: Trail depth is identical before and after every resolve_node call.
// Gotchas: Non-fatal passes suppress errors in favour of whole_again; the fatal
//          round upgrades the same conditions to diagnostics and aborts.

pub mod call;
pub mod trail;
pub mod types;

use crate::frontend::ast::*;
use crate::frontend::diagnostic::{
    Diagnostic, Diagnostics, E_INTERNAL, E_UNDEFINED_NAME, E_UNKNOWN_TYPE,
};
use crate::frontend::suggest;
use trail::Trail;
use types::expr_type;

#[derive(Clone, Debug)]
pub struct BuildParams {
    pub very_verbose: bool,
    pub helpful: bool,
    pub inlining: bool,
    pub max_rounds: u32,
    pub dump_ast: bool,
}

impl Default for BuildParams {
    fn default() -> Self {
        BuildParams {
            very_verbose: false,
            helpful: true,
            inlining: true,
            max_rounds: 32,
            dump_ast: false,
        }
    }
}

/// Per-call status. `Ok` means "nothing more for this node right now";
/// `Loop` aborts the current walk because the structure under the parent
/// changed. Nodes that merely need another pass call `whole_again` and
/// return `Ok` so their siblings keep making progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    Loop,
}

pub type ResolveOutcome = Result<Response, Diagnostic>;

pub struct Resolver {
    pub params: BuildParams,
    pub fatal: bool,
    stable: bool,
    pub round: u32,
    tmp_counter: u32,
    pub diags: Diagnostics,
}

impl Resolver {
    pub fn new(params: BuildParams) -> Resolver {
        Resolver {
            params,
            fatal: false,
            stable: true,
            round: 0,
            tmp_counter: 0,
            diags: Diagnostics::default(),
        }
    }

    /// Marks the whole AST as not yet stable so the driver schedules
    /// another pass.
    pub fn whole_again(&mut self, pool: &Pool, node: NodeId, reason: &str) {
        self.stable = false;
        if self.params.very_verbose {
            let token = pool.token(node);
            eprintln!(
                "[resolve] round {}: loop {} ({}) at {}:{}:{}",
                self.round,
                pool.kind_name(node),
                reason,
                pool.file_name(token.file),
                token.line,
                token.col
            );
        }
    }

    pub fn fresh_name(&mut self, purpose: &str) -> String {
        let n = self.tmp_counter;
        self.tmp_counter += 1;
        format!("__{}_{}", purpose, n)
    }

    /// Runs resolution to quiescence. On failure the diagnostics sink holds
    /// at least one error.
    pub fn run(&mut self, pool: &mut Pool, root: NodeId) -> Result<(), ()> {
        loop {
            self.stable = true;
            self.round += 1;
            if self.params.very_verbose {
                eprintln!(
                    "[resolve] round {}{}",
                    self.round,
                    if self.fatal { " (fatal)" } else { "" }
                );
            }
            let mut trail = Trail::new();
            let before = trail.depth();
            let outcome = resolve_node(self, pool, &mut trail, root);
            debug_assert_eq!(trail.depth(), before, "trail unbalanced after pass");
            if let Err(diag) = outcome {
                self.diags.push_diag(diag);
                return Err(());
            }
            if self.stable {
                return Ok(());
            }
            if self.fatal {
                // The fatal pass was supposed to turn every leftover into a
                // diagnostic; not settling here is our bug, not the user's.
                self.diags.push_diag(
                    Diagnostic::new(
                        format!(
                            "resolver did not settle after {} rounds",
                            self.round
                        ),
                        Some(pool.token(root)),
                    )
                    .code(E_INTERNAL),
                );
                return Err(());
            }
            if self.round >= self.params.max_rounds {
                self.fatal = true;
            }
        }
    }
}

pub fn resolve_node(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    trail.push(id);
    let outcome = resolve_inner(res, pool, trail, id);
    trail.pop(id);
    outcome
}

fn resolve_inner(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    match pool.get(id) {
        Node::Module(_) => resolve_module(res, pool, trail, id),
        Node::TypeDecl(_) => resolve_type_decl(res, pool, trail, id),
        Node::InterfaceDecl(_) => {
            let funcs = match pool.get(id) {
                Node::InterfaceDecl(i) => i.functions.clone(),
                _ => unreachable!(),
            };
            for f in funcs {
                if resolve_node(res, pool, trail, f)? == Response::Loop {
                    return Ok(Response::Loop);
                }
            }
            Ok(Response::Ok)
        }
        Node::NamespaceDecl(_) => {
            let body = match pool.get(id) {
                Node::NamespaceDecl(n) => n.body.clone(),
                _ => unreachable!(),
            };
            for d in body {
                if resolve_node(res, pool, trail, d)? == Response::Loop {
                    return Ok(Response::Loop);
                }
            }
            Ok(Response::Ok)
        }
        Node::FunctionDecl(_) => resolve_function(res, pool, trail, id),
        Node::VariableDecl(_) => resolve_variable(res, pool, trail, id),
        Node::VariableAccess(_) => resolve_access(res, pool, trail, id),
        Node::FunctionCall(_) => call::resolve_call_node(res, pool, trail, id),
        Node::AddressOf(a) => {
            let inner = a.inner;
            resolve_node(res, pool, trail, inner)
        }
        Node::Cast(c) => {
            let (inner, mut target, token) = (c.inner, c.target.clone(), c.token);
            let r = resolve_node(res, pool, trail, inner)?;
            if r == Response::Loop {
                return Ok(Response::Loop);
            }
            if !resolve_type(res, pool, trail, &mut target, token)? {
                res.whole_again(pool, id, "cast target not resolved");
            }
            match pool.get_mut(id) {
                Node::Cast(c) => c.target = target,
                _ => unreachable!(),
            }
            Ok(Response::Ok)
        }
        Node::BinaryOp(b) => {
            let (left, right) = (b.left, b.right);
            if resolve_node(res, pool, trail, left)? == Response::Loop {
                return Ok(Response::Loop);
            }
            if resolve_node(res, pool, trail, right)? == Response::Loop {
                return Ok(Response::Loop);
            }
            Ok(Response::Ok)
        }
        Node::CommaSequence(c) => {
            let items = c.items.clone();
            for item in items {
                if resolve_node(res, pool, trail, item)? == Response::Loop {
                    return Ok(Response::Loop);
                }
            }
            Ok(Response::Ok)
        }
        Node::StructLiteral(s) => {
            let values = s.values.clone();
            for v in values {
                if resolve_node(res, pool, trail, v)? == Response::Loop {
                    return Ok(Response::Loop);
                }
            }
            Ok(Response::Ok)
        }
        Node::Block(_) | Node::InlineContext(_) => resolve_body(res, pool, trail, id),
        Node::Return(_) => resolve_return(res, pool, trail, id),
        Node::TypeAccess(_)
        | Node::IntLiteral { .. }
        | Node::FloatLiteral { .. }
        | Node::StringLiteral { .. }
        | Node::BoolLiteral { .. }
        | Node::NullLiteral { .. } => Ok(Response::Ok),
    }
}

fn resolve_module(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let (imports, body) = {
        let m = pool.module(id);
        (m.imports.clone(), m.body.clone())
    };
    for import in imports {
        if resolve_node(res, pool, trail, import)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    for decl in body {
        if resolve_node(res, pool, trail, decl)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    Ok(Response::Ok)
}

fn resolve_type_decl(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let (super_name, super_ref, interface_names, interface_refs_len, token) = {
        let td = pool.type_decl(id);
        (
            td.super_name.clone(),
            td.super_ref,
            td.interface_names.clone(),
            td.interface_refs.len(),
            td.token,
        )
    };
    if let (Some(name), None) = (&super_name, super_ref) {
        match lookup_type_name(pool, trail, name) {
            Some(TypeRef::Decl(target)) => pool.type_decl_mut(id).super_ref = Some(target),
            _ => {
                if res.fatal {
                    return Err(unknown_type_diag(pool, trail, name, token));
                }
                res.whole_again(pool, id, "superclass not resolved");
            }
        }
    }
    if interface_refs_len < interface_names.len() {
        let mut refs = Vec::new();
        let mut all = true;
        for name in &interface_names {
            match lookup_type_name(pool, trail, name) {
                Some(TypeRef::Interface(target)) => refs.push(target),
                _ => {
                    if res.fatal {
                        return Err(unknown_type_diag(pool, trail, name, token));
                    }
                    all = false;
                }
            }
        }
        if all {
            pool.type_decl_mut(id).interface_refs = refs;
        } else {
            res.whole_again(pool, id, "interface not resolved");
        }
    }
    let (this_decl, fields, functions, meta) = {
        let td = pool.type_decl(id);
        (td.this_decl, td.fields.clone(), td.functions.clone(), td.meta)
    };
    if let Some(this_decl) = this_decl {
        if resolve_node(res, pool, trail, this_decl)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    for f in fields {
        if resolve_node(res, pool, trail, f)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    for f in functions {
        if resolve_node(res, pool, trail, f)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    if let Some(meta) = meta {
        if resolve_node(res, pool, trail, meta)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    Ok(Response::Ok)
}

fn resolve_function(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let (args, body, return_type, do_inline, inline_copy, token) = {
        let f = pool.func(id);
        (
            f.args.clone(),
            f.body,
            f.return_type.clone(),
            f.do_inline,
            f.inline_copy,
            f.token,
        )
    };
    // The inline body must be captured before call rewrites start mutating
    // the original.
    if do_inline && inline_copy.is_none() {
        if let Some(body) = body {
            let copy = pool.clone_subtree(body);
            pool.func_mut(id).inline_copy = Some(copy);
        }
    }
    if let Some(mut rt) = return_type {
        if !resolve_type(res, pool, trail, &mut rt, token)? {
            res.whole_again(pool, id, "return type not resolved");
        }
        pool.func_mut(id).return_type = Some(rt);
    }
    for arg in args {
        if resolve_node(res, pool, trail, arg)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    if let Some(body) = body {
        if resolve_node(res, pool, trail, body)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    Ok(Response::Ok)
}

fn resolve_variable(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let (ty, expr, token) = {
        let v = pool.var(id);
        (v.ty.clone(), v.expr, v.token)
    };
    if let Some(mut ty) = ty {
        if !resolve_type(res, pool, trail, &mut ty, token)? {
            res.whole_again(pool, id, "declared type not resolved");
        }
        pool.var_mut(id).ty = Some(ty);
    }
    if let Some(expr) = expr {
        if resolve_node(res, pool, trail, expr)? == Response::Loop {
            return Ok(Response::Loop);
        }
        if pool.var(id).ty.is_none() {
            match expr_type(pool, expr) {
                Some(inferred) => pool.var_mut(id).ty = Some(inferred),
                None => res.whole_again(pool, id, "initializer type unknown"),
            }
        }
    }
    Ok(Response::Ok)
}

fn resolve_access(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let (expr, name, ref_, token) = {
        let a = match pool.get(id) {
            Node::VariableAccess(a) => a,
            _ => unreachable!(),
        };
        (a.expr, a.name.clone(), a.ref_, a.token)
    };
    if let Some(expr) = expr {
        if resolve_node(res, pool, trail, expr)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    if ref_.is_some() {
        return Ok(Response::Ok);
    }
    let found = match expr {
        Some(receiver) => lookup_field(pool, receiver, &name),
        None => lookup_name(pool, trail, &name),
    };
    match found {
        Some(target) => {
            match pool.get_mut(id) {
                Node::VariableAccess(a) => a.ref_ = Some(target),
                _ => unreachable!(),
            }
        }
        None => {
            if res.fatal {
                let mut d = Diagnostic::new(
                    format!("undefined name `{}`", name),
                    Some(token),
                )
                .code(E_UNDEFINED_NAME);
                if res.params.helpful {
                    if let Some(h) = suggest::did_you_mean(&name, visible_names(pool, trail)) {
                        d = d.help(h);
                    }
                }
                return Err(d);
            }
            res.whole_again(pool, id, "name not resolved");
        }
    }
    Ok(Response::Ok)
}

fn resolve_return(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let expr = match pool.get(id) {
        Node::Return(r) => r.expr,
        _ => unreachable!(),
    };
    if let Some(expr) = expr {
        if resolve_node(res, pool, trail, expr)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    // Anonymous closures learn their return type from their return sites.
    if let Some(func) = trail.find_function(pool) {
        let f = pool.func(func);
        if f.is_anon && f.return_type.is_none() && f.inferred_return_type.is_none() {
            let inferred = match expr {
                Some(expr) => expr_type(pool, expr),
                None => Some(Type::Builtin(BuiltinType::Void)),
            };
            match inferred {
                Some(ty) => {
                    pool.func_mut(func).inferred_return_type = Some(ty);
                    res.whole_again(pool, id, "closure return type inferred");
                }
                None => res.whole_again(pool, id, "closure return type unknown"),
            }
        }
    }
    Ok(Response::Ok)
}

/// Statement lists re-find the child after each step because call rewrites
/// insert siblings and replace statements mid-iteration.
fn resolve_body(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let list = |pool: &Pool| -> Vec<NodeId> {
        match pool.get(id) {
            Node::Block(b) => b.body.clone(),
            Node::InlineContext(i) => i.body.clone(),
            _ => unreachable!(),
        }
    };
    let mut i = 0;
    loop {
        let body = list(pool);
        if i >= body.len() {
            break;
        }
        let child = body[i];
        if resolve_node(res, pool, trail, child)? == Response::Loop {
            return Ok(Response::Loop);
        }
        let body = list(pool);
        i = body
            .iter()
            .position(|&n| n == child)
            .map(|p| p + 1)
            .unwrap_or(i + 1);
    }
    Ok(Response::Ok)
}

// ---- name and type lookup over the trail ----

/// Resolves every name inside `ty`. Returns whether the type is fully
/// resolved; unknown names in the fatal round become diagnostics.
pub fn resolve_type(
    res: &mut Resolver,
    pool: &Pool,
    trail: &Trail,
    ty: &mut Type,
    token: Token,
) -> Result<bool, Diagnostic> {
    match ty {
        Type::Builtin(_) => Ok(true),
        Type::Base { name, args, ref_ } => {
            let mut done = true;
            if ref_.is_none() {
                match lookup_type_name(pool, trail, name) {
                    Some(found) => *ref_ = Some(found),
                    None => {
                        if res.fatal {
                            return Err(unknown_type_diag(pool, trail, name, token));
                        }
                        done = false;
                    }
                }
            }
            for arg in args {
                done &= resolve_type(res, pool, trail, arg, token)?;
            }
            Ok(done)
        }
        Type::Sugar { inner, .. } => resolve_type(res, pool, trail, inner, token),
        Type::Func { params, ret } => {
            let mut done = true;
            for p in params {
                done &= resolve_type(res, pool, trail, p, token)?;
            }
            if let Some(r) = ret {
                done &= resolve_type(res, pool, trail, r, token)?;
            }
            Ok(done)
        }
        Type::List(items) => {
            let mut done = true;
            for item in items {
                done &= resolve_type(res, pool, trail, item, token)?;
            }
            Ok(done)
        }
        Type::AnonStruct { .. } => Ok(true),
    }
}

fn unknown_type_diag(pool: &Pool, trail: &Trail, name: &str, token: Token) -> Diagnostic {
    let mut d = Diagnostic::new(format!("unknown type `{}`", name), Some(token))
        .code(E_UNKNOWN_TYPE);
    if let Some(h) = suggest::did_you_mean(name, visible_type_names(pool, trail)) {
        d = d.help(h);
    }
    d
}

pub fn lookup_type_name(pool: &Pool, trail: &Trail, name: &str) -> Option<TypeRef> {
    for i in (0..trail.depth()).rev() {
        let id = trail.get(i)?;
        match pool.get(id) {
            Node::FunctionDecl(f) => {
                if f.type_params.iter().any(|p| p == name) {
                    return Some(TypeRef::Generic(id));
                }
            }
            Node::TypeDecl(t) => {
                if t.type_params.iter().any(|p| p == name) {
                    return Some(TypeRef::Generic(id));
                }
            }
            Node::Module(_) => return lookup_type_in_module(pool, id, name),
            _ => {}
        }
    }
    None
}

fn lookup_type_in_module(pool: &Pool, module: NodeId, name: &str) -> Option<TypeRef> {
    let search = |body: &[NodeId]| -> Option<TypeRef> {
        for &decl in body {
            match pool.get(decl) {
                Node::TypeDecl(t) if t.name == name && !t.is_meta => {
                    return Some(TypeRef::Decl(decl))
                }
                Node::InterfaceDecl(i) if i.name == name => {
                    return Some(TypeRef::Interface(decl))
                }
                _ => {}
            }
        }
        None
    };
    let m = pool.module(module);
    if let Some(found) = search(&m.body) {
        return Some(found);
    }
    for &import in &m.imports {
        if let Some(found) = search(&pool.module(import).body) {
            return Some(found);
        }
    }
    None
}

/// Scope-outward name lookup: statement lists before the current subtree,
/// then function arguments, then fields, then module-level declarations and
/// imports.
pub fn lookup_name(pool: &Pool, trail: &Trail, name: &str) -> Option<NodeId> {
    if name == "this" {
        let func = trail.find_function(pool)?;
        let owner = pool.func(func).owner?;
        return pool.as_type_decl(owner).and_then(|td| td.this_decl);
    }
    for i in (0..trail.depth()).rev() {
        let id = trail.get(i)?;
        match pool.get(id) {
            Node::Block(b) => {
                if let Some(found) = scan_stmts(pool, &b.body, trail.get(i + 1), name) {
                    return Some(found);
                }
            }
            Node::InlineContext(ctx) => {
                if let Some(found) = scan_stmts(pool, &ctx.body, trail.get(i + 1), name) {
                    return Some(found);
                }
            }
            Node::FunctionDecl(f) => {
                for &arg in &f.args {
                    if pool.var(arg).name == name {
                        return Some(arg);
                    }
                }
            }
            Node::TypeDecl(_) => {
                let mut cur = Some(id);
                while let Some(c) = cur {
                    let td = pool.as_type_decl(c)?;
                    for &field in &td.fields {
                        if pool.var(field).name == name {
                            return Some(field);
                        }
                    }
                    cur = td.super_ref;
                }
            }
            Node::Module(_) => return lookup_name_in_module(pool, id, name),
            _ => {}
        }
    }
    None
}

fn scan_stmts(
    pool: &Pool,
    body: &[NodeId],
    path_child: Option<NodeId>,
    name: &str,
) -> Option<NodeId> {
    let limit = path_child
        .and_then(|child| body.iter().position(|&n| n == child))
        .unwrap_or(body.len());
    body[..limit]
        .iter()
        .copied()
        .find(|&stmt| matches!(pool.get(stmt), Node::VariableDecl(v) if v.name == name))
}

fn lookup_name_in_module(pool: &Pool, module: NodeId, name: &str) -> Option<NodeId> {
    let search = |body: &[NodeId]| -> Option<NodeId> {
        for &decl in body {
            match pool.get(decl) {
                Node::VariableDecl(v) if v.name == name => return Some(decl),
                Node::TypeDecl(t) if t.name == name && !t.is_meta => return Some(decl),
                Node::NamespaceDecl(n) if n.name == name => return Some(decl),
                _ => {}
            }
        }
        None
    };
    let m = pool.module(module);
    if let Some(found) = search(&m.body) {
        return Some(found);
    }
    for &import in &m.imports {
        if let Some(found) = search(&pool.module(import).body) {
            return Some(found);
        }
    }
    None
}

fn lookup_field(pool: &Pool, receiver: NodeId, name: &str) -> Option<NodeId> {
    let ty = expr_type(pool, receiver)?;
    let mut class = types::type_decl_of(pool, &ty);
    while let Some(c) = class {
        let td = pool.as_type_decl(c)?;
        for &field in &td.fields {
            if pool.var(field).name == name {
                return Some(field);
            }
        }
        class = td.super_ref;
    }
    None
}

fn visible_names(pool: &Pool, trail: &Trail) -> Vec<String> {
    let mut out = Vec::new();
    for i in (0..trail.depth()).rev() {
        let Some(id) = trail.get(i) else { continue };
        match pool.get(id) {
            Node::Block(b) => {
                for &stmt in &b.body {
                    if let Node::VariableDecl(v) = pool.get(stmt) {
                        out.push(v.name.clone());
                    }
                }
            }
            Node::FunctionDecl(f) => {
                for &arg in &f.args {
                    out.push(pool.var(arg).name.clone());
                }
            }
            Node::Module(m) => {
                for &decl in &m.body {
                    match pool.get(decl) {
                        Node::VariableDecl(v) => out.push(v.name.clone()),
                        Node::TypeDecl(t) if !t.is_meta => out.push(t.name.clone()),
                        Node::NamespaceDecl(n) => out.push(n.name.clone()),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    out.sort();
    out.dedup();
    out
}

fn visible_type_names(pool: &Pool, trail: &Trail) -> Vec<String> {
    let mut out = Vec::new();
    for i in 0..trail.depth() {
        let Some(id) = trail.get(i) else { continue };
        match pool.get(id) {
            Node::Module(m) => {
                for &decl in &m.body {
                    match pool.get(decl) {
                        Node::TypeDecl(t) if !t.is_meta => out.push(t.name.clone()),
                        Node::InterfaceDecl(iface) => out.push(iface.name.clone()),
                        _ => {}
                    }
                }
            }
            Node::TypeDecl(t) => out.extend(t.type_params.iter().cloned()),
            Node::FunctionDecl(f) => out.extend(f.type_params.iter().cloned()),
            _ => {}
        }
    }
    out.sort();
    out.dedup();
    out
}
