// Purpose: Overload resolution, generic-argument inference, and call-site rewrites.
// Inputs/Outputs: Mutates FunctionCall nodes toward ref/refScore/returnType and
//                 desugars optargs, varargs, interface casts, generic returns, super.
// Invariants: refScore > 0 iff ref holds the best known candidate; at most one
//             structural rewrite per call per pass, each followed by whole_again.
// Gotchas: Candidates are scored against pre-conversion arguments; implicit `as`
//          casts roll back whenever a better candidate takes over.

use std::collections::HashMap;

use crate::frontend::ast::*;
use crate::frontend::diagnostic::{
    Diagnostic, E_COULDNT_ADD_BEFORE, E_COULDNT_REPLACE, E_INTERNAL, E_UNRESOLVED_CALL,
    E_VOID_EXPRESSION,
};
use crate::frontend::suggest;

use super::trail::{is_scope, Trail};
use super::types::{
    contains_generic, expr_type, extract_type_arg, get_score, implicit_conv_for, interface_of,
    is_generic_param, is_referencable, is_varargs_box, real_typize, search_type_arg, type_eq,
    NOLUCK_SCORE, SCORE_SEED,
};
use super::{resolve_node, ResolveOutcome, Resolver, Response};

/// Implicit `as` conversions apply silently only toward extern functions;
/// everywhere else they are merely suggested in diagnostics.
const IMPLICIT_AS_EXTERNAL_ONLY: bool = true;

pub fn resolve_call_node(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    id: NodeId,
) -> ResolveOutcome {
    let (expr, args) = {
        let c = pool.call(id);
        (c.expr, c.args.clone())
    };
    if let Some(expr) = expr {
        if resolve_node(res, pool, trail, expr)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }
    for arg in args {
        if resolve_node(res, pool, trail, arg)? == Response::Loop {
            return Ok(Response::Loop);
        }
    }

    // Candidates keep competing until the return type is pinned down, so a
    // late-resolving argument type can still flip the winner.
    let (ref_, ref_score, settled) = {
        let c = pool.call(id);
        (c.ref_, c.ref_score, c.return_type.is_some())
    };
    if ref_.is_none() || ref_score <= 0 || !settled {
        if pool.call(id).name == "super" {
            gather_super(res, pool, trail, id)?;
        } else {
            for cand in collect_candidates(pool, trail, id) {
                suggest(pool, trail, id, cand);
            }
        }
    }

    let (ref_, ref_score) = {
        let c = pool.call(id);
        (c.ref_, c.ref_score)
    };
    let fref = match ref_ {
        Some(fref) if ref_score > 0 => fref,
        _ => {
            if res.fatal {
                return Err(unresolved_call_diag(res, pool, trail, id));
            }
            res.whole_again(pool, id, "no candidate yet");
            return Ok(Response::Ok);
        }
    };

    // Selection under unknown argument types is provisional; wait them out
    // unless this is the last chance to report anything at all.
    if !res.fatal && pool.call(id).return_type.is_none() {
        let args = pool.call(id).args.clone();
        if args.iter().any(|&a| expr_type(pool, a).is_none()) {
            res.whole_again(pool, id, "argument types not known yet");
            return Ok(Response::Ok);
        }
    }

    if !resolve_return_type(res, pool, trail, id, fref)? {
        return Ok(Response::Ok);
    }

    if let Some(r) = handle_inlining(res, pool, trail, id, fref)? {
        return Ok(r);
    }
    if let Some(r) = handle_generics(res, pool, trail, id, fref)? {
        return Ok(r);
    }
    if let Some(r) = handle_optargs(res, pool, id, fref) {
        return Ok(r);
    }
    if let Some(r) = handle_varargs(res, pool, trail, id, fref)? {
        return Ok(r);
    }
    if let Some(r) = handle_interfaces(res, pool, id, fref) {
        return Ok(r);
    }
    if let Some(r) = handle_unwrap(res, pool, trail, id, fref)? {
        return Ok(r);
    }
    if let Some(r) = handle_this_ref(res, pool, trail, id, fref)? {
        return Ok(r);
    }
    if let Some(r) = handle_super_expansion(res, pool, trail, id)? {
        return Ok(r);
    }

    check_void(res, pool, trail, id)?;
    Ok(Response::Ok)
}

// ---- candidate sourcing (stable order: lexical, then scope-outward) ----

fn call_is_member(pool: &Pool, call_id: NodeId) -> bool {
    let receiver = match pool.call(call_id).expr {
        Some(r) => r,
        None => return false,
    };
    match pool.get(receiver) {
        Node::VariableAccess(a) => !matches!(
            a.ref_.map(|t| pool.get(t)),
            Some(Node::NamespaceDecl(_))
        ),
        _ => true,
    }
}

fn functions_named(pool: &Pool, decls: &[NodeId], name: &str, out: &mut Vec<NodeId>) {
    for &decl in decls {
        if let Node::FunctionDecl(f) = pool.get(decl) {
            if f.name == name {
                out.push(decl);
            }
        }
    }
}

fn class_chain_candidates(pool: &Pool, mut class: Option<NodeId>, name: &str, out: &mut Vec<NodeId>) {
    while let Some(c) = class {
        let td = match pool.as_type_decl(c) {
            Some(td) => td,
            None => return,
        };
        functions_named(pool, &td.functions, name, out);
        if let Some(meta) = td.meta {
            if let Some(m) = pool.as_type_decl(meta) {
                functions_named(pool, &m.functions, name, out);
            }
        }
        class = td.super_ref;
    }
}

fn collect_candidates(pool: &Pool, trail: &Trail, call_id: NodeId) -> Vec<NodeId> {
    let (name, receiver) = {
        let c = pool.call(call_id);
        (c.name.clone(), c.expr)
    };
    let mut out = Vec::new();
    if let Some(receiver) = receiver {
        if let Node::VariableAccess(a) = pool.get(receiver) {
            match a.ref_.map(|t| (t, pool.get(t))) {
                Some((_, Node::NamespaceDecl(ns))) => {
                    functions_named(pool, &ns.body, &name, &mut out);
                    return out;
                }
                Some((t, Node::TypeDecl(_))) => {
                    // Static call through the class object: search the meta
                    // side of the chain.
                    let mut class = Some(t);
                    while let Some(c) = class {
                        let td = match pool.as_type_decl(c) {
                            Some(td) => td,
                            None => break,
                        };
                        if let Some(meta) = td.meta {
                            if let Some(m) = pool.as_type_decl(meta) {
                                functions_named(pool, &m.functions, &name, &mut out);
                            }
                        }
                        class = td.super_ref;
                    }
                    return out;
                }
                _ => {}
            }
        }
        let rty = match expr_type(pool, receiver) {
            Some(t) => t,
            None => return out,
        };
        if let Some(iface) = interface_of(&rty) {
            if let Node::InterfaceDecl(i) = pool.get(iface) {
                functions_named(pool, &i.functions, &name, &mut out);
            }
            return out;
        }
        class_chain_candidates(pool, super::types::type_decl_of(pool, &rty), &name, &mut out);
        return out;
    }
    // No receiver: enclosing type first, then the module and its imports.
    for i in (0..trail.depth()).rev() {
        let Some(id) = trail.get(i) else { continue };
        match pool.get(id) {
            Node::TypeDecl(td) if !td.is_meta => {
                class_chain_candidates(pool, Some(id), &name, &mut out);
            }
            Node::Module(m) => {
                functions_named(pool, &m.body, &name, &mut out);
                for &import in &m.imports {
                    functions_named(pool, &pool.module(import).body, &name, &mut out);
                }
                break;
            }
            _ => {}
        }
    }
    out
}

// ---- scoring ----

struct Scored {
    score: i64,
    conversions: Vec<(usize, NodeId, Type)>,
    uses_as_blocked: bool,
    first_mismatch: Option<(usize, Type, Type)>,
}

impl Scored {
    fn noluck() -> Scored {
        Scored {
            score: NOLUCK_SCORE,
            conversions: Vec::new(),
            uses_as_blocked: false,
            first_mismatch: None,
        }
    }
}

fn matches_args(pool: &Pool, call_id: NodeId, cand: NodeId) -> bool {
    let f = pool.func(cand);
    let call_n = pool.call(call_id).args.len();
    let decl_n = f.args.len();
    let has_vararg = f
        .args
        .last()
        .map(|&a| pool.var(a).kind == VarKind::VarArg)
        .unwrap_or(false);
    let required = f
        .args
        .iter()
        .filter(|&&a| {
            let v = pool.var(a);
            v.kind == VarKind::Arg && v.expr.is_none()
        })
        .count();
    if has_vararg || f.extern_variadic {
        // A vararg swallows any number of trailing call args, including
        // zero.
        call_n >= required
    } else {
        required <= call_n && call_n <= decl_n
    }
}

/// The argument as it was before any implicit-conversion cast, so
/// candidates always score against the same call site.
fn effective_arg(call: &FunctionCall, i: usize) -> Option<NodeId> {
    if let Some(map) = &call.args_before_conversion {
        if let Some(&orig) = map.get(&i) {
            return Some(orig);
        }
    }
    call.args.get(i).copied()
}

fn score_candidate(pool: &Pool, trail: &Trail, call_id: NodeId, cand: NodeId) -> Scored {
    let (call_suffix, call_args_len, is_member) = {
        let c = pool.call(call_id);
        (c.suffix.clone(), c.args.len(), call_is_member(pool, call_id))
    };
    let f = pool.func(cand);
    let mut score: i64 = 0;

    match (&call_suffix, &f.suffix) {
        (Some(cs), Some(fs)) if cs == fs => score += SCORE_SEED / 4,
        (Some(_), _) => return Scored::noluck(),
        (None, None) if !f.is_static => score += SCORE_SEED / 4,
        _ => {}
    }
    if !matches_args(pool, call_id, cand) {
        return Scored::noluck();
    }
    score += SCORE_SEED / 4;
    if f.owner.is_some() && is_member {
        score += SCORE_SEED / 4;
    }

    let decl_args = f.args.clone();
    let is_extern = f.is_extern;
    let vararg_from = decl_args
        .iter()
        .position(|&a| pool.var(a).kind == VarKind::VarArg)
        .unwrap_or(usize::MAX);
    let mut conversions = Vec::new();
    let mut uses_as_blocked = false;
    let mut first_mismatch = None;

    for i in 0..call_args_len {
        if i >= vararg_from || i >= decl_args.len() {
            break;
        }
        let call_arg = match effective_arg(pool.call(call_id), i) {
            Some(a) => a,
            None => break,
        };
        let decl_ty = match pool.var(decl_args[i]).ty.clone() {
            Some(t) => t,
            None => continue,
        };
        let decl_ty = real_typize(&decl_ty, &mut |p| {
            match resolve_type_arg(pool, trail, call_id, cand, p) {
                TypeArgAnswer::Found(t) => Some(t),
                _ => None,
            }
        });
        let call_ty = match expr_type(pool, call_arg) {
            Some(t) => t,
            None => continue,
        };
        let arg_score = get_score(pool, &call_ty, &decl_ty);
        if arg_score <= NOLUCK_SCORE {
            if let Some(conv) = implicit_conv_for(pool, &call_ty, &decl_ty) {
                if is_extern || !IMPLICIT_AS_EXTERNAL_ONLY {
                    score += SCORE_SEED / 8;
                    conversions.push((i, conv, decl_ty.clone()));
                    continue;
                }
                uses_as_blocked = true;
            }
            if first_mismatch.is_none() {
                first_mismatch = Some((i, decl_ty, call_ty));
            }
            return Scored {
                score: NOLUCK_SCORE,
                conversions: Vec::new(),
                uses_as_blocked,
                first_mismatch,
            };
        }
        score += arg_score;
    }

    Scored {
        score,
        conversions,
        uses_as_blocked,
        first_mismatch,
    }
}

fn rollback_conversions(pool: &mut Pool, call_id: NodeId) {
    let map = match pool.call_mut(call_id).args_before_conversion.take() {
        Some(map) => map,
        None => return,
    };
    for (i, orig) in map {
        let c = pool.call_mut(call_id);
        if i < c.args.len() {
            c.args[i] = orig;
        }
    }
}

fn apply_conversions(pool: &mut Pool, call_id: NodeId, conversions: &[(usize, NodeId, Type)]) {
    if conversions.is_empty() {
        return;
    }
    let mut map = HashMap::new();
    for &(i, conv, ref target) in conversions {
        let orig = pool.call(call_id).args[i];
        let token = pool.token(orig);
        let cast = pool.add(Node::Cast(Cast {
            token,
            inner: orig,
            target: target.clone(),
            conv: Some(conv),
        }));
        pool.call_mut(call_id).args[i] = cast;
        map.insert(i, orig);
    }
    pool.call_mut(call_id).args_before_conversion = Some(map);
}

/// Offers one candidate to the call. Strictly better scores take the
/// reference; on ties the earlier suggestion keeps it.
pub fn suggest(pool: &mut Pool, trail: &Trail, call_id: NodeId, cand: NodeId) -> bool {
    if call_is_member(pool, call_id) && pool.func(cand).owner.is_none() {
        return false;
    }
    let scored = score_candidate(pool, trail, call_id, cand);
    if scored.uses_as_blocked {
        pool.call_mut(call_id).candidate_uses_as = true;
    }
    if scored.score > pool.call(call_id).ref_score {
        rollback_conversions(pool, call_id);
        apply_conversions(pool, call_id, &scored.conversions);
        let virtual_ = {
            let f = pool.func(cand);
            f.owner.is_some() && !f.is_static
        };
        let c = pool.call_mut(call_id);
        c.ref_ = Some(cand);
        c.ref_score = scored.score;
        c.virtual_ = virtual_;
    }
    scored.score > 0
}

// ---- super (candidate channel b) ----

fn super_target(pool: &Pool, trail: &Trail) -> Option<(NodeId, NodeId)> {
    let enclosing = trail.find_function(pool)?;
    let mut owner = pool.func(enclosing).owner?;
    if let Some(td) = pool.as_type_decl(owner) {
        if td.is_meta {
            owner = td.non_meta?;
        }
    }
    let super_id = pool.as_type_decl(owner)?.super_ref?;
    Some((enclosing, super_id))
}

fn gather_super(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &Trail,
    call_id: NodeId,
) -> Result<(), Diagnostic> {
    let token = pool.call(call_id).token;
    let (enclosing, super_id) = match super_target(pool, trail) {
        Some(found) => found,
        None => {
            if res.fatal {
                return Err(Diagnostic::new(
                    "`super` used outside a method of a subclass",
                    Some(token),
                )
                .code(E_UNRESOLVED_CALL));
            }
            res.whole_again(pool, call_id, "super target not known yet");
            return Ok(());
        }
    };
    let wanted = pool.func(enclosing).name.clone();
    let mut found = Vec::new();
    class_chain_candidates(pool, Some(super_id), &wanted, &mut found);
    match found.first() {
        Some(&cand) => {
            let virtual_ = {
                let f = pool.func(cand);
                f.owner.is_some() && !f.is_static
            };
            let c = pool.call_mut(call_id);
            c.ref_ = Some(cand);
            c.ref_score = SCORE_SEED;
            c.virtual_ = virtual_;
        }
        None => {
            if res.fatal {
                let super_name = pool.type_decl(super_id).name.clone();
                return Err(Diagnostic::new(
                    format!("`{}` has no function `{}` for super call", super_name, wanted),
                    Some(token),
                )
                .code(E_UNRESOLVED_CALL));
            }
            res.whole_again(pool, call_id, "super candidate not found yet");
        }
    }
    Ok(())
}

// ---- generic inference ----

pub enum TypeArgAnswer {
    Found(Type),
    /// Not known *yet*; the caller must loop, never fail the candidate.
    NeedMore,
    Missing,
}

pub fn resolve_type_arg(
    pool: &Pool,
    trail: &Trail,
    call_id: NodeId,
    fref: NodeId,
    param: &str,
) -> TypeArgAnswer {
    let f = pool.func(fref);
    if let Some((_, bound)) = f.constraints.iter().find(|(p, _)| p == param) {
        return TypeArgAnswer::Found(bound.clone());
    }

    let mut need_more = false;
    if f.type_params.iter().any(|p| p == param) {
        let call_args = pool.call(call_id).args.clone();
        for (i, &decl_arg) in f.args.iter().enumerate() {
            let dv = pool.var(decl_arg);
            let decl_ty = match dv.ty.clone() {
                Some(t) => t,
                None => continue,
            };
            let call_arg = match call_args.get(i) {
                Some(&a) => a,
                None => continue,
            };
            // Bare `P` behind some number of wrappers.
            let (stripped, depth) = decl_ty.strip_sugar();
            if matches!(stripped, Type::Base { name, ref_: Some(TypeRef::Generic(_)), .. } if name == param)
            {
                match expr_type(pool, call_arg) {
                    Some(cty) => {
                        if let Some(found) = cty.strip_sugar_exact(depth) {
                            return TypeArgAnswer::Found(found.clone());
                        }
                    }
                    None => need_more = true,
                }
                continue;
            }
            // A closure argument reveals `P` through its return type.
            if let Type::Func { ret: Some(ret), .. } = &decl_ty {
                if matches!(ret.as_ref(), Type::Base { name, ref_: Some(TypeRef::Generic(_)), .. } if name == param)
                {
                    if let Node::FunctionDecl(anon) = pool.get(call_arg) {
                        let known = anon
                            .return_type
                            .clone()
                            .or_else(|| anon.inferred_return_type.clone());
                        match known {
                            Some(t) => return TypeArgAnswer::Found(t),
                            None => {
                                need_more = true;
                                continue;
                            }
                        }
                    }
                }
            }
            // A type-valued argument names the type directly.
            if dv.name == param && matches!(decl_ty, Type::Builtin(BuiltinType::Class)) {
                match pool.get(call_arg) {
                    Node::VariableAccess(a) => match a.ref_ {
                        Some(target) => {
                            if let Some(td) = pool.as_type_decl(target) {
                                return TypeArgAnswer::Found(td.instance_type(target));
                            }
                        }
                        None => {
                            need_more = true;
                            continue;
                        }
                    },
                    Node::TypeAccess(t) => return TypeArgAnswer::Found(t.inner.clone()),
                    _ => {}
                }
            }
            // `OtherType<P>` positions.
            if let Some(cty) = expr_type(pool, call_arg) {
                if let Some(found) = extract_type_arg(&decl_ty, &cty, param) {
                    return TypeArgAnswer::Found(found);
                }
            }
        }
    }

    if let Some(receiver) = pool.call(call_id).expr {
        // The receiver as a type, then the receiver's type.
        if let Node::VariableAccess(a) = pool.get(receiver) {
            if let Some(target) = a.ref_ {
                if let Some(td) = pool.as_type_decl(target) {
                    let inst = td.instance_type(target);
                    if let Some(found) = search_type_arg(pool, &inst, param) {
                        return TypeArgAnswer::Found(found);
                    }
                }
            }
        }
        match expr_type(pool, receiver) {
            Some(rty) => {
                if let Some(found) = search_type_arg(pool, &rty, param) {
                    return TypeArgAnswer::Found(found);
                }
            }
            None => need_more = true,
        }
    }

    for i in (0..trail.depth()).rev() {
        let Some(id) = trail.get(i) else { continue };
        match pool.get(id) {
            Node::TypeDecl(td) => {
                if td.type_params.iter().any(|p| p == param) {
                    return TypeArgAnswer::Found(Type::Base {
                        name: param.to_string(),
                        args: Vec::new(),
                        ref_: Some(TypeRef::Generic(id)),
                    });
                }
            }
            Node::FunctionDecl(f2) => {
                if f2.type_params.iter().any(|p| p == param) {
                    return TypeArgAnswer::Found(Type::Base {
                        name: param.to_string(),
                        args: Vec::new(),
                        ref_: Some(TypeRef::Generic(id)),
                    });
                }
            }
            _ => {}
        }
    }

    if need_more {
        TypeArgAnswer::NeedMore
    } else {
        TypeArgAnswer::Missing
    }
}

// ---- return type ----

fn resolve_return_type(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &Trail,
    call_id: NodeId,
    fref: NodeId,
) -> Result<bool, Diagnostic> {
    if pool.call(call_id).return_type.is_some() {
        return Ok(true);
    }
    let decl_rt = pool
        .func(fref)
        .return_type
        .clone()
        .unwrap_or(Type::Builtin(BuiltinType::Void));
    let resolved = if contains_generic(&decl_rt) {
        let mut missing: Option<String> = None;
        let mut need_more = false;
        let sub = real_typize(&decl_rt, &mut |p| {
            match resolve_type_arg(pool, trail, call_id, fref, p) {
                TypeArgAnswer::Found(t) => Some(t),
                TypeArgAnswer::NeedMore => {
                    need_more = true;
                    None
                }
                TypeArgAnswer::Missing => {
                    missing = Some(p.to_string());
                    None
                }
            }
        });
        if need_more || missing.is_some() {
            if res.fatal {
                let param = missing.unwrap_or_else(|| decl_rt.pretty().to_string());
                return Err(Diagnostic::new(
                    format!(
                        "missing info for type argument `{}` in call to `{}`",
                        param,
                        pool.call(call_id).name
                    ),
                    Some(pool.call(call_id).token),
                )
                .code(E_INTERNAL));
            }
            res.whole_again(pool, call_id, "return type needs more inference");
            return Ok(false);
        }
        sub
    } else {
        decl_rt
    };
    pool.call_mut(call_id).return_type = Some(resolved);
    // Parents read this; schedule another look at them.
    res.whole_again(pool, call_id, "return type resolved");
    Ok(true)
}

// ---- rewrites, in fixed order ----

fn structural_failure(
    res: &mut Resolver,
    pool: &Pool,
    call_id: NodeId,
    code: &'static str,
    what: &str,
) -> Result<Option<Response>, Diagnostic> {
    if res.fatal {
        return Err(Diagnostic::new(
            format!("could not {} for call to `{}`", what, pool.call(call_id).name),
            Some(pool.call(call_id).token),
        )
        .code(code));
    }
    res.whole_again(pool, call_id, what);
    Ok(Some(Response::Ok))
}

fn handle_inlining(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    call_id: NodeId,
    fref: NodeId,
) -> Result<Option<Response>, Diagnostic> {
    if !res.params.inlining || !pool.func(fref).do_inline {
        return Ok(None);
    }
    // Never inline a function into itself.
    for i in 0..trail.depth() {
        if trail.get(i) == Some(fref) {
            return Ok(None);
        }
    }
    let token = pool.call(call_id).token;
    let copy_src = match pool.func(fref).inline_copy {
        Some(c) => c,
        None => {
            res.whole_again(pool, call_id, "inline body not captured yet");
            return Ok(Some(Response::Ok));
        }
    };
    let ret_ty = pool
        .call(call_id)
        .return_type
        .clone()
        .unwrap_or(Type::Builtin(BuiltinType::Void));
    let ret_name = res.fresh_name("ret");
    let ret_decl = pool.add(Node::VariableDecl(VariableDecl {
        token,
        name: ret_name.clone(),
        kind: VarKind::Local,
        ty: Some(ret_ty),
        expr: None,
    }));

    let mut body = vec![ret_decl];
    let decl_args = pool.func(fref).args.clone();
    let call_args = pool.call(call_id).args.clone();
    for (i, &decl_arg) in decl_args.iter().enumerate() {
        let Some(&value) = call_args.get(i) else { break };
        let (pname, pty) = {
            let v = pool.var(decl_arg);
            (v.name.clone(), v.ty.clone())
        };
        // The binding shadows under the parameter's own name, so the cloned
        // body resolves against it.
        body.push(pool.add(Node::VariableDecl(VariableDecl {
            token,
            name: pname,
            kind: VarKind::Local,
            ty: pty,
            expr: Some(value),
        })));
    }

    let cloned = pool.clone_subtree(copy_src);
    // Return statements become writes to the return slot.
    for node in pool.collect_subtree(cloned) {
        if let Node::Return(r) = pool.get(node) {
            let rtoken = r.token;
            match r.expr {
                Some(value) => {
                    let target = pool.add(Node::VariableAccess(VariableAccess::to(
                        rtoken,
                        ret_decl,
                        ret_name.clone(),
                    )));
                    pool.set(
                        node,
                        Node::BinaryOp(BinaryOp {
                            token: rtoken,
                            op: BinOpKind::Assign,
                            left: target,
                            right: value,
                        }),
                    );
                }
                None => pool.set(
                    node,
                    Node::CommaSequence(CommaSequence {
                        token: rtoken,
                        items: Vec::new(),
                    }),
                ),
            }
        }
    }
    body.push(cloned);

    let ctx = pool.add(Node::InlineContext(InlineContext {
        token,
        body,
        return_args: vec![ret_decl],
    }));
    if !trail.add_before_in_scope(pool, call_id, ctx) {
        return structural_failure(res, pool, call_id, E_COULDNT_ADD_BEFORE, "splice inline body");
    }
    let parent = match trail.peek(2) {
        Some(p) => p,
        None => return structural_failure(res, pool, call_id, E_COULDNT_REPLACE, "find call parent"),
    };
    let access = pool.add(Node::VariableAccess(VariableAccess::to(token, ret_decl, ret_name)));
    if !pool.replace_child(parent, call_id, access) {
        return structural_failure(res, pool, call_id, E_COULDNT_REPLACE, "replace inlined call");
    }
    if res.params.very_verbose {
        eprintln!(
            "[resolve] inlined call to `{}` at {}:{}",
            pool.func(fref).name,
            token.line,
            token.col
        );
    }
    res.whole_again(pool, call_id, "inlined call");
    Ok(Some(Response::Loop))
}

fn handle_generics(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    call_id: NodeId,
    fref: NodeId,
) -> Result<Option<Response>, Diagnostic> {
    let decl_args = pool.func(fref).args.clone();
    for (i, &decl_arg) in decl_args.iter().enumerate() {
        let decl_ty = match pool.var(decl_arg).ty.clone() {
            Some(t) => t,
            None => continue,
        };
        if !is_generic_param(&decl_ty) {
            continue;
        }
        let Some(&call_arg) = pool.call(call_id).args.get(i) else {
            continue;
        };
        if let Node::AddressOf(a) = pool.get(call_arg) {
            if a.for_generics {
                continue;
            }
        }
        let arg_ty = expr_type(pool, call_arg);
        if arg_ty.as_ref().map(is_generic_param).unwrap_or(false) {
            continue;
        }
        let token = pool.token(call_arg);
        let target = if is_referencable(pool, call_arg) {
            call_arg
        } else {
            let tmp = pool.add(Node::VariableDecl(VariableDecl {
                token,
                name: res.fresh_name("gen"),
                kind: VarKind::Local,
                ty: arg_ty,
                expr: Some(call_arg),
            }));
            if !trail.add_before_in_scope(pool, call_id, tmp) {
                return structural_failure(
                    res,
                    pool,
                    call_id,
                    E_COULDNT_ADD_BEFORE,
                    "hoist generic argument",
                );
            }
            let name = pool.var(tmp).name.clone();
            pool.add(Node::VariableAccess(VariableAccess::to(token, tmp, name)))
        };
        let addr = pool.add(Node::AddressOf(AddressOf {
            token,
            inner: target,
            for_generics: true,
        }));
        pool.call_mut(call_id).args[i] = addr;
        res.whole_again(pool, call_id, "boxed generic argument");
        return Ok(Some(Response::Ok));
    }

    // Fill in inferred type arguments until the call carries one per formal
    // parameter.
    let params = pool.func(fref).type_params.clone();
    while pool.call(call_id).type_args.len() < params.len() {
        let param = params[pool.call(call_id).type_args.len()].clone();
        match resolve_type_arg(pool, trail, call_id, fref, &param) {
            TypeArgAnswer::Found(ty) => {
                let stored = match ty {
                    Type::Func { .. } => Type::Builtin(BuiltinType::Pointer),
                    other => other,
                };
                pool.call_mut(call_id).type_args.push(stored);
            }
            TypeArgAnswer::NeedMore | TypeArgAnswer::Missing => {
                if res.fatal {
                    return Err(Diagnostic::new(
                        format!(
                            "missing info for type argument `{}` in call to `{}`",
                            param,
                            pool.call(call_id).name
                        ),
                        Some(pool.call(call_id).token),
                    )
                    .code(E_INTERNAL));
                }
                res.whole_again(pool, call_id, "type argument not inferred yet");
                return Ok(Some(Response::Ok));
            }
        }
    }
    Ok(None)
}

fn handle_optargs(res: &mut Resolver, pool: &mut Pool, call_id: NodeId, fref: NodeId) -> Option<Response> {
    let decl_args = pool.func(fref).args.clone();
    let call_n = pool.call(call_id).args.len();
    if call_n >= decl_args.len() {
        return None;
    }
    let mut appended = false;
    for &decl_arg in &decl_args[call_n..] {
        let v = pool.var(decl_arg);
        if v.kind == VarKind::VarArg {
            break;
        }
        let Some(default) = v.expr else { break };
        let copy = pool.clone_subtree(default);
        pool.call_mut(call_id).args.push(copy);
        appended = true;
    }
    if appended {
        res.whole_again(pool, call_id, "filled optional arguments");
        return Some(Response::Ok);
    }
    None
}

fn handle_varargs(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    call_id: NodeId,
    fref: NodeId,
) -> Result<Option<Response>, Diagnostic> {
    let decl_args = pool.func(fref).args.clone();
    let Some(&last_decl) = decl_args.last() else {
        return Ok(None);
    };
    if pool.var(last_decl).kind != VarKind::VarArg {
        return Ok(None);
    }
    let call_args = pool.call(call_id).args.clone();
    if let Some(&last) = call_args.last() {
        if expr_type(pool, last)
            .map(|t| is_varargs_box(&t))
            .unwrap_or(false)
        {
            return Ok(None);
        }
    }
    let fixed = decl_args.len() - 1;
    if call_args.len() < fixed {
        return Ok(None);
    }
    let trailing: Vec<NodeId> = call_args[fixed..].to_vec();
    let n = trailing.len();
    let token = pool.call(call_id).token;

    let mut types = Vec::with_capacity(2 * n);
    let mut values = Vec::with_capacity(2 * n);
    for &arg in &trailing {
        let ty = match expr_type(pool, arg) {
            Some(t) => t,
            None => {
                res.whole_again(pool, call_id, "vararg type unknown");
                return Ok(Some(Response::Ok));
            }
        };
        let atoken = pool.token(arg);
        types.push(Type::Builtin(BuiltinType::Class));
        types.push(ty.clone());
        values.push(pool.add(Node::TypeAccess(TypeAccess {
            token: atoken,
            inner: ty,
        })));
        values.push(arg);
    }
    let anon_ty = Type::AnonStruct { types };
    let args_lit = pool.add(Node::StructLiteral(StructLiteral {
        token,
        ty: anon_ty.clone(),
        values,
    }));
    let args_decl = pool.add(Node::VariableDecl(VariableDecl {
        token,
        name: res.fresh_name("va_args"),
        kind: VarKind::Local,
        ty: Some(anon_ty),
        expr: Some(args_lit),
    }));
    if !trail.add_before_in_scope(pool, call_id, args_decl) {
        return structural_failure(res, pool, call_id, E_COULDNT_ADD_BEFORE, "hoist vararg pack");
    }

    let args_name = pool.var(args_decl).name.clone();
    let args_access = pool.add(Node::VariableAccess(VariableAccess::to(
        token, args_decl, args_name,
    )));
    let addr = pool.add(Node::AddressOf(AddressOf {
        token,
        inner: args_access,
        for_generics: false,
    }));
    let null = pool.add(Node::NullLiteral { token });
    let count = pool.add(Node::IntLiteral {
        token,
        value: n as i64,
    });
    let va_lit = pool.add(Node::StructLiteral(StructLiteral {
        token,
        ty: Type::Builtin(BuiltinType::VarArgs),
        values: vec![addr, null, count],
    }));
    let va_decl = pool.add(Node::VariableDecl(VariableDecl {
        token,
        name: res.fresh_name("va"),
        kind: VarKind::Local,
        ty: Some(Type::Builtin(BuiltinType::VarArgs)),
        expr: Some(va_lit),
    }));
    if !trail.add_before_in_scope(pool, call_id, va_decl) {
        return structural_failure(res, pool, call_id, E_COULDNT_ADD_BEFORE, "hoist vararg struct");
    }
    let va_name = pool.var(va_decl).name.clone();
    let va_access = pool.add(Node::VariableAccess(VariableAccess::to(
        token, va_decl, va_name,
    )));
    let c = pool.call_mut(call_id);
    c.args.truncate(fixed);
    c.args.push(va_access);
    res.whole_again(pool, call_id, "boxed varargs");
    Ok(Some(Response::Ok))
}

fn handle_interfaces(res: &mut Resolver, pool: &mut Pool, call_id: NodeId, fref: NodeId) -> Option<Response> {
    let decl_args = pool.func(fref).args.clone();
    let call_args = pool.call(call_id).args.clone();
    for (i, &decl_arg) in decl_args.iter().enumerate() {
        let decl_ty = match pool.var(decl_arg).ty.clone() {
            Some(t) => t,
            None => continue,
        };
        if interface_of(&decl_ty).is_none() {
            continue;
        }
        let Some(&call_arg) = call_args.get(i) else { continue };
        let Some(call_ty) = expr_type(pool, call_arg) else { continue };
        if type_eq(&call_ty, &decl_ty) {
            continue;
        }
        let token = pool.token(call_arg);
        let cast = pool.add(Node::Cast(Cast {
            token,
            inner: call_arg,
            target: decl_ty,
            conv: None,
        }));
        pool.call_mut(call_id).args[i] = cast;
        res.whole_again(pool, call_id, "cast to interface");
        return Some(Response::Ok);
    }
    None
}

fn handle_unwrap(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    call_id: NodeId,
    fref: NodeId,
) -> Result<Option<Response>, Diagnostic> {
    let needs = pool
        .func(fref)
        .return_type
        .as_ref()
        .map(|rt| matches!(rt, Type::List(_)) || contains_generic(rt))
        .unwrap_or(false);
    if !needs || !pool.call(call_id).return_args.is_empty() {
        return Ok(None);
    }
    let parent = match trail.peek(2) {
        Some(p) => p,
        None => return Ok(None),
    };
    let friendly = match pool.get(parent) {
        n if is_scope(n) => true,
        Node::VariableDecl(_) => true,
        Node::BinaryOp(b) => b.op == BinOpKind::Assign && b.right == call_id,
        _ => false,
    };
    if friendly {
        return Ok(None);
    }
    let token = pool.call(call_id).token;
    let concrete = match pool.call(call_id).return_type.clone() {
        Some(Type::List(items)) => items.into_iter().next().unwrap_or(Type::Builtin(BuiltinType::Void)),
        Some(other) => other,
        None => return Ok(None),
    };
    let v_decl = pool.add(Node::VariableDecl(VariableDecl {
        token,
        name: res.fresh_name("ret"),
        kind: VarKind::Local,
        ty: Some(concrete),
        expr: None,
    }));
    if !trail.add_before_in_scope(pool, call_id, v_decl) {
        return structural_failure(res, pool, call_id, E_COULDNT_ADD_BEFORE, "hoist return slot");
    }
    let name = pool.var(v_decl).name.clone();
    let access = pool.add(Node::VariableAccess(VariableAccess::to(token, v_decl, name)));
    let seq = pool.add(Node::CommaSequence(CommaSequence {
        token,
        items: vec![call_id, access],
    }));
    if !pool.replace_child(parent, call_id, seq) {
        return structural_failure(res, pool, call_id, E_COULDNT_REPLACE, "unwrap return value");
    }
    pool.call_mut(call_id).return_args.push(Some(access));
    res.whole_again(pool, call_id, "unwrapped generic return");
    Ok(Some(Response::Loop))
}

fn handle_this_ref(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    call_id: NodeId,
    fref: NodeId,
) -> Result<Option<Response>, Diagnostic> {
    if !pool.func(fref).is_this_ref {
        return Ok(None);
    }
    let Some(receiver) = pool.call(call_id).expr else {
        return Ok(None);
    };
    if is_referencable(pool, receiver) {
        return Ok(None);
    }
    let token = pool.token(receiver);
    let rty = match expr_type(pool, receiver) {
        Some(t) => t,
        None => {
            res.whole_again(pool, call_id, "receiver type unknown");
            return Ok(Some(Response::Ok));
        }
    };
    let tmp = pool.add(Node::VariableDecl(VariableDecl {
        token,
        name: res.fresh_name("this"),
        kind: VarKind::Local,
        ty: Some(rty),
        expr: Some(receiver),
    }));
    if !trail.add_before_in_scope(pool, call_id, tmp) {
        return structural_failure(res, pool, call_id, E_COULDNT_ADD_BEFORE, "hoist receiver");
    }
    let name = pool.var(tmp).name.clone();
    let access = pool.add(Node::VariableAccess(VariableAccess::to(token, tmp, name)));
    pool.call_mut(call_id).expr = Some(access);
    res.whole_again(pool, call_id, "hoisted receiver lvalue");
    Ok(Some(Response::Ok))
}

fn handle_super_expansion(
    res: &mut Resolver,
    pool: &mut Pool,
    trail: &mut Trail,
    call_id: NodeId,
) -> Result<Option<Response>, Diagnostic> {
    if pool.call(call_id).name != "super" || pool.call(call_id).expr.is_some() {
        return Ok(None);
    }
    let (enclosing, super_id) = match super_target(pool, trail) {
        Some(found) => found,
        None => return Ok(None),
    };
    let token = pool.call(call_id).token;
    let this_decl = match pool.type_decl(super_id).this_decl {
        Some(d) => d,
        None => return Ok(None),
    };
    let this_access = pool.add(Node::VariableAccess(VariableAccess::to(
        token, this_decl, "this",
    )));
    pool.call_mut(call_id).expr = Some(this_access);
    // A bare `super()` forwards the enclosing function's own arguments.
    if pool.call(call_id).args.is_empty() {
        let enc_args = pool.func(enclosing).args.clone();
        for arg in enc_args {
            let name = pool.var(arg).name.clone();
            let access = pool.add(Node::VariableAccess(VariableAccess::to(token, arg, name)));
            pool.call_mut(call_id).args.push(access);
        }
    }
    res.whole_again(pool, call_id, "expanded super call");
    Ok(Some(Response::Ok))
}

fn check_void(
    res: &mut Resolver,
    pool: &Pool,
    trail: &Trail,
    call_id: NodeId,
) -> Result<(), Diagnostic> {
    let is_void = pool
        .call(call_id)
        .return_type
        .as_ref()
        .map(Type::is_void)
        .unwrap_or(false);
    if !is_void {
        return Ok(());
    }
    let Some(parent) = trail.peek(2) else {
        return Ok(());
    };
    if is_scope(pool.get(parent)) {
        return Ok(());
    }
    if res.fatal {
        return Err(Diagnostic::new(
            format!(
                "call to `{}` has no value, but one is used here",
                pool.call(call_id).name
            ),
            Some(pool.call(call_id).token),
        )
        .code(E_VOID_EXPRESSION));
    }
    // Suppressed until the fatal round, like every other unresolved state.
    res.whole_again(pool, call_id, "void expression in value position");
    Ok(())
}

// ---- unresolved-call reporting ----

fn describe_args(pool: &Pool, call_id: NodeId) -> String {
    pool.call(call_id)
        .args
        .iter()
        .map(|&a| match expr_type(pool, a) {
            Some(t) => t.pretty().to_string(),
            None => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_func(pool: &Pool, fdecl: NodeId) -> String {
    let f = pool.func(fdecl);
    let args = f
        .args
        .iter()
        .map(|&a| {
            let v = pool.var(a);
            match (&v.ty, v.kind) {
                (_, VarKind::VarArg) => format!("{}: ...", v.name),
                (Some(t), _) => format!("{}: {}", v.name, t.pretty()),
                (None, _) => v.name.clone(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let mut out = format!("{}({})", f.name, args);
    if let Some(rt) = &f.return_type {
        out.push_str(&format!(" -> {}", rt.pretty()));
    }
    out
}

fn unresolved_call_diag(
    res: &Resolver,
    pool: &Pool,
    trail: &Trail,
    call_id: NodeId,
) -> Diagnostic {
    let c = pool.call(call_id);
    let shown = match &c.suffix {
        Some(s) => format!("{}~{}", c.name, s),
        None => c.name.clone(),
    };
    let mut d = Diagnostic::new(
        format!("unresolved call to `{}({})`", shown, describe_args(pool, call_id)),
        Some(c.token),
    )
    .code(E_UNRESOLVED_CALL);

    let candidates = collect_candidates(pool, trail, call_id);
    if candidates.is_empty() {
        if res.params.helpful {
            let names = known_function_names(pool, trail);
            if let Some(h) = suggest::did_you_mean(&pool.call(call_id).name, names) {
                d = d.help(h);
            }
        }
        return d;
    }

    // Nearest match: the best-scoring loser and its first offending
    // argument.
    let mut best: Option<(i64, NodeId, Option<(usize, Type, Type)>)> = None;
    for &cand in &candidates {
        let scored = score_candidate(pool, trail, call_id, cand);
        if best
            .as_ref()
            .map(|(s, _, _)| scored.score > *s)
            .unwrap_or(true)
        {
            best = Some((scored.score, cand, scored.first_mismatch));
        }
    }
    if let Some((_, cand, mismatch)) = best {
        d = d.note(format!("nearest match: `{}`", describe_func(pool, cand)));
        if let Some((i, expected, got)) = mismatch {
            d = d.note(format!(
                "argument {}: expected `{}`, got `{}`",
                i + 1,
                expected.pretty(),
                got.pretty()
            ));
        }
    }
    if pool.call(call_id).candidate_uses_as {
        d = d.note(
            "an `implicit as` conversion would fit, but it only applies to extern functions",
        );
    }
    d
}

fn known_function_names(pool: &Pool, trail: &Trail) -> Vec<String> {
    let mut out = Vec::new();
    for i in 0..trail.depth() {
        let Some(id) = trail.get(i) else { continue };
        if let Node::Module(m) = pool.get(id) {
            let mut push_from = |body: &[NodeId]| {
                for &decl in body {
                    if let Node::FunctionDecl(f) = pool.get(decl) {
                        out.push(f.name.clone());
                    }
                }
            };
            push_from(&m.body);
            for &import in &m.imports {
                push_from(&pool.module(import).body);
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::Token;

    fn arg(pool: &mut Pool, name: &str, ty: Option<Type>, default: Option<NodeId>, kind: VarKind) -> NodeId {
        pool.add(Node::VariableDecl(VariableDecl {
            token: Token::none(),
            name: name.into(),
            kind,
            ty,
            expr: default,
        }))
    }

    fn func_with_args(pool: &mut Pool, args: Vec<NodeId>) -> NodeId {
        let mut f = FunctionDecl::new(Token::none(), "f");
        f.args = args;
        pool.add(Node::FunctionDecl(f))
    }

    fn call_with_n_args(pool: &mut Pool, n: usize) -> NodeId {
        let mut c = FunctionCall::new(Token::none(), "f");
        for i in 0..n {
            let lit = pool.add(Node::IntLiteral {
                token: Token::none(),
                value: i as i64,
            });
            c.args.push(lit);
        }
        pool.add(Node::FunctionCall(c))
    }

    #[test]
    fn vararg_swallows_any_trailing_count_including_zero() {
        let mut pool = Pool::new();
        let fixed = arg(&mut pool, "fmt", Some(Type::Builtin(BuiltinType::String)), None, VarKind::Arg);
        let rest = arg(&mut pool, "args", None, None, VarKind::VarArg);
        let f = func_with_args(&mut pool, vec![fixed, rest]);

        for n in [1, 2, 5] {
            let call = call_with_n_args(&mut pool, n);
            assert!(matches_args(&pool, call, f), "n = {}", n);
        }
        let too_few = call_with_n_args(&mut pool, 0);
        assert!(!matches_args(&pool, too_few, f));
    }

    #[test]
    fn optional_args_relax_required_arity() {
        let mut pool = Pool::new();
        let x = arg(&mut pool, "x", Some(Type::Builtin(BuiltinType::Int)), None, VarKind::Arg);
        let default = pool.add(Node::IntLiteral {
            token: Token::none(),
            value: 7,
        });
        let y = arg(&mut pool, "y", Some(Type::Builtin(BuiltinType::Int)), Some(default), VarKind::Arg);
        let f = func_with_args(&mut pool, vec![x, y]);

        let call1 = call_with_n_args(&mut pool, 1);
        assert!(matches_args(&pool, call1, f));
        let call2 = call_with_n_args(&mut pool, 2);
        assert!(matches_args(&pool, call2, f));
        let call3 = call_with_n_args(&mut pool, 3);
        assert!(!matches_args(&pool, call3, f));
        let call0 = call_with_n_args(&mut pool, 0);
        assert!(!matches_args(&pool, call0, f));
    }
}
