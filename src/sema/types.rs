// Purpose: Type compatibility scoring and generic substitution for call resolution.
// Inputs/Outputs: Pure functions over Type values plus pool lookups for class hierarchies.
// Invariants: Score space is fixed: NOLUCK < lossy(<0) < unknown(0) < matches(>0) <= identity.
// Gotchas: Decl-side generics score as wildcards; substitute via real_typize before scoring.

use crate::frontend::ast::{
    BuiltinType, Node, NodeId, Pool, SugarKind, Type, TypeRef,
};

pub const NOLUCK_SCORE: i64 = -1_000_000;
pub const SCORE_SEED: i64 = 1024;

/// Structural equality, ignoring what names resolved to.
pub fn type_eq(a: &Type, b: &Type) -> bool {
    match (a, b) {
        (Type::Builtin(x), Type::Builtin(y)) => x == y,
        (
            Type::Base { name: an, args: aa, .. },
            Type::Base { name: bn, args: ba, .. },
        ) => an == bn && aa.len() == ba.len() && aa.iter().zip(ba).all(|(x, y)| type_eq(x, y)),
        (
            Type::Sugar { kind: ak, inner: ai },
            Type::Sugar { kind: bk, inner: bi },
        ) => ak == bk && type_eq(ai, bi),
        (
            Type::Func { params: ap, ret: ar },
            Type::Func { params: bp, ret: br },
        ) => {
            ap.len() == bp.len()
                && ap.iter().zip(bp).all(|(x, y)| type_eq(x, y))
                && match (ar, br) {
                    (Some(x), Some(y)) => type_eq(x, y),
                    (None, None) => true,
                    _ => false,
                }
        }
        (Type::List(ai), Type::List(bi)) => {
            ai.len() == bi.len() && ai.iter().zip(bi).all(|(x, y)| type_eq(x, y))
        }
        (Type::AnonStruct { types: at }, Type::AnonStruct { types: bt }) => {
            at.len() == bt.len() && at.iter().zip(bt).all(|(x, y)| type_eq(x, y))
        }
        _ => false,
    }
}

pub fn is_generic_param(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Base {
            ref_: Some(TypeRef::Generic(_)),
            ..
        }
    )
}

/// Whether any generic parameter is still left anywhere in the type.
pub fn contains_generic(ty: &Type) -> bool {
    match ty {
        Type::Builtin(_) => false,
        Type::Base { args, ref_, .. } => {
            matches!(ref_, Some(TypeRef::Generic(_))) || args.iter().any(contains_generic)
        }
        Type::Sugar { inner, .. } => contains_generic(inner),
        Type::Func { params, ret } => {
            params.iter().any(contains_generic)
                || ret.as_deref().map(contains_generic).unwrap_or(false)
        }
        Type::List(items) => items.iter().any(contains_generic),
        Type::AnonStruct { types } => types.iter().any(contains_generic),
    }
}

/// Rewrites every generic parameter for which `lookup` has an answer,
/// leaving the rest in place.
pub fn real_typize(ty: &Type, lookup: &mut impl FnMut(&str) -> Option<Type>) -> Type {
    match ty {
        Type::Base {
            name,
            ref_: Some(TypeRef::Generic(_)),
            ..
        } => lookup(name).unwrap_or_else(|| ty.clone()),
        Type::Base { name, args, ref_ } => Type::Base {
            name: name.clone(),
            args: args.iter().map(|a| real_typize(a, lookup)).collect(),
            ref_: *ref_,
        },
        Type::Sugar { kind, inner } => Type::Sugar {
            kind: *kind,
            inner: Box::new(real_typize(inner, lookup)),
        },
        Type::Func { params, ret } => Type::Func {
            params: params.iter().map(|p| real_typize(p, lookup)).collect(),
            ret: ret
                .as_deref()
                .map(|r| Box::new(real_typize(r, lookup))),
        },
        Type::List(items) => {
            Type::List(items.iter().map(|t| real_typize(t, lookup)).collect())
        }
        Type::AnonStruct { types } => Type::AnonStruct {
            types: types.iter().map(|t| real_typize(t, lookup)).collect(),
        },
        Type::Builtin(_) => ty.clone(),
    }
}

/// Looks `param` up inside a constructed type: `List<Int>` knows `T` when
/// `List` declares `<T>`. Recurses through nested type arguments.
pub fn search_type_arg(pool: &Pool, ty: &Type, param: &str) -> Option<Type> {
    if let Type::Base { args, ref_, .. } = ty {
        if let Some(TypeRef::Decl(decl)) = ref_ {
            if let Some(td) = pool.as_type_decl(*decl) {
                if let Some(idx) = td.type_params.iter().position(|p| p == param) {
                    if let Some(found) = args.get(idx) {
                        return Some(found.clone());
                    }
                }
            }
        }
        for arg in args {
            if let Some(found) = search_type_arg(pool, arg, param) {
                return Some(found);
            }
        }
    }
    if let Type::Sugar { inner, .. } = ty {
        return search_type_arg(pool, inner, param);
    }
    None
}

/// Matches a declared type against the actual type at the same structural
/// position to pull out what `param` stands for: `List<T>` vs `List<Int>`
/// yields `Int` for `T`.
pub fn extract_type_arg(decl_ty: &Type, actual_ty: &Type, param: &str) -> Option<Type> {
    match decl_ty {
        Type::Base {
            name,
            ref_: Some(TypeRef::Generic(_)),
            ..
        } if name == param => Some(actual_ty.clone()),
        Type::Base { name: dn, args: da, .. } => match actual_ty {
            Type::Base { name: an, args: aa, .. } if dn == an => da
                .iter()
                .zip(aa)
                .find_map(|(d, a)| extract_type_arg(d, a, param)),
            _ => None,
        },
        Type::Sugar { kind: dk, inner: di } => match actual_ty {
            Type::Sugar { kind: ak, inner: ai } if dk == ak => {
                extract_type_arg(di, ai, param)
            }
            _ => None,
        },
        Type::Func { params: dp, ret: dr } => match actual_ty {
            Type::Func { params: ap, ret: ar } => {
                if let Some(found) = dp
                    .iter()
                    .zip(ap)
                    .find_map(|(d, a)| extract_type_arg(d, a, param))
                {
                    return Some(found);
                }
                match (dr, ar) {
                    (Some(d), Some(a)) => extract_type_arg(d, a, param),
                    _ => None,
                }
            }
            _ => None,
        },
        Type::List(di) => match actual_ty {
            Type::List(ai) => di
                .iter()
                .zip(ai)
                .find_map(|(d, a)| extract_type_arg(d, a, param)),
            _ => None,
        },
        _ => None,
    }
}

pub fn type_decl_of(pool: &Pool, ty: &Type) -> Option<NodeId> {
    match ty {
        Type::Base {
            ref_: Some(TypeRef::Decl(id)),
            ..
        } => Some(*id),
        _ => None,
    }
}

pub fn interface_of(ty: &Type) -> Option<NodeId> {
    match ty {
        Type::Base {
            ref_: Some(TypeRef::Interface(id)),
            ..
        } => Some(*id),
        _ => None,
    }
}

fn class_implements(pool: &Pool, mut class: NodeId, iface: NodeId) -> bool {
    loop {
        let td = match pool.as_type_decl(class) {
            Some(td) => td,
            None => return false,
        };
        if td.interface_refs.contains(&iface) {
            return true;
        }
        match td.super_ref {
            Some(s) => class = s,
            None => return false,
        }
    }
}

fn super_distance(pool: &Pool, from: NodeId, to: NodeId) -> Option<u32> {
    let mut cur = from;
    let mut dist = 0;
    loop {
        if cur == to {
            return Some(dist);
        }
        match pool.as_type_decl(cur).and_then(|td| td.super_ref) {
            Some(s) => {
                cur = s;
                dist += 1;
            }
            None => return None,
        }
    }
}

fn builtin_score(call: &BuiltinType, decl: &BuiltinType) -> i64 {
    use BuiltinType::*;
    if call == decl {
        return SCORE_SEED;
    }
    // Lossless widening keeps a healthy score, narrowing is lossy but
    // still viable.
    match (call, decl) {
        (Int, Long) | (Int, Float) | (Int, Double) | (Float, Double) | (Char, Int) => {
            SCORE_SEED / 2
        }
        (Long, Int) | (Double, Float) | (Double, Int) | (Float, Int) | (Long, Double) => {
            -(SCORE_SEED / 8)
        }
        (String, Pointer) | (Class, Pointer) => SCORE_SEED / 4,
        _ => NOLUCK_SCORE,
    }
}

/// How well a call-site type satisfies a declared type. See the constants
/// above for the score space.
pub fn get_score(pool: &Pool, call_ty: &Type, decl_ty: &Type) -> i64 {
    // An unsubstituted declaration-side generic accepts anything, weakly.
    if is_generic_param(decl_ty) {
        if is_generic_param(call_ty) && type_eq(call_ty, decl_ty) {
            return SCORE_SEED;
        }
        return SCORE_SEED / 2;
    }
    if is_generic_param(call_ty) {
        return 0;
    }
    match (call_ty, decl_ty) {
        (Type::Builtin(c), Type::Builtin(d)) => builtin_score(c, d),
        // Null literals carry the bare Pointer type and satisfy anything
        // reference-shaped.
        (Type::Builtin(BuiltinType::Pointer), Type::Sugar { .. })
        | (Type::Builtin(BuiltinType::Pointer), Type::Base { .. }) => SCORE_SEED / 2,
        (Type::Sugar { .. }, Type::Builtin(BuiltinType::Pointer))
        | (Type::Base { .. }, Type::Builtin(BuiltinType::Pointer))
        | (Type::Func { .. }, Type::Builtin(BuiltinType::Pointer)) => SCORE_SEED / 4,
        (Type::Sugar { kind, inner }, Type::Sugar { kind: dk, inner: di }) => {
            if kind == dk {
                let sub = get_score(pool, inner, di);
                if sub <= NOLUCK_SCORE {
                    NOLUCK_SCORE
                } else {
                    sub
                }
            } else if *kind == SugarKind::Reference && *dk == SugarKind::Pointer {
                // A reference is transparent against a pointee behind a
                // pointer (refToPointer).
                get_score(pool, inner, di)
            } else {
                NOLUCK_SCORE
            }
        }
        (Type::Sugar { kind: SugarKind::Reference, inner }, _) => {
            // References collapse when the declaration takes the pointee.
            get_score(pool, inner, decl_ty)
        }
        (Type::Base { args: call_args, .. }, Type::Base { args: decl_args, .. }) => {
            if let Some(iface) = interface_of(decl_ty) {
                return match type_decl_of(pool, call_ty) {
                    Some(class) if class_implements(pool, class, iface) => SCORE_SEED / 2,
                    Some(_) => NOLUCK_SCORE,
                    None => 0,
                };
            }
            let (call_decl, decl_decl) = (type_decl_of(pool, call_ty), type_decl_of(pool, decl_ty));
            match (call_decl, decl_decl) {
                (Some(c), Some(d)) => match super_distance(pool, c, d) {
                    Some(dist) => {
                        if dist == 0
                            && call_args.len() == decl_args.len()
                            && call_args
                                .iter()
                                .zip(decl_args)
                                .any(|(x, y)| get_score(pool, x, y) <= NOLUCK_SCORE)
                        {
                            return NOLUCK_SCORE;
                        }
                        (SCORE_SEED >> dist.min(8)).max(1)
                    }
                    None => NOLUCK_SCORE,
                },
                // Unresolved names score unknown, never incompatible.
                _ => {
                    if type_eq(call_ty, decl_ty) {
                        SCORE_SEED
                    } else {
                        0
                    }
                }
            }
        }
        (Type::Func { params: cp, ret: cr }, Type::Func { params: dp, ret: dr }) => {
            if cp.len() != dp.len() {
                return NOLUCK_SCORE;
            }
            let params_ok = cp
                .iter()
                .zip(dp)
                .all(|(c, d)| get_score(pool, c, d) > NOLUCK_SCORE);
            let ret_ok = match (cr, dr) {
                (Some(c), Some(d)) => get_score(pool, c, d) > NOLUCK_SCORE,
                (None, None) => true,
                // A closure with an unknown return is still plausible.
                _ => cr.is_none(),
            };
            if params_ok && ret_ok {
                SCORE_SEED / 2
            } else {
                NOLUCK_SCORE
            }
        }
        (Type::List(c), Type::List(d)) => {
            if c.len() == d.len()
                && c.iter()
                    .zip(d)
                    .all(|(x, y)| get_score(pool, x, y) > NOLUCK_SCORE)
            {
                SCORE_SEED / 2
            } else {
                NOLUCK_SCORE
            }
        }
        _ => {
            // Class against an interface it implements.
            if let (Some(class), Some(iface)) =
                (type_decl_of(pool, call_ty), interface_of(decl_ty))
            {
                if class_implements(pool, class, iface) {
                    return SCORE_SEED / 2;
                }
            }
            NOLUCK_SCORE
        }
    }
}

/// The implicit conversion declared on the call-arg type whose result is
/// the declared type, when one exists.
pub fn implicit_conv_for(pool: &Pool, from_ty: &Type, to_ty: &Type) -> Option<NodeId> {
    let class = type_decl_of(pool, from_ty)?;
    let td = pool.as_type_decl(class)?;
    td.implicit_convs.iter().copied().find(|&conv| {
        pool.as_func(conv)
            .and_then(|f| f.return_type.as_ref())
            .map(|rt| type_eq(rt, to_ty))
            .unwrap_or(false)
    })
}

/// The static type of an expression node, if known yet.
pub fn expr_type(pool: &Pool, id: NodeId) -> Option<Type> {
    match pool.get(id) {
        Node::IntLiteral { .. } => Some(Type::Builtin(BuiltinType::Int)),
        Node::FloatLiteral { .. } => Some(Type::Builtin(BuiltinType::Float)),
        Node::StringLiteral { .. } => Some(Type::Builtin(BuiltinType::String)),
        Node::BoolLiteral { .. } => Some(Type::Builtin(BuiltinType::Bool)),
        Node::NullLiteral { .. } => Some(Type::Builtin(BuiltinType::Pointer)),
        Node::VariableAccess(a) => match a.ref_ {
            Some(target) => match pool.get(target) {
                Node::VariableDecl(v) => v.ty.clone(),
                Node::TypeDecl(_) => Some(Type::Builtin(BuiltinType::Class)),
                Node::FunctionDecl(f) => Some(func_type(pool, f)),
                _ => None,
            },
            None => None,
        },
        Node::FunctionCall(c) => c.return_type.clone(),
        Node::FunctionDecl(f) => Some(func_type(pool, f)),
        Node::AddressOf(a) => {
            // Generic by-reference passing is a calling-convention artifact;
            // the logical type is the operand's.
            if a.for_generics {
                return expr_type(pool, a.inner);
            }
            expr_type(pool, a.inner).map(|inner| Type::Sugar {
                kind: SugarKind::Pointer,
                inner: Box::new(inner),
            })
        }
        Node::Cast(c) => Some(c.target.clone()),
        Node::BinaryOp(b) => expr_type(pool, b.left),
        Node::CommaSequence(c) => c.items.last().and_then(|&last| expr_type(pool, last)),
        Node::StructLiteral(s) => Some(s.ty.clone()),
        Node::TypeAccess(_) => Some(Type::Builtin(BuiltinType::Class)),
        _ => None,
    }
}

fn func_type(pool: &Pool, f: &crate::frontend::ast::FunctionDecl) -> Type {
    Type::Func {
        params: f
            .args
            .iter()
            .map(|&a| {
                pool.var(a)
                    .ty
                    .clone()
                    .unwrap_or(Type::Builtin(BuiltinType::Pointer))
            })
            .collect(),
        ret: f
            .return_type
            .clone()
            .or_else(|| f.inferred_return_type.clone())
            .map(Box::new),
    }
}

/// Whether taking the address of this expression is meaningful without
/// first hoisting it into a local.
pub fn is_referencable(pool: &Pool, id: NodeId) -> bool {
    matches!(pool.get(id), Node::VariableAccess(_))
}

pub fn is_varargs_box(ty: &Type) -> bool {
    matches!(ty, Type::Builtin(BuiltinType::VarArgs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{Token, TypeDecl};

    fn int() -> Type {
        Type::Builtin(BuiltinType::Int)
    }

    fn string() -> Type {
        Type::Builtin(BuiltinType::String)
    }

    #[test]
    fn identity_scores_seed() {
        let pool = Pool::new();
        assert_eq!(get_score(&pool, &int(), &int()), SCORE_SEED);
        assert_eq!(get_score(&pool, &string(), &int()), NOLUCK_SCORE);
    }

    #[test]
    fn widening_beats_narrowing() {
        let pool = Pool::new();
        let widen = get_score(&pool, &int(), &Type::Builtin(BuiltinType::Long));
        let narrow = get_score(&pool, &Type::Builtin(BuiltinType::Long), &int());
        assert!(widen > 0);
        assert!(narrow < 0 && narrow > NOLUCK_SCORE);
    }

    #[test]
    fn subclass_scores_below_exact_match() {
        let mut pool = Pool::new();
        let base = pool.add(Node::TypeDecl(TypeDecl::new(Token::none(), "A")));
        let mut sub_decl = TypeDecl::new(Token::none(), "B");
        sub_decl.super_ref = Some(base);
        let sub = pool.add(Node::TypeDecl(sub_decl));

        let a_ty = Type::Base {
            name: "A".into(),
            args: vec![],
            ref_: Some(TypeRef::Decl(base)),
        };
        let b_ty = Type::Base {
            name: "B".into(),
            args: vec![],
            ref_: Some(TypeRef::Decl(sub)),
        };
        assert_eq!(get_score(&pool, &b_ty, &b_ty), SCORE_SEED);
        assert_eq!(get_score(&pool, &b_ty, &a_ty), SCORE_SEED / 2);
        assert_eq!(get_score(&pool, &a_ty, &b_ty), NOLUCK_SCORE);
    }

    #[test]
    fn reference_collapses_against_pointer() {
        let pool = Pool::new();
        let ref_int = Type::Sugar {
            kind: SugarKind::Reference,
            inner: Box::new(int()),
        };
        let ptr_int = Type::pointer(int());
        assert_eq!(get_score(&pool, &ref_int, &ptr_int), SCORE_SEED);
        assert_eq!(get_score(&pool, &ref_int, &int()), SCORE_SEED);
    }

    #[test]
    fn extract_pulls_type_argument_through_structure() {
        let generic_t = Type::Base {
            name: "T".into(),
            args: vec![],
            ref_: Some(TypeRef::Generic(NodeId(0))),
        };
        let decl = Type::Base {
            name: "List".into(),
            args: vec![generic_t],
            ref_: None,
        };
        let actual = Type::Base {
            name: "List".into(),
            args: vec![int()],
            ref_: None,
        };
        assert_eq!(extract_type_arg(&decl, &actual, "T"), Some(int()));
        assert_eq!(extract_type_arg(&decl, &actual, "U"), None);
    }
}
