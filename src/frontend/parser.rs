use super::ast::*;
use super::diagnostic::{Diagnostics, E_PARSE};
use super::lexer::{Keyword, Symbol, Token as LexToken, TokenKind};

pub struct Parser<'a> {
    tokens: Vec<LexToken>,
    idx: usize,
    pool: &'a mut Pool,
    file: FileId,
    pub diags: Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<LexToken>, pool: &'a mut Pool, file: FileId) -> Self {
        Self {
            tokens,
            idx: 0,
            pool,
            file,
            diags: Diagnostics::default(),
        }
    }

    pub fn parse_module(&mut self, name: &str) -> NodeId {
        let token = self.here();
        let mut body = Vec::new();
        let mut import_names = Vec::new();
        self.skip_terms();
        while !self.at_eof() {
            if self.at_keyword(Keyword::Import) {
                self.bump();
                if let Some(n) = self.expect_ident("import name") {
                    import_names.push(n);
                }
                self.skip_terms();
                continue;
            }
            match self.parse_decl(DeclSite::Module) {
                Some(id) => body.push(id),
                None => {
                    let before = self.idx;
                    self.recover();
                    if self.idx == before {
                        // A stray token recover cannot sync on (e.g. `}`)
                        // must still be consumed.
                        self.bump();
                    }
                }
            }
            self.skip_terms();
        }
        self.pool.add(Node::Module(Module {
            token,
            name: name.to_string(),
            file: self.file,
            body,
            import_names,
            imports: Vec::new(),
        }))
    }

    // ---- declarations ----

    fn parse_decl(&mut self, site: DeclSite) -> Option<NodeId> {
        let token = self.here();
        let name = self.expect_ident("declaration name")?;
        let suffix = self.parse_suffix();
        if self.at_symbol(Symbol::ColonEq) {
            self.bump();
            let expr = self.parse_expr()?;
            return Some(self.add_var(token, name, site.var_kind(), None, Some(expr)));
        }
        if !self.expect_symbol(Symbol::Colon) {
            return None;
        }
        if self.at_keyword(Keyword::Class) {
            return self.parse_class(token, name);
        }
        if self.at_keyword(Keyword::Interface) {
            return self.parse_interface(token, name);
        }
        if self.at_keyword(Keyword::Namespace) {
            return self.parse_namespace(token, name);
        }
        if self.at_func_head() {
            let func = self.parse_func(token, name, suffix)?;
            return Some(func);
        }
        if suffix.is_some() {
            self.error_here("suffix is only valid on function declarations");
        }
        let ty = self.parse_type()?;
        let expr = if self.at_symbol(Symbol::Assign) {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        Some(self.add_var(token, name, site.var_kind(), Some(ty), expr))
    }

    fn at_func_head(&self) -> bool {
        self.at_keyword(Keyword::Func)
            || self.at_keyword(Keyword::Extern)
            || self.at_keyword(Keyword::Static)
            || self.at_keyword(Keyword::Inline)
    }

    fn parse_func(&mut self, token: Token, name: String, suffix: Option<String>) -> Option<NodeId> {
        let mut decl = FunctionDecl::new(token, name);
        decl.suffix = suffix;
        loop {
            if self.at_keyword(Keyword::Extern) {
                self.bump();
                decl.is_extern = true;
            } else if self.at_keyword(Keyword::Static) {
                self.bump();
                decl.is_static = true;
            } else if self.at_keyword(Keyword::Inline) {
                self.bump();
                decl.do_inline = true;
            } else {
                break;
            }
        }
        if !self.at_keyword(Keyword::Func) {
            self.error_here("expected `func`");
            return None;
        }
        self.bump();
        if self.at_symbol(Symbol::At) {
            self.bump();
            decl.is_this_ref = true;
        }
        if self.at_symbol(Symbol::Lt) {
            self.parse_type_params(&mut decl)?;
        }
        if self.at_symbol(Symbol::LParen) {
            self.parse_params(&mut decl)?;
        }
        if self.at_symbol(Symbol::Arrow) {
            self.bump();
            decl.return_type = Some(self.parse_type()?);
        }
        if self.at_symbol(Symbol::LBrace) {
            decl.body = Some(self.parse_block()?);
        }
        Some(self.pool.add(Node::FunctionDecl(decl)))
    }

    fn parse_type_params(&mut self, decl: &mut FunctionDecl) -> Option<()> {
        self.bump();
        loop {
            let name = self.expect_ident("type parameter")?;
            if self.at_symbol(Symbol::Colon) {
                self.bump();
                let bound = self.parse_type()?;
                decl.constraints.push((name.clone(), bound));
            }
            decl.type_params.push(name);
            if self.at_symbol(Symbol::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        if !self.expect_symbol(Symbol::Gt) {
            return None;
        }
        Some(())
    }

    fn parse_params(&mut self, decl: &mut FunctionDecl) -> Option<()> {
        self.bump();
        while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
            if self.at_symbol(Symbol::Ellipsis) {
                self.bump();
                decl.extern_variadic = true;
                break;
            }
            let token = self.here();
            let name = self.expect_ident("parameter name")?;
            if self.at_symbol(Symbol::ColonEq) {
                self.bump();
                let default = self.parse_expr()?;
                let arg = self.add_var(token, name, VarKind::Arg, None, Some(default));
                decl.args.push(arg);
            } else {
                if !self.expect_symbol(Symbol::Colon) {
                    return None;
                }
                if self.at_symbol(Symbol::Ellipsis) {
                    self.bump();
                    let arg = self.add_var(token, name, VarKind::VarArg, None, None);
                    decl.args.push(arg);
                } else {
                    let ty = self.parse_type()?;
                    let default = if self.at_symbol(Symbol::Assign) {
                        self.bump();
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    let arg = self.add_var(token, name, VarKind::Arg, Some(ty), default);
                    decl.args.push(arg);
                }
            }
            if self.at_symbol(Symbol::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_symbol(Symbol::RParen);
        Some(())
    }

    fn parse_class(&mut self, token: Token, name: String) -> Option<NodeId> {
        self.bump();
        let mut decl = TypeDecl::new(token, name.clone());
        let mut meta = TypeDecl::new(token, format!("{}Class", name));
        meta.is_meta = true;
        if self.at_symbol(Symbol::Lt) {
            self.bump();
            loop {
                decl.type_params.push(self.expect_ident("type parameter")?);
                if self.at_symbol(Symbol::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
            if !self.expect_symbol(Symbol::Gt) {
                return None;
            }
        }
        if self.at_keyword(Keyword::Extends) {
            self.bump();
            decl.super_name = Some(self.expect_ident("superclass name")?);
        }
        if self.at_keyword(Keyword::Implements) {
            self.bump();
            loop {
                decl.interface_names
                    .push(self.expect_ident("interface name")?);
                if self.at_symbol(Symbol::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        let decl_id = self.pool.add(Node::TypeDecl(decl));
        let meta_id = self.pool.add(Node::TypeDecl(meta));
        self.pool.type_decl_mut(decl_id).meta = Some(meta_id);
        self.pool.type_decl_mut(meta_id).non_meta = Some(decl_id);

        let this_ty = self.pool.type_decl(decl_id).instance_type(decl_id);
        let this_decl = self.add_var(token, "this".to_string(), VarKind::Arg, Some(this_ty), None);
        self.pool.type_decl_mut(decl_id).this_decl = Some(this_decl);

        if !self.expect_symbol(Symbol::LBrace) {
            return None;
        }
        self.skip_terms();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            if self.parse_member(decl_id, meta_id).is_none() {
                self.recover();
            }
            self.skip_terms();
        }
        self.expect_symbol(Symbol::RBrace);
        Some(decl_id)
    }

    fn parse_member(&mut self, decl_id: NodeId, meta_id: NodeId) -> Option<()> {
        let token = self.here();
        // `as` doubles as the name of implicit conversion methods.
        let name = if self.at_keyword(Keyword::As) {
            self.bump();
            "as".to_string()
        } else {
            self.expect_ident("member name")?
        };
        let suffix = self.parse_suffix();
        if !self.expect_symbol(Symbol::Colon) {
            return None;
        }
        if self.at_func_head() {
            let func = self.parse_func(token, name.clone(), suffix)?;
            let is_static = self.pool.func(func).is_static;
            if is_static {
                self.pool.func_mut(func).owner = Some(meta_id);
                self.pool.type_decl_mut(meta_id).functions.push(func);
            } else {
                self.pool.func_mut(func).owner = Some(decl_id);
                self.pool.type_decl_mut(decl_id).functions.push(func);
                if name == "as" {
                    self.pool.type_decl_mut(decl_id).implicit_convs.push(func);
                }
            }
            return Some(());
        }
        if suffix.is_some() {
            self.error_here("suffix is only valid on function declarations");
        }
        let ty = self.parse_type()?;
        let expr = if self.at_symbol(Symbol::Assign) {
            self.bump();
            Some(self.parse_expr()?)
        } else {
            None
        };
        let field = self.add_var(token, name, VarKind::Field, Some(ty), expr);
        self.pool.type_decl_mut(decl_id).fields.push(field);
        Some(())
    }

    fn parse_interface(&mut self, token: Token, name: String) -> Option<NodeId> {
        self.bump();
        let iface_id = self.pool.add(Node::InterfaceDecl(InterfaceDecl {
            token,
            name,
            functions: Vec::new(),
        }));
        if !self.expect_symbol(Symbol::LBrace) {
            return None;
        }
        self.skip_terms();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            let mtoken = self.here();
            let mname = self.expect_ident("interface member")?;
            let msuffix = self.parse_suffix();
            if !self.expect_symbol(Symbol::Colon) {
                return None;
            }
            let func = self.parse_func(mtoken, mname, msuffix)?;
            self.pool.func_mut(func).owner = Some(iface_id);
            match self.pool.get_mut(iface_id) {
                Node::InterfaceDecl(i) => i.functions.push(func),
                _ => unreachable!(),
            }
            self.skip_terms();
        }
        self.expect_symbol(Symbol::RBrace);
        Some(iface_id)
    }

    fn parse_namespace(&mut self, token: Token, name: String) -> Option<NodeId> {
        self.bump();
        let mut body = Vec::new();
        if !self.expect_symbol(Symbol::LBrace) {
            return None;
        }
        self.skip_terms();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            match self.parse_decl(DeclSite::Namespace) {
                Some(id) => body.push(id),
                None => self.recover(),
            }
            self.skip_terms();
        }
        self.expect_symbol(Symbol::RBrace);
        Some(self
            .pool
            .add(Node::NamespaceDecl(NamespaceDecl { token, name, body })))
    }

    // ---- statements ----

    fn parse_block(&mut self) -> Option<NodeId> {
        let token = self.here();
        if !self.expect_symbol(Symbol::LBrace) {
            return None;
        }
        let mut body = Vec::new();
        self.skip_terms();
        while !self.at_symbol(Symbol::RBrace) && !self.at_eof() {
            match self.parse_stmt() {
                Some(id) => body.push(id),
                None => self.recover(),
            }
            self.skip_terms();
        }
        self.expect_symbol(Symbol::RBrace);
        Some(self.pool.add(Node::Block(Block { token, body })))
    }

    fn parse_stmt(&mut self) -> Option<NodeId> {
        let token = self.here();
        if self.at_keyword(Keyword::Return) {
            self.bump();
            let expr = if self.at_symbol(Symbol::Term)
                || self.at_symbol(Symbol::RBrace)
                || self.at_eof()
            {
                None
            } else {
                Some(self.parse_expr()?)
            };
            return Some(self.pool.add(Node::Return(Return { token, expr })));
        }
        // Local declarations: `x := expr` or `x: Type [= expr]`.
        if let TokenKind::Ident(name) = self.cur_kind().clone() {
            if self.peek_symbol(1, Symbol::ColonEq) {
                self.bump();
                self.bump();
                let expr = self.parse_expr()?;
                return Some(self.add_var(token, name, VarKind::Local, None, Some(expr)));
            }
            if self.peek_symbol(1, Symbol::Colon) {
                self.bump();
                self.bump();
                let ty = self.parse_type()?;
                let expr = if self.at_symbol(Symbol::Assign) {
                    self.bump();
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                return Some(self.add_var(token, name, VarKind::Local, Some(ty), expr));
            }
        }
        self.parse_expr()
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Option<NodeId> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Option<NodeId> {
        let token = self.here();
        let left = self.parse_equality()?;
        if self.at_symbol(Symbol::Assign) {
            self.bump();
            let right = self.parse_assign()?;
            return Some(self.pool.add(Node::BinaryOp(BinaryOp {
                token,
                op: BinOpKind::Assign,
                left,
                right,
            })));
        }
        Some(left)
    }

    fn parse_equality(&mut self) -> Option<NodeId> {
        let token = self.here();
        let mut left = self.parse_additive()?;
        while self.at_symbol(Symbol::EqEq) {
            self.bump();
            let right = self.parse_additive()?;
            left = self.pool.add(Node::BinaryOp(BinaryOp {
                token,
                op: BinOpKind::Eq,
                left,
                right,
            }));
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<NodeId> {
        let token = self.here();
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.at_symbol(Symbol::Plus) {
                BinOpKind::Add
            } else if self.at_symbol(Symbol::Minus) {
                BinOpKind::Sub
            } else {
                break;
            };
            self.bump();
            let right = self.parse_multiplicative()?;
            left = self
                .pool
                .add(Node::BinaryOp(BinaryOp { token, op, left, right }));
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<NodeId> {
        let token = self.here();
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.at_symbol(Symbol::Star) {
                BinOpKind::Mul
            } else if self.at_symbol(Symbol::Slash) {
                BinOpKind::Div
            } else {
                break;
            };
            self.bump();
            let right = self.parse_unary()?;
            left = self
                .pool
                .add(Node::BinaryOp(BinaryOp { token, op, left, right }));
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<NodeId> {
        let token = self.here();
        if self.at_symbol(Symbol::Amp) {
            self.bump();
            let inner = self.parse_unary()?;
            return Some(self.pool.add(Node::AddressOf(AddressOf {
                token,
                inner,
                for_generics: false,
            })));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<NodeId> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at_symbol(Symbol::Dot) {
                let token = self.here();
                self.bump();
                let name = self.expect_ident("member name")?;
                let suffix = self.parse_suffix();
                if self.at_symbol(Symbol::LParen) {
                    let args = self.parse_call_args()?;
                    let mut call = FunctionCall::new(token, name);
                    call.expr = Some(expr);
                    call.suffix = suffix;
                    call.args = args;
                    expr = self.pool.add(Node::FunctionCall(call));
                } else {
                    if suffix.is_some() {
                        self.error_here("suffix is only valid on calls");
                    }
                    expr = self.pool.add(Node::VariableAccess(VariableAccess {
                        token,
                        expr: Some(expr),
                        name,
                        ref_: None,
                    }));
                }
                continue;
            }
            if self.at_keyword(Keyword::As) {
                let token = self.here();
                self.bump();
                let target = self.parse_type()?;
                expr = self.pool.add(Node::Cast(Cast {
                    token,
                    inner: expr,
                    target,
                    conv: None,
                }));
                continue;
            }
            break;
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<NodeId> {
        let token = self.here();
        match self.cur_kind().clone() {
            TokenKind::IntLit(value) => {
                self.bump();
                Some(self.pool.add(Node::IntLiteral { token, value }))
            }
            TokenKind::FloatLit(value) => {
                self.bump();
                Some(self.pool.add(Node::FloatLiteral { token, value }))
            }
            TokenKind::StringLit(value) => {
                self.bump();
                Some(self.pool.add(Node::StringLiteral { token, value }))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.bump();
                Some(self.pool.add(Node::BoolLiteral { token, value: true }))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.bump();
                Some(self.pool.add(Node::BoolLiteral { token, value: false }))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.bump();
                Some(self.pool.add(Node::NullLiteral { token }))
            }
            TokenKind::Keyword(Keyword::Func) => self.parse_closure(token),
            TokenKind::Symbol(Symbol::LParen) => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect_symbol(Symbol::RParen);
                Some(inner)
            }
            TokenKind::Ident(name) => {
                self.bump();
                let suffix = self.parse_suffix();
                if self.at_symbol(Symbol::LParen) {
                    let args = self.parse_call_args()?;
                    let mut call = FunctionCall::new(token, name);
                    call.suffix = suffix;
                    call.args = args;
                    return Some(self.pool.add(Node::FunctionCall(call)));
                }
                if suffix.is_some() {
                    self.error_here("suffix is only valid on calls");
                }
                Some(self.pool.add(Node::VariableAccess(VariableAccess {
                    token,
                    expr: None,
                    name,
                    ref_: None,
                })))
            }
            other => {
                self.error_here(&format!("unexpected token {:?}", other));
                None
            }
        }
    }

    fn parse_closure(&mut self, token: Token) -> Option<NodeId> {
        let mut decl = FunctionDecl::new(token, format!("__anon_{}", self.pool.len()));
        decl.is_anon = true;
        self.bump();
        if self.at_symbol(Symbol::LParen) {
            self.parse_params(&mut decl)?;
        }
        if self.at_symbol(Symbol::Arrow) {
            self.bump();
            decl.return_type = Some(self.parse_type()?);
        }
        decl.body = Some(self.parse_block()?);
        Some(self.pool.add(Node::FunctionDecl(decl)))
    }

    fn parse_call_args(&mut self) -> Option<Vec<NodeId>> {
        self.bump();
        let mut args = Vec::new();
        while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
            args.push(self.parse_expr()?);
            if self.at_symbol(Symbol::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect_symbol(Symbol::RParen);
        Some(args)
    }

    // ---- types ----

    fn parse_type(&mut self) -> Option<Type> {
        let mut ty = self.parse_type_primary()?;
        loop {
            if self.at_symbol(Symbol::Star) {
                self.bump();
                ty = Type::Sugar {
                    kind: SugarKind::Pointer,
                    inner: Box::new(ty),
                };
                continue;
            }
            if self.at_symbol(Symbol::At) {
                self.bump();
                ty = Type::Sugar {
                    kind: SugarKind::Reference,
                    inner: Box::new(ty),
                };
                continue;
            }
            if self.at_symbol(Symbol::LBracket) && self.peek_symbol(1, Symbol::RBracket) {
                self.bump();
                self.bump();
                ty = Type::Sugar {
                    kind: SugarKind::Array,
                    inner: Box::new(ty),
                };
                continue;
            }
            break;
        }
        Some(ty)
    }

    fn parse_type_primary(&mut self) -> Option<Type> {
        if self.at_symbol(Symbol::LParen) {
            self.bump();
            let mut items = Vec::new();
            while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
                items.push(self.parse_type()?);
                if self.at_symbol(Symbol::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect_symbol(Symbol::RParen);
            if items.len() == 1 {
                return items.pop();
            }
            return Some(Type::List(items));
        }
        let name = self.expect_ident("type name")?;
        if name == "Func" && self.at_symbol(Symbol::LParen) {
            self.bump();
            let mut params = Vec::new();
            while !self.at_symbol(Symbol::RParen) && !self.at_eof() {
                params.push(self.parse_type()?);
                if self.at_symbol(Symbol::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect_symbol(Symbol::RParen);
            let ret = if self.at_symbol(Symbol::Arrow) {
                self.bump();
                Some(Box::new(self.parse_type()?))
            } else {
                None
            };
            return Some(Type::Func { params, ret });
        }
        if let Some(builtin) = builtin_from_name(&name) {
            return Some(Type::Builtin(builtin));
        }
        let mut args = Vec::new();
        if self.at_symbol(Symbol::Lt) {
            self.bump();
            while !self.at_symbol(Symbol::Gt) && !self.at_eof() {
                args.push(self.parse_type()?);
                if self.at_symbol(Symbol::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect_symbol(Symbol::Gt);
        }
        Some(Type::Base {
            name,
            args,
            ref_: None,
        })
    }

    // ---- plumbing ----

    fn add_var(
        &mut self,
        token: Token,
        name: String,
        kind: VarKind,
        ty: Option<Type>,
        expr: Option<NodeId>,
    ) -> NodeId {
        self.pool.add(Node::VariableDecl(VariableDecl {
            token,
            name,
            kind,
            ty,
            expr,
        }))
    }

    fn parse_suffix(&mut self) -> Option<String> {
        if self.at_symbol(Symbol::Tilde) {
            self.bump();
            if let TokenKind::Ident(s) = self.cur_kind().clone() {
                self.bump();
                return Some(s);
            }
            self.error_here("expected suffix name after `~`");
        }
        None
    }

    fn here(&self) -> Token {
        self.tokens
            .get(self.idx)
            .map(|t| t.pos)
            .unwrap_or_else(Token::none)
    }

    fn cur_kind(&self) -> &TokenKind {
        self.tokens
            .get(self.idx)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn peek_symbol(&self, off: usize, sym: Symbol) -> bool {
        matches!(
            self.tokens.get(self.idx + off).map(|t| &t.kind),
            Some(TokenKind::Symbol(s)) if *s == sym
        )
    }

    fn at_symbol(&self, sym: Symbol) -> bool {
        matches!(self.cur_kind(), TokenKind::Symbol(s) if *s == sym)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        matches!(self.cur_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn at_eof(&self) -> bool {
        matches!(self.cur_kind(), TokenKind::Eof)
    }

    fn bump(&mut self) {
        if self.idx < self.tokens.len() {
            self.idx += 1;
        }
    }

    fn skip_terms(&mut self) {
        while self.at_symbol(Symbol::Term) {
            self.bump();
        }
    }

    fn expect_symbol(&mut self, sym: Symbol) -> bool {
        if self.at_symbol(sym) {
            self.bump();
            return true;
        }
        self.error_here(&format!("expected {:?}", sym));
        false
    }

    fn expect_ident(&mut self, what: &str) -> Option<String> {
        if let TokenKind::Ident(name) = self.cur_kind().clone() {
            self.bump();
            return Some(name);
        }
        self.error_here(&format!("expected {}", what));
        None
    }

    fn error_here(&mut self, message: &str) {
        let d = crate::frontend::diagnostic::Diagnostic::new(message, Some(self.here()))
            .code(E_PARSE);
        self.diags.push_diag(d);
    }

    /// Skips to the next statement terminator or closing brace so one bad
    /// construct cannot cascade.
    fn recover(&mut self) {
        while !self.at_eof()
            && !self.at_symbol(Symbol::Term)
            && !self.at_symbol(Symbol::RBrace)
        {
            self.bump();
        }
        if self.at_symbol(Symbol::Term) {
            self.bump();
        }
    }
}

enum DeclSite {
    Module,
    Namespace,
}

impl DeclSite {
    fn var_kind(&self) -> VarKind {
        match self {
            DeclSite::Module | DeclSite::Namespace => VarKind::Global,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(src: &str) -> (Pool, NodeId) {
        let mut pool = Pool::new();
        let file = pool.add_file("test.opal", src);
        let tokens = Lexer::new(src, file).lex_all();
        let mut parser = Parser::new(tokens, &mut pool, file);
        let module = parser.parse_module("test");
        assert!(
            parser.diags.is_empty(),
            "unexpected parse diagnostics: {:?}",
            parser.diags.items
        );
        (pool, module)
    }

    #[test]
    fn parses_function_with_optional_and_vararg_params() {
        let (pool, module) = parse("g: func (x: Int, y := 7)\nh: func (args: ...)\n");
        let body = &pool.module(module).body;
        assert_eq!(body.len(), 2);
        let g = pool.func(body[0]);
        assert_eq!(g.args.len(), 2);
        assert!(pool.var(g.args[1]).expr.is_some());
        let h = pool.func(body[1]);
        assert_eq!(pool.var(h.args[0]).kind, VarKind::VarArg);
    }

    #[test]
    fn parses_class_with_meta_split() {
        let (pool, module) = parse(
            "List: class <T> {\n    get: func (i: Int) -> T { return null }\n    make: static func -> Int { return 1 }\n}\n",
        );
        let class = pool.type_decl(pool.module(module).body[0]);
        assert_eq!(class.type_params, vec!["T".to_string()]);
        assert_eq!(class.functions.len(), 1);
        let meta = pool.type_decl(class.meta.expect("meta"));
        assert!(meta.is_meta);
        assert_eq!(meta.functions.len(), 1);
        assert_eq!(pool.func(meta.functions[0]).name, "make");
    }

    #[test]
    fn parses_member_call_with_suffix() {
        let (pool, module) = parse("main: func {\n    u := 1\n    x.greet~loud(u)\n}\n");
        let main = pool.func(pool.module(module).body[0]);
        let body = match pool.get(main.body.expect("body")) {
            Node::Block(b) => &b.body,
            _ => unreachable!(),
        };
        let call = pool.call(body[1]);
        assert_eq!(call.name, "greet");
        assert_eq!(call.suffix.as_deref(), Some("loud"));
        assert!(call.expr.is_some());
    }

    #[test]
    fn implicit_conversion_member_is_collected() {
        let (pool, module) = parse("Url: class {\n    as: func -> String { return null }\n}\n");
        let class = pool.type_decl(pool.module(module).body[0]);
        assert_eq!(class.implicit_convs.len(), 1);
        assert_eq!(pool.func(class.implicit_convs[0]).name, "as");
    }
}
