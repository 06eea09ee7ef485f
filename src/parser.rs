//! Recursive-descent parser producing the walkable parse tree
//! (`ast::Program`) that the semantic analyzer consumes.
//!
//! Shaped like `crates/compiler/src/parser.rs`: a `Parser` struct holding a
//! token cursor, one method per grammar production, `Result<_, CompileError>`
//! threaded throughout.

use crate::ast::*;
use crate::errors::CompileError;
use crate::lexer::{Lexer, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    next_id: NodeId,
}

type PResult<T> = Result<T, CompileError>;

impl Parser {
    pub fn new(source: &str) -> PResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Parser { tokens, pos: 0, next_id: 0 })
    }

    pub fn parse(&mut self) -> PResult<Program> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::Eof) {
            statements.push(self.statement()?);
        }
        Ok(Program { statements })
    }

    // ---- token cursor helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn loc(&self) -> SourceLocation {
        self.peek().loc
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(CompileError::syntax(
                format!("expected {}, found {:?}", what, self.peek().kind),
                self.loc(),
            ))
        }
    }

    fn eat_ident(&mut self) -> PResult<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(CompileError::syntax(
                format!("expected identifier, found {:?}", other),
                self.loc(),
            )),
        }
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn next_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---- declarations ----

    fn class_decl(&mut self) -> PResult<ClassDecl> {
        let loc = self.loc();
        self.eat(TokenKind::Class, "'class'")?;
        let name = self.eat_ident()?;
        let superclass = if self.matches(&TokenKind::Colon) {
            Some(self.eat_ident()?)
        } else {
            None
        };
        self.eat(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            match self.peek().kind {
                TokenKind::Var | TokenKind::Let => {
                    let v = self.var_decl()?;
                    self.eat(TokenKind::Semicolon, "';'")?;
                    fields.push(v);
                }
                TokenKind::Function => methods.push(self.function_decl()?),
                _ => {
                    return Err(CompileError::syntax(
                        "expected field or method declaration in class body",
                        self.loc(),
                    ));
                }
            }
        }
        self.eat(TokenKind::RBrace, "'}'")?;
        Ok(ClassDecl { name, superclass, fields, methods, loc })
    }

    fn function_decl(&mut self) -> PResult<FunctionDecl> {
        let loc = self.loc();
        self.eat(TokenKind::Function, "'function'")?;
        let name = self.eat_ident()?;
        self.eat(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let p_loc = self.loc();
                let p_name = self.eat_ident()?;
                self.eat(TokenKind::Colon, "':'")?;
                let ty = self.type_annotation()?;
                params.push(Param { name: p_name, ty, loc: p_loc });
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(TokenKind::RParen, "')'")?;
        let return_type = if self.matches(&TokenKind::Colon) {
            self.type_annotation()?
        } else {
            TypeAnnotation::Void
        };
        let body = self.block()?;
        Ok(FunctionDecl { name, params, return_type, body, loc })
    }

    fn var_decl(&mut self) -> PResult<VarDecl> {
        let loc = self.loc();
        self.advance(); // 'let' or 'var'
        let name = self.eat_ident()?;
        let declared_type = if self.matches(&TokenKind::Colon) {
            Some(self.type_annotation()?)
        } else {
            None
        };
        let init = if self.matches(&TokenKind::Assign) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(VarDecl { name, declared_type, init, loc })
    }

    fn type_annotation(&mut self) -> PResult<TypeAnnotation> {
        let mut ty = match self.peek().kind.clone() {
            TokenKind::TypeInteger => {
                self.advance();
                TypeAnnotation::Integer
            }
            TokenKind::TypeFloat => {
                self.advance();
                TypeAnnotation::Float
            }
            TokenKind::TypeBoolean => {
                self.advance();
                TypeAnnotation::Boolean
            }
            TokenKind::TypeString => {
                self.advance();
                TypeAnnotation::String
            }
            TokenKind::TypeVoid => {
                self.advance();
                TypeAnnotation::Void
            }
            TokenKind::Ident(name) => {
                self.advance();
                TypeAnnotation::Class(name)
            }
            _ => {
                return Err(CompileError::syntax(
                    format!("expected type, found {:?}", self.peek().kind),
                    self.loc(),
                ));
            }
        };
        while self.check(&TokenKind::LBracket) {
            self.advance();
            self.eat(TokenKind::RBracket, "']'")?;
            ty = TypeAnnotation::Array(Box::new(ty));
        }
        Ok(ty)
    }

    // ---- statements ----

    fn block(&mut self) -> PResult<Block> {
        self.eat(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            stmts.push(self.statement()?);
        }
        self.eat(TokenKind::RBrace, "'}'")?;
        Ok(Block(stmts))
    }

    fn statement(&mut self) -> PResult<Stmt> {
        match self.peek().kind {
            TokenKind::Class => Ok(Stmt::Class(self.class_decl()?)),
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::If => self.if_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Do => self.do_while_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Foreach => self.foreach_stmt(),
            TokenKind::Break => {
                let loc = self.loc();
                self.advance();
                self.eat(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Break(loc))
            }
            TokenKind::Continue => {
                let loc = self.loc();
                self.advance();
                self.eat(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Continue(loc))
            }
            TokenKind::Return => {
                let loc = self.loc();
                self.advance();
                let value = if self.check(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.eat(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Return { value, loc })
            }
            TokenKind::Print => {
                let loc = self.loc();
                self.advance();
                self.eat(TokenKind::LParen, "'('")?;
                let e = self.expr()?;
                self.eat(TokenKind::RParen, "')'")?;
                self.eat(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Print(e, loc))
            }
            TokenKind::Function => Ok(Stmt::Function(self.function_decl()?)),
            TokenKind::Let | TokenKind::Var => {
                let v = self.var_decl()?;
                self.eat(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::VarDecl(v))
            }
            _ => {
                let e = self.expr()?;
                self.eat(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Expr(e))
            }
        }
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        self.eat(TokenKind::LParen, "'('")?;
        let cond = self.expr()?;
        self.eat(TokenKind::RParen, "')'")?;
        let then_branch = self.block()?;
        let else_branch = if self.matches(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(Block(vec![self.if_stmt()?]))
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch, loc })
    }

    fn while_stmt(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        self.eat(TokenKind::LParen, "'('")?;
        let cond = self.expr()?;
        self.eat(TokenKind::RParen, "')'")?;
        let body = self.block()?;
        Ok(Stmt::While { cond, body, loc })
    }

    fn do_while_stmt(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        let body = self.block()?;
        self.eat(TokenKind::While, "'while'")?;
        self.eat(TokenKind::LParen, "'('")?;
        let cond = self.expr()?;
        self.eat(TokenKind::RParen, "')'")?;
        self.eat(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::DoWhile { body, cond, loc })
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        self.eat(TokenKind::LParen, "'('")?;
        let init = if self.check(&TokenKind::Semicolon) {
            self.advance();
            None
        } else if matches!(self.peek().kind, TokenKind::Let | TokenKind::Var) {
            let v = self.var_decl()?;
            self.eat(TokenKind::Semicolon, "';'")?;
            Some(Box::new(Stmt::VarDecl(v)))
        } else {
            let e = self.expr()?;
            self.eat(TokenKind::Semicolon, "';'")?;
            Some(Box::new(Stmt::Expr(e)))
        };
        let cond = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.expr()?)
        };
        self.eat(TokenKind::Semicolon, "';'")?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.expr()?)
        };
        self.eat(TokenKind::RParen, "')'")?;
        let body = self.block()?;
        Ok(Stmt::For { init, cond, update, body, loc })
    }

    fn foreach_stmt(&mut self) -> PResult<Stmt> {
        let loc = self.loc();
        self.advance();
        self.eat(TokenKind::LParen, "'('")?;
        let var_name = self.eat_ident()?;
        self.eat(TokenKind::In, "'in'")?;
        let iterable = self.expr()?;
        self.eat(TokenKind::RParen, "')'")?;
        let body = self.block()?;
        Ok(Stmt::Foreach { var_name, iterable, body, loc })
    }

    // ---- expressions, precedence climbing ----

    fn expr(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        let target = self.ternary()?;
        if self.matches(&TokenKind::Assign) {
            let value = self.assignment()?;
            let id = self.next_id();
            return Ok(Expr {
                id,
                kind: ExprKind::Assign { target: Box::new(target), value: Box::new(value) },
                loc,
            });
        }
        Ok(target)
    }

    fn ternary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        let cond = self.logic_or()?;
        if self.matches(&TokenKind::Question) {
            let then_expr = self.expr()?;
            self.eat(TokenKind::Colon, "':'")?;
            let else_expr = self.ternary()?;
            let id = self.next_id();
            return Ok(Expr {
                id,
                kind: ExprKind::Ternary {
                    cond: Box::new(cond),
                    then_expr: Box::new(then_expr),
                    else_expr: Box::new(else_expr),
                },
                loc,
            });
        }
        Ok(cond)
    }

    fn logic_or(&mut self) -> PResult<Expr> {
        let mut left = self.logic_and()?;
        while self.check(&TokenKind::Or) {
            let loc = self.loc();
            self.advance();
            let right = self.logic_and()?;
            let id = self.next_id();
            left = Expr {
                id,
                kind: ExprKind::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) },
                loc,
            };
        }
        Ok(left)
    }

    fn logic_and(&mut self) -> PResult<Expr> {
        let mut left = self.equality()?;
        while self.check(&TokenKind::And) {
            let loc = self.loc();
            self.advance();
            let right = self.equality()?;
            let id = self.next_id();
            left = Expr {
                id,
                kind: ExprKind::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) },
                loc,
            };
        }
        Ok(left)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.comparison()?;
            let id = self.next_id();
            left = Expr { id, kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.term()?;
            let id = self.next_id();
            left = Expr { id, kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc };
        }
        Ok(left)
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.factor()?;
            let id = self.next_id();
            left = Expr { id, kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc };
        }
        Ok(left)
    }

    fn factor(&mut self) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let loc = self.loc();
            self.advance();
            let right = self.unary()?;
            let id = self.next_id();
            left = Expr { id, kind: ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, loc };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.unary()?;
            let id = self.next_id();
            return Ok(Expr { id, kind: ExprKind::Unary { op, operand: Box::new(operand) }, loc });
        }
        self.call()
    }

    fn call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    let loc = self.loc();
                    self.advance();
                    let name = self.eat_ident()?;
                    if self.check(&TokenKind::LParen) {
                        let args = self.arg_list()?;
                        let id = self.next_id();
                        expr = Expr {
                            id,
                            kind: ExprKind::MethodCall { receiver: Box::new(expr), method: name, args },
                            loc,
                        };
                    } else {
                        let id = self.next_id();
                        expr = Expr {
                            id,
                            kind: ExprKind::FieldAccess { receiver: Box::new(expr), field: name },
                            loc,
                        };
                    }
                }
                TokenKind::LBracket => {
                    let loc = self.loc();
                    self.advance();
                    let index = self.expr()?;
                    self.eat(TokenKind::RBracket, "']'")?;
                    let id = self.next_id();
                    expr = Expr { id, kind: ExprKind::Index { array: Box::new(expr), index: Box::new(index) }, loc };
                }
                TokenKind::LParen => {
                    let loc = self.loc();
                    let callee = match &expr.kind {
                        ExprKind::Ident(name) => name.clone(),
                        _ => {
                            return Err(CompileError::syntax(
                                "only a plain identifier may be called as a function",
                                loc,
                            ));
                        }
                    };
                    let args = self.arg_list()?;
                    let id = self.next_id();
                    expr = Expr { id, kind: ExprKind::Call { callee, args }, loc };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn arg_list(&mut self) -> PResult<Vec<Expr>> {
        self.eat(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.eat(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let loc = self.loc();
        let kind = match self.peek().kind.clone() {
            TokenKind::Int(v) => {
                self.advance();
                ExprKind::Literal(Literal::Int(v))
            }
            TokenKind::Float(v) => {
                self.advance();
                ExprKind::Literal(Literal::Float(v))
            }
            TokenKind::Str(v) => {
                self.advance();
                ExprKind::Literal(Literal::Str(v))
            }
            TokenKind::True => {
                self.advance();
                ExprKind::Literal(Literal::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                ExprKind::Literal(Literal::Bool(false))
            }
            TokenKind::Null => {
                self.advance();
                ExprKind::Literal(Literal::Null)
            }
            TokenKind::This => {
                self.advance();
                ExprKind::This
            }
            TokenKind::Ident(name) => {
                self.advance();
                ExprKind::Ident(name)
            }
            TokenKind::New => {
                self.advance();
                let class_name = self.eat_ident()?;
                self.eat(TokenKind::LParen, "'('")?;
                self.eat(TokenKind::RParen, "')'")?;
                ExprKind::New { class_name }
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.expr()?;
                self.eat(TokenKind::RParen, "')'")?;
                return Ok(e);
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&TokenKind::RBracket) {
                    loop {
                        elements.push(self.expr()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.eat(TokenKind::RBracket, "']'")?;
                ExprKind::ArrayLiteral { elements }
            }
            other => {
                return Err(CompileError::syntax(
                    format!("unexpected token {:?} in expression", other),
                    loc,
                ));
            }
        };
        let id = self.next_id();
        Ok(Expr { id, kind, loc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        Parser::new(src).unwrap().parse().unwrap()
    }

    #[test]
    fn parses_var_decl_with_initializer() {
        let p = parse("let i = 0;");
        assert_eq!(p.statements.len(), 1);
        match &p.statements[0] {
            Stmt::VarDecl(v) => {
                assert_eq!(v.name, "i");
                assert!(v.init.is_some());
            }
            _ => panic!("expected var decl"),
        }
    }

    #[test]
    fn parses_function_with_params_and_return_type() {
        let p = parse("function add(a: integer, b: integer): integer { return a + b; }");
        match &p.statements[0] {
            Stmt::Function(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.return_type, TypeAnnotation::Integer);
            }
            _ => panic!("expected function decl"),
        }
    }

    #[test]
    fn parses_class_with_fields_and_methods() {
        let p = parse(
            "class P { var x: integer; var y: integer; function sum(): integer { return this.x + this.y; } }",
        );
        match &p.statements[0] {
            Stmt::Class(c) => {
                assert_eq!(c.fields.len(), 2);
                assert_eq!(c.methods.len(), 1);
            }
            _ => panic!("expected class decl"),
        }
    }

    #[test]
    fn binary_precedence_multiplies_before_adding() {
        let p = parse("function f(): integer { return 1 + 2 * 3; } ");
        let Stmt::Function(f) = &p.statements[0] else { panic!() };
        let Stmt::Return { value: Some(e), .. } = &f.body.0[0] else { panic!() };
        match &e.kind {
            ExprKind::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
            }
            _ => panic!("expected addition at the top"),
        }
    }

    #[test]
    fn parses_foreach_and_array_literal() {
        let p = parse(
            "function f(): void { let a: integer[] = [1, 2, 3]; foreach (x in a) { print(x); } }",
        );
        let Stmt::Function(f) = &p.statements[0] else { panic!() };
        assert!(matches!(f.body.0[1], Stmt::Foreach { .. }));
    }

    #[test]
    fn rejects_calling_a_non_identifier() {
        let err = Parser::new("function f(): void { (1)(); }").unwrap().parse();
        assert!(err.is_err());
    }
}
