//! Hand-written lexer and recursive-descent parser for UDF source text.

use crate::ast::{BinOp, Expr, ExprKind, Function, Param, Stmt, UnaryOp};
use crate::error::{CompileError, CompileResult};
use crate::types::{DType, Primitive};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    Assign,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

struct Lexer<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Lexer<'a> {
        Lexer {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        let (line, column) = line_column(self.text, self.pos);
        CompileError::Parse {
            message: message.into(),
            line,
            column,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_trivia(&mut self) {
        loop {
            while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
                self.pos += 1;
            }
            // Line comments.
            if self.bytes[self.pos..].starts_with(b"//") {
                while !matches!(self.peek(), None | Some(b'\n')) {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn tokenize(mut self) -> CompileResult<Vec<(Token, usize)>> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(c) = self.peek() else {
                out.push((Token::Eof, start));
                return Ok(out);
            };
            let token = match c {
                b'(' => {
                    self.pos += 1;
                    Token::LParen
                }
                b')' => {
                    self.pos += 1;
                    Token::RParen
                }
                b'{' => {
                    self.pos += 1;
                    Token::LBrace
                }
                b'}' => {
                    self.pos += 1;
                    Token::RBrace
                }
                b'[' => {
                    self.pos += 1;
                    Token::LBracket
                }
                b']' => {
                    self.pos += 1;
                    Token::RBracket
                }
                b',' => {
                    self.pos += 1;
                    Token::Comma
                }
                b';' => {
                    self.pos += 1;
                    Token::Semi
                }
                b'.' => {
                    self.pos += 1;
                    Token::Dot
                }
                b'+' => {
                    self.pos += 1;
                    Token::Plus
                }
                b'-' => {
                    self.pos += 1;
                    Token::Minus
                }
                b'*' => {
                    self.pos += 1;
                    Token::Star
                }
                b'/' => {
                    self.pos += 1;
                    Token::Slash
                }
                b'%' => {
                    self.pos += 1;
                    Token::Percent
                }
                b'=' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::EqEq
                    } else {
                        Token::Assign
                    }
                }
                b'!' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::Ne
                    } else {
                        Token::Not
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::Le
                    } else {
                        Token::Lt
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        Token::Ge
                    } else {
                        Token::Gt
                    }
                }
                b'&' => {
                    if self.bytes[self.pos..].starts_with(b"&&") {
                        self.pos += 2;
                        Token::AndAnd
                    } else {
                        return Err(self.error("unexpected character '&'"));
                    }
                }
                b'|' => {
                    if self.bytes[self.pos..].starts_with(b"||") {
                        self.pos += 2;
                        Token::OrOr
                    } else {
                        return Err(self.error("unexpected character '|'"));
                    }
                }
                c if c.is_ascii_digit() => self.lex_number()?,
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
                        self.pos += 1;
                    }
                    Token::Ident(self.text[start..self.pos].to_string())
                }
                other => {
                    return Err(self.error(format!("unexpected character '{}'", other as char)))
                }
            };
            out.push((token, start));
        }
    }

    fn lex_number(&mut self) -> CompileResult<Token> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek() == Some(b'.')
            && matches!(self.bytes.get(self.pos + 1), Some(c) if c.is_ascii_digit())
        {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = &self.text[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("bad float literal '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(format!("bad integer literal '{}'", text)))
        }
    }
}

fn line_column(text: &str, pos: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for (i, c) in text.char_indices() {
        if i >= pos {
            break;
        }
        if c == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

/// Parse a unit of top-level function definitions.
pub fn parse_source(source: &str) -> CompileResult<Vec<Function>> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        text: source,
        tokens,
        idx: 0,
    };
    let mut functions = Vec::new();
    while !parser.at(&Token::Eof) {
        functions.push(parser.parse_function()?);
    }
    if functions.is_empty() {
        return Err(parser.error("no function definition found"));
    }
    Ok(functions)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(Token, usize)>,
    idx: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> CompileError {
        let pos = self.tokens[self.idx.min(self.tokens.len() - 1)].1;
        let (line, column) = line_column(self.text, pos);
        CompileError::Parse {
            message: message.into(),
            line,
            column,
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.idx].0
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        let i = (self.idx + n).min(self.tokens.len() - 1);
        &self.tokens[i].0
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.idx].0.clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        token
    }

    fn expect(&mut self, token: Token, what: &str) -> CompileResult<()> {
        if self.at(&token) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> CompileResult<String> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                Ok(name)
            }
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    /// Whether `name` begins a type, so statements can distinguish a
    /// declaration from an assignment or expression.
    fn is_type_name(name: &str) -> bool {
        matches!(
            name,
            "void"
                | "bit"
                | "bool"
                | "u8"
                | "i8"
                | "u16"
                | "i16"
                | "u32"
                | "i32"
                | "u64"
                | "i64"
                | "f32"
                | "f64"
                | "int"
                | "long"
                | "float"
                | "double"
                | "string_view"
                | "simd_vector"
                | "vector"
                | "Context"
        )
    }

    fn primitive_from_name(&self, name: &str) -> CompileResult<Primitive> {
        match name {
            "bit" | "bool" => Ok(Primitive::Bit),
            "u8" => Ok(Primitive::U8),
            "i8" => Ok(Primitive::I8),
            "u16" => Ok(Primitive::U16),
            "i16" => Ok(Primitive::I16),
            "u32" => Ok(Primitive::U32),
            "i32" | "int" => Ok(Primitive::I32),
            "u64" => Ok(Primitive::U64),
            "i64" | "long" => Ok(Primitive::I64),
            "f32" | "float" => Ok(Primitive::F32),
            "f64" | "double" => Ok(Primitive::F64),
            other => Err(self.error(format!("unknown element type '{}'", other))),
        }
    }

    fn parse_type(&mut self) -> CompileResult<DType> {
        let name = self.expect_ident("a type name")?;
        match name.as_str() {
            "void" => Ok(DType::Void),
            "bit" | "bool" => Ok(DType::Bit),
            "u8" => Ok(DType::U8),
            "i8" => Ok(DType::I8),
            "u16" => Ok(DType::U16),
            "i16" => Ok(DType::I16),
            "u32" => Ok(DType::U32),
            "i32" | "int" => Ok(DType::I32),
            "u64" => Ok(DType::U64),
            "i64" | "long" => Ok(DType::I64),
            "f32" | "float" => Ok(DType::F32),
            "f64" | "double" => Ok(DType::F64),
            "string_view" => Ok(DType::StringView),
            "Context" => Ok(DType::ContextPtr),
            "simd_vector" | "vector" => {
                self.expect(Token::Lt, "'<'")?;
                let elem = self.expect_ident("an element type")?;
                let elem = self.primitive_from_name(&elem)?;
                self.expect(Token::Gt, "'>'")?;
                Ok(DType::SimdVector(elem))
            }
            other => Err(self.error(format!("unknown type '{}'", other))),
        }
    }

    fn parse_function(&mut self) -> CompileResult<Function> {
        let return_type = self.parse_type()?;
        let name = self.expect_ident("a function name")?;
        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                let dtype = self.parse_type()?;
                let pname = self.expect_ident("a parameter name")?;
                params.push(Param { name: pname, dtype });
                if self.at(&Token::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(Function {
            name,
            return_type,
            params,
            body,
        })
    }

    fn parse_block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.expect(Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.at(&Token::RBrace) {
            if self.at(&Token::Eof) {
                return Err(self.error("unexpected end of input inside block"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.bump();
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> CompileResult<Stmt> {
        match self.peek().clone() {
            Token::Ident(name) if name == "return" => {
                self.bump();
                if self.at(&Token::Semi) {
                    self.bump();
                    return Ok(Stmt::Return(None));
                }
                let expr = self.parse_expr()?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Return(Some(expr)))
            }
            Token::Ident(name) if name == "if" => {
                self.bump();
                self.expect(Token::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                let then_body = self.parse_block()?;
                let else_body = if matches!(self.peek(), Token::Ident(n) if n == "else") {
                    self.bump();
                    Some(self.parse_block()?)
                } else {
                    None
                };
                Ok(Stmt::If {
                    cond,
                    then_body,
                    else_body,
                })
            }
            Token::Ident(name) if name == "while" => {
                self.bump();
                self.expect(Token::LParen, "'('")?;
                let cond = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body })
            }
            Token::Ident(name)
                if Self::is_type_name(&name)
                    && matches!(self.peek_ahead(1), Token::Ident(_) | Token::Lt) =>
            {
                let dtype = self.parse_type()?;
                let vname = self.expect_ident("a variable name")?;
                self.expect(Token::Assign, "'='")?;
                let init = self.parse_expr()?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::VarDecl {
                    dtype,
                    name: vname,
                    init,
                })
            }
            Token::Ident(name) if *self.peek_ahead(1) == Token::Assign => {
                self.bump();
                self.bump();
                let value = self.parse_expr()?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Assign { name, value })
            }
            _ => {
                let expr = self.parse_expr()?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_expr(&mut self) -> CompileResult<Expr> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_logical_and()?;
        while self.at(&Token::OrOr) {
            self.bump();
            let rhs = self.parse_logical_and()?;
            lhs = Expr::new(ExprKind::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.at(&Token::AndAnd) {
            self.bump();
            let rhs = self.parse_equality()?;
            lhs = Expr::new(ExprKind::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Token::EqEq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = Expr::new(ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = Expr::new(ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_term()?;
            lhs = Expr::new(ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> CompileResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = Expr::new(ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        let op = match self.peek() {
            Token::Minus => Some(UnaryOp::Neg),
            Token::Not => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::new(ExprKind::Unary {
                op,
                operand: Box::new(operand),
            }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.bump();
                    let member = self.expect_ident("a member name")?;
                    self.expect(Token::LParen, "'('")?;
                    let args = self.parse_args()?;
                    expr = Expr::new(ExprKind::MemberCall {
                        recv: Box::new(expr),
                        member,
                        args,
                        resolved: None,
                    });
                }
                Token::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::new(ExprKind::Index {
                        recv: Box::new(expr),
                        index: Box::new(index),
                        resolved: None,
                    });
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> CompileResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.at(&Token::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.at(&Token::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        match self.peek().clone() {
            Token::Int(v) => {
                self.bump();
                Ok(Expr::new(ExprKind::IntLiteral(v)))
            }
            Token::Float(v) => {
                self.bump();
                Ok(Expr::new(ExprKind::FloatLiteral(v)))
            }
            Token::Ident(name) if name == "true" => {
                self.bump();
                Ok(Expr::new(ExprKind::BoolLiteral(true)))
            }
            Token::Ident(name) if name == "false" => {
                self.bump();
                Ok(Expr::new(ExprKind::BoolLiteral(false)))
            }
            Token::Ident(name) => {
                self.bump();
                if self.at(&Token::LParen) {
                    self.bump();
                    let args = self.parse_args()?;
                    Ok(Expr::new(ExprKind::Call {
                        name,
                        args,
                        resolved: None,
                    }))
                } else {
                    Ok(Expr::new(ExprKind::Ident(name)))
                }
            }
            Token::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.error("expected an expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identity_function() {
        let funcs = parse_source("int id(int x){ return x; }").unwrap();
        assert_eq!(funcs.len(), 1);
        assert_eq!(funcs[0].name, "id");
        assert_eq!(funcs[0].return_type, DType::I32);
        assert_eq!(funcs[0].params.len(), 1);
        assert_eq!(funcs[0].params[0].dtype, DType::I32);
        assert!(matches!(funcs[0].body[0], Stmt::Return(Some(_))));
    }

    #[test]
    fn test_parse_vector_and_context_params() {
        let funcs =
            parse_source("float g(Context ctx, simd_vector<f32> v){ return v[0]; }").unwrap();
        let f = &funcs[0];
        assert_eq!(f.params[0].dtype, DType::ContextPtr);
        assert_eq!(f.params[1].dtype, DType::SimdVector(Primitive::F32));
    }

    #[test]
    fn test_parse_control_flow() {
        let src = r#"
            int fib(int n){
                int a = 0;
                int b = 1;
                int i = 0;
                while (i < n) {
                    int t = a + b;
                    a = b;
                    b = t;
                    i = i + 1;
                }
                return a;
            }
        "#;
        let funcs = parse_source(src).unwrap();
        assert_eq!(funcs[0].body.len(), 5);
        assert!(matches!(funcs[0].body[3], Stmt::While { .. }));
    }

    #[test]
    fn test_parse_member_call_and_calls() {
        let src = "u64 f(simd_vector<f32> v){ return v.size(); }";
        let funcs = parse_source(src).unwrap();
        assert!(matches!(
            funcs[0].body[0],
            Stmt::Return(Some(Expr {
                kind: ExprKind::MemberCall { .. },
                ..
            }))
        ));
    }

    #[test]
    fn test_parse_errors_carry_location() {
        let err = parse_source("int broken(int x){ return x }").unwrap_err();
        match err {
            CompileError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_source("@@@").is_err());
        assert!(parse_source("").is_err());
    }
}
