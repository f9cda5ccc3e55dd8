//! Abstract syntax for the UDF source language.
//!
//! Nodes are produced by [`parser`] and annotated in place by
//! [`validate`]: every expression gets a `dtype`, every call gets the
//! concrete symbol it resolves to.

pub mod parser;
pub mod validate;

use crate::error::CompileError;
use crate::registry::FunctionDesc;
use crate::types::DType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        /// Concrete symbol filled in by validation.
        resolved: Option<String>,
    },
    MemberCall {
        recv: Box<Expr>,
        member: String,
        args: Vec<Expr>,
        resolved: Option<String>,
    },
    Index {
        recv: Box<Expr>,
        index: Box<Expr>,
        resolved: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    /// Inferred type, filled in by validation.
    pub dtype: Option<DType>,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Expr {
        Expr { kind, dtype: None }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Return(Option<Expr>),
    VarDecl {
        dtype: DType,
        name: String,
        init: Expr,
    },
    Assign {
        name: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub dtype: DType,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub return_type: DType,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
}

impl Function {
    /// Signature descriptor for a function compiled in-session.
    pub fn to_desc(&self) -> Result<FunctionDesc, CompileError> {
        FunctionDesc::new(
            self.name.clone(),
            self.return_type.clone(),
            self.params.iter().map(|p| p.dtype.clone()).collect(),
            None,
        )
        .map_err(|err| CompileError::Type {
            message: err.to_string(),
        })
    }
}
