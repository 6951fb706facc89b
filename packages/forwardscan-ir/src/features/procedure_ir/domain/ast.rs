//! Procedure IR
//!
//! Statement/expression tree for one procedure as emitted by a language front end.
//! The analysis never parses source text; it only consumes this shape (usually JSON).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::shared::models::Span;

// ============================================================================
// Units and procedures
// ============================================================================

/// One analyzed compilation unit (a class, a module, ...)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub name: String,

    /// Unit-level string constants (`static final String BASE_PATH = "/pages"`)
    #[serde(default)]
    pub constants: BTreeMap<String, String>,

    #[serde(default)]
    pub procedures: Vec<Procedure>,
}

impl CompilationUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.constants.insert(name.into(), value.into());
        self
    }

    pub fn with_procedure(mut self, procedure: Procedure) -> Self {
        self.procedures.push(procedure);
        self
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.name == name)
    }
}

/// Procedure parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            annotations: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
    pub name: String,

    /// Annotation names without the `@` (`GetMapping`, `Override`, ...)
    #[serde(default)]
    pub annotations: Vec<String>,

    #[serde(default)]
    pub params: Vec<Param>,

    #[serde(default)]
    pub return_type: Option<String>,

    /// Procedure-local constants, shadowing unit constants
    #[serde(default)]
    pub constants: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Vec<Stmt>,

    #[serde(default)]
    pub span: Span,
}

impl Procedure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotations.push(annotation.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.return_type = Some(ty.into());
        self
    }

    pub fn with_body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Name plus parameter types; tells overloads apart
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.params.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(", "))
    }

    /// Whether any annotation ends with `suffix` (`GetMapping` ends with `Mapping`)
    pub fn has_annotation_suffix(&self, suffix: &str) -> bool {
        self.annotations
            .iter()
            .any(|a| a.rsplit('.').next().unwrap_or(a).ends_with(suffix))
    }
}

// ============================================================================
// Statements
// ============================================================================

/// `catch (Type param) { body }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub exception_type: Option<String>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// Local declaration, optionally initialized
    Local {
        name: String,
        #[serde(default, rename = "type")]
        ty: Option<String>,
        #[serde(default)]
        init: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
    Assign {
        target: String,
        value: Expr,
        #[serde(default)]
        span: Span,
    },
    Expr {
        expr: Expr,
        #[serde(default)]
        span: Span,
    },
    If {
        cond: Expr,
        #[serde(default)]
        then_branch: Vec<Stmt>,
        #[serde(default)]
        else_branch: Option<Vec<Stmt>>,
        #[serde(default)]
        span: Span,
    },
    While {
        cond: Expr,
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        span: Span,
    },
    Block {
        #[serde(default)]
        stmts: Vec<Stmt>,
    },
    Try {
        #[serde(default)]
        body: Vec<Stmt>,
        #[serde(default)]
        handlers: Vec<CatchClause>,
        #[serde(default)]
        finally: Option<Vec<Stmt>>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
}

impl Stmt {
    pub fn local(name: impl Into<String>, init: Expr) -> Self {
        Stmt::Local {
            name: name.into(),
            ty: None,
            init: Some(init),
            span: Span::zero(),
        }
    }

    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            value,
            span: Span::zero(),
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr {
            expr,
            span: Span::zero(),
        }
    }

    pub fn if_then(cond: Expr, then_branch: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_branch,
            else_branch: None,
            span: Span::zero(),
        }
    }

    pub fn if_else(cond: Expr, then_branch: Vec<Stmt>, else_branch: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then_branch,
            else_branch: Some(else_branch),
            span: Span::zero(),
        }
    }

    pub fn while_loop(cond: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While {
            cond,
            body,
            span: Span::zero(),
        }
    }

    pub fn try_catch(body: Vec<Stmt>, handlers: Vec<CatchClause>) -> Self {
        Stmt::Try {
            body,
            handlers,
            finally: None,
        }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return {
            value,
            span: Span::zero(),
        }
    }

    /// Attach a span (no-op for spanless statements)
    pub fn at(mut self, at: Span) -> Self {
        match &mut self {
            Stmt::Local { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Expr { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Return { span, .. } => *span = at,
            Stmt::Block { .. } | Stmt::Try { .. } => {}
        }
        self
    }

    /// Names of all variables assigned anywhere inside this statement
    pub fn collect_assigned(&self, out: &mut Vec<String>) {
        match self {
            Stmt::Local { name, init, .. } => {
                if init.is_some() {
                    push_unique(out, name);
                }
            }
            Stmt::Assign { target, .. } => push_unique(out, target),
            Stmt::Expr { .. } | Stmt::Return { .. } => {}
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                for s in then_branch.iter().chain(else_branch.iter().flatten()) {
                    s.collect_assigned(out);
                }
            }
            Stmt::While { body, .. } | Stmt::Block { stmts: body } => {
                for s in body {
                    s.collect_assigned(out);
                }
            }
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                let handler_stmts = handlers.iter().flat_map(|h| h.body.iter());
                for s in body
                    .iter()
                    .chain(handler_stmts)
                    .chain(finally.iter().flatten())
                {
                    s.collect_assigned(out);
                }
            }
        }
    }
}

impl CatchClause {
    pub fn new(param: impl Into<String>, exception_type: impl Into<String>, body: Vec<Stmt>) -> Self {
        Self {
            param: Some(param.into()),
            exception_type: Some(exception_type.into()),
            body,
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Literal {
        value: String,
    },
    Null,
    Var {
        name: String,
    },
    /// Method call. Static calls carry no receiver but usually a `receiver_type`.
    Call {
        #[serde(default)]
        receiver: Option<Box<Expr>>,
        #[serde(default)]
        receiver_type: Option<String>,
        method: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
    New {
        class: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
    /// String concatenation, operands left to right
    Concat {
        operands: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
    Not {
        operand: Box<Expr>,
    },
    And {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Or {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cast {
        #[serde(rename = "type")]
        ty: String,
        operand: Box<Expr>,
    },
}

impl Expr {
    pub fn lit(value: impl Into<String>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var { name: name.into() }
    }

    /// `receiver.method(args)`
    pub fn call(receiver: Expr, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: Some(Box::new(receiver)),
            receiver_type: None,
            method: method.into(),
            args,
            span: Span::zero(),
        }
    }

    /// `receiver.method(args)` with the receiver's static type known
    pub fn typed_call(
        receiver: Expr,
        receiver_type: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Expr>,
    ) -> Self {
        Expr::Call {
            receiver: Some(Box::new(receiver)),
            receiver_type: Some(receiver_type.into()),
            method: method.into(),
            args,
            span: Span::zero(),
        }
    }

    /// `Type.method(args)`
    pub fn static_call(
        receiver_type: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Expr>,
    ) -> Self {
        Expr::Call {
            receiver: None,
            receiver_type: Some(receiver_type.into()),
            method: method.into(),
            args,
            span: Span::zero(),
        }
    }

    /// Unqualified call on the enclosing object (`getServletConfig()`)
    pub fn local_call(method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: None,
            receiver_type: None,
            method: method.into(),
            args,
            span: Span::zero(),
        }
    }

    pub fn new_object(class: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::New {
            class: class.into(),
            args,
            span: Span::zero(),
        }
    }

    pub fn concat(operands: Vec<Expr>) -> Self {
        Expr::Concat {
            operands,
            span: Span::zero(),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Not {
            operand: Box::new(operand),
        }
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::And {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::Or {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::Compare {
            op: CompareOp::Eq,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn ne(lhs: Expr, rhs: Expr) -> Self {
        Expr::Compare {
            op: CompareOp::Ne,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn cast(ty: impl Into<String>, operand: Expr) -> Self {
        Expr::Cast {
            ty: ty.into(),
            operand: Box::new(operand),
        }
    }

    /// Attach a span to calls, constructions and concatenations
    pub fn at(mut self, at: Span) -> Self {
        match &mut self {
            Expr::Call { span, .. } | Expr::New { span, .. } | Expr::Concat { span, .. } => {
                *span = at
            }
            _ => {}
        }
        self
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::Call { span, .. } | Expr::New { span, .. } | Expr::Concat { span, .. } => *span,
            Expr::Not { operand } | Expr::Cast { operand, .. } => operand.span(),
            Expr::And { lhs, .. } | Expr::Or { lhs, .. } | Expr::Compare { lhs, .. } => lhs.span(),
            Expr::Literal { .. } | Expr::Null | Expr::Var { .. } => Span::zero(),
        }
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Expr::Var { name } => Some(name),
            Expr::Cast { operand, .. } => operand.as_var(),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Expr::Literal { value } => Some(value),
            _ => None,
        }
    }

    /// Variables read by this expression, in first-occurrence order
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Var { name } => push_unique(out, name),
            Expr::Literal { .. } | Expr::Null => {}
            Expr::Call { receiver, args, .. } => {
                if let Some(r) = receiver {
                    r.collect_variables(out);
                }
                for a in args {
                    a.collect_variables(out);
                }
            }
            Expr::New { args, .. } => {
                for a in args {
                    a.collect_variables(out);
                }
            }
            Expr::Concat { operands, .. } => {
                for o in operands {
                    o.collect_variables(out);
                }
            }
            Expr::Not { operand } | Expr::Cast { operand, .. } => operand.collect_variables(out),
            Expr::And { lhs, rhs } | Expr::Or { lhs, rhs } | Expr::Compare { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

fn push_unique(out: &mut Vec<String>, name: &str) {
    if !out.iter().any(|n| n == name) {
        out.push(name.to_string());
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", a)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value } => write!(f, "{:?}", value),
            Expr::Null => write!(f, "null"),
            Expr::Var { name } => write!(f, "{}", name),
            Expr::Call {
                receiver,
                receiver_type,
                method,
                args,
                ..
            } => {
                match (receiver, receiver_type) {
                    (Some(r), _) => write!(f, "{}.", r)?,
                    (None, Some(t)) => write!(f, "{}.", t.rsplit('.').next().unwrap_or(t))?,
                    (None, None) => {}
                }
                write!(f, "{}(", method)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::New { class, args, .. } => {
                write!(f, "new {}(", class)?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Expr::Concat { operands, .. } => {
                for (i, o) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", o)?;
                }
                Ok(())
            }
            Expr::Not { operand } => write!(f, "!{}", operand),
            Expr::And { lhs, rhs } => write!(f, "({} && {})", lhs, rhs),
            Expr::Or { lhs, rhs } => write!(f, "({} || {})", lhs, rhs),
            Expr::Compare { op, lhs, rhs } => {
                let sym = match op {
                    CompareOp::Eq => "==",
                    CompareOp::Ne => "!=",
                };
                write!(f, "{} {} {}", lhs, sym, rhs)
            }
            Expr::Cast { ty, operand } => write!(f, "(({}) {})", ty, operand),
        }
    }
}
