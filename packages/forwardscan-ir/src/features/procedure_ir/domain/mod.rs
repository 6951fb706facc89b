mod ast;

pub use ast::{CatchClause, CompareOp, CompilationUnit, Expr, Param, Procedure, Stmt};
