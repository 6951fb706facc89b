/*
 * Flow Graph Builder
 *
 * Converts one procedure into a value-flow graph (petgraph DiGraph).
 *
 * - One node per sub-expression, one edge per direct data dependency
 * - SSA-style variables: each definition is a VARIABLE_REF node, uses
 *   connect to the reaching definition, joins create PHI nodes
 * - Loop headers pre-scan the body for assigned variables; back edges are
 *   added once the body is built
 * - Each boolean test becomes a GuardCondition; per branch and per refined
 *   variable a GUARD node becomes the reaching definition inside the branch
 * - Boolean flags bound to a predicate (`flag = v.contains("%")`) are tracked
 *   as aliases so `while (flag)` refines `v` like the direct form
 */

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tracing::debug;

use super::signature_catalog::SignatureCatalog;
use crate::features::procedure_ir::{CatchClause, CompareOp, Expr, Procedure, Stmt};
use crate::features::taint_analysis::domain::{
    CallRole, CallSignature, EdgeKind, FlowEdge, FlowNode, GuardAtom, GuardCondition, GuardId,
    GuardOperand, GuardOperator, NodeKind,
};
use crate::shared::models::Span;

/// Hard ceiling on graph size per procedure
const MAX_NODES: usize = 200_000;

/// Hard ceiling on expression/statement nesting
const MAX_NESTING: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("procedure '{procedure}' declares parameter '{name}' twice")]
    DuplicateParameter { procedure: String, name: String },

    #[error("procedure '{procedure}' exceeds {limit} graph nodes")]
    NodeLimit { procedure: String, limit: usize },

    #[error("procedure '{procedure}' nests deeper than {limit} levels")]
    NestingLimit { procedure: String, limit: usize },
}

pub type BuildResult<T> = Result<T, BuildError>;

// ============================================================================
// Flow graph
// ============================================================================

/// Value-flow graph of one procedure
#[derive(Debug, Clone)]
pub struct FlowGraph {
    pub procedure: String,
    pub graph: DiGraph<FlowNode, FlowEdge>,
    pub guards: Vec<GuardCondition>,
    pub sources: Vec<NodeIndex>,
    pub sinks: Vec<NodeIndex>,
}

impl FlowGraph {
    pub fn node(&self, idx: NodeIndex) -> &FlowNode {
        &self.graph[idx]
    }

    pub fn guard(&self, id: GuardId) -> Option<&GuardCondition> {
        self.guards.get(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Predecessors along taint-carrying edges
    pub fn taint_preds(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .filter(|e| e.weight().carries_taint())
            .map(|e| e.source())
    }

    /// Nodes feeding the checked argument positions of a sink
    pub fn sink_args(&self, sink: NodeIndex) -> Vec<NodeIndex> {
        let positions = match &self.graph[sink].kind {
            NodeKind::SinkCall { args } => args,
            _ => return Vec::new(),
        };
        let mut out: Vec<NodeIndex> = self
            .graph
            .edges_directed(sink, Direction::Incoming)
            .filter_map(|e| match e.weight().kind {
                EdgeKind::Argument { index } if positions.contains(&index) => Some(e.source()),
                _ => None,
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Nodes reachable from `from` along taint-carrying edges (inclusive)
    pub fn reachable_from(&self, from: NodeIndex) -> Vec<bool> {
        let mut seen = vec![false; self.graph.node_count()];
        let mut queue = VecDeque::from([from]);
        seen[from.index()] = true;
        while let Some(n) = queue.pop_front() {
            for e in self.graph.edges_directed(n, Direction::Outgoing) {
                if e.weight().carries_taint() && !seen[e.target().index()] {
                    seen[e.target().index()] = true;
                    queue.push_back(e.target());
                }
            }
        }
        seen
    }

    /// Nodes from which any of `targets` is reachable (inclusive)
    pub fn co_reachable(&self, targets: &[NodeIndex]) -> Vec<bool> {
        let mut seen = vec![false; self.graph.node_count()];
        let mut queue: VecDeque<NodeIndex> = targets.iter().copied().collect();
        for t in targets {
            seen[t.index()] = true;
        }
        while let Some(n) = queue.pop_front() {
            for p in self.taint_preds(n) {
                if !seen[p.index()] {
                    seen[p.index()] = true;
                    queue.push_back(p);
                }
            }
        }
        seen
    }

    /// Number of distinct checks guard atoms can contribute
    pub fn atom_count(&self) -> usize {
        self.guards
            .iter()
            .map(|g| g.on_true.len() + g.on_false.len())
            .sum()
    }
}

// ============================================================================
// Boolean predicate aliases
// ============================================================================

/// Flags currently bound to a predicate expression
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    bindings: BTreeMap<String, Expr>,
}

fn is_predicate(expr: &Expr) -> bool {
    match expr {
        Expr::Call {
            receiver: Some(_),
            method,
            args,
            ..
        } => args.len() == 1 && GuardOperator::from_method(method).is_some(),
        Expr::Not { operand } => is_predicate(operand),
        Expr::And { lhs, rhs } | Expr::Or { lhs, rhs } => is_predicate(lhs) && is_predicate(rhs),
        Expr::Compare { lhs, rhs, .. } => {
            matches!(**lhs, Expr::Null) || matches!(**rhs, Expr::Null)
        }
        _ => false,
    }
}

impl AliasTable {
    pub fn get(&self, flag: &str) -> Option<&Expr> {
        self.bindings.get(flag)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// `var` was reassigned: drop its binding and every binding reading it
    pub fn invalidate(&mut self, var: &str) {
        self.bindings
            .retain(|flag, pred| flag != var && !pred.variables().iter().any(|v| v == var));
    }

    /// `flag = value`
    pub fn assign(&mut self, flag: &str, value: &Expr) {
        self.invalidate(flag);
        if is_predicate(value) && !value.variables().iter().any(|v| v == flag) {
            self.bindings.insert(flag.to_string(), value.clone());
        }
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let bindings = self
            .bindings
            .iter()
            .filter(|(flag, pred)| other.bindings.get(*flag) == Some(*pred))
            .map(|(f, p)| (f.clone(), p.clone()))
            .collect();
        Self { bindings }
    }

    /// Aliases holding after `stmts` run from `self`
    pub fn after(&self, stmts: &[Stmt]) -> Self {
        let mut table = self.clone();
        for stmt in stmts {
            table = table.after_stmt(stmt);
        }
        table
    }

    fn after_stmt(mut self, stmt: &Stmt) -> Self {
        match stmt {
            Stmt::Local {
                name,
                init: Some(value),
                ..
            }
            | Stmt::Assign {
                target: name,
                value,
                ..
            } => {
                self.assign(name, value);
                self
            }
            Stmt::Local { name, init: None, .. } => {
                self.invalidate(name);
                self
            }
            Stmt::Expr { .. } | Stmt::Return { .. } => self,
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                let then_end = self.after(then_branch);
                let else_end = self.after(else_branch.as_deref().unwrap_or(&[]));
                then_end.intersect(&else_end)
            }
            Stmt::While { body, .. } => self.loop_header(body),
            Stmt::Block { stmts } => self.after(stmts),
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                let body_end = self.after(body);
                let handler_entry = self.intersect(&body_end);
                let mut joined = body_end;
                for CatchClause { param, body, .. } in handlers {
                    let mut entry = handler_entry.clone();
                    if let Some(p) = param {
                        entry.invalidate(p);
                    }
                    joined = joined.intersect(&entry.after(body));
                }
                match finally {
                    Some(stmts) => joined.after(stmts),
                    None => joined,
                }
            }
        }
    }

    /// Aliases holding at a loop header: those holding on entry and at the
    /// end of the body, as a shrinking fixed point
    pub fn loop_header(&self, body: &[Stmt]) -> Self {
        let mut header = self.clone();
        for _ in 0..=self.bindings.len() {
            let next = self.intersect(&header.after(body));
            if next == header {
                break;
            }
            header = next;
        }
        header
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Per-program-point state
#[derive(Debug, Clone)]
struct Env {
    defs: BTreeMap<String, NodeIndex>,
    aliases: AliasTable,
    reachable: bool,
}

impl Env {
    fn entry() -> Self {
        Self {
            defs: BTreeMap::new(),
            aliases: AliasTable::default(),
            reachable: true,
        }
    }
}

/// Builds flow graphs for the procedures of one compilation unit
pub struct FlowGraphBuilder<'a> {
    catalog: &'a SignatureCatalog,
    unit_constants: &'a BTreeMap<String, String>,
}

impl<'a> FlowGraphBuilder<'a> {
    pub fn new(catalog: &'a SignatureCatalog, unit_constants: &'a BTreeMap<String, String>) -> Self {
        Self {
            catalog,
            unit_constants,
        }
    }

    pub fn build(&self, procedure: &Procedure) -> BuildResult<FlowGraph> {
        let mut ctx = BuildContext {
            catalog: self.catalog,
            unit_constants: self.unit_constants,
            procedure,
            is_handler: self.catalog.is_request_handler(procedure),
            graph: DiGraph::new(),
            guards: Vec::new(),
            sources: Vec::new(),
            sinks: Vec::new(),
            declared_types: BTreeMap::new(),
            undefined: BTreeMap::new(),
            depth: 0,
        };

        let mut env = Env::entry();
        ctx.bind_params(&mut env)?;
        ctx.build_block(&procedure.body, &mut env)?;

        let graph = FlowGraph {
            procedure: procedure.name.clone(),
            graph: ctx.graph,
            guards: ctx.guards,
            sources: ctx.sources,
            sinks: ctx.sinks,
        };

        debug!(
            procedure = %graph.procedure,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            guards = graph.guards.len(),
            sources = graph.sources.len(),
            sinks = graph.sinks.len(),
            "built flow graph"
        );

        Ok(graph)
    }
}

struct BuildContext<'a> {
    catalog: &'a SignatureCatalog,
    unit_constants: &'a BTreeMap<String, String>,
    procedure: &'a Procedure,
    is_handler: bool,
    graph: DiGraph<FlowNode, FlowEdge>,
    guards: Vec<GuardCondition>,
    sources: Vec<NodeIndex>,
    sinks: Vec<NodeIndex>,
    /// Declared static types of parameters and locals
    declared_types: BTreeMap<String, String>,
    /// Shared node per variable read before any definition
    undefined: BTreeMap<String, NodeIndex>,
    depth: usize,
}

impl<'a> BuildContext<'a> {
    fn add_node(&mut self, node: FlowNode) -> BuildResult<NodeIndex> {
        if self.graph.node_count() >= MAX_NODES {
            return Err(BuildError::NodeLimit {
                procedure: self.procedure.name.clone(),
                limit: MAX_NODES,
            });
        }
        let is_source = node.is_source();
        let is_sink = node.is_sink();
        let idx = self.graph.add_node(node);
        if is_source {
            self.sources.push(idx);
        }
        if is_sink {
            self.sinks.push(idx);
        }
        Ok(idx)
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: FlowEdge) {
        self.graph.add_edge(from, to, edge);
    }

    fn enter(&mut self) -> BuildResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(BuildError::NestingLimit {
                procedure: self.procedure.name.clone(),
                limit: MAX_NESTING,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn constant(&self, name: &str) -> Option<&'a str> {
        self.procedure
            .constants
            .get(name)
            .or_else(|| self.unit_constants.get(name))
            .map(String::as_str)
    }

    fn bind_params(&mut self, env: &mut Env) -> BuildResult<()> {
        let procedure = self.procedure;
        for param in &procedure.params {
            if env.defs.contains_key(&param.name) {
                return Err(BuildError::DuplicateParameter {
                    procedure: procedure.name.clone(),
                    name: param.name.clone(),
                });
            }
            let kind = if self.catalog.is_handler_source(procedure, param) {
                NodeKind::SourceCall
            } else {
                NodeKind::VariableRef
            };
            let node = self.add_node(
                FlowNode::new(kind, format!("{} {}", param.ty, param.name), procedure.span)
                    .with_var(&param.name),
            )?;
            env.defs.insert(param.name.clone(), node);
            self.declared_types
                .insert(param.name.clone(), param.ty.clone());
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn build_block(&mut self, stmts: &[Stmt], env: &mut Env) -> BuildResult<()> {
        for stmt in stmts {
            self.build_stmt(stmt, env)?;
        }
        Ok(())
    }

    fn build_stmt(&mut self, stmt: &Stmt, env: &mut Env) -> BuildResult<()> {
        self.enter()?;
        let result = self.build_stmt_inner(stmt, env);
        self.leave();
        result
    }

    fn build_stmt_inner(&mut self, stmt: &Stmt, env: &mut Env) -> BuildResult<()> {
        match stmt {
            Stmt::Local { name, ty, init, span } => {
                if let Some(ty) = ty {
                    self.declared_types.insert(name.clone(), ty.clone());
                }
                match init {
                    Some(value) => self.define(name, value, *span, env)?,
                    None => {
                        env.defs.remove(name);
                        env.aliases.invalidate(name);
                    }
                }
            }
            Stmt::Assign {
                target,
                value,
                span,
            } => self.define(target, value, *span, env)?,
            Stmt::Expr { expr, .. } => {
                self.lower_expr(expr, env)?;
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
                span,
            } => {
                self.lower_expr(cond, env)?;
                let guard = self.decompose_guard(cond, *span, env);

                let mut then_env = env.clone();
                self.refine(&mut then_env, guard, true)?;
                self.build_block(then_branch, &mut then_env)?;

                let mut else_env = env.clone();
                self.refine(&mut else_env, guard, false)?;
                if let Some(stmts) = else_branch {
                    self.build_block(stmts, &mut else_env)?;
                }

                *env = self.join(vec![then_env, else_env], *span)?;
            }
            Stmt::While { cond, body, span } => self.build_loop(cond, body, *span, env)?,
            Stmt::Block { stmts } => self.build_block(stmts, env)?,
            Stmt::Try {
                body,
                handlers,
                finally,
            } => {
                let entry = env.clone();
                let mut body_env = env.clone();
                self.build_block(body, &mut body_env)?;

                // a handler may start from any point of the body
                let handler_entry = self.join(vec![entry, body_env.clone()], Span::zero())?;
                let mut ends = vec![body_env];
                for handler in handlers {
                    let mut h_env = handler_entry.clone();
                    if let Some(p) = &handler.param {
                        h_env.defs.remove(p);
                        h_env.aliases.invalidate(p);
                        if let Some(ty) = &handler.exception_type {
                            self.declared_types.insert(p.clone(), ty.clone());
                        }
                    }
                    self.build_block(&handler.body, &mut h_env)?;
                    ends.push(h_env);
                }
                *env = self.join(ends, Span::zero())?;

                if let Some(stmts) = finally {
                    self.build_block(stmts, env)?;
                }
            }
            Stmt::Return { value, span } => {
                if let Some(value) = value {
                    let node = self.lower_expr(value, env)?;
                    if self.is_handler && self.is_forward_return(value) {
                        let sink = self.add_node(FlowNode::new(
                            NodeKind::SinkCall { args: vec![0] },
                            format!("return {}", value),
                            *span,
                        ))?;
                        self.add_edge(node, sink, FlowEdge::new(EdgeKind::Argument { index: 0 }));
                    }
                }
                env.reachable = false;
            }
        }
        Ok(())
    }

    /// `name = value`
    fn define(&mut self, name: &str, value: &Expr, span: Span, env: &mut Env) -> BuildResult<()> {
        let rhs = self.lower_expr(value, env)?;
        let def = self.add_node(
            FlowNode::new(NodeKind::VariableRef, format!("{} = {}", name, value), span)
                .with_var(name),
        )?;
        self.add_edge(rhs, def, FlowEdge::new(EdgeKind::Assign));
        env.defs.insert(name.to_string(), def);
        env.aliases.assign(name, value);
        Ok(())
    }

    fn build_loop(&mut self, cond: &Expr, body: &[Stmt], span: Span, env: &mut Env) -> BuildResult<()> {
        let mut assigned = Vec::new();
        for stmt in body {
            stmt.collect_assigned(&mut assigned);
        }

        let mut header = env.clone();
        header.aliases = env.aliases.loop_header(body);

        let mut phis = Vec::new();
        for var in assigned {
            if let Some(&entry_def) = env.defs.get(&var) {
                let phi = self.add_node(
                    FlowNode::new(NodeKind::Phi, format!("loop {}", var), span).with_var(&var),
                )?;
                self.add_edge(entry_def, phi, FlowEdge::new(EdgeKind::Join));
                header.defs.insert(var.clone(), phi);
                phis.push((var, phi));
            }
        }

        self.lower_expr(cond, &header)?;
        let guard = self.decompose_guard(cond, span, &header);

        let mut body_env = header.clone();
        self.refine(&mut body_env, guard, true)?;
        self.build_block(body, &mut body_env)?;

        if body_env.reachable {
            for (var, phi) in &phis {
                if let Some(&end_def) = body_env.defs.get(var) {
                    if end_def != *phi {
                        self.add_edge(end_def, *phi, FlowEdge::new(EdgeKind::LoopBack));
                    }
                }
            }
        }

        let mut exit = header;
        self.refine(&mut exit, guard, false)?;
        *env = exit;
        Ok(())
    }

    /// Merge environments at a control-flow join
    fn join(&mut self, envs: Vec<Env>, span: Span) -> BuildResult<Env> {
        if !envs.iter().any(|e| e.reachable) {
            let mut dead = envs.into_iter().next().unwrap_or_else(Env::entry);
            dead.reachable = false;
            return Ok(dead);
        }
        let live: Vec<&Env> = envs.iter().filter(|e| e.reachable).collect();
        if live.len() == 1 {
            return Ok(live[0].clone());
        }

        let mut names: Vec<&String> = live.iter().flat_map(|e| e.defs.keys()).collect();
        names.sort();
        names.dedup();

        let mut defs = BTreeMap::new();
        for name in names {
            let mut incoming: Vec<NodeIndex> =
                live.iter().filter_map(|e| e.defs.get(name).copied()).collect();
            incoming.sort();
            incoming.dedup();
            let def = if incoming.len() == 1 {
                incoming[0]
            } else {
                let phi = self.add_node(
                    FlowNode::new(NodeKind::Phi, format!("join {}", name), span).with_var(name),
                )?;
                for pred in incoming {
                    self.add_edge(pred, phi, FlowEdge::new(EdgeKind::Join));
                }
                phi
            };
            defs.insert(name.clone(), def);
        }

        let mut aliases = live[0].aliases.clone();
        for e in &live[1..] {
            aliases = aliases.intersect(&e.aliases);
        }

        Ok(Env {
            defs,
            aliases,
            reachable: true,
        })
    }

    fn is_forward_return(&self, value: &Expr) -> bool {
        let leading = match value {
            Expr::Concat { operands, .. } => operands.first(),
            other => Some(other),
        };
        leading
            .and_then(|e| self.known_string(e))
            .is_some_and(|s| self.catalog.is_forward_prefix(s))
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    fn decompose_guard(&mut self, cond: &Expr, span: Span, env: &Env) -> GuardId {
        let id = GuardId(self.guards.len());
        let span = if span.is_zero() { cond.span() } else { span };
        let mut guard = GuardCondition::new(id, cond.to_string(), span);

        let mut alias = None;
        guard.on_true = self.definite_atoms(cond, true, env, &mut alias, 0);
        guard.on_false = self.definite_atoms(cond, false, env, &mut alias, 0);
        guard.alias = alias;

        let mut opaque = Vec::new();
        self.collect_opaque(cond, env, &mut opaque, 0);
        guard.opaque_subjects = opaque;

        self.guards.push(guard);
        id
    }

    /// Atoms that hold whenever `expr` evaluates to `branch`
    fn definite_atoms(
        &self,
        expr: &Expr,
        branch: bool,
        env: &Env,
        alias: &mut Option<String>,
        depth: usize,
    ) -> Vec<GuardAtom> {
        if depth > MAX_NESTING {
            return Vec::new();
        }
        match expr {
            Expr::Not { operand } => self.definite_atoms(operand, !branch, env, alias, depth + 1),
            Expr::And { lhs, rhs } if branch => {
                let mut atoms = self.definite_atoms(lhs, true, env, alias, depth + 1);
                atoms.extend(self.definite_atoms(rhs, true, env, alias, depth + 1));
                atoms
            }
            Expr::Or { lhs, rhs } if !branch => {
                let mut atoms = self.definite_atoms(lhs, false, env, alias, depth + 1);
                atoms.extend(self.definite_atoms(rhs, false, env, alias, depth + 1));
                atoms
            }
            Expr::Compare { op, lhs, rhs } => {
                let subject = match (&**lhs, &**rhs) {
                    (Expr::Null, other) | (other, Expr::Null) => other.as_var(),
                    _ => None,
                };
                match subject {
                    Some(v) => {
                        let holds_null = match op {
                            CompareOp::Eq => branch,
                            CompareOp::Ne => !branch,
                        };
                        vec![GuardAtom::new(v, GuardOperator::IsNull, GuardOperand::None)
                            .negated(!holds_null)]
                    }
                    None => Vec::new(),
                }
            }
            Expr::Call { .. } => self
                .check_atom(expr, env)
                .map(|atom| vec![atom.negated(!branch)])
                .unwrap_or_default(),
            Expr::Var { name } => match env.aliases.get(name) {
                Some(pred) => {
                    *alias = Some(name.clone());
                    self.definite_atoms(pred, branch, env, alias, depth + 1)
                }
                None => Vec::new(),
            },
            Expr::Cast { operand, .. } => self.definite_atoms(operand, branch, env, alias, depth + 1),
            _ => Vec::new(),
        }
    }

    /// `v.op(operand)` (or `CONST.equals(v)`) as a positive atom
    fn check_atom(&self, expr: &Expr, env: &Env) -> Option<GuardAtom> {
        let Expr::Call {
            receiver: Some(receiver),
            method,
            args,
            ..
        } = expr
        else {
            return None;
        };
        let operator = GuardOperator::from_method(method)?;
        let [arg] = args.as_slice() else {
            return None;
        };

        if let Some(subject) = receiver.as_var().filter(|v| self.is_variable(v, env)) {
            return Some(GuardAtom::new(subject, operator, self.operand(arg, env)));
        }

        // "/comaction".equals(path)
        let symmetric = matches!(operator, GuardOperator::Equals | GuardOperator::EqualsIgnoreCase);
        if symmetric && self.known_string(receiver).is_some() {
            if let Some(subject) = arg.as_var().filter(|v| self.is_variable(v, env)) {
                return Some(GuardAtom::new(subject, operator, self.operand(receiver, env)));
            }
        }
        None
    }

    /// Locals and parameters (not constants)
    fn is_variable(&self, name: &str, env: &Env) -> bool {
        env.defs.contains_key(name) || self.constant(name).is_none()
    }

    fn operand(&self, expr: &Expr, env: &Env) -> GuardOperand {
        match expr {
            Expr::Literal { value } => GuardOperand::Literal {
                value: value.clone(),
            },
            Expr::Var { name } if !env.defs.contains_key(name) => match self.constant(name) {
                Some(value) => GuardOperand::Constant {
                    name: name.clone(),
                    value: value.to_string(),
                },
                None => GuardOperand::Variable { name: name.clone() },
            },
            Expr::Var { name } => GuardOperand::Variable { name: name.clone() },
            Expr::Cast { operand, .. } => self.operand(operand, env),
            other => GuardOperand::Other {
                text: other.to_string(),
            },
        }
    }

    /// Variables read by test leaves that do not decompose into atoms
    fn collect_opaque(&self, expr: &Expr, env: &Env, out: &mut Vec<String>, depth: usize) {
        if depth > MAX_NESTING {
            return;
        }
        let push_vars = |e: &Expr, out: &mut Vec<String>| {
            for v in e.variables() {
                if env.defs.contains_key(&v) && !out.contains(&v) {
                    out.push(v);
                }
            }
        };
        match expr {
            Expr::Not { operand } | Expr::Cast { operand, .. } => {
                self.collect_opaque(operand, env, out, depth + 1)
            }
            Expr::And { lhs, rhs } | Expr::Or { lhs, rhs } => {
                self.collect_opaque(lhs, env, out, depth + 1);
                self.collect_opaque(rhs, env, out, depth + 1);
            }
            Expr::Compare { lhs, rhs, .. } => {
                let null_check = matches!((&**lhs, &**rhs), (Expr::Null, e) | (e, Expr::Null) if e.as_var().is_some());
                if !null_check {
                    push_vars(expr, out);
                }
            }
            Expr::Call { .. } => {
                if self.check_atom(expr, env).is_none() {
                    push_vars(expr, out);
                }
            }
            Expr::Var { name } => match env.aliases.get(name) {
                Some(pred) => self.collect_opaque(pred, env, out, depth + 1),
                None => push_vars(expr, out),
            },
            Expr::Literal { .. } | Expr::Null => {}
            Expr::New { .. } | Expr::Concat { .. } => push_vars(expr, out),
        }
    }

    /// Add GUARD nodes for every variable refined on `branch`
    fn refine(&mut self, env: &mut Env, id: GuardId, branch: bool) -> BuildResult<()> {
        let (subjects, text, span) = match self.guards.get(id.0) {
            Some(g) => (g.subjects(branch), g.text.clone(), g.span),
            None => return Ok(()),
        };
        for subject in subjects {
            let Some(&def) = env.defs.get(&subject) else {
                continue;
            };
            let label = if branch { "true" } else { "false" };
            let node = self.add_node(
                FlowNode::new(
                    NodeKind::Guard { guard: id, branch },
                    format!("{} [{}]", text, label),
                    span,
                )
                .with_var(&subject),
            )?;
            self.add_edge(def, node, FlowEdge::refine(id, branch));
            env.defs.insert(subject, node);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Literal or constant string value
    fn known_string<'e>(&self, expr: &'e Expr) -> Option<&'e str>
    where
        'a: 'e,
    {
        match expr {
            Expr::Literal { value } => Some(value),
            Expr::Var { name } => self.constant(name),
            _ => None,
        }
    }

    fn lower_expr(&mut self, expr: &Expr, env: &Env) -> BuildResult<NodeIndex> {
        self.enter()?;
        let result = self.lower_expr_inner(expr, env);
        self.leave();
        result
    }

    fn lower_expr_inner(&mut self, expr: &Expr, env: &Env) -> BuildResult<NodeIndex> {
        match expr {
            Expr::Literal { value } => {
                self.add_node(FlowNode::new(NodeKind::Literal, value.clone(), Span::zero()))
            }
            Expr::Null => self.add_node(FlowNode::new(NodeKind::Literal, "null", Span::zero())),
            Expr::Var { name } => {
                if let Some(&def) = env.defs.get(name) {
                    return Ok(def);
                }
                if let Some(value) = self.constant(name) {
                    return self.add_node(
                        FlowNode::new(NodeKind::Literal, value, Span::zero()).with_var(name),
                    );
                }
                if let Some(&node) = self.undefined.get(name) {
                    return Ok(node);
                }
                let node = self.add_node(
                    FlowNode::new(NodeKind::VariableRef, name.clone(), Span::zero()).with_var(name),
                )?;
                self.undefined.insert(name.clone(), node);
                Ok(node)
            }
            Expr::Call {
                receiver,
                receiver_type,
                method,
                args,
                span,
            } => {
                let receiver_node = match receiver {
                    Some(r) => Some(self.lower_expr(r, env)?),
                    None => None,
                };
                let arg_nodes = self.lower_args(args, env)?;

                let inferred = receiver
                    .as_deref()
                    .and_then(Expr::as_var)
                    .and_then(|v| self.declared_types.get(v))
                    .cloned();
                let receiver_type = receiver_type.clone().or(inferred);
                let sig = CallSignature::method(receiver_type.as_deref(), method, args.len());
                let role = self.catalog.classify(&sig);

                let node = self.add_node(FlowNode::new(role_kind(role), expr.to_string(), *span))?;
                if let Some(r) = receiver_node {
                    self.add_edge(r, node, FlowEdge::new(EdgeKind::Receiver));
                }
                for (index, a) in arg_nodes.into_iter().enumerate() {
                    self.add_edge(a, node, FlowEdge::new(EdgeKind::Argument { index }));
                }
                Ok(node)
            }
            Expr::New { class, args, span } => {
                let arg_nodes = self.lower_args(args, env)?;
                let role = self
                    .catalog
                    .classify(&CallSignature::constructor(class, args.len()));
                let node = self.add_node(FlowNode::new(role_kind(role), expr.to_string(), *span))?;
                for (index, a) in arg_nodes.into_iter().enumerate() {
                    self.add_edge(a, node, FlowEdge::new(EdgeKind::Argument { index }));
                }
                Ok(node)
            }
            Expr::Concat { operands, span } => {
                let mut operand_nodes = Vec::with_capacity(operands.len());
                let mut after_query = false;
                for operand in operands {
                    let kind = if after_query {
                        EdgeKind::QueryString
                    } else {
                        EdgeKind::ConcatOperand {
                            index: operand_nodes.len(),
                        }
                    };
                    operand_nodes.push((self.lower_expr(operand, env)?, kind));
                    if self.known_string(operand).is_some_and(|s| s.contains('?')) {
                        after_query = true;
                    }
                }
                let node = self.add_node(FlowNode::new(NodeKind::Concat, expr.to_string(), *span))?;
                for (operand, kind) in operand_nodes {
                    self.add_edge(operand, node, FlowEdge::new(kind));
                }
                Ok(node)
            }
            Expr::Not { operand } => self.lower_boolean(expr, &[&**operand], env),
            Expr::And { lhs, rhs } | Expr::Or { lhs, rhs } | Expr::Compare { lhs, rhs, .. } => {
                self.lower_boolean(expr, &[&**lhs, &**rhs], env)
            }
            Expr::Cast { operand, .. } => self.lower_expr(operand, env),
        }
    }

    fn lower_args(&mut self, args: &[Expr], env: &Env) -> BuildResult<Vec<NodeIndex>> {
        args.iter().map(|a| self.lower_expr(a, env)).collect()
    }

    fn lower_boolean(&mut self, expr: &Expr, children: &[&Expr], env: &Env) -> BuildResult<NodeIndex> {
        let mut child_nodes = Vec::with_capacity(children.len());
        for child in children {
            child_nodes.push(self.lower_expr(child, env)?);
        }
        let node = self.add_node(FlowNode::new(NodeKind::Call, expr.to_string(), expr.span()))?;
        for (index, c) in child_nodes.into_iter().enumerate() {
            self.add_edge(c, node, FlowEdge::new(EdgeKind::Argument { index }));
        }
        Ok(node)
    }
}

fn role_kind(role: CallRole) -> NodeKind {
    match role {
        CallRole::Source => NodeKind::SourceCall,
        CallRole::Sink { args } => NodeKind::SinkCall { args },
        CallRole::Sanitizer { kind } => NodeKind::SanitizerCall { sanitizer: kind },
        CallRole::Neutral => NodeKind::Call,
    }
}
