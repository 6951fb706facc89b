//! Test data builders
//!
//! Shorthands for the servlet-shaped procedure IR the front end emits.

use forwardscan_ir::features::procedure_ir::CatchClause;
use forwardscan_ir::{CompilationUnit, Expr, Procedure, Stmt};

pub const REQUEST: &str = "HttpServletRequest";
pub const RESPONSE: &str = "HttpServletResponse";

/// `protected void name(HttpServletRequest request, HttpServletResponse response)`
pub fn servlet(name: &str, body: Vec<Stmt>) -> Procedure {
    Procedure::new(name)
        .param("request", REQUEST)
        .param("response", RESPONSE)
        .with_body(body)
}

/// `public void name(ServletRequest request, ServletResponse response, FilterChain chain)`
pub fn filter(name: &str, body: Vec<Stmt>) -> Procedure {
    Procedure::new(name)
        .annotated("Override")
        .param("request", "ServletRequest")
        .param("response", "ServletResponse")
        .param("chain", "FilterChain")
        .with_body(body)
}

/// `@GetMapping public <returns> name(String url, ...)`
pub fn handler(name: &str, returns: &str) -> HandlerBuilder {
    HandlerBuilder {
        procedure: Procedure::new(name)
            .annotated("GetMapping")
            .param("url", "String")
            .returns(returns),
    }
}

/// Builder for Spring request handlers
#[derive(Debug)]
pub struct HandlerBuilder {
    procedure: Procedure,
}

impl HandlerBuilder {
    /// Add the servlet request/response parameters
    pub fn with_servlet_params(mut self) -> Self {
        self.procedure = self
            .procedure
            .param("request", REQUEST)
            .param("response", RESPONSE);
        self
    }

    pub fn body(self, body: Vec<Stmt>) -> Procedure {
        self.procedure.with_body(body)
    }
}

/// `request.getParameter(name)`
pub fn get_parameter(name: &str) -> Expr {
    Expr::typed_call(Expr::var("request"), REQUEST, "getParameter", vec![Expr::lit(name)])
}

/// `String var = request.getParameter(name);`
pub fn read_parameter(var: &str, name: &str) -> Stmt {
    Stmt::local(var, get_parameter(name))
}

/// `String path = ((HttpServletRequest) request).getServletPath();`
pub fn read_servlet_path() -> Stmt {
    Stmt::local(
        "path",
        Expr::call(
            Expr::cast(REQUEST, Expr::var("request")),
            "getServletPath",
            vec![],
        ),
    )
}

/// `receiver.getRequestDispatcher(arg).<action>(request, response)`
pub fn dispatch_on(receiver: Expr, arg: Expr, action: &str) -> Stmt {
    Stmt::expr(Expr::call(
        Expr::call(receiver, "getRequestDispatcher", vec![arg]),
        action,
        vec![Expr::var("request"), Expr::var("response")],
    ))
}

/// `request.getRequestDispatcher(arg).forward(request, response)`
pub fn forward(arg: Expr) -> Stmt {
    dispatch_on(Expr::var("request"), arg, "forward")
}

/// `request.getServletContext().getRequestDispatcher(arg).include(request, response)`
pub fn context_include(arg: Expr) -> Stmt {
    dispatch_on(
        Expr::call(Expr::var("request"), "getServletContext", vec![]),
        arg,
        "include",
    )
}

/// `request.getServletContext().getRequestDispatcher(arg).forward(request, response)`
pub fn context_forward(arg: Expr) -> Stmt {
    dispatch_on(
        Expr::call(Expr::var("request"), "getServletContext", vec![]),
        arg,
        "forward",
    )
}

/// `chain.doFilter(request, response)`
pub fn continue_chain() -> Stmt {
    Stmt::expr(Expr::call(
        Expr::var("chain"),
        "doFilter",
        vec![Expr::var("request"), Expr::var("response")],
    ))
}

/// `URLDecoder.decode(arg, "UTF-8")`
pub fn url_decode(arg: Expr) -> Expr {
    Expr::static_call("URLDecoder", "decode", vec![arg, Expr::lit("UTF-8")])
}

pub fn starts_with(var: &str, prefix: Expr) -> Expr {
    Expr::call(Expr::var(var), "startsWith", vec![prefix])
}

pub fn contains(var: &str, needle: &str) -> Expr {
    Expr::call(Expr::var(var), "contains", vec![Expr::lit(needle)])
}

pub fn equals(var: &str, literal: &str) -> Expr {
    Expr::call(Expr::var(var), "equals", vec![Expr::lit(literal)])
}

/// `!v.startsWith("/WEB-INF/") && !v.contains("..")`
pub fn web_inf_deny_no_traversal(var: &str) -> Expr {
    Expr::and(
        Expr::not(starts_with(var, Expr::lit("/WEB-INF/"))),
        Expr::not(contains(var, "..")),
    )
}

/// `while (v.contains("%")) { v = URLDecoder.decode(v, "UTF-8"); }`
pub fn decode_until_clean(var: &str) -> Stmt {
    Stmt::while_loop(
        contains(var, "%"),
        vec![Stmt::assign(var, url_decode(Expr::var(var)))],
    )
}

/// `try { body } catch (ServletException e) {..} catch (IOException e) {..}`
pub fn try_servlet(body: Vec<Stmt>) -> Stmt {
    let print = || {
        vec![Stmt::expr(Expr::call(
            Expr::var("e"),
            "printStackTrace",
            vec![],
        ))]
    };
    Stmt::try_catch(
        body,
        vec![
            CatchClause::new("e", "ServletException", print()),
            CatchClause::new("e", "IOException", print()),
        ],
    )
}

/// Unit holding a single procedure
pub fn unit_of(procedure: Procedure) -> CompilationUnit {
    CompilationUnit::new("Test").with_procedure(procedure)
}
