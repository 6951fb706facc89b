//! Test fixture generators
//!
//! `url_forward_test_unit()` mirrors the CWE-552 servlet test class: Spring
//! handlers, servlet filters, dispatcher calls and every barrier shape the
//! engine must tell apart.

use forwardscan_ir::{CompilationUnit, Expr, Procedure, Stmt};

use super::builders::*;

pub const BASE_PATH: &str = "/pages";
pub const VALID_FORWARD: &str = "https://cwe.mitre.org/data/definitions/552.html";

/// Procedures with exactly one FLAGGED finding
pub const EXPECTED_FLAGGED: &[&str] = &[
    "bad1",
    "bad2",
    "bad3",
    "bad4",
    "bad5",
    "bad6",
    "bad7",
    "doFilter",
    "doFilter2",
    "doGet",
    "doPost",
    "doHead2",
    "doHead3",
    "doHead4",
    "doHead5",
    "doHead7",
    "doHead10",
    "generateResponse",
    "doGet2",
];

/// Procedures without FLAGGED findings
pub const EXPECTED_SAFE: &[&str] = &[
    "good1",
    "doFilter3",
    "doPut",
    "doHead6",
    "doHead8",
    "doHead9",
    "doHead11",
    "doHead16",
];

// ============================================================================
// Spring handlers
// ============================================================================

/// `return new ModelAndView(url);`
pub fn bad1() -> Procedure {
    handler("bad1", "ModelAndView").body(vec![Stmt::ret(Some(Expr::new_object(
        "ModelAndView",
        vec![Expr::var("url")],
    )))])
}

/// `modelAndView.setViewName(url);`
pub fn bad2() -> Procedure {
    handler("bad2", "ModelAndView").body(vec![
        Stmt::local("modelAndView", Expr::new_object("ModelAndView", vec![])),
        Stmt::expr(Expr::call(
            Expr::var("modelAndView"),
            "setViewName",
            vec![Expr::var("url")],
        )),
        Stmt::ret(Some(Expr::var("modelAndView"))),
    ])
}

/// `return "forward:" + url + "/swagger-ui/index.html";`
pub fn bad3() -> Procedure {
    handler("bad3", "String").body(vec![Stmt::ret(Some(Expr::concat(vec![
        Expr::lit("forward:"),
        Expr::var("url"),
        Expr::lit("/swagger-ui/index.html"),
    ])))])
}

/// `new ModelAndView("forward:" + url)`
pub fn bad4() -> Procedure {
    handler("bad4", "ModelAndView").body(vec![
        Stmt::local(
            "modelAndView",
            Expr::new_object(
                "ModelAndView",
                vec![Expr::concat(vec![Expr::lit("forward:"), Expr::var("url")])],
            ),
        ),
        Stmt::ret(Some(Expr::var("modelAndView"))),
    ])
}

pub fn bad5() -> Procedure {
    handler("bad5", "void").with_servlet_params().body(vec![try_servlet(vec![
        dispatch_on(Expr::var("request"), Expr::var("url"), "include"),
    ])])
}

fn jsp_path() -> Expr {
    Expr::concat(vec![
        Expr::lit("/WEB-INF/jsp/"),
        Expr::var("url"),
        Expr::lit(".jsp"),
    ])
}

pub fn bad6() -> Procedure {
    handler("bad6", "void")
        .with_servlet_params()
        .body(vec![try_servlet(vec![dispatch_on(
            Expr::var("request"),
            jsp_path(),
            "include",
        )])])
}

pub fn bad7() -> Procedure {
    handler("bad7", "void")
        .with_servlet_params()
        .body(vec![try_servlet(vec![forward(jsp_path())])])
}

/// Tainted input only after `?`: query string, not path
pub fn good1() -> Procedure {
    handler("good1", "void")
        .with_servlet_params()
        .body(vec![try_servlet(vec![forward(Expr::concat(vec![
            Expr::lit("/index.jsp?token="),
            Expr::var("url"),
        ]))])])
}

// ============================================================================
// Filters (servlet path)
// ============================================================================

/// `path != null && !path.startsWith("/WEB-INF")` without decoding
pub fn do_filter() -> Procedure {
    filter(
        "doFilter",
        vec![
            read_servlet_path(),
            Stmt::if_else(
                Expr::and(
                    Expr::ne(Expr::var("path"), Expr::Null),
                    Expr::not(starts_with("path", Expr::lit("/WEB-INF"))),
                ),
                vec![forward(Expr::var("path"))],
                vec![continue_chain()],
            ),
        ],
    )
}

/// `path.startsWith(BASE_PATH) && !path.contains("..")` without decoding
pub fn do_filter2() -> Procedure {
    filter(
        "doFilter2",
        vec![
            read_servlet_path(),
            Stmt::if_else(
                Expr::and(
                    starts_with("path", Expr::var("BASE_PATH")),
                    Expr::not(contains("path", "..")),
                ),
                vec![forward(Expr::var("path"))],
                vec![continue_chain()],
            ),
        ],
    )
}

/// `path.equals("/comaction")`
pub fn do_filter3() -> Procedure {
    filter(
        "doFilter3",
        vec![
            read_servlet_path(),
            Stmt::if_else(
                equals("path", "/comaction"),
                vec![forward(Expr::var("path"))],
                vec![continue_chain()],
            ),
        ],
    )
}

// ============================================================================
// Servlet dispatch
// ============================================================================

fn read_action_and_return_url() -> Vec<Stmt> {
    vec![
        read_parameter("action", "action"),
        read_parameter("returnURL", "returnURL"),
    ]
}

fn servlet_context() -> Stmt {
    Stmt::local(
        "sc",
        Expr::call(Expr::var("cfg"), "getServletContext", vec![]),
    )
}

fn rd_forward() -> Stmt {
    Stmt::expr(Expr::call(
        Expr::var("rd"),
        "forward",
        vec![Expr::var("request"), Expr::var("response")],
    ))
}

/// `sc.getRequestDispatcher(returnURL)` on the non-login branch
pub fn do_get() -> Procedure {
    let mut body = read_action_and_return_url();
    body.push(Stmt::local("cfg", Expr::local_call("getServletConfig", vec![])));
    body.push(Stmt::if_else(
        equals("action", "Login"),
        vec![
            servlet_context(),
            Stmt::local(
                "rd",
                Expr::call(Expr::var("sc"), "getRequestDispatcher", vec![Expr::lit("/Login.jsp")]),
            ),
            rd_forward(),
        ],
        vec![
            servlet_context(),
            Stmt::local(
                "rd",
                Expr::call(Expr::var("sc"), "getRequestDispatcher", vec![Expr::var("returnURL")]),
            ),
            rd_forward(),
        ],
    ));
    servlet("doGet", body).annotated("Override")
}

/// `request.getRequestDispatcher(returnURL)` on the non-login branch
pub fn do_post() -> Procedure {
    let mut body = read_action_and_return_url();
    body.push(Stmt::if_else(
        equals("action", "Login"),
        vec![
            Stmt::local(
                "rd",
                Expr::call(Expr::var("request"), "getRequestDispatcher", vec![Expr::lit("/Login.jsp")]),
            ),
            rd_forward(),
        ],
        vec![
            Stmt::local(
                "rd",
                Expr::call(Expr::var("request"), "getRequestDispatcher", vec![Expr::var("returnURL")]),
            ),
            rd_forward(),
        ],
    ));
    servlet("doPost", body).annotated("Override")
}

/// Only fixed JSP targets
pub fn do_put() -> Procedure {
    let fixed = |jsp: &str| {
        vec![
            Stmt::local(
                "rd",
                Expr::call(Expr::var("request"), "getRequestDispatcher", vec![Expr::lit(jsp)]),
            ),
            rd_forward(),
        ]
    };
    servlet(
        "doPut",
        vec![
            read_parameter("action", "action"),
            Stmt::if_else(
                equals("action", "Login"),
                fixed("/Login.jsp"),
                vec![Stmt::if_then(equals("action", "Register"), fixed("/Register.jsp"))],
            ),
        ],
    )
    .annotated("Override")
}

// ============================================================================
// Path checks (doHead*)
// ============================================================================

/// Allow-list prefix without traversal check
pub fn do_head2() -> Procedure {
    servlet(
        "doHead2",
        vec![
            read_parameter("path", "path"),
            Stmt::if_then(
                starts_with("path", Expr::var("BASE_PATH")),
                vec![context_include(Expr::var("path"))],
            ),
        ],
    )
}

/// Allow-list and traversal check on the undecoded value
pub fn do_head3() -> Procedure {
    servlet(
        "doHead3",
        vec![
            read_parameter("path", "path"),
            Stmt::if_then(
                Expr::and(
                    starts_with("path", Expr::var("BASE_PATH")),
                    Expr::not(contains("path", "..")),
                ),
                vec![context_include(Expr::var("path"))],
            ),
        ],
    )
}

/// `Paths.get(BASE_PATH).resolve(path).normalize()`
fn normalized_request_path() -> Stmt {
    Stmt::local(
        "requestedPath",
        Expr::call(
            Expr::call(
                Expr::static_call("Paths", "get", vec![Expr::var("BASE_PATH")]),
                "resolve",
                vec![Expr::var("path")],
            ),
            "normalize",
            vec![],
        ),
    )
}

fn requested_path_string() -> Expr {
    Expr::call(Expr::var("requestedPath"), "toString", vec![])
}

/// Normalized before decoding, then allow-listed
pub fn do_head4() -> Procedure {
    servlet(
        "doHead4",
        vec![
            read_parameter("path", "path"),
            normalized_request_path(),
            Stmt::if_then(
                starts_with("requestedPath", Expr::var("BASE_PATH")),
                vec![context_forward(requested_path_string())],
            ),
        ],
    )
}

/// Normalized before decoding, then deny-listed
pub fn do_head5() -> Procedure {
    servlet(
        "doHead5",
        vec![
            read_parameter("path", "path"),
            normalized_request_path(),
            Stmt::if_then(
                Expr::and(
                    Expr::not(starts_with("requestedPath", Expr::lit("/WEB-INF"))),
                    Expr::not(starts_with("requestedPath", Expr::lit("/META-INF"))),
                ),
                vec![context_forward(requested_path_string())],
            ),
        ],
    )
}

/// Encoding test wrapped around the decode loop
pub fn do_head6() -> Procedure {
    servlet(
        "doHead6",
        vec![
            read_parameter("path", "path"),
            Stmt::if_then(contains("path", "%"), vec![decode_until_clean("path")]),
            Stmt::if_then(
                web_inf_deny_no_traversal("path"),
                vec![context_include(Expr::var("path"))],
            ),
        ],
    )
}

/// Single decode, then deny list and traversal check
pub fn do_head7() -> Procedure {
    servlet(
        "doHead7",
        vec![
            read_parameter("path", "path"),
            Stmt::assign("path", url_decode(Expr::var("path"))),
            Stmt::if_then(
                web_inf_deny_no_traversal("path"),
                vec![context_include(Expr::var("path"))],
            ),
        ],
    )
}

/// Decode loop, then deny list and traversal check
pub fn do_head8() -> Procedure {
    servlet(
        "doHead8",
        vec![
            read_parameter("path", "path"),
            decode_until_clean("path"),
            Stmt::if_then(
                web_inf_deny_no_traversal("path"),
                vec![context_include(Expr::var("path"))],
            ),
        ],
    )
}

/// Decode loop driven by a hoisted `hasEncoding` flag
pub fn do_head9() -> Procedure {
    servlet(
        "doHead9",
        vec![
            read_parameter("path", "path"),
            Stmt::local("hasEncoding", contains("path", "%")),
            Stmt::while_loop(
                Expr::var("hasEncoding"),
                vec![
                    Stmt::assign("path", url_decode(Expr::var("path"))),
                    Stmt::assign("hasEncoding", contains("path", "%")),
                ],
            ),
            Stmt::if_then(
                web_inf_deny_no_traversal("path"),
                vec![context_include(Expr::var("path"))],
            ),
        ],
    )
}

/// Checks run only when the value still contains '%'
pub fn do_head10() -> Procedure {
    servlet(
        "doHead10",
        vec![
            read_parameter("path", "path"),
            Stmt::if_then(
                contains("path", "%"),
                vec![Stmt::if_then(
                    web_inf_deny_no_traversal("path"),
                    vec![context_include(Expr::var("path"))],
                )],
            ),
        ],
    )
}

/// Deny list first, then the no-encoding test
pub fn do_head11() -> Procedure {
    servlet(
        "doHead11",
        vec![
            read_parameter("path", "path"),
            Stmt::if_then(
                web_inf_deny_no_traversal("path"),
                vec![Stmt::if_then(
                    Expr::not(contains("path", "%")),
                    vec![context_include(Expr::var("path"))],
                )],
            ),
        ],
    )
}

/// No-encoding test first, then the deny list
pub fn do_head16() -> Procedure {
    servlet(
        "doHead16",
        vec![
            read_parameter("path", "path"),
            Stmt::if_then(
                Expr::not(contains("path", "%")),
                vec![Stmt::if_then(
                    web_inf_deny_no_traversal("path"),
                    vec![context_include(Expr::var("path"))],
                )],
            ),
        ],
    )
}

// ============================================================================
// Stapler / QHelp
// ============================================================================

/// `rsp.forward(obj, url, req)` without checks
pub fn generate_response() -> Procedure {
    Procedure::new("generateResponse")
        .param("req", "org.kohsuke.stapler.StaplerRequest")
        .param("rsp", "org.kohsuke.stapler.StaplerResponse")
        .param("obj", "Object")
        .with_body(vec![
            Stmt::local(
                "url",
                Expr::call(Expr::var("req"), "getParameter", vec![Expr::lit("target")]),
            ),
            Stmt::expr(Expr::call(
                Expr::var("rsp"),
                "forward",
                vec![Expr::var("obj"), Expr::var("url"), Expr::var("req")],
            )),
        ])
}

/// One raw forward and one guarded by `VALID_FORWARD.equals(..)`
pub fn do_get2() -> Procedure {
    let sc_forward = |arg: Expr| {
        Stmt::expr(Expr::call(
            Expr::call(Expr::var("sc"), "getRequestDispatcher", vec![arg]),
            "forward",
            vec![Expr::var("request"), Expr::var("response")],
        ))
    };
    servlet(
        "doGet2",
        vec![
            Stmt::local("cfg", Expr::local_call("getServletConfig", vec![])),
            servlet_context(),
            sc_forward(get_parameter("target")),
            Stmt::if_then(
                Expr::call(
                    Expr::var("VALID_FORWARD"),
                    "equals",
                    vec![get_parameter("target")],
                ),
                vec![sc_forward(Expr::var("VALID_FORWARD"))],
            ),
        ],
    )
}

/// The whole servlet test class as one compilation unit
pub fn url_forward_test_unit() -> CompilationUnit {
    [
        bad1(),
        bad2(),
        bad3(),
        bad4(),
        bad5(),
        bad6(),
        bad7(),
        good1(),
        do_filter(),
        do_filter2(),
        do_filter3(),
        do_get(),
        do_post(),
        do_put(),
        do_head2(),
        do_head3(),
        do_head4(),
        do_head5(),
        do_head7(),
        do_head6(),
        do_head16(),
        do_head10(),
        do_head11(),
        do_head8(),
        do_head9(),
        generate_response(),
        do_get2(),
    ]
    .into_iter()
    .fold(
        CompilationUnit::new("UrlForwardTest")
            .with_constant("BASE_PATH", BASE_PATH)
            .with_constant("VALID_FORWARD", VALID_FORWARD),
        CompilationUnit::with_procedure,
    )
}
