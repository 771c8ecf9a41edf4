//! Per-component glue script.
//!
//! The runtime classes ship once per page (see [`crate::STRATA_RUNTIME_JS`]).
//! For each component this module emits an IIFE that subclasses
//! `Strata.Controller`, wires the managers its pattern needs inside
//! `setup()` and starts it once the document is parsed. The runtime
//! publishes the instance under `Strata.instances` and its `window` global
//! only after `init()` reaches `ready`.

use crate::js::{BinOp, Class, Expr, Ident, InvalidIdent, JsWriter, Method, Stmt};
use crate::jsminify::minify_js;
use strata_core::runtime::NO_RESULTS_STATE;
use strata_core::{Component, Optimization, Pattern};

/// Global namespace the runtime attaches to.
pub const NAMESPACE: &str = "Strata";

fn name(s: &str) -> Result<Ident, InvalidIdent> {
    Ident::new(s)
}

/// Class name of the generated controller subclass.
pub fn class_name(component_id: &str) -> Result<Ident, InvalidIdent> {
    Ident::sanitized("Strata_", component_id)
}

/// `window` property the runtime publishes the instance under once ready.
/// Mirrors `Strata.globalName`: one underscore per non-identifier code point.
pub fn global_name(component_id: &str) -> Result<Ident, InvalidIdent> {
    Ident::sanitized("strata_", component_id)
}

fn this_member(field: &str) -> Result<Expr, InvalidIdent> {
    Ok(Expr::This.member(&name(field)?))
}

/// Body of the generated `setup()` method.
fn setup_body(component: &Component) -> Result<Vec<Stmt>, InvalidIdent> {
    let detected = component.detected();
    let pattern = detected.primary_pattern;
    let strata = Expr::ident(&name(NAMESPACE)?);
    let mut body = Vec::new();

    let states = pattern.uses_states();
    let data = pattern.uses_data();
    let rules = pattern.uses_rules();

    if states {
        let lazy = pattern == Pattern::DynamicStates || detected.has(Optimization::LazyStateLoading);
        let manager = strata.clone().member(&name("StatesManager")?).new_with(vec![
            Expr::This,
            Expr::Object(vec![("lazy".into(), Expr::Bool(lazy))]),
        ]);
        body.push(Stmt::Expr(this_member("states")?.assign(manager)));
    }
    if data {
        let manager = strata
            .clone()
            .member(&name("DataManager")?)
            .new_with(vec![Expr::This]);
        body.push(Stmt::Expr(this_member("data")?.assign(manager)));
    }
    if rules {
        let manager = strata
            .clone()
            .member(&name("RulesManager")?)
            .new_with(vec![Expr::This]);
        body.push(Stmt::Expr(this_member("rules")?.assign(manager)));
    }

    if states && rules {
        body.push(Stmt::Expr(
            this_member("rules")?.method(&name("delegateStates")?, vec![this_member("states")?]),
        ));
    }

    let detail = name("detail")?;
    if states && data {
        let filters = name("filters")?;
        let lookup = this_member("stateFilters")?.index(Expr::ident(&detail).member(&name("to")?));
        let listener = Expr::Arrow(
            vec![detail.clone()],
            vec![
                Stmt::Const(filters.clone(), lookup),
                Stmt::If(
                    Expr::ident(&filters),
                    vec![Stmt::Expr(
                        this_member("data")?.method(&name("apply")?, vec![Expr::ident(&filters)]),
                    )],
                    Vec::new(),
                ),
            ],
        );
        body.push(Stmt::Expr(
            Expr::This.method(&name("on")?, vec![Expr::str("state-change"), listener]),
        ));
    }

    if pattern == Pattern::Complete {
        let empty = Expr::ident(&detail)
            .member(&name("visible")?)
            .bin(BinOp::StrictEq, Expr::Num(0.0))
            .bin(
                BinOp::And,
                this_member("states")?.method(&name("has")?, vec![Expr::str(NO_RESULTS_STATE)]),
            );
        let listener = Expr::Arrow(
            vec![detail.clone()],
            vec![Stmt::If(
                empty,
                vec![Stmt::Expr(
                    this_member("states")?
                        .method(&name("switchTo")?, vec![Expr::str(NO_RESULTS_STATE)]),
                )],
                Vec::new(),
            )],
        );
        body.push(Stmt::Expr(
            Expr::This.method(&name("on")?, vec![Expr::str("filter"), listener]),
        ));
    }

    if rules {
        body.push(Stmt::Expr(
            this_member("rules")?.method(&name("evaluateAll")?, Vec::new()),
        ));
    }
    Ok(body)
}

/// Readable glue for one component.
pub fn generate(component: &Component) -> Result<String, InvalidIdent> {
    let id = component.id();
    let strata = name(NAMESPACE)?;
    let window = Expr::ident(&name("window")?);
    let document = Expr::ident(&name("document")?);
    let class = class_name(id)?;
    let controller = name("controller")?;
    let start = name("start")?;

    let guard = Stmt::If(
        Expr::ident(&strata)
            .bin(BinOp::And, Expr::ident(&strata).member(&name("Controller")?))
            .not(),
        vec![
            Stmt::Expr(Expr::ident(&name("console")?).method(
                &name("error")?,
                vec![Expr::str("[strata]"), Expr::str("runtime not loaded for"), Expr::str(id)],
            )),
            Stmt::Return(None),
        ],
        Vec::new(),
    );

    let subclass = Stmt::Class(Class {
        name: class.clone(),
        extends: Some(Expr::ident(&strata).member(&name("Controller")?)),
        methods: vec![Method {
            name: name("setup")?,
            params: Vec::new(),
            body: setup_body(component)?,
        }],
    });

    let boot = Expr::Arrow(
        Vec::new(),
        vec![
            Stmt::Const(
                controller.clone(),
                Expr::ident(&class).new_with(vec![Expr::str(id)]),
            ),
            Stmt::Expr(Expr::ident(&controller).method(&name("init")?, Vec::new())),
        ],
    );

    let loading = document
        .clone()
        .member(&name("readyState")?)
        .bin(BinOp::StrictEq, Expr::str("loading"));
    let schedule = Stmt::If(
        loading,
        vec![Stmt::Expr(document.method(
            &name("addEventListener")?,
            vec![Expr::str("DOMContentLoaded"), Expr::ident(&start)],
        ))],
        vec![Stmt::Expr(Expr::ident(&start).call(Vec::new()))],
    );

    let body = vec![
        Stmt::Const(strata.clone(), window.member(&strata)),
        guard,
        subclass,
        Stmt::Const(start, boot),
        schedule,
    ];

    let mut writer = JsWriter::new();
    writer.stmt(&Stmt::Iife(body));
    tracing::debug!(component = id, pattern = %component.detected().primary_pattern, "glue generated");
    Ok(writer.finish())
}

/// Minifies `script`, keeping it as is when the tokenizer rejects it.
pub fn minify_or_keep(script: String) -> String {
    match minify_js(&script) {
        Ok(minified) => minified,
        Err(err) => {
            tracing::warn!(error = %err, "minification failed; keeping readable script");
            script
        }
    }
}

/// Glue honouring the component's `minifyJS` option.
pub fn render(component: &Component) -> Result<String, InvalidIdent> {
    let script = generate(component)?;
    Ok(if component.options().minify_js {
        minify_or_keep(script)
    } else {
        script
    })
}
