//! Runs generated pages through `tests/browser/harness.js` under node and
//! checks what the runtime actually does. Skipped when node is not
//! installed.

use serde_json::{Value, json};
use std::io::Write;
use std::process::{Command, Stdio};
use strata_core::{
    ActionKind, Component, ComponentInput, ComponentState, ConditionOperator, DatasetOptions,
    DependencyAction, DependencyRule, DynamicOptions, ExternalScript, FilterableDataset,
    FilterableField, Hooks, Record, RuleTrigger, StateContent, TriggerEvent,
};
use strata_web::{Theme, render_component, render_page};

const HARNESS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/browser/harness.js");

fn node_available() -> bool {
    let found = Command::new("node")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success());
    if !found {
        eprintln!("node not found; skipping browser runtime test");
    }
    found
}

/// Feeds `html` to the named scenario and returns its report.
fn run(scenario: &str, html: &str) -> Value {
    let mut child = Command::new("node")
        .arg(HARNESS)
        .arg(scenario)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(html.as_bytes())
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(
        out.status.success(),
        "{scenario} failed:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).unwrap()
}

fn page(components: &[Component]) -> String {
    let theme = Theme::default();
    let outputs: Vec<_> = components
        .iter()
        .map(|c| render_component(c, &theme).unwrap())
        .collect();
    render_page("runtime", &theme, &outputs).unwrap()
}

fn states(ids: &[&str]) -> Vec<ComponentState> {
    ids.iter()
        .map(|id| ComponentState::new(*id, *id).with_content(StateContent::text(format!("content {id}"))))
        .collect()
}

fn tabs(id: &str, options: DynamicOptions) -> Component {
    Component::new(id, ComponentInput::StatesOnly(states(&["a", "b"])), options).unwrap()
}

fn record(v: Value) -> Record {
    v.as_object().cloned().unwrap_or_default()
}

fn orders(options: DatasetOptions, hooks: Hooks) -> Component {
    let items = ["Alpha", "Beta", "Gamma"]
        .iter()
        .zip(["open", "closed", "open"])
        .map(|(name, status)| record(json!({"name": name, "status": status})))
        .collect();
    let data = FilterableDataset::new(items)
        .with_schema(vec![
            FilterableField::text("name"),
            FilterableField::select("status", ["open", "closed"]),
        ])
        .with_options(options);
    let options = DynamicOptions {
        hooks,
        ..DynamicOptions::default()
    };
    Component::new("orders", ComponentInput::DataOnly(data), options).unwrap()
}

#[test]
fn lifecycle_publishes_at_ready_and_destroy_is_terminal() {
    if !node_available() {
        return;
    }
    let options = DynamicOptions {
        hooks: Hooks {
            before_state_change: Some("return context.to !== \"locked\";".into()),
            on_destroy: Some("window.destroyRuns = (window.destroyRuns || 0) + 1;".into()),
            ..Hooks::default()
        },
        ..DynamicOptions::default()
    };
    let c = Component::new(
        "my-tabs",
        ComponentInput::StatesOnly(states(&["overview", "details", "locked"])),
        options,
    )
    .unwrap();
    let report = run("lifecycle", &page(&[c]));

    assert_eq!(report["publishedBeforeReady"], false);
    assert_eq!(report["lifecycle"], "ready");
    assert_eq!(report["globalIsInstance"], true);
    assert_eq!(
        report["afterSwitch"],
        json!({"active": "details", "detailsHidden": false, "overviewHidden": true, "selected": "true"})
    );
    assert_eq!(report["afterVetoed"], "details");

    // Observed synchronously, before any hook could settle.
    assert_eq!(
        report["afterDestroy"],
        json!({"lifecycle": "destroyed", "registered": false, "global": false, "states": null})
    );
    assert_eq!(report["destroyReturned"], 0);
    assert_eq!(report["secondDestroy"], 0);
    assert_eq!(report["destroyEvents"], 1);
    assert_eq!(report["onDestroyRuns"], 1);
    assert_eq!(report["overviewHiddenAfterDestroy"], true);
}

#[test]
fn required_externals_gate_ready_and_optional_ones_do_not() {
    if !node_available() {
        return;
    }
    let ok = tabs(
        "ext",
        DynamicOptions {
            external_scripts: vec![
                ExternalScript::optional("/slow.js"),
                ExternalScript {
                    on_load: Some("window.loadedA = true;".into()),
                    ..ExternalScript::required("/req-a.js")
                },
                ExternalScript::required("/req-b.js"),
            ],
            ..DynamicOptions::default()
        },
    );
    let broken = tabs(
        "ext-broken",
        DynamicOptions {
            external_scripts: vec![ExternalScript::required("/missing.js")],
            ..DynamicOptions::default()
        },
    );
    let report = run("externals", &page(&[ok, broken]));

    // Both required scripts are in flight before either finishes.
    assert_eq!(
        report["requested"],
        json!(["/req-a.js", "/req-b.js", "/slow.js", "/missing.js"])
    );
    assert_eq!(report["beforeLoad"], "pending");
    assert_eq!(report["afterFirst"], "pending");
    assert_eq!(report["onLoadRan"], true);
    // /slow.js never finishes.
    assert_eq!(report["afterSecond"], "ready");

    assert_eq!(report["broken"], "pending");
    assert_eq!(report["errorEvents"], 1);
    assert_eq!(report["errorLogged"], true);
}

#[test]
fn client_filtering_narrows_searches_and_clears() {
    if !node_available() {
        return;
    }
    let options = DatasetOptions {
        enable_search: true,
        ..DatasetOptions::default()
    };
    let hooks = Hooks {
        after_filter: Some("window.lastFilter = context;".into()),
        ..Hooks::default()
    };
    let report = run("filtering", &page(&[orders(options, hooks)]));

    assert_eq!(report["initial"], json!(["Alpha", "Beta", "Gamma"]));
    assert_eq!(report["initialSummary"], "Showing 3 of 3");
    assert_eq!(report["filtered"], json!(["Alpha", "Gamma"]));
    assert_eq!(report["filteredSummary"], "Showing 2 of 3");
    assert_eq!(
        report["afterFilterHook"],
        json!({"field": "status", "value": "open", "visible": 2, "total": 3})
    );
    assert_eq!(report["searched"], json!(["Gamma"]));
    assert_eq!(report["cleared"], json!(["Alpha", "Beta", "Gamma"]));
    assert_eq!(report["clearedSummary"], "Showing 3 of 3");
    assert_eq!(report["statusAfterClear"], "");
}

#[test]
fn server_rows_filter_from_field_attributes_alone() {
    if !node_available() {
        return;
    }
    let options = DatasetOptions {
        server_rendered: true,
        row_selector: ".order".into(),
        ..DatasetOptions::default()
    };
    // The scenario strips data-record and adds a `.order` row of its own.
    let report = run("server-rows", &page(&[orders(options, Hooks::default())]));

    assert_eq!(report["total"], 4);
    assert_eq!(
        report["records"],
        json!([
            {"name": "Alpha", "status": "open"},
            {"name": "Beta", "status": "closed"},
            {"name": "Gamma", "status": "open"},
            {"name": "Delta", "status": "open"}
        ])
    );
    assert_eq!(report["visible"], json!(["Alpha", "Gamma", "Delta"]));
    assert_eq!(report["summary"], "Showing 3 of 4");
}

#[test]
fn show_rules_toggle_and_guarded_actions_only_fire_while_held() {
    if !node_available() {
        return;
    }
    let rules = vec![
        DependencyRule::show_when("agree", ConditionOperator::Checked, true, "terms"),
        DependencyRule::new(
            "lock-submit",
            RuleTrigger {
                component_id: "agree".into(),
                event: TriggerEvent::Change,
                condition: ConditionOperator::Unchecked,
                value: Value::Null,
            },
        )
        .with_action(DependencyAction::new("submit", ActionKind::Disable)),
    ];
    let c = Component::new("deps", ComponentInput::RulesOnly(rules), DynamicOptions::default()).unwrap();
    let report = run("rules", &page(&[c]));

    assert_eq!(report["initial"], json!({"termsHidden": true, "submitDisabled": true}));
    assert_eq!(report["checked"], json!({"termsHidden": false, "submitDisabled": true}));
    assert_eq!(report["unchecked"], json!({"termsHidden": true, "submitDisabled": true}));
    assert_eq!(report["triggerMarked"], true);
}

#[test]
fn colliding_globals_keep_the_first_instance() {
    if !node_available() {
        return;
    }
    let theme = Theme::default();
    let first = render_component(&tabs("a-b", DynamicOptions::default()), &theme).unwrap();
    let second = render_component(&tabs("a.b", DynamicOptions::default()), &theme).unwrap();
    // render_page refuses this pair; embeds can still meet on one page.
    assert!(render_page("clash", &theme, &[first.clone(), second.clone()]).is_err());
    let html = format!("{}{}", first.to_html(), second.fragment());
    let report = run("globals", &html);

    assert_eq!(report["sanitized"], "a_b");
    assert_eq!(report["globalName"], "strata_a_b");
    assert_eq!(report["holder"], "a-b");
    assert_eq!(report["bothRegistered"], true);
    assert_eq!(report["collisionLogged"], true);
    assert_eq!(report["holderAfterOtherDestroy"], "a-b");
    assert_eq!(report["holderAfterDestroy"], false);
}
