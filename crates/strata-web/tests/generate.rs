use proptest::prelude::*;
use serde_json::{Value, json};
use strata_core::{
    Component, ComponentInput, ComponentSpec, ComponentState, DynamicOptions, FilterableDataset,
    Pattern, Record, StateContent,
};
use strata_web::{Theme, config, minify_js, render_component, render_page};

fn record(v: Value) -> Record {
    v.as_object().cloned().unwrap_or_default()
}

fn states(n: usize) -> Vec<ComponentState> {
    (0..n)
        .map(|i| {
            ComponentState::new(format!("s{i}"), format!("State {i}"))
                .with_content(StateContent::text(format!("content {i}")))
        })
        .collect()
}

fn items(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| record(json!({"name": format!("item {i}"), "status": if i % 2 == 0 { "open" } else { "closed" }})))
        .collect()
}

fn component(id: &str, input: ComponentInput) -> Component {
    Component::new(id, input, DynamicOptions::default()).unwrap()
}

#[test]
fn ten_states_render_eagerly() {
    let c = component("ten", ComponentInput::StatesOnly(states(10)));
    assert_eq!(c.detected().primary_pattern, Pattern::PreRenderedStates);
    let out = render_component(&c, &Theme::default()).unwrap();
    assert!(out.markup.contains("data-pattern=\"pre-rendered-states\""));
    assert!(out.markup.contains("role=\"tablist\""));
    assert_eq!(out.markup.matches("role=\"tabpanel\"").count(), 10);
    assert!(!out.markup.contains("data-lazy-state"));
    assert!(out.markup.contains("content 9"));
}

#[test]
fn eleven_states_defer_inactive_panels() {
    let c = component("eleven", ComponentInput::StatesOnly(states(11)));
    assert_eq!(c.detected().primary_pattern, Pattern::DynamicStates);
    let out = render_component(&c, &Theme::default()).unwrap();
    assert_eq!(out.markup.matches("<template data-lazy-state>").count(), 10);
    assert!(out.script.contains("{\"lazy\": true}"));
}

#[test]
fn fifty_items_ship_in_the_payload() {
    let c = component("fifty", ComponentInput::DataOnly(FilterableDataset::new(items(50))));
    assert_eq!(c.detected().primary_pattern, Pattern::ClientFilterable);
    let out = render_component(&c, &Theme::default()).unwrap();
    let payload = config::extract(&out.config, "fifty").unwrap();
    assert_eq!(payload["serverMode"], false);
    assert_eq!(payload["data"]["items"].as_array().map(Vec::len), Some(50));
    assert!(!out.markup.contains("data-row"));
}

#[test]
fn fifty_one_items_render_rows_server_side() {
    let c = component("big", ComponentInput::DataOnly(FilterableDataset::new(items(51))));
    assert_eq!(c.detected().primary_pattern, Pattern::ServerFilterable);
    let out = render_component(&c, &Theme::default()).unwrap();
    assert_eq!(out.markup.matches("data-row ").count(), 51);
    let payload = config::extract(&out.config, "big").unwrap();
    assert_eq!(payload["serverMode"], true);
    assert!(payload["data"].get("items").is_none());
    assert_eq!(payload["data"]["total"], 51);
}

#[test]
fn single_state_has_no_navigation() {
    let c = component("one", ComponentInput::StatesOnly(states(1)));
    let out = render_component(&c, &Theme::default()).unwrap();
    assert!(!out.markup.contains("role=\"tablist\""));
    assert!(out.markup.contains("role=\"tabpanel\""));
}

#[test]
fn spec_json_round_trip_to_page() {
    let spec = ComponentSpec::from_json(
        r#"{
            "id": "orders",
            "states": [
                {"id": "all", "label": "All orders"},
                {"id": "no-results", "label": "Nothing here"}
            ],
            "data": {
                "items": [{"status": "open"}, {"status": "closed"}, {"status": "open"}],
                "schema": [{"name": "status", "type": "select", "options": ["open", "closed"]}]
            },
            "rules": [{
                "id": "r1",
                "trigger": {"componentId": "show-archived", "condition": "checked"},
                "actions": [{"targetId": "archive", "action": "show"}]
            }],
            "options": {"minifyJS": true},
            "theme": {"classes": {"component": "card"}}
        }"#,
    )
    .unwrap();
    let theme = Theme::default().with_overrides(spec.theme.as_ref());
    let c = Component::from_spec(spec).unwrap();
    assert_eq!(c.detected().primary_pattern, Pattern::Complete);

    let out = render_component(&c, &theme).unwrap();
    assert!(out.minified);
    assert!(out.markup.contains("class=\"card\""));
    assert_eq!(minify_js(&out.script).unwrap(), out.script);

    let payload = config::extract(&out.config, "orders").unwrap();
    assert_eq!(payload["rules"][0]["trigger"]["componentId"], "show-archived");
    assert_eq!(payload["initialState"], "all");

    let page = render_page("Orders", &theme, &[out]).unwrap();
    assert!(page.contains("id=\"orders-config\""));
    assert!(page.contains("\"no-results\""));
}

proptest! {
    #[test]
    fn labels_cannot_break_out_of_generated_blocks(labels in prop::collection::vec(".{0,24}", 1..6)) {
        let states: Vec<ComponentState> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| ComponentState::new(format!("s{i}"), label.clone()))
            .collect();
        let c = component("p", ComponentInput::StatesOnly(states));
        let out = render_component(&c, &Theme::default()).unwrap();
        let fragment = out.fragment();
        prop_assert_eq!(fragment.matches("</script>").count(), 2);

        let payload = config::extract(&out.config, "p").unwrap();
        for (i, label) in labels.iter().enumerate() {
            let expected = if label.trim().is_empty() { format!("s{i}") } else { label.clone() };
            prop_assert_eq!(payload["states"][i]["label"].as_str(), Some(expected.as_str()));
        }
    }
}
