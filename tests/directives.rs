mod common;

use rill::{Definition, Event, Value};
use serde_json::json;

use common::{first, html, mount, production};

fn counter(template: &str) -> Definition {
    Definition::new(template)
        .state(json!({"hits": 0}))
        .method("hit", |_, state, _| {
            state.set("hits", state.get("hits").to_number() + 1.0);
            Ok(Value::Undefined)
        })
}

#[test]
fn conditional_toggles_presence_without_redundant_swaps() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<p *if="show">{{ label }}</p>"#)
            .state(json!({"show": true, "label": "x"})),
    );
    assert_eq!(html(&component), "<p>x</p>");

    let document = runtime.document();
    document.reset_stats();
    component.state().set("label", "y");
    runtime.run_until_idle().expect("settle");
    assert_eq!(document.stats().inserts, 0);
    assert_eq!(document.stats().removals, 0);
    assert_eq!(html(&component), "<p>y</p>");

    component.state().set("show", false);
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), "<!--if-->");

    component.state().set("label", "z");
    component.state().set("show", 1);
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), "<p>z</p>");
}

#[test]
fn two_way_binding_round_trips_without_echo() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<input *bind="name">"#).state(json!({"name": "a"})),
    );
    let document = runtime.document();
    let input = first(&component, "input");
    assert_eq!(document.get_property(input, "value").to_display(), "a");

    component.state().set("name", "b");
    runtime.run_until_idle().expect("settle");
    assert_eq!(document.get_property(input, "value").to_display(), "b");

    document
        .set_property(input, "value", Value::from("c"))
        .expect("type");
    document.reset_stats();
    document
        .dispatch_event(input, &Event::new("input"))
        .expect("dispatch");
    assert_eq!(component.state().get("name").to_display(), "c");
    runtime.run_until_idle().expect("settle");
    assert_eq!(document.stats().property_writes, 0);
    assert_eq!(document.get_property(input, "value").to_display(), "c");
}

#[test]
fn checkbox_groups_edit_the_bound_array() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(
            r#"<input type="checkbox" value="a" *bind="picked"><input type="checkbox" value="b" *bind="picked">"#,
        )
        .state(json!({"picked": ["b"]})),
    );
    let document = runtime.document();
    let boxes = common::find(&component, "input");
    assert!(!document.get_property(boxes[0], "checked").is_truthy());
    assert!(document.get_property(boxes[1], "checked").is_truthy());

    let picked = component.state().get("picked");
    document
        .set_property(boxes[0], "checked", Value::Bool(true))
        .expect("check");
    document
        .dispatch_event(boxes[0], &Event::new("change"))
        .expect("dispatch");
    runtime.run_until_idle().expect("settle");
    let after = component.state().get("picked");
    assert!(after.strict_eq(&picked));
    assert_eq!(after.to_display(), "b,a");
}

#[test]
fn multi_select_requires_an_array() {
    let runtime = common::production();
    let component = mount(
        &runtime,
        Definition::new(
            r#"<select multiple *bind="chosen"><option value="1">one</option><option>two</option></select>"#,
        )
        .state(json!({"chosen": ["two"]})),
    );
    let document = runtime.document();
    let options = common::find(&component, "option");
    assert!(!document.get_property(options[0], "selected").is_truthy());
    assert!(document.get_property(options[1], "selected").is_truthy());
    assert!(component.last_error().is_none());

    component.state().set("chosen", "two");
    runtime.run_until_idle().expect("production swallows");
    let error = component.last_error().expect("shape error reported");
    assert!(matches!(error.error(), rill::Error::Shape { found: "string", .. }));
}

#[test]
fn class_and_style_bindings_diff_their_output() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(
            r#"<div class="base" :class="{active: on, 'is-wide': w > 5}" :style="{'width.px': w, display: on && 'block'}"></div>"#,
        )
        .state(json!({"on": true, "w": 10})),
    );
    let document = runtime.document();
    let div = first(&component, "div");
    assert_eq!(document.classes(div), ["base", "active", "is-wide"]);
    assert_eq!(document.get_style(div, "width").as_deref(), Some("10px"));
    assert_eq!(document.get_style(div, "display").as_deref(), Some("block"));

    document.reset_stats();
    component.state().set("on", false);
    runtime.run_until_idle().expect("settle");
    assert_eq!(document.classes(div), ["base", "is-wide"]);
    assert_eq!(document.get_style(div, "display"), None);
    assert_eq!(document.stats().class_writes, 1);
    assert_eq!(document.stats().style_writes, 1);
}

#[test]
fn one_time_bindings_render_once() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<p ::title="label" :data-live="label" :hidden="off"></p>"#)
            .state(json!({"label": "a", "off": true})),
    );
    let document = runtime.document();
    let p = first(&component, "p");
    assert_eq!(document.get_attribute(p, "title").as_deref(), Some("a"));
    assert!(document.has_attribute(p, "hidden"));

    component.state().set("label", "b");
    component.state().set("off", false);
    runtime.run_until_idle().expect("settle");
    assert_eq!(document.get_attribute(p, "title").as_deref(), Some("a"));
    assert_eq!(document.get_attribute(p, "data-live").as_deref(), Some("b"));
    assert!(!document.has_attribute(p, "hidden"));
}

#[test]
fn refs_track_connected_elements() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<input ref="field"><p *if="show" ref="note"></p>"#)
            .state(json!({"show": true})),
    );
    let input = first(&component, "input");
    assert_eq!(component.get_ref("field"), Some(input));
    assert!(component.get_ref("note").is_some());

    component.state().set("show", false);
    runtime.run_until_idle().expect("settle");
    assert_eq!(component.get_ref("field"), Some(input));
    assert_eq!(component.get_ref("note"), None);
}

#[test]
fn event_modifiers_guard_in_order() {
    let runtime = production();
    let component = mount(
        &runtime,
        counter(
            r##"<div @click.self="#hit()"><span></span></div><button @click.once="#hit()"></button><a @click.prevent="#hit()"></a>"##,
        ),
    );
    let document = runtime.document();
    let hits = || component.state().get("hits").to_number();

    let span = first(&component, "span");
    document.dispatch_event(span, &Event::new("click")).expect("dispatch");
    assert!((hits() - 0.0).abs() < f64::EPSILON);
    let div = first(&component, "div");
    document.dispatch_event(div, &Event::new("click")).expect("dispatch");
    assert!((hits() - 1.0).abs() < f64::EPSILON);

    let button = first(&component, "button");
    document.dispatch_event(button, &Event::new("click")).expect("dispatch");
    document.dispatch_event(button, &Event::new("click")).expect("dispatch");
    assert!((hits() - 2.0).abs() < f64::EPSILON);

    let link = first(&component, "a");
    let allowed = document
        .dispatch_event(link, &Event::new("click"))
        .expect("dispatch");
    assert!(!allowed);
    assert!((hits() - 3.0).abs() < f64::EPSILON);
}

#[test]
fn handlers_see_the_current_event() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<input @input="typed = $event.value">"#).state(json!({"typed": ""})),
    );
    let document = runtime.document();
    let input = first(&component, "input");
    document
        .set_property(input, "value", Value::from("hey"))
        .expect("type");
    document.dispatch_event(input, &Event::new("input")).expect("dispatch");
    assert_eq!(component.state().get("typed").to_display(), "hey");
    assert!(component.current_event().is_nullish());
}

#[test]
fn debug_mode_keeps_directive_attributes() {
    let runtime = rill::Runtime::new(rill::Options::debug());
    let component = mount(
        &runtime,
        Definition::new(r#"<p :title="t"></p>"#).state(json!({"t": "x"})),
    );
    assert_eq!(html(&component), r#"<p :title="t" title="x"></p>"#);
}
