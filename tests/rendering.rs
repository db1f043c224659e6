mod common;

use std::{cell::RefCell, rc::Rc};

use rill::{Definition, Event, Value};
use serde_json::json;

use common::{first, html, mount, production};

#[test]
fn interpolation_follows_state() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<p title="hi {{ name }}">{{ name |> upper }}!</p>"#)
            .state(json!({"name": "ada"})),
    );
    assert_eq!(html(&component), r#"<p title="hi ada">ADA!</p>"#);

    component.state().set("name", "bob");
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), r#"<p title="hi bob">BOB!</p>"#);
}

#[test]
fn mutations_before_a_flush_coalesce() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new("<p>{{ a }}{{ b }}</p>").state(json!({"a": 0, "b": 0})),
    );
    let before = component.render_count();

    let state = component.state();
    state.set("a", 1);
    state.set("b", 2);
    state.set("a", 3);
    assert!(component.is_scheduled());
    assert_eq!(component.render_count(), before);

    runtime.tick().expect("tick");
    assert_eq!(component.render_count(), before + 1);
    assert_eq!(html(&component), "<p>32</p>");
}

#[test]
fn locals_shadow_state() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<p>{{ x }}</p><ul><li *for="x in items" by="x">{{ x }}</li></ul>"#)
            .state(json!({"x": 1, "items": [2]})),
    );
    assert_eq!(html(&component), "<p>1</p><ul><li>2</li><!--for--></ul>");
}

#[test]
fn registered_filters_apply_left_to_right() {
    let runtime = production();
    runtime.compiler().filters().register("reverse", |input, _| {
        Ok(Value::from(input.to_display().chars().rev().collect::<String>()))
    });
    let component = mount(
        &runtime,
        Definition::new("<p>{{ 'abc' |> reverse }}</p><p>{{ 'abc' |> reverse |> upper }}</p>"),
    );
    assert_eq!(html(&component), "<p>cba</p><p>CBA</p>");
}

#[test]
fn raw_interpolation_inserts_markup() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new("<div>{{{ markup }}}</div><p>{{ markup }}</p>")
            .state(json!({"markup": "<b>x</b>"})),
    );
    assert_eq!(
        html(&component),
        "<div><!--html--><b>x</b></div><p>&lt;b&gt;x&lt;/b&gt;</p>"
    );

    component.state().set("markup", "<i>y</i>");
    runtime.run_until_idle().expect("settle");
    assert_eq!(
        html(&component),
        "<div><!--html--><i>y</i></div><p>&lt;i&gt;y&lt;/i&gt;</p>"
    );
}

#[test]
fn skipped_subtrees_are_left_alone() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new("<pre *skip>{{ raw }}</pre><p>{{ raw }}</p>").state(json!({"raw": 1})),
    );
    assert_eq!(html(&component), "<pre>{{ raw }}</pre><p>1</p>");
}

#[test]
fn nested_components_receive_properties() {
    let runtime = production();
    runtime
        .define("x-child", Definition::new("<span>{{ label }}</span>"))
        .expect("define child");
    let parent = mount(
        &runtime,
        Definition::new(r#"<x-child .label="title"></x-child>"#).state(json!({"title": "hi"})),
    );
    let host = first(&parent, "x-child");
    let child = runtime.component(host).expect("child upgraded");
    assert!(child.is_connected());
    assert_eq!(html(&child), "<span>hi</span>");

    parent.state().set("title", "yo");
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&child), "<span>yo</span>");
}

#[test]
fn lifecycle_hooks_run_after_renders() {
    let runtime = production();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (created, attached, detached) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
    let component = mount(
        &runtime,
        Definition::new("<p>{{ n }}</p>")
            .state(json!({"n": 1}))
            .on_created(move |c| {
                created.borrow_mut().push(format!("created:{}", c.render_count()));
                Ok(())
            })
            .on_attached(move |_| {
                attached.borrow_mut().push("attached".to_string());
                Ok(())
            })
            .on_detached(move |_| {
                detached.borrow_mut().push("detached".to_string());
                Ok(())
            }),
    );
    runtime.unmount(&component);
    runtime.run_until_idle().expect("settle");
    assert_eq!(*log.borrow(), ["created:1", "attached", "detached"]);
    assert_eq!(runtime.instance_count(), 0);
    assert!(!runtime.document().is_alive(component.host()));
}

#[test]
fn hiding_an_ancestor_detaches_nested_components() {
    let runtime = production();
    let log = Rc::new(RefCell::new(Vec::new()));
    let (attached, detached) = (Rc::clone(&log), Rc::clone(&log));
    runtime
        .define(
            "x-leaf",
            Definition::new("<i>leaf</i>")
                .on_attached(move |_| {
                    attached.borrow_mut().push("attached");
                    Ok(())
                })
                .on_detached(move |_| {
                    detached.borrow_mut().push("detached");
                    Ok(())
                }),
        )
        .expect("define leaf");
    let parent = mount(
        &runtime,
        Definition::new(r#"<div *if="show"><x-leaf></x-leaf></div>"#).state(json!({"show": true})),
    );
    assert_eq!(*log.borrow(), ["attached"]);

    parent.state().set("show", false);
    runtime.run_until_idle().expect("settle");
    assert_eq!(*log.borrow(), ["attached", "detached"]);

    parent.state().set("show", true);
    runtime.run_until_idle().expect("settle");
    assert_eq!(*log.borrow(), ["attached", "detached", "attached"]);
    assert_eq!(runtime.instance_count(), 2);
}

#[test]
fn observed_attribute_changes_reach_the_hook_after_rendering() {
    let runtime = production();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let component = mount(
        &runtime,
        Definition::new("<p>{{ n }}</p>")
            .state(json!({"n": 1}))
            .observed_attributes(["open"])
            .on_attribute(move |c, name, old, new| {
                sink.borrow_mut().push(format!(
                    "{name}:{}:{}@{}",
                    old.unwrap_or("-"),
                    new.unwrap_or("-"),
                    c.render_count()
                ));
                Ok(())
            }),
    );
    let before = component.render_count();

    component.set_attribute("open", Some("yes")).expect("set");
    component.set_attribute("class", Some("wide")).expect("set");
    assert!(seen.borrow().is_empty());
    runtime.run_until_idle().expect("settle");

    component.set_attribute("open", None).expect("remove");
    runtime.run_until_idle().expect("settle");
    assert_eq!(
        *seen.borrow(),
        [
            format!("open:-:yes@{}", before + 1),
            format!("open:yes:-@{}", before + 2),
        ]
    );
    assert_eq!(
        runtime.document().get_attribute(component.host(), "class").as_deref(),
        Some("wide")
    );
}

#[test]
fn emitted_events_reach_host_listeners() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<button @click="$emit('picked', id)"></button>"#)
            .state(json!({"id": 7})),
    );
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    component.on("picked", move |event| {
        sink.borrow_mut().push(event.detail().to_display());
        Ok(())
    });
    let button = first(&component, "button");
    runtime
        .document()
        .dispatch_event(button, &Event::new("click"))
        .expect("dispatch");
    assert_eq!(*seen.borrow(), ["7"]);
}
