mod common;

use std::{cell::Cell, rc::Rc};

use proptest::prelude::*;
use rill::{Component, Definition, NodeId, Runtime, Value};
use serde_json::json;

use common::{find, html, mount, production};

fn keyed(ids: &[u32]) -> Value {
    Value::from_json(json!(ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>()))
}

fn rows(runtime: &Runtime, component: &Component) -> Vec<(String, NodeId)> {
    find(component, "li")
        .into_iter()
        .map(|li| (runtime.document().text_content(li), li))
        .collect()
}

#[test]
fn reordering_moves_existing_nodes() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<ul><li *for="item in items" by="item.id">{{ item.id }}</li></ul>"#)
            .state(json!({"items": [{"id": 1}, {"id": 2}, {"id": 3}]})),
    );
    let before = rows(&runtime, &component);
    assert_eq!(html(&component), "<ul><li>1</li><li>2</li><li>3</li><!--for--></ul>");

    runtime.document().reset_stats();
    component.state().set("items", keyed(&[3, 1, 2]));
    runtime.run_until_idle().expect("settle");
    let after = rows(&runtime, &component);
    assert_eq!(html(&component), "<ul><li>3</li><li>1</li><li>2</li><!--for--></ul>");
    assert_eq!(after[0].1, before[2].1);
    assert_eq!(after[1].1, before[0].1);
    assert_eq!(after[2].1, before[1].1);
    assert_eq!(runtime.document().stats().removals, 0);

    component.state().set("items", keyed(&[1, 4]));
    runtime.run_until_idle().expect("settle");
    let last = rows(&runtime, &component);
    assert_eq!(html(&component), "<ul><li>1</li><li>4</li><!--for--></ul>");
    assert_eq!(last[0].1, before[0].1);
    assert!(before.iter().all(|(_, node)| *node != last[1].1));
}

#[test]
fn loops_expose_key_index_and_position() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(
            r#"<p *for="(value, key, i) in user" by="key">{{ i }}:{{ key }}={{ value }}/{{ $index }}</p>"#,
        )
        .state(json!({"user": {"name": "ada", "role": "admin"}})),
    );
    assert_eq!(html(&component), "<p>0:name=ada/0</p><p>1:role=admin/1</p><!--for-->");
}

#[test]
fn counts_and_nullish_collections() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<i *for="n in total">{{ n }}</i>"#).state(json!({"total": 3})),
    );
    assert_eq!(html(&component), "<i>0</i><i>1</i><i>2</i><!--for-->");

    component.state().set("total", Value::Null);
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), "<!--for-->");
}

#[test]
fn array_mutations_rerender_the_loop() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<b *for="tag in tags" by="tag">{{ tag }}</b>"#)
            .state(json!({"tags": ["x"]})),
    );
    let tags = component.state().get("tags");
    let list = tags.as_target().expect("array");
    list.push("y");
    list.unshift("w");
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), "<b>w</b><b>x</b><b>y</b><!--for-->");
}

#[test]
fn hidden_items_keep_their_place() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(
            r#"<li *for="item in items" by="item.id" *if="item.on">{{ item.id }}</li>"#,
        )
        .state(json!({"items": [{"id": 1, "on": true}, {"id": 2, "on": false}, {"id": 3, "on": true}]})),
    );
    assert_eq!(html(&component), "<li>1</li><!--if--><li>3</li><!--for-->");

    component.state().set(
        "items",
        Value::from_json(json!([{"id": 2, "on": false}, {"id": 3, "on": true}, {"id": 1, "on": true}])),
    );
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), "<!--if--><li>3</li><li>1</li><!--for-->");
}

#[test]
fn a_failed_pass_does_not_strand_items() {
    let runtime = production();
    let component = mount(
        &runtime,
        Definition::new(r#"<li *for="item in items" by="item.id">{{ item.v.x }}</li>"#)
            .state(json!({"items": []})),
    );
    component.state().set(
        "items",
        Value::from_json(json!([{"id": 1, "v": {"x": "a"}}, {"id": 2}])),
    );
    runtime.run_until_idle().expect("production swallows");
    assert!(component.last_error().is_some());

    component.state().set("items", Value::from_json(json!([])));
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), "<!--for-->");

    component.state().set("items", Value::from_json(json!([{"id": 3, "v": {"x": "c"}}])));
    runtime.run_until_idle().expect("settle");
    assert_eq!(html(&component), "<li>c</li><!--for-->");
}

#[test]
fn removed_items_release_nested_components() {
    let runtime = production();
    let detached = Rc::new(Cell::new(0));
    let sink = Rc::clone(&detached);
    runtime
        .define(
            "x-row",
            Definition::new(r#"<span *if="on">{{ label }}</span><b *for="c in 2">{{ c }}</b>"#)
                .state(json!({"on": false, "label": "row"}))
                .on_detached(move |_| {
                    sink.set(sink.get() + 1);
                    Ok(())
                }),
        )
        .expect("define row");
    let component = mount(
        &runtime,
        Definition::new(r#"<x-row *for="n in count"></x-row>"#).state(json!({"count": 3})),
    );
    let document = runtime.document();
    assert_eq!(runtime.instance_count(), 4);
    let nodes = document.node_count();

    for _ in 0..5 {
        component.state().set("count", 0);
        runtime.run_until_idle().expect("settle");
        assert_eq!(runtime.instance_count(), 1);
        component.state().set("count", 3);
        runtime.run_until_idle().expect("settle");
        assert_eq!(runtime.instance_count(), 4);
        assert_eq!(document.node_count(), nodes);
    }
    component.state().set("count", 0);
    runtime.run_until_idle().expect("settle");
    assert_eq!(detached.get(), 18);
    assert_eq!(runtime.instance_count(), 1);
    assert_eq!(component.anchor_count(), 1);
}

fn unique(ids: Vec<u32>) -> Vec<u32> {
    let mut seen = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reconciliation_is_an_ordered_bijection(
        first in prop::collection::vec(0u32..12, 0..8).prop_map(unique),
        second in prop::collection::vec(0u32..12, 0..8).prop_map(unique),
    ) {
        let runtime = production();
        let component = mount(
            &runtime,
            Definition::new(r#"<li *for="item in items" by="item.id">{{ item.id }}</li>"#)
                .state(json!({ "items": [] })),
        );

        component.state().set("items", keyed(&first));
        runtime.run_until_idle().expect("settle");
        let before = rows(&runtime, &component);
        let texts: Vec<String> = first.iter().map(ToString::to_string).collect();
        prop_assert_eq!(before.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>(), texts);

        component.state().set("items", keyed(&second));
        runtime.run_until_idle().expect("settle");
        let after = rows(&runtime, &component);
        let texts: Vec<String> = second.iter().map(ToString::to_string).collect();
        prop_assert_eq!(after.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>(), texts);

        for (text, node) in &after {
            if let Some((_, old)) = before.iter().find(|(t, _)| t == text) {
                prop_assert_eq!(node, old);
            }
        }
    }
}
