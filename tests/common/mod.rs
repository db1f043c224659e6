#![allow(dead_code)]

use rill::{Component, Definition, NodeId, Options, Runtime};

pub fn production() -> Runtime {
    Runtime::new(Options {
        debug: false,
        warn_default_track_by: false,
    })
}

/// Defines `x-test` from `definition`, mounts it under `<body>` and settles.
pub fn mount(runtime: &Runtime, definition: Definition) -> Component {
    runtime.define("x-test", definition).expect("define");
    let component = runtime
        .mount("x-test", runtime.document().body())
        .expect("mount");
    runtime.run_until_idle().expect("settle");
    component
}

pub fn html(component: &Component) -> String {
    component.document().inner_html(component.shadow_root())
}

pub fn find(component: &Component, tag: &str) -> Vec<NodeId> {
    component
        .document()
        .elements_by_tag(component.shadow_root(), tag)
}

pub fn first(component: &Component, tag: &str) -> NodeId {
    find(component, tag)
        .first()
        .copied()
        .unwrap_or_else(|| panic!("no <{tag}> rendered"))
}
