// SPDX-License-Identifier: MPL-2.0

//! Integration tests for the topology graph

use rtsp_topology::backends::ElementState;
use rtsp_topology::backends::dry_run::{Caps, DryRunEngine, EngineOp};
use rtsp_topology::{AttachMode, Topology, TopologyError, description};
use std::sync::Arc;

const CAPTURE: &str = r#"{
    "caps": { "vga": "video/x-raw,width=640,height=480" },
    "pipes": {
        "main": {
            "src": { "type": "videotestsrc", "pattern": "ball", "is-live": true },
            "scale": { "type": "videoscale" },
            "tee": { "type": "tee" },
            "preview_q": { "type": "queue" },
            "preview": { "type": "fakesink", "sync": false }
        },
        "record": {
            "rec_q": { "type": "queue" },
            "rec_sink": { "type": "fakesink" }
        }
    },
    "connections": { "record": { "first_elem": "rec_q", "src_pipe": "main", "src_last_elem": "tee" } },
    "links": [["tee", "preview_q", "preview"], ["rec_q", "rec_sink"]],
    "filtered_links": [["src", "scale", "vga"], ["scale", "tee", "vga"]]
}"#;

fn engine() -> Arc<DryRunEngine> {
    Arc::new(DryRunEngine::new())
}

fn loaded(json: &str) -> (Arc<DryRunEngine>, Topology<DryRunEngine>) {
    let engine = engine();
    let mut topology = Topology::new(Arc::clone(&engine));
    description::load_str(json, &mut topology).unwrap();
    (engine, topology)
}

/// Source pipeline `main` with a tee and `count` destination pipelines
/// `dest<i>` each holding an entry queue `in<i>`
fn fan(topology: &mut Topology<DryRunEngine>, count: usize) {
    topology.create_pipeline("main").unwrap();
    topology.create_element("src", "videotestsrc").unwrap();
    topology.create_element("tee", "tee").unwrap();
    topology.add_element_to_bin("src", "main").unwrap();
    topology.add_element_to_bin("tee", "main").unwrap();
    topology.connect_elements("src", "tee").unwrap();
    for i in 0..count {
        let pipe = format!("dest{}", i);
        let entry = format!("in{}", i);
        topology.create_pipeline(&pipe).unwrap();
        topology.create_element(&entry, "queue").unwrap();
        topology.add_element_to_bin(&entry, &pipe).unwrap();
    }
}

#[test]
fn test_same_description_same_structure() {
    let (_, first) = loaded(CAPTURE);
    let (_, second) = loaded(CAPTURE);

    let snapshot = first.snapshot();
    assert_eq!(snapshot, second.snapshot());
    assert_eq!(
        serde_json::to_string(&snapshot).unwrap(),
        serde_json::to_string(&second.snapshot()).unwrap()
    );

    // Tunnel wiring is not part of the described edges
    assert_eq!(snapshot.edge_count(), 5);
    let tunnel = &snapshot.tunnels[0];
    assert_eq!(tunnel.name, "record");
    assert!(tunnel.attached);
    assert_eq!(snapshot.pipeline("main").unwrap().edges.iter().filter(|e| e.cap.is_some()).count(), 2);
}

#[test]
fn test_duplicates_leave_registries_unchanged() {
    let (engine, mut topology) = loaded(CAPTURE);
    let before = topology.snapshot();
    let calls = engine.operations().len();

    assert!(matches!(
        topology.create_element("tee", "queue"),
        Err(TopologyError::DuplicateName { kind: "node", .. })
    ));
    assert!(matches!(
        topology.create_cap("vga", "video/x-raw"),
        Err(TopologyError::DuplicateName { kind: "cap", .. })
    ));
    assert!(matches!(
        topology.create_pipeline("main"),
        Err(TopologyError::DuplicateName { kind: "pipeline", .. })
    ));

    assert_eq!(topology.snapshot(), before);
    assert_eq!(engine.operations().len(), calls);
}

#[test]
fn test_node_and_pipeline_namespaces_are_separate() {
    let mut topology = Topology::new(engine());
    topology.create_element("main", "queue").unwrap();
    topology.create_pipeline("main").unwrap();
    topology.add_element_to_bin("main", "main").unwrap();
}

#[test]
fn test_unknown_node_for_every_ordering() {
    let (engine, mut topology) = loaded(CAPTURE);
    let calls = engine.operations().len();

    for (src, dst, missing) in [
        ("ghost", "preview", "ghost"),
        ("preview_q", "ghost", "ghost"),
        ("ghost", "phantom", "ghost"),
    ] {
        assert_eq!(
            topology.connect_elements(src, dst).unwrap_err(),
            TopologyError::UnknownNode(missing.into())
        );
        assert_eq!(
            topology.connect_elements_filtered(src, dst, "vga").unwrap_err(),
            TopologyError::UnknownNode(missing.into())
        );
    }
    assert_eq!(
        topology.connect_elements_filtered("preview_q", "preview", "nope").unwrap_err(),
        TopologyError::UnknownCap("nope".into())
    );
    assert_eq!(engine.operations().len(), calls);
}

#[test]
fn test_link_refusals() {
    let mut topology = Topology::new(engine());
    topology.create_pipeline("a").unwrap();
    topology.create_pipeline("b").unwrap();
    for (node, type_name, pipe) in [
        ("src", "videotestsrc", Some("a")),
        ("pay", "rtph264pay", Some("a")),
        ("q", "queue", Some("a")),
        ("other", "queue", Some("b")),
        ("loose", "queue", None),
    ] {
        topology.create_element(node, type_name).unwrap();
        if let Some(pipe) = pipe {
            topology.add_element_to_bin(node, pipe).unwrap();
        }
    }

    assert_eq!(
        topology.connect_elements("src", "pay").unwrap_err(),
        TopologyError::IncompatibleFormats {
            src: "src".into(),
            dst: "pay".into()
        }
    );
    assert!(matches!(
        topology.connect_elements("q", "other"),
        Err(TopologyError::LinkRejected { .. })
    ));
    assert!(matches!(
        topology.connect_elements("q", "loose"),
        Err(TopologyError::LinkRejected { .. })
    ));

    topology.connect_elements("src", "q").unwrap();
    assert!(matches!(
        topology.connect_elements("src", "q"),
        Err(TopologyError::LinkRejected { .. })
    ));
    assert_eq!(
        topology.add_element_to_bin("q", "a").unwrap_err(),
        TopologyError::AlreadyOwned {
            node: "q".into(),
            pipeline: "a".into()
        }
    );
    assert_eq!(
        topology.link_to_tee("q", "pay").unwrap_err(),
        TopologyError::NoPadTemplate("q".into())
    );
}

#[test]
fn test_caps_are_copied_on_assignment() {
    let engine = engine();
    let mut topology = Topology::new(Arc::clone(&engine));
    topology.create_cap("vga", "video/x-raw, width=640, height=480").unwrap();
    topology.create_element("a", "capsfilter").unwrap();
    topology.create_element("b", "capsfilter").unwrap();
    topology.assign_cap("a", "vga").unwrap();
    topology.assign_cap("b", "vga").unwrap();

    let expected: Caps = "video/x-raw,width=640,height=480".parse().unwrap();
    assert_eq!(topology.cap("vga").unwrap(), &expected);

    topology.set_property("a", "caps", "video/x-raw,width=320").unwrap();
    let a = topology.element("a").unwrap();
    let b = topology.element("b").unwrap();
    assert_eq!(engine.element_caps(a).unwrap().field("width"), Some("320"));
    assert_eq!(engine.element_caps(b), Some(expected.clone()));
    assert_eq!(topology.cap("vga").unwrap(), &expected);
    assert_eq!(topology.node("b").unwrap().cap(), Some("vga"));
}

#[test]
fn test_tunnel_limit_boundary() {
    let mut topology = Topology::with_max_tunnels(engine(), 2);
    fan(&mut topology, 3);

    topology
        .connect_pipe("dest0", "in0", "main", "tee", AttachMode::Immediate)
        .unwrap();
    topology
        .connect_pipe("dest1", "in1", "main", "tee", AttachMode::OnDemand)
        .unwrap();

    let before = topology.snapshot();
    assert_eq!(
        topology
            .connect_pipe("dest2", "in2", "main", "tee", AttachMode::Immediate)
            .unwrap_err(),
        TopologyError::ResourceExhausted { limit: 2 }
    );
    // Destination is checked first
    assert_eq!(
        topology
            .connect_pipe("ghost", "in2", "main", "tee", AttachMode::Immediate)
            .unwrap_err(),
        TopologyError::NotAPipeline("ghost".into())
    );
    assert_eq!(topology.snapshot(), before);

    topology.disconnect_pipe("dest0").unwrap();
    topology
        .connect_pipe("dest2", "in2", "main", "tee", AttachMode::Immediate)
        .unwrap();
    assert_eq!(topology.tunnel_count(), 2);
}

#[test]
fn test_destroy_pipeline() {
    let (engine, mut topology) = loaded(CAPTURE);
    let record = topology.pipeline("record").unwrap().clone();

    topology.destroy_pipeline("record").unwrap();
    assert!(!topology.contains_pipeline("record"));
    assert!(!topology.contains_node("rec_q"));
    assert!(!topology.contains_node("intersink_record"));
    assert_eq!(topology.tunnel_count(), 0);
    assert_eq!(engine.pipeline_state(&record), ElementState::Null);
    // The tunnel took the first pad, the preview branch keeps its own
    assert_eq!(
        engine.request_pads(topology.element("tee").unwrap()),
        vec!["src_1".to_string()]
    );
    assert_eq!(
        topology.destroy_pipeline("record").unwrap_err(),
        TopologyError::UnknownPipeline("record".into())
    );
}

#[test]
fn test_drop_stops_capture_pipelines_only() {
    let engine = engine();
    let mut topology = Topology::new(Arc::clone(&engine));
    description::load_str(
        r#"{
            "pipes": { "main": { "src": { "type": "fakesrc" } }, "cam": { "q": { "type": "queue" } } },
            "rtsp": ["cam"]
        }"#,
        &mut topology,
    )
    .unwrap();
    topology.start_pipelines().unwrap();
    let main = topology.pipeline("main").unwrap().clone();
    assert_eq!(engine.pipeline_state(&main), ElementState::Playing);

    drop(topology);
    assert_eq!(engine.pipeline_state(&main), ElementState::Null);
    assert_eq!(
        engine.count_operations(|op| {
            matches!(op, EngineOp::SetPipelineState { pipeline, .. } if pipeline == "cam")
        }),
        0
    );
}
