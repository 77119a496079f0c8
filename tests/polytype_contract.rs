//! Purpose: End-to-end contract for the process-wide registry and serde integration.
//! Exports: Integration tests only.
//! Role: Exercise decode through `Polytype::decode`, nested serde fields, and threads.
//! Invariants: Registration happens once per test binary through `setup`.
//! Invariants: Each test registers only discriminators no other test uses.

use std::sync::Once;
use std::thread;

use polytype::{ErrorKind, Polytype, registry};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Circle {
    #[serde(rename = "Type")]
    kind: String,
    radius: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Square {
    #[serde(rename = "Type")]
    kind: String,
    side: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Group {
    #[serde(rename = "Type")]
    kind: String,
    members: Vec<Polytype>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Scene {
    name: String,
    shapes: Vec<Polytype>,
}

static SETUP: Once = Once::new();

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}

fn setup() {
    SETUP.call_once(|| {
        init_tracing();
        registry::register("circle", || Circle {
            kind: "circle".to_string(),
            radius: 0.0,
        });
        registry::register("square", || Square {
            kind: "square".to_string(),
            side: 0.0,
        });
        registry::register("group", || Group {
            kind: "group".to_string(),
            members: Vec::new(),
        });
    });
}

#[test]
fn circle_payload_decodes_to_circle() {
    setup();
    let poly = Polytype::from_slice(br#"{"Type":"circle","radius":2.5}"#).expect("decode circle");
    assert_eq!(
        poly.downcast_ref::<Circle>(),
        Some(&Circle {
            kind: "circle".to_string(),
            radius: 2.5,
        })
    );
}

#[test]
fn unregistered_discriminator_is_unsupported() {
    setup();
    let mut poly = Polytype::from_slice(br#"{"Type":"square","side":3}"#).expect("decode square");
    let err = poly.decode(br#"{"Type":"triangle","base":1}"#).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    assert!(err.to_string().contains("triangle"));
    assert_eq!(poly.downcast_ref::<Square>().map(|s| s.side), Some(3.0));
}

#[test]
fn missing_discriminator_is_rejected() {
    setup();
    let err = Polytype::from_slice(br#"{"radius":2.5}"#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingDiscriminator);
}

#[test]
fn nested_fields_decode_through_serde() {
    setup();
    let input = r#"{
        "name": "demo",
        "shapes": [
            {"Type": "circle", "radius": 1.0},
            {"Type": "square", "side": 2.0}
        ]
    }"#;
    let scene: Scene = serde_json::from_str(input).expect("decode scene");

    assert_eq!(scene.name, "demo");
    assert!(scene.shapes[0].is::<Circle>());
    assert!(scene.shapes[1].is::<Square>());

    let encoded = serde_json::to_value(&scene).expect("encode scene");
    let original: Value = serde_json::from_str(input).expect("parse input");
    assert_eq!(encoded, original);
}

#[test]
fn nested_field_errors_surface_through_serde() {
    setup();
    let input = r#"{"name": "bad", "shapes": [{"Type": "triangle"}]}"#;
    let err = serde_json::from_str::<Scene>(input).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("unsupported-type"));
    assert!(text.contains("triangle"));
}

#[test]
fn registered_types_may_hold_polytypes() {
    setup();
    let payload = json!({
        "Type": "group",
        "members": [
            {"Type": "circle", "radius": 0.5},
            {"Type": "group", "members": [{"Type": "square", "side": 1.0}]}
        ]
    });
    let bytes = serde_json::to_vec(&payload).expect("encode payload");

    let poly = Polytype::from_slice(&bytes).expect("decode group");
    let group = poly.downcast_ref::<Group>().expect("group value");
    assert_eq!(group.members.len(), 2);
    assert!(group.members[0].is::<Circle>());
    let inner = group.members[1].downcast_ref::<Group>().expect("inner group");
    assert!(inner.members[0].is::<Square>());

    let round_trip: Value = serde_json::from_slice(&poly.encode().expect("encode")).unwrap();
    assert_eq!(round_trip, payload);
}

#[test]
fn concurrent_decodes_share_registry() {
    setup();
    thread::scope(|scope| {
        for worker in 0..8 {
            scope.spawn(move || {
                for round in 0..50 {
                    let radius = f64::from(worker * 100 + round);
                    let input = format!(r#"{{"Type":"circle","radius":{radius}}}"#);
                    let poly = Polytype::from_slice(input.as_bytes()).expect("decode circle");
                    assert_eq!(poly.downcast_ref::<Circle>().map(|c| c.radius), Some(radius));
                }
            });
        }
    });
}

#[test]
fn process_registry_answers_lookups() {
    setup();
    assert!(registry::contains("circle"));
    assert!(!registry::contains("triangle"));

    let factory = registry::lookup("square").expect("square factory");
    assert!(factory.type_name().ends_with("Square"));
    let fresh = factory.construct();
    assert_eq!(fresh.downcast_ref::<Square>().map(|s| s.side), Some(0.0));

    let names = registry::names();
    for expected in ["circle", "group", "square"] {
        assert!(names.iter().any(|name| name == expected));
    }
}

#[test]
#[should_panic(expected = "type \"duplicate-check\" has already been registered")]
fn duplicate_process_registration_panics() {
    setup();
    registry::register_default::<Group>("duplicate-check");
    registry::register_default::<Group>("duplicate-check");
}

#[test]
fn registry_survives_duplicate_registration_panic() {
    setup();
    let outcome = std::panic::catch_unwind(|| {
        registry::register_default::<Group>("recovery-check");
        registry::register_default::<Group>("recovery-check");
    });
    assert!(outcome.is_err());
    assert!(registry::contains("recovery-check"));
    assert!(Polytype::from_slice(br#"{"Type":"recovery-check","members":[]}"#).is_ok());
}
