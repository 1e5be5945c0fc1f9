use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use graphpack::{
    concrete, concrete_mut, downcast_mut, downcast_ref, obj, same_object, AssetCodec,
    AssetResolver, CodecRegistry, DeserializeError, Engine, MemberError, MemberSchema, ObjRef,
    Persist, SchemaRegistry, SerializeError, StaticMemberSchema, TypeDesc, TypeSchema, Value,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

macro_rules! impl_persist {
    ($ty:ident, $name:literal) => {
        impl Persist for $ty {
            fn schema_name(&self) -> &'static str {
                $name
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

#[derive(Default)]
struct Node {
    name: String,
    next: Option<ObjRef>,
    weight: f32,
}
impl_persist!(Node, "Node");

fn node_schema() -> TypeSchema {
    TypeSchema::reference("Node")
        .constructor(|| obj(Node::default()))
        .member(MemberSchema::field(
            "name",
            TypeDesc::named("str"),
            |p| Ok(Value::Str(concrete::<Node>(p)?.name.clone())),
            |p, v| match v {
                Value::Str(s) => {
                    concrete_mut::<Node>(p)?.name = s;
                    Ok(())
                }
                other => Err(MemberError::expected("str", other.kind_name())),
            },
        ))
        .member(MemberSchema::field(
            "next",
            TypeDesc::named("Node"),
            |p| Ok(Value::from(concrete::<Node>(p)?.next.clone())),
            |p, v| {
                concrete_mut::<Node>(p)?.next = match v {
                    Value::Null => None,
                    Value::Object(o) => Some(o),
                    other => return Err(MemberError::expected("object", other.kind_name())),
                };
                Ok(())
            },
        ))
        .member(MemberSchema::field(
            "weight",
            TypeDesc::named("f32"),
            |p| Ok(Value::F32(concrete::<Node>(p)?.weight)),
            |p, v| {
                concrete_mut::<Node>(p)?.weight = v
                    .as_f32()
                    .ok_or_else(|| MemberError::expected("f32", v.kind_name()))?;
                Ok(())
            },
        ))
}

#[derive(Default)]
struct Entity {
    id: i32,
}
impl_persist!(Entity, "Entity");

#[derive(Default)]
struct Player {
    base: Entity,
    health: f32,
}
impl_persist!(Player, "Player");

// Base accessors must work on every type in the chain.
fn entity_id_get(p: &dyn Persist) -> Result<Value, MemberError> {
    if let Ok(e) = concrete::<Entity>(p) {
        return Ok(Value::I32(e.id));
    }
    Ok(Value::I32(concrete::<Player>(p)?.base.id))
}

fn entity_id_set(p: &mut dyn Persist, v: Value) -> Result<(), MemberError> {
    let id = v
        .as_i32()
        .ok_or_else(|| MemberError::expected("i32", v.kind_name()))?;
    if let Ok(e) = concrete_mut::<Entity>(p) {
        e.id = id;
        return Ok(());
    }
    concrete_mut::<Player>(p)?.base.id = id;
    Ok(())
}

fn entity_schema() -> TypeSchema {
    TypeSchema::reference("Entity")
        .constructor(|| obj(Entity::default()))
        .member(MemberSchema::field(
            "id",
            TypeDesc::named("i32"),
            entity_id_get,
            entity_id_set,
        ))
}

fn player_schema() -> TypeSchema {
    TypeSchema::reference("Player")
        .extends("Entity")
        .constructor(|| obj(Player::default()))
        .member(MemberSchema::field(
            "health",
            TypeDesc::named("f32"),
            |p| Ok(Value::F32(concrete::<Player>(p)?.health)),
            |p, v| {
                concrete_mut::<Player>(p)?.health = v
                    .as_f32()
                    .ok_or_else(|| MemberError::expected("f32", v.kind_name()))?;
                Ok(())
            },
        ))
}

#[derive(Default)]
struct Config {
    kept: i32,
    secret: i32,
}
impl_persist!(Config, "Config");

fn config_schema() -> TypeSchema {
    TypeSchema::reference("Config")
        .opt_in()
        .constructor(|| obj(Config::default()))
        .member(
            MemberSchema::property(
                "kept",
                TypeDesc::named("i32"),
                |p| Ok(Value::I32(concrete::<Config>(p)?.kept)),
                |p, v| {
                    concrete_mut::<Config>(p)?.kept = v
                        .as_i32()
                        .ok_or_else(|| MemberError::expected("i32", v.kind_name()))?;
                    Ok(())
                },
            )
            .marked(),
        )
        .member(MemberSchema::field(
            "secret",
            TypeDesc::named("i32"),
            |p| Ok(Value::I32(concrete::<Config>(p)?.secret)),
            |p, v| {
                concrete_mut::<Config>(p)?.secret = v
                    .as_i32()
                    .ok_or_else(|| MemberError::expected("i32", v.kind_name()))?;
                Ok(())
            },
        ))
        // Reading a transient member would fail the whole serialize call;
        // the policy must never get that far.
        .member(
            MemberSchema::field(
                "on_change",
                TypeDesc::any(),
                |_| Err(MemberError::new("transient member must never be read")),
                |_, _| Ok(()),
            )
            .callback(),
        )
}

#[derive(Default)]
struct Particle {
    tag: Value,
}
impl_persist!(Particle, "Particle");

fn particle_schema() -> TypeSchema {
    TypeSchema::reference("Particle")
        .constructor(|| obj(Particle::default()))
        .member(MemberSchema::field(
            "tag",
            TypeDesc::any(),
            |p| Ok(concrete::<Particle>(p)?.tag.clone()),
            |p, v| {
                concrete_mut::<Particle>(p)?.tag = v;
                Ok(())
            },
        ))
}

#[derive(Default)]
struct Swatch {
    color: Value,
    after: i32,
}
impl_persist!(Swatch, "Swatch");

fn swatch_schema() -> TypeSchema {
    TypeSchema::reference("Swatch")
        .constructor(|| obj(Swatch::default()))
        .member(MemberSchema::field(
            "color",
            TypeDesc::named("Color"),
            |p| Ok(concrete::<Swatch>(p)?.color.clone()),
            |p, v| {
                concrete_mut::<Swatch>(p)?.color = v;
                Ok(())
            },
        ))
        .member(MemberSchema::field(
            "after",
            TypeDesc::named("i32"),
            |p| Ok(Value::I32(concrete::<Swatch>(p)?.after)),
            |p, v| {
                concrete_mut::<Swatch>(p)?.after = v
                    .as_i32()
                    .ok_or_else(|| MemberError::expected("i32", v.kind_name()))?;
                Ok(())
            },
        ))
}

#[derive(Default)]
struct Widget {
    width: i32,
    label: String,
    ratio: f64,
}
impl_persist!(Widget, "Widget");

// Default policy: the three plain fields persist, the delegate does not.
fn widget_schema() -> TypeSchema {
    TypeSchema::reference("Widget")
        .constructor(|| obj(Widget::default()))
        .member(MemberSchema::field(
            "width",
            TypeDesc::named("i32"),
            |p| Ok(Value::I32(concrete::<Widget>(p)?.width)),
            |p, v| {
                concrete_mut::<Widget>(p)?.width = v
                    .as_i32()
                    .ok_or_else(|| MemberError::expected("i32", v.kind_name()))?;
                Ok(())
            },
        ))
        .member(MemberSchema::field(
            "label",
            TypeDesc::named("str"),
            |p| Ok(Value::Str(concrete::<Widget>(p)?.label.clone())),
            |p, v| match v {
                Value::Str(s) => {
                    concrete_mut::<Widget>(p)?.label = s;
                    Ok(())
                }
                other => Err(MemberError::expected("str", other.kind_name())),
            },
        ))
        .member(MemberSchema::field(
            "ratio",
            TypeDesc::named("f64"),
            |p| Ok(Value::F64(concrete::<Widget>(p)?.ratio)),
            |p, v| match v {
                Value::F64(r) => {
                    concrete_mut::<Widget>(p)?.ratio = r;
                    Ok(())
                }
                other => Err(MemberError::expected("f64", other.kind_name())),
            },
        ))
        .member(
            MemberSchema::field(
                "on_click",
                TypeDesc::any(),
                |_| Err(MemberError::new("delegate member must never be read")),
                |_, _| Ok(()),
            )
            .callback(),
        )
}

thread_local! {
    static WORLD_SEED: Cell<i64> = Cell::new(0);
}

struct Universe;
impl_persist!(Universe, "Universe");

fn universe_schema() -> TypeSchema {
    TypeSchema::reference("Universe")
        .constructor(|| obj(Universe))
        .static_member(StaticMemberSchema::field(
            "seed",
            TypeDesc::named("i64"),
            || Ok(Value::I64(WORLD_SEED.with(|s| s.get()))),
            |v| match v {
                Value::I64(seed) => {
                    WORLD_SEED.with(|s| s.set(seed));
                    Ok(())
                }
                other => Err(MemberError::expected("i64", other.kind_name())),
            },
        ))
}

// Reference type with no zero-argument constructor: decodes as null.
struct Opaque;
impl_persist!(Opaque, "Opaque");

fn standard_schemas() -> SchemaRegistry {
    let mut schemas = SchemaRegistry::new();
    for schema in [
        node_schema(),
        entity_schema(),
        player_schema(),
        config_schema(),
        particle_schema(),
        universe_schema(),
        swatch_schema(),
        widget_schema(),
        TypeSchema::reference("Opaque"),
        TypeSchema::value("Vec2"),
        TypeSchema::value("Rect"),
        TypeSchema::value("Owned"),
        TypeSchema::enumeration("Color"),
    ] {
        schemas.add(schema).unwrap();
    }
    schemas
}

fn standard_engine() -> Engine {
    Engine::new(standard_schemas()).unwrap()
}

fn roundtrip(engine: &Engine, root: &Value) -> Value {
    let bytes = engine.serialize(root).unwrap();
    engine.deserialize(&bytes).unwrap()
}

fn vec2(x: f32, y: f32) -> Value {
    Value::record("Vec2", vec![("x", Value::F32(x)), ("y", Value::F32(y))])
}

// ---------------------------------------------------------------------------
// Identity and cycles
// ---------------------------------------------------------------------------

#[test]
fn cycle_of_two_nodes_roundtrips() {
    init_logging();
    let engine = standard_engine();

    let a = obj(Node {
        name: "a".into(),
        ..Node::default()
    });
    let b = obj(Node {
        name: "b".into(),
        weight: 1.5,
        ..Node::default()
    });
    downcast_mut::<Node>(&a).unwrap().next = Some(b.clone());
    downcast_mut::<Node>(&b).unwrap().next = Some(a.clone());

    let out = roundtrip(&engine, &Value::Object(a));
    let a2 = out.as_object().unwrap();

    let b2 = downcast_ref::<Node>(a2).unwrap().next.clone().unwrap();
    assert_eq!(downcast_ref::<Node>(&b2).unwrap().name, "b");
    assert_eq!(downcast_ref::<Node>(&b2).unwrap().weight, 1.5);

    // Following the cycle lands back on the same allocation.
    let back = downcast_ref::<Node>(&b2).unwrap().next.clone().unwrap();
    assert!(same_object(a2, &back));
}

#[test]
fn self_referential_node() {
    init_logging();
    let engine = standard_engine();

    let n = obj(Node {
        name: "loop".into(),
        ..Node::default()
    });
    downcast_mut::<Node>(&n).unwrap().next = Some(n.clone());

    let out = roundtrip(&engine, &Value::Object(n));
    let n2 = out.as_object().unwrap();
    let next = downcast_ref::<Node>(n2).unwrap().next.clone().unwrap();
    assert!(same_object(n2, &next));
}

#[test]
fn shared_target_decodes_to_single_object() {
    init_logging();
    let engine = standard_engine();

    let leaf = obj(Node {
        name: "leaf".into(),
        ..Node::default()
    });
    let left = obj(Node {
        name: "left".into(),
        next: Some(leaf.clone()),
        ..Node::default()
    });
    let right = obj(Node {
        name: "right".into(),
        next: Some(leaf.clone()),
        ..Node::default()
    });

    let out = roundtrip(
        &engine,
        &Value::list(vec![Value::Object(left), Value::Object(right)]),
    );
    let items = out.as_list().unwrap().borrow().clone();
    assert_eq!(items.len(), 2);

    let leaf_a = downcast_ref::<Node>(items[0].as_object().unwrap())
        .unwrap()
        .next
        .clone()
        .unwrap();
    let leaf_b = downcast_ref::<Node>(items[1].as_object().unwrap())
        .unwrap()
        .next
        .clone()
        .unwrap();
    assert!(same_object(&leaf_a, &leaf_b));
    assert_eq!(downcast_ref::<Node>(&leaf_a).unwrap().name, "leaf");
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

#[test]
fn list_containing_itself() {
    init_logging();
    let engine = standard_engine();

    let l = Value::list(vec![Value::I32(1)]);
    if let Value::List(rc) = &l {
        let inner = l.clone();
        rc.borrow_mut().push(inner);
    }

    let out = roundtrip(&engine, &l);
    let outer = out.as_list().unwrap();
    let items = outer.borrow().clone();
    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Value::I32(1)));
    assert!(Rc::ptr_eq(outer, items[1].as_list().unwrap()));
}

#[test]
fn shared_sublist_keeps_identity() {
    init_logging();
    let engine = standard_engine();

    let shared = Value::list(vec![Value::Str("x".into())]);
    let out = roundtrip(&engine, &Value::list(vec![shared.clone(), shared]));

    let items = out.as_list().unwrap().borrow().clone();
    assert!(Rc::ptr_eq(
        items[0].as_list().unwrap(),
        items[1].as_list().unwrap()
    ));
}

#[test]
fn map_preserves_order_and_shared_values() {
    init_logging();
    let engine = standard_engine();

    let hero = obj(Node {
        name: "hero".into(),
        ..Node::default()
    });
    let m = Value::map(vec![
        (Value::Str("first".into()), Value::Object(hero.clone())),
        (Value::Str("second".into()), Value::Object(hero)),
        (Value::Str("third".into()), Value::I32(3)),
    ]);

    let out = roundtrip(&engine, &m);
    let pairs = out.as_map().unwrap().borrow().clone();
    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0].0.as_str(), Some("first"));
    assert_eq!(pairs[1].0.as_str(), Some("second"));
    assert_eq!(pairs[2].0.as_str(), Some("third"));
    assert!(same_object(
        pairs[0].1.as_object().unwrap(),
        pairs[1].1.as_object().unwrap()
    ));
}

#[test]
fn map_containing_itself_never_settles() {
    init_logging();
    let engine = standard_engine();

    let m = Value::map(vec![]);
    if let Value::Map(rc) = &m {
        let inner = m.clone();
        rc.borrow_mut().push((Value::Str("self".into()), inner));
    }

    let bytes = engine.serialize(&m).unwrap();
    assert!(matches!(
        engine.deserialize(&bytes),
        Err(DeserializeError::UnsettledRoot)
    ));
}

// ---------------------------------------------------------------------------
// Polymorphism and inclusion policies
// ---------------------------------------------------------------------------

#[test]
fn polymorphic_value_restores_concrete_type() {
    init_logging();
    let engine = standard_engine();

    let p = obj(Player {
        base: Entity { id: 7 },
        health: 3.5,
    });
    // Slot declared as the base type; the wire records the runtime type.
    let holder = obj(Node {
        name: "holder".into(),
        next: Some(p),
        ..Node::default()
    });

    let out = roundtrip(&engine, &Value::Object(holder));
    let decoded = downcast_ref::<Node>(out.as_object().unwrap())
        .unwrap()
        .next
        .clone()
        .unwrap();

    let player = downcast_ref::<Player>(&decoded).unwrap();
    assert_eq!(player.base.id, 7);
    assert_eq!(player.health, 3.5);
}

#[test]
fn opt_in_policy_drops_unmarked_members() {
    init_logging();
    let engine = standard_engine();

    let c = obj(Config {
        kept: 11,
        secret: 99,
    });
    let out = roundtrip(&engine, &Value::Object(c));
    let decoded = out.as_object().unwrap().clone();

    let config = downcast_ref::<Config>(&decoded).unwrap();
    assert_eq!(config.kept, 11);
    // Never written, so the constructor default survives.
    assert_eq!(config.secret, 0);
}

#[test]
fn default_policy_persists_plain_fields_and_skips_delegates() {
    init_logging();
    let engine = standard_engine();

    // If the delegate member were walked, its getter would fail the whole
    // serialize call.
    let w = obj(Widget {
        width: 640,
        label: "panel".into(),
        ratio: 1.75,
    });
    let out = roundtrip(&engine, &Value::Object(w));

    let widget = downcast_ref::<Widget>(out.as_object().unwrap()).unwrap();
    assert_eq!(widget.width, 640);
    assert_eq!(widget.label, "panel");
    assert_eq!(widget.ratio, 1.75);
}

// ---------------------------------------------------------------------------
// Value-typed records
// ---------------------------------------------------------------------------

#[test]
fn nested_records_roundtrip() {
    init_logging();
    let engine = standard_engine();

    let p = obj(Particle::default());
    downcast_mut::<Particle>(&p).unwrap().tag = Value::record(
        "Rect",
        vec![("min", vec2(0.0, 1.0)), ("max", vec2(2.0, 3.0))],
    );

    let out = roundtrip(&engine, &Value::Object(p));
    let tag = downcast_ref::<Particle>(out.as_object().unwrap())
        .unwrap()
        .tag
        .clone();

    match tag {
        Value::Record { ty, fields } => {
            assert_eq!(ty, "Rect");
            assert_eq!(fields.len(), 2);
            match &fields[1] {
                (name, Value::Record { ty, fields }) => {
                    assert_eq!(name, "max");
                    assert_eq!(ty, "Vec2");
                    assert_eq!(fields[1].1.as_f32(), Some(3.0));
                }
                other => panic!("unexpected field {other:?}"),
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn record_holding_cyclic_owner_patches_in() {
    init_logging();
    let engine = standard_engine();

    // The back-reference to the particle sits two records deep, so the
    // write-back has to cascade: inner record completes when the particle
    // settles, which completes the outer record, which lands in the slot.
    let p = obj(Particle::default());
    downcast_mut::<Particle>(&p).unwrap().tag = Value::record(
        "Rect",
        vec![
            ("origin", vec2(1.0, 2.0)),
            (
                "inner",
                Value::record("Owned", vec![("owner", Value::Object(p.clone()))]),
            ),
        ],
    );

    let out = roundtrip(&engine, &Value::Object(p));
    let decoded = out.as_object().unwrap().clone();
    let tag = downcast_ref::<Particle>(&decoded).unwrap().tag.clone();

    let (ty, fields) = match tag {
        Value::Record { ty, fields } => (ty, fields),
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(ty, "Rect");
    match &fields[0].1 {
        Value::Record { fields, .. } => assert_eq!(fields[1].1.as_f32(), Some(2.0)),
        other => panic!("unexpected origin {other:?}"),
    }
    match &fields[1].1 {
        Value::Record { ty, fields } => {
            assert_eq!(ty, "Owned");
            match &fields[0].1 {
                Value::Object(owner) => assert!(same_object(owner, &decoded)),
                other => panic!("unexpected owner {other:?}"),
            }
        }
        other => panic!("unexpected inner {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Statics, type values, enums
// ---------------------------------------------------------------------------

#[test]
fn static_members_travel_with_the_type() {
    init_logging();
    let engine = standard_engine();

    WORLD_SEED.with(|s| s.set(42));
    let bytes = engine.serialize(&Value::Object(obj(Universe))).unwrap();

    WORLD_SEED.with(|s| s.set(0));
    let out = engine.deserialize(&bytes).unwrap();
    assert!(out.as_object().is_some());
    assert_eq!(WORLD_SEED.with(|s| s.get()), 42);
}

#[test]
fn type_as_value_roundtrips() {
    init_logging();
    let engine = standard_engine();

    let td = TypeDesc::generic("map", vec![TypeDesc::named("str"), TypeDesc::named("Node")]);
    let out = roundtrip(&engine, &Value::TypeRef(td.clone()));
    match out {
        Value::TypeRef(decoded) => assert_eq!(decoded, td),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn enum_roundtrips_as_raw_value() {
    init_logging();
    let engine = standard_engine();

    let out = roundtrip(
        &engine,
        &Value::Enum {
            ty: "Color".into(),
            raw: -2,
        },
    );
    match out {
        Value::Enum { ty, raw } => {
            assert_eq!(ty, "Color");
            assert_eq!(raw, -2);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn null_enum_member_keeps_stream_aligned() {
    init_logging();
    let engine = standard_engine();

    // Enum bodies carry no tag byte, so a null in an enum-declared slot
    // must not record the enum type. The trailing member catches any
    // misalignment.
    let s = obj(Swatch {
        color: Value::Null,
        after: 77,
    });
    let out = roundtrip(&engine, &Value::Object(s));
    let swatch = downcast_ref::<Swatch>(out.as_object().unwrap()).unwrap();
    assert!(swatch.color.is_null());
    assert_eq!(swatch.after, 77);
}

#[test]
fn enum_member_roundtrips_alongside_null() {
    init_logging();
    let engine = standard_engine();

    let s = obj(Swatch {
        color: Value::Enum {
            ty: "Color".into(),
            raw: 3,
        },
        after: 8,
    });
    let out = roundtrip(&engine, &Value::Object(s));
    let swatch = downcast_ref::<Swatch>(out.as_object().unwrap()).unwrap();
    match &swatch.color {
        Value::Enum { ty, raw } => {
            assert_eq!(ty, "Color");
            assert_eq!(*raw, 3);
        }
        other => panic!("unexpected color {other:?}"),
    }
    assert_eq!(swatch.after, 8);
}

#[test]
fn decimal_roundtrips() {
    init_logging();
    let engine = standard_engine();

    // 1.9999 exactly
    let out = roundtrip(
        &engine,
        &Value::Decimal {
            mantissa: 19999,
            scale: 4,
        },
    );
    assert!(matches!(
        out,
        Value::Decimal {
            mantissa: 19999,
            scale: 4
        }
    ));
}

#[test]
fn member_handle_roundtrips() {
    init_logging();
    let engine = standard_engine();

    let out = roundtrip(
        &engine,
        &Value::Member {
            declaring: "Node".into(),
            name: "weight".into(),
            is_static: false,
        },
    );
    match out {
        Value::Member {
            declaring,
            name,
            is_static,
        } => {
            assert_eq!(declaring, "Node");
            assert_eq!(name, "weight");
            assert!(!is_static);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn stale_member_handle_is_fatal() {
    init_logging();
    let engine = standard_engine();

    let bytes = engine
        .serialize(&Value::Member {
            declaring: "Node".into(),
            name: "renamed_away".into(),
            is_static: false,
        })
        .unwrap();
    assert!(matches!(
        engine.deserialize(&bytes),
        Err(DeserializeError::UnknownMember { ty, member })
            if ty == "Node" && member == "renamed_away"
    ));
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn registered_object_bypasses_structural_encoding() {
    init_logging();
    let mut engine = standard_engine();

    let shared = obj(Node {
        name: "registered".into(),
        ..Node::default()
    });
    engine.register(shared.clone());

    let holder = obj(Node {
        name: "holder".into(),
        next: Some(shared.clone()),
        ..Node::default()
    });
    let bytes = engine.serialize(&Value::Object(holder)).unwrap();

    // Mutating after the write proves decode returns the live object,
    // not a reconstruction.
    downcast_mut::<Node>(&shared).unwrap().weight = 5.0;

    let out = engine.deserialize(&bytes).unwrap();
    let next = downcast_ref::<Node>(out.as_object().unwrap())
        .unwrap()
        .next
        .clone()
        .unwrap();
    assert!(same_object(&next, &shared));
    assert_eq!(downcast_ref::<Node>(&next).unwrap().weight, 5.0);
}

#[test]
fn cleared_registration_breaks_old_streams() {
    init_logging();
    let mut engine = standard_engine();

    let shared = obj(Node::default());
    engine.register(shared.clone());
    let bytes = engine.serialize(&Value::Object(shared)).unwrap();

    engine.clear_registrations();
    assert!(matches!(
        engine.deserialize(&bytes),
        Err(DeserializeError::UnknownRegistration(_))
    ));
}

#[test]
fn registered_type_roundtrips() {
    init_logging();
    let mut engine = standard_engine();
    engine.register_type(TypeDesc::named("Node"));

    let n = obj(Node {
        name: "n".into(),
        ..Node::default()
    });
    let out = roundtrip(&engine, &Value::Object(n));
    assert_eq!(
        downcast_ref::<Node>(out.as_object().unwrap()).unwrap().name,
        "n"
    );
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

struct Texture {
    path: String,
}
impl_persist!(Texture, "Texture");

/// Stand-in for an asset database: a fixed path -> instance table.
struct StubAssets {
    files: RefCell<HashMap<String, ObjRef>>,
}

impl StubAssets {
    fn with_file(path: &str) -> Self {
        let mut files = HashMap::new();
        files.insert(
            path.to_owned(),
            obj(Texture {
                path: path.to_owned(),
            }),
        );
        Self {
            files: RefCell::new(files),
        }
    }
}

impl AssetResolver for StubAssets {
    fn locate(&self, asset: &ObjRef) -> Option<String> {
        downcast_ref::<Texture>(asset).map(|t| t.path.clone())
    }

    fn resolve(&self, path: &str) -> Option<ObjRef> {
        self.files.borrow().get(path).cloned()
    }
}

fn asset_engine(resolver: StubAssets) -> Engine {
    let mut codecs = CodecRegistry::with_builtins();
    codecs
        .add(Box::new(AssetCodec::new("Texture", Box::new(resolver))))
        .unwrap();
    Engine::with_codecs(standard_schemas(), codecs).unwrap()
}

#[test]
fn asset_encodes_as_path_only() {
    init_logging();
    let engine = asset_engine(StubAssets::with_file("textures/stone.png"));

    let tex = obj(Texture {
        path: "textures/stone.png".into(),
    });
    let out = roundtrip(&engine, &Value::Object(tex));
    let decoded = out.as_object().unwrap();
    assert_eq!(
        downcast_ref::<Texture>(decoded).unwrap().path,
        "textures/stone.png"
    );
}

#[test]
fn missing_asset_is_fatal() {
    init_logging();
    let writer = asset_engine(StubAssets::with_file("textures/stone.png"));
    let reader = asset_engine(StubAssets {
        files: RefCell::new(HashMap::new()),
    });

    let tex = obj(Texture {
        path: "textures/stone.png".into(),
    });
    let bytes = writer.serialize(&Value::Object(tex)).unwrap();
    assert!(matches!(
        reader.deserialize(&bytes),
        Err(DeserializeError::AssetNotFound(path)) if path == "textures/stone.png"
    ));
}

// ---------------------------------------------------------------------------
// Degradation and errors
// ---------------------------------------------------------------------------

#[test]
fn missing_constructor_degrades_to_null() {
    init_logging();
    let engine = standard_engine();

    let holder = obj(Node {
        name: "holder".into(),
        next: Some(obj(Opaque)),
        weight: 2.0,
    });
    let out = roundtrip(&engine, &Value::Object(holder));

    // The unconstructable target is dropped; the rest of the graph is intact.
    let node = downcast_ref::<Node>(out.as_object().unwrap()).unwrap();
    assert!(node.next.is_none());
    assert_eq!(node.name, "holder");
    assert_eq!(node.weight, 2.0);
}

#[test]
fn unknown_member_is_skipped() {
    init_logging();

    // The writer's schema has a member the reader no longer declares.
    let writer = {
        let mut schemas = SchemaRegistry::new();
        schemas
            .add(node_schema().member(MemberSchema::field(
                "legacy",
                TypeDesc::named("i32"),
                |_| Ok(Value::I32(9)),
                |_, _| Ok(()),
            )))
            .unwrap();
        Engine::new(schemas).unwrap()
    };
    let reader = {
        let mut schemas = SchemaRegistry::new();
        schemas.add(node_schema()).unwrap();
        Engine::new(schemas).unwrap()
    };

    let n = obj(Node {
        name: "survivor".into(),
        weight: 4.0,
        ..Node::default()
    });
    let bytes = writer.serialize(&Value::Object(n)).unwrap();
    let out = reader.deserialize(&bytes).unwrap();

    let node = downcast_ref::<Node>(out.as_object().unwrap()).unwrap();
    assert_eq!(node.name, "survivor");
    assert_eq!(node.weight, 4.0);
}

#[test]
fn unregistered_object_fails_serialize() {
    init_logging();

    struct Ghost;
    impl_persist!(Ghost, "Ghost");

    let engine = standard_engine();
    assert!(matches!(
        engine.serialize(&Value::Object(obj(Ghost))),
        Err(SerializeError::UnknownType(name)) if name == "Ghost"
    ));
}

#[test]
fn truncated_graph_is_eof() {
    init_logging();
    let engine = standard_engine();

    let n = obj(Node {
        name: "truncate-me".into(),
        ..Node::default()
    });
    let bytes = engine.serialize(&Value::Object(n)).unwrap();
    assert!(matches!(
        engine.deserialize(&bytes[..bytes.len() / 2]),
        Err(DeserializeError::UnexpectedEof)
    ));
}
