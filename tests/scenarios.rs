//! Scenario tests S1-S6 (spec.md §8 "Concrete scenarios"), each driven
//! end-to-end through the public `StorageManager`/`TypeRegistry` API rather
//! than individual module internals.

use std::sync::Arc;

use tempfile::tempdir;
use typed_store::primitive::{PrimitiveKind, PrimitiveValue};
use typed_store::record::{FieldValue, Record};
use typed_store::registry::TypeRegistry;
use typed_store::storage::StorageManager;
use typed_store::types::{ArrayKind, ArrayTypeDef, CompositeTypeDef, EnumVariant, Field, InterfaceTypeDef, TypeDef};

fn string_elements(s: &str) -> Vec<Vec<u8>> {
  s.chars()
    .map(|c| typed_store::primitive::encode(&PrimitiveValue::Character(c), PrimitiveKind::Character, None).unwrap())
    .collect()
}

fn insert_string(mgr: &mut StorageManager, s: &str) -> FieldValue {
  let (start, length) = mgr.get_array_table("string").unwrap().insert(&string_elements(s)).unwrap();
  FieldValue::ArrayRef { start, length }
}

/// S1 *Simple composite round-trip*.
#[test]
fn s1_simple_composite_round_trip() {
  let dir = tempdir().unwrap();
  let registry = TypeRegistry::new();
  let person = Arc::new(CompositeTypeDef::stub("Person"));
  person.populate(
    vec![Field::new("name", registry.get("string").unwrap()), Field::new("age", TypeDef::Primitive(PrimitiveKind::Uint8))],
    vec![],
    None,
  );
  registry.register(TypeDef::Composite(person)).unwrap();

  let mut mgr = StorageManager::new(dir.path(), registry).unwrap();

  let mut alice = Record::new();
  alice.insert("name".to_string(), insert_string(&mut mgr, "Alice"));
  alice.insert("age".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(30)));
  let i0 = mgr.insert("Person", &alice).unwrap();

  let mut bob = Record::new();
  bob.insert("name".to_string(), insert_string(&mut mgr, "Bob"));
  bob.insert("age".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(25)));
  let i1 = mgr.insert("Person", &bob).unwrap();

  assert_eq!(i0, 0);
  assert_eq!(i1, 1);
  assert_eq!(mgr.count("Person").unwrap(), 2);
  assert!(!mgr.is_deleted("Person", 0).unwrap());

  let fetched = mgr.get("Person", 0).unwrap();
  assert_eq!(fetched.get("age"), Some(&FieldValue::Primitive(PrimitiveValue::UInt(30))));
}

/// S2 *Soft delete + compact*.
#[test]
fn s2_soft_delete_then_compact() {
  let base = tempdir().unwrap();
  let src_dir = base.path().join("src");
  let dst_dir = base.path().join("dst");

  let registry = TypeRegistry::new();
  let person = Arc::new(CompositeTypeDef::stub("Person"));
  person.populate(
    vec![Field::new("name", registry.get("string").unwrap()), Field::new("age", TypeDef::Primitive(PrimitiveKind::Uint8))],
    vec![],
    None,
  );
  registry.register(TypeDef::Composite(person)).unwrap();

  let mut mgr = StorageManager::new(&src_dir, registry).unwrap();
  let mut alice = Record::new();
  alice.insert("name".to_string(), insert_string(&mut mgr, "Alice"));
  alice.insert("age".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(30)));
  mgr.insert("Person", &alice).unwrap();

  let mut bob = Record::new();
  bob.insert("name".to_string(), insert_string(&mut mgr, "Bob"));
  bob.insert("age".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(25)));
  mgr.insert("Person", &bob).unwrap();

  mgr.delete("Person", 0).unwrap();
  assert!(mgr.is_deleted("Person", 0).unwrap());
  assert_eq!(mgr.count("Person").unwrap(), 2);
  drop(mgr);

  typed_store::compact::compact(&src_dir, &dst_dir).unwrap();

  let mut dst = StorageManager::open(&dst_dir).unwrap();
  assert_eq!(dst.count("Person").unwrap(), 1);
  assert_eq!(dst.get("Person", 0).unwrap().get("age"), Some(&FieldValue::Primitive(PrimitiveValue::UInt(25))));
}

/// S3 *Cyclic composites*.
#[test]
fn s3_cyclic_composites() {
  let dir = tempdir().unwrap();
  let registry = TypeRegistry::new();
  let node = registry.register_stub("Node").unwrap();
  registry
    .populate_composite(
      "Node",
      vec![Field::new("value", TypeDef::Primitive(PrimitiveKind::Uint8)), Field::new("next", TypeDef::Composite(node.clone()))],
      vec![],
      None,
    )
    .unwrap();
  assert_eq!(node.size_bytes(), 1 + 1 + 4);

  let mut mgr = StorageManager::new(dir.path(), registry).unwrap();

  let mut n0 = Record::new();
  n0.insert("value".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(1)));
  n0.insert("next".to_string(), FieldValue::Null);
  let i0 = mgr.insert("Node", &n0).unwrap();

  let mut n1 = Record::new();
  n1.insert("value".to_string(), FieldValue::Primitive(PrimitiveValue::UInt(2)));
  n1.insert("next".to_string(), FieldValue::CompositeRef(i0 as u32));
  let i1 = mgr.insert("Node", &n1).unwrap();

  assert_eq!(i0, 0);
  assert_eq!(i1, 1);
  assert_eq!(mgr.get("Node", 1).unwrap().get("next"), Some(&FieldValue::CompositeRef(0)));
  assert_eq!(mgr.get("Node", 0).unwrap().get("next"), Some(&FieldValue::Null));
}

/// S4 *Interface polymorphism*.
#[test]
fn s4_interface_polymorphism() {
  let base = tempdir().unwrap();
  let src_dir = base.path().join("src");
  let dst_dir = base.path().join("dst");

  let registry = TypeRegistry::new();
  let animal = Arc::new(InterfaceTypeDef::stub("Animal"));
  animal.populate(vec![Field::new("name", registry.get("string").unwrap())], vec![]);
  registry.register(TypeDef::Interface(animal)).unwrap();

  registry.register_stub("Dog").unwrap();
  registry
    .populate_composite("Dog", vec![Field::new("breed", registry.get("string").unwrap())], vec!["Animal".to_string()], None)
    .unwrap();

  registry.register_stub("Shelter").unwrap();
  registry
    .populate_composite(
      "Shelter",
      vec![Field::new("resident", registry.get_or_raise("Animal").unwrap())],
      vec![],
      None,
    )
    .unwrap();

  let k = registry.get_type_id("Dog");
  assert!(k >= 1);

  let mut mgr = StorageManager::new(&src_dir, registry).unwrap();

  let mut rex = Record::new();
  rex.insert("name".to_string(), insert_string(&mut mgr, "Rex"));
  rex.insert("breed".to_string(), insert_string(&mut mgr, "Lab"));
  let dog_index = mgr.insert("Dog", &rex).unwrap();
  assert_eq!(dog_index, 0);

  let mut shelter = Record::new();
  shelter.insert("resident".to_string(), FieldValue::InterfaceRef { type_id: k, index: dog_index as u32 });
  mgr.insert("Shelter", &shelter).unwrap();

  let fetched = mgr.get("Shelter", 0).unwrap();
  assert_eq!(fetched.get("resident"), Some(&FieldValue::InterfaceRef { type_id: k, index: 0 }));
  drop(mgr);

  typed_store::compact::compact(&src_dir, &dst_dir).unwrap();
  let mut dst = StorageManager::open(&dst_dir).unwrap();
  assert_eq!(dst.get("Shelter", 0).unwrap().get("resident"), Some(&FieldValue::InterfaceRef { type_id: k, index: 0 }));
}

/// S5 *Tagged enum round-trip*.
#[test]
fn s5_tagged_enum_round_trip() {
  let dir = tempdir().unwrap();
  let registry = TypeRegistry::new();

  let shape = registry.register_enum_stub("Shape").unwrap();
  shape
    .populate(
      vec![
        EnumVariant { name: "none".to_string(), discriminant: 0, fields: vec![] },
        EnumVariant {
          name: "circle".to_string(),
          discriminant: 1,
          fields: vec![Field::new("r", TypeDef::Primitive(PrimitiveKind::Float32))],
        },
      ],
      false,
      None,
    )
    .unwrap();
  assert_eq!(shape.discriminant_size(), 1);
  assert_eq!(shape.size_bytes(), 5);
  assert!(shape.has_associated_values());

  registry.register_stub("Canvas").unwrap();
  registry
    .populate_composite("Canvas", vec![Field::new("bg", TypeDef::Enum(shape.clone()))], vec![], None)
    .unwrap();

  let mut mgr = StorageManager::new(dir.path(), registry).unwrap();

  let circle_variant = shape.get_variant("circle").unwrap();
  let mut payload = Record::new();
  payload.insert("r".to_string(), FieldValue::Primitive(PrimitiveValue::Float(10.0)));
  let payload_bytes = typed_store::record::encode_variant_record(&circle_variant, &payload).unwrap();
  let variant_index = mgr
    .get_variant_table("Shape", "circle", typed_store::record::variant_record_size(&circle_variant))
    .unwrap()
    .insert(&payload_bytes)
    .unwrap() as u32;

  let mut row = Record::new();
  row.insert(
    "bg".to_string(),
    FieldValue::Enum { discriminant: circle_variant.discriminant, variant_index: Some(variant_index) },
  );
  mgr.insert("Canvas", &row).unwrap();

  let fetched = mgr.get("Canvas", 0).unwrap();
  match fetched.get("bg") {
    Some(FieldValue::Enum { discriminant, variant_index: Some(vi) }) => {
      assert_eq!(*discriminant, 1);
      let bytes = mgr
        .get_variant_table("Shape", "circle", typed_store::record::variant_record_size(&circle_variant))
        .unwrap()
        .get(*vi as u64)
        .unwrap();
      let decoded = typed_store::record::decode_variant_record(&circle_variant, &bytes).unwrap();
      assert_eq!(decoded.get("r"), Some(&FieldValue::Primitive(PrimitiveValue::Float(10.0))));
    }
    other => panic!("unexpected enum field value: {:?}", other),
  }
}

/// S6 *Metadata cyclic load*.
#[test]
fn s6_metadata_cyclic_load() {
  let dir = tempdir().unwrap();
  let registry = TypeRegistry::new();
  let a = registry.register_stub("A").unwrap();
  let b = registry.register_stub("B").unwrap();
  a.populate(vec![Field::new("b", TypeDef::Composite(b.clone()))], vec![], None);
  b.populate(vec![Field::new("a", TypeDef::Composite(a.clone()))], vec![], None);
  typed_store::metadata::save(dir.path(), &registry).unwrap();

  let loaded = typed_store::metadata::load(dir.path()).unwrap();
  assert!(loaded.contains("A"));
  assert!(loaded.contains("B"));

  let a2 = match loaded.get("A").unwrap() {
    TypeDef::Composite(c) => c,
    _ => panic!("expected composite"),
  };
  assert_eq!(a2.get_field("b").unwrap().type_def.resolve_base_type().name(), "B");

  let b2 = match loaded.get("B").unwrap() {
    TypeDef::Composite(c) => c,
    _ => panic!("expected composite"),
  };
  assert_eq!(b2.get_field("a").unwrap().type_def.resolve_base_type().name(), "A");
}

/// Exercises the set-flavored array type end to end, supplementing S1-S6
/// with the dedup-on-insert semantics spec.md §4.F calls out.
#[test]
fn set_type_dedups_on_insert() {
  let dir = tempdir().unwrap();
  let registry = TypeRegistry::new();
  let tags = Arc::new(ArrayTypeDef::new("uint8{}", TypeDef::Primitive(PrimitiveKind::Uint8), ArrayKind::Set));
  registry.register(TypeDef::Array(tags)).unwrap();

  let mut mgr = StorageManager::new(dir.path(), registry).unwrap();
  let table = mgr.get_array_table("uint8{}").unwrap();
  let (start, length) = table.insert_set(&[vec![1], vec![1], vec![2]]).unwrap();
  assert_eq!(length, 2);
  assert_eq!(table.get_range(start, length).unwrap(), vec![vec![1], vec![2]]);
}
