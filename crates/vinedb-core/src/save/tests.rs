use super::*;
use crate::{
    backend::SqlExecutor,
    convert::RdbConvert,
    entity::{EventEntity, NodeEntity},
    error::{BackendError, SaveError},
    id::{self, IdAllocator},
    test_support::{MemoryBackend, SeqAreas, fixture_mapping, fixture_registry},
};
use std::{cell::RefCell, rc::Rc};
use vinedb_schema::types::Value;

const USER_TABLE: &str = "N_USER";
const BADGE_TABLE: &str = "N_BADGE";
const HAVE_TABLE: &str = "E_USER_GROUP_HAVE_USER";
const OWN_TABLE: &str = "E_USER_OWN_BADGE";

fn seed_user(backend: &mut MemoryBackend, convert: &RdbConvert<'_>, id: &str, nickname: &str) {
    let mut node = NodeEntity::new("User").prop("nickname", nickname);
    node.id = id.into();
    node.uuid = format!("uuid-{nickname}");
    backend
        .insert(&convert.node_insert_param(&node, &[]).unwrap())
        .unwrap();
}

fn seed_badge(backend: &mut MemoryBackend, convert: &RdbConvert<'_>, id: &str, title: &str) {
    let mut node = NodeEntity::new("Badge").prop("title", title);
    node.id = id.into();
    backend
        .insert(&convert.node_insert_param(&node, &[]).unwrap())
        .unwrap();
}

fn seed_own(
    backend: &mut MemoryBackend,
    convert: &RdbConvert<'_>,
    id: &str,
    user_id: &str,
    badge_id: &str,
) {
    let mut event = EventEntity::new("OWN", ("User", user_id), ("Badge", badge_id));
    event.id = id.into();
    backend
        .insert(&convert.event_insert_param(&event, &[]).unwrap())
        .unwrap();
}

#[test]
fn create_batch_allocates_ids_and_rewrites_event_endpoints() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut data = DataSet::new();
    let mut user = NodeEntity::new("User")
        .prop("nickname", "n1")
        .prop("$draft", Value::Boolean(true))
        .operate(Operate::Create);
    user.id = "-00000000000a".into();
    data.put_node(user);
    let mut group = NodeEntity::new("UserGroup")
        .prop("name", "g1")
        .operate(Operate::Create);
    group.id = "-00000000000b".into();
    data.put_node(group);
    let mut have = EventEntity::new("HAVE", ("UserGroup", "-00000000000b"), ("User", "-00000000000a"))
        .operate(Operate::Create);
    have.id = "-00000000000c".into();
    data.put_event(have);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();

    assert_eq!(result.created, 3);
    let user = result
        .data
        .nodes()
        .find(|n| n.sd == "User")
        .unwrap()
        .clone();
    let group = result
        .data
        .nodes()
        .find(|n| n.sd == "UserGroup")
        .unwrap()
        .clone();
    assert!(id::effective(&user.id));
    assert_eq!(user.create_time, user.update_time);
    assert!(!user.uuid.is_empty());
    // transients never persist nor survive the sync
    assert!(user.get("$draft").is_none());

    let event_row = &backend.rows(HAVE_TABLE)[0];
    assert_eq!(event_row.get("A_LEFT"), Some(&Value::from(group.id.clone())));
    assert_eq!(event_row.get("A_RIGHT"), Some(&Value::from(user.id.clone())));
}

#[test]
fn caller_supplied_original_id_is_kept() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut user = NodeEntity::new("User")
        .prop("nickname", "n1")
        .operate(Operate::Create);
    user.id = "zzz001000000".into();
    user.original_id = true;
    let mut data = DataSet::new();
    data.put_node(user);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert!(result.data.node("zzz001000000").is_some());
    assert!(backend.row_by_id(USER_TABLE, "zzz001000000").is_some());
}

#[test]
fn redundancy_value_resolves_through_the_batch() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut data = DataSet::new();
    let mut user = NodeEntity::new("User")
        .prop("nickname", "owner")
        .operate(Operate::Create);
    user.id = "-00000000000a".into();
    data.put_node(user);
    let mut badge = NodeEntity::new("Badge")
        .prop("title", "gold")
        .operate(Operate::Create);
    badge.id = "-00000000000b".into();
    data.put_node(badge);
    let mut own = EventEntity::new("OWN", ("User", "-00000000000a"), ("Badge", "-00000000000b"))
        .operate(Operate::Create);
    own.id = "-00000000000c".into();
    data.put_event(own);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();

    let user_id = result
        .data
        .nodes()
        .find(|n| n.sd == "User")
        .unwrap()
        .id
        .clone();
    let badge_row = &backend.rows(BADGE_TABLE)[0];
    assert_eq!(
        badge_row.get("R_USER_ID"),
        Some(&Value::Integer(id::numeric(&user_id).unwrap()))
    );
    assert_eq!(backend.rows(OWN_TABLE).len(), 1);
}

#[test]
fn unresolvable_reference_fails_the_batch() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    // the owning user is referenced but never part of the batch, so
    // the badge can never resolve its redundancy value
    let mut data = DataSet::new();
    let mut badge = NodeEntity::new("Badge")
        .prop("title", "gold")
        .operate(Operate::Create);
    badge.id = "-00000000000b".into();
    data.put_node(badge);
    let mut own = EventEntity::new("OWN", ("User", "-00000000000a"), ("Badge", "-00000000000b"))
        .operate(Operate::Create);
    own.id = "-00000000000c".into();
    data.put_event(own);

    let err = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        SaveError::Unsatisfiable {
            waiting: 1,
            attempted: 1
        }
    ));
}

#[test]
fn update_persists_changed_properties() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut patch = NodeEntity::new("User")
        .prop("nickname", "n1")
        .prop("age", Value::Integer(40))
        .operate(Operate::Update);
    patch.id = "000001000001".into();
    let mut data = DataSet::new();
    data.put_node(patch);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(result.updated, 1);
    let row = backend.row_by_id(USER_TABLE, "000001000001").unwrap();
    assert_eq!(row.get("P_AGE"), Some(&Value::Integer(40)));
}

#[test]
fn non_forced_delete_with_required_counterparts_aborts_before_mutation() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    seed_badge(&mut backend, &convert, "000001000002", "gold");
    seed_own(&mut backend, &convert, "000001000003", "000001000001", "000001000002");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut user = NodeEntity::new("User").operate(Operate::Delete);
    user.id = "000001000001".into();
    let mut data = DataSet::new();
    data.put_node(user);

    let err = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap_err();
    match err {
        SaveError::Cascade { affected } => assert_eq!(affected, vec!["Badge"]),
        other => panic!("expected cascade abort, got {other}"),
    }
    assert_eq!(backend.delete_count, 0);
    assert!(backend.row_by_id(USER_TABLE, "000001000001").is_some());
}

#[test]
fn forced_delete_cascades_to_required_counterparts() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    seed_badge(&mut backend, &convert, "000001000002", "gold");
    seed_own(&mut backend, &convert, "000001000003", "000001000001", "000001000002");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut user = NodeEntity::new("User").operate(Operate::Delete);
    user.id = "000001000001".into();
    user.enforce = true;
    let mut data = DataSet::new();
    data.put_node(user);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(result.deleted, 2);
    assert!(backend.rows(USER_TABLE).is_empty());
    assert!(backend.rows(BADGE_TABLE).is_empty());
    assert!(backend.rows(OWN_TABLE).is_empty());
    // both deletions are synced back, tagged
    assert!(result
        .data
        .nodes()
        .all(|n| n.operate == Some(Operate::Delete)));
}

#[test]
fn deleting_a_required_event_without_replacement_needs_force() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    seed_badge(&mut backend, &convert, "000001000002", "gold");
    seed_own(&mut backend, &convert, "000001000003", "000001000001", "000001000002");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut own = EventEntity::new("OWN", ("User", "000001000001"), ("Badge", "000001000002"))
        .operate(Operate::Delete);
    own.id = "000001000003".into();
    let mut data = DataSet::new();
    data.put_event(own.clone());

    let err = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap_err();
    assert!(matches!(err, SaveError::Cascade { .. }));

    // forced: the event goes, and the orphaned badge goes with it
    own.enforce = true;
    let mut data = DataSet::new();
    data.put_event(own);
    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(result.deleted, 2);
    assert!(backend.rows(OWN_TABLE).is_empty());
    assert!(backend.rows(BADGE_TABLE).is_empty());
    assert!(backend.row_by_id(USER_TABLE, "000001000001").is_some());
}

#[test]
fn deleting_the_dependent_badge_needs_no_force() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    seed_badge(&mut backend, &convert, "000001000002", "gold");
    seed_own(&mut backend, &convert, "000001000003", "000001000001", "000001000002");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    // the badge needs its owner, not the other way round: removing the
    // badge orphans nothing
    let mut badge = NodeEntity::new("Badge").operate(Operate::Delete);
    badge.id = "000001000002".into();
    let mut data = DataSet::new();
    data.put_node(badge);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(result.deleted, 1);
    assert!(backend.rows(BADGE_TABLE).is_empty());
    assert!(backend.rows(OWN_TABLE).is_empty());
    assert!(backend.row_by_id(USER_TABLE, "000001000001").is_some());
}

#[test]
fn same_batch_replacement_makes_event_delete_an_implicit_replace() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    seed_user(&mut backend, &convert, "000001000004", "n2");
    seed_badge(&mut backend, &convert, "000001000002", "gold");
    seed_own(&mut backend, &convert, "000001000003", "000001000001", "000001000002");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    // hand the badge to the other user in one batch
    let mut old = EventEntity::new("OWN", ("User", "000001000001"), ("Badge", "000001000002"))
        .operate(Operate::Delete);
    old.id = "000001000003".into();
    let mut new = EventEntity::new("OWN", ("User", "000001000004"), ("Badge", "000001000002"))
        .operate(Operate::Create);
    new.id = "-00000000000a".into();
    let mut data = DataSet::new();
    data.put_event(old);
    data.put_event(new);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(result.created, 1);
    assert_eq!(result.deleted, 1);

    let rows = backend.rows(OWN_TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("A_LEFT"), Some(&Value::from("000001000004")));
    assert!(backend.row_by_id(BADGE_TABLE, "000001000002").is_some());
}

#[test]
fn replacement_via_batch_default_verb_still_replaces() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    seed_user(&mut backend, &convert, "000001000004", "n2");
    seed_badge(&mut backend, &convert, "000001000002", "gold");
    seed_own(&mut backend, &convert, "000001000003", "000001000001", "000001000002");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut old = EventEntity::new("OWN", ("User", "000001000001"), ("Badge", "000001000002"))
        .operate(Operate::Delete);
    old.id = "000001000003".into();
    // the replacement carries no verb of its own; the batch default
    // supplies Create before the delete is processed
    let mut new = EventEntity::new("OWN", ("User", "000001000004"), ("Badge", "000001000002"));
    new.id = "-00000000000a".into();
    let mut data = DataSet::new();
    data.put_event(old);
    data.put_event(new);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::with_default(Operate::Create))
        .unwrap();
    assert_eq!((result.created, result.deleted), (1, 1));

    let rows = backend.rows(OWN_TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("A_LEFT"), Some(&Value::from("000001000004")));
    assert!(backend.row_by_id(BADGE_TABLE, "000001000002").is_some());
}

#[test]
fn query_verb_syncs_the_stored_entity_into_the_batch() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    seed_user(&mut backend, &convert, "000001000001", "n1");
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut probe = NodeEntity::new("User")
        .prop("nickname", "n1")
        .operate(Operate::Query);
    probe.id = "-00000000000a".into();
    let mut data = DataSet::new();
    data.put_node(probe);

    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(result.created + result.updated + result.deleted, 0);
    let synced = result.data.node("000001000001").unwrap();
    assert_eq!(synced.uuid, "uuid-n1");
    assert_eq!(synced.operate, Some(Operate::Query));

    // a probe matching nothing is an error
    let mut missing = NodeEntity::new("User")
        .prop("nickname", "ghost")
        .operate(Operate::Query);
    missing.id = "-00000000000b".into();
    let mut data = DataSet::new();
    data.put_node(missing);
    let err = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap_err();
    assert!(matches!(
        err,
        SaveError::Validation(crate::error::ValidationError::Missing { .. })
    ));
}

#[test]
fn create_or_update_probes_by_unique_content() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    // first pass creates
    let mut node = NodeEntity::new("User")
        .prop("nickname", "n1")
        .operate(Operate::CreateOrUpdate);
    node.id = "-00000000000a".into();
    let mut data = DataSet::new();
    data.put_node(node);
    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!((result.created, result.updated), (1, 0));
    assert_eq!(backend.rows(USER_TABLE).len(), 1);

    // same unique content again becomes an update of the stored row
    let mut again = NodeEntity::new("User")
        .prop("nickname", "n1")
        .prop("age", Value::Integer(30))
        .operate(Operate::CreateOrUpdate);
    again.id = "-00000000000b".into();
    let mut data = DataSet::new();
    data.put_node(again);
    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!((result.created, result.updated), (0, 1));
    assert_eq!(backend.rows(USER_TABLE).len(), 1);
    assert_eq!(
        backend.rows(USER_TABLE)[0].get("P_AGE"),
        Some(&Value::Integer(30))
    );
}

#[test]
fn batch_default_verb_applies_to_untagged_entities() {
    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    let mut allocator = IdAllocator::new(SeqAreas(0));
    let mut listeners: Vec<Box<dyn ChangeListener>> = Vec::new();

    let mut tagged = NodeEntity::new("User").prop("nickname", "n1");
    tagged.id = "-00000000000a".into();
    let mut data = DataSet::new();
    data.put_node(tagged.clone());

    // no verb and no default: nothing happens
    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(result.created, 0);
    assert!(backend.rows(USER_TABLE).is_empty());

    let mut data = DataSet::new();
    data.put_node(tagged);
    let result = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::with_default(Operate::Create))
        .unwrap();
    assert_eq!(result.created, 1);
}

#[test]
fn listeners_observe_lifecycle_and_can_veto() {
    #[derive(Default)]
    struct Recorder {
        hooks: Rc<RefCell<Vec<&'static str>>>,
    }
    impl ChangeListener for Recorder {
        fn on_save(&mut self, _: &DataSet) -> Result<(), SaveError> {
            self.hooks.borrow_mut().push("save");
            Ok(())
        }
        fn on_create(&mut self, _: &NodeEntity, _: &DataSet) -> Result<(), SaveError> {
            self.hooks.borrow_mut().push("create");
            Ok(())
        }
        fn on_created(&mut self, _: &NodeEntity, _: &DataSet) -> Result<(), SaveError> {
            self.hooks.borrow_mut().push("created");
            Ok(())
        }
    }

    struct Veto;
    impl ChangeListener for Veto {
        fn on_create(&mut self, _: &NodeEntity, _: &DataSet) -> Result<(), SaveError> {
            Err(SaveError::Backend(BackendError::new("vetoed")))
        }
    }

    let registry = fixture_registry();
    let mapping = fixture_mapping(&registry);
    let convert = RdbConvert::new(&registry, &mapping);
    let mut backend = MemoryBackend::new();
    let mut allocator = IdAllocator::new(SeqAreas(0));

    let hooks = Rc::new(RefCell::new(Vec::new()));
    let mut listeners: Vec<Box<dyn ChangeListener>> = vec![Box::new(Recorder {
        hooks: Rc::clone(&hooks),
    })];

    let mut node = NodeEntity::new("User")
        .prop("nickname", "n1")
        .operate(Operate::Create);
    node.id = "-00000000000a".into();
    let mut data = DataSet::new();
    data.put_node(node.clone());

    SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap();
    assert_eq!(&*hooks.borrow(), &["save", "create", "created"]);

    // a listener error aborts before any row is written
    let mut backend = MemoryBackend::new();
    let mut listeners: Vec<Box<dyn ChangeListener>> = vec![Box::new(Veto)];
    let mut data = DataSet::new();
    data.put_node(node);
    let err = SaveExecutor::new(&convert, &mut allocator, &mut backend, &mut listeners)
        .save(data, &SaveOptions::default())
        .unwrap_err();
    assert!(matches!(err, SaveError::Backend(_)));
    assert_eq!(backend.insert_count, 0);
}
