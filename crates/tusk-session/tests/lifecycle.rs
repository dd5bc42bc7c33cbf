//! Record states, persistence and relationship write-back.

mod common;

use common::nickname;
use tusk_core::{AccessErrorKind, Error, Value};
use tusk_query::Comparable;
use tusk_session::{Record, RecordState, Session};

fn user(session: &Session, name: &str) -> Record {
    let nickname = session.property("User", "nickname").unwrap();
    session
        .find("User")
        .unwrap()
        .filter(nickname.eq(name))
        .unwrap()
        .one()
        .unwrap()
}

fn group(session: &Session, name: &str) -> Record {
    let group_name = session.property("Group", "name").unwrap();
    session
        .find("Group")
        .unwrap()
        .filter(group_name.eq(name))
        .unwrap()
        .one()
        .unwrap()
}

// ==================== States ====================

#[test]
fn transient_becomes_clean_on_save() {
    let session = common::session();
    let mut record = session.build("User").unwrap();
    assert_eq!(record.state(), RecordState::Transient);
    assert_eq!(record.get("admin").unwrap(), Value::Bool(false));

    record.set("nickname", "Lenny").unwrap();
    assert!(record.is_transient());

    assert!(record.save().unwrap());
    assert!(record.is_clean());
    assert!(record.is_registered());
    assert!(matches!(record.get("id").unwrap(), Value::BigInt(_)));
}

#[test]
fn invalid_transient_stays_transient() {
    let session = common::session();
    let record = session.build("User").unwrap();
    assert!(!record.save().unwrap());
    assert!(record.is_transient());
    assert_eq!(session.writes(), 0);
}

#[test]
fn setting_the_same_value_keeps_a_record_clean() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");

    lenny.set("nickname", "Lenny").unwrap();
    assert!(lenny.is_clean());

    lenny.set("nickname", "Lenford").unwrap();
    assert!(lenny.is_dirty());
    assert_eq!(lenny.original("nickname"), Some(Value::from("Lenny")));
    assert_eq!(
        lenny.dirty_attributes(),
        vec![("nickname".to_string(), Value::from("Lenford"))]
    );

    lenny.set("nickname", "Lenny").unwrap();
    assert!(lenny.is_clean());
    assert!(lenny.dirty_attributes().is_empty());
}

#[test]
fn rollback_restores_originals() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    lenny.set("nickname", "Lenford").unwrap();
    lenny.set("admin", true).unwrap();

    lenny.rollback();
    assert!(lenny.is_clean());
    assert_eq!(nickname(&lenny), "Lenny");
    assert_eq!(lenny.get("admin").unwrap(), Value::Bool(false));
}

#[test]
fn saved_changes_reach_storage() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    lenny.set("nickname", "Lenford").unwrap();

    let before = session.writes();
    assert!(lenny.save().unwrap());
    assert!(lenny.is_clean());
    assert_eq!(session.writes() - before, 1);

    let other = session.fresh();
    let reread = other
        .get("User", &[lenny.get("id").unwrap()])
        .unwrap()
        .expect("still stored");
    assert_eq!(nickname(&reread), "Lenford");
}

#[test]
fn failed_update_leaves_the_identity_map_until_rollback() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    lenny.set("nickname", Value::Null).unwrap();

    assert!(!lenny.save().unwrap());
    assert!(lenny.is_dirty());
    assert!(!lenny.is_registered());

    lenny.rollback();
    assert!(lenny.is_clean());
    assert!(lenny.is_registered());
    let key = lenny.get("id").unwrap();
    assert_eq!(session.get("User", &[key]).unwrap(), Some(lenny));
}

#[test]
fn storage_errors_keep_the_record_registered() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    let key = lenny.get("id").unwrap();
    lenny.set("nickname", "Lenford").unwrap();

    session.drop_schema().unwrap();
    let err = lenny.save().unwrap_err();
    assert!(matches!(err, Error::Query(_)), "{err}");
    assert!(lenny.is_dirty());
    assert!(lenny.is_registered());

    let before = session.reads();
    assert_eq!(session.get("User", &[key]).unwrap(), Some(lenny));
    assert_eq!(session.reads(), before);
}

#[test]
fn deleted_records_reject_writes_and_become_immutable() {
    let session = common::seeded();
    let mut moe = user(&session, "Moe");
    let key = moe.get("id").unwrap();

    moe.delete().unwrap();
    assert!(moe.is_deleted());
    let err = moe.set("nickname", "Barney").unwrap_err();
    assert_eq!(err.access_kind(), Some(AccessErrorKind::DeletedImmutable));

    assert!(moe.commit().unwrap());
    assert!(moe.is_immutable());
    assert!(!moe.is_registered());
    assert_eq!(nickname(&moe), "Moe");

    let err = moe.set("nickname", "Barney").unwrap_err();
    assert_eq!(err.access_kind(), Some(AccessErrorKind::Immutable));
    let err = moe.delete().unwrap_err();
    assert_eq!(err.access_kind(), Some(AccessErrorKind::Immutable));
    let err = moe.get("bio").unwrap_err();
    assert_eq!(err.access_kind(), Some(AccessErrorKind::Immutable));

    assert!(session.fresh().get("User", &[key]).unwrap().is_none());
}

#[test]
fn deleting_a_dirty_record_reverts_its_changes() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    lenny.set("nickname", "Lenford").unwrap();
    lenny.delete().unwrap();
    assert!(lenny.is_deleted());
    assert_eq!(nickname(&lenny), "Lenny");
}

#[test]
fn destroying_a_transient_record_does_nothing() {
    let session = common::session();
    let mut record = session.build("User").unwrap();
    record.set("nickname", "Ghost").unwrap();
    assert!(record.destroy().unwrap());
    assert!(record.is_transient());
    assert_eq!(session.writes(), 0);
}

#[test]
fn reload_discards_changes() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    lenny.set("nickname", "Lenford").unwrap();
    lenny.reload().unwrap();
    assert!(lenny.is_clean());
    assert_eq!(nickname(&lenny), "Lenny");
}

// ==================== Access ====================

#[test]
fn unknown_and_protected_members_are_rejected() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");

    let err = lenny.set("shoe_size", 9).unwrap_err();
    assert_eq!(err.access_kind(), Some(AccessErrorKind::Unknown));
    let err = lenny.get("group").unwrap_err();
    assert_eq!(err.access_kind(), Some(AccessErrorKind::Unknown));

    let mut person = session.build("Person").unwrap();
    let err = person.set("kind", "Manager").unwrap_err();
    assert_eq!(err.access_kind(), Some(AccessErrorKind::NotWritable));
}

#[test]
fn mass_assignment_skips_protected_members() {
    let session = common::session();
    let mut employee = session.build("Employee").unwrap();
    employee
        .set_attributes(&[("name", "Ann".into()), ("kind", "Manager".into())])
        .unwrap();
    assert_eq!(employee.get("kind").unwrap(), Value::from("Employee"));
    assert_eq!(employee.get("name").unwrap(), Value::from("Ann"));
}

#[test]
fn to_json_holds_loaded_attributes() {
    let session = common::seeded();
    let lenny = user(&session, "Lenny");
    let json = lenny.to_json();
    assert_eq!(json["nickname"], "Lenny");
    assert_eq!(json["admin"], false);
    assert!(json.get("bio").is_none());
}

// ==================== Relationships ====================

#[test]
fn save_writes_parents_first() {
    let session = common::session();
    let mut devs = session.build("Group").unwrap();
    devs.set("name", "Devs").unwrap();
    let mut homer = session.build("User").unwrap();
    homer.set("nickname", "Homer").unwrap();
    homer.set_one("group", Some(&devs)).unwrap();
    assert_eq!(homer.get("group_id").unwrap(), Value::Null);

    assert!(homer.save().unwrap());
    assert!(devs.is_clean());
    assert!(homer.is_clean());
    assert_eq!(homer.get("group_id").unwrap(), devs.get("id").unwrap());

    let other = session.fresh();
    let reread = other
        .get("User", &[homer.get("id").unwrap()])
        .unwrap()
        .unwrap();
    let group = reread.one("group").unwrap().expect("group saved");
    assert_eq!(group.get_as::<String>("name").unwrap(), "Devs");
}

#[test]
fn set_one_mirrors_keys() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    let guests = group(&session, "Guests");

    lenny.set_one("group", Some(&guests)).unwrap();
    assert!(lenny.is_dirty());
    assert_eq!(lenny.get("group_id").unwrap(), guests.get("id").unwrap());
    assert_eq!(lenny.one("group").unwrap(), Some(guests));

    lenny.set_one("group", None).unwrap();
    assert_eq!(lenny.get("group_id").unwrap(), Value::Null);
    assert_eq!(lenny.one("group").unwrap(), None);
}

#[test]
fn set_one_rejects_other_entities() {
    let session = common::seeded();
    let mut lenny = user(&session, "Lenny");
    let club = session.find("Club").unwrap().first().unwrap().unwrap();
    let err = lenny.set_one("group", Some(&club)).unwrap_err();
    assert!(matches!(err, Error::CrossModel(_)));
}

#[test]
fn adding_to_a_relationship_sets_the_foreign_key() {
    let session = common::seeded();
    let admin = group(&session, "Admin");
    let users = admin.many("users").unwrap();

    let mut bart = session.build("User").unwrap();
    bart.set("nickname", "Bart").unwrap();
    users.add_record(&bart).unwrap();
    assert_eq!(bart.get("group_id").unwrap(), admin.get("id").unwrap());
    assert_eq!(bart.one("group").unwrap(), Some(admin.clone()));
    assert!(users.is_dirty());

    assert!(admin.save().unwrap());
    assert!(bart.is_clean());
    assert!(users.is_clean());

    let other = session.fresh();
    let count = group(&other, "Admin").many("users").unwrap().count().unwrap();
    assert_eq!(count, 3);
}

#[test]
fn removing_from_a_relationship_clears_the_foreign_key() {
    let session = common::seeded();
    let admin = group(&session, "Admin");
    let lenny = user(&session, "Lenny");
    let users = admin.many("users").unwrap();

    assert!(users.remove_record(&lenny).unwrap());
    assert!(!users.remove_record(&lenny).unwrap());
    assert_eq!(lenny.get("group_id").unwrap(), Value::Null);
    assert_eq!(lenny.one("group").unwrap(), None);

    assert!(admin.save().unwrap());
    assert!(lenny.is_clean());

    let other = session.fresh();
    let names: Vec<String> = group(&other, "Admin")
        .many("users")
        .unwrap()
        .records()
        .unwrap()
        .iter()
        .map(nickname)
        .collect();
    assert_eq!(names, vec!["Carl"]);
}

#[test]
fn set_many_replaces_members() {
    let session = common::seeded();
    let mut guests = group(&session, "Guests");
    let lenny = user(&session, "Lenny");
    guests.set_many("users", &[lenny.clone()]).unwrap();
    assert!(guests.save().unwrap());

    let other = session.fresh();
    let names: Vec<String> = group(&other, "Guests")
        .many("users")
        .unwrap()
        .records()
        .unwrap()
        .iter()
        .map(nickname)
        .collect();
    assert_eq!(names, vec!["Lenny"]);
    let moe = user(&other, "Moe");
    assert_eq!(moe.get("group_id").unwrap(), Value::Null);
}
