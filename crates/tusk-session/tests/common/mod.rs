#![allow(dead_code)]

use tusk_core::{EntityDef, Property, Registry, Value};
use tusk_query::{Dialect, SqlTranslator};
use tusk_session::{DataSource, Record, Session, SessionConfig};
use tusk_sqlite::SqliteConnection;

pub fn registry() -> Registry {
    Registry::builder()
        .entity(
            EntityDef::new("Group")
                .property(Property::string("name").required())
                .has_many("users", "User"),
        )
        .entity(
            EntityDef::new("User")
                .property(Property::string("nickname").required())
                .property(Property::integer("group_id"))
                .property(Property::boolean("admin").default_value(false))
                .property(Property::text("bio"))
                .belongs_to("group", "Group")
                .has_many("comments", "Comment")
                .has_many("memberships", "Membership")
                .has_many_through("clubs", "Club", "memberships"),
        )
        .entity(
            EntityDef::new("Comment")
                .property(Property::string("body"))
                .property(Property::integer("user_id"))
                .property(Property::integer("score"))
                .belongs_to("user", "User"),
        )
        .entity(
            EntityDef::new("Club")
                .property(Property::string("title"))
                .has_many("memberships", "Membership"),
        )
        .entity(
            EntityDef::new("Membership")
                .property(Property::integer("user_id"))
                .property(Property::integer("club_id"))
                .belongs_to("user", "User")
                .belongs_to("club", "Club"),
        )
        .entity(
            EntityDef::new("Person")
                .property(Property::string("name"))
                .property(Property::discriminator("kind")),
        )
        .entity(
            EntityDef::new("Employee")
                .extends("Person")
                .property(Property::float("salary")),
        )
        .entity(EntityDef::new("Manager").extends("Employee"))
        .build()
        .expect("registry builds")
}

/// A session over an empty in-memory database with every table created.
pub fn session() -> Session {
    session_with(SessionConfig::default())
}

pub fn session_with(config: SessionConfig) -> Session {
    let session = Session::with_config(registry(), config);
    let conn = SqliteConnection::open_memory().expect("open sqlite memory db");
    session.add_data_source(DataSource::new(
        "default",
        SqlTranslator::new(Dialect::Sqlite),
        conn,
    ));
    session.create_schema().expect("create schema");
    session
}

pub fn create(session: &Session, entity: &str, attributes: &[(&str, Value)]) -> Record {
    let record = session.create(entity, attributes).expect("create record");
    assert!(record.is_clean(), "{entity} failed to save");
    record
}

/// Group "Admin" with users Lenny and Carl, Group "Guests" with Moe.
/// Lenny has two comments, Carl one, Moe none. Lenny belongs to clubs
/// Chess and Golf, Carl to Chess.
///
/// Returns a fresh session over the seeded data.
pub fn seeded() -> Session {
    seeded_with(SessionConfig::default())
}

pub fn seeded_with(config: SessionConfig) -> Session {
    let session = session_with(config);
    let admin = create(&session, "Group", &[("name", "Admin".into())]);
    let guests = create(&session, "Group", &[("name", "Guests".into())]);
    let admin_id = admin.get("id").expect("group id");
    let guests_id = guests.get("id").expect("group id");

    let lenny = create(
        &session,
        "User",
        &[
            ("nickname", "Lenny".into()),
            ("group_id", admin_id.clone()),
            ("bio", "Safety inspector".into()),
        ],
    );
    let carl = create(
        &session,
        "User",
        &[
            ("nickname", "Carl".into()),
            ("group_id", admin_id),
            ("admin", true.into()),
        ],
    );
    create(
        &session,
        "User",
        &[("nickname", "Moe".into()), ("group_id", guests_id)],
    );

    let lenny_id = lenny.get("id").expect("user id");
    let carl_id = carl.get("id").expect("user id");
    for (user, body, score) in [
        (&lenny_id, "first", 3),
        (&lenny_id, "second", 5),
        (&carl_id, "third", 4),
    ] {
        create(
            &session,
            "Comment",
            &[
                ("user_id", user.clone()),
                ("body", body.into()),
                ("score", score.into()),
            ],
        );
    }

    let chess = create(&session, "Club", &[("title", "Chess".into())]);
    let golf = create(&session, "Club", &[("title", "Golf".into())]);
    let chess_id = chess.get("id").expect("club id");
    let golf_id = golf.get("id").expect("club id");
    for (user, club) in [
        (&lenny_id, &chess_id),
        (&lenny_id, &golf_id),
        (&carl_id, &chess_id),
    ] {
        create(
            &session,
            "Membership",
            &[("user_id", user.clone()), ("club_id", club.clone())],
        );
    }

    session.fresh()
}

pub fn nickname(record: &Record) -> String {
    record.get_as::<String>("nickname").expect("nickname")
}
