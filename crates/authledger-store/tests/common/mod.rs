#![allow(dead_code)]

use std::collections::BTreeMap;

use authledger_db::{create_pool, Connections, DbPool, DbRuntimeSettings};
use authledger_types::{AuthenticationEvent, Protocol, Provider, User};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

pub fn file_pool(dir: &TempDir, name: &str) -> DbPool {
    let path = dir.path().join(name);
    create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to create pool")
}

pub fn connections(dir: &TempDir) -> Connections {
    Connections::new(file_pool(dir, "accounting.db"))
}

pub fn count(connections: &Connections, table: &str) -> i64 {
    let conn = connections.writer().expect("failed to get connection");
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .expect("failed to count rows")
}

/// Makes every insert into `table` abort its statement.
pub fn reject_inserts(connections: &Connections, table: &str) {
    let conn = connections.writer().expect("failed to get connection");
    conn.execute_batch(&format!(
        "CREATE TRIGGER reject_{table} BEFORE INSERT ON {table}
         BEGIN SELECT RAISE(ABORT, 'insert rejected'); END;"
    ))
    .expect("failed to create trigger");
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_660_000_000 + secs, 0)
        .single()
        .expect("valid timestamp")
}

fn provider(entity_id: &str, name: &str) -> Provider {
    let metadata = json!({ "entityid": entity_id, "name": { "en": name } });
    match metadata {
        Value::Object(map) => Provider {
            entity_id: entity_id.to_string(),
            metadata: map,
        },
        _ => unreachable!("literal is an object"),
    }
}

pub fn user(identifier: &str, display_name: &str) -> User {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "hrEduPersonPersistentID".to_string(),
        vec![identifier.to_string()],
    );
    attributes.insert("cn".to_string(), vec![display_name.to_string()]);
    User {
        identifier: identifier.to_string(),
        attributes,
    }
}

pub fn event(sp: &str, user_identifier: &str, happened_at: DateTime<Utc>) -> AuthenticationEvent {
    AuthenticationEvent {
        identity_provider: provider("https://idp.example.org", "Example IdP"),
        service_provider: provider(sp, "Example SP"),
        user: user(user_identifier, "Jane Doe"),
        protocol: Protocol::Saml2,
        happened_at,
        client_ip_address: Some("192.0.2.10".to_string()),
    }
}

pub fn renamed_sp(mut event: AuthenticationEvent, name: &str) -> AuthenticationEvent {
    event
        .service_provider
        .metadata
        .insert("name".to_string(), json!({ "en": name }));
    event
}
