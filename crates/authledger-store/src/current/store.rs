use authledger_db::{format_timestamp, Connections};
use authledger_types::{ActivityBag, AuthenticationEvent, ConnectedServiceBag};
use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};
use serde_json::Value;

use super::schema::{Schema, TABLE_AUTHENTICATION_EVENT, TABLE_CONNECTED_SERVICE};
use crate::error::StoreError;
use crate::raw::{activity_from_raw, connected_service_from_raw, query_raw_rows};
use crate::setup;
use crate::tracker::{DataProvider, DataTracker, Setup};

const STORE_NAME: &str = "current";

const SELECT_ACTIVITY: &str = "
    SELECT sp.entity_id AS sp_entity_id,
           sp.metadata AS sp_metadata,
           u.identifier AS user_identifier,
           uv.attributes AS user_attributes,
           ae.happened_at,
           ae.client_ip_address,
           ae.authentication_protocol_designation
    FROM cds_authentication_event ae
    JOIN cds_sp sp ON sp.id = ae.sp_id
    JOIN cds_user_version uv ON uv.id = ae.user_version_id
    JOIN cds_user u ON u.id = uv.user_id
    WHERE u.identifier = ?1
    ORDER BY ae.happened_at DESC, ae.id DESC
    LIMIT ?2 OFFSET ?3";

const SELECT_CONNECTED_SERVICES: &str = "
    SELECT sp.entity_id AS sp_entity_id,
           sp.metadata AS sp_metadata,
           u.identifier AS user_identifier,
           uv.attributes AS user_attributes,
           cs.count_of_authentication_events AS number_of_authentications,
           cs.first_authentication_at,
           cs.last_authentication_at
    FROM cds_connected_service cs
    JOIN cds_sp sp ON sp.id = cs.sp_id
    JOIN cds_user u ON u.id = cs.user_id
    JOIN cds_user_version uv ON uv.id = cs.user_version_id
    WHERE u.identifier = ?1
    ORDER BY sp.entity_id";

/// Store keeping the latest known state per service provider and user,
/// next to an activity log pruned by retention.
#[derive(Debug, Clone)]
pub struct CurrentStore {
    connections: Connections,
    schema: Schema,
}

impl CurrentStore {
    pub fn new(connections: Connections) -> Self {
        Self {
            connections,
            schema: Schema::new(),
        }
    }

    /// Records one authentication event.
    ///
    /// Updates the service provider and user, upserts the connected service
    /// row for the pair and appends to the activity log, all in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` wrapping the underlying cause.
    pub fn persist(&self, event: &AuthenticationEvent) -> Result<(), StoreError> {
        let mut conn = self.connections.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = format_timestamp(&Utc::now());
        let happened_at = format_timestamp(&event.happened_at);

        let sp_id = self.schema.sp.upsert(
            &tx,
            &event.service_provider.entity_id,
            &Value::Object(event.service_provider.metadata.clone()),
            &now,
        )?;
        let user = self.schema.user.resolve(
            &tx,
            &event.user.identifier,
            &serde_json::to_value(&event.user.attributes)?,
            &now,
        )?;

        // Events may arrive out of order; the user version follows whichever
        // event is the latest, and the bounds only ever widen.
        tx.prepare_cached(&format!(
            "INSERT INTO {TABLE_CONNECTED_SERVICE}
                (sp_id, user_id, user_version_id, first_authentication_at,
                 last_authentication_at, count_of_authentication_events,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4, 1, ?5, ?5)
             ON CONFLICT (sp_id, user_id) DO UPDATE SET
                user_version_id = CASE
                    WHEN excluded.last_authentication_at >= last_authentication_at
                    THEN excluded.user_version_id
                    ELSE user_version_id
                END,
                first_authentication_at =
                    MIN(first_authentication_at, excluded.first_authentication_at),
                last_authentication_at =
                    MAX(last_authentication_at, excluded.last_authentication_at),
                count_of_authentication_events = count_of_authentication_events + 1,
                updated_at = excluded.updated_at"
        ))?
        .execute(params![sp_id, user.key_id, user.version_id, happened_at, now])?;

        tx.prepare_cached(&format!(
            "INSERT INTO {TABLE_AUTHENTICATION_EVENT}
                (sp_id, user_version_id, happened_at, client_ip_address,
                 authentication_protocol_designation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ))?
        .execute(params![
            sp_id,
            user.version_id,
            happened_at,
            event.client_ip_address,
            event.protocol.designation(),
            now,
        ])?;

        tx.commit()?;

        tracing::debug!(
            store = STORE_NAME,
            sp = %event.service_provider.entity_id,
            sp_id,
            "persisted authentication event"
        );

        Ok(())
    }

    /// Activity log entries of one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if a row does not convert.
    pub fn get_activity(
        &self,
        user_identifier: &str,
        max_results: u32,
        first_result: u32,
    ) -> Result<ActivityBag, StoreError> {
        let conn = self.connections.reader()?;
        let mut stmt = conn.prepare_cached(SELECT_ACTIVITY)?;
        let rows = query_raw_rows(
            &mut stmt,
            params![user_identifier, max_results, first_result],
        )?;

        rows.iter().map(activity_from_raw).collect()
    }

    /// Connected service rows of one user, keyed by service provider.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if a row does not convert.
    pub fn get_connected_service_providers(
        &self,
        user_identifier: &str,
    ) -> Result<ConnectedServiceBag, StoreError> {
        let conn = self.connections.reader()?;
        let mut stmt = conn.prepare_cached(SELECT_CONNECTED_SERVICES)?;
        let rows = query_raw_rows(&mut stmt, [user_identifier])?;

        let mut bag = ConnectedServiceBag::new();
        for row in &rows {
            bag.add_or_replace(connected_service_from_raw(row)?);
        }

        Ok(bag)
    }

    /// Deletes activity log rows that happened strictly before `cutoff`.
    /// Connected service rows are never pruned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the delete fails.
    pub fn delete_data_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let conn = self.connections.writer()?;
        let deleted = conn.execute(
            &format!("DELETE FROM {TABLE_AUTHENTICATION_EVENT} WHERE happened_at < ?1"),
            [format_timestamp(&cutoff)],
        )?;

        tracing::info!(
            table = TABLE_AUTHENTICATION_EVENT,
            cutoff = %cutoff,
            deleted,
            "deleted activity older than cutoff"
        );

        Ok(deleted)
    }
}

impl Setup for CurrentStore {
    fn needs_setup(&self) -> Result<bool, StoreError> {
        setup::needs_setup(&self.connections, &self.schema.migrations())
    }

    fn run_setup(&self) -> Result<(), StoreError> {
        setup::run_setup(&self.connections, STORE_NAME, &self.schema.migrations())
    }
}

impl DataTracker for CurrentStore {
    fn process(&self, event: &AuthenticationEvent) -> Result<(), StoreError> {
        self.persist(event)
    }

    fn delete_data_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        CurrentStore::delete_data_older_than(self, cutoff)
    }
}

impl DataProvider for CurrentStore {
    fn get_activity(
        &self,
        user_identifier: &str,
        max_results: u32,
        first_result: u32,
    ) -> Result<ActivityBag, StoreError> {
        CurrentStore::get_activity(self, user_identifier, max_results, first_result)
    }

    fn get_connected_service_providers(
        &self,
        user_identifier: &str,
    ) -> Result<ConnectedServiceBag, StoreError> {
        CurrentStore::get_connected_service_providers(self, user_identifier)
    }
}
