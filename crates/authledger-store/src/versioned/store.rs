use authledger_db::{format_timestamp, Connections};
use authledger_types::{ActivityBag, AuthenticationEvent, ConnectedServiceBag};
use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};
use serde_json::Value;

use super::schema::{Schema, TABLE_AUTHENTICATION_EVENT, TABLE_IDP_SP_USER_VERSION};
use crate::error::StoreError;
use crate::raw::{activity_from_raw, connected_service_from_raw, query_raw_rows};
use crate::setup;
use crate::tracker::{DataProvider, DataTracker, Setup};

const STORE_NAME: &str = "versioned";

const SELECT_ACTIVITY: &str = "
    SELECT sp.entity_id AS sp_entity_id,
           spv.metadata AS sp_metadata,
           u.identifier AS user_identifier,
           uv.attributes AS user_attributes,
           ae.happened_at,
           ae.client_ip_address,
           ae.authentication_protocol_designation
    FROM vds_authentication_event ae
    JOIN vds_idp_sp_user_version isuv ON isuv.id = ae.idp_sp_user_version_id
    JOIN vds_sp_version spv ON spv.id = isuv.sp_version_id
    JOIN vds_sp sp ON sp.id = spv.sp_id
    JOIN vds_user_version uv ON uv.id = isuv.user_version_id
    JOIN vds_user u ON u.id = uv.user_id
    WHERE u.identifier = ?1
    ORDER BY ae.happened_at DESC, ae.id DESC
    LIMIT ?2 OFFSET ?3";

// Metadata and attributes are taken from the most recent event per service
// provider; counts and bounds span every retained event.
const SELECT_CONNECTED_SERVICES: &str = "
    WITH user_events AS (
        SELECT sp.entity_id AS sp_entity_id,
               spv.metadata AS sp_metadata,
               u.identifier AS user_identifier,
               uv.attributes AS user_attributes,
               ROW_NUMBER() OVER recency AS recency_rank,
               COUNT(*) OVER per_sp AS number_of_authentications,
               MIN(ae.happened_at) OVER per_sp AS first_authentication_at,
               MAX(ae.happened_at) OVER per_sp AS last_authentication_at
        FROM vds_authentication_event ae
        JOIN vds_idp_sp_user_version isuv ON isuv.id = ae.idp_sp_user_version_id
        JOIN vds_sp_version spv ON spv.id = isuv.sp_version_id
        JOIN vds_sp sp ON sp.id = spv.sp_id
        JOIN vds_user_version uv ON uv.id = isuv.user_version_id
        JOIN vds_user u ON u.id = uv.user_id
        WHERE u.identifier = ?1
        WINDOW per_sp AS (PARTITION BY sp.id),
               recency AS (PARTITION BY sp.id ORDER BY ae.happened_at DESC, ae.id DESC)
    )
    SELECT sp_entity_id, sp_metadata, user_identifier, user_attributes,
           number_of_authentications, first_authentication_at, last_authentication_at
    FROM user_events
    WHERE recency_rank = 1
    ORDER BY sp_entity_id";

/// Store keeping full history: versioned dimensions plus one fact row per
/// authentication event.
#[derive(Debug, Clone)]
pub struct VersionedStore {
    connections: Connections,
    schema: Schema,
}

impl VersionedStore {
    pub fn new(connections: Connections) -> Self {
        Self {
            connections,
            schema: Schema::new(),
        }
    }

    /// Records one authentication event.
    ///
    /// Dimension versions are resolved and the fact row is inserted in a
    /// single transaction; on any failure nothing is written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` wrapping the underlying cause.
    pub fn persist(&self, event: &AuthenticationEvent) -> Result<(), StoreError> {
        let mut conn = self.connections.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = format_timestamp(&Utc::now());

        let idp = self.schema.idp.resolve(
            &tx,
            &event.identity_provider.entity_id,
            &Value::Object(event.identity_provider.metadata.clone()),
            &now,
        )?;
        let sp = self.schema.sp.resolve(
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

        tx.prepare_cached(&format!(
            "INSERT INTO {TABLE_IDP_SP_USER_VERSION}
                (idp_version_id, sp_version_id, user_version_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (idp_version_id, sp_version_id, user_version_id) DO NOTHING"
        ))?
        .execute(params![idp.version_id, sp.version_id, user.version_id, now])?;

        let idp_sp_user_version_id: i64 = tx
            .prepare_cached(&format!(
                "SELECT id FROM {TABLE_IDP_SP_USER_VERSION}
                 WHERE idp_version_id = ?1 AND sp_version_id = ?2 AND user_version_id = ?3"
            ))?
            .query_row(
                params![idp.version_id, sp.version_id, user.version_id],
                |row| row.get(0),
            )?;

        tx.prepare_cached(&format!(
            "INSERT INTO {TABLE_AUTHENTICATION_EVENT}
                (idp_sp_user_version_id, happened_at, client_ip_address,
                 authentication_protocol_designation, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ))?
        .execute(params![
            idp_sp_user_version_id,
            format_timestamp(&event.happened_at),
            event.client_ip_address,
            event.protocol.designation(),
            now,
        ])?;

        tx.commit()?;

        tracing::debug!(
            store = STORE_NAME,
            sp = %event.service_provider.entity_id,
            idp_sp_user_version_id,
            "persisted authentication event"
        );

        Ok(())
    }

    /// Authentication events of one user, newest first.
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

    /// Service providers the user has authenticated to, keyed by entity id.
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

    /// Deletes fact rows that happened strictly before `cutoff`. Dimension
    /// versions are left in place.
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
            "deleted authentication events older than cutoff"
        );

        Ok(deleted)
    }
}

impl Setup for VersionedStore {
    fn needs_setup(&self) -> Result<bool, StoreError> {
        setup::needs_setup(&self.connections, &self.schema.migrations())
    }

    fn run_setup(&self) -> Result<(), StoreError> {
        setup::run_setup(&self.connections, STORE_NAME, &self.schema.migrations())
    }
}

impl DataTracker for VersionedStore {
    fn process(&self, event: &AuthenticationEvent) -> Result<(), StoreError> {
        self.persist(event)
    }

    fn delete_data_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        VersionedStore::delete_data_older_than(self, cutoff)
    }
}

impl DataProvider for VersionedStore {
    fn get_activity(
        &self,
        user_identifier: &str,
        max_results: u32,
        first_result: u32,
    ) -> Result<ActivityBag, StoreError> {
        VersionedStore::get_activity(self, user_identifier, max_results, first_result)
    }

    fn get_connected_service_providers(
        &self,
        user_identifier: &str,
    ) -> Result<ConnectedServiceBag, StoreError> {
        VersionedStore::get_connected_service_providers(self, user_identifier)
    }
}
