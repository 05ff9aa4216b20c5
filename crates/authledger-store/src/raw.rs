//! Conversion of raw result rows into read-side entities.
//!
//! Rows are first collected into a [`RawRow`] keyed by column name, then
//! validated. A missing or malformed column is a `StoreError::Validation`,
//! never a partially filled entity.

use std::collections::BTreeMap;

use authledger_db::parse_timestamp;
use authledger_types::{Activity, ConnectedService, Protocol, Provider, User};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Params, Statement};
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// One result row, keyed by column name.
pub type RawRow = BTreeMap<String, SqlValue>;

pub const COLUMN_SP_ENTITY_ID: &str = "sp_entity_id";
pub const COLUMN_SP_METADATA: &str = "sp_metadata";
pub const COLUMN_USER_IDENTIFIER: &str = "user_identifier";
pub const COLUMN_USER_ATTRIBUTES: &str = "user_attributes";
pub const COLUMN_HAPPENED_AT: &str = "happened_at";
pub const COLUMN_CLIENT_IP_ADDRESS: &str = "client_ip_address";
pub const COLUMN_PROTOCOL_DESIGNATION: &str = "authentication_protocol_designation";
pub const COLUMN_NUMBER_OF_AUTHENTICATIONS: &str = "number_of_authentications";
pub const COLUMN_FIRST_AUTHENTICATION_AT: &str = "first_authentication_at";
pub const COLUMN_LAST_AUTHENTICATION_AT: &str = "last_authentication_at";

/// Runs `stmt` and collects every row by column name.
pub(crate) fn query_raw_rows<P: Params>(
    stmt: &mut Statement<'_>,
    params: P,
) -> Result<Vec<RawRow>, StoreError> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params)?;

    let mut raw_rows = Vec::new();
    while let Some(row) = rows.next()? {
        let mut raw = RawRow::new();
        for (idx, column) in columns.iter().enumerate() {
            raw.insert(column.clone(), row.get::<_, SqlValue>(idx)?);
        }
        raw_rows.push(raw);
    }

    Ok(raw_rows)
}

/// Builds an [`Activity`] from a raw activity row.
///
/// # Errors
///
/// Returns `StoreError::Validation` naming the first missing or malformed
/// column.
pub fn activity_from_raw(row: &RawRow) -> Result<Activity, StoreError> {
    let protocol_designation = required_text(row, COLUMN_PROTOCOL_DESIGNATION)?;
    let protocol: Protocol =
        protocol_designation
            .parse()
            .map_err(|e: authledger_types::ParseProtocolError| {
                invalid(COLUMN_PROTOCOL_DESIGNATION, e.to_string())
            })?;

    Ok(Activity {
        service_provider: service_provider_from_raw(row)?,
        user: user_from_raw(row)?,
        happened_at: required_timestamp(row, COLUMN_HAPPENED_AT)?,
        client_ip_address: optional_text(row, COLUMN_CLIENT_IP_ADDRESS)?,
        protocol,
    })
}

/// Builds a [`ConnectedService`] from a raw connected service row.
///
/// # Errors
///
/// Returns `StoreError::Validation` naming the first missing or malformed
/// column.
pub fn connected_service_from_raw(row: &RawRow) -> Result<ConnectedService, StoreError> {
    let count = match required(row, COLUMN_NUMBER_OF_AUTHENTICATIONS)? {
        SqlValue::Integer(n) if *n >= 0 => *n as u64,
        other => {
            return Err(invalid(
                COLUMN_NUMBER_OF_AUTHENTICATIONS,
                format!("expected a non-negative integer, got {other:?}"),
            ))
        }
    };

    Ok(ConnectedService {
        service_provider: service_provider_from_raw(row)?,
        number_of_authentications: count,
        first_authentication_at: required_timestamp(row, COLUMN_FIRST_AUTHENTICATION_AT)?,
        last_authentication_at: required_timestamp(row, COLUMN_LAST_AUTHENTICATION_AT)?,
        user: user_from_raw(row)?,
    })
}

fn service_provider_from_raw(row: &RawRow) -> Result<Provider, StoreError> {
    Ok(Provider {
        entity_id: required_text(row, COLUMN_SP_ENTITY_ID)?.to_string(),
        metadata: required_json(row, COLUMN_SP_METADATA)?,
    })
}

fn user_from_raw(row: &RawRow) -> Result<User, StoreError> {
    Ok(User {
        identifier: required_text(row, COLUMN_USER_IDENTIFIER)?.to_string(),
        attributes: required_json(row, COLUMN_USER_ATTRIBUTES)?,
    })
}

fn invalid(column: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Validation {
        column: column.to_string(),
        reason: reason.into(),
    }
}

fn required<'r>(row: &'r RawRow, column: &str) -> Result<&'r SqlValue, StoreError> {
    match row.get(column) {
        None => Err(invalid(column, "column is missing from result")),
        Some(SqlValue::Null) => Err(invalid(column, "column is null")),
        Some(value) => Ok(value),
    }
}

fn required_text<'r>(row: &'r RawRow, column: &str) -> Result<&'r str, StoreError> {
    match required(row, column)? {
        SqlValue::Text(text) => Ok(text.as_str()),
        other => Err(invalid(column, format!("expected text, got {other:?}"))),
    }
}

fn optional_text(row: &RawRow, column: &str) -> Result<Option<String>, StoreError> {
    match row.get(column) {
        None => Err(invalid(column, "column is missing from result")),
        Some(SqlValue::Null) => Ok(None),
        Some(SqlValue::Text(text)) => Ok(Some(text.clone())),
        Some(other) => Err(invalid(column, format!("expected text, got {other:?}"))),
    }
}

fn required_timestamp(row: &RawRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = required_text(row, column)?;
    parse_timestamp(raw).map_err(|e| invalid(column, format!("bad timestamp '{raw}': {e}")))
}

fn required_json<T: DeserializeOwned>(row: &RawRow, column: &str) -> Result<T, StoreError> {
    let raw = required_text(row, column)?;
    serde_json::from_str(raw).map_err(|e| invalid(column, format!("bad JSON: {e}")))
}
