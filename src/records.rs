//! Operator-configured static records.
//!
//! These are authoritative by configuration: the resolver answers from them
//! before contacting any upstream and never caches them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use crate::dns::{DnsRecord, RData, RecordType};
use crate::domain;
use crate::error::{ConfigError, WireError};
use crate::notice::Notice;

/// A record as stored in the JSON documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: RecordType,
    pub value: String,
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_query: Option<DateTime<Utc>>,
}

impl Record {
    /// Build a validated record, normalizing the name.
    pub fn new(name: &str, rtype: RecordType, value: &str, ttl: u32) -> Result<Self, ConfigError> {
        let name = domain::normalize(name);
        if name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        let value = RData::from_value(rtype, value)?.to_value();

        Ok(Self {
            name,
            rtype,
            value,
            ttl,
            last_query: None,
        })
    }

    /// Convert to a wire record with the given TTL.
    pub fn to_dns_record(&self, ttl: u32) -> Result<DnsRecord, WireError> {
        let data = RData::from_value(self.rtype, &self.value)?;
        Ok(DnsRecord::new(self.name.clone(), self.rtype, ttl, data))
    }
}

/// Static record table.
pub struct RecordStore {
    records: RwLock<Vec<Record>>,
}

impl RecordStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Records exactly matching `name` and `rtype`.
    pub fn lookup(&self, name: &str, rtype: RecordType) -> Vec<DnsRecord> {
        let name = domain::normalize(name);
        let Ok(records) = self.records.read() else {
            return Vec::new();
        };

        records
            .iter()
            .filter(|r| r.rtype == rtype && domain::normalize(&r.name) == name)
            .filter_map(|r| r.to_dns_record(r.ttl).ok())
            .collect()
    }

    pub fn add(&self, record: Record) -> Vec<Notice> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let exists = records
            .iter()
            .any(|r| r.name == record.name && r.rtype == record.rtype && r.value == record.value);
        if exists {
            return vec![Notice::warning(format!(
                "record {} {} {} already exists",
                record.name, record.rtype, record.value
            ))];
        }

        let notice = Notice::info(format!(
            "added record {} {} {}",
            record.name, record.rtype, record.value
        ));
        records.push(record);
        vec![notice]
    }

    /// Remove every record for `name`, optionally only of one type.
    pub fn remove(
        &self,
        name: &str,
        rtype: Option<RecordType>,
    ) -> Result<Vec<Notice>, ConfigError> {
        let name = domain::normalize(name);
        if name.is_empty() {
            return Err(ConfigError::MissingName);
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|r| {
            !(domain::normalize(&r.name) == name && rtype.is_none_or(|t| t == r.rtype))
        });
        let removed = before - records.len();

        if removed == 0 {
            return Ok(vec![Notice::warning(format!("no records found for {}", name))]);
        }
        Ok(vec![Notice::info(format!("removed {} record(s) for {}", removed, name))])
    }

    pub fn list(&self) -> Vec<Record> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
