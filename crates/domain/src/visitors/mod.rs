use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::Error;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct VisitorRecord {
    pub visitor_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub visits: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VisitorStatus {
    New,
    Returning { first_seen: DateTime<Utc> },
}

/// Records page visits per visitor id
#[async_trait]
pub trait VisitorLog: Send + Sync {
    async fn record(&self, visitor_id: &str) -> Result<VisitorStatus, Error>;
}

pub struct DynamoVisitorLog {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoVisitorLog {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl VisitorLog for DynamoVisitorLog {
    async fn record(&self, visitor_id: &str) -> Result<VisitorStatus, Error> {
        let now = Utc::now().to_rfc3339();

        let output = self
            .client
            .update_item()
            .table_name(&self.table)
            .key("visitor_id", AttributeValue::S(visitor_id.to_string()))
            .update_expression("SET first_seen = if_not_exists(first_seen, :now), last_seen = :now ADD visits :one")
            .expression_attribute_values(":now", AttributeValue::S(now))
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| Error::external("dynamodb", e.into_service_error()))?;

        let previous = match output.attributes() {
            Some(item) if !item.is_empty() => item.clone(),
            _ => {
                debug!(visitor_id, "New visitor");
                return Ok(VisitorStatus::New);
            }
        };

        let record: VisitorRecord = serde_dynamo::from_item(previous)
            .map_err(|e| Error::external("dynamodb", format!("malformed visitor record: {}", e)))?;
        debug!(visitor_id, visits = record.visits + 1, "Returning visitor");

        Ok(VisitorStatus::Returning {
            first_seen: record.first_seen,
        })
    }
}

/// Process-local log for local runs and tests
#[derive(Default)]
pub struct MemoryVisitorLog {
    records: Mutex<HashMap<String, VisitorRecord>>,
}

impl MemoryVisitorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, visitor_id: &str) -> Option<VisitorRecord> {
        self.records.lock().await.get(visitor_id).cloned()
    }
}

#[async_trait]
impl VisitorLog for MemoryVisitorLog {
    async fn record(&self, visitor_id: &str) -> Result<VisitorStatus, Error> {
        let now = Utc::now();
        let mut records = self.records.lock().await;

        match records.get_mut(visitor_id) {
            Some(record) => {
                record.last_seen = now;
                record.visits += 1;
                Ok(VisitorStatus::Returning {
                    first_seen: record.first_seen,
                })
            }
            None => {
                records.insert(
                    visitor_id.to_string(),
                    VisitorRecord {
                        visitor_id: visitor_id.to_string(),
                        first_seen: now,
                        last_seen: now,
                        visits: 1,
                    },
                );
                Ok(VisitorStatus::New)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_visit_is_new_then_returning() {
        let log = MemoryVisitorLog::new();

        assert_eq!(log.record("v1").await.unwrap(), VisitorStatus::New);
        let first_seen = log.get("v1").await.unwrap().first_seen;

        assert_eq!(
            log.record("v1").await.unwrap(),
            VisitorStatus::Returning { first_seen }
        );
        assert_eq!(log.get("v1").await.unwrap().visits, 2);
    }

    #[tokio::test]
    async fn visitors_are_tracked_separately() {
        let log = MemoryVisitorLog::new();

        log.record("v1").await.unwrap();
        assert_eq!(log.record("v2").await.unwrap(), VisitorStatus::New);
        assert!(log.get("v3").await.is_none());
    }

    #[test]
    fn stored_record_reads_back_from_dynamo_attributes() {
        let item: HashMap<String, AttributeValue> = HashMap::from([
            ("visitor_id".to_string(), AttributeValue::S("v1".to_string())),
            ("first_seen".to_string(), AttributeValue::S("2024-05-01T10:00:00+00:00".to_string())),
            ("last_seen".to_string(), AttributeValue::S("2024-05-02T10:00:00+00:00".to_string())),
            ("visits".to_string(), AttributeValue::N("4".to_string())),
        ]);

        let record: VisitorRecord = serde_dynamo::from_item(item).unwrap();

        assert_eq!(record.visits, 4);
        assert_eq!(record.first_seen.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }
}
