//! Resource pool request and response types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One group of identical hosts to procure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyGroup {
    /// `{role}_{n}`, prefixed with `{index}_` in batch requests
    pub group_mark: String,
    pub spec_id: u64,
    /// Hosts in this group
    pub count: u32,
    pub bk_cloud_id: u64,
    pub affinity: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub location_spec: Value,
    /// Extra filters (os type, nic, ...) merged from `resource_params`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pre-apply request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub for_biz_id: u64,
    /// DB group
    pub resource_type: String,
    /// Ticket id
    pub bill_id: u64,
    pub bill_type: String,
    /// Id of the execution node that consumes the hosts
    pub task_id: u64,
    pub operator: String,
    #[serde(default)]
    pub groups_in_same_location: bool,
    pub details: Vec<ApplyGroup>,
}

impl ApplyRequest {
    /// Repeating a request with the same key yields the same assignment.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.bill_id, self.task_id)
    }

    pub fn total_hosts(&self) -> u64 {
        self.details.iter().map(|g| u64::from(g.count)).sum()
    }
}

/// A procured host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostAssignment {
    pub bk_host_id: u64,
    pub ip: String,
    pub bk_cloud_id: u64,
    /// 0 for public pool hosts
    #[serde(default)]
    pub bk_biz_id: u64,
    /// Hardware and location facts (cpu, mem, sub_zone, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pre-apply response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub request_id: String,
    /// Hosts per group mark
    pub groups: BTreeMap<String, Vec<HostAssignment>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_flattens_extra_params() {
        let mut extra = Map::new();
        extra.insert("os_type".to_string(), json!("linux"));
        let group = ApplyGroup {
            group_mark: "proxy_0".to_string(),
            spec_id: 3,
            count: 2,
            bk_cloud_id: 0,
            affinity: "NONE".to_string(),
            location_spec: Value::Null,
            extra,
        };
        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(value["os_type"], "linux");
        assert!(value.get("location_spec").is_none());
    }

    #[test]
    fn test_idempotency_key() {
        let request = ApplyRequest {
            for_biz_id: 1,
            resource_type: "mysql".to_string(),
            bill_id: 10,
            bill_type: "MYSQL_HA_APPLY".to_string(),
            task_id: 12,
            operator: "admin".to_string(),
            groups_in_same_location: false,
            details: vec![],
        };
        assert_eq!(request.idempotency_key(), "10:12");
        assert_eq!(request.total_hosts(), 0);
    }
}
