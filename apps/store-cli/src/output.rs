//! JSON rendering of records and RFC 3339 time helpers.

use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use domain::{Attributes, Installation, Tag, UpgradeRecord};
use serde::Serialize;
use serde_json::Value;

/// Format a `SystemTime` as RFC 3339 UTC with millisecond precision.
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp (any offset) into a `SystemTime`.
pub fn parse_rfc3339(s: &str) -> Result<SystemTime, chrono::ParseError> {
    let dt = DateTime::parse_from_rfc3339(s)?;
    Ok(dt.with_timezone(&Utc).into())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallationOut<'a> {
    id: &'a str,
    additional_information: &'a Attributes,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagOut<'a> {
    id: &'a str,
    name: &'a str,
    description: Option<&'a str>,
    organization_id: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpgradeOut<'a> {
    name: &'a str,
    applied_at: String,
}

pub fn installation_json(i: &Installation) -> serde_json::Result<Value> {
    serde_json::to_value(InstallationOut {
        id: &i.id,
        additional_information: &i.additional_information,
        created_at: system_time_to_rfc3339(i.created_at),
        updated_at: system_time_to_rfc3339(i.updated_at),
    })
}

pub fn tag_json(t: &Tag) -> serde_json::Result<Value> {
    serde_json::to_value(TagOut {
        id: &t.id,
        name: &t.name,
        description: t.description.as_deref(),
        organization_id: &t.organization_id,
        created_at: system_time_to_rfc3339(t.created_at),
        updated_at: system_time_to_rfc3339(t.updated_at),
    })
}

pub fn upgrade_json(u: &UpgradeRecord) -> serde_json::Result<Value> {
    serde_json::to_value(UpgradeOut {
        name: &u.name,
        applied_at: system_time_to_rfc3339(u.applied_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn rfc3339_roundtrip_at_millis() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let s = system_time_to_rfc3339(t);
        assert_eq!(s, "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_rfc3339(&s).unwrap(), t);
    }

    #[test]
    fn parse_accepts_offsets_and_rejects_garbage() {
        let t = parse_rfc3339("2023-11-14T23:13:20+01:00").unwrap();
        assert_eq!(t, UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        assert!(parse_rfc3339("yesterday").is_err());
    }

    #[test]
    fn upgrade_json_uses_camel_case() {
        let v = upgrade_json(&UpgradeRecord {
            name: "v1".into(),
            applied_at: UNIX_EPOCH,
        })
        .unwrap();
        assert_eq!(v["name"], "v1");
        assert_eq!(v["appliedAt"], "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn tag_json_keeps_null_description() {
        let v = tag_json(&Tag {
            id: "t1".into(),
            name: "prod".into(),
            description: None,
            organization_id: "DEFAULT".into(),
            created_at: UNIX_EPOCH,
            updated_at: UNIX_EPOCH + Duration::from_millis(5),
        })
        .unwrap();
        assert_eq!(v["organizationId"], "DEFAULT");
        assert!(v["description"].is_null());
        assert_eq!(v["updatedAt"], "1970-01-01T00:00:00.005Z");
        assert!(v.get("organization_id").is_none());
    }

    #[test]
    fn installation_json_nests_the_attribute_map() {
        let mut attrs = Attributes::new();
        attrs.insert("region".into(), "eu-north-1".into());
        let v = installation_json(&Installation {
            id: "inst".into(),
            additional_information: attrs,
            created_at: UNIX_EPOCH,
            updated_at: UNIX_EPOCH,
        })
        .unwrap();
        assert_eq!(v["additionalInformation"]["region"], "eu-north-1");
        assert_eq!(v["createdAt"], "1970-01-01T00:00:00.000Z");
    }
}
