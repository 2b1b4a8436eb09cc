//! Mapping raw source records into destination rows
//!
//! One pure function per entity kind, emitting values in the kind's fixed
//! column order. The primary key is the only hard requirement: a record
//! without a usable `ID` fails on its own, the rest of the batch proceeds.
//! Every record carries its full raw form in the trailing passthrough
//! column, so fields outside the typed layout are captured, not dropped.

use thiserror::Error;

use crate::entity::EntityKind;
use crate::record::{
    coerce_date, coerce_decimal, coerce_flag, coerce_i64, coerce_ref, coerce_text,
    coerce_timestamp, first_comm_value, MappedRow, RawRecord, Value,
};

/// Owner type code the source uses for activities attached to a deal
const DEAL_OWNER_TYPE: i64 = 2;

/// Telephony provider whose activities carry a call duration in
/// `RESULT_VALUE`
const TELEPHONY_PROVIDER: &str = "VOXIMPLANT";

/// A record that cannot be mapped
#[derive(Debug, Error)]
pub enum MapError {
    /// The page entry is not a JSON object
    #[error("record is not an object")]
    NotAnObject,

    /// The record has no usable primary key
    #[error("record is missing primary key field '{0}'")]
    MissingPrimaryKey(&'static str),
}

/// Map one raw record into a destination row for the given kind.
pub fn map_record(kind: EntityKind, raw: &RawRecord) -> Result<MappedRow, MapError> {
    if !raw.is_object() {
        return Err(MapError::NotAnObject);
    }
    let pk = coerce_i64(raw.field("ID")).ok_or(MapError::MissingPrimaryKey("ID"))?;

    let values = match kind {
        EntityKind::Manager => map_manager(pk, raw),
        EntityKind::Company => map_company(pk, raw),
        EntityKind::Contact => map_contact(pk, raw),
        EntityKind::Lead => map_lead(pk, raw),
        EntityKind::Deal => map_deal(pk, raw),
        EntityKind::Activity => map_activity(pk, raw),
    };
    debug_assert_eq!(values.len(), kind.columns().len());

    Ok(MappedRow { pk, values })
}

/// Deal affected by a freshly written row, if any: deals themselves, and
/// activities owned by a deal.
pub fn affected_deal(kind: EntityKind, pk: i64, raw: &RawRecord) -> Option<i64> {
    match kind {
        EntityKind::Deal => Some(pk),
        EntityKind::Activity => {
            if coerce_i64(raw.field("OWNER_TYPE_ID")) == Some(DEAL_OWNER_TYPE) {
                coerce_ref(raw.field("OWNER_ID"))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn map_manager(pk: i64, raw: &RawRecord) -> Vec<Value> {
    vec![
        Value::Int(Some(pk)),
        Value::Text(coerce_text(raw.field("NAME"))),
        Value::Text(coerce_text(raw.field("LAST_NAME"))),
        Value::Text(coerce_text(raw.field("EMAIL"))),
        Value::Text(coerce_text(raw.field("WORK_POSITION"))),
        Value::Text(coerce_text(raw.field("PERSONAL_PHONE"))),
        Value::Text(coerce_text(raw.field("PERSONAL_MOBILE"))),
        Value::Timestamp(coerce_timestamp(raw.field("TIMESTAMP_X"))),
        Value::Json(raw.as_json().clone()),
    ]
}

fn map_company(pk: i64, raw: &RawRecord) -> Vec<Value> {
    vec![
        Value::Int(Some(pk)),
        Value::Text(coerce_text(raw.field("TITLE"))),
        Value::Text(coerce_text(raw.field("COMPANY_TYPE"))),
        Value::Text(coerce_text(raw.field("INDUSTRY"))),
        Value::Decimal(coerce_decimal(raw.field("REVENUE"))),
        Value::Text(coerce_text(raw.field("CURRENCY_ID"))),
        Value::Text(coerce_text(raw.field("EMPLOYEES"))),
        Value::Text(first_comm_value(raw.field("EMAIL"))),
        Value::Text(first_comm_value(raw.field("PHONE"))),
        Value::Int(coerce_ref(raw.field("ASSIGNED_BY_ID"))),
        Value::Int(coerce_ref(raw.field("CREATED_BY_ID"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_CREATE"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_MODIFY"))),
        Value::Json(raw.as_json().clone()),
    ]
}

fn map_contact(pk: i64, raw: &RawRecord) -> Vec<Value> {
    // full name assembled from the present parts
    let full_name = {
        let parts: Vec<&str> = [
            raw.str_field("NAME"),
            raw.str_field("SECOND_NAME"),
            raw.str_field("LAST_NAME"),
        ]
        .into_iter()
        .flatten()
        .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    };

    vec![
        Value::Int(Some(pk)),
        Value::Text(coerce_text(raw.field("NAME"))),
        Value::Text(coerce_text(raw.field("LAST_NAME"))),
        Value::Text(coerce_text(raw.field("SECOND_NAME"))),
        Value::Text(full_name),
        Value::Text(first_comm_value(raw.field("EMAIL"))),
        Value::Text(first_comm_value(raw.field("PHONE"))),
        Value::Text(coerce_text(raw.field("POST"))),
        Value::Date(coerce_date(raw.field("BIRTHDATE"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_CREATE"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_MODIFY"))),
        Value::Int(coerce_ref(raw.field("COMPANY_ID"))),
        Value::Int(coerce_ref(raw.field("ASSIGNED_BY_ID"))),
        Value::Int(coerce_ref(raw.field("CREATED_BY_ID"))),
        Value::Text(coerce_text(raw.field("SOURCE_ID"))),
        Value::Text(coerce_text(raw.field("SOURCE_DESCRIPTION"))),
        Value::Json(raw.as_json().clone()),
    ]
}

fn map_lead(pk: i64, raw: &RawRecord) -> Vec<Value> {
    vec![
        Value::Int(Some(pk)),
        Value::Text(coerce_text(raw.field("TITLE"))),
        Value::Text(coerce_text(raw.field("NAME"))),
        Value::Text(coerce_text(raw.field("LAST_NAME"))),
        Value::Text(coerce_text(raw.field("SECOND_NAME"))),
        Value::Text(coerce_text(raw.field("STATUS_ID"))),
        Value::Text(coerce_text(raw.field("STATUS_SEMANTIC_ID"))),
        Value::Decimal(coerce_decimal(raw.field("OPPORTUNITY"))),
        Value::Text(coerce_text(raw.field("CURRENCY_ID"))),
        Value::Int(coerce_ref(raw.field("COMPANY_ID"))),
        Value::Int(coerce_ref(raw.field("CONTACT_ID"))),
        Value::Int(coerce_ref(raw.field("ASSIGNED_BY_ID"))),
        Value::Int(coerce_ref(raw.field("CREATED_BY_ID"))),
        Value::Text(coerce_text(raw.field("SOURCE_ID"))),
        Value::Text(coerce_text(raw.field("SOURCE_DESCRIPTION"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_CREATE"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_MODIFY"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_CLOSED"))),
        Value::Json(raw.as_json().clone()),
    ]
}

fn map_deal(pk: i64, raw: &RawRecord) -> Vec<Value> {
    let currency = coerce_text(raw.field("CURRENCY_ID")).or_else(|| Some("RUB".to_string()));

    vec![
        Value::Int(Some(pk)),
        Value::Text(coerce_text(raw.field("TITLE"))),
        Value::Text(coerce_text(raw.field("STAGE_ID"))),
        Value::Text(coerce_text(raw.field("STAGE_SEMANTIC_ID"))),
        Value::Int(coerce_i64(raw.field("PROBABILITY"))),
        Value::Decimal(coerce_decimal(raw.field("OPPORTUNITY"))),
        Value::Text(currency),
        Value::Bool(coerce_flag(raw.field("IS_MANUAL_OPPORTUNITY"))),
        Value::Decimal(coerce_decimal(raw.field("TAX_VALUE"))),
        Value::Int(coerce_ref(raw.field("COMPANY_ID"))),
        Value::Int(coerce_ref(raw.field("CONTACT_ID"))),
        Value::Int(coerce_ref(raw.field("LEAD_ID"))),
        Value::Int(coerce_ref(raw.field("ASSIGNED_BY_ID"))),
        Value::Int(coerce_ref(raw.field("CREATED_BY_ID"))),
        Value::Bool(coerce_flag(raw.field("CLOSED"))),
        Value::Timestamp(coerce_timestamp(raw.field("BEGINDATE"))),
        Value::Timestamp(coerce_timestamp(raw.field("CLOSEDATE"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_CREATE"))),
        Value::Timestamp(coerce_timestamp(raw.field("DATE_MODIFY"))),
        Value::Text(coerce_text(raw.field("UTM_SOURCE"))),
        Value::Text(coerce_text(raw.field("UTM_MEDIUM"))),
        Value::Text(coerce_text(raw.field("UTM_CAMPAIGN"))),
        Value::Text(coerce_text(raw.field("UTM_CONTENT"))),
        Value::Text(coerce_text(raw.field("UTM_TERM"))),
        Value::Text(coerce_text(raw.field("SOURCE_ID"))),
        Value::Text(coerce_text(raw.field("SOURCE_DESCRIPTION"))),
        Value::Json(raw.as_json().clone()),
    ]
}

fn map_activity(pk: i64, raw: &RawRecord) -> Vec<Value> {
    // only the telephony provider reports a duration worth keeping
    let call_duration = match raw.str_field("PROVIDER_ID") {
        Some(TELEPHONY_PROVIDER) => coerce_i64(raw.field("RESULT_VALUE")),
        _ => None,
    };

    vec![
        Value::Int(Some(pk)),
        Value::Int(coerce_ref(raw.field("OWNER_ID"))),
        Value::Int(coerce_i64(raw.field("OWNER_TYPE_ID"))),
        Value::Int(coerce_i64(raw.field("TYPE_ID"))),
        Value::Text(coerce_text(raw.field("PROVIDER_ID"))),
        Value::Text(coerce_text(raw.field("PROVIDER_TYPE_ID"))),
        Value::Text(coerce_text(raw.field("SUBJECT"))),
        Value::Text(coerce_text(raw.field("DESCRIPTION"))),
        Value::Text(coerce_text(raw.field("DESCRIPTION_TYPE"))),
        Value::Int(coerce_i64(raw.field("DIRECTION"))),
        Value::Int(coerce_i64(raw.field("PRIORITY"))),
        Value::Int(coerce_i64(raw.field("STATUS"))),
        Value::Bool(coerce_flag(raw.field("COMPLETED"))),
        Value::Timestamp(coerce_timestamp(raw.field("START_TIME"))),
        Value::Timestamp(coerce_timestamp(raw.field("END_TIME"))),
        Value::Timestamp(coerce_timestamp(raw.field("DEADLINE"))),
        Value::Timestamp(coerce_timestamp(raw.field("CREATED"))),
        Value::Timestamp(coerce_timestamp(raw.field("LAST_UPDATED"))),
        Value::Int(coerce_ref(raw.field("RESPONSIBLE_ID"))),
        Value::Int(coerce_ref(raw.field("AUTHOR_ID"))),
        Value::Int(call_duration),
        Value::Json(raw.as_json().clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_every_kind_matches_its_column_layout() {
        let raw = RawRecord::new(json!({"ID": "1"}));
        for kind in EntityKind::SYNC_ORDER {
            let row = map_record(kind, &raw).unwrap();
            assert_eq!(
                row.values.len(),
                kind.columns().len(),
                "{kind} layout mismatch"
            );
            assert_eq!(row.values[0], Value::Int(Some(1)), "{kind} pk position");
            assert!(
                matches!(row.values.last(), Some(Value::Json(_))),
                "{kind} passthrough position"
            );
        }
    }

    #[test]
    fn test_missing_primary_key_fails_single_record() {
        let raw = RawRecord::new(json!({"NAME": "no id"}));
        let err = map_record(EntityKind::Contact, &raw).unwrap_err();
        assert!(matches!(err, MapError::MissingPrimaryKey("ID")));

        let err = map_record(EntityKind::Contact, &RawRecord::new(json!("scalar"))).unwrap_err();
        assert!(matches!(err, MapError::NotAnObject));
    }

    #[test]
    fn test_deal_mapping() {
        let raw = RawRecord::new(json!({
            "ID": "501",
            "TITLE": "Annual license",
            "STAGE_ID": "WON",
            "PROBABILITY": "80",
            "OPPORTUNITY": "125000.50",
            "IS_MANUAL_OPPORTUNITY": "Y",
            "COMPANY_ID": "12",
            "CONTACT_ID": "0",
            "LEAD_ID": "33",
            "CLOSED": "N",
            "DATE_MODIFY": "2024-03-01T12:00:00+03:00",
            "EXTRA_FIELD": {"nested": true}
        }));
        let row = map_record(EntityKind::Deal, &raw).unwrap();
        let columns = EntityKind::Deal.columns();
        let value = |name: &str| {
            let idx = columns.iter().position(|c| *c == name).unwrap();
            &row.values[idx]
        };

        assert_eq!(row.pk, 501);
        assert_eq!(*value("probability"), Value::Int(Some(80)));
        assert_eq!(
            *value("opportunity"),
            Value::Decimal(Some("125000.50".parse().unwrap()))
        );
        assert_eq!(*value("is_manual_opportunity"), Value::Bool(Some(true)));
        assert_eq!(*value("closed"), Value::Bool(Some(false)));
        assert_eq!(*value("company_id"), Value::Int(Some(12)));
        // the source's 0 placeholder is no reference
        assert_eq!(*value("contact_id"), Value::Int(None));
        assert_eq!(*value("lead_id"), Value::Int(Some(33)));
        // absent currency falls back to the portal default
        assert_eq!(*value("currency_id"), Value::Text(Some("RUB".into())));
        assert_eq!(
            value("date_modify").as_timestamp().unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
        );
        // unknown fields survive in the passthrough
        assert_eq!(
            value("raw_data"),
            &Value::Json(raw.as_json().clone())
        );
    }

    #[test]
    fn test_contact_full_name_and_comm_fields() {
        let raw = RawRecord::new(json!({
            "ID": "9",
            "NAME": "Anna",
            "LAST_NAME": "Petrova",
            "EMAIL": [{"VALUE": "anna@example.com", "VALUE_TYPE": "WORK"}],
            "PHONE": []
        }));
        let row = map_record(EntityKind::Contact, &raw).unwrap();
        let columns = EntityKind::Contact.columns();
        let value = |name: &str| {
            let idx = columns.iter().position(|c| *c == name).unwrap();
            &row.values[idx]
        };

        assert_eq!(*value("full_name"), Value::Text(Some("Anna Petrova".into())));
        assert_eq!(
            *value("email"),
            Value::Text(Some("anna@example.com".into()))
        );
        assert_eq!(*value("phone"), Value::Text(None));
    }

    #[test]
    fn test_activity_call_duration_only_for_telephony() {
        let call = RawRecord::new(json!({
            "ID": "1",
            "PROVIDER_ID": "VOXIMPLANT",
            "RESULT_VALUE": "154"
        }));
        let row = map_record(EntityKind::Activity, &call).unwrap();
        let idx = EntityKind::Activity
            .columns()
            .iter()
            .position(|c| *c == "call_duration")
            .unwrap();
        assert_eq!(row.values[idx], Value::Int(Some(154)));

        let email = RawRecord::new(json!({
            "ID": "2",
            "PROVIDER_ID": "CRM_EMAIL",
            "RESULT_VALUE": "154"
        }));
        let row = map_record(EntityKind::Activity, &email).unwrap();
        assert_eq!(row.values[idx], Value::Int(None));
    }

    #[test]
    fn test_affected_deal() {
        let deal = RawRecord::new(json!({"ID": "5"}));
        assert_eq!(affected_deal(EntityKind::Deal, 5, &deal), Some(5));

        let deal_activity = RawRecord::new(json!({
            "ID": "40", "OWNER_TYPE_ID": "2", "OWNER_ID": "77"
        }));
        assert_eq!(
            affected_deal(EntityKind::Activity, 40, &deal_activity),
            Some(77)
        );

        let lead_activity = RawRecord::new(json!({
            "ID": "41", "OWNER_TYPE_ID": "1", "OWNER_ID": "78"
        }));
        assert_eq!(affected_deal(EntityKind::Activity, 41, &lead_activity), None);

        let contact = RawRecord::new(json!({"ID": "9"}));
        assert_eq!(affected_deal(EntityKind::Contact, 9, &contact), None);
    }
}
