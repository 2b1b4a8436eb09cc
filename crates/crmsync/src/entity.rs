//! Entity kinds and their fixed relational targets
//!
//! The entity set is closed and known at design time, so the dependency
//! ordering is a static list rather than a runtime topological sort. Each
//! kind carries its source endpoint, the field selection requested from the
//! source, and the destination column layout the mapper fills.

use std::fmt;

/// The six replicated entity kinds, in no particular order.
///
/// [`EntityKind::SYNC_ORDER`] is the order a run processes them in: every
/// kind a foreign key can reference comes before the referencing kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Manager,
    Company,
    Contact,
    Lead,
    Deal,
    Activity,
}

impl EntityKind {
    /// Dependency order for a run: parents before children.
    pub const SYNC_ORDER: [EntityKind; 6] = [
        EntityKind::Manager,
        EntityKind::Company,
        EntityKind::Contact,
        EntityKind::Lead,
        EntityKind::Deal,
        EntityKind::Activity,
    ];

    /// Destination table name
    pub fn table(self) -> &'static str {
        match self {
            Self::Manager => "managers",
            Self::Company => "companies",
            Self::Contact => "contacts",
            Self::Lead => "leads",
            Self::Deal => "deals",
            Self::Activity => "activities",
        }
    }

    /// Source API method for this kind
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Manager => "user.get",
            Self::Company => "crm.company.list",
            Self::Contact => "crm.contact.list",
            Self::Lead => "crm.lead.list",
            Self::Deal => "crm.deal.list",
            Self::Activity => "crm.activity.list",
        }
    }

    /// Source field holding the record's modification time, used for
    /// incremental selection.
    pub fn modified_field(self) -> &'static str {
        match self {
            Self::Manager => "TIMESTAMP_X",
            Self::Activity => "LAST_UPDATED",
            _ => "DATE_MODIFY",
        }
    }

    /// Destination column the modification time lands in; `max()` of this
    /// column is the kind's watermark.
    pub fn modified_column(self) -> &'static str {
        match self {
            Self::Activity => "last_updated",
            _ => "date_modify",
        }
    }

    /// Fields requested from the source. An empty list means the endpoint
    /// returns its full field set without an explicit selection.
    pub fn select_fields(self) -> &'static [&'static str] {
        match self {
            Self::Manager => &[],
            Self::Company => &[
                "ID",
                "TITLE",
                "COMPANY_TYPE",
                "INDUSTRY",
                "REVENUE",
                "CURRENCY_ID",
                "EMPLOYEES",
                "EMAIL",
                "PHONE",
                "ASSIGNED_BY_ID",
                "CREATED_BY_ID",
                "DATE_CREATE",
                "DATE_MODIFY",
            ],
            Self::Contact => &[
                "ID",
                "NAME",
                "LAST_NAME",
                "SECOND_NAME",
                "EMAIL",
                "PHONE",
                "POST",
                "BIRTHDATE",
                "DATE_CREATE",
                "DATE_MODIFY",
                "COMPANY_ID",
                "ASSIGNED_BY_ID",
                "CREATED_BY_ID",
                "SOURCE_ID",
                "SOURCE_DESCRIPTION",
            ],
            Self::Lead => &[
                "ID",
                "TITLE",
                "NAME",
                "LAST_NAME",
                "SECOND_NAME",
                "STATUS_ID",
                "STATUS_SEMANTIC_ID",
                "OPPORTUNITY",
                "CURRENCY_ID",
                "COMPANY_ID",
                "CONTACT_ID",
                "ASSIGNED_BY_ID",
                "CREATED_BY_ID",
                "SOURCE_ID",
                "SOURCE_DESCRIPTION",
                "DATE_CREATE",
                "DATE_MODIFY",
                "DATE_CLOSED",
            ],
            Self::Deal => &[
                "ID",
                "TITLE",
                "STAGE_ID",
                "STAGE_SEMANTIC_ID",
                "PROBABILITY",
                "OPPORTUNITY",
                "CURRENCY_ID",
                "IS_MANUAL_OPPORTUNITY",
                "TAX_VALUE",
                "COMPANY_ID",
                "CONTACT_ID",
                "LEAD_ID",
                "ASSIGNED_BY_ID",
                "CREATED_BY_ID",
                "CLOSED",
                "BEGINDATE",
                "CLOSEDATE",
                "DATE_CREATE",
                "DATE_MODIFY",
                "UTM_SOURCE",
                "UTM_MEDIUM",
                "UTM_CAMPAIGN",
                "UTM_CONTENT",
                "UTM_TERM",
                "SOURCE_ID",
                "SOURCE_DESCRIPTION",
            ],
            Self::Activity => &[
                "ID",
                "OWNER_ID",
                "OWNER_TYPE_ID",
                "TYPE_ID",
                "PROVIDER_ID",
                "PROVIDER_TYPE_ID",
                "SUBJECT",
                "DESCRIPTION",
                "DESCRIPTION_TYPE",
                "DIRECTION",
                "PRIORITY",
                "STATUS",
                "COMPLETED",
                "START_TIME",
                "END_TIME",
                "DEADLINE",
                "CREATED",
                "LAST_UPDATED",
                "RESPONSIBLE_ID",
                "AUTHOR_ID",
                "RESULT_VALUE",
                "COMMUNICATIONS",
            ],
        }
    }

    /// Destination column layout. The mapper emits one value per column in
    /// this order; the first column is always the primary key and the last
    /// is the raw-record passthrough.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Manager => &[
                "id",
                "name",
                "last_name",
                "email",
                "work_position",
                "personal_phone",
                "personal_mobile",
                "date_modify",
                "raw_data",
            ],
            Self::Company => &[
                "id",
                "title",
                "company_type",
                "industry",
                "revenue",
                "currency_id",
                "employees",
                "email",
                "phone",
                "assigned_by_id",
                "created_by_id",
                "date_create",
                "date_modify",
                "raw_data",
            ],
            Self::Contact => &[
                "id",
                "name",
                "last_name",
                "second_name",
                "full_name",
                "email",
                "phone",
                "post",
                "birthdate",
                "date_create",
                "date_modify",
                "company_id",
                "assigned_by_id",
                "created_by_id",
                "source_id",
                "source_description",
                "raw_data",
            ],
            Self::Lead => &[
                "id",
                "title",
                "name",
                "last_name",
                "second_name",
                "status_id",
                "status_semantic_id",
                "opportunity",
                "currency_id",
                "company_id",
                "contact_id",
                "assigned_by_id",
                "created_by_id",
                "source_id",
                "source_description",
                "date_create",
                "date_modify",
                "date_closed",
                "raw_data",
            ],
            Self::Deal => &[
                "id",
                "title",
                "stage_id",
                "stage_semantic_id",
                "probability",
                "opportunity",
                "currency_id",
                "is_manual_opportunity",
                "tax_value",
                "company_id",
                "contact_id",
                "lead_id",
                "assigned_by_id",
                "created_by_id",
                "closed",
                "begindate",
                "closedate",
                "date_create",
                "date_modify",
                "utm_source",
                "utm_medium",
                "utm_campaign",
                "utm_content",
                "utm_term",
                "source_id",
                "source_description",
                "raw_data",
            ],
            Self::Activity => &[
                "id",
                "owner_id",
                "owner_type_id",
                "type_id",
                "provider_id",
                "provider_type_id",
                "subject",
                "description",
                "description_type",
                "direction",
                "priority",
                "status",
                "completed",
                "start_time",
                "end_time",
                "deadline",
                "created",
                "last_updated",
                "responsible_id",
                "author_id",
                "call_duration",
                "raw_data",
            ],
        }
    }

    /// Kinds this kind's mapped rows can reference through foreign keys.
    pub fn references(self) -> &'static [EntityKind] {
        match self {
            Self::Manager => &[],
            Self::Company => &[EntityKind::Manager],
            Self::Contact => &[EntityKind::Manager, EntityKind::Company],
            Self::Lead => &[
                EntityKind::Manager,
                EntityKind::Company,
                EntityKind::Contact,
            ],
            Self::Deal => &[
                EntityKind::Manager,
                EntityKind::Company,
                EntityKind::Contact,
                EntityKind::Lead,
            ],
            Self::Activity => &[EntityKind::Manager, EntityKind::Deal],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}
