use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type GroupId = String;

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
}

/// One roster entry; `joinedAt` travels as an RFC 3339 string.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetail {
    #[serde(flatten)]
    pub user: User,
    pub joined_at: DateTime<Utc>,
}

/// Stored in the `groups` collection. `memberIds` and `memberDetails` hold
/// the same members, one entry each, in join order.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub invite_code: String,
    pub created_by: User,
    pub member_ids: Vec<UserId>,
    pub member_details: Vec<MemberDetail>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

/// Stored in the `expenses` collection. Immutable once written.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: String,
    pub group_id: GroupId,
    pub title: String,
    pub amount: f64,
    pub payer_id: UserId,
    pub payer_name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Per-user membership index (`users` collection), so listing a user's
/// groups doesn't scan the whole `groups` collection.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct UserIndex {
    #[serde(rename = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub groups: Vec<GroupId>,
}
