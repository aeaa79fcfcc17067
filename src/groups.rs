use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, DateTime as BsonDateTime};
use mongodb::options::UpdateOptions;
use mongodb::{Collection, Database};
use serde::Serialize;
use tracing::{info, warn};

use crate::balance::{calculate_balances, Balances};
use crate::error::SplitError;
use crate::expenses;
use crate::invite;
use crate::schemas::{Group, GroupId, MemberDetail, User, UserIndex};

pub(crate) fn groups(db: &Database) -> Collection<Group> {
    db.collection("groups")
}

fn users(db: &Database) -> Collection<UserIndex> {
    db.collection("users")
}

impl Group {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|id| id == user_id)
    }

    /// Appends the user to both sides of the roster. Repeat joins are
    /// rejected, not absorbed.
    pub fn admit(&mut self, user: User, joined_at: DateTime<Utc>) -> Result<(), SplitError> {
        if self.has_member(&user.id) {
            return Err(SplitError::AlreadyMember);
        }
        self.member_ids.push(user.id.clone());
        self.member_details.push(MemberDetail { user, joined_at });
        self.updated_at = joined_at;
        Ok(())
    }

    /// Removes the user from both sides of the roster; unknown ids are a
    /// silent no-op. Expenses they paid stay in the ledger untouched.
    pub fn retire(&mut self, user_id: &str) {
        self.member_ids.retain(|id| id != user_id);
        self.member_details.retain(|member| member.user.id != user_id);
    }
}

/// A group dressed up for the dashboard: the document plus its current
/// balances.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupOverview {
    #[serde(flatten)]
    pub group: Group,
    pub balances: Balances,
}

pub async fn create_group(
    db: &Database,
    name: &str,
    description: &str,
    creator: &User,
) -> Result<Group, SplitError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SplitError::Validation("group name must not be empty".into()));
    }

    let invite_code = invite::issue_unique_code(&groups(db)).await?;
    let now = Utc::now();
    let group = Group {
        id: ObjectId::new().to_hex(),
        name: name.to_string(),
        description: description.trim().to_string(),
        invite_code,
        created_by: creator.clone(),
        member_ids: vec![creator.id.clone()],
        member_details: vec![MemberDetail {
            user: creator.clone(),
            joined_at: now,
        }],
        created_at: now,
        updated_at: now,
    };

    groups(db).insert_one(&group, None).await?;
    register_group(db, &creator.id, &group.id).await?;
    info!(group = %group.id, code = %group.invite_code, "group created");
    Ok(group)
}

pub async fn get_group(db: &Database, group_id: &str) -> Result<Group, SplitError> {
    groups(db)
        .find_one(doc! { "id": group_id }, None)
        .await?
        .ok_or(SplitError::NotFound("group"))
}

/// Resolves the invite code to exactly one group and admits the user. The
/// membership append goes through the store's atomic array operators, so
/// two concurrent joins lose neither membership.
pub async fn join_group(db: &Database, invite_code: &str, user: &User) -> Result<Group, SplitError> {
    let code = invite::normalize_code(invite_code);
    if code.is_empty() {
        return Err(SplitError::Validation("invite code must not be empty".into()));
    }

    let mut matches: Vec<Group> = groups(db)
        .find(doc! { "inviteCode": &code }, None)
        .await?
        .try_collect()
        .await?;
    if matches.len() > 1 {
        return Err(SplitError::Inconsistent(format!(
            "invite code {code} belongs to {} groups",
            matches.len()
        )));
    }
    let mut group = matches.pop().ok_or(SplitError::InvalidCode)?;

    let now = Utc::now();
    group.admit(user.clone(), now)?;

    let detail = to_bson(&MemberDetail {
        user: user.clone(),
        joined_at: now,
    })
    .map_err(mongodb::error::Error::from)?;
    groups(db)
        .update_one(
            doc! { "id": &group.id },
            doc! {
                "$addToSet": { "memberIds": &user.id },
                "$push": { "memberDetails": detail },
                "$set": { "updatedAt": BsonDateTime::from_chrono(now) },
            },
            None,
        )
        .await?;
    register_group(db, &user.id, &group.id).await?;
    info!(group = %group.id, user = %user.id, "member joined");
    Ok(group)
}

/// Removes the member from the roster and the group from their index. A
/// missing group or membership entry is tolerated silently, matching the
/// contract callers rely on; `Ok(None)` reports the group was gone.
/// Expenses the member paid stay in the ledger untouched.
pub async fn leave_group(
    db: &Database,
    group_id: &str,
    user_id: &str,
) -> Result<Option<Group>, SplitError> {
    let Some(mut group) = groups(db).find_one(doc! { "id": group_id }, None).await? else {
        warn!(group = group_id, "leave requested for an unknown group");
        unregister_group(db, user_id, group_id).await?;
        return Ok(None);
    };

    let now = Utc::now();
    groups(db)
        .update_one(
            doc! { "id": group_id },
            doc! {
                "$pull": {
                    "memberIds": user_id,
                    "memberDetails": { "id": user_id },
                },
                "$set": { "updatedAt": BsonDateTime::from_chrono(now) },
            },
            None,
        )
        .await?;
    group.retire(user_id);
    group.updated_at = now;
    unregister_group(db, user_id, group_id).await?;
    info!(group = group_id, user = user_id, "member left");
    Ok(Some(group))
}

/// Every group in the user's index, each with its balances attached,
/// newest first. Groups that fail to load are skipped rather than failing
/// the whole listing.
pub async fn user_groups(db: &Database, user_id: &str) -> Result<Vec<GroupOverview>, SplitError> {
    let index = users(db).find_one(doc! { "_id": user_id }, None).await?;
    let group_ids = index.map(|index| index.groups).unwrap_or_default();

    let mut overviews = Vec::with_capacity(group_ids.len());
    for group_id in group_ids {
        match load_overview(db, &group_id).await {
            Ok(overview) => overviews.push(overview),
            Err(err) => warn!(group = %group_id, error = %err, "skipping unloadable group"),
        }
    }
    overviews.sort_by(|a, b| b.group.created_at.cmp(&a.group.created_at));
    Ok(overviews)
}

async fn load_overview(db: &Database, group_id: &GroupId) -> Result<GroupOverview, SplitError> {
    let group = get_group(db, group_id).await?;
    let expenses = expenses::group_expenses(db, group_id).await?;
    let balances = calculate_balances(&expenses, &group.member_ids)?;
    Ok(GroupOverview { group, balances })
}

async fn register_group(db: &Database, user_id: &str, group_id: &str) -> Result<(), SplitError> {
    let options = UpdateOptions::builder().upsert(true).build();
    users(db)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$addToSet": { "groups": group_id } },
            options,
        )
        .await?;
    Ok(())
}

async fn unregister_group(db: &Database, user_id: &str, group_id: &str) -> Result<(), SplitError> {
    users(db)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$pull": { "groups": group_id } },
            None,
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            display_name: id.to_string(),
            email: format!("{id}@example.com"),
        }
    }

    fn group_of(creator: &str) -> Group {
        let now = Utc::now();
        let creator = user(creator);
        Group {
            id: "group-1".to_string(),
            name: "Flat 12".to_string(),
            description: String::new(),
            invite_code: "AB12CD".to_string(),
            created_by: creator.clone(),
            member_ids: vec![creator.id.clone()],
            member_details: vec![MemberDetail {
                user: creator,
                joined_at: now,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admitting_keeps_both_roster_sides_in_lockstep() {
        let mut group = group_of("ana");
        group.admit(user("bea"), Utc::now()).unwrap();

        assert_eq!(group.member_ids, vec!["ana", "bea"]);
        assert_eq!(group.member_details.len(), 2);
        assert_eq!(group.member_details[1].user.id, "bea");
    }

    #[test]
    fn second_join_is_rejected_and_adds_nobody() {
        let mut group = group_of("ana");
        group.admit(user("bea"), Utc::now()).unwrap();
        let repeat = group.admit(user("bea"), Utc::now());

        assert!(matches!(repeat, Err(SplitError::AlreadyMember)));
        assert_eq!(group.member_ids.len(), 2);
        assert_eq!(group.member_details.len(), 2);
    }

    #[test]
    fn creator_cannot_rejoin_their_own_group() {
        let mut group = group_of("ana");
        assert!(matches!(
            group.admit(user("ana"), Utc::now()),
            Err(SplitError::AlreadyMember)
        ));
    }

    #[test]
    fn retiring_removes_both_sides_and_tolerates_strangers() {
        let mut group = group_of("ana");
        group.admit(user("bea"), Utc::now()).unwrap();

        group.retire("ana");
        assert!(!group.has_member("ana"));
        assert_eq!(group.member_ids, vec!["bea"]);
        assert_eq!(group.member_details.len(), 1);

        group.retire("nobody");
        assert_eq!(group.member_ids, vec!["bea"]);
    }

    #[test]
    fn a_retired_member_disappears_from_the_balance_map() {
        let mut group = group_of("ana");
        group.admit(user("bea"), Utc::now()).unwrap();
        group.retire("bea");

        let balances = calculate_balances(&[], &group.member_ids).unwrap();
        assert!(balances.contains_key("ana"));
        assert!(!balances.contains_key("bea"));
    }
}
