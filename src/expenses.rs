use chrono::Utc;
use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use serde::Deserialize;
use tracing::info;

use crate::error::SplitError;
use crate::groups;
use crate::schemas::{Expense, UserId};

pub(crate) fn expenses(db: &Database) -> Collection<Expense> {
    db.collection("expenses")
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewExpense {
    pub title: String,
    pub amount: f64,
    pub payer_id: UserId,
}

/// Appends an immutable expense to the group's ledger. The payer must be a
/// current member; their display name is captured into the record at this
/// point so the ledger stays readable after they leave.
pub async fn add_expense(
    db: &Database,
    group_id: &str,
    new: NewExpense,
) -> Result<Expense, SplitError> {
    let title = validated_title(&new.title)?;
    let amount = validated_amount(new.amount)?;

    let group = groups::get_group(db, group_id).await?;
    let payer = group
        .member_details
        .iter()
        .find(|member| member.user.id == new.payer_id)
        .ok_or_else(|| SplitError::Validation("payer is not a member of this group".into()))?;

    let expense = Expense {
        id: ObjectId::new().to_hex(),
        group_id: group.id.clone(),
        title: title.to_string(),
        amount,
        payer_id: payer.user.id.clone(),
        payer_name: payer.user.display_name.clone(),
        created_at: Utc::now(),
    };
    expenses(db).insert_one(&expense, None).await?;
    info!(group = %group.id, payer = %expense.payer_id, amount, "expense added");
    Ok(expense)
}

/// All expenses of a group, newest first.
pub async fn group_expenses(db: &Database, group_id: &str) -> Result<Vec<Expense>, SplitError> {
    let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
    let cursor = expenses(db).find(doc! { "groupId": group_id }, options).await?;
    Ok(cursor.try_collect().await?)
}

fn validated_title(title: &str) -> Result<&str, SplitError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(SplitError::Validation("expense title must not be empty".into()));
    }
    Ok(title)
}

fn validated_amount(amount: f64) -> Result<f64, SplitError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(SplitError::Validation(
            "expense amount must be a positive number".into(),
        ));
    }
    Ok(amount)
}
