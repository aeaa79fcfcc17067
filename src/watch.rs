//! Push-based observers over the store's change streams. Callers register a
//! callback and get back a handle; the handle is the only way the stream
//! stays alive.

use futures::StreamExt;
use mongodb::bson::doc;
use mongodb::options::{ChangeStreamOptions, FullDocumentType};
use mongodb::Database;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::SplitError;
use crate::expenses;
use crate::groups;
use crate::schemas::{Expense, Group};

/// Handle to a live watcher. `cancel` is idempotent and stops any further
/// callback invocations; a callback already running finishes first, since
/// cancellation only lands at the stream's suspension points.
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Invokes the callback with the full document every time the group
/// changes, until cancelled.
pub async fn watch_group<F>(
    db: &Database,
    group_id: &str,
    mut callback: F,
) -> Result<Subscription, SplitError>
where
    F: FnMut(Group) + Send + 'static,
{
    let pipeline = [doc! { "$match": { "fullDocument.id": group_id } }];
    let options = ChangeStreamOptions::builder()
        .full_document(Some(FullDocumentType::UpdateLookup))
        .build();
    let mut events = groups::groups(db).watch(pipeline, options).await?;

    let handle = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(group) = event.full_document {
                        callback(group);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "group change stream failed");
                    break;
                }
            }
        }
    });
    Ok(Subscription { handle })
}

/// Invokes the callback with each expense newly appended to the group's
/// ledger, until cancelled.
pub async fn watch_group_expenses<F>(
    db: &Database,
    group_id: &str,
    mut callback: F,
) -> Result<Subscription, SplitError>
where
    F: FnMut(Expense) + Send + 'static,
{
    let pipeline = [doc! { "$match": {
        "operationType": "insert",
        "fullDocument.groupId": group_id,
    } }];
    let mut events = expenses::expenses(db).watch(pipeline, None).await?;

    let handle = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(expense) = event.full_document {
                        callback(expense);
                    }
                }
                Err(err) => {
                    warn!(error = %err, "expense change stream failed");
                    break;
                }
            }
        }
    });
    Ok(Subscription { handle })
}
