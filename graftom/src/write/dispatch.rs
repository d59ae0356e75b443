use std::{future::Future, pin::Pin};

use log::debug;

use super::{WriteContext, many_to_many, one_to_many, one_to_one};
use crate::{errors::RepoError, input::RelationSubmissions, store::Store, types::RelationKind, types::Row};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Reconciles every submitted relation of `owner`, in submission order.
///
/// Boxed because reconcilers call back into it for nested submissions.
pub(crate) fn reconcile_all<'a, S>(
    cx: &'a WriteContext<'a>,
    store: &'a mut S,
    owner: &'a Row,
    relations: RelationSubmissions,
    depth: usize,
) -> BoxFuture<'a, Result<(), RepoError>>
where
    S: Store + ?Sized,
{
    Box::pin(async move {
        if relations.is_empty() {
            return Ok(());
        }
        if depth > cx.settings.max_nesting_depth {
            return Err(RepoError::NestingTooDeep {
                limit: cx.settings.max_nesting_depth,
            });
        }

        for (name, submission) in relations {
            debug!(
                "reconciling {:?} relation `{name}` of {} {} (depth {depth})",
                submission.kind(),
                owner.table,
                owner.key
            );
            match submission.kind() {
                RelationKind::OneToOne => {
                    one_to_one::reconcile(cx, store, owner, &submission, depth).await?;
                }
                RelationKind::OneToMany => one_to_many::reconcile(cx, store, owner, &submission, depth).await?,
                RelationKind::ManyToMany => many_to_many::reconcile(cx, store, owner, &submission).await?,
                RelationKind::BelongsTo => {
                    debug!("relation `{name}` is stored on the owner; nothing to reconcile");
                }
            }
        }
        Ok(())
    })
}
