use async_graphql::{Context, Object, Result as GqlResult, ID};

use campus_core::{CampusError, StoreError};

use super::types::{
    parse_id, GqlAppointment, GqlBroadcast, GqlFaculty, GqlNotification, GqlUser,
};
use super::{auth_context, principal_or_null, store};
use crate::error::IntoGqlResult;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The signed-in user.
    async fn me(&self, ctx: &Context<'_>) -> GqlResult<Option<GqlUser>> {
        let Some(principal) = principal_or_null(ctx) else {
            return Ok(None);
        };
        let user = store(ctx)?.user(principal.user_id).into_gql()?;
        Ok(Some(user.into()))
    }

    /// Every faculty profile, ordered by name.
    async fn faculties(&self, ctx: &Context<'_>) -> GqlResult<Vec<GqlFaculty>> {
        Ok(store(ctx)?.faculties().into_iter().map(Into::into).collect())
    }

    /// A single faculty profile. Unknown ids resolve to null.
    async fn faculty(&self, ctx: &Context<'_>, id: ID) -> GqlResult<Option<GqlFaculty>> {
        let id = parse_id("id", &id).into_gql()?;
        match store(ctx)?.faculty(id) {
            Ok(faculty) => Ok(Some(faculty.into())),
            Err(CampusError::Store(StoreError::NotFound { .. })) => Ok(None),
            Err(e) => Err(e).into_gql(),
        }
    }

    /// Broadcasts addressed to the caller, newest first.
    async fn broadcasts(&self, ctx: &Context<'_>) -> GqlResult<Vec<GqlBroadcast>> {
        let role = auth_context(ctx).role();
        Ok(store(ctx)?
            .broadcasts_for(role)
            .into_iter()
            .map(Into::into)
            .collect())
    }

    /// Appointments the caller booked or hosts.
    async fn my_appointments(&self, ctx: &Context<'_>) -> GqlResult<Option<Vec<GqlAppointment>>> {
        let Some(principal) = principal_or_null(ctx) else {
            return Ok(None);
        };
        Ok(Some(
            store(ctx)?
                .appointments_for_user(principal.user_id)
                .into_iter()
                .map(Into::into)
                .collect(),
        ))
    }

    async fn my_notifications(
        &self,
        ctx: &Context<'_>,
    ) -> GqlResult<Option<Vec<GqlNotification>>> {
        let Some(principal) = principal_or_null(ctx) else {
            return Ok(None);
        };
        Ok(Some(
            store(ctx)?
                .notifications_for(principal.user_id)
                .into_iter()
                .map(Into::into)
                .collect(),
        ))
    }
}
