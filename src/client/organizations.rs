//! Organization CRUD. Region is validated locally before any cache or
//! network action (spec §7).

use reqwest::Method;
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::error::{AuthzError, AuthzResult};
use crate::model::{Organization, Region};
use crate::sentinel::SentinelKind;

use super::op::{run_delete, run_read, run_write};
use super::AuthzClient;

impl AuthzClient {
    pub async fn create_organization(
        &self,
        name: &str,
        region: Region,
        options: &RequestOptions,
    ) -> AuthzResult<Organization> {
        if name.trim().is_empty() {
            return Err(AuthzError::Validation("name must not be empty".into()));
        }

        let id = Uuid::new_v4();
        let caps = self.cache().organization_capabilities(&id);

        #[derive(serde::Serialize)]
        struct CreateBody<'a> {
            id: Uuid,
            name: &'a str,
            region: Region,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, true, options.deadline, || async {
            self.http
                .request(
                    Method::POST,
                    "/organizations",
                    Some(&CreateBody { id, name, region }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn get_organization(
        &self,
        id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<Organization> {
        let caps = self.cache().organization_capabilities(id);
        run_read(self.cache(), &caps, options.bypass_cache, options.deadline, || async {
            self.http
                .request::<(), _>(Method::GET, &format!("/organizations/{id}"), None, options)
                .await
        })
        .await
    }

    pub async fn update_organization(
        &self,
        id: &Uuid,
        name: &str,
        options: &RequestOptions,
    ) -> AuthzResult<Organization> {
        let caps = self.cache().organization_capabilities(id);

        #[derive(serde::Serialize)]
        struct UpdateBody<'a> {
            name: &'a str,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, false, options.deadline, || async {
            self.http
                .request(
                    Method::PUT,
                    &format!("/organizations/{id}"),
                    Some(&UpdateBody { name }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn delete_organization(&self, id: &Uuid, options: &RequestOptions) -> AuthzResult<()> {
        let caps = self.cache().organization_capabilities(id);
        run_delete(self.cache(), &caps, options.deadline, || async {
            self.http
                .request::<(), ()>(Method::DELETE, &format!("/organizations/{id}"), None, options)
                .await
        })
        .await
    }

    pub async fn list_organizations(
        &self,
        options: &RequestOptions,
    ) -> AuthzResult<crate::http::PagePayload<Organization>> {
        self.http
            .request::<(), _>(Method::GET, "/organizations", None, options)
            .await
    }
}
