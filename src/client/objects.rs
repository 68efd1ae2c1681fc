//! Object CRUD, including lookup by alias (spec §4.2 secondary key
//! `(type_id, alias, organization_id)`).

use reqwest::Method;
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::error::{AuthzError, AuthzResult};
use crate::model::Object;
use crate::sentinel::SentinelKind;

use super::op::{run_delete, run_read, run_write};
use super::AuthzClient;

impl AuthzClient {
    pub async fn create_object(
        &self,
        type_id: Uuid,
        alias: Option<String>,
        organization_id: Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<Object> {
        if type_id == Uuid::nil() {
            return Err(AuthzError::Validation("type_id must not be nil".into()));
        }

        let alias_component = alias.as_deref().unwrap_or("");

        if options.if_not_exists && !alias_component.is_empty() {
            if let Ok(existing) = self
                .get_object_by_alias(&type_id, alias_component, &organization_id, options)
                .await
            {
                return Ok(existing);
            }
        }

        let id = Uuid::new_v4();
        let caps = self
            .cache()
            .object_capabilities(&id, &type_id, alias_component, &organization_id);

        #[derive(serde::Serialize)]
        struct CreateBody {
            id: Uuid,
            alias: Option<String>,
            type_id: Uuid,
            organization_id: Uuid,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, true, options.deadline, || async {
            self.http
                .request(
                    Method::POST,
                    "/objects",
                    Some(&CreateBody {
                        id,
                        alias: alias.clone(),
                        type_id,
                        organization_id,
                    }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn get_object(&self, id: &Uuid, options: &RequestOptions) -> AuthzResult<Object> {
        let caps = self
            .cache()
            .object_capabilities(id, &Uuid::nil(), "", &Uuid::nil());
        run_read(self.cache(), &caps, options.bypass_cache, options.deadline, || async {
            self.http
                .request::<(), _>(Method::GET, &format!("/objects/{id}"), None, options)
                .await
        })
        .await
    }

    pub async fn get_object_by_alias(
        &self,
        type_id: &Uuid,
        alias: &str,
        organization_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<Object> {
        if alias.is_empty() {
            return Err(AuthzError::Validation("alias must not be empty".into()));
        }

        let key = self.cache().key_names().name(crate::keys::KeyRole::SecondaryByAlias {
            type_id,
            alias,
            organization_id,
        });

        if !options.bypass_cache {
            if let Some(value) = self.cache().provider().get_value(&key).await? {
                if !crate::sentinel::SentinelManager::is_sentinel(&value)
                    && !crate::sentinel::SentinelManager::is_tombstone(&value)
                {
                    return Ok(serde_json::from_str(&value)?);
                }
            }
        }

        self.http
            .request::<(), _>(
                Method::GET,
                &format!("/objects/by-alias/{type_id}/{organization_id}/{alias}"),
                None,
                options,
            )
            .await
    }

    pub async fn update_object(
        &self,
        id: &Uuid,
        type_id: &Uuid,
        alias: Option<String>,
        organization_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<Object> {
        let alias_component = alias.as_deref().unwrap_or("");
        let caps = self
            .cache()
            .object_capabilities(id, type_id, alias_component, organization_id);

        #[derive(serde::Serialize)]
        struct UpdateBody {
            alias: Option<String>,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, false, options.deadline, || async {
            self.http
                .request(
                    Method::PUT,
                    &format!("/objects/{id}"),
                    Some(&UpdateBody { alias: alias.clone() }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn delete_object(
        &self,
        id: &Uuid,
        type_id: &Uuid,
        alias: Option<&str>,
        organization_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<()> {
        let caps =
            self.cache()
                .object_capabilities(id, type_id, alias.unwrap_or(""), organization_id);
        run_delete(self.cache(), &caps, options.deadline, || async {
            self.http
                .request::<(), ()>(Method::DELETE, &format!("/objects/{id}"), None, options)
                .await
        })
        .await
    }

    pub async fn list_objects(
        &self,
        options: &RequestOptions,
    ) -> AuthzResult<crate::http::PagePayload<Object>> {
        self.http
            .request::<(), _>(Method::GET, "/objects", None, options)
            .await
    }
}
