//! ObjectType CRUD. Deleting a type flushes the whole tenant cache
//! (spec §4.6): the fine-grained invalidation fan-out for "every object
//! of this type, every edge touching one" is unbounded, so the operation
//! takes the blunt instrument instead.

use reqwest::Method;
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::error::{AuthzError, AuthzResult};
use crate::model::ObjectType;
use crate::sentinel::SentinelKind;

use super::op::{run_delete, run_read, run_write};
use super::AuthzClient;

impl AuthzClient {
    pub async fn create_object_type(
        &self,
        type_name: &str,
        options: &RequestOptions,
    ) -> AuthzResult<ObjectType> {
        if type_name.trim().is_empty() {
            return Err(AuthzError::Validation("type_name must not be empty".into()));
        }

        if options.if_not_exists {
            if let Ok(existing) = self.get_object_type_by_name(type_name, options).await {
                return Ok(existing);
            }
        }

        let id = Uuid::new_v4();
        let caps = self.cache().object_type_capabilities(&id, type_name);

        #[derive(serde::Serialize)]
        struct CreateBody<'a> {
            id: Uuid,
            type_name: &'a str,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, true, options.deadline, || async {
            self.http
                .request(
                    Method::POST,
                    "/object-types",
                    Some(&CreateBody { id, type_name }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn get_object_type(
        &self,
        id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<ObjectType> {
        let caps = self.cache().object_type_capabilities(id, "");
        run_read(self.cache(), &caps, options.bypass_cache, options.deadline, || async {
            self.http
                .request::<(), _>(Method::GET, &format!("/object-types/{id}"), None, options)
                .await
        })
        .await
    }

    pub async fn get_object_type_by_name(
        &self,
        type_name: &str,
        options: &RequestOptions,
    ) -> AuthzResult<ObjectType> {
        self.http
            .request::<(), _>(
                Method::GET,
                &format!("/object-types/by-name/{type_name}"),
                None,
                options,
            )
            .await
    }

    pub async fn update_object_type(
        &self,
        id: &Uuid,
        type_name: &str,
        options: &RequestOptions,
    ) -> AuthzResult<ObjectType> {
        let caps = self.cache().object_type_capabilities(id, type_name);

        #[derive(serde::Serialize)]
        struct UpdateBody<'a> {
            type_name: &'a str,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, false, options.deadline, || async {
            self.http
                .request(
                    Method::PUT,
                    &format!("/object-types/{id}"),
                    Some(&UpdateBody { type_name }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn delete_object_type(&self, id: &Uuid, options: &RequestOptions) -> AuthzResult<()> {
        let caps = self.cache().object_type_capabilities(id, "");
        let result = run_delete(self.cache(), &caps, options.deadline, || async {
            self.http
                .request::<(), ()>(Method::DELETE, &format!("/object-types/{id}"), None, options)
                .await
        })
        .await;

        if result.is_ok() {
            tracing::info!(type_id = %id, "object type deleted, flushing cache");
            let _ = self
                .cache()
                .provider()
                .flush(&self.cache().tenant_prefix(), true)
                .await;
        }
        result
    }

    pub async fn list_object_types(
        &self,
        options: &RequestOptions,
    ) -> AuthzResult<crate::http::PagePayload<ObjectType>> {
        self.http
            .request::<(), _>(Method::GET, "/object-types", None, options)
            .await
    }
}
