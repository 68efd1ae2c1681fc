//! EdgeType CRUD. Like ObjectType, deletion flushes the whole tenant
//! cache rather than tracking every edge of this type individually.

use reqwest::Method;
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::error::{AuthzError, AuthzResult};
use crate::model::{EdgeAttribute, EdgeType};
use crate::sentinel::SentinelKind;

use super::op::{run_delete, run_read, run_write};
use super::AuthzClient;

impl AuthzClient {
    pub async fn create_edge_type(
        &self,
        type_name: &str,
        source_object_type_id: Uuid,
        target_object_type_id: Uuid,
        attributes: Vec<EdgeAttribute>,
        organization_id: Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<EdgeType> {
        if type_name.trim().is_empty() {
            return Err(AuthzError::Validation("type_name must not be empty".into()));
        }
        if source_object_type_id == Uuid::nil() {
            return Err(AuthzError::Validation(
                "source_object_type_id must not be nil".into(),
            ));
        }
        if target_object_type_id == Uuid::nil() {
            return Err(AuthzError::Validation(
                "target_object_type_id must not be nil".into(),
            ));
        }

        if options.if_not_exists {
            if let Ok(existing) = self
                .get_edge_type_by_name(type_name, &organization_id, options)
                .await
            {
                return Ok(existing);
            }
        }

        let id = Uuid::new_v4();
        let caps = self
            .cache()
            .edge_type_capabilities(&id, type_name, &organization_id);

        #[derive(serde::Serialize)]
        struct CreateBody<'a> {
            id: Uuid,
            type_name: &'a str,
            source_object_type_id: Uuid,
            target_object_type_id: Uuid,
            attributes: &'a [EdgeAttribute],
            organization_id: Uuid,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, true, options.deadline, || async {
            self.http
                .request(
                    Method::POST,
                    "/edge-types",
                    Some(&CreateBody {
                        id,
                        type_name,
                        source_object_type_id,
                        target_object_type_id,
                        attributes: &attributes,
                        organization_id,
                    }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn get_edge_type(
        &self,
        id: &Uuid,
        organization_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<EdgeType> {
        let caps = self.cache().edge_type_capabilities(id, "", organization_id);
        run_read(self.cache(), &caps, options.bypass_cache, options.deadline, || async {
            self.http
                .request::<(), _>(Method::GET, &format!("/edge-types/{id}"), None, options)
                .await
        })
        .await
    }

    pub async fn get_edge_type_by_name(
        &self,
        type_name: &str,
        organization_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<EdgeType> {
        self.http
            .request::<(), _>(
                Method::GET,
                &format!("/edge-types/by-name/{organization_id}/{type_name}"),
                None,
                options,
            )
            .await
    }

    pub async fn update_edge_type(
        &self,
        id: &Uuid,
        type_name: &str,
        attributes: Vec<EdgeAttribute>,
        organization_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<EdgeType> {
        let caps = self
            .cache()
            .edge_type_capabilities(id, type_name, organization_id);

        #[derive(serde::Serialize)]
        struct UpdateBody<'a> {
            type_name: &'a str,
            attributes: &'a [EdgeAttribute],
        }

        run_write(self.cache(), &caps, SentinelKind::Write, false, options.deadline, || async {
            self.http
                .request(
                    Method::PUT,
                    &format!("/edge-types/{id}"),
                    Some(&UpdateBody {
                        type_name,
                        attributes: &attributes,
                    }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn delete_edge_type(
        &self,
        id: &Uuid,
        organization_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<()> {
        let caps = self.cache().edge_type_capabilities(id, "", organization_id);
        let result = run_delete(self.cache(), &caps, options.deadline, || async {
            self.http
                .request::<(), ()>(Method::DELETE, &format!("/edge-types/{id}"), None, options)
                .await
        })
        .await;

        if result.is_ok() {
            tracing::info!(type_id = %id, "edge type deleted, flushing cache");
            let _ = self
                .cache()
                .provider()
                .flush(&self.cache().tenant_prefix(), true)
                .await;
        }
        result
    }

    pub async fn list_edge_types(
        &self,
        options: &RequestOptions,
    ) -> AuthzResult<crate::http::PagePayload<EdgeType>> {
        self.http
            .request::<(), _>(Method::GET, "/edge-types", None, options)
            .await
    }
}
