//! Edge CRUD. Edges register dependency keys on both endpoint objects
//! (see `CacheManager::edge_capabilities`), so invalidating either object
//! also invalidates any derived edge collection that includes this edge.

use reqwest::Method;
use uuid::Uuid;

use crate::config::RequestOptions;
use crate::error::{AuthzError, AuthzResult};
use crate::model::Edge;
use crate::sentinel::SentinelKind;

use super::op::{run_delete, run_write};
use super::AuthzClient;

impl AuthzClient {
    pub async fn create_edge(
        &self,
        edge_type_id: Uuid,
        source_object_id: Uuid,
        target_object_id: Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<Edge> {
        if edge_type_id == Uuid::nil() {
            return Err(AuthzError::Validation("edge_type_id must not be nil".into()));
        }
        if source_object_id == Uuid::nil() {
            return Err(AuthzError::Validation("source_object_id must not be nil".into()));
        }
        if target_object_id == Uuid::nil() {
            return Err(AuthzError::Validation("target_object_id must not be nil".into()));
        }

        let id = Uuid::new_v4();
        let caps = self
            .cache()
            .edge_capabilities(&id, &source_object_id, &target_object_id, &edge_type_id);

        #[derive(serde::Serialize)]
        struct CreateBody {
            id: Uuid,
            edge_type_id: Uuid,
            source_object_id: Uuid,
            target_object_id: Uuid,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, true, options.deadline, || async {
            self.http
                .request(
                    Method::POST,
                    "/edges",
                    Some(&CreateBody {
                        id,
                        edge_type_id,
                        source_object_id,
                        target_object_id,
                    }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn get_edge(&self, id: &Uuid, options: &RequestOptions) -> AuthzResult<Edge> {
        let key = self.cache().key_names().name(crate::keys::KeyRole::Primary {
            kind: "edge",
            id,
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
            .request::<(), _>(Method::GET, &format!("/edges/{id}"), None, options)
            .await
    }

    pub async fn update_edge(
        &self,
        id: &Uuid,
        edge_type_id: &Uuid,
        source_object_id: &Uuid,
        target_object_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<Edge> {
        let caps = self
            .cache()
            .edge_capabilities(id, source_object_id, target_object_id, edge_type_id);

        #[derive(serde::Serialize)]
        struct UpdateBody {
            edge_type_id: Uuid,
        }

        run_write(self.cache(), &caps, SentinelKind::Write, false, options.deadline, || async {
            self.http
                .request(
                    Method::PUT,
                    &format!("/edges/{id}"),
                    Some(&UpdateBody {
                        edge_type_id: *edge_type_id,
                    }),
                    options,
                )
                .await
        })
        .await
    }

    pub async fn delete_edge(
        &self,
        id: &Uuid,
        edge_type_id: &Uuid,
        source_object_id: &Uuid,
        target_object_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<()> {
        let caps = self
            .cache()
            .edge_capabilities(id, source_object_id, target_object_id, edge_type_id);
        run_delete(self.cache(), &caps, options.deadline, || async {
            self.http
                .request::<(), ()>(Method::DELETE, &format!("/edges/{id}"), None, options)
                .await
        })
        .await
    }
}
