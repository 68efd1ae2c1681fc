//! Derived read operations that do not map 1:1 onto a single entity's
//! CRUD surface: `find_edge`, `list_edges_on_object`,
//! `list_edges_between_objects`, `check_attribute`. See spec §4.6.

use reqwest::Method;
use uuid::Uuid;

use crate::cache::{get_item, release_sentinel, save_item, GetItemOutcome};
use crate::config::RequestOptions;
use crate::error::AuthzResult;
use crate::http::PagePayload;
use crate::keys::KeyRole;
use crate::model::{AttributePathNode, Edge};
use crate::sentinel::SentinelManager;

use super::AuthzClient;

impl AuthzClient {
    /// Tries, in order: pairwise-edge collection, per-object outgoing-edge
    /// collection, fully-qualified single-edge key. The fully-qualified
    /// key is cheapest to produce but least likely to already be warm;
    /// the collections may have been populated by an adjacent operation.
    pub async fn find_edge(
        &self,
        source_object_id: &Uuid,
        target_object_id: &Uuid,
        edge_type_id: &Uuid,
        options: &RequestOptions,
    ) -> AuthzResult<Edge> {
        let keys = self.cache().key_names();

        if !options.bypass_cache {
            let pairwise_key = keys.name(KeyRole::PairwiseEdgeCollection {
                source_object_id,
                target_object_id,
            });
            if let Some(edge) = self
                .find_in_collection(&pairwise_key, edge_type_id)
                .await?
            {
                return Ok(edge);
            }

            let on_object_key = keys.name(KeyRole::ObjectEdgeCollection {
                object_id: source_object_id,
            });
            if let Some(edge) = self
                .find_in_collection(&on_object_key, edge_type_id)
                .await?
            {
                return Ok(edge);
            }

            let direct_key = keys.name(KeyRole::EdgeByEndpoints {
                source_object_id,
                target_object_id,
                edge_type_id,
            });
            if let Some(value) = self.cache().provider().get_value(&direct_key).await? {
                if !SentinelManager::is_sentinel(&value) && !SentinelManager::is_tombstone(&value) {
                    return Ok(serde_json::from_str(&value)?);
                }
            }
        }

        let global_key = keys.name(KeyRole::GlobalCollection { kind: "edge" });
        let outcome = if options.bypass_cache {
            GetItemOutcome::Miss
        } else {
            get_item(
                self.cache().provider(),
                self.cache().sentinel_manager(),
                &global_key,
                true,
                self.cache().sentinel_ttl(),
                self.cache().metrics(),
            )
            .await?
        };

        let result: AuthzResult<Edge> = self
            .http
            .request::<(), _>(
                Method::GET,
                &format!(
                    "/edges/find?source={source_object_id}&target={target_object_id}&type={edge_type_id}"
                ),
                None,
                options,
            )
            .await;

        if let GetItemOutcome::MissWithSentinel(sentinel) = outcome {
            if let Ok(edge) = &result {
                let caps = self
                    .cache()
                    .edge_capabilities(&edge.id, source_object_id, target_object_id, edge_type_id);
                let serialized = serde_json::to_string(edge)?;
                let _ = save_item(
                    self.cache().provider(),
                    self.cache().sentinel_manager(),
                    &caps,
                    &sentinel,
                    &serialized,
                    false,
                    &[],
                    self.cache().metrics(),
                )
                .await;
            }
            release_sentinel(self.cache().provider(), &[global_key], &sentinel).await?;
        }

        result
    }

    async fn find_in_collection(
        &self,
        collection_key: &str,
        edge_type_id: &Uuid,
    ) -> AuthzResult<Option<Edge>> {
        let Some(value) = self.cache().provider().get_value(collection_key).await? else {
            return Ok(None);
        };
        if SentinelManager::is_sentinel(&value) || SentinelManager::is_tombstone(&value) {
            return Ok(None);
        }
        let edges: Vec<Edge> = serde_json::from_str(&value)?;
        Ok(edges.into_iter().find(|e| e.edge_type_id == *edge_type_id))
    }

    /// Cached only when the server response fits on one page, so the
    /// cached copy represents the whole collection. A cached read is
    /// served only if the caller's page limit is at least the cached
    /// size (a smaller limit means the caller wants a different page
    /// shape than what was cached).
    pub async fn list_edges_on_object(
        &self,
        object_id: &Uuid,
        page_limit: usize,
        options: &RequestOptions,
    ) -> AuthzResult<Vec<Edge>> {
        let key = self
            .cache()
            .key_names()
            .name(KeyRole::ObjectEdgeCollection { object_id });

        if !options.bypass_cache {
            if let Some(value) = self.cache().provider().get_value(&key).await? {
                if !SentinelManager::is_sentinel(&value) && !SentinelManager::is_tombstone(&value) {
                    let edges: Vec<Edge> = serde_json::from_str(&value)?;
                    if edges.len() <= page_limit {
                        return Ok(edges);
                    }
                }
            }
        }

        let page: PagePayload<Edge> = self
            .http
            .request::<(), _>(
                Method::GET,
                &format!("/objects/{object_id}/edges?limit={page_limit}"),
                None,
                options,
            )
            .await?;

        if !page.has_next && !page.has_prev {
            let dep_keys: Vec<String> = page
                .data
                .iter()
                .flat_map(|edge| {
                    [
                        self.cache().key_names().name(KeyRole::DependencySet {
                            kind: "object",
                            id: &edge.source_object_id,
                        }),
                        self.cache().key_names().name(KeyRole::DependencySet {
                            kind: "object",
                            id: &edge.target_object_id,
                        }),
                    ]
                })
                .collect();
            let serialized = serde_json::to_string(&page.data)?;
            let _ = crate::cache::save_collection(
                self.cache().provider(),
                &key,
                &dep_keys,
                &serialized,
                self.cache().edge_ttl(),
                self.cache().metrics(),
            )
            .await;
        }

        Ok(page.data)
    }

    pub async fn list_edges_between_objects(
        &self,
        source_object_id: &Uuid,
        target_object_id: &Uuid,
        page_limit: usize,
        options: &RequestOptions,
    ) -> AuthzResult<Vec<Edge>> {
        let key = self.cache().key_names().name(KeyRole::PairwiseEdgeCollection {
            source_object_id,
            target_object_id,
        });

        if !options.bypass_cache {
            if let Some(value) = self.cache().provider().get_value(&key).await? {
                if !SentinelManager::is_sentinel(&value) && !SentinelManager::is_tombstone(&value) {
                    let edges: Vec<Edge> = serde_json::from_str(&value)?;
                    if edges.len() <= page_limit {
                        return Ok(edges);
                    }
                }
            }
        }

        let page: PagePayload<Edge> = self
            .http
            .request::<(), _>(
                Method::GET,
                &format!(
                    "/edges/between?source={source_object_id}&target={target_object_id}&limit={page_limit}"
                ),
                None,
                options,
            )
            .await?;

        if !page.has_next && !page.has_prev {
            let dep_keys = vec![
                self.cache()
                    .key_names()
                    .name(KeyRole::DependencySet { kind: "object", id: source_object_id }),
                self.cache()
                    .key_names()
                    .name(KeyRole::DependencySet { kind: "object", id: target_object_id }),
            ];
            let serialized = serde_json::to_string(&page.data)?;
            let _ = crate::cache::save_collection(
                self.cache().provider(),
                &key,
                &dep_keys,
                &serialized,
                self.cache().edge_ttl(),
                self.cache().metrics(),
            )
            .await;
        }

        Ok(page.data)
    }

    /// Positive results are cached under the Edge TTL; negative results
    /// are never cached, since nothing would invalidate them if the
    /// underlying permission path later becomes true.
    pub async fn check_attribute(
        &self,
        source_object_id: &Uuid,
        target_object_id: &Uuid,
        attribute_name: &str,
        path_hops: &[AttributePathNode],
        options: &RequestOptions,
    ) -> AuthzResult<bool> {
        let key = self.cache().key_names().name(KeyRole::AttributePath {
            source_object_id,
            target_object_id,
            attribute_name,
        });

        if !options.bypass_cache {
            if let Some(value) = self.cache().provider().get_value(&key).await? {
                if value == "true" {
                    return Ok(true);
                }
            }
        }

        #[derive(serde::Deserialize)]
        struct CheckResponse {
            has_attribute: bool,
        }

        let response: CheckResponse = self
            .http
            .request::<(), _>(
                Method::GET,
                &format!(
                    "/checkattribute?source={source_object_id}&target={target_object_id}&attribute={attribute_name}"
                ),
                None,
                options,
            )
            .await?;

        if response.has_attribute {
            let dep_keys = self.cache().attribute_path_dependency_keys(path_hops);
            let _ = crate::cache::save_collection(
                self.cache().provider(),
                &key,
                &dep_keys,
                "true",
                self.cache().edge_ttl(),
                self.cache().metrics(),
            )
            .await;
        }

        Ok(response.has_attribute)
    }
}
