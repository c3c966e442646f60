use std::collections::BTreeMap;

use practice_core::graph::TagGraph;
use practice_core::model::{ProblemCounts, TagName, TagNode, Tier};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, ser, u32_from_i64};
use crate::repository::{StorageError, TagRelationshipRepository};

fn tag_from_str(raw: String) -> Result<TagName, StorageError> {
    TagName::new(raw).map_err(|e| StorageError::Domain(e.into()))
}

#[async_trait::async_trait]
impl TagRelationshipRepository for SqliteRepository {
    async fn has_relationships(&self) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM tag_nodes LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        Ok(row.is_some())
    }

    async fn replace_relationships(&self, graph: &TagGraph) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query("DELETE FROM tag_edges")
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        sqlx::query("DELETE FROM tag_nodes")
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for node in graph.nodes() {
            sqlx::query(
                r"
                    INSERT INTO tag_nodes (tag, easy, medium, hard, classification)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(node.tag.as_str())
            .bind(i64::from(node.counts.easy))
            .bind(i64::from(node.counts.medium))
            .bind(i64::from(node.counts.hard))
            .bind(node.classification.as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        // Edges reference nodes, so they go in once every node exists.
        for node in graph.nodes() {
            for (related, weight) in &node.related {
                sqlx::query(
                    "INSERT INTO tag_edges (tag, related_tag, weight) VALUES (?1, ?2, ?3)",
                )
                .bind(node.tag.as_str())
                .bind(related.as_str())
                .bind(i64::from(*weight))
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn load_relationships(&self) -> Result<TagGraph, StorageError> {
        let node_rows =
            sqlx::query("SELECT tag, easy, medium, hard, classification FROM tag_nodes ORDER BY tag")
                .fetch_all(&self.pool)
                .await
                .map_err(conn)?;
        let edge_rows = sqlx::query("SELECT tag, related_tag, weight FROM tag_edges")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut related: BTreeMap<TagName, BTreeMap<TagName, u32>> = BTreeMap::new();
        for row in edge_rows {
            let tag = tag_from_str(row.try_get("tag").map_err(ser)?)?;
            let other = tag_from_str(row.try_get("related_tag").map_err(ser)?)?;
            let weight = u32_from_i64("weight", row.try_get("weight").map_err(ser)?)?;
            related.entry(tag).or_default().insert(other, weight);
        }

        let mut nodes = Vec::with_capacity(node_rows.len());
        for row in node_rows {
            let tag = tag_from_str(row.try_get("tag").map_err(ser)?)?;
            let classification: String = row.try_get("classification").map_err(ser)?;
            let counts = ProblemCounts::new(
                u32_from_i64("easy", row.try_get("easy").map_err(ser)?)?,
                u32_from_i64("medium", row.try_get("medium").map_err(ser)?)?,
                u32_from_i64("hard", row.try_get("hard").map_err(ser)?)?,
            );
            nodes.push(TagNode {
                related: related.remove(&tag).unwrap_or_default(),
                classification: Tier::parse(&classification)
                    .map_err(|e| StorageError::Domain(e.into()))?,
                counts,
                tag,
            });
        }
        Ok(TagGraph::from_nodes(nodes))
    }
}
