use rusqlite::{params, OptionalExtension};

use super::*;

impl TalentDb {
    // =========================================================================
    // Graph edges and path cache
    // =========================================================================

    /// Co-employment neighbors of a person, either direction, capped.
    pub fn coemployment_neighbors(
        &self,
        person_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT CASE
                 WHEN src_person_id = ?1 THEN dst_person_id
                 ELSE src_person_id
             END
             FROM edge_coemployment
             WHERE src_person_id = ?1 OR dst_person_id = ?1
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![person_id, limit], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Shared-repository collaborators of a person, capped. Two people are
    /// co-contributors when their GitHub profiles both contributed to the
    /// same repository and both profiles are linked to persons.
    pub fn cocontribution_neighbors(
        &self,
        person_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT p2.person_id
             FROM github_profile gp1
             JOIN github_contribution gc1 ON gc1.github_profile_id = gp1.github_profile_id
             JOIN github_contribution gc2 ON gc2.repo_id = gc1.repo_id
             JOIN github_profile gp2 ON gp2.github_profile_id = gc2.github_profile_id
             JOIN person p2 ON p2.person_id = gp2.person_id
             WHERE gp1.person_id = ?1 AND p2.person_id != ?1
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![person_id, limit], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// The company name witnessing a co-employment edge between two people,
    /// if one exists.
    pub fn coemployment_company_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, DbError> {
        let name = self
            .conn
            .query_row(
                "SELECT c.company_name
                 FROM edge_coemployment ec
                 JOIN company c ON c.company_id = ec.company_id
                 WHERE (ec.src_person_id = ?1 AND ec.dst_person_id = ?2)
                    OR (ec.src_person_id = ?2 AND ec.dst_person_id = ?1)
                 LIMIT 1",
                params![a, b],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// A repository both people contributed to, if one exists.
    pub fn shared_repo_between(&self, a: &str, b: &str) -> Result<Option<String>, DbError> {
        let name = self
            .conn
            .query_row(
                "SELECT gr.full_name
                 FROM github_profile gp1
                 JOIN github_contribution gc1 ON gc1.github_profile_id = gp1.github_profile_id
                 JOIN github_contribution gc2 ON gc2.repo_id = gc1.repo_id
                 JOIN github_profile gp2 ON gp2.github_profile_id = gc2.github_profile_id
                 JOIN github_repository gr ON gr.repo_id = gc1.repo_id
                 WHERE gp1.person_id = ?1 AND gp2.person_id = ?2
                 LIMIT 1",
                params![a, b],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Brief person fields for enriching path and graph nodes.
    pub fn persons_brief(&self, ids: &[String]) -> Result<Vec<PersonBrief>, DbError> {
        let mut out = Vec::with_capacity(ids.len());
        let mut stmt = self.conn.prepare(
            "SELECT person_id, full_name, headline, location FROM person WHERE person_id = ?1",
        )?;
        for id in ids {
            if let Some(brief) = stmt
                .query_row(params![id], |row| {
                    Ok(PersonBrief {
                        person_id: row.get(0)?,
                        full_name: row.get(1)?,
                        headline: row.get(2)?,
                        location: row.get(3)?,
                    })
                })
                .optional()?
            {
                out.push(brief);
            }
        }
        Ok(out)
    }

    /// Look up a cached path fresher than `ttl_days`. Returns the path
    /// length and the stored `{nodes, edges}` JSON blob.
    pub fn get_cached_path(
        &self,
        source: &str,
        target: &str,
        ttl_days: i64,
    ) -> Result<Option<(i64, String)>, DbError> {
        let cached = self
            .conn
            .query_row(
                "SELECT path_length, path_nodes FROM network_paths
                 WHERE source_person_id = ?1 AND target_person_id = ?2
                   AND cached_at > datetime('now', '-' || ?3 || ' days')",
                params![source, target, ttl_days],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(cached)
    }

    /// Upsert a computed path. Negative results are never cached: callers
    /// only write here after finding a path.
    pub fn cache_path(
        &self,
        source: &str,
        target: &str,
        path_length: i64,
        path_nodes_json: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO network_paths
                (source_person_id, target_person_id, path_length, path_nodes, cached_at)
             VALUES (?1, ?2, ?3, ?4, datetime('now'))
             ON CONFLICT(source_person_id, target_person_id) DO UPDATE SET
                path_length = excluded.path_length,
                path_nodes = excluded.path_nodes,
                cached_at = excluded.cached_at",
            params![source, target, path_length, path_nodes_json],
        )?;
        Ok(())
    }

    pub fn path_cache_count(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM network_paths", [], |row| row.get(0))?)
    }

    /// Rebuild the derived co-employment edge table from employment overlaps.
    ///
    /// Two people share an edge at a company when their stints overlap in
    /// time; open-ended stints run to the present. Edges are stored once per
    /// unordered pair with `src < dst`. Returns the number of edges written.
    pub fn rebuild_coemployment_edges(&self) -> Result<usize, DbError> {
        self.with_transaction(|db| {
            db.conn.execute("DELETE FROM edge_coemployment", [])?;

            let written = db.conn.execute(
                "INSERT INTO edge_coemployment
                    (src_person_id, dst_person_id, company_id,
                     overlap_months, first_overlap_start, last_overlap_end)
                 SELECT
                    e1.person_id,
                    e2.person_id,
                    e1.company_id,
                    CAST(MAX(0, ROUND((
                        julianday(MIN(COALESCE(e1.end_date, date('now')),
                                      COALESCE(e2.end_date, date('now'))))
                        - julianday(MAX(COALESCE(e1.start_date, '1970-01-01'),
                                        COALESCE(e2.start_date, '1970-01-01')))
                    ) / 30.44)) AS INTEGER),
                    MAX(COALESCE(e1.start_date, '1970-01-01'),
                        COALESCE(e2.start_date, '1970-01-01')),
                    MIN(COALESCE(e1.end_date, date('now')),
                        COALESCE(e2.end_date, date('now')))
                 FROM employment e1
                 JOIN employment e2
                   ON e1.company_id = e2.company_id
                  AND e1.person_id < e2.person_id
                 WHERE COALESCE(e1.start_date, '1970-01-01')
                         <= COALESCE(e2.end_date, date('now'))
                   AND COALESCE(e2.start_date, '1970-01-01')
                         <= COALESCE(e1.end_date, date('now'))
                 GROUP BY e1.person_id, e2.person_id, e1.company_id",
                [],
            )?;
            Ok(written)
        })
    }

    /// Per-person network statistics: neighbor counts by edge kind and the
    /// companies contributing the most connections.
    pub fn person_network_stats(&self, person_id: &str) -> Result<PersonNetworkStats, DbError> {
        let coworker_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT CASE
                 WHEN src_person_id = ?1 THEN dst_person_id
                 ELSE src_person_id
             END)
             FROM edge_coemployment
             WHERE src_person_id = ?1 OR dst_person_id = ?1",
            params![person_id],
            |row| row.get(0),
        )?;

        let collaborator_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT p2.person_id)
             FROM github_profile gp1
             JOIN github_contribution gc1 ON gc1.github_profile_id = gp1.github_profile_id
             JOIN github_contribution gc2 ON gc2.repo_id = gc1.repo_id
             JOIN github_profile gp2 ON gp2.github_profile_id = gc2.github_profile_id
             JOIN person p2 ON p2.person_id = gp2.person_id
             WHERE gp1.person_id = ?1 AND p2.person_id != ?1",
            params![person_id],
            |row| row.get(0),
        )?;

        let top_companies = {
            let mut stmt = self.conn.prepare(
                "SELECT c.company_name, COUNT(DISTINCT CASE
                     WHEN ec.src_person_id = ?1 THEN ec.dst_person_id
                     ELSE ec.src_person_id
                 END) AS connection_count
                 FROM edge_coemployment ec
                 JOIN company c ON c.company_id = ec.company_id
                 WHERE ec.src_person_id = ?1 OR ec.dst_person_id = ?1
                 GROUP BY c.company_name
                 ORDER BY connection_count DESC
                 LIMIT 10",
            )?;
            let rows = stmt.query_map(params![person_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        Ok(PersonNetworkStats {
            total_connections: coworker_count + collaborator_count,
            coworker_connections: coworker_count,
            github_connections: collaborator_count,
            top_companies,
        })
    }

    /// Graph-wide statistics: total edges, distinct people in the graph,
    /// and min/max/average degree.
    pub fn graph_stats(&self) -> Result<GraphStats, DbError> {
        let total_edges: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM edge_coemployment", [], |row| row.get(0))?;

        let people_in_graph: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT src_person_id AS pid FROM edge_coemployment
                UNION
                SELECT dst_person_id FROM edge_coemployment
             )",
            [],
            |row| row.get(0),
        )?;

        let (min_degree, max_degree, avg_degree) = self
            .conn
            .query_row(
                "WITH degrees AS (
                    SELECT pid, COUNT(*) AS degree FROM (
                        SELECT src_person_id AS pid FROM edge_coemployment
                        UNION ALL
                        SELECT dst_person_id FROM edge_coemployment
                    ) GROUP BY pid
                 )
                 SELECT MIN(degree), MAX(degree), AVG(degree) FROM degrees",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                },
            )
            .unwrap_or((None, None, None));

        Ok(GraphStats {
            total_edges,
            people_in_graph,
            min_degree: min_degree.unwrap_or(0),
            max_degree: max_degree.unwrap_or(0),
            avg_degree: avg_degree.unwrap_or(0.0),
        })
    }
}

/// Graph-wide degree statistics.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub total_edges: i64,
    pub people_in_graph: i64,
    pub min_degree: i64,
    pub max_degree: i64,
    pub avg_degree: f64,
}

/// One person's connection counts and their top shared companies.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonNetworkStats {
    pub total_connections: i64,
    pub coworker_connections: i64,
    pub github_connections: i64,
    /// (company name, distinct connections through it), strongest first.
    pub top_companies: Vec<(String, i64)>,
}
