//! SQL query builders for backend activity and database counters.

/// First release with `wait_event` in `pg_stat_activity` and
/// `pg_blocking_pids()`.
const PG_96: i32 = 90600;

fn wait_expr(server_version_num: Option<i32>) -> &'static str {
    if server_version_num.unwrap_or(0) >= PG_96 {
        "a.wait_event IS NOT NULL"
    } else {
        "a.waiting"
    }
}

/// Columns shared by all three acquisition queries.
fn backend_columns(server_version_num: Option<i32>) -> String {
    format!(
        r#"
                a.pid,
                COALESCE(a.application_name, '') as application_name,
                COALESCE(a.datname, '') as datname,
                COALESCE(a.usename, '') as usename,
                COALESCE(a.client_addr::text, 'local') as client,
                COALESCE(EXTRACT(EPOCH FROM (NOW() - a.query_start)), 0)::double precision as duration,
                COALESCE(a.state, '') as state,
                COALESCE({wait}, false) as wait,
                COALESCE(a.query, '') as query"#,
        wait = wait_expr(server_version_num)
    )
}

/// Builds version-aware query for running (non-idle) backends.
pub(super) fn build_activities_query(server_version_num: Option<i32>) -> String {
    format!(
        r#"
            SELECT{columns}
            FROM pg_stat_activity a
            WHERE a.state <> 'idle'
              AND a.pid <> pg_backend_pid()
            ORDER BY duration DESC
        "#,
        columns = backend_columns(server_version_num)
    )
}

/// Builds query for backends waiting on an ungranted lock.
pub(super) fn build_waiting_query(server_version_num: Option<i32>) -> String {
    format!(
        r#"
            SELECT{columns},
                l.mode as lock_mode,
                l.locktype as lock_type,
                COALESCE(l.relation::regclass::text, '') as relation
            FROM pg_catalog.pg_locks l
            JOIN pg_catalog.pg_stat_activity a ON a.pid = l.pid
            WHERE NOT l.granted
              AND a.pid <> pg_backend_pid()
            ORDER BY duration DESC
        "#,
        columns = backend_columns(server_version_num)
    )
}

/// Builds version-aware query for backends holding a lock others wait on.
pub(super) fn build_blocking_query(server_version_num: Option<i32>) -> String {
    let blockers = if server_version_num.unwrap_or(0) >= PG_96 {
        r#"
              AND l.pid IN (
                  SELECT unnest(pg_blocking_pids(w.pid))
                  FROM pg_catalog.pg_stat_activity w
                  WHERE w.pid <> pg_backend_pid()
              )"#
    } else {
        r#"
              AND EXISTS (
                  SELECT 1
                  FROM pg_catalog.pg_locks w
                  WHERE NOT w.granted
                    AND w.pid <> l.pid
                    AND w.locktype = l.locktype
                    AND w.database IS NOT DISTINCT FROM l.database
                    AND w.relation IS NOT DISTINCT FROM l.relation
                    AND w.transactionid IS NOT DISTINCT FROM l.transactionid
              )"#
    };

    format!(
        r#"
            SELECT DISTINCT ON (a.pid){columns},
                l.mode as lock_mode,
                l.locktype as lock_type,
                COALESCE(l.relation::regclass::text, '') as relation
            FROM pg_catalog.pg_locks l
            JOIN pg_catalog.pg_stat_activity a ON a.pid = l.pid
            WHERE l.granted
              AND a.pid <> pg_backend_pid(){blockers}
            ORDER BY a.pid, duration DESC
        "#,
        columns = backend_columns(server_version_num),
    )
}

/// Builds query for cumulative transaction count, total size and longest
/// database name.
pub(super) fn build_db_stats_query(skip_sizes: bool, rds_mode: bool) -> String {
    let size_expr = if skip_sizes {
        "NULL::bigint"
    } else {
        "COALESCE(SUM(pg_database_size(d.datname)), 0)::bigint"
    };
    let rds_filter = if rds_mode {
        "\n              AND d.datname <> 'rdsadmin'"
    } else {
        ""
    };

    format!(
        r#"
            SELECT
                COALESCE(SUM(s.xact_commit + s.xact_rollback), 0)::bigint as xact_total,
                {size_expr} as total_size,
                COALESCE(MAX(LENGTH(d.datname)), 0)::integer as max_name_length
            FROM pg_catalog.pg_stat_database s
            JOIN pg_catalog.pg_database d ON d.oid = s.datid
            WHERE d.datallowconn{rds_filter}
        "#
    )
}

pub(super) const ACTIVE_CONNECTIONS_QUERY: &str =
    "SELECT COUNT(*)::bigint FROM pg_catalog.pg_stat_activity WHERE state = 'active'";
