// ==========================================
// KML 批量导入 - SQL 性能统计
// ==========================================
// 职责: SQLite 语句计数、慢语句告警、按操作统计耗时
// 开关:
// - KML_GIS_IMPORT_PERF_SQL=1 开启（默认关闭）
// - KML_GIS_IMPORT_SLOW_SQL_MS=50 慢语句阈值（毫秒，默认 200）
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const ENV_PERF_SQL: &str = "KML_GIS_IMPORT_PERF_SQL";
pub const ENV_SLOW_SQL_MS: &str = "KML_GIS_IMPORT_SLOW_SQL_MS";
const DEFAULT_SLOW_SQL_MS: u64 = 200;
const SQL_LOG_MAX_LEN: usize = 420;

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(DEFAULT_SLOW_SQL_MS);

thread_local! {
    static PERF_DEPTH: Cell<u32> = const { Cell::new(0) };
    static SQL_COUNT: Cell<u64> = const { Cell::new(0) };
    static SLOW_SQL_COUNT: Cell<u64> = const { Cell::new(0) };
}

// ==========================================
// PerfSettings - 统计开关
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfSettings {
    pub enabled: bool,
    pub slow_sql_ms: u64,
}

impl PerfSettings {
    /// 从环境变量读取
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = lookup(ENV_PERF_SQL).map(|v| is_true(&v)).unwrap_or(false);
        let slow_sql_ms = lookup(ENV_SLOW_SQL_MS)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SLOW_SQL_MS);
        Self {
            enabled,
            slow_sql_ms,
        }
    }
}

fn is_true(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn truncate_sql(sql: &str, max_len: usize) -> String {
    let s = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s,
    }
}

/// 按环境变量安装 SQLite 语句 trace/profile
pub fn install_sqlite_tracing(conn: &mut Connection) {
    install_with_settings(conn, PerfSettings::from_env());
}

pub fn install_with_settings(conn: &mut Connection, settings: PerfSettings) {
    PERF_SQL_ENABLED.store(settings.enabled, Ordering::Relaxed);

    if !settings.enabled {
        conn.profile(None);
        return;
    }

    // profile 会覆盖 trace 钩子，语句计数与慢 SQL 统一在 profile 回调中处理
    SLOW_SQL_THRESHOLD_MS.store(settings.slow_sql_ms, Ordering::Relaxed);
    conn.profile(Some(sql_profile_callback));
    tracing::debug!(slow_sql_ms = settings.slow_sql_ms, "SQL 性能统计已开启");
}

fn sql_profile_callback(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    if PERF_DEPTH.with(|d| d.get() > 0) {
        SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }

    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold == 0 || ms < threshold {
        return;
    }

    tracing::warn!(
        target: "slow_sql",
        duration_ms = ms,
        sql = %truncate_sql(sql, SQL_LOG_MAX_LEN),
        "慢 SQL"
    );
    if PERF_DEPTH.with(|d| d.get() > 0) {
        SLOW_SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }
}

/// 性能统计 Guard：记录耗时 + SQL 语句数 + 慢 SQL 数
///
/// ```ignore
/// let _perf = kml_gis_import::perf::PerfGuard::new("import_kml_file");
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    sql_start: u64,
    slow_sql_start: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        PERF_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            start: Instant::now(),
            sql_start: SQL_COUNT.with(|c| c.get()),
            slow_sql_start: SLOW_SQL_COUNT.with(|c| c.get()),
        }
    }

    /// 自创建以来的 SQL 语句数（未开启统计时恒为 0）
    pub fn sql_count(&self) -> u64 {
        SQL_COUNT.with(|c| c.get()).saturating_sub(self.sql_start)
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let slow_sql_count = SLOW_SQL_COUNT
            .with(|c| c.get())
            .saturating_sub(self.slow_sql_start);

        tracing::debug!(
            target: "perf",
            op = self.op,
            elapsed_ms,
            sql_count = self.sql_count(),
            slow_sql_count,
            "done"
        );

        PERF_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_lookup() {
        let settings = PerfSettings::from_lookup(|k| match k {
            ENV_PERF_SQL => Some("on".to_string()),
            ENV_SLOW_SQL_MS => Some(" 50 ".to_string()),
            _ => None,
        });
        assert_eq!(
            settings,
            PerfSettings {
                enabled: true,
                slow_sql_ms: 50
            }
        );

        let settings = PerfSettings::from_lookup(|_| None);
        assert!(!settings.enabled);
        assert_eq!(settings.slow_sql_ms, DEFAULT_SLOW_SQL_MS);
    }

    #[test]
    fn test_truncate_sql_collapses_whitespace() {
        assert_eq!(truncate_sql("SELECT\n  1", 100), "SELECT 1");
        assert_eq!(truncate_sql("SELECT 1", 3), "SEL…");
    }

    #[test]
    fn test_guard_counts_statements() {
        let mut conn = Connection::open_in_memory().unwrap();
        install_with_settings(
            &mut conn,
            PerfSettings {
                enabled: true,
                slow_sql_ms: 10_000,
            },
        );

        let guard = PerfGuard::new("test");
        conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        conn.execute("INSERT INTO t VALUES (?1)", [2]).unwrap();
        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 2);
        assert!(guard.sql_count() >= 3, "sql_count = {}", guard.sql_count());
    }
}
