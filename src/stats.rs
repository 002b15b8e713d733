//! Database statistics overview.
//!
//! Prints row counts for every table and a breakdown of tasks by status.
//! Used by `collab stats` as a quick check that imports and match runs
//! landed where expected. Output goes to stdout as plain text.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

const COUNTED_TABLES: &[(&str, &str)] = &[
    ("Projects", "projects"),
    ("Files", "files"),
    ("Versions", "file_versions"),
    ("Instances", "instances"),
    ("Vectors", "vectors"),
    ("Annotations", "annotations"),
    ("Tasks", "tasks"),
    ("Matches", "matches"),
    ("Dependencies", "dependencies"),
];

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Collab Database Stats");
    println!("=====================");
    println!();
    println!("  Database:      {}", config.db.path.display());
    println!("  Size:          {}", format_bytes(db_size));
    println!();

    for (label, table) in COUNTED_TABLES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&pool)
            .await?;
        println!("  {:<14} {}", format!("{}:", label), count);
    }

    let status_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n, MAX(finished) AS last_finished \
         FROM tasks GROUP BY status ORDER BY n DESC",
    )
    .fetch_all(&pool)
    .await?;

    if !status_rows.is_empty() {
        println!();
        println!("  Tasks by status:");
        println!("  {:<12} {:>6}   {}", "STATUS", "COUNT", "LAST FINISHED");
        println!("  {}", "-".repeat(44));
        for row in &status_rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            let last: Option<i64> = row.get("last_finished");
            println!(
                "  {:<12} {:>6}   {}",
                status,
                n,
                last.map(format_ms).unwrap_or_else(|| "-".to_string())
            );
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ms(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ms() {
        assert_eq!(format_ms(0), "1970-01-01 00:00");
    }
}
