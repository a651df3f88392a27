//! Schema bootstrap from a folder of SQL files

use std::path::{Path, PathBuf};
use tdb_common::StatementRequest;
use tracing::{error, info};

use super::SqlGateway;

/// Execute every statement of every file in `folder`, files in name order. Failures are logged and skipped. Returns how many statements
/// succeeded.
pub async fn load_schemas(gateway: &SqlGateway, folder: &Path) -> usize {
    let files = match list_files(folder).await {
        Ok(files) => files,
        Err(e) => {
            error!(folder = %folder.display(), error = %e, "Cannot read schema folder");
            return 0;
        },
    };

    let mut executed = 0;

    for path in files {
        info!(file = %path.display(), "Executing schema file");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Cannot read schema file");
                continue;
            },
        };

        for sql in split_statements(&content) {
            let result = gateway.execute_one(&StatementRequest::new(sql)).await;
            if result.success {
                executed += 1;
            } else {
                error!(
                    file = %path.display(),
                    error = result.error_message().unwrap_or_default(),
                    "Schema statement failed"
                );
            }
        }
    }

    executed
}

/// Regular files of `folder`, sorted by name
pub(crate) async fn list_files(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(folder).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

/// Split a script on `;`.
///
/// Semicolons inside quotes, identifiers, comments and `CREATE TRIGGER`
/// bodies do not end a statement. Fragments holding only whitespace or
/// comments are dropped.
fn split_statements(content: &str) -> Vec<&str> {
    let bytes = content.as_bytes();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_code = false;
    let mut words = 0;
    let mut trigger = false;
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                has_code = true;
                i = skip_past(bytes, i + 1, quote);
            },
            b'[' => {
                has_code = true;
                i = skip_past(bytes, i + 1, b']');
            },
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_past(bytes, i + 2, b'\n');
            },
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = content[i + 2..]
                    .find("*/")
                    .map_or(bytes.len(), |end| i + 2 + end + 2);
            },
            b';' if depth == 0 => {
                if has_code {
                    statements.push(content[start..i].trim());
                }
                start = i + 1;
                has_code = false;
                words = 0;
                trigger = false;
                i += 1;
            },
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let end = bytes[i..]
                    .iter()
                    .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
                    .map_or(bytes.len(), |len| i + len);
                let word = &content[i..end];
                has_code = true;
                words += 1;

                // CREATE [TEMP] TRIGGER
                if words <= 3 && word.eq_ignore_ascii_case("TRIGGER") {
                    trigger = true;
                } else if trigger {
                    if word.eq_ignore_ascii_case("BEGIN") || word.eq_ignore_ascii_case("CASE") {
                        depth += 1;
                    } else if word.eq_ignore_ascii_case("END") {
                        depth = depth.saturating_sub(1);
                    }
                }
                i = end;
            },
            c => {
                has_code |= !c.is_ascii_whitespace();
                i += 1;
            },
        }
    }

    if has_code {
        statements.push(content[start..].trim());
    }
    statements
}

/// Index just past the next `close` at or after `from`
fn skip_past(bytes: &[u8], from: usize, close: u8) -> usize {
    bytes
        .get(from..)
        .and_then(|rest| rest.iter().position(|b| *b == close))
        .map_or(bytes.len(), |pos| from + pos + 1)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements_skips_blanks() {
        let content = "CREATE TABLE a (x INTEGER);\n\n  ;CREATE TABLE b (y TEXT)\n;  \n-- done\n";
        assert_eq!(
            split_statements(content),
            vec!["CREATE TABLE a (x INTEGER)", "CREATE TABLE b (y TEXT)"]
        );
    }

    #[test]
    fn test_split_statements_keeps_quoted_semicolons() {
        let content = "INSERT INTO t VALUES (1, 'a;b', 'it''s;'); -- note; here\n\
                       /* block; comment */ INSERT INTO \"odd;name\" VALUES (2)";
        assert_eq!(
            split_statements(content),
            vec![
                "INSERT INTO t VALUES (1, 'a;b', 'it''s;')",
                "-- note; here\n/* block; comment */ INSERT INTO \"odd;name\" VALUES (2)",
            ]
        );
    }

    #[test]
    fn test_split_statements_keeps_trigger_bodies_whole() {
        let trigger = "CREATE TRIGGER t_audit AFTER INSERT ON t BEGIN \
                       INSERT INTO audit VALUES (CASE WHEN new.id > 0 THEN 'up' ELSE 'down' END); \
                       UPDATE t SET v = v; END";
        let content = format!("CREATE TABLE t (id INTEGER, v TEXT);{trigger};\nSELECT 1;");

        assert_eq!(
            split_statements(&content),
            vec!["CREATE TABLE t (id INTEGER, v TEXT)", trigger, "SELECT 1"]
        );
    }

    #[tokio::test]
    async fn test_load_schemas_runs_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("01_people.sql"),
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT);",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("02_seed.sql"),
            "INSERT INTO people (name) VALUES ('ada'); INSERT INTO nowhere VALUES (1);",
        )
        .unwrap();

        let gateway = SqlGateway::open(":memory:").await.unwrap();
        let executed = load_schemas(&gateway, dir.path()).await;

        assert_eq!(executed, 2);
        let rows = gateway
            .query("SELECT name FROM people")
            .await
            .into_rows()
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_triggers_and_quoted_semicolons_survive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("schema.sql"),
            "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);\n\
             CREATE TABLE audit (id INTEGER, note TEXT);\n\
             CREATE TRIGGER t_audit AFTER INSERT ON t BEGIN\n\
                 INSERT INTO audit VALUES (new.id, 'inserted');\n\
             END;\n\
             INSERT INTO t VALUES (1, 'a;b');\n",
        )
        .unwrap();

        let gateway = SqlGateway::open(":memory:").await.unwrap();
        let executed = load_schemas(&gateway, dir.path()).await;

        assert_eq!(executed, 4);
        let rows = gateway.query("SELECT v FROM t").await.into_rows().unwrap();
        assert_eq!(rows[0]["v"], tdb_common::SqlValue::Text("a;b".to_string()));
        let audit = gateway.query("SELECT note FROM audit").await.into_rows().unwrap();
        assert_eq!(audit.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_folder_executes_nothing() {
        let gateway = SqlGateway::open(":memory:").await.unwrap();
        let executed = load_schemas(&gateway, Path::new("/definitely/not/here")).await;
        assert_eq!(executed, 0);
    }
}
