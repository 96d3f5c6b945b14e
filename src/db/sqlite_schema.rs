pub const SQLITE_SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub const SCHEMA_VERSION: &str = "1.0.0";

pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut prev = '\0';

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double_quote && prev != '\\' => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ';' if !in_single_quote && !in_double_quote => {
                let stmt = strip_comment_lines(&current);
                if !stmt.is_empty() {
                    statements.push(stmt);
                }
                current.clear();
                prev = ch;
                continue;
            }
            _ => {}
        }

        current.push(ch);
        prev = ch;
    }

    let tail = strip_comment_lines(&current);
    if !tail.is_empty() {
        statements.push(tail);
    }

    statements
}

fn strip_comment_lines(stmt: &str) -> String {
    stmt.lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ignores_semicolons_in_literals() {
        let sql = "INSERT INTO t VALUES ('a;b');\n-- note\nSELECT 1;";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["INSERT INTO t VALUES ('a;b')", "SELECT 1"]);
    }

    #[test]
    fn test_schema_has_both_tables() {
        let statements = split_sql_statements(SQLITE_SCHEMA_SQL);
        assert!(statements.iter().any(|s| s.contains(r#"TABLE IF NOT EXISTS "skill_mastery" ("#)));
        assert!(statements
            .iter()
            .any(|s| s.contains(r#"TABLE IF NOT EXISTS "skill_mastery_history""#)));
    }
}
