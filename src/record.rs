//! Output record framing.
//!
//! One line per non-empty batch: rows joined by `,`, the whole line
//! terminated by a single `\n`. Not a standard CSV dialect — no quoting or
//! escaping, see DESIGN.md.

use std::io::Write;

/// One emitted row: `tag,email,login,token,code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub tag: u8,
    pub email: String,
    pub login: String,
    pub token: String,
    pub code: String,
}

impl Row {
    fn field_group(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.tag, self.email, self.login, self.token, self.code
        )
    }
}

/// Writes one batch line to `out`: every row's field group joined by `,`,
/// the whole line terminated by `\n`, then flushed. A no-op for an empty
/// batch — an empty selection produces no output line at all.
pub fn write_batch<W: Write>(out: &mut W, rows: &[Row]) -> std::io::Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let line = rows
        .iter()
        .map(Row::field_group)
        .collect::<Vec<_>>()
        .join(",");
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(tag: u8, id: &str) -> Row {
        Row {
            tag,
            email: format!("user{id}@example.com"),
            login: format!("user{id}"),
            token: "x".repeat(86),
            code: "ABCDE".to_owned(),
        }
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let mut buf = Vec::new();
        write_batch(&mut buf, &[]).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn single_row_has_no_trailing_comma_before_newline() {
        let mut buf = Vec::new();
        write_batch(&mut buf, &[row(1, "1")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with(",ABCDE\n"));
        assert!(!text.contains(",\n"));
    }

    #[test]
    fn multiple_rows_joined_by_comma_batch_ends_in_single_newline() {
        let mut buf = Vec::new();
        write_batch(&mut buf, &[row(1, "1"), row(2, "2")]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches('\n').count(), 1);
        assert!(text.ends_with('\n'));
        let body = &text[..text.len() - 1];
        let groups: Vec<&str> = body.split(',').collect();
        // 2 rows * 5 fields = 10 comma-separated fields
        assert_eq!(groups.len(), 10);
    }
}
