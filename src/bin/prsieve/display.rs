use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use prsieve::{DisplayMode, PullRequest};

const COLUMN_SEPARATOR: &str = "  ";

const TABLE_HEADERS: &[&str] = &["URL", "BRANCH", "FILES", "+/-", "CREATED AT"];

pub fn display_prs<W: Write>(prs: &[PullRequest], mode: DisplayMode, writer: &mut W) -> Result<()> {
    match mode {
        DisplayMode::Quiet => display_prs_quiet(prs, writer),
        DisplayMode::Json => display_prs_json(prs, writer),
        DisplayMode::Normal => display_prs_table(prs, writer),
    }
}

fn display_prs_quiet<W: Write>(prs: &[PullRequest], writer: &mut W) -> Result<()> {
    for pr in prs {
        writeln!(writer, "{}", pr.number())?;
    }
    Ok(())
}

fn display_prs_json<W: Write>(prs: &[PullRequest], writer: &mut W) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, prs)?;
    writeln!(writer)?;
    Ok(())
}

fn format_relative_time(time: Option<DateTime<Utc>>) -> String {
    use chrono_humanize::HumanTime;
    time.map(|t| HumanTime::from(t).to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn pr_to_table_row(pr: &PullRequest) -> Vec<String> {
    vec![
        pr.html_url.clone(),
        pr.head_ref.clone(),
        pr.changed_files.to_string(),
        format!("+{}/-{}", pr.additions, pr.deletions),
        format_relative_time(pr.created_at),
    ]
}

fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or_default()
        })
        .collect()
}

fn render_row<W: Write, S: AsRef<str>>(cells: &[S], widths: &[usize], writer: &mut W) -> Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i < cells.len() - 1 {
            write!(writer, "{:<width$}{COLUMN_SEPARATOR}", cell.as_ref(), width = widths[i])?;
        } else {
            write!(writer, "{}", cell.as_ref())?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn display_prs_table<W: Write>(prs: &[PullRequest], writer: &mut W) -> Result<()> {
    if prs.is_empty() {
        writeln!(writer, "No matching pull requests")?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = prs.iter().map(pr_to_table_row).collect();
    let widths = calculate_column_widths(TABLE_HEADERS, &rows);

    render_row(TABLE_HEADERS, &widths, writer)?;
    let separators: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    render_row(&separators[..], &widths, writer)?;
    for row in &rows {
        render_row(&row[..], &widths, writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use prsieve::{PullRequestId, Repo};

    use super::*;

    fn pr(number: u64) -> PullRequest {
        PullRequest {
            id: PullRequestId::new(Repo::parse("apache/maven").unwrap(), number),
            html_url: format!("https://github.com/apache/maven/pull/{number}"),
            changed_files: 1,
            additions: 1,
            deletions: 1,
            head_ref: "dependabot/maven/junit-4.13.2".to_string(),
            head_sha: "abc123".to_string(),
            created_at: None,
        }
    }

    #[test]
    fn test_quiet_prints_numbers() {
        let mut out = Vec::new();
        display_prs(&[pr(7), pr(9)], DisplayMode::Quiet, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "7\n9\n");
    }

    #[test]
    fn test_table_aligns_columns() {
        let mut out = Vec::new();
        display_prs(&[pr(7), pr(1234)], DisplayMode::Normal, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("URL"));
        assert_eq!(lines[0].find("BRANCH"), lines[2].find("dependabot"));
        assert!(lines[3].contains("+1/-1"));
        assert!(lines[3].ends_with("unknown"));
    }

    #[test]
    fn test_json_output() {
        let mut out = Vec::new();
        display_prs(&[pr(7)], DisplayMode::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["id"]["number"], 7);
        assert_eq!(value[0]["id"]["repo"]["owner"], "apache");
    }

    #[test]
    fn test_empty_table() {
        let mut out = Vec::new();
        display_prs(&[], DisplayMode::Normal, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No matching pull requests\n");
    }
}
