use crate::extract::{clean_cell, extract_fields, metadata_keys, Columns, Extraction};
use crate::model::InputEntry;
use crate::VerifyResult;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

const HEADER_MARKERS: &[&str] = &["abn", "name", "id"];
const DELIMITER: char = ',';

/// Rows of an upload that can be looked up, in file order.
#[derive(Debug, Default, Clone)]
pub struct ParsedInput {
    /// Metadata keys derived from the header row, if the file has one.
    pub headers: Option<Vec<String>>,
    /// Metadata keys shared by every entry, one per column of the widest row.
    pub columns: Vec<String>,
    pub entries: Vec<InputEntry>,
    /// Non-blank data rows without a usable identifier.
    pub skipped: usize,
}

impl ParsedInput {
    /// Denominator for progress reporting.
    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

/// Split one line into cells.
///
/// A cell whose first non-blank character is `"` is quoted: the delimiter is
/// literal inside it and `""` stands for one quote. The quotes and the
/// whitespace around them are dropped; unquoted cells come back verbatim. An
/// unbalanced quote runs to the end of the line and never past it.
pub fn split_line(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        let mut cell = String::new();
        while let Some(&c) = chars.peek() {
            if c == delimiter || !c.is_whitespace() {
                break;
            }
            cell.push(c);
            chars.next();
        }

        if chars.peek() == Some(&'"') {
            chars.next();
            cell.clear();
            while let Some(c) = chars.next() {
                match c {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        cell.push('"');
                    }
                    '"' => break,
                    c => cell.push(c),
                }
            }
            let mut tail = String::new();
            while let Some(&c) = chars.peek() {
                if c == delimiter {
                    break;
                }
                tail.push(c);
                chars.next();
            }
            if !tail.trim().is_empty() {
                cell.push_str(&tail);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == delimiter {
                    break;
                }
                cell.push(c);
                chars.next();
            }
        }

        cells.push(cell);
        if chars.next().is_none() {
            return cells;
        }
    }
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|cell| clean_cell(cell).is_empty())
}

fn looks_like_header(line: &str) -> bool {
    let line = line.to_lowercase();
    HEADER_MARKERS.iter().any(|m| line.contains(m))
}

/// Parse a delimited upload into lookup entries.
///
/// Lines end in LF or CRLF and are split on their own, so a malformed line
/// can only lose itself. The first non-blank line is taken as a header when
/// it mentions an ABN, a name or an id column. Every entry is keyed on the
/// widest row of the file so all entries share one set of metadata keys.
pub async fn parse_entries<R>(reader: R) -> VerifyResult<ParsedInput>
where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(reader).lines();
    let mut header: Option<Vec<String>> = None;
    let mut rows: Vec<(usize, Vec<String>)> = Vec::new();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let cells = split_line(&line, DELIMITER);
        if is_blank(&cells) {
            continue;
        }
        if header.is_none() && rows.is_empty() && looks_like_header(&line) {
            header = Some(cells);
            continue;
        }
        rows.push((line_no, cells));
    }

    let width = rows
        .iter()
        .map(|(_, cells)| cells.len())
        .chain(header.as_ref().map(Vec::len))
        .max()
        .unwrap_or(0);
    let columns = Columns::new(header.as_deref(), width);

    let mut parsed = ParsedInput {
        headers: header.as_deref().map(metadata_keys),
        columns: columns.keys().to_vec(),
        ..ParsedInput::default()
    };
    for (line, cells) in rows {
        match extract_fields(&cells, &columns) {
            Extraction::Found(fields) => parsed.entries.push(InputEntry::new(
                fields.identifier,
                fields.display_name,
                fields.metadata,
            )),
            Extraction::NoIdentifier => {
                log::debug!("line {line}: no business number found, row skipped");
                parsed.skipped += 1;
            }
        }
    }

    log::debug!(
        "parsed {} entries ({} skipped, header: {})",
        parsed.entries.len(),
        parsed.skipped,
        parsed.headers.is_some()
    );
    Ok(parsed)
}

/// Parse an upload already decoded to text.
pub async fn parse_text(text: &str) -> VerifyResult<ParsedInput> {
    parse_entries(text.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn metadata_reproduces_original_columns() {
        let parsed = parse_text("Client ID,Company Name,ABN\nC001,Tech Solutions,51824753556\n")
            .await
            .unwrap();
        assert_eq!(parsed.total(), 1);
        let entry = &parsed.entries[0];
        let metadata: Vec<(&str, &str)> = entry
            .metadata
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            metadata,
            vec![
                ("Client ID", "C001"),
                ("Company Name", "Tech Solutions"),
                ("ABN", "51824753556"),
            ]
        );
        assert_eq!(entry.display_name, "Tech Solutions");
    }

    #[tokio::test]
    async fn single_line_without_header_is_data() {
        let parsed = parse_text("51824753556,Acme Pty Ltd").await.unwrap();
        assert!(parsed.headers.is_none());
        assert_eq!(parsed.entries[0].identifier, "51824753556");
        assert_eq!(parsed.entries[0].display_name, "Acme Pty Ltd");
    }

    #[tokio::test]
    async fn quoted_delimiters_crlf_and_blank_lines() {
        let text = "Name,ABN,Notes\r\n\r\n\"Acme, Pty Ltd\",51 824 753 556,\" spaced \"\r\n  \r\n\
                    Beta,not-a-number,x\r\nGamma,33051775556,\r\n";
        let parsed = parse_text(text).await.unwrap();

        assert_eq!(parsed.total(), 2);
        assert_eq!(parsed.skipped, 1);
        let acme = &parsed.entries[0];
        assert_eq!(acme.display_name, "Acme, Pty Ltd");
        assert_eq!(acme.identifier, "51824753556");
        assert_eq!(acme.metadata["Notes"], " spaced ");
        assert_eq!(parsed.entries[1].identifier, "33051775556");
    }

    #[tokio::test]
    async fn every_entry_gets_a_fresh_id() {
        let text = "ABN\n51824753556\n51824753556\n51824753556\n";
        let parsed = parse_text(text).await.unwrap();
        let ids: HashSet<_> = parsed.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn metadata_keys_match_across_rows() {
        let text = "ABN,Name,State\n51824753556,Acme,NSW\n33051775556,Beta\n";
        let parsed = parse_text(text).await.unwrap();
        let first: Vec<_> = parsed.entries[0].metadata.keys().collect();
        let second: Vec<_> = parsed.entries[1].metadata.keys().collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unbalanced_quote_only_loses_its_own_line() {
        let text = "Name,ABN\n\"Acme,51824753556\nBeta,33051775556\nGamma,53004085616\n";
        let parsed = parse_text(text).await.unwrap();

        assert_eq!(parsed.skipped, 1);
        let names: Vec<_> = parsed.entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["Beta", "Gamma"]);
    }

    #[tokio::test]
    async fn quote_after_leading_space_opens_a_quoted_cell() {
        let text = "Name, Company, ABN\nAcme, \"Foo, Inc\", 51824753556\n";
        let parsed = parse_text(text).await.unwrap();

        let entry = &parsed.entries[0];
        let metadata: Vec<(&str, &str)> = entry
            .metadata
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            metadata,
            vec![("Name", "Acme"), ("Company", "Foo, Inc"), ("ABN", " 51824753556")]
        );
        assert_eq!(entry.identifier, "51824753556");
    }

    #[tokio::test]
    async fn long_rows_widen_the_keys_of_every_row() {
        let text = "ABN,Name\n51824753556,Acme\n33051775556,Beta,extra\n";
        let parsed = parse_text(text).await.unwrap();

        assert_eq!(parsed.columns, vec!["ABN", "Name", "Col_3"]);
        for entry in &parsed.entries {
            let keys: Vec<_> = entry.metadata.keys().collect();
            assert_eq!(keys, vec!["ABN", "Name", "Col_3"]);
        }
        assert_eq!(parsed.entries[0].metadata["Col_3"], "");
        assert_eq!(parsed.entries[1].metadata["Col_3"], "extra");
    }

    #[test]
    fn split_line_handles_escaped_and_unbalanced_quotes() {
        assert_eq!(
            split_line(r#"a,"say ""hi""",  b ,"#, ','),
            vec!["a", r#"say "hi""#, "  b ", ""]
        );
        assert_eq!(split_line(r#""open,rest,of line"#, ','), vec!["open,rest,of line"]);
        assert_eq!(split_line(r#" "x" ,y"#, ','), vec!["x", "y"]);
        assert_eq!(split_line("", ','), vec![""]);
    }
}
