use super::normalizer::normalize_header;
use std::collections::HashMap;
use std::io::Read;
use std::sync::OnceLock;

/// Role a spreadsheet column plays. Unlisted columns are treated as form questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Timestamp,
    Kind,
    Username,
    Response,
}

static COLUMN_MAP: OnceLock<HashMap<&'static str, Column>> = OnceLock::new();

fn column_for(header: &str) -> Option<Column> {
    column_map().get(normalize_header(header).as_str()).copied()
}

fn column_map() -> &'static HashMap<&'static str, Column> {
    COLUMN_MAP.get_or_init(|| {
        const HEADERS: &[(&str, Column)] = &[
            ("timestamp", Column::Timestamp),
            ("submitted at", Column::Timestamp),
            ("application type", Column::Kind),
            ("type", Column::Kind),
            ("kind", Column::Kind),
            ("position", Column::Kind),
            ("discord username", Column::Username),
            ("discord", Column::Username),
            ("username", Column::Username),
            ("applicant", Column::Username),
            ("response", Column::Response),
            ("content", Column::Response),
            ("answers", Column::Response),
        ];
        HEADERS.iter().copied().collect()
    })
}

/// One spreadsheet row, before applicant resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeRow {
    pub submitted_at: Option<String>,
    pub kind: Option<String>,
    pub username: Option<String>,
    pub content: String,
}

impl IntakeRow {
    fn is_blank(&self) -> bool {
        self.username.is_none() && self.content.is_empty() && self.kind.is_none()
    }
}

/// Parses a form export. Question columns fold into `content` as "Question: answer" lines, after
/// any explicit response column.
pub(crate) fn parse_rows<R: Read>(reader: R) -> Result<Vec<IntakeRow>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let roles: Vec<Option<Column>> = headers.iter().map(column_for).collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let mut row = IntakeRow {
            submitted_at: None,
            kind: None,
            username: None,
            content: String::new(),
        };
        let mut questions = Vec::new();

        for (index, value) in record.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            match roles.get(index).copied().flatten() {
                Some(Column::Timestamp) => row.submitted_at = Some(value.to_string()),
                Some(Column::Kind) => row.kind = Some(value.to_string()),
                Some(Column::Username) => row.username = Some(value.to_string()),
                Some(Column::Response) => {
                    if !row.content.is_empty() {
                        row.content.push('\n');
                    }
                    row.content.push_str(value);
                }
                None => {
                    let question = headers.get(index).unwrap_or("").trim();
                    if question.is_empty() {
                        questions.push(value.to_string());
                    } else {
                        questions.push(format!("{question}: {value}"));
                    }
                }
            }
        }

        for line in questions {
            if !row.content.is_empty() {
                row.content.push('\n');
            }
            row.content.push_str(&line);
        }

        if !row.is_blank() {
            rows.push(row);
        }
    }

    Ok(rows)
}
