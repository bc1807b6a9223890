//! Header-keyed access to one CSV row.
//!
//! Importers target a fixed column vocabulary; unknown columns are ignored
//! and missing columns read as empty. Header matching is exact on the known
//! spellings, including the `Twiiter / X` typo that ships in real exports.

use std::collections::HashMap;

use crate::normalize::{normalize_email, validate_email};

/// Accepted spellings for the Twitter/X column.
const TWITTER_HEADERS: &[&str] = &["Twitter/X", "Twitter / X", "Twiiter / X", "Twitter"];

/// One CSV row, keyed by trimmed header name.
#[derive(Debug, Clone, Default)]
pub struct CsvRow {
    fields: HashMap<String, String>,
}

impl CsvRow {
    pub fn from_record(headers: &csv::StringRecord, record: &csv::StringRecord) -> Self {
        let mut fields = HashMap::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            let header = header.trim();
            let value = value.trim();
            if !header.is_empty() && !value.is_empty() {
                fields.insert(header.to_string(), value.to_string());
            }
        }
        Self { fields }
    }

    /// A trimmed, non-empty field value.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields.get(header).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn full_name(&self) -> Option<&str> {
        self.get("Full Name")
    }

    pub fn first_name(&self) -> Option<&str> {
        self.get("First Name")
    }

    pub fn last_name(&self) -> Option<&str> {
        self.get("Last Name")
    }

    pub fn linkedin_url(&self) -> Option<&str> {
        self.get("LinkedIn URL")
    }

    pub fn github_url(&self) -> Option<&str> {
        self.get("GitHub URL")
    }

    pub fn company(&self) -> Option<&str> {
        self.get("Company")
    }

    pub fn job_title(&self) -> Option<&str> {
        self.get("Job Title")
    }

    pub fn location(&self) -> Option<&str> {
        self.get("Location")
    }

    pub fn school(&self) -> Option<&str> {
        self.get("School")
    }

    pub fn website(&self) -> Option<&str> {
        self.get("Website/Blog").or_else(|| self.get("Website / Blog"))
    }

    pub fn twitter(&self) -> Option<&str> {
        TWITTER_HEADERS.iter().find_map(|h| self.get(h))
    }

    /// All valid emails on the row, normalized and deduplicated, in column
    /// order: `Primary Email` first, then the semicolon-separated `Emails`
    /// list, then the `All Emails` JSON array.
    pub fn emails(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        let mut push = |raw: &str| {
            if validate_email(raw) {
                if let Some(email) = normalize_email(raw) {
                    if seen.insert(email.clone()) {
                        out.push(email);
                    }
                }
            }
        };

        if let Some(primary) = self.get("Primary Email") {
            push(primary);
        }

        if let Some(list) = self.get("Emails") {
            for part in list.split(';') {
                push(part.trim());
            }
        }

        if let Some(json_list) = self.get("All Emails") {
            if let Ok(parsed) = serde_json::from_str::<Vec<String>>(json_list) {
                for email in &parsed {
                    push(email.trim());
                }
            }
        }

        out
    }
}
