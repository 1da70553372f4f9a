use super::normalizer::normalize_username;
use crate::workflows::review::ApplicantRef;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

/// Resolves form usernames to member references.
#[derive(Debug, Clone, Default)]
pub struct ApplicantDirectory {
    members: HashMap<String, ApplicantRef>,
    passthrough: bool,
}

impl ApplicantDirectory {
    /// Every non-blank username resolves to itself (normalized).
    pub fn passthrough() -> Self {
        Self {
            members: HashMap::new(),
            passthrough: true,
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut directory = Self::default();
        for (username, member) in pairs {
            directory.insert(username.as_ref(), member);
        }
        directory
    }

    /// Loads a member export with `username` and `id` columns.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, csv::Error> {
        #[derive(Deserialize)]
        struct MemberRow {
            username: String,
            id: String,
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut directory = Self::default();
        for row in csv_reader.deserialize::<MemberRow>() {
            let row = row?;
            directory.insert(&row.username, row.id);
        }
        Ok(directory)
    }

    pub fn insert(&mut self, username: &str, member: impl Into<String>) {
        let key = normalize_username(username);
        if key.is_empty() {
            return;
        }
        if let Some(member) = ApplicantRef::resolved(member) {
            self.members.insert(key, member);
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn resolve(&self, username: &str) -> Option<ApplicantRef> {
        let key = normalize_username(username);
        if key.is_empty() {
            return None;
        }
        match self.members.get(&key) {
            Some(member) => Some(member.clone()),
            None if self.passthrough => Some(ApplicantRef(key)),
            None => None,
        }
    }
}
