use tracing::error;
use uuid::Uuid;

use crate::{backend::ProfileStore, model::Profile};

use super::ChatError;

/// Every known user except the session owner, fetched once per session.
#[derive(Debug, Default)]
pub struct Directory {
    entries: Vec<Profile>,
    error: Option<String>,
}

/// What the user list shows for a query.
#[derive(Debug, PartialEq, Eq)]
pub enum Listing<'a> {
    Failed(&'a str),
    Prompt,
    NoResults,
    Matches(Vec<&'a Profile>),
}

impl Directory {
    pub fn new(entries: Vec<Profile>) -> Self {
        Self {
            entries,
            error: None,
        }
    }

    /// Fails open: a backend error yields an empty directory carrying the message.
    pub async fn load<S: ProfileStore + ?Sized>(store: &S, current_user: Uuid) -> Self {
        match store.profiles_except(current_user).await {
            Ok(entries) => Self::new(
                entries
                    .into_iter()
                    .filter(|profile| profile.id != current_user)
                    .collect(),
            ),
            Err(e) => {
                error!("Error fetching users: {e:#}");
                Self {
                    entries: Vec::new(),
                    error: Some(ChatError::DirectoryLoad(e).to_string()),
                }
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&Profile> {
        self.entries.iter().find(|profile| profile.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn filter(&self, query: &str) -> Listing<'_> {
        if let Some(error) = &self.error {
            return Listing::Failed(error);
        }

        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Listing::Prompt;
        }

        let matches: Vec<_> = self
            .entries
            .iter()
            .filter(|profile| {
                profile.full_name.to_lowercase().contains(&query)
                    || profile.username.to_lowercase().contains(&query)
            })
            .collect();

        if matches.is_empty() {
            Listing::NoResults
        } else {
            Listing::Matches(matches)
        }
    }
}
