use serde::{Deserialize, Serialize};
use std::fmt;

/// The two independent item catalogs. Each maps to its own table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    Resources,
    News,
}

impl Catalog {
    pub const ALL: [Catalog; 2] = [Catalog::Resources, Catalog::News];

    /// Table name as provisioned by the migrations.
    pub fn table(&self) -> &'static str {
        match self {
            Catalog::Resources => "Resources",
            Catalog::News => "News",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Catalog::Resources => "resources",
            Catalog::News => "news",
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion payload. `Sent` is not part of it: new rows always start pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewItem {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

impl NewItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// A stored catalog row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
    pub sent: i64,
}

impl CatalogItem {
    pub fn is_sent(&self) -> bool {
        self.sent != 0
    }

    pub fn sent_state(&self) -> SentState {
        SentState::from_column(self.sent)
    }
}

/// Delivery state decoded from the integer `Sent` column.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SentState {
    Pending,
    /// Nonzero receipt recorded by the delivery process (usually the channel message id).
    Delivered(i64),
}

impl SentState {
    pub fn from_column(value: i64) -> Self {
        if value == 0 {
            SentState::Pending
        } else {
            SentState::Delivered(value)
        }
    }
}

/// Result of a mark-as-sent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// The row moved from pending to delivered.
    Marked,
    /// The row was already delivered; carries the receipt stored earlier.
    AlreadySent(i64),
}
