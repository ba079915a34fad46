use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's registered mobile application.
///
/// `branch` stays `None` until the provisioning worker has created the
/// application's branch in the template repository. Nothing else writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct MobileApp {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    /// Platform package identifier, e.g. `com.example.app`
    pub package: String,
    pub version: Option<String>,
    pub branch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MobileApp {
    pub fn is_provisioned(&self) -> bool {
        self.branch.is_some()
    }
}

/// Attributes accepted from a user when registering an app.
///
/// There is deliberately no `branch` here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMobileApp {
    pub owner_id: i64,
    pub name: String,
    pub package: String,
    pub version: Option<String>,
}

impl NewMobileApp {
    pub fn new(owner_id: i64, name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            package: package.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
