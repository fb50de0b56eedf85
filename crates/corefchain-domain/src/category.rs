//! Entity categories and their fixed resolution order

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity category targeted by one pass of the pipeline
///
/// Each pass resolves mentions of exactly one category and leaves the
/// others untouched. Categories are chained in the order of [`EntityCategory::CHAIN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityCategory {
    /// Named or described individuals
    Person,

    /// Places, addresses, border crossings
    Location,

    /// Travel routes between locations
    Route,

    /// Vehicles, vessels, aircraft
    MeansOfTransport,

    /// Companies, gangs, agencies
    Organization,

    /// Phones, messaging accounts, radios
    MeansOfCommunication,

    /// Goods, substances, or people being smuggled
    SmuggledItem,
}

impl EntityCategory {
    /// Fixed chain order: each category consumes the previous one's rewrite
    pub const CHAIN: [EntityCategory; 7] = [
        EntityCategory::Person,
        EntityCategory::Location,
        EntityCategory::Route,
        EntityCategory::MeansOfTransport,
        EntityCategory::Organization,
        EntityCategory::MeansOfCommunication,
        EntityCategory::SmuggledItem,
    ];

    /// Get the category name as used in configuration and artifact paths
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityCategory::Person => "person",
            EntityCategory::Location => "location",
            EntityCategory::Route => "route",
            EntityCategory::MeansOfTransport => "means-of-transport",
            EntityCategory::Organization => "organization",
            EntityCategory::MeansOfCommunication => "means-of-communication",
            EntityCategory::SmuggledItem => "smuggled-item",
        }
    }

    /// Human-readable label used inside prompts
    pub fn label(&self) -> &'static str {
        match self {
            EntityCategory::Person => "PERSON",
            EntityCategory::Location => "LOCATION",
            EntityCategory::Route => "ROUTE",
            EntityCategory::MeansOfTransport => "MEANS OF TRANSPORT",
            EntityCategory::Organization => "ORGANIZATION",
            EntityCategory::MeansOfCommunication => "MEANS OF COMMUNICATION",
            EntityCategory::SmuggledItem => "SMUGGLED ITEM",
        }
    }

    /// Parse a category name, accepting `_` or `-` separators and the `org` shorthand
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "person" => Some(EntityCategory::Person),
            "location" => Some(EntityCategory::Location),
            "route" => Some(EntityCategory::Route),
            "means-of-transport" => Some(EntityCategory::MeansOfTransport),
            "organization" | "org" => Some(EntityCategory::Organization),
            "means-of-communication" => Some(EntityCategory::MeansOfCommunication),
            "smuggled-item" => Some(EntityCategory::SmuggledItem),
            _ => None,
        }
    }

    /// Position of this category in the chain
    pub fn chain_position(&self) -> usize {
        Self::CHAIN
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::CHAIN.len())
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Unknown entity category: {}", s))
    }
}
